//! Smart group and smart rule enumeration.
//!
//! DEVONthink keeps both as an array of dicts. Each dict carries a `name`,
//! a `sync` sub-dict with the `UUID` and last sync `date`, and a few
//! type-specific flags at its own level.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::exec::CommandRunner;
use crate::outcome::Outcome;
use crate::plist;

/// Placeholder for entries whose `name` is missing.
pub const UNNAMED: &str = "(unnamed)";

/// Milliseconds between the Unix epoch and 2001-01-01T00:00:00Z, the reference
/// date of Core Foundation absolute times.
const ABSOLUTE_TIME_OFFSET_MS: i64 = 978_307_200_000;

/// Past every date chrono can represent, in either direction.
const MAX_ABSOLUTE_MILLIS: f64 = 1e17;

/// One smart group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartGroupEntry {
    /// Display name, or [`UNNAMED`].
    pub name: String,
    /// Sync UUID, empty when absent.
    pub uuid: String,
    /// Last sync time (ISO-8601).
    pub sync_date: Option<String>,
    /// `UseUUIDKey` flag.
    pub use_uuid_key: Option<bool>,
}

/// One smart rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartRuleEntry {
    /// Display name, or [`UNNAMED`].
    pub name: String,
    /// Sync UUID, empty when absent.
    pub uuid: String,
    /// `Enabled` flag.
    pub enabled: Option<bool>,
    /// `IndexOffset`.
    pub index_offset: Option<i64>,
    /// `LastExecution` as a Core Foundation absolute time.
    pub last_execution: Option<f64>,
    /// `LastExecution` rendered as ISO-8601.
    pub last_execution_date: Option<String>,
    /// Last sync time (ISO-8601).
    pub sync_date: Option<String>,
    /// `UseUUIDKey` flag.
    pub use_uuid_key: Option<bool>,
}

/// Payload of [`list_smart_groups`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartGroupList {
    /// Number of entries.
    pub count: usize,
    /// Entries sorted by name.
    pub smart_groups: Vec<SmartGroupEntry>,
}

/// Payload of [`list_smart_rules`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartRuleList {
    /// Number of entries.
    pub count: usize,
    /// Entries sorted by name.
    pub smart_rules: Vec<SmartRuleEntry>,
}

/// Fields shared by both entry kinds.
struct Identity {
    name: String,
    uuid: String,
    sync_date: Option<String>,
    use_uuid_key: Option<bool>,
}

fn identity(block: &str) -> Option<Identity> {
    let name = plist::string_after_key(block, "name").filter(|n| !n.is_empty());
    let sync = plist::dict_at_path(block, &["sync"]);
    let uuid = sync
        .and_then(|s| plist::string_after_key(s, "UUID"))
        .filter(|u| !u.is_empty());

    if name.is_none() && uuid.is_none() {
        return None;
    }

    Some(Identity {
        name: name.unwrap_or_else(|| UNNAMED.to_string()),
        uuid: uuid.unwrap_or_default(),
        sync_date: sync
            .and_then(|s| plist::date_after_key(s, "date"))
            .map(|d| normalize_date(&d)),
        use_uuid_key: plist::bool_after_key(block, "UseUUIDKey"),
    })
}

/// Parse smart group definitions from XML plist text.
pub fn parse_smart_groups(xml: &str) -> Vec<SmartGroupEntry> {
    let mut entries: Vec<SmartGroupEntry> = plist::extract_top_level_dicts(xml)
        .into_iter()
        .filter_map(identity)
        .map(|id| SmartGroupEntry {
            name: id.name,
            uuid: id.uuid,
            sync_date: id.sync_date,
            use_uuid_key: id.use_uuid_key,
        })
        .collect();
    entries.sort_by(|a, b| by_name(&a.name, &b.name));
    entries
}

/// Parse smart rule definitions from XML plist text.
pub fn parse_smart_rules(xml: &str) -> Vec<SmartRuleEntry> {
    let mut entries: Vec<SmartRuleEntry> = plist::extract_top_level_dicts(xml)
        .into_iter()
        .filter_map(|block| {
            let id = identity(block)?;
            let last_execution = plist::real_after_key(block, "LastExecution");
            Some(SmartRuleEntry {
                name: id.name,
                uuid: id.uuid,
                enabled: plist::bool_after_key(block, "Enabled"),
                index_offset: plist::integer_after_key(block, "IndexOffset"),
                last_execution,
                last_execution_date: last_execution.and_then(absolute_time_to_iso),
                sync_date: id.sync_date,
                use_uuid_key: id.use_uuid_key,
            })
        })
        .collect();
    entries.sort_by(|a, b| by_name(&a.name, &b.name));
    entries
}

/// List smart groups from the plist at `path`.
pub async fn list_smart_groups(path: &Path, runner: &dyn CommandRunner) -> Outcome<SmartGroupList> {
    let result = plist::load_xml(path, runner).await.map(|xml| {
        let smart_groups = parse_smart_groups(&xml);
        SmartGroupList {
            count: smart_groups.len(),
            smart_groups,
        }
    });
    if let Err(e) = &result {
        tracing::warn!(path = %path.display(), error = %e, "failed to list smart groups");
    }
    Outcome::from_result(result)
}

/// List smart rules from the plist at `path`.
pub async fn list_smart_rules(path: &Path, runner: &dyn CommandRunner) -> Outcome<SmartRuleList> {
    let result = plist::load_xml(path, runner).await.map(|xml| {
        let smart_rules = parse_smart_rules(&xml);
        SmartRuleList {
            count: smart_rules.len(),
            smart_rules,
        }
    });
    if let Err(e) = &result {
        tracing::warn!(path = %path.display(), error = %e, "failed to list smart rules");
    }
    Outcome::from_result(result)
}

/// Case-insensitive order, ties broken by exact byte order.
fn by_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn normalize_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| {
            d.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
        .unwrap_or_else(|_| raw.to_string())
}

fn absolute_time_to_iso(seconds: f64) -> Option<String> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() > MAX_ABSOLUTE_MILLIS {
        return None;
    }
    let millis = (millis as i64).checked_add(ABSOLUTE_TIME_OFFSET_MS)?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
}
