//! Column layouts stored in DEVONthink's preferences.
//!
//! A layout for entity `N` is three keys:
//!
//! - `columns-N`: visible column identifiers, in order
//! - `tableViewColumns-N`: every column identifier, visible or hidden
//! - `widths-N`: column identifier -> width
//!
//! The three are written together in one transaction. DEVONthink only picks
//! up a changed layout after a restart (or closing and reopening the
//! window); nothing here signals the running application.

mod resolve;
mod store;
mod value;

pub use resolve::{fuzzy_match, known_names, resolve, FuzzyMatch, MatchKind, Resolved};
pub use store::{DefaultsStore, KeyCopy, PreferenceStore, WriteBatch};
pub use value::{parse_defaults_output, PrefValue};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::outcome::{Failure, Outcome};

const COLUMNS: &str = "columns-";
const TABLE_VIEW_COLUMNS: &str = "tableViewColumns-";
const WIDTHS: &str = "widths-";

/// Key prefixes making up one layout.
pub const LAYOUT_PREFIXES: [&str; 3] = [COLUMNS, TABLE_VIEW_COLUMNS, WIDTHS];

const RESTART_NOTE: &str =
    "Restart DEVONthink (or close and reopen the window) to see the new layout.";

/// The stored parts of one layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    /// Visible columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<PrefValue>,
    /// All columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_view_columns: Option<PrefValue>,
    /// Column widths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widths: Option<PrefValue>,
    /// Keys that were present.
    pub found_keys: Vec<String>,
}

/// Read the three layout keys stored under `base`.
///
/// `Ok(None)` when none of them exists.
pub async fn probe(store: &dyn PreferenceStore, base: &str) -> Result<Option<ColumnLayout>> {
    let mut layout = ColumnLayout::default();
    for prefix in LAYOUT_PREFIXES {
        let key = format!("{prefix}{base}");
        let Some(value) = store.read_key(&key).await? else {
            continue;
        };
        match prefix {
            COLUMNS => layout.columns = Some(value),
            TABLE_VIEW_COLUMNS => layout.table_view_columns = Some(value),
            _ => layout.widths = Some(value),
        }
        layout.found_keys.push(key);
    }

    Ok((!layout.found_keys.is_empty()).then_some(layout))
}

/// Payload of [`read_layout`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutReport {
    /// Name as requested.
    pub name: String,
    /// Base name the keys are stored under.
    pub resolved_name: String,
    /// Strategy that resolved the name.
    pub matched_by: MatchKind,
    /// Whether the name was found by substring search.
    pub fuzzy_match: bool,
    /// The layout itself.
    #[serde(flatten)]
    pub layout: ColumnLayout,
}

/// Read the column layout of `name`, falling back to `uuid`, then to a
/// substring search.
pub async fn read_layout(
    store: &dyn PreferenceStore,
    name: &str,
    uuid: Option<&str>,
) -> Outcome<LayoutReport> {
    let result = resolve(store, name, uuid).await.map(|found| LayoutReport {
        name: name.to_string(),
        resolved_name: found.key,
        matched_by: found.via,
        fuzzy_match: found.via == MatchKind::Fuzzy,
        layout: found.layout,
    });
    if let Err(e) = &result {
        tracing::info!(name, error = %e, "column layout not read");
    }
    Outcome::from_result(result)
}

/// Arguments of [`copy_layout`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    /// Entity whose layout is copied.
    pub source_name: String,
    /// Entity receiving the layout.
    pub target_name: String,
    /// Tried when `source_name` has no keys.
    #[serde(default)]
    pub source_uuid: Option<String>,
    /// When given, the layout is stored under this key instead of
    /// `target_name`.
    #[serde(default)]
    pub target_uuid: Option<String>,
}

/// Payload of [`copy_layout`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyReport {
    /// Base name the source keys were read from.
    pub source_key: String,
    /// Strategy that resolved the source.
    pub source_matched_by: MatchKind,
    /// Whether the source was found by substring search.
    pub fuzzy_match: bool,
    /// Base name the layout was written under.
    pub target_key: String,
    /// Keys written.
    pub copied_keys: Vec<String>,
    /// Whether the target could be read back.
    pub verified: bool,
    /// Restart reminder.
    pub note: &'static str,
}

/// Copy a layout from one entity to another.
///
/// The source is resolved like [`read_layout`]; the target is taken
/// literally (its UUID when given). Every write goes through one
/// [`PreferenceStore::apply`] transaction, and the target is read back
/// afterwards. A write that cannot be read back is reported as a failure.
pub async fn copy_layout(store: &dyn PreferenceStore, request: &CopyRequest) -> Outcome<CopyReport> {
    match copy_layout_inner(store, request).await {
        Ok(report) if report.verified => Outcome::Success(report),
        Ok(report) => {
            tracing::warn!(target_key = %report.target_key, "copied layout could not be read back");
            Outcome::Failure(
                Failure::new(
                    "verification",
                    format!(
                        "wrote {} key(s) for '{}' but could not read them back",
                        report.copied_keys.len(),
                        report.target_key
                    ),
                )
                .with("targetKey", report.target_key)
                .with("copiedKeys", report.copied_keys)
                .with("verified", false),
            )
        }
        Err(e) => {
            tracing::info!(source = %request.source_name, error = %e, "column layout not copied");
            Outcome::Failure(e.into())
        }
    }
}

async fn copy_layout_inner(store: &dyn PreferenceStore, request: &CopyRequest) -> Result<CopyReport> {
    let target_key = request
        .target_uuid
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(&request.target_name)
        .to_string();
    if target_key.is_empty() {
        return Err(Error::InvalidParams("target name must not be empty".into()));
    }

    let source = resolve(
        store,
        &request.source_name,
        request.source_uuid.as_deref(),
    )
    .await?;
    if source.key == target_key {
        return Err(Error::Precondition(format!(
            "source and target are both '{target_key}'"
        )));
    }

    let batch = LAYOUT_PREFIXES
        .iter()
        .fold(WriteBatch::new(), |batch, prefix| {
            batch.copy(
                format!("{prefix}{}", source.key),
                format!("{prefix}{target_key}"),
            )
        });
    let copied_keys = store.apply(&batch).await?;
    if copied_keys.is_empty() {
        return Err(Error::Precondition(format!(
            "'{}' has no layout keys to copy",
            source.key
        )));
    }

    let verified = probe(store, &target_key).await?.is_some();
    tracing::info!(source = %source.key, target = %target_key, ?copied_keys, verified, "column layout copied");

    Ok(CopyReport {
        source_key: source.key,
        source_matched_by: source.via,
        fuzzy_match: source.via == MatchKind::Fuzzy,
        target_key,
        copied_keys,
        verified,
        note: RESTART_NOTE,
    })
}
