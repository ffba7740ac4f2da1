//! Name resolution for column layouts.
//!
//! Strategies are tried in order and the first hit wins:
//!
//! 1. the exact name,
//! 2. the exact UUID, when one is supplied,
//! 3. a case-insensitive substring match against every name that has a
//!    layout key. One candidate is taken; several are an error unless
//!    exactly one of them equals the query ignoring case; none is an error
//!    listing some known names.

use serde::Serialize;

use super::store::PreferenceStore;
use super::{probe, ColumnLayout, LAYOUT_PREFIXES};
use crate::error::{Error, Result};

/// How many known names to include when nothing matches.
const KNOWN_SAMPLE: usize = 20;

/// Which strategy resolved a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Keys exist under the name as given.
    Exact,
    /// Keys exist under the supplied UUID.
    Uuid,
    /// Found by substring search.
    Fuzzy,
}

/// A name that resolved to existing layout keys.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Base name the keys are stored under.
    pub key: String,
    /// Strategy that found it.
    pub via: MatchKind,
    /// The layout read while resolving.
    pub layout: ColumnLayout,
}

enum Strategy<'a> {
    Exact(&'a str),
    Uuid(&'a str),
    Fuzzy(&'a str),
}

impl Strategy<'_> {
    async fn attempt(&self, store: &dyn PreferenceStore) -> Result<Option<Resolved>> {
        match self {
            Strategy::Exact(name) => Ok(probe(store, name)
                .await?
                .map(|layout| resolved(name, MatchKind::Exact, layout))),
            Strategy::Uuid(uuid) => Ok(probe(store, uuid)
                .await?
                .map(|layout| resolved(uuid, MatchKind::Uuid, layout))),
            Strategy::Fuzzy(query) => {
                let known = known_names(&store.key_names().await?);
                let name = match fuzzy_match(query, &known) {
                    FuzzyMatch::One(name) => name,
                    FuzzyMatch::Many(candidates) => {
                        return Err(Error::Ambiguous {
                            query: query.to_string(),
                            candidates,
                        })
                    }
                    FuzzyMatch::None => {
                        return Err(Error::NotFound {
                            message: format!("no column layout found for '{query}'"),
                            known: known.into_iter().take(KNOWN_SAMPLE).collect(),
                        })
                    }
                };
                tracing::debug!(query, %name, "fuzzy layout match");
                Ok(probe(store, &name)
                    .await?
                    .map(|layout| resolved(&name, MatchKind::Fuzzy, layout)))
            }
        }
    }
}

fn resolved(key: &str, via: MatchKind, layout: ColumnLayout) -> Resolved {
    Resolved {
        key: key.to_string(),
        via,
        layout,
    }
}

/// Resolve `name` (with an optional UUID fallback) to stored layout keys.
pub async fn resolve(
    store: &dyn PreferenceStore,
    name: &str,
    uuid: Option<&str>,
) -> Result<Resolved> {
    let mut strategies = Vec::with_capacity(3);
    if !name.is_empty() {
        strategies.push(Strategy::Exact(name));
    }
    if let Some(uuid) = uuid.filter(|u| !u.is_empty()) {
        strategies.push(Strategy::Uuid(uuid));
    }
    if !name.is_empty() {
        strategies.push(Strategy::Fuzzy(name));
    }

    for strategy in &strategies {
        if let Some(found) = strategy.attempt(store).await? {
            return Ok(found);
        }
    }

    Err(Error::NotFound {
        message: format!("no column layout found for '{name}'"),
        known: Vec::new(),
    })
}

/// Outcome of a substring search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzyMatch {
    /// Exactly one usable candidate.
    One(String),
    /// Several candidates and no case-insensitive exact match among them.
    Many(Vec<String>),
    /// Nothing matched.
    None,
}

/// Case-insensitive substring search of `query` in `known`.
pub fn fuzzy_match(query: &str, known: &[String]) -> FuzzyMatch {
    let needle = query.to_lowercase();
    let candidates: Vec<&String> = known
        .iter()
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect();

    match candidates.as_slice() {
        [] => FuzzyMatch::None,
        [only] => FuzzyMatch::One((*only).clone()),
        many => {
            let exact: Vec<&&String> = many
                .iter()
                .filter(|name| name.to_lowercase() == needle)
                .collect();
            match exact.as_slice() {
                [only] => FuzzyMatch::One((**only).clone()),
                _ => FuzzyMatch::Many(many.iter().map(|name| (*name).clone()).collect()),
            }
        }
    }
}

/// Base names that have at least one layout key, sorted and deduplicated.
pub fn known_names(keys: &[String]) -> Vec<String> {
    let mut names: Vec<String> = keys
        .iter()
        .filter_map(|key| {
            LAYOUT_PREFIXES
                .iter()
                .find_map(|prefix| key.strip_prefix(prefix))
        })
        .filter(|base| !base.is_empty())
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    names
}
