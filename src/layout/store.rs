//! Preference store access.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::value::{parse_defaults_output, PrefValue};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::plist;

/// Transaction script: load the whole plist, copy keys, atomically replace.
const COPY_KEYS_SCRIPT: &str = include_str!("copy_keys.py");

/// One key-to-key deep copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCopy {
    /// Source key.
    pub from: String,
    /// Destination key, created or overwritten.
    pub to: String,
}

/// Writes applied together in a single load/mutate/save transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    copies: Vec<KeyCopy>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a copy of `from` to `to`. Skipped at apply time when `from`
    /// does not exist.
    pub fn copy(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.copies.push(KeyCopy {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Queued copies in order.
    pub fn copies(&self) -> &[KeyCopy] {
        &self.copies
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}

/// A flat key-value preference store.
#[async_trait::async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Read one key. `Ok(None)` when the key does not exist.
    async fn read_key(&self, key: &str) -> Result<Option<PrefValue>>;

    /// Names of every key in the store.
    async fn key_names(&self) -> Result<Vec<String>>;

    /// Apply a batch as one transaction: load the whole store, perform every
    /// copy whose source exists, and replace the store atomically. Nothing is
    /// saved when no copy applies. Returns the destination keys written.
    async fn apply(&self, batch: &WriteBatch) -> Result<Vec<String>>;
}

/// Store backed by a plist file, driven through `defaults`, `plutil` and a
/// `python3` transaction script.
pub struct DefaultsStore {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl DefaultsStore {
    /// Create a store for the plist at `path`.
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            path: path.into(),
            runner,
        }
    }

    /// `defaults` addresses a file by its path without the `.plist` suffix.
    fn domain(&self) -> String {
        let path = if self.path.extension().is_some_and(|ext| ext == "plist") {
            self.path.with_extension("")
        } else {
            self.path.clone()
        };
        path.display().to_string()
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(Error::FileNotFound {
                path: self.path.clone(),
            })
        }
    }
}

#[derive(Deserialize)]
struct ApplyReport {
    written: Vec<String>,
}

#[async_trait::async_trait]
impl PreferenceStore for DefaultsStore {
    async fn read_key(&self, key: &str) -> Result<Option<PrefValue>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let args = ["read".to_string(), self.domain(), key.to_string()];
        match self.runner.run("defaults", &args).await {
            Ok(output) => parse_defaults_output(&output).map(Some),
            Err(Error::CommandFailed { stderr, .. }) if stderr.contains("does not exist") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn key_names(&self) -> Result<Vec<String>> {
        self.ensure_exists()?;
        let xml = plist::load_xml(&self.path, self.runner.as_ref()).await?;
        let root = plist::extract_top_level_dicts(&xml)
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Malformed(format!("{} has no root dict", self.path.display()))
            })?;
        Ok(plist::keys(root))
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<Vec<String>> {
        self.ensure_exists()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<[&str; 2]> = batch
            .copies()
            .iter()
            .map(|c| [c.from.as_str(), c.to.as_str()])
            .collect();
        let args = [
            "-c".to_string(),
            COPY_KEYS_SCRIPT.to_string(),
            self.path.display().to_string(),
            serde_json::to_string(&pairs)?,
        ];

        let output = self.runner.run("python3", &args).await?;
        let report: ApplyReport = serde_json::from_str(output.trim()).map_err(|e| {
            Error::Malformed(format!("unexpected transaction output ({e}): {}", output.trim()))
        })?;
        tracing::info!(path = %self.path.display(), written = ?report.written, "preference keys written");
        Ok(report.written)
    }
}
