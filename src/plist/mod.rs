//! Minimal XML plist reading.
//!
//! Only the narrow subset DEVONthink's files need: walking top-level dicts
//! and pulling typed fields out of them by key. This is not a general plist
//! parser.

mod field;
mod scan;

pub use field::{
    bool_after_key, date_after_key, dict_at_path, integer_after_key, keys, real_after_key,
    string_after_key, sub_dict_after_key,
};
pub use scan::{extract_top_level_blocks, extract_top_level_dicts};

use std::path::Path;

use crate::error::{Error, Result};
use crate::exec::CommandRunner;

/// Magic prefix of binary property lists.
const BINARY_MAGIC: &[u8] = b"bplist";

/// Load a plist file as XML text.
///
/// XML plists are read as-is. Binary plists are converted with
/// `plutil -convert xml1 -o - <path>`.
pub async fn load_xml(path: &Path, runner: &dyn CommandRunner) -> Result<String> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = tokio::fs::read(path).await?;
    if !bytes.starts_with(BINARY_MAGIC) {
        return String::from_utf8(bytes)
            .map_err(|e| Error::Malformed(format!("{} is not UTF-8: {e}", path.display())));
    }

    tracing::debug!(path = %path.display(), "converting binary plist");
    runner
        .run(
            "plutil",
            &[
                "-convert".into(),
                "xml1".into(),
                "-o".into(),
                "-".into(),
                path.display().to_string(),
            ],
        )
        .await
}
