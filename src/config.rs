//! Runtime configuration.
//!
//! File locations are injected rather than global so tests can point the
//! readers at fixtures. Defaults follow DEVONthink's layout on macOS:
//!
//!   ~/Library/Application Support/DEVONthink 3/SmartGroups.plist
//!   ~/Library/Application Support/DEVONthink 3/SmartRules.plist
//!   ~/Library/Preferences/com.devon-technologies.think3.plist
//!
//! Newer releases drop the version suffix (`DEVONthink/`,
//! `com.devon-technologies.think.plist`); the first existing candidate wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for one external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Default cap on captured output of one external command.
pub const DEFAULT_MAX_OUTPUT: usize = 16 * 1024 * 1024;

const SUPPORT_DIRS: &[&str] = &["DEVONthink 3", "DEVONthink"];
const PREFERENCE_FILES: &[&str] = &[
    "com.devon-technologies.think3.plist",
    "com.devon-technologies.think.plist",
];

/// Locations of the files the readers work on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Smart group definitions (binary or XML plist).
    pub smart_groups: PathBuf,
    /// Smart rule definitions (binary or XML plist).
    pub smart_rules: PathBuf,
    /// Application preference store holding the column layouts.
    pub preferences: PathBuf,
}

impl Paths {
    /// Resolve the default locations under the user's home directory.
    pub fn detect() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::under_home(&home)
    }

    /// Resolve the default locations under an explicit home directory.
    pub fn under_home(home: &Path) -> Self {
        let library = home.join("Library");
        let support = first_existing(
            SUPPORT_DIRS
                .iter()
                .map(|dir| library.join("Application Support").join(dir)),
        );
        let preferences = first_existing(
            PREFERENCE_FILES
                .iter()
                .map(|file| library.join("Preferences").join(file)),
        );

        Self {
            smart_groups: support.join("SmartGroups.plist"),
            smart_rules: support.join("SmartRules.plist"),
            preferences,
        }
    }
}

fn first_existing(candidates: impl Iterator<Item = PathBuf>) -> PathBuf {
    let candidates: Vec<PathBuf> = candidates.collect();
    candidates
        .iter()
        .find(|path| path.exists())
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_default()
}

/// Limits applied to every external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    /// Wall-clock limit for one command.
    pub timeout: Duration,
    /// Maximum bytes captured from stdout (and from stderr).
    pub max_output: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// File locations.
    pub paths: Paths,
    /// External command limits.
    pub limits: CommandLimits,
}

impl Config {
    /// Configuration with detected paths and default limits.
    pub fn detect() -> Self {
        Self {
            paths: Paths::detect(),
            limits: CommandLimits::default(),
        }
    }
}
