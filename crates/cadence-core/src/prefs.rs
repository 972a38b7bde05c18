//! Persisted preferences.
//!
//! Only the global on/off switch survives across sessions. Speed, pitch
//! and loop values are session-scoped and never written here.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;

/// Values persisted between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub globally_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            globally_enabled: true,
        }
    }
}

/// JSON file backing for [`Preferences`].
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
}

impl PreferenceStore {
    /// Store at `<data_dir>/cadence/preferences.json`.
    ///
    /// Falls back to an in-memory store when no data directory exists.
    pub fn new() -> Self {
        let path = ProjectDirs::from("com", "cadence", "Cadence")
            .map(|dirs| dirs.data_dir().join("preferences.json"));
        if path.is_none() {
            warn!("No data directory available, preferences will not persist");
        }
        Self { path }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store that never touches the filesystem.
    pub const fn ephemeral() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read preferences. Missing or unreadable files yield the defaults.
    pub fn load(&self) -> Preferences {
        let Some(path) = &self.path else {
            return Preferences::default();
        };

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!("Ignoring malformed preferences at {}: {e}", path.display());
                    Preferences::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => {
                warn!("Failed to read preferences at {}: {e}", path.display());
                Preferences::default()
            }
        }
    }

    /// Write preferences, creating the parent directory if needed.
    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(prefs)?)?;
        debug!("Saved preferences to {}", path.display());
        Ok(())
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}
