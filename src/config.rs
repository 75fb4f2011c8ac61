use crate::core::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable that overrides the settings file location.
pub const SETTINGS_ENV: &str = "CDB_SETTINGS";

static DEFAULTS: OnceCell<Settings> = OnceCell::new();

/// Process-wide connection defaults, parsed from a TOML file.
///
/// ```toml
/// DefaultServer = "/var/lib/cdb"
/// DefaultDatabase = "inventory.db"
/// DefaultSecurity = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    #[serde(default)]
    pub default_server: String,
    #[serde(default)]
    pub default_database: String,
    #[serde(default)]
    pub default_security: bool,
}

impl Settings {
    /// Loads settings from a TOML file at the given path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `$CDB_SETTINGS` if set, else `<config dir>/cdb/settings.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("cdb").join("settings.toml"))
    }
}

/// Returns the process-wide defaults, reading them on first use.
///
/// A missing or unreadable settings file yields empty defaults, which a
/// `Database` then rejects when it tries to connect.
pub fn defaults() -> &'static Settings {
    DEFAULTS.get_or_init(|| {
        let Some(path) = Settings::default_path() else {
            return Settings::default();
        };
        if !path.exists() {
            debug!("No settings file at {:?}, using empty defaults", path);
            return Settings::default();
        }
        Settings::load(&path).unwrap_or_else(|e| {
            warn!("Failed to load settings from {:?}: {}", path, e);
            Settings::default()
        })
    })
}
