//! Store configuration.
//!
//! Settings are read from `settings.toml` in the platform-specific config
//! folder, and documents live under the platform data folder:
//! - macOS: ~/Library/Application Support/com.docvault.docvault/
//! - Windows: %APPDATA%/docvault/docvault/
//! - Linux: ~/.config/docvault/ and ~/.local/share/docvault/

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};
use crate::storage::FsStorage;
use crate::store::{DEFAULT_FILE_NAME, DocumentStore};
use crate::worker::DEFAULT_CHANNEL_CAPACITY;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "docvault";
const APP_NAME: &str = "docvault";
const CONFIG_FILENAME: &str = "settings.toml";
const ORIGINS_DIR: &str = "origins";

/// Where and how the document is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory holding one private folder per origin.
    ///
    /// Defaults to `origins/` inside the platform data folder.
    pub root: Option<PathBuf>,

    /// Origin the store belongs to. Different origins never share a file.
    pub origin: String,

    /// Name of the document file.
    pub file_name: String,

    /// Inbound request buffering of the worker channel.
    pub channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            origin: "local".to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Path of the platform settings file, if the platform has one.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
    }

    /// Default base directory for origin folders.
    pub fn default_root() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
            .map(|dirs| dirs.data_dir().join(ORIGINS_DIR))
    }

    /// Read settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PersistenceError::Config {
            path: Some(path.to_path_buf()),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| PersistenceError::Config {
            path: Some(path.to_path_buf()),
            reason: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the platform settings file, falling back to defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("Could not determine settings path, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::info!("No settings file found at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                tracing::info!("Loaded settings from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("{}, using defaults", e.user_message());
                Self::default()
            }
        }
    }

    /// Check origin and file name.
    pub fn validate(&self) -> Result<()> {
        sanitize_origin(&self.origin)?;

        let mut components = Path::new(&self.file_name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(PersistenceError::Config {
                path: None,
                reason: format!("file name `{}` must be a single path component", self.file_name),
            });
        }
        Ok(())
    }

    /// Private directory of this config's origin.
    pub fn storage_root(&self) -> Result<PathBuf> {
        let base = match &self.root {
            Some(root) => root.clone(),
            None => Self::default_root().ok_or_else(|| PersistenceError::Config {
                path: None,
                reason: "no platform data directory; set `root`".to_string(),
            })?,
        };
        Ok(base.join(sanitize_origin(&self.origin)?))
    }

    /// Path of the document file.
    pub fn document_path(&self) -> Result<PathBuf> {
        Ok(self.storage_root()?.join(&self.file_name))
    }

    /// Build an on-disk store for this config. Nothing is opened yet.
    pub fn open_fs_store(&self) -> Result<DocumentStore<FsStorage>> {
        self.validate()?;
        let root = self.storage_root()?;
        Ok(DocumentStore::new(FsStorage::new(root), self.file_name.clone()))
    }
}

/// Map an origin label to a directory name.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so
/// `https://example.org:8443` maps to `https___example.org_8443`.
pub fn sanitize_origin(origin: &str) -> Result<String> {
    let name: String = origin
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(PersistenceError::Config {
            path: None,
            reason: format!("origin `{origin}` does not name a directory"),
        });
    }
    Ok(name)
}
