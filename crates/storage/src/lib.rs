use directories::ProjectDirs;
use doc_model::Preferences;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

const PREFS_SCHEMA_VERSION: u32 = 1;
const PREFS_FILE_NAME: &str = "preferences.json";

/// Overrides the platform data directory when set to a non-empty path.
pub const DATA_DIR_ENV: &str = "PDF_ANNOTATOR_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("preferences file has schema version {found}, expected at most {PREFS_SCHEMA_VERSION}")]
    UnsupportedVersion { found: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferencesEnvelope {
    version: u32,
    preferences: Preferences,
}

impl Storage {
    /// Uses `PDF_ANNOTATOR_DATA_DIR` when set, the platform data dir otherwise.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::resolve(std::env::var_os(DATA_DIR_ENV))
    }

    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfAnnotator", "PdfAnnotator")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(override_dir: Option<OsString>) -> Result<Self, StorageError> {
        match override_dir.filter(|dir| !dir.is_empty()) {
            Some(dir) => Ok(Self::with_root(dir)),
            None => Self::from_default_project(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.root.join(PREFS_FILE_NAME)
    }

    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        let path = self.preferences_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no stored preferences, using defaults");
            return Ok(Preferences::default());
        }

        let bytes = fs::read(&path)?;
        let envelope: PreferencesEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > PREFS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion { found: envelope.version });
        }

        tracing::debug!(path = %path.display(), "loaded preferences");
        Ok(envelope.preferences)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            PreferencesEnvelope { version: PREFS_SCHEMA_VERSION, preferences: preferences.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        let path = self.preferences_path();
        fs::write(&path, bytes)?;

        tracing::debug!(path = %path.display(), "saved preferences");
        Ok(())
    }
}
