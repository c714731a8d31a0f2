use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::{ModelParameters, ModelShape};

/// Bumped whenever the persisted layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

const MODEL_FILE: &str = "model.json";
const CHECKSUM_FILE: &str = "model.sha256";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No stored model under key '{0}'")]
    NotFound(String),
    #[error("Invalid model key '{0}'")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },
    #[error("Shape mismatch: stored model is {found}, current corpus needs {expected}")]
    ShapeMismatch { expected: String, found: String },
    #[error("Stored model was trained on a different vocabulary or label set")]
    FingerprintMismatch,
}

/// Everything written to disk for one trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    pub format_version: u32,
    pub shape: ModelShape,
    /// Hash over the vocabulary and label set the model was trained on
    pub fingerprint: String,
    pub labels: Vec<String>,
    pub parameters: ModelParameters,
}

/// Saves and restores trained model parameters under string keys.
///
/// Each key owns a directory holding the JSON blob and its SHA-256 checksum.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    /// Creates a new ModelStore under the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("KOTAE_CACHE") {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("kotae").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("kotae").join("models");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("kotae").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, key: &str) -> PathBuf {
        self.models_dir.join(key).join(MODEL_FILE)
    }

    pub fn get_checksum_path(&self, key: &str) -> PathBuf {
        self.models_dir.join(key).join(CHECKSUM_FILE)
    }

    /// Checks that a key can safely name a directory
    pub fn validate_key(key: &str) -> Result<(), StoreError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.chars().any(char::is_control);
        if valid {
            Ok(())
        } else {
            Err(StoreError::InvalidKey(key.to_string()))
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        Self::validate_key(key).is_ok() && self.get_model_path(key).exists()
    }

    /// Writes the model blob and its checksum.
    ///
    /// Each file is written next to its destination and renamed into place,
    /// so a reader never sees a half-written file.
    pub fn save(&self, key: &str, model: &PersistedModel) -> Result<(), StoreError> {
        Self::validate_key(key)?;
        let blob = serde_json::to_vec(model)?;
        let hash = sha256_hex(&blob);

        let model_path = self.get_model_path(key);
        if let Some(parent) = model_path.parent() {
            log::debug!("Creating model directory: {:?}", parent);
            fs::create_dir_all(parent)?;
        }

        log::info!("Writing {} bytes to {:?}", blob.len(), model_path);
        write_replacing(&model_path, &blob)?;
        write_replacing(&self.get_checksum_path(key), hash.as_bytes())?;
        Ok(())
    }

    /// Reads the model stored under `key` and checks it fits the caller.
    ///
    /// # Errors
    /// - `NotFound` if nothing is stored under `key`
    /// - `HashMismatch` or `SerializationError` if the blob is corrupt
    /// - `ShapeMismatch` if the stored shape differs from `expected_shape`
    /// - `FingerprintMismatch` if the shape fits but the vocabulary or labels changed
    pub fn load(
        &self,
        key: &str,
        expected_shape: &ModelShape,
        fingerprint: &str,
    ) -> Result<PersistedModel, StoreError> {
        Self::validate_key(key)?;
        let model_path = self.get_model_path(key);
        if !model_path.exists() {
            return Err(StoreError::NotFound(key.to_string()));
        }

        log::info!("Loading stored model from {:?}", model_path);
        let blob = fs::read(&model_path)?;
        let expected_hash = fs::read_to_string(self.get_checksum_path(key))?;
        let actual_hash = sha256_hex(&blob);
        if expected_hash.trim() != actual_hash {
            log::error!("Model hash mismatch: expected {}, got {}", expected_hash.trim(), actual_hash);
            return Err(StoreError::HashMismatch {
                expected: expected_hash.trim().to_string(),
                actual: actual_hash,
            });
        }

        let model: PersistedModel = serde_json::from_slice(&blob)?;
        if model.format_version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                found: model.format_version,
            });
        }
        if model.shape != *expected_shape || model.parameters.shape != model.shape {
            return Err(StoreError::ShapeMismatch {
                expected: expected_shape.to_string(),
                found: model.shape.to_string(),
            });
        }
        if model.fingerprint != fingerprint {
            return Err(StoreError::FingerprintMismatch);
        }
        Ok(model)
    }

    /// Deletes whatever is stored under `key`; missing keys are not an error
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        Self::validate_key(key)?;
        let dir = self.models_dir.join(key);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn write_replacing(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, contents)?;
    if let Err(e) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
