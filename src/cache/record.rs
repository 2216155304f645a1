//! Persisted manifest hash records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Digest used for manifest hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// The baseline hash of a dependency manifest.
///
/// Written only after the install it guards succeeded (or as the bootstrap
/// baseline). `recorded_at` is informational and never compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Manifest the hash was computed from, as configured.
    pub manifest_path: PathBuf,

    /// Hex-encoded digest of the manifest content.
    pub stored_hash: String,

    /// Digest algorithm.
    #[serde(default)]
    pub algorithm: HashAlgorithm,

    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Create a record stamped with the current time.
    pub fn new(manifest_path: impl Into<PathBuf>, stored_hash: impl Into<String>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            stored_hash: stored_hash.into(),
            algorithm: HashAlgorithm::Sha256,
            recorded_at: Utc::now(),
        }
    }

    /// Load a record. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read cache record {}", path.display()))
            }
        };

        let record = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt cache record {}", path.display()))?;
        Ok(Some(record))
    }

    /// Persist the record atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move cache record into {}", path.display()))?;
        Ok(())
    }
}

/// SHA-256 of a file's bytes, hex encoded.
///
/// Only content is hashed, so the result does not depend on timestamps.
pub fn hash_manifest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..]))
}
