use crate::content_type;
use crate::error::VaultFsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Record describing one stored file, persisted as a JSON sidecar next to
/// the ciphertext (`<storage_name>.meta.json`).
///
/// `size` is the plaintext byte count; the bytes on disk are ciphertext
/// whenever `encrypted` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Uuid,
    pub original_name: String,
    pub storage_name: String,
    pub file_type: String,
    pub mime_type: String,
    pub size: u64,
    pub encrypted: bool,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn new(original_name: &str, storage_name: &str, owner_id: i64, size: u64) -> Self {
        let file_type = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let mime_type = content_type::resolve(&file_type).to_string();

        Self {
            id: Uuid::new_v4(),
            original_name: original_name.to_string(),
            storage_name: storage_name.to_string(),
            file_type,
            mime_type,
            size,
            encrypted: true,
            owner_id,
            created_at: Utc::now(),
        }
    }

    /// Write the sidecar next to the ciphertext at `storage_path`
    pub async fn record(&self, storage_path: &Path) -> Result<(), VaultFsError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VaultFsError::metadata(e.to_string()))?;
        fs::write(sidecar_path(storage_path), json).await?;
        Ok(())
    }

    /// Load the sidecar for the ciphertext at `storage_path`
    pub async fn load(storage_path: &Path) -> Result<Self, VaultFsError> {
        let meta_path = sidecar_path(storage_path);
        let content = fs::read_to_string(&meta_path).await?;
        serde_json::from_str(&content).map_err(|e| {
            VaultFsError::metadata(format!("parsing {}: {e}", meta_path.display()))
        })
    }
}

pub(crate) fn sidecar_path(storage_path: &Path) -> std::path::PathBuf {
    storage_path.with_extension("meta.json")
}
