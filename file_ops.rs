//! High-level vault file operations.
//!
//! This module provides [`VaultFileOps`], the primary interface for ingesting
//! plaintext into encrypted storage and streaming it back out, built on the
//! generic pipeline driver.
//!
//! ## Guarantees
//!
//! - Ingestion writes through a uniquely named temp file and renames on
//!   success: a failed ingest never leaves a partial file at the destination.
//! - Retrieval stats the ciphertext before opening it and rejects oversized
//!   sources without streaming a single byte.
//! - Retrieval runs under a wall-clock budget; timer expiry and early sink
//!   closure both tear the pipeline down exactly once.
//! - The pipeline itself never logs; logging happens here, after an outcome
//!   is known.

use crate::cipher::CipherContext;
use crate::error::VaultFsError;
use crate::metadata::{self, StoredFile};
use crate::pipeline::{self, Transform};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Operating constraints for the retrieval pipeline
#[derive(Debug, Clone, Copy)]
pub struct RetrieveLimits {
    /// Hard ceiling on ciphertext size, checked before opening the source
    pub max_bytes: u64,
    /// Wall-clock budget for the whole retrieval
    pub timeout: Duration,
}

impl Default for RetrieveLimits {
    fn default() -> Self {
        Self {
            max_bytes: crate::config::DEFAULT_MAX_RETRIEVE_BYTES,
            timeout: Duration::from_secs(crate::config::DEFAULT_RETRIEVE_TIMEOUT_SECS),
        }
    }
}

pub struct VaultFileOps {
    ctx: Arc<CipherContext>,
    root: PathBuf,
    limits: RetrieveLimits,
}

impl VaultFileOps {
    pub fn new(ctx: Arc<CipherContext>, root: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            root: root.into(),
            limits: RetrieveLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RetrieveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Encrypt a plaintext stream into storage under `name`.
    ///
    /// Writes ciphertext to a temp file and atomically renames on success;
    /// on any failure the temp file is removed and nothing is left at the
    /// destination. Returns the plaintext byte count observed at the source.
    pub async fn ingest<R>(&self, name: &str, reader: &mut R) -> Result<u64, VaultFsError>
    where
        R: AsyncRead + Unpin,
    {
        debug!(file = name, "ingesting file");
        fs::create_dir_all(&self.root).await?;
        let dest = self.root.join(name);
        let tmp = self.root.join(format!("{name}.{}.part", Uuid::new_v4().simple()));

        let mut file = fs::File::create(&tmp).await?;
        let mut stages: Vec<Box<dyn Transform>> = vec![Box::new(self.ctx.encrypt_stage())];

        let outcome = match pipeline::drive(reader, &mut stages, &mut file).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(file = name, error = %e, "ingestion failed, removing partial file");
                drop(file);
                if let Err(rm) = fs::remove_file(&tmp).await {
                    warn!(path = %tmp.display(), error = %rm, "could not remove partial file");
                }
                return Err(e);
            }
        };

        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, &dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        info!(
            file = name,
            plaintext_bytes = outcome.bytes_in,
            ciphertext_bytes = outcome.bytes_out,
            "file ingested"
        );
        Ok(outcome.bytes_in)
    }

    /// Ingest a user upload end to end: generate a server-side storage name,
    /// run the ingestion pipeline, and persist the [`StoredFile`] record.
    pub async fn ingest_file<R>(
        &self,
        original_name: &str,
        owner_id: i64,
        reader: &mut R,
    ) -> Result<StoredFile, VaultFsError>
    where
        R: AsyncRead + Unpin,
    {
        // Storage name is server-generated, independent of the upload name
        let storage_name = Uuid::new_v4().simple().to_string();
        let size = self.ingest(&storage_name, reader).await?;

        let record = StoredFile::new(original_name, &storage_name, owner_id, size);
        record.record(&self.root.join(&storage_name)).await?;
        Ok(record)
    }

    /// Decrypt the stored file `name` into `sink`.
    ///
    /// Fails with `LimitExceeded` before opening a read handle if the
    /// ciphertext exceeds the configured ceiling, and with `Timeout` if the
    /// stream does not complete within the budget. Returns the plaintext
    /// byte count delivered to the sink.
    pub async fn retrieve<W>(&self, name: &str, sink: &mut W) -> Result<u64, VaultFsError>
    where
        W: AsyncWrite + Unpin,
    {
        debug!(file = name, "retrieving file");
        let path = self.root.join(name);

        // Size guard runs on metadata alone, before any read handle exists
        let stat = fs::metadata(&path).await?;
        if stat.len() > self.limits.max_bytes {
            warn!(
                file = name,
                size = stat.len(),
                limit = self.limits.max_bytes,
                "source exceeds retrieval ceiling"
            );
            return Err(VaultFsError::LimitExceeded {
                actual: stat.len(),
                limit: self.limits.max_bytes,
            });
        }

        let mut file = fs::File::open(&path).await?;
        let mut stages: Vec<Box<dyn Transform>> = vec![Box::new(self.ctx.decrypt_stage())];

        let result =
            pipeline::drive_with_timeout(&mut file, &mut stages, sink, self.limits.timeout).await;

        match &result {
            Ok(outcome) => info!(
                file = name,
                plaintext_bytes = outcome.bytes_out,
                "file retrieved"
            ),
            Err(e) => error!(file = name, error = %e, "retrieval failed"),
        }
        result.map(|outcome| outcome.bytes_out)
    }

    /// Check if a stored file exists
    pub async fn exists(&self, name: &str) -> bool {
        let path = self.root.join(name);
        fs::try_exists(&path).await.unwrap_or(false)
    }

    /// Delete a stored file and its metadata sidecar (idempotent)
    pub async fn delete_file(&self, name: &str) -> Result<(), VaultFsError> {
        info!(file = name, "deleting stored file");
        let path = self.root.join(name);
        let meta_path = metadata::sidecar_path(&path);

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await?;
            debug!(file = name, "ciphertext deleted");
        } else {
            warn!(file = name, "file not found during delete");
        }

        if fs::try_exists(&meta_path).await.unwrap_or(false) {
            fs::remove_file(&meta_path).await.ok(); // Best effort
            debug!(file = name, "metadata sidecar deleted");
        }

        Ok(())
    }

    /// List all stored files.
    /// Returns a vector of (storage_name, ciphertext_bytes, has_metadata) tuples
    pub async fn list_files(&self) -> Result<Vec<(String, u64, bool)>, VaultFsError> {
        let mut files = Vec::new();

        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(files);
        }

        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();

            // Skip directories, sidecars, and abandoned temp files
            let ext = path.extension().and_then(|e| e.to_str());
            if path.is_dir() || ext == Some("json") || ext == Some("part") {
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let stat = entry.metadata().await?;
            let has_metadata = fs::try_exists(metadata::sidecar_path(&path))
                .await
                .unwrap_or(false);

            files.push((name, stat.len(), has_metadata));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Read the stored-file record for `name`
    pub async fn get_metadata(&self, name: &str) -> Result<StoredFile, VaultFsError> {
        StoredFile::load(&self.root.join(name)).await
    }
}
