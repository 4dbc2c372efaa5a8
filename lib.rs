//! # VaultFS - Encrypted File Streaming Vault
//!
//! VaultFS stores uploaded files encrypted at rest with AES-256-CBC and
//! streams them back decrypted on demand, under strict memory, size, and
//! time bounds.
//!
//! ## Features
//!
//! - **Streaming pipelines**: files move through the cipher in 64KB chunks,
//!   never loaded into memory whole
//! - **Fail-fast driver**: one source, ordered transforms, one sink; the
//!   first error wins and every handle is released on every exit path
//! - **Bounded retrieval**: a pre-stream size ceiling and a wall-clock
//!   timeout guard every download
//! - **Atomic ingestion**: temp file plus rename, so a failed upload never
//!   leaves a partial artifact
//! - **Eager key validation**: the hex key/IV are decoded and length-checked
//!   at startup; bad material refuses to start
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultfs::{config::Config, file_ops::VaultFileOps};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load_with_env(Some("config.json"))?;
//!     let ctx = Arc::new(cfg.cipher_context()?);
//!     let ops = VaultFileOps::new(ctx, &cfg.upload_dir).with_limits(cfg.retrieve_limits());
//!
//!     // Encrypt an upload
//!     let mut upload = tokio::fs::File::open("report.pdf").await?;
//!     let record = ops.ingest_file("report.pdf", 1, &mut upload).await?;
//!
//!     // Stream it back decrypted
//!     let mut out = tokio::io::stdout();
//!     ops.retrieve(&record.storage_name, &mut out).await?;
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod config;
pub mod content_type;
pub mod error;
pub mod file_ops;
pub mod metadata;
pub mod pipeline;

// Re-export common types for convenience
pub use error::VaultFsError;
