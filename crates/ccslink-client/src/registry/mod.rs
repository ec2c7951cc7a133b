//! Device registration registry.
//!
//! Append-only: every REGISTER action appends the sender's registration id.
//! Callers treat failures as log-only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use ccslink_core::error::{CcsError, Result};

#[async_trait]
pub trait RegistrationRegistry: Send + Sync {
    async fn append(&self, identifier: &str) -> Result<()>;
}

/// One identifier per line in a plain text file.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegistrationRegistry for FileRegistry {
    async fn append(&self, identifier: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CcsError::RegistryWrite(format!("open {}: {e}", self.path.display())))?;

        let line = format!("{identifier}\n");
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CcsError::RegistryWrite(format!("write {}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| CcsError::RegistryWrite(format!("flush {}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), "registration id appended");
        Ok(())
    }
}
