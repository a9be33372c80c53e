//! Credential persistence for the transport session.
//!
//! Credentials are saved on every update so a process restart resumes the
//! authenticated session without re-scanning a QR challenge.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Opaque credential material issued by the chat network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Device registration id bound to the linked account
    pub device_id: String,
    /// Serialized key material, treated as opaque by the engine
    pub key_material: String,
}

/// Store for transport credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credentials>>;
    async fn save(&self, creds: &Credentials) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// JSON-file-backed credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read credential file"),
        };
        let creds =
            serde_json::from_slice(&bytes).context("Failed to parse credential file")?;
        Ok(Some(creds))
    }

    async fn save(&self, creds: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create credential directory")?;
            }
        }
        let bytes = serde_json::to_vec_pretty(creds).context("Failed to serialize credentials")?;
        tokio::fs::write(&self.path, bytes)
            .await
            .context("Failed to write credential file")?;
        info!(path = %self.path.display(), "credentials_saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "credentials_cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove credential file"),
        }
    }
}
