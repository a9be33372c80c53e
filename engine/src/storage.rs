//! Filesystem collaborator for flyer campaigns.
//!
//! Each campaign gets a write-once directory named from its start timestamp
//! and sender, holding the original template plus one rendered image per
//! recipient phone number.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::info;

/// Root-relative directory where campaign folders are created.
const FLYER_SUBDIR: &str = "flyers";

/// File name of the uploaded template inside a campaign directory.
const TEMPLATE_FILE: &str = "template_original.png";

pub struct FlyerStorage {
    root: PathBuf,
}

impl FlyerStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        FlyerStorage {
            root: data_dir.into().join(FLYER_SUBDIR),
        }
    }

    /// Directory name for a campaign started now by this sender, e.g.
    /// `2026-08-23T10-15-30-123Z_Jane_Doe`.
    pub fn campaign_dir_name(sender_name: &str) -> String {
        let timestamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        let sender = sender_name.split_whitespace().collect::<Vec<_>>().join("_");
        format!("{timestamp}_{sender}")
    }

    /// Create the campaign directory and return its path.
    pub async fn create_campaign_dir(&self, dir_name: &str) -> Result<PathBuf> {
        let dir = self.root.join(dir_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create campaign directory")?;
        info!(dir = %dir.display(), "campaign_dir_created");
        Ok(dir)
    }

    /// Store the uploaded template inside the campaign directory.
    pub async fn save_template(&self, dir: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(dir.join(TEMPLATE_FILE), bytes)
            .await
            .context("Failed to save campaign template")
    }

    /// Store one rendered flyer, keyed by recipient phone.
    pub async fn save_rendered(&self, dir: &Path, phone: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(dir.join(format!("{phone}.png")), bytes)
            .await
            .context("Failed to save rendered flyer")
    }
}
