//! Blob storage backed by the local filesystem.
//!
//! Extraction results written by the remote service are read back either over
//! HTTP(S) or from the shared volume; documents produced here are written under
//! `BLOB_ROOT/<user_id>/`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::common::UserId;
use crate::kernel::BaseBlobStore;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    http_client: reqwest::Client,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let location = location.strip_prefix("file://").unwrap_or(location);
        let path = Path::new(location);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl BaseBlobStore for FsBlobStore {
    async fn fetch_text(&self, location: &str) -> Result<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self
                .http_client
                .get(location)
                .send()
                .await
                .with_context(|| format!("Failed to download {}", location))?;

            let status = response.status();
            if !status.is_success() {
                bail!("Download of {} failed with HTTP {}", location, status);
            }
            return response
                .text()
                .await
                .with_context(|| format!("Failed to read body of {}", location));
        }

        let path = self.resolve(location);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn save_json(&self, owner: UserId, file_name: &str, content: &str) -> Result<String> {
        let dir = self.root.join(owner.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(format!("{}.json", sanitize_file_name(file_name)));
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(path = %path.display(), bytes = content.len(), "Blob saved");
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Keep file names to a portable character set.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "blob".to_string()
    } else {
        trimmed.to_string()
    }
}
