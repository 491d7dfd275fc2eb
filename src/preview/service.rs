use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::extractor::{extract_previews, PreviewSelection};
use super::fetcher::{ArchiveFetcher, ArchiveKind};
use crate::config::Config;
use crate::constants::PREVIEW_KEY_PREFIX;
use crate::db::{set_work_preview_image, Database, Work};
use crate::s3::ObjectStore;

/// Conclusion reported for archives that are valid but cannot be unpacked here.
pub const RAR_UNSUPPORTED: &str =
    "RAR archive detected; RAR decompression is not available in this environment";

/// Result of generating previews for one work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PreviewOutcome {
    /// At least one preview was uploaded and the work updated.
    Extracted { count: usize, urls: Vec<String> },
    /// The archive is valid but holds nothing usable as a preview.
    NoImages,
    /// The archive format is a known limitation, not a transient failure.
    Unsupported { reason: String },
    Failed { error: String },
}

impl PreviewOutcome {
    fn failed(error: impl std::fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }
}

/// Something that turns a work's archive into preview images.
#[async_trait]
pub trait PreviewService: Send + Sync {
    /// Generate previews for `work`. Never returns an error; failures are
    /// reported as [`PreviewOutcome::Failed`].
    async fn generate(&self, work: &Work) -> PreviewOutcome;
}

/// Request body of the preview extraction endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub work_id: Option<i64>,
    pub extract_from_archive: Option<bool>,
}

/// Response body of the preview extraction endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unsupported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<PreviewOutcome> for ExtractResponse {
    fn from(outcome: PreviewOutcome) -> Self {
        match outcome {
            PreviewOutcome::Extracted { count, urls } => Self {
                success: true,
                count,
                urls,
                ..Self::default()
            },
            PreviewOutcome::NoImages => Self {
                success: true,
                ..Self::default()
            },
            PreviewOutcome::Unsupported { reason } => Self {
                success: false,
                unsupported: true,
                error: Some(reason),
                ..Self::default()
            },
            PreviewOutcome::Failed { error } => Self {
                success: false,
                error: Some(error),
                ..Self::default()
            },
        }
    }
}

impl ExtractResponse {
    /// Interpret a response received from a remote extractor.
    #[must_use]
    pub fn into_outcome(self) -> PreviewOutcome {
        if self.unsupported {
            return PreviewOutcome::Unsupported {
                reason: self.error.unwrap_or_else(|| RAR_UNSUPPORTED.to_string()),
            };
        }
        if !self.success {
            return PreviewOutcome::Failed {
                error: self
                    .error
                    .unwrap_or_else(|| "preview service reported failure".to_string()),
            };
        }
        if self.count == 0 {
            PreviewOutcome::NoImages
        } else {
            PreviewOutcome::Extracted {
                count: self.count,
                urls: self.urls,
            }
        }
    }
}

/// Object key for a preview image: random suffix, never derived from content.
#[must_use]
pub fn preview_key(work_id: i64, extension: &str) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{PREVIEW_KEY_PREFIX}/{work_id}/{suffix}.{extension}")
}

/// Fetches, extracts and uploads previews in-process.
pub struct LocalPreviewService {
    db: Database,
    fetcher: ArchiveFetcher,
    store: Arc<dyn ObjectStore>,
    selection: PreviewSelection,
}

impl LocalPreviewService {
    #[must_use]
    pub fn new(
        db: Database,
        fetcher: ArchiveFetcher,
        store: Arc<dyn ObjectStore>,
        selection: PreviewSelection,
    ) -> Self {
        Self {
            db,
            fetcher,
            store,
            selection,
        }
    }

    /// Build the service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive fetcher cannot be created.
    pub fn from_config(config: &Config, db: Database, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let selection = PreviewSelection {
            max_images: config.preview_max_images,
            ..PreviewSelection::default()
        };
        Ok(Self::new(
            db,
            ArchiveFetcher::from_config(config)?,
            store,
            selection,
        ))
    }

    /// The fetcher used to download archives.
    #[must_use]
    pub fn fetcher(&self) -> &ArchiveFetcher {
        &self.fetcher
    }

    async fn try_generate(&self, work: &Work) -> Result<PreviewOutcome> {
        let Some(download_url) = work.download_url.as_deref() else {
            return Ok(PreviewOutcome::failed("work has no download URL"));
        };

        let archive = match self.fetcher.fetch(download_url).await {
            Ok(archive) => archive,
            Err(e) => {
                warn!(work_id = work.id, error = %e, "Archive download failed");
                return Ok(PreviewOutcome::failed(e));
            }
        };

        if archive.kind == ArchiveKind::Rar {
            info!(work_id = work.id, "RAR archive cannot be unpacked, skipping");
            return Ok(PreviewOutcome::Unsupported {
                reason: RAR_UNSUPPORTED.to_string(),
            });
        }

        let selection = self.selection.clone();
        let bytes = archive.bytes;
        let extracted = tokio::task::spawn_blocking(move || extract_previews(&bytes, &selection))
            .await
            .context("Preview extraction task panicked")?;

        let images = match extracted {
            Ok(images) => images,
            Err(e) => {
                warn!(work_id = work.id, error = %e, "Preview extraction failed");
                return Ok(PreviewOutcome::failed(e));
            }
        };

        if images.is_empty() {
            debug!(work_id = work.id, "Archive holds no preview images");
            return Ok(PreviewOutcome::NoImages);
        }

        let mut urls = Vec::with_capacity(images.len());
        for image in &images {
            let key = preview_key(work.id, image.extension);
            let url = self
                .store
                .put_public(&key, &image.data, &image.content_type)
                .await
                .with_context(|| format!("Failed to upload preview {}", image.entry_name))?;
            debug!(work_id = work.id, entry = %image.entry_name, key = %key, "Preview uploaded");
            urls.push(url);
        }

        set_work_preview_image(self.db.pool(), work.id, &urls[0]).await?;

        info!(work_id = work.id, count = urls.len(), "Previews extracted");
        Ok(PreviewOutcome::Extracted {
            count: urls.len(),
            urls,
        })
    }
}

#[async_trait]
impl PreviewService for LocalPreviewService {
    async fn generate(&self, work: &Work) -> PreviewOutcome {
        match self.try_generate(work).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(work_id = work.id, "Preview generation failed: {e:#}");
                PreviewOutcome::failed(format!("{e:#}"))
            }
        }
    }
}

/// Calls a separately deployed preview extraction endpoint.
pub struct RemotePreviewService {
    client: Client,
    endpoint: String,
}

impl RemotePreviewService {
    /// Create a client for the extraction endpoint at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PreviewService for RemotePreviewService {
    async fn generate(&self, work: &Work) -> PreviewOutcome {
        let request = ExtractRequest {
            work_id: Some(work.id),
            extract_from_archive: Some(true),
        };

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(work_id = work.id, "Preview service timed out");
                return PreviewOutcome::failed("preview service timed out");
            }
            Err(e) => {
                warn!(work_id = work.id, error = %e, "Preview service unreachable");
                return PreviewOutcome::failed(format!("preview service unreachable: {e}"));
            }
        };

        let status = response.status();
        match response.json::<ExtractResponse>().await {
            Ok(body) => body.into_outcome(),
            Err(e) => {
                warn!(work_id = work.id, status = %status, error = %e, "Unreadable preview service response");
                PreviewOutcome::failed(format!("preview service returned HTTP {}", status.as_u16()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_key_shape() {
        let key = preview_key(42, "png");
        assert!(key.starts_with("previews/42/"));
        assert!(key.ends_with(".png"));
        assert_eq!(key.len(), "previews/42/".len() + 16 + ".png".len());
        assert_ne!(preview_key(42, "png"), key);
    }

    #[test]
    fn test_extract_response_mapping() {
        let extracted = ExtractResponse::from(PreviewOutcome::Extracted {
            count: 1,
            urls: vec!["https://cdn/x.png".to_string()],
        });
        assert!(extracted.success);
        assert_eq!(extracted.count, 1);

        let unsupported = ExtractResponse::from(PreviewOutcome::Unsupported {
            reason: RAR_UNSUPPORTED.to_string(),
        });
        assert!(!unsupported.success);
        assert!(unsupported.unsupported);
        assert_eq!(
            unsupported.into_outcome(),
            PreviewOutcome::Unsupported {
                reason: RAR_UNSUPPORTED.to_string()
            }
        );
    }

    #[test]
    fn test_remote_body_interpretation() {
        let body: ExtractResponse = serde_json::from_str(r#"{"success": true, "count": 0}"#).unwrap();
        assert_eq!(body.into_outcome(), PreviewOutcome::NoImages);

        let body: ExtractResponse =
            serde_json::from_str(r#"{"success": false, "error": "boom"}"#).unwrap();
        assert_eq!(
            body.into_outcome(),
            PreviewOutcome::Failed {
                error: "boom".to_string()
            }
        );

        let body: ExtractResponse = serde_json::from_str(r#"{"success": true, "count": 2}"#).unwrap();
        assert_eq!(
            body.into_outcome(),
            PreviewOutcome::Extracted {
                count: 2,
                urls: Vec::new()
            }
        );
    }
}
