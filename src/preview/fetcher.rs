use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::constants::ARCHIVE_FETCH_USER_AGENT;

const RAR_MAGIC: &[u8] = b"Rar!";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Container format recognised from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Zip,
    Rar,
    Unknown,
}

impl ArchiveKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::Unknown => "unknown",
        }
    }
}

/// Classify a container by its signature, ignoring any file extension.
#[must_use]
pub fn detect_archive_kind(bytes: &[u8]) -> ArchiveKind {
    if bytes.starts_with(RAR_MAGIC) {
        ArchiveKind::Rar
    } else if bytes.starts_with(ZIP_MAGIC) {
        ArchiveKind::Zip
    } else {
        ArchiveKind::Unknown
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid archive URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("download timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("download failed with HTTP status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("archive is larger than {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("unrecognized archive signature (first bytes: {0})")]
    UnrecognizedSignature(String),
}

/// A downloaded archive with a verified signature.
#[derive(Debug, Clone)]
pub struct FetchedArchive {
    pub url: String,
    pub kind: ArchiveKind,
    pub bytes: Vec<u8>,
}

impl FetchedArchive {
    /// Only ZIP containers can be unpacked here; RAR has no decoder available.
    #[must_use]
    pub fn can_extract(&self) -> bool {
        self.kind == ArchiveKind::Zip
    }
}

/// Percent-encode the path (and query) of an archive URL.
///
/// Object keys regularly contain Cyrillic names and spaces. Sequences that are
/// already percent-encoded are left alone, so encoding twice is harmless.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] for unparsable URLs or non-HTTP schemes.
pub fn encode_url_path(raw: &str) -> Result<String, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(url.to_string())
}

/// Downloads work archives over HTTP(S).
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: u64,
}

impl ArchiveFetcher {
    /// Create a fetcher with a request timeout and a body size ceiling.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(ARCHIVE_FETCH_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    /// Create a fetcher from application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.fetch_timeout, config.max_archive_bytes)
    }

    /// Download an archive and verify its signature.
    ///
    /// RAR archives are returned normally; check [`FetchedArchive::can_extract`]
    /// before unpacking.
    ///
    /// # Errors
    ///
    /// Returns a distinct [`FetchError`] for timeouts, non-2xx responses,
    /// network failures, oversized bodies and unknown signatures.
    pub async fn fetch(&self, raw_url: &str) -> Result<FetchedArchive, FetchError> {
        let url = encode_url_path(raw_url)?;
        debug!(url = %url, "Downloading archive");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(&e))? {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        let kind = detect_archive_kind(&bytes);
        if kind == ArchiveKind::Unknown {
            return Err(FetchError::UnrecognizedSignature(signature_hex(&bytes)));
        }

        info!(url = %url, kind = kind.as_str(), size = bytes.len(), "Archive downloaded");

        Ok(FetchedArchive { url, kind, bytes })
    }

    fn classify(&self, error: &reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

fn signature_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "empty body".to_string();
    }
    bytes
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
