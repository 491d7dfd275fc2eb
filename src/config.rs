use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::folder_name::FolderParseMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// How the batch coordinator reaches the preview extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    /// Fetch and extract in-process.
    Local,
    /// Call a separately deployed `/preview/extract` endpoint.
    Remote,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // S3 Storage
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_public_base_url: Option<String>,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,

    // Web Server
    pub web_host: String,
    pub web_port: u16,

    // Archive fetching
    pub fetch_timeout: Duration,
    pub max_archive_bytes: u64,

    // Preview extraction
    pub preview_mode: PreviewMode,
    pub preview_service_url: Option<String>,
    pub preview_service_timeout: Duration,
    pub preview_max_images: usize,
    pub preview_max_attempts: i64,
    pub preview_lease: Duration,
    pub batch_pacing: Duration,

    // Ingestion
    pub folder_parse_mode: FolderParseMode,

    // Administration
    pub admin_emails: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(required_env("DATABASE_PATH")?),

            // S3 Storage
            s3_bucket: required_env("S3_BUCKET")?,
            s3_region: env_or_default("S3_REGION", "us-east-1"),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            s3_public_base_url: optional_env("S3_PUBLIC_BASE_URL"),
            aws_access_key_id: required_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: required_env("AWS_SECRET_ACCESS_KEY")?,

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,

            // Archive fetching
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 60)?),
            max_archive_bytes: parse_env_u64("MAX_ARCHIVE_BYTES", 200 * 1024 * 1024)?,

            // Preview extraction
            preview_mode: parse_preview_mode(&env_or_default("PREVIEW_MODE", "local"))?,
            preview_service_url: optional_env("PREVIEW_SERVICE_URL"),
            preview_service_timeout: Duration::from_secs(parse_env_u64(
                "PREVIEW_SERVICE_TIMEOUT_SECS",
                120,
            )?),
            preview_max_images: parse_env_usize("PREVIEW_MAX_IMAGES", 1)?,
            preview_max_attempts: parse_env_u64("PREVIEW_MAX_ATTEMPTS", 3)? as i64,
            preview_lease: Duration::from_secs(parse_env_u64("PREVIEW_LEASE_SECS", 600)?),
            batch_pacing: Duration::from_millis(parse_env_u64("BATCH_PACING_MS", 1000)?),

            // Ingestion
            folder_parse_mode: parse_folder_parse_mode(&env_or_default(
                "FOLDER_PARSE_MODE",
                "last",
            ))?,

            // Administration
            admin_emails: parse_list(&env_or_default("ADMIN_EMAILS", "")),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3_bucket.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "S3_BUCKET".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.preview_mode == PreviewMode::Remote && self.preview_service_url.is_none() {
            return Err(ConfigError::MissingEnvVar("PREVIEW_SERVICE_URL".to_string()));
        }
        if self.preview_max_images == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PREVIEW_MAX_IMAGES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.preview_max_attempts < 1 {
            return Err(ConfigError::InvalidValue {
                name: "PREVIEW_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `email` belongs to the configured administrator allow-list.
    #[must_use]
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty()
            && self
                .admin_emails
                .iter()
                .any(|admin| admin.eq_ignore_ascii_case(email))
    }

    /// Configuration suitable for tests: no real credentials, no pacing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            s3_bucket: "test-bucket".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_public_base_url: Some("https://cdn.example.com".to_string()),
            aws_access_key_id: "test-access-key".to_string(),
            aws_secret_access_key: "test-secret-key".to_string(),
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            fetch_timeout: Duration::from_secs(5),
            max_archive_bytes: 10 * 1024 * 1024,
            preview_mode: PreviewMode::Local,
            preview_service_url: None,
            preview_service_timeout: Duration::from_secs(5),
            preview_max_images: 1,
            preview_max_attempts: 3,
            preview_lease: Duration::from_secs(600),
            batch_pacing: Duration::ZERO,
            folder_parse_mode: FolderParseMode::LastPair,
            admin_emails: vec!["admin@example.com".to_string()],
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_preview_mode(value: &str) -> Result<PreviewMode, ConfigError> {
    match value.to_lowercase().as_str() {
        "local" => Ok(PreviewMode::Local),
        "remote" => Ok(PreviewMode::Remote),
        _ => Err(ConfigError::InvalidValue {
            name: "PREVIEW_MODE".to_string(),
            message: format!("must be 'local' or 'remote', got '{value}'"),
        }),
    }
}

fn parse_folder_parse_mode(value: &str) -> Result<FolderParseMode, ConfigError> {
    FolderParseMode::from_str(value).ok_or_else(|| ConfigError::InvalidValue {
        name: "FOLDER_PARSE_MODE".to_string(),
        message: format!("must be 'last' or 'first', got '{value}'"),
    })
}
