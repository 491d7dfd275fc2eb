use serde::{Deserialize, Serialize};

use crate::constants::DELETED_TITLE_PREFIX;

/// Moderation status of a work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Pending,
    Active,
}

impl WorkStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
        }
    }

    /// Parse a stored status. `approved` is accepted as a legacy alias of `active`.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" | "approved" => Some(Self::Active),
            _ => None,
        }
    }
}

/// Where a work stands in preview extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Pending,
    Done,
    NoImages,
    Failed,
    /// The archive format cannot be unpacked here (RAR); never retried.
    Unsupported,
}

impl PreviewStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::NoImages => "no_images",
            Self::Failed => "failed",
            Self::Unsupported => "unsupported",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "done" => Some(Self::Done),
            "no_images" => Some(Self::NoImages),
            "failed" => Some(Self::Failed),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }
}

/// A course work listed in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Work {
    pub id: i64,
    pub title: String,
    pub work_type: String,
    pub subject: String,
    pub folder_path: Option<String>,
    pub download_url: Option<String>,
    pub preview_image_url: Option<String>,
    pub status: String,
    pub preview_status: String,
    pub preview_attempts: i64,
    pub preview_error: Option<String>,
    pub preview_lease_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Work {
    #[must_use]
    pub fn status_enum(&self) -> Option<WorkStatus> {
        WorkStatus::from_str(&self.status)
    }

    #[must_use]
    pub fn preview_status_enum(&self) -> Option<PreviewStatus> {
        PreviewStatus::from_str(&self.preview_status)
    }

    /// Soft-deleted works keep their row but carry a title marker.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.title.starts_with(DELETED_TITLE_PREFIX)
    }
}

/// Data for inserting a new work.
#[derive(Debug, Clone)]
pub struct NewWork {
    pub title: String,
    pub work_type: String,
    pub subject: String,
    pub folder_path: Option<String>,
    pub download_url: Option<String>,
    pub status: WorkStatus,
}

/// A catalog category with the number of listed works.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub name: String,
    pub works_count: i64,
}
