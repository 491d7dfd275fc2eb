//! Shared constants used across the application.

/// User agent string used when downloading archives.
///
/// Some file hosts refuse non-browser clients, so requests present themselves
/// as a regular desktop browser.
pub const ARCHIVE_FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Title prefix marking a soft-deleted work.
pub const DELETED_TITLE_PREFIX: &str = "[DELETED]";

/// Work type assigned when a folder name carries no parenthesised suffix.
pub const UNKNOWN_WORK_TYPE: &str = "unknown type";

/// Storage limits of the `works` table, in characters.
pub const MAX_TITLE_CHARS: usize = 1000;
pub const MAX_WORK_TYPE_CHARS: usize = 100;
pub const MAX_SUBJECT_CHARS: usize = 200;

/// Object key prefix for uploaded preview images.
pub const PREVIEW_KEY_PREFIX: &str = "previews";
