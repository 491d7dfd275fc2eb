//! Folder-name parsing.
//!
//! Catalog folders are named `<title> (<work type>)`, but titles and work
//! types can both contain parentheses of their own, so the split point is
//! ambiguous. [`FolderParseMode`] makes the choice explicit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::UNKNOWN_WORK_TYPE;

/// Lazy title, then the final parenthesised segment up to the end of the string.
static LAST_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\(([^()]+)\)\s*$").unwrap());

/// Used when the final segment itself holds parentheses: `"A (B (C))"`.
static LAST_PAIR_NESTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\((.+?)\)\s*$").unwrap());

/// Title up to the first `(`, work type runs to the final `)`.
static FIRST_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^()]+?)\s*\((.+)\)\s*$").unwrap());

/// Where a folder name is split into title and work type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderParseMode {
    /// Split at the last `(...)` pair: `"A (B) (C)"` is title `"A (B)"`, type `"C"`.
    #[default]
    LastPair,
    /// Split at the first `(`: `"A (B (C))"` is title `"A"`, type `"B (C)"`.
    FirstPair,
}

impl FolderParseMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastPair => "last",
            Self::FirstPair => "first",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "last" | "last_pair" => Some(Self::LastPair),
            "first" | "first_pair" => Some(Self::FirstPair),
            _ => None,
        }
    }
}

/// Title and work type extracted from a folder name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFolderName {
    pub title: String,
    pub work_type: String,
}

/// Parse a folder name using the default [`FolderParseMode::LastPair`] split.
#[must_use]
pub fn parse_folder_name(name: &str) -> ParsedFolderName {
    parse_folder_name_with(name, FolderParseMode::default())
}

/// Parse a folder name with an explicit split mode.
///
/// Names without a parenthesised suffix become the title, paired with the
/// `"unknown type"` sentinel. No length limits are applied here.
#[must_use]
pub fn parse_folder_name_with(name: &str, mode: FolderParseMode) -> ParsedFolderName {
    let parsed = match mode {
        FolderParseMode::LastPair => {
            split_with(&LAST_PAIR, name).or_else(|| split_with(&LAST_PAIR_NESTED, name))
        }
        FolderParseMode::FirstPair => split_with(&FIRST_PAIR, name),
    };

    parsed.unwrap_or_else(|| ParsedFolderName {
        title: name.trim().to_string(),
        work_type: UNKNOWN_WORK_TYPE.to_string(),
    })
}

fn split_with(pattern: &Regex, name: &str) -> Option<ParsedFolderName> {
    let caps = pattern.captures(name)?;
    let title = caps.get(1)?.as_str().trim();
    let work_type = caps.get(2)?.as_str().trim();
    if title.is_empty() || work_type.is_empty() {
        return None;
    }
    Some(ParsedFolderName {
        title: title.to_string(),
        work_type: work_type.to_string(),
    })
}
