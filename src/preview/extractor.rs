use std::io::{Cursor, Read, Seek};

use image::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

static PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];
const OFFICE_EXTENSIONS: &[&str] = &["docx", "pptx", "xlsx"];

/// How many preview images to take and how large an entry may be.
#[derive(Debug, Clone)]
pub struct PreviewSelection {
    pub max_images: usize,
    pub max_entry_bytes: u64,
    /// Ceiling for embedded Office documents opened to look for images.
    pub max_nested_bytes: u64,
}

impl Default for PreviewSelection {
    fn default() -> Self {
        Self {
            max_images: 1,
            max_entry_bytes: 20 * 1024 * 1024,
            max_nested_bytes: 100 * 1024 * 1024,
        }
    }
}

/// An image pulled out of an archive.
#[derive(Debug, Clone)]
pub struct PreviewImage {
    pub entry_name: String,
    pub extension: &'static str,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not a readable ZIP archive: {0}")]
    InvalidArchive(#[source] zip::result::ZipError),
    #[error("failed to read archive entry {name}: {message}")]
    Entry { name: String, message: String },
}

#[derive(Debug)]
struct Candidate {
    index: usize,
    name: String,
    size: u64,
    page: Option<u64>,
}

/// Extract leading preview images from ZIP bytes.
///
/// Image entries are ranked by the first number in their file name (unnumbered
/// entries last), then by their stored order, and at most
/// `selection.max_images` are returned. When the archive holds no images at
/// its top level, embedded `.docx`/`.pptx`/`.xlsx` documents are searched for
/// media. An empty result means the archive is valid but has nothing to show.
///
/// # Errors
///
/// Returns an error if the bytes are not a ZIP archive or an entry cannot be read.
pub fn extract_previews(
    data: &[u8],
    selection: &PreviewSelection,
) -> Result<Vec<PreviewImage>, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(ExtractError::InvalidArchive)?;

    let mut images = Vec::new();
    collect_images(&mut archive, selection, false, &mut images)?;
    if !images.is_empty() {
        return Ok(images);
    }

    for (index, name) in office_documents(&mut archive)? {
        if images.len() >= selection.max_images {
            break;
        }

        let nested = match read_entry(&mut archive, index, &name, selection.max_nested_bytes)? {
            Some(bytes) => bytes,
            None => continue,
        };

        let mut nested_archive = match ZipArchive::new(Cursor::new(nested.as_slice())) {
            Ok(a) => a,
            Err(e) => {
                debug!(entry = %name, error = %e, "Embedded document is not a ZIP container");
                continue;
            }
        };

        let remaining = PreviewSelection {
            max_images: selection.max_images - images.len(),
            ..selection.clone()
        };
        let mut found = Vec::new();
        collect_images(&mut nested_archive, &remaining, true, &mut found)?;
        for mut image in found {
            image.entry_name = format!("{name}/{}", image.entry_name);
            images.push(image);
        }
    }

    Ok(images)
}

fn collect_images<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    selection: &PreviewSelection,
    media_only: bool,
    out: &mut Vec<PreviewImage>,
) -> Result<(), ExtractError> {
    let mut candidates = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| ExtractError::Entry {
            name: format!("#{index}"),
            message: e.to_string(),
        })?;
        let name = entry.name().to_string();
        if entry.is_dir() || is_junk_entry(&name) {
            continue;
        }
        if media_only && !name.contains("/media/") {
            continue;
        }
        if !has_extension(&name, IMAGE_EXTENSIONS) {
            continue;
        }
        candidates.push(Candidate {
            index,
            page: page_number(&name),
            size: entry.size(),
            name,
        });
    }

    candidates.sort_by_key(|c| (c.page.is_none(), c.page, c.index));

    for candidate in candidates {
        if out.len() >= selection.max_images {
            break;
        }
        if candidate.size > selection.max_entry_bytes {
            debug!(entry = %candidate.name, size = candidate.size, "Skipping oversized image");
            continue;
        }

        let Some(data) =
            read_entry(archive, candidate.index, &candidate.name, selection.max_entry_bytes)?
        else {
            continue;
        };

        let Some(extension) = sniff_image_extension(&data) else {
            debug!(entry = %candidate.name, "Entry has an image extension but is not an image");
            continue;
        };

        out.push(PreviewImage {
            entry_name: candidate.name,
            extension,
            content_type: mime_guess::from_ext(extension)
                .first_or_octet_stream()
                .to_string(),
            data,
        });
    }

    Ok(())
}

fn office_documents<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<(usize, String)>, ExtractError> {
    let mut documents = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| ExtractError::Entry {
            name: format!("#{index}"),
            message: e.to_string(),
        })?;
        let name = entry.name().to_string();
        if !entry.is_dir() && !is_junk_entry(&name) && has_extension(&name, OFFICE_EXTENSIONS) {
            documents.push((index, name));
        }
    }
    Ok(documents)
}

/// Read an entry fully, or `None` when it decompresses past `limit`.
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    name: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let entry = archive.by_index(index).map_err(|e| ExtractError::Entry {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let mut data = Vec::new();
    entry
        .take(limit + 1)
        .read_to_end(&mut data)
        .map_err(|e| ExtractError::Entry {
            name: name.to_string(),
            message: e.to_string(),
        })?;

    if data.len() as u64 > limit {
        debug!(entry = %name, limit, "Entry exceeds size limit");
        return Ok(None);
    }

    Ok(Some(data))
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn is_junk_entry(path: &str) -> bool {
    let name = file_name(path);
    path.starts_with("__MACOSX/")
        || path.contains("/__MACOSX/")
        || name.starts_with('.')
        || name.eq_ignore_ascii_case("thumbs.db")
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    file_name(path)
        .rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// First number in the file stem, treated as a page number.
fn page_number(path: &str) -> Option<u64> {
    let name = file_name(path);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    PAGE_NUMBER
        .find(stem)
        .and_then(|m| m.as_str().parse().ok())
}

fn sniff_image_extension(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}
