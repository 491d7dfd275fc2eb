//! Archive preview pipeline.
//!
//! A work's archive is downloaded ([`fetcher`]), its leading images are pulled
//! out ([`extractor`]) and uploaded as public previews ([`service`]). The
//! [`batch`] coordinator sweeps the catalog for works still missing a preview.

pub mod batch;
pub mod extractor;
pub mod fetcher;
pub mod service;

pub use batch::{run_preview_batch, BatchOptions, BatchReport, BatchStats};
pub use extractor::{extract_previews, ExtractError, PreviewImage, PreviewSelection};
pub use fetcher::{detect_archive_kind, ArchiveFetcher, ArchiveKind, FetchError, FetchedArchive};
pub use service::{
    ExtractRequest, ExtractResponse, LocalPreviewService, PreviewOutcome, PreviewService,
    RemotePreviewService,
};
