//! Coursework marketplace backend.
//!
//! HTTP functions for browsing and favoriting course works, ingesting new
//! works from folder names, and a preview pipeline that downloads each work's
//! archive, extracts leading page images and publishes them to object storage.

pub mod config;
pub mod constants;
pub mod db;
pub mod dedup;
pub mod folder_name;
pub mod preview;
pub mod s3;
pub mod web;
