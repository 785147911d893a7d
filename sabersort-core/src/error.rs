use thiserror::Error;

use crate::candidate::Origin;
use crate::origin::FetchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SaberError {
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("Candidate search failed: {0}")]
    CandidateFetch(String),

    #[error("Thumbnail fetch failed: {0}")]
    ThumbnailFetch(String),

    #[error("Post deleted: {0}")]
    PostDeleted(String),

    #[error("No resolver registered for origin {0}")]
    UnsupportedOrigin(Origin),

    #[error("Variant set mismatch: {originals} originals, {thumbnails} thumbnails")]
    InvalidVariantSet { originals: usize, thumbnails: usize },

    #[error("Resolution already concluded as {0}")]
    InvalidTransition(&'static str),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SaberError>;
