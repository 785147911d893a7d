//! Reverse image search backends.
//!
//! The resolver never talks to a search engine directly. It consumes a
//! [`CandidateSource`], which turns an image into raw candidates and serves
//! the thumbnails used for comparison. Result-page scraping lives entirely in
//! the implementation.

mod mock;

pub use mock::MockCandidateSource;

use async_trait::async_trait;
use md5::{Digest, Md5};

use crate::candidate::Candidate;
use crate::error::Result;

/// Trait for reverse image search backends.
///
/// Implementations must be thread-safe (`Send + Sync`); one source is shared
/// by every worker of a sort run.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Search for posts matching `image`, in engine relevance order.
    ///
    /// When `content_hash` is given the backend may try a cheap exact-match
    /// lookup first and fall back to visual search when it yields nothing.
    /// Failures here abort the current image.
    async fn search(&self, image: &[u8], content_hash: Option<&str>) -> Result<Vec<Candidate>>;

    /// Fetch the search engine's thumbnail for a candidate.
    async fn fetch_thumbnail(&self, candidate: &Candidate) -> Result<Vec<u8>>;
}

/// Hex MD5 of the raw file bytes, the key of exact-match lookups.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
