//! Scripted search backend for tests and offline runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::CandidateSource;
use crate::candidate::Candidate;
use crate::error::{Result, SaberError};

/// Search backend returning a fixed result list.
///
/// Thumbnails are served from a map keyed by thumbnail link; a missing entry
/// behaves like a failed fetch. Every thumbnail request is recorded so tests
/// can assert the probe order.
#[derive(Default)]
pub struct MockCandidateSource {
    results: Vec<Candidate>,
    thumbnails: HashMap<String, Vec<u8>>,
    fail_search: bool,
    probed: Mutex<Vec<String>>,
}

impl MockCandidateSource {
    pub fn new(results: Vec<Candidate>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    /// A backend whose search call always fails.
    pub fn failing() -> Self {
        Self {
            fail_search: true,
            ..Default::default()
        }
    }

    pub fn with_thumbnail(mut self, link: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.thumbnails.insert(link.into(), bytes);
        self
    }

    /// Thumbnail links requested so far, in request order.
    pub fn probed(&self) -> Vec<String> {
        self.probed
            .lock()
            .map(|probed| probed.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CandidateSource for MockCandidateSource {
    async fn search(&self, _image: &[u8], _content_hash: Option<&str>) -> Result<Vec<Candidate>> {
        if self.fail_search {
            return Err(SaberError::CandidateFetch("mock search failure".into()));
        }
        Ok(self.results.clone())
    }

    async fn fetch_thumbnail(&self, candidate: &Candidate) -> Result<Vec<u8>> {
        if let Ok(mut probed) = self.probed.lock() {
            probed.push(candidate.thumbnail_link.clone());
        }
        self.thumbnails
            .get(&candidate.thumbnail_link)
            .cloned()
            .ok_or_else(|| {
                SaberError::ThumbnailFetch(format!("no thumbnail at {}", candidate.thumbnail_link))
            })
    }
}
