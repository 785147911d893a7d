//! Scripted origin resolver for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{FetchError, OriginResolver, OriginVariantSet};
use crate::candidate::Origin;
use crate::error::{Result, SaberError};

/// Origin resolver serving posts and images from in-memory maps.
///
/// Unknown post links fail as a transport-level decode error, deleted links
/// fail with [`SaberError::PostDeleted`], and unknown image URIs fail as
/// [`FetchError::NotFound`]. Every image request is recorded.
pub struct MockOrigin {
    origin: Origin,
    posts: HashMap<String, OriginVariantSet>,
    deleted: HashSet<String>,
    images: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl MockOrigin {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            posts: HashMap::new(),
            deleted: HashSet::new(),
            images: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Register a post with its variants as (original, thumbnail) URI pairs.
    pub fn with_post<I, S>(mut self, post_link: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let set = variants
            .into_iter()
            .map(|(orig, thumb)| (orig.into(), thumb.into()))
            .collect();
        self.posts.insert(post_link.into(), set);
        self
    }

    pub fn with_deleted(mut self, post_link: impl Into<String>) -> Self {
        self.deleted.insert(post_link.into());
        self
    }

    pub fn with_image(mut self, uri: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.insert(uri.into(), bytes);
        self
    }

    /// Image URIs requested so far, in request order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .map(|fetched| fetched.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OriginResolver for MockOrigin {
    async fn fetch_post_data(&self, post_link: &str) -> Result<OriginVariantSet> {
        if self.deleted.contains(post_link) {
            return Err(SaberError::PostDeleted(post_link.to_string()));
        }
        self.posts.get(post_link).cloned().ok_or_else(|| {
            SaberError::Fetch(FetchError::Decode(format!("no mock post at {post_link}")))
        })
    }

    async fn fetch_variant(&self, uri: &str) -> Result<Vec<u8>> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(uri.to_string());
        }
        self.images
            .get(uri)
            .cloned()
            .ok_or_else(|| SaberError::Fetch(FetchError::NotFound(uri.to_string())))
    }

    fn origin(&self) -> Origin {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_post_and_images() {
        let origin = MockOrigin::new(Origin::Pixiv)
            .with_post("https://p/1", [("o0", "t0"), ("o1", "t1")])
            .with_image("t1", vec![9]);

        let set = origin.fetch_post_data("https://p/1").await.unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.thumbnail(1), Some("t1"));

        assert_eq!(origin.fetch_variant("t1").await.unwrap(), vec![9]);
        assert!(origin.fetch_variant("t0").await.is_err());
        assert_eq!(origin.fetched(), ["t1", "t0"]);
    }

    #[tokio::test]
    async fn test_mock_deleted_post() {
        let origin = MockOrigin::new(Origin::Twitter).with_deleted("https://t/1");
        let err = origin.fetch_post_data("https://t/1").await.unwrap_err();
        assert!(matches!(err, SaberError::PostDeleted(_)));
        assert_eq!(origin.origin(), Origin::Twitter);
    }
}
