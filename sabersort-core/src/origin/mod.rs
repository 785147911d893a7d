//! Origin sites hosting the true source of an image.
//!
//! Each supported site implements [`OriginResolver`]: given a post link it
//! lists every page/variant of the post as (full-resolution, thumbnail) URL
//! pairs, and it fetches single images with whatever headers the site needs.
//!
//! ## Supported origins
//!
//! - **Pixiv** - [`PixivResolver`], JSON pages endpoint, multi-page posts
//! - **Twitter** - [`TwitterResolver`], JSON status endpoint, up to four photos
//! - **Mock** - [`MockOrigin`], scripted posts for tests
//!
//! Resolvers are looked up through an explicit [`OriginRegistry`] keyed by
//! [`Origin`]; an origin without an entry is unsupported.

mod http_client;
mod mock;
mod pixiv;
mod registry;
mod twitter;

pub use http_client::{FetchClient, FetchError, HttpConfig};
pub use mock::MockOrigin;
pub use pixiv::{PixivConfig, PixivResolver};
pub use registry::OriginRegistry;
pub use twitter::{TwitterConfig, TwitterResolver};

use async_trait::async_trait;

use crate::candidate::Origin;
use crate::error::{Result, SaberError};

/// Trait for origin site resolvers.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait OriginResolver: Send + Sync {
    /// List the variants of the post at `post_link`.
    ///
    /// Fails with [`SaberError::PostDeleted`] when the site reports the post
    /// no longer exists.
    async fn fetch_post_data(&self, post_link: &str) -> Result<OriginVariantSet>;

    /// Fetch one image (thumbnail or full resolution) hosted by this origin.
    async fn fetch_variant(&self, uri: &str) -> Result<Vec<u8>>;

    /// The origin this resolver serves.
    fn origin(&self) -> Origin;
}

/// The pages of one post, as parallel full-resolution and thumbnail URLs.
///
/// Index `i` of both sequences refers to the same page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginVariantSet {
    originals: Vec<String>,
    thumbnails: Vec<String>,
}

impl OriginVariantSet {
    pub fn new(originals: Vec<String>, thumbnails: Vec<String>) -> Result<Self> {
        if originals.len() != thumbnails.len() {
            return Err(SaberError::InvalidVariantSet {
                originals: originals.len(),
                thumbnails: thumbnails.len(),
            });
        }
        Ok(Self {
            originals,
            thumbnails,
        })
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn original(&self, index: usize) -> Option<&str> {
        self.originals.get(index).map(String::as_str)
    }

    pub fn thumbnail(&self, index: usize) -> Option<&str> {
        self.thumbnails.get(index).map(String::as_str)
    }

    /// Thumbnails in index order.
    pub fn thumbnails(&self) -> impl Iterator<Item = (usize, &str)> {
        self.thumbnails.iter().map(String::as_str).enumerate()
    }
}

impl FromIterator<(String, String)> for OriginVariantSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let (originals, thumbnails) = iter.into_iter().unzip();
        Self {
            originals,
            thumbnails,
        }
    }
}

/// Map a fetch failure on post data to the resolver error taxonomy.
pub(crate) fn post_fetch_error(post_link: &str, err: FetchError) -> SaberError {
    match err {
        FetchError::NotFound(_) => SaberError::PostDeleted(post_link.to_string()),
        other => SaberError::Fetch(other),
    }
}
