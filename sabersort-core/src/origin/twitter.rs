//! Twitter (X) status resolver.
//!
//! Post data comes from a JSON status endpoint (vxtwitter-compatible), which
//! lists the photo URLs of a status. Photo URLs on `pbs.twimg.com` select
//! their rendition through the `name` query parameter, so each photo yields
//! a `small` thumbnail and an `orig` full-resolution variant.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{post_fetch_error, FetchClient, FetchError, OriginResolver, OriginVariantSet};
use crate::candidate::{post_id_from_link, Origin};
use crate::error::{Result, SaberError};

/// Default status endpoint.
const DEFAULT_API_URL: &str = "https://api.vxtwitter.com";

const THUMBNAIL_NAME: &str = "small";
const ORIGINAL_NAME: &str = "orig";

/// Configuration for the Twitter resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    /// Base URL of the status endpoint.
    pub api_url: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    media_extended: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

/// Twitter origin resolver.
pub struct TwitterResolver {
    client: Arc<FetchClient>,
    config: TwitterConfig,
}

impl TwitterResolver {
    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(client: Arc<FetchClient>, config: TwitterConfig) -> Self {
        debug!("Creating Twitter resolver");
        Self { client, config }
    }

    fn status_url(&self, id: &str) -> String {
        format!(
            "{}/Twitter/status/{}",
            self.config.api_url.trim_end_matches('/'),
            id
        )
    }
}

/// Full-resolution and thumbnail renditions of a `pbs.twimg.com` photo URL.
///
/// Accepts both `.../media/ID.jpg` and `.../media/ID?format=jpg&name=...`.
pub fn photo_renditions(photo_url: &str) -> Option<(String, String)> {
    let mut url = Url::parse(photo_url).ok()?;

    let mut format = url
        .query_pairs()
        .find(|(k, _)| k == "format")
        .map(|(_, v)| v.into_owned());
    if format.is_none() {
        let path = url.path().to_string();
        let (stem, ext) = path.rsplit_once('.')?;
        if stem.ends_with('/') || ext.contains('/') {
            return None;
        }
        format = Some(ext.to_string());
        url.set_path(stem);
    }
    let format = format?;

    let rendition = |name: &str| {
        let mut u = url.clone();
        u.query_pairs_mut()
            .clear()
            .append_pair("format", &format)
            .append_pair("name", name);
        u.to_string()
    };
    Some((rendition(ORIGINAL_NAME), rendition(THUMBNAIL_NAME)))
}

fn parse_status(response: StatusResponse) -> OriginVariantSet {
    response
        .media_extended
        .iter()
        .filter(|m| m.kind == "image")
        .filter_map(|m| photo_renditions(&m.url))
        .collect()
}

#[async_trait]
impl OriginResolver for TwitterResolver {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_post_data(&self, post_link: &str) -> Result<OriginVariantSet> {
        let id = post_id_from_link(post_link);
        if id.is_empty() {
            return Err(SaberError::Fetch(FetchError::Decode(format!(
                "no status id in {post_link}"
            ))));
        }

        let response: StatusResponse = self
            .client
            .get_json(&self.status_url(&id), &[])
            .await
            .map_err(|e| post_fetch_error(post_link, e))?;

        let variants = parse_status(response);
        debug!(photos = variants.len(), "Fetched Twitter status");
        Ok(variants)
    }

    async fn fetch_variant(&self, uri: &str) -> Result<Vec<u8>> {
        Ok(self.client.get_bytes(uri, &[]).await?)
    }

    fn origin(&self) -> Origin {
        Origin::Twitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::HttpConfig;

    #[test]
    fn test_photo_renditions_from_query_form() {
        let (orig, thumb) =
            photo_renditions("https://pbs.twimg.com/media/FabcDEF?format=png&name=900x900")
                .unwrap();
        assert_eq!(orig, "https://pbs.twimg.com/media/FabcDEF?format=png&name=orig");
        assert_eq!(thumb, "https://pbs.twimg.com/media/FabcDEF?format=png&name=small");
    }

    #[test]
    fn test_photo_renditions_from_extension_form() {
        let (orig, thumb) = photo_renditions("https://pbs.twimg.com/media/FabcDEF.jpg").unwrap();
        assert_eq!(orig, "https://pbs.twimg.com/media/FabcDEF?format=jpg&name=orig");
        assert_eq!(thumb, "https://pbs.twimg.com/media/FabcDEF?format=jpg&name=small");
    }

    #[test]
    fn test_photo_renditions_rejects_unformatted() {
        assert!(photo_renditions("https://pbs.twimg.com/media/FabcDEF").is_none());
        assert!(photo_renditions("not a url").is_none());
    }

    #[test]
    fn test_parse_status_keeps_photos_in_order() {
        let response: StatusResponse = serde_json::from_str(
            r#"{
                "text": "new piece",
                "media_extended": [
                    {"type": "image", "url": "https://pbs.twimg.com/media/A1.jpg"},
                    {"type": "video", "url": "https://video.twimg.com/ext_tw_video/1/pu/vid/a.mp4"},
                    {"type": "image", "url": "https://pbs.twimg.com/media/B2.png"}
                ]
            }"#,
        )
        .unwrap();
        let set = parse_status(response);

        assert_eq!(set.len(), 2);
        assert!(set.original(0).unwrap().contains("A1?format=jpg&name=orig"));
        assert!(set.thumbnail(1).unwrap().contains("B2?format=png&name=small"));
    }

    #[test]
    fn test_parse_status_without_media_is_empty() {
        let response: StatusResponse = serde_json::from_str(r#"{"text": "words only"}"#).unwrap();
        assert!(parse_status(response).is_empty());
    }

    #[test]
    fn test_status_url() {
        let client = Arc::new(FetchClient::new(HttpConfig::default()).unwrap());
        let resolver = TwitterResolver::new(
            client,
            TwitterConfig {
                api_url: "https://tw.test/".into(),
            },
        );
        assert_eq!(resolver.status_url("99"), "https://tw.test/Twitter/status/99");
        assert_eq!(resolver.origin(), Origin::Twitter);
    }
}
