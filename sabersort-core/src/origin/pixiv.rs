//! Pixiv artwork resolver.
//!
//! Uses the JSON pages endpoint (`/ajax/illust/{id}/pages`), which lists every
//! page of an artwork with its URL at each size. Pixiv's image servers reject
//! requests without a pixiv referer, so every fetch carries one.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{post_fetch_error, FetchClient, OriginResolver, OriginVariantSet};
use crate::candidate::{post_id_from_link, Origin};
use crate::error::{Result, SaberError};

/// Default Pixiv web endpoint.
const DEFAULT_API_URL: &str = "https://www.pixiv.net";

const REFERER: &str = "https://www.pixiv.net/";

/// Configuration for the Pixiv resolver.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PixivConfig {
    /// Base URL of the web API.
    pub api_url: String,
    /// Session cookie; R-18 and follower-only works need a logged-in session.
    pub phpsessid: Option<String>,
}

impl Default for PixivConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            phpsessid: None,
        }
    }
}

impl fmt::Debug for PixivConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixivConfig")
            .field("api_url", &self.api_url)
            .field("phpsessid", &self.phpsessid.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PagesResponse {
    error: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    body: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Page {
    urls: PageUrls,
}

#[derive(Debug, Deserialize)]
struct PageUrls {
    small: String,
    original: String,
}

/// Pixiv origin resolver.
pub struct PixivResolver {
    client: Arc<FetchClient>,
    config: PixivConfig,
}

impl PixivResolver {
    #[instrument(level = "debug", skip_all, fields(api_url = %config.api_url))]
    pub fn new(client: Arc<FetchClient>, config: PixivConfig) -> Self {
        debug!("Creating Pixiv resolver");
        Self { client, config }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("referer", REFERER.to_string())];
        if let Some(session) = &self.config.phpsessid {
            headers.push(("cookie", format!("PHPSESSID={session}")));
        }
        headers
    }

    fn pages_url(&self, id: &str) -> String {
        format!(
            "{}/ajax/illust/{}/pages",
            self.config.api_url.trim_end_matches('/'),
            id
        )
    }
}

/// Turn a pages response into a variant set; page order is preserved.
fn parse_pages(post_link: &str, response: PagesResponse) -> Result<OriginVariantSet> {
    if response.error {
        debug!(post_link, message = %response.message, "Pixiv reports the work is gone");
        return Err(SaberError::PostDeleted(post_link.to_string()));
    }
    let pages: Vec<Page> = serde_json::from_value(response.body)
        .map_err(|e| SaberError::Fetch(super::FetchError::Decode(e.to_string())))?;

    Ok(pages
        .into_iter()
        .map(|page| (page.urls.original, page.urls.small))
        .collect())
}

#[async_trait]
impl OriginResolver for PixivResolver {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_post_data(&self, post_link: &str) -> Result<OriginVariantSet> {
        let id = post_id_from_link(post_link);
        if id.is_empty() {
            return Err(SaberError::Fetch(super::FetchError::Decode(format!(
                "no artwork id in {post_link}"
            ))));
        }

        let response: PagesResponse = self
            .client
            .get_json(&self.pages_url(&id), &self.headers())
            .await
            .map_err(|e| post_fetch_error(post_link, e))?;

        let variants = parse_pages(post_link, response)?;
        debug!(pages = variants.len(), "Fetched Pixiv pages");
        Ok(variants)
    }

    async fn fetch_variant(&self, uri: &str) -> Result<Vec<u8>> {
        Ok(self.client.get_bytes(uri, &self.headers()).await?)
    }

    fn origin(&self) -> Origin {
        Origin::Pixiv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::HttpConfig;

    const TWO_PAGES: &str = r#"{
        "error": false,
        "message": "",
        "body": [
            {"urls": {
                "thumb_mini": "https://i.pximg.net/c/128x128/img-master/img/2024/01/01/00/00/00/100_p0_square1200.jpg",
                "small": "https://i.pximg.net/c/540x540_70/img-master/img/2024/01/01/00/00/00/100_p0_master1200.jpg",
                "regular": "https://i.pximg.net/img-master/img/2024/01/01/00/00/00/100_p0_master1200.jpg",
                "original": "https://i.pximg.net/img-original/img/2024/01/01/00/00/00/100_p0.png"
             }, "width": 1000, "height": 1400},
            {"urls": {
                "thumb_mini": "https://i.pximg.net/c/128x128/img-master/img/2024/01/01/00/00/00/100_p1_square1200.jpg",
                "small": "https://i.pximg.net/c/540x540_70/img-master/img/2024/01/01/00/00/00/100_p1_master1200.jpg",
                "regular": "https://i.pximg.net/img-master/img/2024/01/01/00/00/00/100_p1_master1200.jpg",
                "original": "https://i.pximg.net/img-original/img/2024/01/01/00/00/00/100_p1.png"
             }, "width": 1000, "height": 1400}
        ]
    }"#;

    #[test]
    fn test_parse_pages_in_order() {
        let response: PagesResponse = serde_json::from_str(TWO_PAGES).unwrap();
        let set = parse_pages("https://www.pixiv.net/artworks/100", response).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.original(0).unwrap().ends_with("100_p0.png"));
        assert!(set.thumbnail(0).unwrap().contains("540x540_70"));
        assert!(set.original(1).unwrap().ends_with("100_p1.png"));
        assert!(set.thumbnail(1).unwrap().contains("100_p1_master1200"));
    }

    #[test]
    fn test_parse_pages_error_means_deleted() {
        let response: PagesResponse = serde_json::from_str(
            r#"{"error": true, "message": "該当作品は削除されたか、存在しない作品IDです。", "body": []}"#,
        )
        .unwrap();
        let err = parse_pages("https://www.pixiv.net/artworks/1", response).unwrap_err();
        assert!(matches!(err, SaberError::PostDeleted(_)));
    }

    #[test]
    fn test_headers_and_url() {
        let client = Arc::new(FetchClient::new(HttpConfig::default()).unwrap());
        let resolver = PixivResolver::new(
            client,
            PixivConfig {
                api_url: "https://pixiv.test/".into(),
                phpsessid: Some("secret".into()),
            },
        );

        assert_eq!(
            resolver.pages_url("100"),
            "https://pixiv.test/ajax/illust/100/pages"
        );
        let headers = resolver.headers();
        assert!(headers.contains(&("referer", REFERER.to_string())));
        assert!(headers.contains(&("cookie", "PHPSESSID=secret".to_string())));
        assert_eq!(resolver.origin(), Origin::Pixiv);
    }

    #[test]
    fn test_debug_redacts_session() {
        let config = PixivConfig {
            phpsessid: Some("secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }
}
