//! Search-result candidates and the ordering policy applied to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SaberError};

/// Content site hosting a candidate post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Origin {
    Twitter,
    Pixiv,
    Niconico,
    Fanbox,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Pixiv => "pixiv",
            Self::Niconico => "niconico",
            Self::Fanbox => "fanbox",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = SaberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "twitter" => Ok(Self::Twitter),
            "pixiv" => Ok(Self::Pixiv),
            "niconico" => Ok(Self::Niconico),
            "fanbox" => Ok(Self::Fanbox),
            other => Err(SaberError::Config(format!("Unknown origin: {other}"))),
        }
    }
}

impl TryFrom<String> for Origin {
    type Error = SaberError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A search-engine reference to a possible source post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub origin: Origin,
    /// Link to the post on the origin site
    pub post_link: String,
    /// Link to the search engine's thumbnail of the match
    pub thumbnail_link: String,
    pub width: u32,
    pub height: u32,
    /// Declared file size in bytes
    pub file_size: u64,
    /// File extension without the dot (`jpg`, `png`, ...)
    pub extension: String,
    pub title: String,
    pub author: String,
    pub author_id: String,
    pub author_link: String,
    /// Stable post id on the origin site
    pub id: String,
}

impl Candidate {
    pub fn image_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Candidates in search-engine relevance order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateList {
    items: Vec<Candidate>,
}

impl CandidateList {
    pub fn new(items: Vec<Candidate>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    /// Split into indices of `preferred`-origin and other candidates,
    /// keeping relative order within each side.
    pub fn partition(&self, preferred: Origin) -> (Vec<usize>, Vec<usize>) {
        (0..self.items.len()).partition(|&i| self.items[i].origin == preferred)
    }

    /// Indices in the order candidates are probed: preferred[0], other[0],
    /// preferred[1], other[1], ... Once one side runs out the remainder of
    /// the other follows in order.
    pub fn probe_order(&self, preferred: Origin) -> Vec<usize> {
        let (pref, other) = self.partition(preferred);
        let mut order = Vec::with_capacity(self.items.len());
        for i in 0..pref.len().max(other.len()) {
            order.extend(pref.get(i));
            order.extend(other.get(i));
        }
        order
    }
}

impl From<Vec<Candidate>> for CandidateList {
    fn from(items: Vec<Candidate>) -> Self {
        Self::new(items)
    }
}

/// Ordering applied to raw search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SortOrder {
    /// Keep search-engine order
    #[default]
    No,
    /// Largest pixel count first
    ImageSize,
    /// Largest declared file size first
    FileSize,
}

impl FromStr for SortOrder {
    type Err = SaberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "no" | "none" => Ok(Self::No),
            "imagesize" => Ok(Self::ImageSize),
            "filesize" => Ok(Self::FileSize),
            other => Err(SaberError::Config(format!("Unknown sort order: {other}"))),
        }
    }
}

impl TryFrom<String> for SortOrder {
    type Error = SaberError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// How raw search results become the ranked [`CandidateList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPolicy {
    pub preferred: Origin,
    pub sort_order: SortOrder,
    /// Keep only the first N results; 0 keeps everything
    pub first: usize,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            preferred: Origin::Pixiv,
            sort_order: SortOrder::No,
            first: 0,
        }
    }
}

impl SearchPolicy {
    /// Truncate to the first N results, then sort (stable, descending).
    pub fn apply(&self, mut results: Vec<Candidate>) -> CandidateList {
        if self.first > 0 {
            results.truncate(self.first);
        }
        match self.sort_order {
            SortOrder::No => {}
            SortOrder::ImageSize => results.sort_by(|a, b| b.image_size().cmp(&a.image_size())),
            SortOrder::FileSize => results.sort_by(|a, b| b.file_size.cmp(&a.file_size)),
        }
        CandidateList::new(results)
    }
}

fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Post id: the last path segment of the post link.
pub fn post_id_from_link(link: &str) -> String {
    Url::parse(link)
        .ok()
        .and_then(|url| last_path_segment(&url))
        .unwrap_or_default()
}

/// Author id derived from the author's profile link.
///
/// Twitter intent links carry the numeric id as `user_id`; everything else
/// ends with the id (or handle) as the last path segment.
pub fn author_id_from_link(origin: Origin, link: &str) -> String {
    let Ok(url) = Url::parse(link) else {
        return String::new();
    };
    if origin == Origin::Twitter {
        if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "user_id") {
            return id.into_owned();
        }
    }
    last_path_segment(&url).unwrap_or_default()
}

pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    if ext == "jpeg" {
        "jpg".to_string()
    } else {
        ext
    }
}

#[cfg(test)]
pub(crate) fn candidate(origin: Origin, id: &str) -> Candidate {
    Candidate {
        origin,
        post_link: format!("https://example.com/{origin}/{id}"),
        thumbnail_link: format!("https://search.example.com/thumb/{id}.jpg"),
        width: 100,
        height: 100,
        file_size: 1000,
        extension: "jpg".to_string(),
        title: format!("title {id}"),
        author: "author".to_string(),
        author_id: "42".to_string(),
        author_link: "https://example.com/users/42".to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &CandidateList, order: &[usize]) -> Vec<String> {
        order
            .iter()
            .map(|&i| list.get(i).unwrap().id.clone())
            .collect()
    }

    #[test]
    fn test_probe_order_interleaves_preferred_first() {
        let list = CandidateList::new(vec![
            candidate(Origin::Pixiv, "P1"),
            candidate(Origin::Twitter, "O1"),
            candidate(Origin::Pixiv, "P2"),
        ]);
        let order = list.probe_order(Origin::Pixiv);
        assert_eq!(ids(&list, &order), ["P1", "O1", "P2"]);
    }

    #[test]
    fn test_probe_order_reorders_by_partition() {
        let list = CandidateList::new(vec![
            candidate(Origin::Twitter, "O1"),
            candidate(Origin::Twitter, "O2"),
            candidate(Origin::Twitter, "O3"),
            candidate(Origin::Pixiv, "P1"),
        ]);
        let order = list.probe_order(Origin::Pixiv);
        assert_eq!(ids(&list, &order), ["P1", "O1", "O2", "O3"]);

        let order = list.probe_order(Origin::Twitter);
        assert_eq!(ids(&list, &order), ["O1", "P1", "O2", "O3"]);
    }

    #[test]
    fn test_probe_order_single_partition_and_empty() {
        let list = CandidateList::new(vec![
            candidate(Origin::Twitter, "O1"),
            candidate(Origin::Twitter, "O2"),
        ]);
        assert_eq!(ids(&list, &list.probe_order(Origin::Pixiv)), ["O1", "O2"]);
        assert!(CandidateList::default().probe_order(Origin::Pixiv).is_empty());
    }

    #[test]
    fn test_partition_preserves_relative_order() {
        let list = CandidateList::new(vec![
            candidate(Origin::Pixiv, "P1"),
            candidate(Origin::Fanbox, "F1"),
            candidate(Origin::Pixiv, "P2"),
            candidate(Origin::Twitter, "T1"),
        ]);
        let (pref, other) = list.partition(Origin::Pixiv);
        assert_eq!(pref, [0, 2]);
        assert_eq!(other, [1, 3]);
    }

    #[test]
    fn test_search_policy_truncates_before_sorting() {
        let mut small = candidate(Origin::Pixiv, "small");
        small.file_size = 10;
        let mut mid = candidate(Origin::Pixiv, "mid");
        mid.file_size = 50;
        let mut big = candidate(Origin::Pixiv, "big");
        big.file_size = 90;

        let policy = SearchPolicy {
            sort_order: SortOrder::FileSize,
            first: 2,
            ..Default::default()
        };
        let list = policy.apply(vec![small, mid, big]);
        let got: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(got, ["mid", "small"]);
    }

    #[test]
    fn test_search_policy_image_size_is_stable() {
        let mut a = candidate(Origin::Pixiv, "a");
        a.width = 10;
        let mut b = candidate(Origin::Pixiv, "b");
        b.width = 20;
        let mut c = candidate(Origin::Pixiv, "c");
        c.width = 10;

        let policy = SearchPolicy {
            sort_order: SortOrder::ImageSize,
            ..Default::default()
        };
        let list = policy.apply(vec![a, b, c]);
        let got: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(got, ["b", "a", "c"]);
    }

    #[test]
    fn test_link_helpers() {
        assert_eq!(
            post_id_from_link("https://www.pixiv.net/artworks/98765432"),
            "98765432"
        );
        assert_eq!(
            post_id_from_link("https://twitter.com/someone/status/1234567890/"),
            "1234567890"
        );
        assert_eq!(post_id_from_link("not a url"), "");

        assert_eq!(
            author_id_from_link(
                Origin::Twitter,
                "https://twitter.com/intent/user?user_id=555"
            ),
            "555"
        );
        assert_eq!(
            author_id_from_link(Origin::Twitter, "https://twitter.com/handle"),
            "handle"
        );
        assert_eq!(
            author_id_from_link(Origin::Pixiv, "https://www.pixiv.net/users/123"),
            "123"
        );

        assert_eq!(normalize_extension("JPEG"), "jpg");
        assert_eq!(normalize_extension(".png"), "png");
    }

    #[test]
    fn test_origin_from_str() {
        assert_eq!("Pixiv".parse::<Origin>().unwrap(), Origin::Pixiv);
        assert_eq!(" twitter ".parse::<Origin>().unwrap(), Origin::Twitter);
        assert!("deviantart".parse::<Origin>().is_err());
        assert_eq!("image_size".parse::<SortOrder>().unwrap(), SortOrder::ImageSize);
    }
}
