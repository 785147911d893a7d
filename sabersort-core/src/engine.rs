//! Resolution engine: from a source hash to one post variant.
//!
//! Resolution runs in two phases over one [`ResolutionContext`]:
//!
//! 1. **Candidate selection.** Search results are ranked by [`SearchPolicy`]
//!    and probed in interleaved preferred/other order. Each probe fetches the
//!    search engine's thumbnail and compares its hash to the source; the
//!    first candidate within threshold is selected.
//! 2. **Variant selection.** The selected candidate's post is resolved to its
//!    pages through the [`OriginRegistry`], and page thumbnails are probed in
//!    index order; the first page within threshold is the result.
//!
//! Probe failures (fetch errors, undecodable thumbnails) count as non-matches.
//! Only a failed search and an origin without a resolver are errors; every
//! other ending is an [`Outcome`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::candidate::{Candidate, CandidateList, SearchPolicy};
use crate::error::{Result, SaberError};
use crate::hasher::{is_match, PerceptualHash, PerceptualHasher};
use crate::origin::{OriginRegistry, OriginVariantSet};
use crate::search::CandidateSource;

/// Default maximum hash distance for a match.
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Where a [`ResolutionContext`] stands. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionState {
    #[default]
    Pending,
    MatchedAndResolved,
    NotMatched,
    PostDeleted,
    NoVariantMatch,
    NotSupportedOrigin,
}

impl ResolutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MatchedAndResolved => "matched-and-resolved",
            Self::NotMatched => "not-matched",
            Self::PostDeleted => "post-deleted",
            Self::NoVariantMatch => "no-variant-match",
            Self::NotSupportedOrigin => "not-supported-origin",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != Self::Pending
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Working state for one input image.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub source_path: PathBuf,
    pub source_hash: PerceptualHash,
    /// MD5 of the raw file, for the search engine's exact-match path
    pub content_hash: Option<String>,
    pub candidates: CandidateList,
    selected: Option<usize>,
    variant_index: Option<usize>,
    variant_uri: Option<String>,
    state: ResolutionState,
}

impl ResolutionContext {
    pub fn new(
        source_path: impl Into<PathBuf>,
        source_hash: PerceptualHash,
        content_hash: Option<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            source_hash,
            content_hash,
            candidates: CandidateList::default(),
            selected: None,
            variant_index: None,
            variant_uri: None,
            state: ResolutionState::Pending,
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn selected_candidate(&self) -> Option<&Candidate> {
        self.selected.and_then(|i| self.candidates.get(i))
    }

    pub fn variant_index(&self) -> Option<usize> {
        self.variant_index
    }

    pub fn variant_uri(&self) -> Option<&str> {
        self.variant_uri.as_deref()
    }

    /// Move to a terminal state. A context concludes at most once.
    pub fn conclude(&mut self, state: ResolutionState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(SaberError::InvalidTransition(self.state.as_str()));
        }
        if !state.is_terminal() {
            return Err(SaberError::InvalidTransition(state.as_str()));
        }
        self.state = state;
        Ok(())
    }
}

/// How a resolution ended, for routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Resolved {
        candidate: Candidate,
        variant_index: usize,
        variant_uri: String,
    },
    NotMatched,
    PostDeleted {
        candidate: Candidate,
    },
    NoVariantMatch {
        candidate: Candidate,
    },
}

impl Outcome {
    pub fn state(&self) -> ResolutionState {
        match self {
            Self::Resolved { .. } => ResolutionState::MatchedAndResolved,
            Self::NotMatched => ResolutionState::NotMatched,
            Self::PostDeleted { .. } => ResolutionState::PostDeleted,
            Self::NoVariantMatch { .. } => ResolutionState::NoVariantMatch,
        }
    }

    /// The candidate the image matched, if any.
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Self::Resolved { candidate, .. }
            | Self::PostDeleted { candidate }
            | Self::NoVariantMatch { candidate } => Some(candidate),
            Self::NotMatched => None,
        }
    }
}

/// Matching tolerances and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Maximum distance still counted as a match (inclusive)
    pub threshold: u32,
    /// Stop candidate probing after this many thumbnails
    pub max_probes: Option<usize>,
    pub search: SearchPolicy,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_probes: None,
            search: SearchPolicy::default(),
        }
    }
}

/// Candidate and variant selection over pluggable collaborators.
pub struct ResolutionEngine {
    hasher: PerceptualHasher,
    source: Arc<dyn CandidateSource>,
    origins: OriginRegistry,
    policy: MatchPolicy,
}

impl ResolutionEngine {
    pub fn new(
        hasher: PerceptualHasher,
        source: Arc<dyn CandidateSource>,
        origins: OriginRegistry,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            hasher,
            source,
            origins,
            policy,
        }
    }

    pub fn hasher(&self) -> &PerceptualHasher {
        &self.hasher
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Resolve one image end to end.
    ///
    /// Fails with [`SaberError::CandidateFetch`] when the search itself fails
    /// (the context stays pending) and with [`SaberError::UnsupportedOrigin`]
    /// when the matched candidate's origin has no resolver (the context
    /// concludes as not-supported-origin).
    #[instrument(level = "debug", skip_all, fields(path = %ctx.source_path.display()))]
    pub async fn resolve(&self, ctx: &mut ResolutionContext, image: &[u8]) -> Result<Outcome> {
        let results = self
            .source
            .search(image, ctx.content_hash.as_deref())
            .await
            .map_err(|e| match e {
                SaberError::CandidateFetch(_) => e,
                other => SaberError::CandidateFetch(other.to_string()),
            })?;
        ctx.candidates = self.policy.search.apply(results);
        debug!(candidates = ctx.candidates.len(), "Search returned candidates");

        let Some(selected) = self.select_candidate(&ctx.candidates, &ctx.source_hash).await else {
            ctx.conclude(ResolutionState::NotMatched)?;
            info!(state = %ctx.state(), "No candidate matched");
            return Ok(Outcome::NotMatched);
        };
        ctx.selected = Some(selected);
        let candidate = ctx
            .candidates
            .get(selected)
            .cloned()
            .ok_or(SaberError::InvalidTransition("selected candidate out of range"))?;

        let variants = match self.variant_set(&candidate).await {
            Ok(variants) => variants,
            Err(SaberError::PostDeleted(link)) => {
                ctx.conclude(ResolutionState::PostDeleted)?;
                info!(post_link = %link, origin = %candidate.origin, "Matched post was deleted");
                return Ok(Outcome::PostDeleted { candidate });
            }
            Err(e @ SaberError::UnsupportedOrigin(_)) => {
                ctx.conclude(ResolutionState::NotSupportedOrigin)?;
                warn!(origin = %candidate.origin, "No resolver for matched origin");
                return Err(e);
            }
            Err(e) => {
                warn!(post_link = %candidate.post_link, error = %e, "Post data unavailable");
                ctx.conclude(ResolutionState::NoVariantMatch)?;
                return Ok(Outcome::NoVariantMatch { candidate });
            }
        };

        match self
            .select_variant(&candidate, &variants, &ctx.source_hash)
            .await?
        {
            Some(index) => {
                let uri = variants
                    .original(index)
                    .ok_or(SaberError::InvalidVariantSet {
                        originals: variants.len(),
                        thumbnails: index + 1,
                    })?
                    .to_string();
                ctx.variant_index = Some(index);
                ctx.variant_uri = Some(uri.clone());
                ctx.conclude(ResolutionState::MatchedAndResolved)?;
                info!(
                    post_link = %candidate.post_link,
                    variant_index = index,
                    "Resolved source image"
                );
                Ok(Outcome::Resolved {
                    candidate,
                    variant_index: index,
                    variant_uri: uri,
                })
            }
            None => {
                ctx.conclude(ResolutionState::NoVariantMatch)?;
                info!(
                    post_link = %candidate.post_link,
                    variants = variants.len(),
                    "No variant of the matched post is within threshold"
                );
                Ok(Outcome::NoVariantMatch { candidate })
            }
        }
    }

    /// Probe candidates in interleaved order; the first within threshold wins.
    pub async fn select_candidate(
        &self,
        candidates: &CandidateList,
        source_hash: &PerceptualHash,
    ) -> Option<usize> {
        let order = candidates.probe_order(self.policy.search.preferred);
        let limit = self.policy.max_probes.unwrap_or(order.len());

        for index in order.into_iter().take(limit) {
            let candidate = candidates.get(index)?;
            let thumbnail = match self.source.fetch_thumbnail(candidate).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        thumbnail = %candidate.thumbnail_link,
                        error = %e,
                        "Thumbnail fetch failed, skipping candidate"
                    );
                    continue;
                }
            };
            let link = &candidate.thumbnail_link;
            if let Some(distance) = self.distance_to(thumbnail, source_hash, link).await {
                debug!(
                    origin = %candidate.origin,
                    id = %candidate.id,
                    distance,
                    threshold = self.policy.threshold,
                    "Probed candidate"
                );
                if is_match(distance, self.policy.threshold) {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Probe the post's page thumbnails from index 0; the first within
    /// threshold wins.
    pub async fn select_variant(
        &self,
        candidate: &Candidate,
        variants: &OriginVariantSet,
        source_hash: &PerceptualHash,
    ) -> Result<Option<usize>> {
        let resolver = self.origins.get(candidate.origin)?;

        for (index, uri) in variants.thumbnails() {
            let thumbnail = match resolver.fetch_variant(uri).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(uri, error = %e, "Variant thumbnail fetch failed, skipping");
                    continue;
                }
            };
            if let Some(distance) = self.distance_to(thumbnail, source_hash, uri).await {
                debug!(index, distance, threshold = self.policy.threshold, "Probed variant");
                if is_match(distance, self.policy.threshold) {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    /// Download the full-resolution image of a resolved outcome.
    pub async fn fetch_variant(&self, candidate: &Candidate, uri: &str) -> Result<Vec<u8>> {
        self.origins.get(candidate.origin)?.fetch_variant(uri).await
    }

    async fn variant_set(&self, candidate: &Candidate) -> Result<OriginVariantSet> {
        let resolver = self.origins.get(candidate.origin)?;
        resolver.fetch_post_data(&candidate.post_link).await
    }

    async fn distance_to(
        &self,
        image: Vec<u8>,
        source_hash: &PerceptualHash,
        uri: &str,
    ) -> Option<u32> {
        match self.hasher.hash_bytes_blocking(image).await {
            Ok(hash) => Some(hash.distance(source_hash)),
            Err(e) => {
                warn!(uri, error = %e, "Thumbnail does not decode, treating as non-match");
                None
            }
        }
    }

    /// Hash a local file's bytes with the engine's hasher, off the runtime.
    pub async fn hash_source(&self, path: &Path, image: Arc<[u8]>) -> Result<PerceptualHash> {
        self.hasher.hash_bytes_blocking(image).await.map_err(|e| match e {
            SaberError::UnreadableImage(msg) => {
                SaberError::UnreadableImage(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }
}
