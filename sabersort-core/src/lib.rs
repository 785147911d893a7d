//! Sabersort Core - finds the original source of a local image
//!
//! Given only a local copy of an image, this crate reverse-searches it,
//! decides which search result is really the same picture by comparing
//! perceptual hashes, resolves that post on its origin site (Pixiv,
//! Twitter) to its individual pages, and picks the page whose pixels match.
//!
//! # Components
//!
//! - [`hasher`]: perceptual hashes and the distance/threshold policy
//! - [`search`]: the [`CandidateSource`] seam to a reverse image search engine
//! - [`origin`]: per-site [`OriginResolver`]s behind an [`OriginRegistry`]
//! - [`engine`]: candidate and variant selection over one [`ResolutionContext`]
//! - [`store`]: the index of already-sorted images
//! - [`sorter`]: batch processing of a directory with concurrent workers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sabersort_core::{Config, MockCandidateSource, Sorter};
//!
//! # async fn example() -> sabersort_core::Result<()> {
//! let config = Config::load("sabersort.toml".as_ref()).await?;
//! let source = Arc::new(MockCandidateSource::default());
//!
//! let sorter = Sorter::from_config(&config, source).await?;
//! let report = sorter.run().await?;
//! println!("{} resolved, {} not found", report.resolved, report.not_matched);
//! # Ok(())
//! # }
//! ```

pub mod candidate;
pub mod config;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod hasher;
pub mod origin;
pub mod search;
pub mod sorter;
pub mod store;

pub use candidate::{Candidate, CandidateList, Origin, SearchPolicy, SortOrder};
pub use config::Config;
pub use engine::{MatchPolicy, Outcome, ResolutionContext, ResolutionEngine, ResolutionState};
pub use error::{Result, SaberError};
pub use formatter::{FilenameFields, FilenameFormat};
pub use hasher::{hamming_distance, HashAlgorithm, PerceptualHash, PerceptualHasher};
pub use origin::{
    MockOrigin, OriginRegistry, OriginResolver, OriginVariantSet, PixivResolver, TwitterResolver,
};
pub use search::{CandidateSource, MockCandidateSource};
pub use sorter::{ImageOutcome, SortOptions, SortReport, Sorter};
pub use store::{
    exists_and_valid, prune_index, IndexRecord, MemoryRecordStore, PruneReport, RecordStore,
    SqliteRecordStore, StoreError,
};
