//! Batch sorting of an input directory.
//!
//! Every regular file in the input directory is resolved independently and
//! routed to one of three holding areas:
//!
//! - **found**: the resolved full-resolution image, named from the template,
//!   and an index record for it
//! - **not found**: an unchanged copy of the input
//! - **except**: a copy of the input named after the matched post, when the
//!   post is gone, none of its pages matched, or the matched page could not
//!   be downloaded
//!
//! Images run concurrently up to the worker count. A failing image is logged
//! and counted; it never stops the batch.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::candidate::{normalize_extension, Candidate};
use crate::config::Config;
use crate::engine::{Outcome, ResolutionContext, ResolutionEngine};
use crate::error::{Result, SaberError};
use crate::formatter::{FilenameFields, FilenameFormat};
use crate::origin::OriginRegistry;
use crate::search::{content_hash, CandidateSource};
use crate::store::{
    exists_and_valid, prune_index, IndexRecord, PruneReport, RecordStore, SqliteRecordStore,
    StoreError,
};

/// Where inputs come from and where each outcome goes.
#[derive(Debug, Clone)]
pub struct SortOptions {
    pub input_dir: PathBuf,
    pub found_dir: PathBuf,
    pub not_found_dir: PathBuf,
    pub except_dir: PathBuf,
    pub filename: FilenameFormat,
    pub workers: usize,
    /// Prune the index before sorting; `Some(true)` also re-hashes files
    pub prune: Option<bool>,
}

impl SortOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            input_dir: config.sort.input_dir.clone(),
            found_dir: config.sort.found_dir.clone(),
            not_found_dir: config.sort.not_found_dir.clone(),
            except_dir: config.sort.except_dir.clone(),
            filename: config.filename_format()?,
            workers: config.sort.workers,
            prune: config
                .index
                .check_on_start
                .then_some(config.index.check_hash),
        })
    }
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Resolved { dest: PathBuf },
    NotMatched { dest: PathBuf },
    PostDeleted { dest: PathBuf },
    NoVariantMatch { dest: PathBuf },
    /// Already indexed and the saved file is intact
    AlreadyIndexed,
    /// Not an image
    Skipped,
    Failed { reason: String },
}

/// Per-outcome counts of a sort run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortReport {
    pub resolved: usize,
    pub not_matched: usize,
    pub post_deleted: usize,
    pub no_variant_match: usize,
    pub already_indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pruned: Option<PruneReport>,
}

impl SortReport {
    pub fn record(&mut self, outcome: &ImageOutcome) {
        let counter = match outcome {
            ImageOutcome::Resolved { .. } => &mut self.resolved,
            ImageOutcome::NotMatched { .. } => &mut self.not_matched,
            ImageOutcome::PostDeleted { .. } => &mut self.post_deleted,
            ImageOutcome::NoVariantMatch { .. } => &mut self.no_variant_match,
            ImageOutcome::AlreadyIndexed => &mut self.already_indexed,
            ImageOutcome::Skipped => &mut self.skipped,
            ImageOutcome::Failed { .. } => &mut self.failed,
        };
        *counter += 1;
    }

    /// Files looked at.
    pub fn total(&self) -> usize {
        self.resolved
            + self.not_matched
            + self.post_deleted
            + self.no_variant_match
            + self.already_indexed
            + self.skipped
            + self.failed
    }
}

/// Runs the resolution engine over a directory.
pub struct Sorter {
    engine: ResolutionEngine,
    store: Arc<dyn RecordStore>,
    options: SortOptions,
}

impl Sorter {
    pub fn new(engine: ResolutionEngine, store: Arc<dyn RecordStore>, options: SortOptions) -> Self {
        Self {
            engine,
            store,
            options,
        }
    }

    /// Build a sorter from configuration: SQLite index, Pixiv and Twitter
    /// resolvers, and the given search backend.
    #[instrument(level = "debug", skip_all, fields(input_dir = %config.sort.input_dir.display()))]
    pub async fn from_config(config: &Config, source: Arc<dyn CandidateSource>) -> Result<Self> {
        config.validate()?;
        let hasher = config.hasher();
        let store =
            SqliteRecordStore::open(&config.index.database_path, &hasher.signature()).await?;
        let origins = OriginRegistry::from_config(
            config.http_config(),
            config.pixiv.clone(),
            config.twitter.clone(),
        )?;
        let engine = ResolutionEngine::new(hasher, source, origins, config.match_policy());

        Ok(Self::new(
            engine,
            Arc::new(store),
            SortOptions::from_config(config)?,
        ))
    }

    /// Sort every file in the input directory.
    pub async fn run(&self) -> Result<SortReport> {
        for dir in [
            &self.options.found_dir,
            &self.options.not_found_dir,
            &self.options.except_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut report = SortReport::default();
        if let Some(check_hash) = self.options.prune {
            let pruned = prune_index(self.store.as_ref(), self.engine.hasher(), check_hash).await?;
            report.pruned = Some(pruned);
        }

        let inputs = self.input_files().await?;
        info!(
            files = inputs.len(),
            workers = self.options.workers,
            "Sorting input directory"
        );

        let outcomes: Vec<ImageOutcome> = stream::iter(inputs)
            .map(|path| async move { self.process_path(&path).await })
            .buffer_unordered(self.options.workers.max(1))
            .collect()
            .await;

        for outcome in &outcomes {
            report.record(outcome);
        }
        info!(
            resolved = report.resolved,
            not_matched = report.not_matched,
            post_deleted = report.post_deleted,
            no_variant_match = report.no_variant_match,
            already_indexed = report.already_indexed,
            skipped = report.skipped,
            failed = report.failed,
            "Sort complete"
        );
        Ok(report)
    }

    /// Resolve and route one file. Errors become [`ImageOutcome::Failed`].
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn process_path(&self, path: &Path) -> ImageOutcome {
        match self.process_image(path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Image failed");
                ImageOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn process_image(&self, path: &Path) -> Result<ImageOutcome> {
        let data: Arc<[u8]> = tokio::fs::read(path).await?.into();
        let source_hash = match self.engine.hash_source(path, data.clone()).await {
            Ok(hash) => hash,
            Err(e @ SaberError::UnreadableImage(_)) => {
                warn!(error = %e, "Skipping unreadable image");
                return Ok(ImageOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        match exists_and_valid(self.store.as_ref(), self.engine.hasher(), &source_hash).await? {
            (true, true) => {
                debug!(hash = %source_hash, "Already indexed");
                return Ok(ImageOutcome::AlreadyIndexed);
            }
            (true, false) => {
                info!(hash = %source_hash, "Indexed file is stale, resolving again");
                self.store.delete(&source_hash.to_hex()).await?;
            }
            (false, _) => {}
        }

        let mut ctx = ResolutionContext::new(path, source_hash, Some(content_hash(&data)));
        match self.engine.resolve(&mut ctx, &data).await? {
            Outcome::Resolved {
                candidate,
                variant_index,
                variant_uri,
            } => {
                let bytes = match self.engine.fetch_variant(&candidate, &variant_uri).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(
                            uri = %variant_uri,
                            error = %e,
                            "Full-resolution download failed, routing as no variant match"
                        );
                        let dest = self.copy_to_except(path, &candidate).await?;
                        return Ok(ImageOutcome::NoVariantMatch { dest });
                    }
                };
                let dest = self
                    .save_resolved(&ctx, &candidate, variant_index, &variant_uri, bytes)
                    .await?;
                Ok(ImageOutcome::Resolved { dest })
            }
            Outcome::NotMatched => {
                let name = path.file_name().unwrap_or_else(|| OsStr::new("unnamed"));
                let dest = self.options.not_found_dir.join(name);
                copy_file(path, &dest).await?;
                Ok(ImageOutcome::NotMatched { dest })
            }
            Outcome::PostDeleted { candidate } => {
                let dest = self.copy_to_except(path, &candidate).await?;
                Ok(ImageOutcome::PostDeleted { dest })
            }
            Outcome::NoVariantMatch { candidate } => {
                let dest = self.copy_to_except(path, &candidate).await?;
                Ok(ImageOutcome::NoVariantMatch { dest })
            }
        }
    }

    async fn save_resolved(
        &self,
        ctx: &ResolutionContext,
        candidate: &Candidate,
        variant_index: usize,
        variant_uri: &str,
        bytes: Vec<u8>,
    ) -> Result<PathBuf> {
        let extension =
            variant_extension(variant_uri).unwrap_or_else(|| candidate.extension.clone());
        let fields = FilenameFields::from_candidate(candidate, Some(variant_index));
        let dest = self
            .options
            .found_dir
            .join(self.options.filename.render(&fields, &extension));
        write_file(&dest, &bytes).await?;

        let record = IndexRecord {
            hash: ctx.source_hash.to_hex(),
            author: candidate.author.clone(),
            author_id: candidate.author_id.clone(),
            author_link: candidate.author_link.clone(),
            width: candidate.width,
            height: candidate.height,
            origin_link: candidate.post_link.clone(),
            path: dest.to_string_lossy().into_owned(),
            size: bytes.len() as u64,
        };
        match self.store.insert(&record).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(hash)) => {
                warn!(hash, "Another worker indexed this image first");
            }
            Err(e) => return Err(e.into()),
        }

        info!(dest = %dest.display(), bytes = bytes.len(), "Saved resolved image");
        Ok(dest)
    }

    /// Copy the input under a name derived from the matched candidate.
    async fn copy_to_except(&self, path: &Path, candidate: &Candidate) -> Result<PathBuf> {
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .map(normalize_extension)
            .unwrap_or_else(|| candidate.extension.clone());
        let fields = FilenameFields::from_candidate(candidate, None);
        let dest = self
            .options
            .except_dir
            .join(self.options.filename.render(&fields, &extension));
        copy_file(path, &dest).await?;
        Ok(dest)
    }

    /// Regular files of the input directory, sorted by name.
    async fn input_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.options.input_dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// File extension of a variant URL: the `format` query parameter when
/// present (Twitter), else the extension of the last path segment.
pub fn variant_extension(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    if let Some((_, format)) = url.query_pairs().find(|(k, _)| k == "format") {
        return Some(normalize_extension(&format));
    }
    let segment = url.path_segments()?.last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then(|| normalize_extension(ext))
}

async fn write_file(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, bytes).await?;
    Ok(())
}

async fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(src, dest).await?;
    debug!(src = %src.display(), dest = %dest.display(), "Copied input");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_extension() {
        assert_eq!(
            variant_extension("https://pbs.twimg.com/media/A1?format=jpg&name=orig").as_deref(),
            Some("jpg")
        );
        assert_eq!(
            variant_extension("https://i.pximg.net/img-original/img/2024/01/01/100_p0.PNG")
                .as_deref(),
            Some("png")
        );
        assert_eq!(variant_extension("https://example.com/media/noext"), None);
        assert_eq!(variant_extension("o2"), None);
    }

    #[test]
    fn test_report_counts() {
        let mut report = SortReport::default();
        report.record(&ImageOutcome::Resolved {
            dest: PathBuf::from("a"),
        });
        report.record(&ImageOutcome::NoVariantMatch {
            dest: PathBuf::from("b"),
        });
        report.record(&ImageOutcome::PostDeleted {
            dest: PathBuf::from("c"),
        });
        report.record(&ImageOutcome::Skipped);
        report.record(&ImageOutcome::Failed {
            reason: "boom".into(),
        });

        assert_eq!(report.resolved, 1);
        assert_eq!(report.no_variant_match, 1);
        assert_eq!(report.post_deleted, 1);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.index.check_on_start = true;
        config.index.check_hash = true;
        let options = SortOptions::from_config(&config).unwrap();
        assert_eq!(options.prune, Some(true));
        assert_eq!(options.workers, 3);

        config.index.check_on_start = false;
        assert_eq!(SortOptions::from_config(&config).unwrap().prune, None);
    }
}
