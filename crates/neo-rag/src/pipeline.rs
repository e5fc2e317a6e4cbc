//! Parallel ingestion: walk a source tree, load every supported file on a
//! bounded rayon pool and gather successes and failures into one report.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::IngestionConfig;
use crate::error::{RagError, Result};
use crate::loaders::{LoaderKind, LoaderRegistry};
use crate::progress;
use crate::types::Document;

/// Disjoint groups the walker sorts files into. Each bucket gets its own
/// worker count and partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Urls,
    Chats,
    Code,
    Documents,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::Urls, Bucket::Chats, Bucket::Code, Bucket::Documents];

    fn for_kind(kind: LoaderKind) -> Self {
        match kind {
            LoaderKind::UrlList => Bucket::Urls,
            LoaderKind::Chat => Bucket::Chats,
            LoaderKind::Code => Bucket::Code,
            _ => Bucket::Documents,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bucket::Urls => "urls",
            Bucket::Chats => "chats",
            Bucket::Code => "code",
            Bucket::Documents => "documents",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub bucket: Bucket,
    pub error: RagError,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: Vec<Document>,
    pub failures: Vec<IngestFailure>,
    /// Files with no loader; never attempted.
    pub skipped: Vec<PathBuf>,
}

impl IngestionReport {
    pub fn succeeded(&self) -> usize {
        self.documents.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Hand back the documents, or `PartialIngestionFailure` if anything failed.
    pub fn ensure_complete(self) -> Result<Vec<Document>> {
        if self.failures.is_empty() {
            Ok(self.documents)
        } else {
            Err(RagError::PartialIngestionFailure {
                succeeded: self.succeeded(),
                failed: self.failed(),
            })
        }
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents loaded, {} failed, see log",
            self.succeeded(),
            self.failed()
        )
    }
}

/// Workers for a bucket of `len` files: never more than the pool, never zero.
pub fn worker_count(thread_limit: usize, len: usize) -> usize {
    thread_limit.max(1).min(len.max(1))
}

/// Contiguous partition size so that `workers` partitions cover `len` files.
pub fn partition_size(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1)).max(1)
}

pub struct IngestionPipeline {
    registry: LoaderRegistry,
    threads: usize,
    show_progress: bool,
}

type Outcome = (Bucket, PathBuf, Result<Document>);

impl IngestionPipeline {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            registry: LoaderRegistry::new(config),
            threads: config.threads.max(1),
            show_progress: config.show_progress,
        }
    }

    pub fn with_registry(mut self, registry: LoaderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    /// Sort every regular file under `source_dir` into buckets. Unsupported files
    /// come back separately.
    pub fn classify(&self, source_dir: &Path) -> (Vec<(Bucket, Vec<PathBuf>)>, Vec<PathBuf>) {
        let mut buckets: Vec<(Bucket, Vec<PathBuf>)> =
            Bucket::ALL.iter().map(|b| (*b, Vec::new())).collect();
        let mut skipped = Vec::new();

        let mut files: Vec<PathBuf> = WalkDir::new(source_dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    let path = error
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    tracing::warn!(path = %path, error = %error, "cannot read directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();

        for path in files {
            match self.registry.kind_for(&path) {
                Some(kind) => {
                    let bucket = Bucket::for_kind(kind);
                    if let Some((_, paths)) = buckets.iter_mut().find(|(b, _)| *b == bucket) {
                        paths.push(path);
                    }
                }
                None => {
                    tracing::warn!(path = %path.display(), "skipping unsupported document type");
                    skipped.push(path);
                }
            }
        }
        (buckets, skipped)
    }

    pub fn ingest(&self, source_dir: &Path) -> Result<IngestionReport> {
        if !source_dir.is_dir() {
            return Err(RagError::InvalidArgument(format!(
                "source directory does not exist: {}",
                source_dir.display()
            )));
        }

        let started = Instant::now();
        let (buckets, skipped) = self.classify(source_dir);
        let total: usize = buckets.iter().map(|(_, paths)| paths.len()).sum();
        tracing::info!(
            source = %source_dir.display(),
            files = total,
            skipped = skipped.len(),
            threads = self.threads,
            "starting ingestion"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("neo-ingest-{}", i))
            .build()
            .map_err(|e| RagError::InvalidArgument(format!("cannot start worker pool: {}", e)))?;

        let pb = progress::bar(total as u64, self.show_progress, "files");
        let (tx, rx) = mpsc::channel::<Outcome>();
        let mut report = IngestionReport {
            skipped,
            ..Default::default()
        };

        pool.in_place_scope(|scope| {
            for (bucket, paths) in &buckets {
                if paths.is_empty() {
                    continue;
                }
                let workers = worker_count(self.threads, paths.len());
                let size = partition_size(paths.len(), workers);
                tracing::debug!(
                    %bucket,
                    files = paths.len(),
                    workers,
                    partition = size,
                    "dispatching bucket"
                );

                for partition in paths.chunks(size) {
                    let tx = tx.clone();
                    let bucket = *bucket;
                    scope.spawn(move |_| {
                        partition.par_iter().for_each_with(tx, |tx, path| {
                            let outcome = self.load_guarded(path);
                            // receiver is drained below until every sender is gone
                            let _ = tx.send((bucket, path.clone(), outcome));
                        });
                    });
                }
            }
            drop(tx);

            // Only this thread touches the report.
            for (bucket, path, outcome) in rx {
                pb.inc(1);
                match outcome {
                    Ok(document) => report.documents.push(document),
                    Err(error) => {
                        tracing::warn!(
                            path = %path.display(),
                            %bucket,
                            error = %error,
                            "failed to load document"
                        );
                        report.failures.push(IngestFailure { path, bucket, error });
                    }
                }
            }
        });
        pb.finish_and_clear();

        tracing::info!(
            documents = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Load one file, turning a loader panic into an ordinary failure.
    fn load_guarded(&self, path: &Path) -> Result<Document> {
        let loaded = std::panic::catch_unwind(AssertUnwindSafe(|| self.registry.load(path)));
        match loaded {
            Ok(result) => {
                result.map(|doc| doc.with_extra("loaded_at", Utc::now().to_rfc3339()))
            }
            Err(panic_info) => {
                let message = if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else {
                    "unknown panic".to_string()
                };
                Err(RagError::LoaderPanicked {
                    path: path.to_path_buf(),
                    message,
                })
            }
        }
    }
}
