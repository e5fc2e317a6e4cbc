use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use neo_rag::embeddings;
use neo_rag::{
    IngestionPipeline, NeoStore, RagConfig, SimilarityMetric, StoreBackend, TextChunker,
};

#[derive(Parser)]
#[command(name = "neo")]
#[command(about = "Build and query a local NeoStore document index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a directory, chunk, embed and persist the store
    Build {
        /// Directory holding the source documents
        #[arg(long, value_name = "DIR")]
        source: Option<PathBuf>,

        /// Store file or directory to write
        #[arg(long, value_name = "PATH")]
        store: Option<PathBuf>,

        /// Loader worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// JSON config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },
    /// Search a persisted store
    Search {
        /// The query string
        query: String,

        /// Store file or directory to read
        #[arg(long, value_name = "PATH")]
        store: Option<PathBuf>,

        /// Number of results
        #[arg(short)]
        k: Option<usize>,

        /// cosine or euclidean
        #[arg(long)]
        metric: Option<SimilarityMetric>,

        /// JSON config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RagConfig> {
    let config = match path {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RagConfig::default(),
    };
    Ok(config)
}

fn build(
    source: Option<PathBuf>,
    store: Option<PathBuf>,
    threads: Option<usize>,
    config: Option<PathBuf>,
    no_progress: bool,
) -> Result<()> {
    let mut config = load_config(config.as_ref())?;
    if let Some(threads) = threads {
        config.ingestion.threads = threads;
    }
    if no_progress {
        config.ingestion.show_progress = false;
    }
    config.validate()?;

    let source = source.unwrap_or_else(|| config.source_dir.clone());
    let store_path = store.unwrap_or_else(|| config.store_path.clone());

    let report = IngestionPipeline::new(&config.ingestion).ingest(&source)?;
    println!("{}", report);
    for failure in &report.failures {
        eprintln!("  {} ({}): {}", failure.path.display(), failure.bucket, failure.error);
    }
    if report.documents.is_empty() {
        anyhow::bail!("no documents could be loaded from {}", source.display());
    }

    let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.overlap_ratio)?;
    let chunks = chunker.chunk_documents(&report.documents);
    println!("Split into {} chunks of text", chunks.len());

    let embedder = embeddings::from_config(&config.embedding)?;
    let mut store = NeoStore::new(embedder, config.search.metric)
        .with_progress(config.ingestion.show_progress);
    store.build_store(chunks, config.embedding.batch_size, false, &store_path)?;
    let written = store.save_embeddings(&store_path)?;
    println!("Store written to {}", written.display());
    Ok(())
}

fn search(
    query: String,
    store: Option<PathBuf>,
    k: Option<usize>,
    metric: Option<SimilarityMetric>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let store_path = store.unwrap_or_else(|| config.store_path.clone());
    let metric = metric.unwrap_or(config.search.metric);
    let k = k.unwrap_or(config.search.default_k);

    let embedder = embeddings::from_config(&config.embedding)?;
    let store = StoreBackend::Neo
        .open(&store_path, Arc::clone(&embedder), metric)
        .with_context(|| format!("opening store {}", store_path.display()))?;

    let hits = store.search(&query, k)?;
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. [{:.4}] {} #{}",
            rank + 1,
            hit.score,
            hit.source().display(),
            hit.chunk.metadata.chunk_index
        );
        let preview: String = hit.chunk.content.chars().take(200).collect();
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            source,
            store,
            threads,
            config,
            no_progress,
        } => build(source, store, threads, config, no_progress)?,
        Commands::Search {
            query,
            store,
            k,
            metric,
            config,
        } => search(query, store, k, metric, config)?,
    }

    Ok(())
}
