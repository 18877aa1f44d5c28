use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use trackstore::{
    AnyTrack, Attributes, BlockStore, DatasetId, FeatureFilter, FeatureKind, FileStore,
    ImportConfig, ImportPipeline, SequenceId, SequenceNameResolver, StoreConfig, Strand,
    TabularFeatureSource, Topology, TrackId,
};
use trackstore::import::LogProgress;

/// Options shared by every command that imports
#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// Store directory
    pub store: PathBuf,

    /// Dataset the new tracks belong to
    #[arg(long)]
    pub dataset: u64,

    /// Feature kind: segment, positional, gene, peptide, matrix (or the full type name)
    #[arg(long, value_parser = parse_kind)]
    pub kind: FeatureKind,

    /// Track attribute as key=value, repeatable
    #[arg(long = "attr", value_name = "KEY=VALUE")]
    pub attributes: Vec<String>,

    /// Maximum number of features per stored block
    #[arg(long = "block-size", default_value_t = trackstore::config::DEFAULT_MAX_BLOCK_FEATURES)]
    pub block_size: usize,

    /// Matrix column count (default: number of value columns in the file)
    #[arg(long)]
    pub columns: Option<usize>,

    /// Worker threads for importing several files (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Tab-delimited input files, one track each
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Store directory
    pub store: PathBuf,

    #[arg(long)]
    pub track: u64,

    /// Sequence name, in any spelling the dataset recognizes
    #[arg(long)]
    pub sequence: String,

    #[arg(long, default_value = "*", value_parser = parse_strand)]
    pub strand: Strand,

    #[arg(long)]
    pub start: i64,

    /// Exclusive end of the window
    #[arg(long)]
    pub end: i64,

    /// Number of decoded blocks kept in memory
    #[arg(long = "cache-blocks", default_value_t = trackstore::config::DEFAULT_CACHE_BLOCKS)]
    pub cache_blocks: usize,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a dataset and register its sequences
    Init {
        /// Store directory (created if missing)
        store: PathBuf,

        /// Dataset name
        #[arg(long)]
        dataset: String,

        /// Sequence list: name<TAB>length[<TAB>linear|circular]
        #[arg(long)]
        sequences: PathBuf,
    },

    /// Import tab-delimited feature files as new tracks
    Import(ImportArgs),

    /// Print features overlapping a window as TSV
    Query(QueryArgs),

    /// List datasets and their tracks
    Tracks {
        store: PathBuf,

        #[arg(long)]
        dataset: Option<u64>,
    },

    /// Show track metadata, attributes and block layout
    Info {
        store: PathBuf,

        #[arg(long)]
        track: u64,
    },

    /// Delete a published track
    Delete {
        store: PathBuf,

        #[arg(long)]
        track: u64,
    },
}

#[derive(Debug, Parser)]
#[command(name = "trackstore", author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trackstore=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Init {
            store,
            dataset,
            sequences,
        } => cmd_init(&store, &dataset, &sequences),
        Commands::Import(args) => cmd_import(args),
        Commands::Query(args) => cmd_query(args),
        Commands::Tracks { store, dataset } => cmd_tracks(&store, dataset.map(DatasetId)),
        Commands::Info { store, track } => cmd_info(&store, TrackId(track)),
        Commands::Delete { store, track } => cmd_delete(&store, TrackId(track)),
    }
}

fn parse_kind(s: &str) -> Result<FeatureKind> {
    s.parse().map_err(|e| anyhow!("{e}"))
}

fn parse_strand(s: &str) -> Result<Strand> {
    s.parse().map_err(|e| anyhow!("{e}"))
}

fn parse_attributes(pairs: &[String]) -> Result<Attributes> {
    let mut attributes = Attributes::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid attribute {:?}, expected KEY=VALUE", pair))?;
        attributes.set(key.trim(), value.trim());
    }
    Ok(attributes)
}

fn open_store(path: &Path) -> Result<Arc<dyn BlockStore>> {
    let store = FileStore::open(path).with_context(|| format!("opening store {:?}", path))?;
    Ok(Arc::new(store))
}

/// `trackstore init <store> --dataset <name> --sequences <tsv>`
fn cmd_init(store_path: &Path, name: &str, sequences: &Path) -> Result<()> {
    let store = open_store(store_path)?;
    let text = fs::read_to_string(sequences)
        .with_context(|| format!("reading sequence list {:?}", sequences))?;

    let dataset = store.create_dataset(name)?;
    eprintln!("Created dataset {} ({})", dataset, name);

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cells = line.split('\t');
        let seq_name = cells.next().unwrap_or("").trim();
        let length = cells
            .next()
            .ok_or_else(|| anyhow!("line {}: missing sequence length", line_no + 1))?
            .trim()
            .parse::<i64>()
            .with_context(|| format!("line {}: invalid sequence length", line_no + 1))?;
        let topology = match cells.next() {
            Some(t) if !t.trim().is_empty() => t
                .parse::<Topology>()
                .map_err(|e| anyhow!("line {}: {}", line_no + 1, e))?,
            _ => Topology::Linear,
        };
        let id = store.add_sequence(dataset, seq_name, length, topology)?;
        eprintln!("   Sequence {}: {} ({} bp, {})", id, seq_name, length, topology);
    }
    Ok(())
}

/// `trackstore import <store> --dataset <id> --kind <kind> <file>...`
/// Distinct files are imported concurrently, each as its own track.
fn cmd_import(args: ImportArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let dataset = DatasetId(args.dataset);
    let sequences = store.sequences(dataset)?;
    if sequences.is_empty() {
        bail!("Dataset {} has no sequences; run `trackstore init` first", dataset);
    }
    let resolver = SequenceNameResolver::from_sequences(&sequences);
    let attributes = parse_attributes(&args.attributes)?;
    let config = ImportConfig::new().with_max_block_features(args.block_size);
    let threads = args.threads.unwrap_or_else(num_cpus::get).max(1);

    eprintln!("Importing {} file(s) as {} tracks...", args.files.len(), args.kind);
    eprintln!("   Store: {:?}", args.store);
    eprintln!("   Dataset: {}", dataset);
    eprintln!("   Block size: {}", args.block_size);
    eprintln!("   Threads: {}", threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| anyhow!("Failed to build thread pool: {}", e))?;

    let start = Instant::now();
    let results: Vec<(PathBuf, Result<TrackId>)> = pool.install(|| {
        args.files
            .par_iter()
            .map(|file| {
                let result = import_file(
                    store.clone(),
                    dataset,
                    args.kind,
                    &attributes,
                    &config,
                    args.columns,
                    &resolver,
                    file,
                );
                (file.clone(), result)
            })
            .collect()
    });

    let mut failures = 0;
    for (file, result) in results {
        match result {
            Ok(id) => eprintln!("   {:?} -> track {}", file, id),
            Err(e) => {
                failures += 1;
                eprintln!("   {:?} FAILED: {:#}", file, e);
            }
        }
    }
    eprintln!("Import finished in {:.3}s", start.elapsed().as_secs_f64());

    if failures > 0 {
        bail!("{} of {} imports failed", failures, args.files.len());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn import_file(
    store: Arc<dyn BlockStore>,
    dataset: DatasetId,
    kind: FeatureKind,
    attributes: &Attributes,
    config: &ImportConfig,
    columns: Option<usize>,
    resolver: &SequenceNameResolver,
    file: &Path,
) -> Result<TrackId> {
    let name = file
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Invalid file path: {:?}", file))?;
    let mut source = TabularFeatureSource::open(file)?;
    let columns = match columns {
        Some(n) => n,
        None if kind == FeatureKind::QuantitativeSegmentMatrix => source.matrix_columns()?.len(),
        None => 0,
    };

    let id = ImportPipeline::new(store, dataset, name, kind)
        .with_attributes(attributes.clone())
        .with_config(*config)
        .with_columns(columns)
        .with_progress(LogProgress::new(name))
        .run(&mut source, resolver)?;
    Ok(id)
}

/// `trackstore query <store> --track <id> --sequence <name> --start N --end N`
/// Prints `sequence strand start end payload...` lines on stdout.
fn cmd_query(args: QueryArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let meta = store.track(TrackId(args.track))?;
    let sequences = store.sequences(meta.dataset)?;
    let resolver = SequenceNameResolver::from_sequences(&sequences);
    let sequence = resolver.map(&args.sequence)?;
    let sequence_name = sequences
        .iter()
        .find(|s| s.id == sequence)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| args.sequence.clone());

    let config = StoreConfig::new().with_cache_blocks(args.cache_blocks);
    let track = AnyTrack::open(store, meta.id, &config)?;
    let filter = FeatureFilter::new(sequence, args.strand, args.start, args.end);

    eprintln!("Querying track {} ({})", meta.id, meta.name);
    eprintln!(
        "   Window: {}:{}-{} strand {}",
        sequence_name, args.start, args.end, args.strand
    );

    let start = Instant::now();
    let lines = track.feature_lines(&filter)?;
    let query_time = start.elapsed();

    for (strand, line) in &lines {
        println!("{}\t{}\t{}", sequence_name, strand, line);
    }
    eprintln!("Query Results:");
    eprintln!("   Matching features: {}", lines.len());
    eprintln!("   Query time: {:.3}ms", query_time.as_secs_f64() * 1000.0);
    Ok(())
}

/// `trackstore tracks <store> [--dataset <id>]`
fn cmd_tracks(store_path: &Path, dataset: Option<DatasetId>) -> Result<()> {
    let store = open_store(store_path)?;
    for ds in store.datasets()? {
        if dataset.is_some_and(|id| id != ds.id) {
            continue;
        }
        println!("dataset {}\t{}", ds.id, ds.name);
        for seq in store.sequences(ds.id)? {
            println!("  sequence {}\t{}\t{}\t{}", seq.id, seq.name, seq.length, seq.topology);
        }
        for track in store.tracks(ds.id)? {
            println!(
                "  track {}\t{}\t{}\t{} features\t{} blocks",
                track.id,
                track.name,
                track.kind,
                track.feature_count(),
                track.index.len()
            );
        }
    }
    Ok(())
}

/// `trackstore info <store> --track <id>`
fn cmd_info(store_path: &Path, id: TrackId) -> Result<()> {
    let store = open_store(store_path)?;
    let meta = store.track(id)?;
    let sequences = store.sequences(meta.dataset)?;
    let seq_name = |id: SequenceId| {
        sequences
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
            .unwrap_or("?")
    };

    println!("Track {}: {}", meta.id, meta.name);
    println!("   Dataset: {}", meta.dataset);
    println!("   Kind: {}", meta.kind);
    if meta.kind == FeatureKind::QuantitativeSegmentMatrix {
        println!("   Columns: {}", meta.columns);
    }
    println!("   Features: {}", meta.feature_count());
    println!("   Blocks: {}", meta.index.len());
    for (key, value) in meta.attributes.iter() {
        println!("   Attribute {} = {}", key, value);
    }
    for (sequence, strand) in meta.index.buckets() {
        let keys: Vec<_> = meta.index.keys_for(sequence, strand).collect();
        let features: u64 = keys.iter().map(|k| k.len() as u64).sum();
        println!(
            "   {} {}: {} blocks, {} features, extent {}-{}",
            seq_name(sequence),
            strand,
            keys.len(),
            features,
            keys.iter().map(|k| k.min_start).min().unwrap_or(0),
            keys.iter().map(|k| k.max_end).max().unwrap_or(0),
        );
    }
    Ok(())
}

/// `trackstore delete <store> --track <id>`
fn cmd_delete(store_path: &Path, id: TrackId) -> Result<()> {
    let store = open_store(store_path)?;
    let meta = store.track(id)?;
    store.delete_track(id)?;
    eprintln!("Deleted track {} ({})", id, meta.name);
    Ok(())
}
