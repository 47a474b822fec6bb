use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rayon::ThreadPoolBuilder;
use serde_json::json;
use seqbpe::config::{BoundaryStyle, CooccurrenceConfig, IngestConfig, TrainerConfig};
use seqbpe::corpus::{load_fasta_corpus, load_word_corpus, FastaRecord};
use seqbpe::metrics::{marginal_frequencies, EncodingSummary};
use seqbpe::serialization::{self, text, EncodedRecord};
use seqbpe::{cooccurrence, BpeModel, Trainer, VocabularyArtifact};

const DEFAULT_RESULTS: &str = "output/results.csv";
const DEFAULT_MODEL: &str = "output/model.json";
const DEFAULT_COOCCURRENCE_DIR: &str = "output";

#[derive(Parser, Debug)]
#[command(author, version, about = "Sequence BPE toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Learn merge rules and encode the training sequences
    Learn(LearnArgs),
    /// Encode FASTA sequences with a trained model
    Encode(EncodeArgs),
    /// Build token co-occurrence statistics from an encoded results CSV
    Cooccur(CooccurArgs),
    /// Inspect a trained model
    Info(InfoArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Boundary {
    /// `<s>` ... `</s>` around every sequence
    Sentinels,
    /// `</w>` after every word
    EndOfWord,
    /// No markers
    None,
}

impl From<Boundary> for BoundaryStyle {
    fn from(value: Boundary) -> Self {
        match value {
            Boundary::Sentinels => BoundaryStyle::Sentinels,
            Boundary::EndOfWord => BoundaryStyle::EndOfWord,
            Boundary::None => BoundaryStyle::None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// FASTA records, one raw sequence per record
    Fasta,
    /// Whitespace separated words, one raw sequence per word
    Words,
}

#[derive(Args, Debug)]
struct LearnArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Number of merges to learn
    #[arg(short, long, value_name = "COUNT", default_value_t = 1000)]
    merges: usize,

    /// Boundary markers framing each sequence
    #[arg(long, value_enum, default_value_t = Boundary::Sentinels)]
    boundary: Boundary,

    /// Input format
    #[arg(long, value_enum, default_value_t = InputFormat::Fasta)]
    format: InputFormat,

    /// Uppercase residues while reading
    #[arg(long)]
    uppercase: bool,

    /// Output path for the per-sequence results CSV
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_RESULTS)]
    output: PathBuf,

    /// Output path for the model JSON
    #[arg(long, value_name = "PATH", default_value = DEFAULT_MODEL)]
    model: PathBuf,

    /// Also write marginal token frequencies next to the results CSV
    #[arg(short = 'f', long)]
    marginal_freq: bool,

    /// Print learned merge rules
    #[arg(short = 'c', long)]
    show_codes: bool,

    /// Print the learned token set
    #[arg(short = 't', long)]
    show_tokens: bool,

    /// Write encoded sequences in alternating case to this path
    #[arg(long, value_name = "PATH")]
    alternating: Option<PathBuf>,

    /// Emit pretty JSON
    #[arg(long)]
    pretty: bool,

    /// Disable per-iteration logging/progress
    #[arg(long)]
    no_progress: bool,

    /// Limit Rayon worker threads
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Disable recursive directory traversal
    #[arg(long)]
    no_recursive: bool,

    /// Follow symlinks during traversal
    #[arg(long)]
    follow_symlinks: bool,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Model JSON to load
    #[arg(short = 'm', long, value_name = "PATH")]
    model: PathBuf,

    /// FASTA inputs to encode
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Replay only the first N merges
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Uppercase residues while reading
    #[arg(long)]
    uppercase: bool,

    /// Emit JSON lines instead of human-readable output
    #[arg(long, conflicts_with = "output")]
    json: bool,

    /// Write a results CSV instead of printing
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CooccurArgs {
    /// Results CSV with a `bpe_encoded` column
    bpe_file: PathBuf,

    /// Context window size
    #[arg(short, long, value_name = "SIZE", default_value_t = 5)]
    window_size: usize,

    /// Minimum token count for the vocabulary
    #[arg(short = 'c', long, value_name = "COUNT", default_value_t = 1)]
    min_count: usize,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_COOCCURRENCE_DIR)]
    output_dir: PathBuf,

    /// Number of heaviest pairs to export (0 = all)
    #[arg(short, long, value_name = "N", default_value_t = 10_000)]
    top_pairs: usize,

    /// Tokens in the dense matrix view
    #[arg(short, long, value_name = "N", default_value_t = 50)]
    dense_size: usize,

    /// Accumulate with one partial table per worker thread
    #[arg(long)]
    parallel: bool,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Model JSON to inspect
    #[arg(short = 'm', long, value_name = "PATH")]
    model: PathBuf,

    /// Emit JSON instead of human-readable output
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Learn(args) => run_learn(args),
        Commands::Encode(args) => run_encode(args),
        Commands::Cooccur(args) => run_cooccur(args),
        Commands::Info(args) => run_info(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn spinner(enabled: bool, message: &'static str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {elapsed}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

fn load_records(
    inputs: &[PathBuf],
    format: InputFormat,
    ingest: &IngestConfig,
) -> Result<Vec<FastaRecord>> {
    let records = match format {
        InputFormat::Fasta => load_fasta_corpus(inputs, ingest)
            .with_context(|| "failed to load FASTA corpus")?,
        InputFormat::Words => load_word_corpus(inputs, ingest)
            .with_context(|| "failed to load word corpus")?
            .into_iter()
            .enumerate()
            .map(|(idx, word)| FastaRecord {
                header: format!("word_{}", idx + 1),
                sequence: word,
            })
            .collect(),
    };
    Ok(records)
}

fn encode_records(
    model: &BpeModel,
    records: &[FastaRecord],
    limit: Option<usize>,
) -> Vec<EncodedRecord> {
    let tokenizer = model.tokenizer();
    let limit = limit.unwrap_or(tokenizer.len());
    records
        .iter()
        .map(|record| EncodedRecord {
            sequence_id: record.header.clone(),
            original_sequence: record.sequence.clone(),
            tokens: tokenizer.encode_prefix(&record.sequence, limit),
        })
        .collect()
}

fn summarize(encoded: &[EncodedRecord]) -> EncodingSummary {
    let mut summary = EncodingSummary::default();
    for record in encoded {
        summary.record(&record.original_sequence, record.tokens.len());
    }
    summary
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    path.with_file_name(format!("{stem}{suffix}"))
}

fn run_learn(args: LearnArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("unable to configure Rayon thread pool")?;
    }

    let trainer_cfg = TrainerConfig::builder()
        .num_merges(args.merges)
        .boundary(args.boundary.into())
        .show_progress(!args.no_progress)
        .build()?;
    let ingest_cfg = IngestConfig::builder()
        .recursive(!args.no_recursive)
        .follow_symlinks(args.follow_symlinks)
        .uppercase(args.uppercase)
        .build();

    let records = load_records(&args.inputs, args.format, &ingest_cfg)?;
    if records.is_empty() {
        bail!("no sequences found in inputs");
    }
    let residues: usize = records.iter().map(|r| r.sequence.chars().count()).sum();
    info!("loaded {} sequences totalling {residues} residues", records.len());

    let pb = spinner(!args.no_progress, "learning merges...");
    let trainer = Trainer::new(trainer_cfg);
    let start = Instant::now();
    let sequences: Vec<&str> = records.iter().map(|r| r.sequence.as_str()).collect();
    let artifacts = trainer.train_from_sequences(&sequences)?;
    if let Some(pb) = pb {
        pb.finish_with_message("training complete");
    }
    let elapsed = start.elapsed();

    if args.show_codes {
        println!("Learned merge rules:");
        for (idx, rule) in artifacts.model.merges().iter().enumerate() {
            println!("{:4}: {rule}", idx + 1);
        }
    }
    if args.show_tokens {
        println!("Learned tokens ({}):", artifacts.learned_tokens.len());
        for token in &artifacts.learned_tokens {
            println!("  '{token}'");
        }
    }

    artifacts
        .model
        .save(&args.model, args.pretty)
        .with_context(|| format!("failed to save model to {}", args.model.display()))?;

    let encoded = encode_records(&artifacts.model, &records, None);
    serialization::save_encoded_results(&args.output, &encoded)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if args.marginal_freq {
        let path = sibling_path(&args.output, "_marginal_frequencies.csv");
        let streams: Vec<&[String]> = encoded.iter().map(|r| r.tokens.as_slice()).collect();
        serialization::save_marginal_frequencies(&path, &marginal_frequencies(&streams))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("marginal frequencies: {}", path.display());
    }

    if let Some(path) = &args.alternating {
        let streams: Vec<&[String]> = encoded.iter().map(|r| r.tokens.as_slice()).collect();
        write_text(path, |w| text::write_alternating_lines(w, &streams))?;
        println!("alternating case: {}", path.display());
    }

    let summary = summarize(&encoded);
    println!(
        "✅ learned {} merges ({:?}) in {elapsed:.2?}",
        artifacts.model.merges().len(),
        artifacts.metrics.stop_reason
    );
    println!(
        "   sequences {} | residues {} | tokens {} | compression {:.2}x",
        summary.sequences,
        summary.original_chars,
        summary.encoded_tokens,
        summary.compression_ratio()
    );
    println!("   model   : {}", args.model.display());
    println!("   results : {}", args.output.display());
    Ok(())
}

fn write_text<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    let model = BpeModel::load(&args.model)
        .with_context(|| format!("failed to load model from {}", args.model.display()))?;
    if let Some(limit) = args.limit {
        if limit > model.merges().len() {
            bail!(
                "--limit {limit} exceeds the {} merges stored in {}",
                model.merges().len(),
                args.model.display()
            );
        }
    }
    let ingest_cfg = IngestConfig::builder().uppercase(args.uppercase).build();
    let records = load_records(&args.inputs, InputFormat::Fasta, &ingest_cfg)?;
    let encoded = encode_records(&model, &records, args.limit);

    if let Some(path) = &args.output {
        serialization::save_encoded_results(path, &encoded)
            .with_context(|| format!("failed to write {}", path.display()))?;
        let summary = summarize(&encoded);
        println!(
            "encoded {} sequences to {} (compression {:.2}x)",
            summary.sequences,
            path.display(),
            summary.compression_ratio()
        );
    } else if args.json {
        for record in &encoded {
            let line = json!({
                "id": record.sequence_id,
                "tokens": record.tokens,
            });
            println!("{}", serde_json::to_string(&line)?);
        }
    } else {
        for record in &encoded {
            println!("{}:\t{}", record.sequence_id, text::space_joined(&record.tokens));
        }
    }
    Ok(())
}

fn run_cooccur(args: CooccurArgs) -> Result<()> {
    let cfg = CooccurrenceConfig::builder()
        .window_size(args.window_size)
        .min_count(args.min_count)
        .top_pairs((args.top_pairs > 0).then_some(args.top_pairs))
        .dense_size(args.dense_size)
        .parallel(args.parallel)
        .build()?;

    let streams = serialization::read_encoded_streams(&args.bpe_file)
        .with_context(|| format!("failed to read {}", args.bpe_file.display()))?;
    if streams.is_empty() {
        bail!("no token sequences found in {}", args.bpe_file.display());
    }

    let pb = spinner(true, "counting co-occurrences...");
    let analysis = cooccurrence::analyze(&streams, &cfg)?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    if analysis.vocab.is_empty() {
        bail!("no tokens meet the minimum count of {}", cfg.min_count);
    }

    let base = args
        .bpe_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    let vocab_path = args.output_dir.join(format!("{base}_vocabulary.json"));
    let rows_path = args.output_dir.join(format!("{base}_cooccurrence.csv"));
    let dense_path = args.output_dir.join(format!("{base}_dense_matrix.csv"));

    let artifact: VocabularyArtifact = analysis.vocab.artifact(cfg.window_size);
    serialization::save_vocabulary(&artifact, &vocab_path)
        .with_context(|| format!("failed to write {}", vocab_path.display()))?;
    serialization::save_cooccurrence_rows(&rows_path, &analysis.rows)
        .with_context(|| format!("failed to write {}", rows_path.display()))?;
    serialization::save_dense_matrix(&dense_path, &analysis.dense)
        .with_context(|| format!("failed to write {}", dense_path.display()))?;

    let (rows, cols) = analysis.stats.shape;
    println!("✅ co-occurrence analysis complete");
    println!("   input sequences : {}", streams.len());
    println!("   vocabulary size : {}", analysis.vocab.len());
    println!("   window size     : {}", cfg.window_size);
    println!("   matrix shape    : {rows}x{cols}");
    println!("   matrix sparsity : {:.2}%", analysis.stats.sparsity);
    println!("   pairs saved     : {}", analysis.rows.len());
    println!("   dense size      : {0}x{0}", analysis.dense.tokens.len());
    println!("   vocabulary      : {}", vocab_path.display());
    println!("   co-occurrence   : {}", rows_path.display());
    println!("   dense matrix    : {}", dense_path.display());
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let model = BpeModel::load(&args.model)
        .with_context(|| format!("failed to load model from {}", args.model.display()))?;
    let mut tokens: Vec<String> = model.merges().iter().map(|rule| rule.merged()).collect();
    tokens.sort_unstable();
    tokens.dedup();
    let longest = tokens.iter().map(|t| t.chars().count()).max().unwrap_or(0);

    if args.json {
        let summary = json!({
            "path": args.model.display().to_string(),
            "boundary": model.boundary(),
            "merges": model.merges().len(),
            "merged_tokens": tokens.len(),
            "longest_token": longest,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Boundary      : {}", model.boundary());
        println!("Merges        : {}", model.merges().len());
        println!("Merged tokens : {}", tokens.len());
        println!("Longest token : {longest}");
        if let Some(first) = model.merges().first() {
            println!("First merge   : {first}");
        }
    }
    Ok(())
}
