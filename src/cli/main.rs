//! Sign translation CLI tool
//!
//! Command-line interface for both directions: classifying sign clips into
//! text, and composing sign videos from text.

use super::config::CliConfigBuilder;
use crate::{
    backends::video::VideoFormat,
    bundle::{Backbone, BundleOptions, InputGeometry, ModelBundle},
    classifier::{Prediction, SignClassifier},
    labels::{labels_from_dataset, LabelCodec},
    phrases::{PhraseLibrary, PhraseMatcher},
    sampling::SamplingStrategy,
    store::TranslationStore,
    text_to_sign::TextToSignPipeline,
    tracing_config::{spans, TracingConfig},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::Instrument;
use walkdir::WalkDir;

/// Sign language translation tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "sign-translate")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:cuda, tract:cpu)
    #[arg(short, long, global = true)]
    pub execution_provider: Option<String>,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify sign clips into text labels
    Classify(ClassifyArgs),
    /// Compose a sign video for a sentence
    Generate(GenerateArgs),
    /// Show how a sentence decomposes into dataset phrases, without writing video
    Match(MatchArgs),
    /// Classify clips as they arrive in an inbox directory
    Watch(WatchArgs),
    /// Package exported weights and labels into a model bundle
    Bundle(BundleArgs),
    /// Show execution provider diagnostics
    Providers,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Classify(_) => "classify",
            Self::Generate(_) => "generate",
            Self::Match(_) => "match",
            Self::Watch(_) => "watch",
            Self::Bundle(_) => "bundle",
            Self::Providers => "providers",
        }
    }
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Clip files to classify
    #[arg(value_name = "CLIP", required = true)]
    pub clips: Vec<PathBuf>,

    /// Model bundle directory [default: from config, or models/sign]
    #[arg(short, long)]
    pub bundle: Option<PathBuf>,

    /// Number of ranked labels per clip
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLayout {
    Flat,
    Nested,
    Auto,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliSampling {
    Uniform,
    Leading,
}

/// Dataset and matching options shared by `generate` and `match`
#[derive(Args, Debug)]
pub struct CompositionArgs {
    /// Directory of reference clips
    #[arg(short, long, value_name = "DIR")]
    pub dataset: PathBuf,

    /// Matching strategy (dp, greedy)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Longest phrase window tried by the greedy strategy
    #[arg(long)]
    pub max_window: Option<usize>,

    /// Dataset layout
    #[arg(short, long, value_enum)]
    pub layout: Option<CliLayout>,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Sentence to translate
    pub sentence: String,

    #[command(flatten)]
    pub composition: CompositionArgs,

    /// Output video file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Video codec for the output (h264, h265, mpeg4, vp9)
    #[arg(long)]
    pub codec: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Sentence to decompose
    pub sentence: String,

    #[command(flatten)]
    pub composition: CompositionArgs,

    /// Print the decomposition as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory polled for new clips
    #[arg(short, long, value_name = "DIR")]
    pub inbox: PathBuf,

    /// Model bundle directory [default: from config, or models/sign]
    #[arg(short, long)]
    pub bundle: Option<PathBuf>,

    /// Seconds between polls
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    /// Keep processed clips instead of deleting them
    #[arg(long)]
    pub keep: bool,

    /// Process the current inbox contents once and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct BundleArgs {
    /// Exported ONNX model
    #[arg(short, long)]
    pub model: PathBuf,

    /// Nested training dataset to fit labels from
    #[arg(long, conflicts_with = "labels", required_unless_present = "labels")]
    pub dataset: Option<PathBuf>,

    /// Existing labels.json (class names in id order)
    #[arg(long)]
    pub labels: Option<PathBuf>,

    /// Network architecture (r3d_18, mc3_18, r2plus1d_18)
    #[arg(long, default_value = "r3d_18")]
    pub backbone: String,

    /// Frames per sampled clip
    #[arg(long, default_value_t = 16)]
    pub frames: usize,

    /// Input frame height
    #[arg(long, default_value_t = 112)]
    pub height: u32,

    /// Input frame width
    #[arg(long, default_value_t = 112)]
    pub width: u32,

    /// Temporal sampling the model was trained with
    #[arg(long, value_enum, default_value_t = CliSampling::Uniform)]
    pub sampling: CliSampling,

    /// Output bundle directory
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = uuid::Uuid::new_v4().to_string();
    let _guard = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_session_id(&session_id)
        .init()
        .context("Failed to initialize tracing")?;

    let span = spans::session(&session_id, cli.command.name());
    run(&cli).instrument(span).await
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Classify(args) => classify(cli, args),
        Command::Generate(args) => generate(cli, args),
        Command::Match(args) => match_sentence(cli, args),
        Command::Watch(args) => watch(cli, args).await,
        Command::Bundle(args) => create_bundle(args),
        Command::Providers => {
            show_provider_diagnostics();
            Ok(())
        },
    }
}

#[derive(Serialize)]
struct ClipResult<'a> {
    clip: &'a Path,
    predictions: &'a [Prediction],
}

fn load_classifier(cli: &Cli, bundle: Option<&Path>, top_k: Option<usize>) -> Result<SignClassifier> {
    let config = CliConfigBuilder::classifier(cli, bundle, top_k)?;
    let span = spans::model_loading(
        &config.bundle_dir,
        &config.backend_type.to_string(),
        &config.execution_provider.to_string(),
    );
    let _entered = span.enter();

    SignClassifier::new(&config)
        .with_context(|| format!("Failed to load model bundle {}", config.bundle_dir.display()))
}

fn classify(cli: &Cli, args: &ClassifyArgs) -> Result<()> {
    let mut classifier = load_classifier(cli, args.bundle.as_deref(), args.top_k)?;
    let top_k = classifier.default_top_k();
    info!(
        "Loaded {} labels from {}",
        classifier.labels().len(),
        classifier.bundle().root().display()
    );

    let progress = (args.clips.len() > 1 && !args.json).then(|| {
        let pb = ProgressBar::new(args.clips.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    });

    let start = Instant::now();
    let mut failed = 0usize;
    for clip in &args.clips {
        if let Some(pb) = &progress {
            pb.set_message(clip.display().to_string());
        }

        let span = spans::classification(clip);
        let result = span.in_scope(|| classifier.classify(clip, top_k));
        match result {
            Ok(predictions) => {
                let line = if args.json {
                    serde_json::to_string(&ClipResult {
                        clip,
                        predictions: &predictions,
                    })?
                } else {
                    format_predictions(clip, &predictions)
                };
                match &progress {
                    Some(pb) => pb.println(line),
                    None => println!("{line}"),
                }
            },
            Err(e) => {
                error!("Failed to classify {}: {}", clip.display(), e);
                failed += 1;
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!("{} classified, {} failed", args.clips.len() - failed, failed));
    }
    info!(
        "Classified {} clip(s) in {:.2}s",
        args.clips.len() - failed,
        start.elapsed().as_secs_f64()
    );

    if failed > 0 {
        anyhow::bail!("{failed} of {} clip(s) failed", args.clips.len());
    }
    Ok(())
}

fn format_predictions(clip: &Path, predictions: &[Prediction]) -> String {
    let ranked: Vec<String> = predictions
        .iter()
        .map(|p| format!("{} ({:.1}%)", p.label, p.confidence * 100.0))
        .collect();
    format!("{}: {}", clip.display(), ranked.join(", "))
}

fn generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let config = CliConfigBuilder::composition(cli, &args.composition, args.codec.as_deref())?;
    let pipeline = TextToSignPipeline::new(&config).context("Failed to set up video backend")?;

    let span = spans::composition(&args.output);
    let report = span
        .in_scope(|| pipeline.generate(&args.sentence, &args.composition.dataset, &args.output))
        .with_context(|| format!("Failed to generate sign video for '{}'", args.sentence))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("✅ {}", report.composition.output_path.display());
    for segment in &report.segments {
        println!("  • {} → {}", segment.phrase, segment.clip_path.display());
    }
    for skipped in &report.composition.skipped {
        println!("  ⚠️  skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    println!(
        "  {} frames, {}x{} @ {:.2} fps",
        report.composition.frames_written,
        report.composition.width,
        report.composition.height,
        report.composition.fps
    );
    Ok(())
}

fn match_sentence(cli: &Cli, args: &MatchArgs) -> Result<()> {
    let config = CliConfigBuilder::composition(cli, &args.composition, None)?;
    let span = spans::matching(&args.composition.dataset, &format!("{:?}", config.strategy));
    let _entered = span.enter();

    let library = PhraseLibrary::build(&args.composition.dataset, config.layout)
        .context("Failed to index dataset")?;
    let segments = PhraseMatcher::new(config.strategy)
        .match_sentence(&args.sentence, &library)
        .context("Failed to match sentence")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&segments)?);
        return Ok(());
    }

    if segments.is_empty() {
        warn!("No known phrase in '{}'", args.sentence);
        return Ok(());
    }
    for segment in &segments {
        println!(
            "[{}..{}] {} → {}",
            segment.start_word,
            segment.start_word + segment.word_count,
            segment.phrase,
            segment.clip_path.display()
        );
    }
    Ok(())
}

async fn watch(cli: &Cli, args: &WatchArgs) -> Result<()> {
    if !args.inbox.is_dir() {
        anyhow::bail!("Inbox is not a directory: {}", args.inbox.display());
    }

    let mut classifier = load_classifier(cli, args.bundle.as_deref(), Some(1))?;
    let store = TranslationStore::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let interval = Duration::from_secs(args.interval.max(1));
    info!(
        "Watching {} every {}s",
        args.inbox.display(),
        interval.as_secs()
    );

    loop {
        for clip in pending_clips(&args.inbox, &seen)? {
            let clip_id = clip
                .strip_prefix(&args.inbox)
                .unwrap_or(&clip)
                .to_string_lossy()
                .replace('\\', "/");

            let (returned, result) = classify_blocking(classifier, clip.clone()).await?;
            classifier = returned;

            let record = match result {
                Ok(predictions) => {
                    let text = predictions.first().map(|p| p.label.clone()).unwrap_or_default();
                    store.publish_success(&clip_id, text)
                },
                Err(e) => {
                    warn!("Failed to classify {}: {}", clip.display(), e);
                    store.publish_failure(&clip_id, &e)
                },
            };
            println!("{}", serde_json::to_string(&record)?);

            if args.keep {
                seen.insert(clip);
            } else if let Err(e) = std::fs::remove_file(&clip) {
                warn!("Failed to remove {}: {}", clip.display(), e);
                seen.insert(clip);
            }
        }

        if args.once {
            return Ok(());
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {},
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watcher");
                return Ok(());
            },
        }
    }
}

/// Run one classification on the blocking pool, handing the classifier back
async fn classify_blocking(
    mut classifier: SignClassifier,
    clip: PathBuf,
) -> Result<(SignClassifier, crate::Result<Vec<Prediction>>)> {
    tokio::task::spawn_blocking(move || {
        let result = classifier.classify(&clip, 1);
        (classifier, result)
    })
    .await
    .context("Classification task panicked")
}

/// Video files directly inside `inbox`, sorted, excluding already handled ones
fn pending_clips(inbox: &Path, seen: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut clips = Vec::new();
    for entry in WalkDir::new(inbox)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to scan {}", inbox.display()))?;
        let path = entry.into_path();
        if path.is_file() && VideoFormat::from_path(&path).is_some() && !seen.contains(&path) {
            clips.push(path);
        }
    }
    Ok(clips)
}

fn create_bundle(args: &BundleArgs) -> Result<()> {
    let labels = match (&args.dataset, &args.labels) {
        (Some(dataset), _) => {
            let labels = labels_from_dataset(dataset)
                .with_context(|| format!("Failed to read labels from {}", dataset.display()))?;
            LabelCodec::fit(labels).context("Failed to fit label codec")?
        },
        (None, Some(path)) => LabelCodec::load(path)
            .with_context(|| format!("Failed to load labels from {}", path.display()))?,
        (None, None) => anyhow::bail!("Either --dataset or --labels is required"),
    };

    let options = BundleOptions {
        backbone: Backbone::parse(&args.backbone)?,
        input: InputGeometry {
            frames: args.frames,
            height: args.height,
            width: args.width,
        },
        sampling: match args.sampling {
            CliSampling::Uniform => SamplingStrategy::Uniform,
            CliSampling::Leading => SamplingStrategy::Leading,
        },
        normalization: None,
    };

    let bundle = ModelBundle::create(&args.output, &args.model, &labels, &options)
        .context("Failed to create bundle")?;
    let manifest = bundle.manifest();
    println!("📦 Bundle written to {}", bundle.root().display());
    println!("  └─ Backbone: {}", manifest.backbone);
    println!("  └─ Classes: {}", manifest.num_classes);
    println!(
        "  └─ Input: {} frames of {}x{} ({:?} sampling)",
        manifest.input.frames, manifest.input.width, manifest.input.height, manifest.sampling
    );
    Ok(())
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for provider in ExecutionProviderManager::list_all_providers() {
        let status = if provider.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!("  • {}: {} - {}", provider.name, status, provider.description);
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Use Apple CoreML (macOS)");
    println!("  --execution-provider tract:cpu    # Use pure Rust Tract backend");
}
