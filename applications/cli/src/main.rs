/// Portatune - mirror a music tree onto a space-constrained portable player
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use portatune_core::{SyncConfig, TargetCodec};
use portatune_sync::{
    MediaCatalog, PipelineEvent, PipelineJob, PipelineStats, ProgressEstimator, PruneStats,
    ReconciliationEngine, StaleFilePruner, TempNamer, TranscodeJob, TranscodePipeline,
    TreeScanner,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
use config::{AppConfig, Overrides};

/// Default log filter; targets are the underscored crate names.
const DEFAULT_LOG_FILTER: &str =
    "portatune_cli=info,portatune_sync=info,portatune_tags=info,portatune_core=info";

#[derive(Parser)]
#[command(name = "portatune")]
#[command(about = "Synchronize a music tree to a transcoded portable mirror", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    Aac,
    Opus,
}

impl From<CodecArg> for TargetCodec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Aac => TargetCodec::Aac,
            CodecArg::Opus => TargetCodec::Opus,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the source tree to the destination mirror
    Sync {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Source music tree
        source: Option<PathBuf>,

        /// Destination mirror
        dest: Option<PathBuf>,

        /// Target codec for transcoded output
        #[arg(long)]
        codec: Option<CodecArg>,

        /// Media catalog (JSON) used for bitrates and durations
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Minimum source bitrate (kbps) for mp3 re-encoding, 0 for all
        #[arg(long)]
        min_bitrate: Option<u32>,

        /// Worker pool size for transcoding
        #[arg(long)]
        workers: Option<usize>,

        /// Path prefix to exclude from the scan (repeatable)
        #[arg(long)]
        exclude: Vec<PathBuf>,

        /// Path prefix to exclude from transcoding only (repeatable)
        #[arg(long)]
        exclude_transcode: Vec<PathBuf>,

        /// Fold album artist into artist on destination tags
        #[arg(long)]
        album_artist_workaround: bool,

        /// Remove obsolete destination files without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Scan the source tree and report what would be mirrored
    Scan {
        /// Source music tree
        path: PathBuf,

        /// Path prefix to exclude from the scan (repeatable)
        #[arg(long)]
        exclude: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            config,
            source,
            dest,
            codec,
            catalog,
            min_bitrate,
            workers,
            exclude,
            exclude_transcode,
            album_artist_workaround,
            yes,
        } => {
            let app_config = AppConfig::load(config.as_deref())?;
            let sync_config = app_config.into_sync_config(Overrides {
                source,
                dest,
                exclude,
                exclude_transcode,
                codec: codec.map(TargetCodec::from),
                min_bitrate,
                catalog,
                workers,
                album_artist_workaround,
                assume_yes: yes,
            })?;
            run_sync(sync_config).await?;
        }
        Commands::Scan { path, exclude } => {
            scan_tree(&path, exclude)?;
        }
    }

    Ok(())
}

async fn run_sync(config: SyncConfig) -> Result<()> {
    let started = Instant::now();

    let catalog = match &config.catalog_path {
        Some(path) => {
            let catalog = MediaCatalog::load(path, &config.source)?;
            tracing::info!("catalog: {} usable entries", catalog.len());
            Some(catalog)
        }
        None => None,
    };

    let mut scanner = TreeScanner::new(&config.source, config.exclude.clone());
    if let Some(catalog) = &catalog {
        scanner = scanner.with_catalog(catalog);
    }
    let index = scanner.scan()?;
    tracing::info!(
        "scanned {} files ({} covers), {} music directories",
        index.stats.files_indexed,
        index.stats.covers,
        index.music_dirs.len()
    );
    if index.stats.duplicate_tracks > 0 || index.stats.duplicate_dirs > 0 {
        tracing::warn!(
            "{} duplicate tracks and {} duplicate directories skipped",
            index.stats.duplicate_tracks,
            index.stats.duplicate_dirs
        );
    }

    let plan = ReconciliationEngine::new(&config, &index, catalog.as_ref()).reconcile()?;
    tracing::info!(
        "{} linked, {} replaced, {} up to date",
        plan.stats.linked,
        plan.stats.replaced_dest + plan.stats.replaced_source,
        plan.stats.up_to_date
    );

    let config = Arc::new(config);
    let namer = Arc::new(TempNamer::new(config.temp_dir.clone()));
    let pipeline = TranscodePipeline::new(Arc::clone(&config), namer);

    if !plan.retag_jobs.is_empty() {
        tracing::info!("updating metadata of {} files", plan.retag_jobs.len());
        let jobs = plan.retag_jobs.into_iter().map(PipelineJob::Retag).collect();
        let stats = pipeline.run(jobs, None).await;
        if stats.failed > 0 {
            tracing::warn!("{} metadata updates failed", stats.failed);
        }
    }

    run_transcode_batch(&pipeline, plan.lossless_jobs, "transcoding lossless files").await;
    run_transcode_batch(&pipeline, plan.lossy_jobs, "re-encoding high-bitrate files").await;

    prune(&config, &index)?;

    tracing::info!(
        "done in {}",
        format_duration(started.elapsed().as_secs_f64())
    );
    Ok(())
}

/// Run one transcode batch with a progress bar fed by pipeline events.
async fn run_transcode_batch(
    pipeline: &TranscodePipeline,
    jobs: Vec<TranscodeJob>,
    label: &str,
) -> PipelineStats {
    if jobs.is_empty() {
        return PipelineStats::default();
    }
    let total_audio: f64 = jobs.iter().map(|job| job.duration_seconds).sum();
    tracing::info!(
        "{label}: {} files, {} of audio",
        jobs.len(),
        format_duration(total_audio)
    );

    let bar = ProgressBar::new(1000);
    if let Ok(style) = ProgressStyle::with_template("[{bar:40}] {percent:>3}% {msg}") {
        bar.set_style(style);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let start = Instant::now();
    let watcher = {
        let bar = bar.clone();
        tokio::spawn(async move {
            let mut estimator = ProgressEstimator::new(total_audio);
            while let Some(event) = rx.recv().await {
                if let PipelineEvent::Started {
                    duration_seconds, ..
                } = event
                {
                    estimator.record_started(duration_seconds);
                    if let Some(snap) = estimator.snapshot(start.elapsed()) {
                        bar.set_position((snap.fraction_done * 1000.0) as u64);
                        bar.set_message(format!(
                            "{:.1}x, {} left",
                            snap.speed,
                            format_duration(snap.remaining.as_secs_f64())
                        ));
                    }
                }
            }
        })
    };

    let jobs: Vec<PipelineJob> = jobs.into_iter().map(PipelineJob::Transcode).collect();
    let stats = pipeline.run(jobs, Some(tx)).await;
    let _ = watcher.await;
    bar.finish_and_clear();

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!(
        "{} transcoded, {} abandoned, {} failed in {} ({:.1}x)",
        stats.transcoded,
        stats.abandoned,
        stats.failed,
        format_duration(elapsed),
        if elapsed > 0.0 { total_audio / elapsed } else { 0.0 }
    );
    stats
}

fn prune(config: &SyncConfig, index: &portatune_sync::ScanIndex) -> Result<()> {
    let pruner = StaleFilePruner::new(config, index);
    let obsolete = pruner.find_obsolete()?;

    let mut stats = PruneStats::default();
    if !obsolete.is_empty() {
        println!("Files to remove:");
        for path in &obsolete {
            println!("  * {}", path.display());
        }
        if config.confirm_remove && !confirm("Remove")? {
            tracing::info!("keeping {} obsolete files", obsolete.len());
            return Ok(());
        }
        stats = pruner.remove_files(&obsolete)?;
    }
    pruner.remove_empty_dirs(&mut stats)?;

    if stats.removed + stats.gone + stats.empty_dirs_removed > 0 {
        tracing::info!(
            "pruned {} files ({} already gone), {} empty directories",
            stats.removed,
            stats.gone,
            stats.empty_dirs_removed
        );
    }
    Ok(())
}

fn scan_tree(path: &std::path::Path, exclude: Vec<PathBuf>) -> Result<()> {
    let index = TreeScanner::new(path, exclude).scan()?;

    println!("{} files indexed ({} covers)", index.stats.files_indexed, index.stats.covers);
    println!("{} music directories", index.music_dirs.len());
    if index.stats.excluded > 0 {
        println!("{} files excluded", index.stats.excluded);
    }
    if index.stats.duplicate_tracks > 0 {
        println!("{} duplicate tracks", index.stats.duplicate_tracks);
    }
    if index.stats.duplicate_dirs > 0 {
        println!("{} duplicate directories", index.stats.duplicate_dirs);
    }
    if index.stats.unmatched_ignores > 0 {
        println!("{} unmatched ignore entries", index.stats.unmatched_ignores);
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N]? ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
