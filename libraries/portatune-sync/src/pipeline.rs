//! Concurrent transcode/retag execution
//!
//! Jobs are fed through a bounded channel to a pool of workers, one per
//! configured CPU. Every job is independent: a failure is logged and counted
//! without touching the rest of the batch. Output is staged next to the
//! destination under a `.part` suffix and renamed into place only after the
//! encode and the tag copy both succeeded, so a crash never leaves a
//! half-written file under its final name.

use crate::codec;
use crate::error::Result;
use crate::lock::SourceLock;
use crate::reconcile::append_extension;
use crate::types::{PipelineJob, RetagJob, TranscodeJob};
use portatune_core::SyncConfig;
use portatune_tags::MetadataSynchronizer;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const STAGING_SUFFIX: &str = ".part";

/// Generates collision-free intermediate WAV paths.
///
/// Names combine the process id with a per-instance counter, so concurrent
/// workers and concurrent processes sharing a temp directory never clash.
#[derive(Debug)]
pub struct TempNamer {
    dir: PathBuf,
    counter: AtomicU64,
}

impl TempNamer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Next intermediate WAV path for decoding `source`
    pub fn wav_path(&self, source: &Path) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track");
        self.dir
            .join(format!("portatune-{}-{n}-{stem}.wav", std::process::id()))
    }
}

/// How one job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Transcoded,
    Retagged,
    /// Another process held the source lock
    Abandoned,
    Failed,
}

/// Progress notifications emitted while a batch runs
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started {
        source: PathBuf,
        duration_seconds: f64,
    },
    Finished {
        source: PathBuf,
        outcome: JobOutcome,
    },
}

/// Aggregate counts for one batch
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    pub transcoded: usize,
    pub retagged: usize,
    pub abandoned: usize,
    pub failed: usize,
}

impl PipelineStats {
    fn count(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Transcoded => self.transcoded += 1,
            JobOutcome::Retagged => self.retagged += 1,
            JobOutcome::Abandoned => self.abandoned += 1,
            JobOutcome::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: &PipelineStats) {
        self.transcoded += other.transcoded;
        self.retagged += other.retagged;
        self.abandoned += other.abandoned;
        self.failed += other.failed;
    }
}

/// Runs transcode and retag jobs on a worker pool.
pub struct TranscodePipeline {
    config: Arc<SyncConfig>,
    synchronizer: Arc<MetadataSynchronizer>,
    namer: Arc<TempNamer>,
}

impl TranscodePipeline {
    pub fn new(config: Arc<SyncConfig>, namer: Arc<TempNamer>) -> Self {
        let synchronizer = Arc::new(MetadataSynchronizer::new(config.album_artist_workaround));
        Self {
            config,
            synchronizer,
            namer,
        }
    }

    /// Run a batch of jobs to completion and return the aggregate counts.
    ///
    /// Events are emitted as jobs start and finish; pass `None` when no one
    /// is watching.
    pub async fn run(
        &self,
        jobs: Vec<PipelineJob>,
        events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    ) -> PipelineStats {
        if jobs.is_empty() {
            return PipelineStats::default();
        }

        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel::<PipelineJob>(workers);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            let config = Arc::clone(&self.config);
            let synchronizer = Arc::clone(&self.synchronizer);
            let namer = Arc::clone(&self.namer);
            let events = events.clone();
            handles.push(tokio::spawn(async move {
                let mut stats = PipelineStats::default();
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        break;
                    };
                    if let Some(tx) = &events {
                        let _ = tx.send(PipelineEvent::Started {
                            source: job.source().to_path_buf(),
                            duration_seconds: job.duration_seconds(),
                        });
                    }
                    let source = job.source().to_path_buf();
                    let outcome = match job {
                        PipelineJob::Transcode(job) => {
                            transcode_one(&config, &synchronizer, &namer, &job).await
                        }
                        PipelineJob::Retag(job) => retag_one(&synchronizer, &job),
                    };
                    stats.count(outcome);
                    if let Some(tx) = &events {
                        let _ = tx.send(PipelineEvent::Finished { source, outcome });
                    }
                }
                stats
            }));
        }

        for job in jobs {
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut stats = PipelineStats::default();
        for handle in handles {
            match handle.await {
                Ok(worker_stats) => stats.merge(&worker_stats),
                Err(e) => tracing::error!("worker panicked: {e}"),
            }
        }
        stats
    }
}

async fn transcode_one(
    config: &SyncConfig,
    synchronizer: &MetadataSynchronizer,
    namer: &TempNamer,
    job: &TranscodeJob,
) -> JobOutcome {
    let lock = match SourceLock::try_acquire(&job.source) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            tracing::debug!("source locked elsewhere, abandoning: {}", job.source.display());
            return JobOutcome::Abandoned;
        }
        Err(e) => {
            tracing::warn!("cannot lock {}: {e}", job.source.display());
            return JobOutcome::Failed;
        }
    };

    let wav = namer.wav_path(&job.source);
    let staged = append_extension(&job.dest, STAGING_SUFFIX);
    let result = transcode_steps(config, synchronizer, job, &wav, &staged).await;

    remove_if_exists(&wav);
    drop(lock);

    match result {
        Ok(()) => {
            tracing::info!("transcoded: {}", job.dest.display());
            JobOutcome::Transcoded
        }
        Err(e) => {
            remove_if_exists(&staged);
            tracing::warn!("transcode failed for {}: {e}", job.source.display());
            JobOutcome::Failed
        }
    }
}

async fn transcode_steps(
    config: &SyncConfig,
    synchronizer: &MetadataSynchronizer,
    job: &TranscodeJob,
    wav: &Path,
    staged: &Path,
) -> Result<()> {
    if let Some(parent) = job.dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let extension = portatune_core::extension_of(&job.source).unwrap_or_default();
    let encoder_input = codec::decode_to_wav(&config.tools, &extension, &job.source, wav).await?;
    codec::encode_from_wav(&config.tools, config.codec, encoder_input, staged).await?;
    synchronizer.synchronize(&job.source, staged)?;
    fs::rename(staged, &job.dest)?;

    // A previously hardlinked original is superseded by the transcode.
    if let Some(sibling) = strip_suffix(&job.dest, config.lossy_ext()) {
        if sibling.is_file() {
            fs::remove_file(&sibling)?;
            tracing::info!("removed untranscoded: {}", sibling.display());
        }
    }
    Ok(())
}

fn retag_one(synchronizer: &MetadataSynchronizer, job: &RetagJob) -> JobOutcome {
    match synchronizer.synchronize(&job.source, &job.dest) {
        Ok(changed) => {
            if changed {
                tracing::info!("retagged: {}", job.dest.display());
            }
            JobOutcome::Retagged
        }
        Err(e) => {
            tracing::warn!("retag failed for {}: {e}", job.dest.display());
            JobOutcome::Failed
        }
    }
}

fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    path.to_str()
        .and_then(|s| s.strip_suffix(suffix))
        .map(PathBuf::from)
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("cannot remove {}: {e}", path.display()),
    }
}
