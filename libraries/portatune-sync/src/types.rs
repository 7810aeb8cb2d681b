//! Job types produced by reconciliation and consumed by the pipeline

use std::path::PathBuf;

/// A lossless or high-bitrate source file to transcode
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Source audio file
    pub source: PathBuf,

    /// Final destination path (with the target lossy extension)
    pub dest: PathBuf,

    /// Estimated playable duration, for progress reporting
    pub duration_seconds: f64,
}

/// A destination file whose metadata is stale but whose audio is current
#[derive(Debug, Clone)]
pub struct RetagJob {
    /// Source audio file holding the authoritative tags
    pub source: PathBuf,

    /// Existing transcoded destination file
    pub dest: PathBuf,
}

/// A unit of work for the transcode pipeline
#[derive(Debug, Clone)]
pub enum PipelineJob {
    Transcode(TranscodeJob),
    Retag(RetagJob),
}

impl PipelineJob {
    /// The source path this job locks and reads from
    pub fn source(&self) -> &std::path::Path {
        match self {
            PipelineJob::Transcode(job) => &job.source,
            PipelineJob::Retag(job) => &job.source,
        }
    }

    /// Estimated duration contributed to progress accounting
    pub fn duration_seconds(&self) -> f64 {
        match self {
            PipelineJob::Transcode(job) => job.duration_seconds,
            PipelineJob::Retag(_) => 0.0,
        }
    }
}
