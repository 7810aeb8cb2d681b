//! Portatune sync engine
//!
//! Reconciles a source music tree with a destination mirror, transcoding
//! lossless and high-bitrate files to a lossy target format and hardlinking
//! everything else. Obsolete destination files are pruned after the fact.
//!
//! # Architecture
//!
//! - `scanner`: deterministic tree walk producing the seen-file index
//! - `catalog`: read-only media catalog used as a duration/bitrate oracle
//! - `reconcile`: the copy/link/skip/replace/retag decision engine
//! - `pipeline`: concurrent transcode/retag execution with source locking
//! - `progress`: throughput and ETA estimation over completed jobs
//! - `pruner`: two-phase removal of stale destination files

mod catalog;
mod codec;
mod error;
mod lock;
mod pipeline;
mod progress;
mod pruner;
mod reconcile;
mod scanner;
mod types;

pub use catalog::{CatalogInfo, MediaCatalog};
pub use error::{Result, SyncError};
pub use lock::SourceLock;
pub use pipeline::{JobOutcome, PipelineEvent, PipelineStats, TempNamer, TranscodePipeline};
pub use progress::{ProgressEstimator, ProgressSnapshot};
pub use pruner::{PruneStats, StaleFilePruner};
pub use reconcile::{PlanStats, ReconciliationEngine, SyncPlan};
pub use scanner::{ScanIndex, ScanStats, TreeScanner};
pub use types::{PipelineJob, RetagJob, TranscodeJob};
