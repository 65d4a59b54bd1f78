pub mod checksum;
pub mod config;
pub mod control;
pub mod error;
pub mod job;
pub mod logging;
pub mod net;
pub mod queue;
pub mod resolver;
pub mod scheduler;
pub mod sink;
pub mod storage;
pub mod transfer;


pub use crate::config::EngineConfig;
pub use crate::control::{CancelToken, JobControl};
pub use crate::error::{CoreError, CoreResult, FailureReason, ResolutionError, TransferError};
pub use crate::job::{
    DownloadJob, ExpectedSize, JobId, JobResult, JobState, MediaMode, QualityPreference,
    ResolvedTarget, TransferProgress, TransferState,
};
pub use crate::resolver::{MetadataProvider, Resolver, SourceMetadata, StreamVariant};
pub use crate::scheduler::{BatchRun, BatchSummary, Scheduler};
pub use crate::sink::{NoopSink, ProgressSink, TracingSink};
pub use crate::transfer::TransferEngine;
