use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::FailureReason;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MediaMode {
    #[default]
    Video,
    AudioOnly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum QualityPreference {
    #[default]
    Highest,
    Lowest,
}

/// One URL to fetch, fixed at submission.
///
/// `destination` is either the final file path or a directory; a directory
/// receives the filename suggested by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: JobId,
    pub source_url: String,
    pub mode: MediaMode,
    pub quality: QualityPreference,
    pub destination: PathBuf,
    pub expected_sha256: Option<String>,
}

impl DownloadJob {
    pub fn new(source_url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            mode: MediaMode::default(),
            quality: QualityPreference::default(),
            destination: destination.into(),
            expected_sha256: None,
        }
    }

    pub fn with_mode(mut self, mode: MediaMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_quality(mut self, quality: QualityPreference) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_expected_sha256(mut self, hex: impl Into<String>) -> Self {
        self.expected_sha256 = Some(hex.into());
        self
    }
}

/// Declared length of a stream. Servers omit or misreport it, so it is only a hint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExpectedSize {
    #[default]
    Unknown,
    Bytes(u64),
}

impl ExpectedSize {
    pub fn from_length(length: Option<u64>) -> Self {
        match length {
            Some(bytes) if bytes > 0 => ExpectedSize::Bytes(bytes),
            _ => ExpectedSize::Unknown,
        }
    }

    pub fn bytes(&self) -> Option<u64> {
        match self {
            ExpectedSize::Bytes(bytes) => Some(*bytes),
            ExpectedSize::Unknown => None,
        }
    }
}

impl fmt::Display for ExpectedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedSize::Bytes(bytes) => write!(f, "{}", bytes),
            ExpectedSize::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub stream_url: String,
    pub expected_size: ExpectedSize,
    pub suggested_filename: String,
    pub media_title: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferState {
    Queued,
    Resolving,
    Transferring,
    Finished,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Queued => "queued",
            TransferState::Resolving => "resolving",
            TransferState::Transferring => "transferring",
            TransferState::Finished => "finished",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferProgress {
    pub job_id: JobId,
    pub bytes_transferred: u64,
    pub expected_size: ExpectedSize,
    pub state: TransferState,
}

impl TransferProgress {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            bytes_transferred: 0,
            expected_size: ExpectedSize::Unknown,
            state: TransferState::Queued,
        }
    }

    /// Fraction in `0.0..=1.0`, or `None` while the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.expected_size.bytes()?;
        Some((self.bytes_transferred as f64 / total as f64).min(1.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Succeeded,
    Failed(FailureReason),
    Canceled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Succeeded => "succeeded",
            JobState::Failed(_) => "failed",
            JobState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub state: JobState,
    pub final_path: Option<PathBuf>,
    pub bytes_transferred: u64,
}

impl JobResult {
    pub fn succeeded(job_id: JobId, final_path: PathBuf, bytes_transferred: u64) -> Self {
        Self {
            job_id,
            state: JobState::Succeeded,
            final_path: Some(final_path),
            bytes_transferred,
        }
    }

    pub fn failed(job_id: JobId, reason: impl Into<FailureReason>, bytes_transferred: u64) -> Self {
        Self {
            job_id,
            state: JobState::Failed(reason.into()),
            final_path: None,
            bytes_transferred,
        }
    }

    pub fn canceled(job_id: JobId, bytes_transferred: u64) -> Self {
        Self {
            job_id,
            state: JobState::Canceled,
            final_path: None,
            bytes_transferred,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.state {
            JobState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_unknown() {
        assert_eq!(ExpectedSize::from_length(Some(0)), ExpectedSize::Unknown);
        assert_eq!(ExpectedSize::from_length(None), ExpectedSize::Unknown);
        assert_eq!(ExpectedSize::from_length(Some(10)), ExpectedSize::Bytes(10));
    }

    #[test]
    fn fraction_is_clamped() {
        let mut progress = TransferProgress::new(Uuid::new_v4());
        assert_eq!(progress.fraction(), None);
        progress.expected_size = ExpectedSize::Bytes(100);
        progress.bytes_transferred = 150;
        assert_eq!(progress.fraction(), Some(1.0));
    }

    #[test]
    fn final_path_only_on_success() {
        let id = Uuid::new_v4();
        assert!(JobResult::succeeded(id, PathBuf::from("a"), 1).final_path.is_some());
        assert!(JobResult::canceled(id, 1).final_path.is_none());
        let failed = JobResult::failed(id, crate::error::TransferError::BadStatus(404), 0);
        assert!(failed.final_path.is_none());
        assert!(failed.failure().is_some());
    }
}
