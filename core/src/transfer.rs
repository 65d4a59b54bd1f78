use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use crate::checksum::{matches_hex, StreamDigest};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::control::CancelToken;
use crate::error::TransferError;
use crate::job::{JobId, JobResult, ResolvedTarget};
use crate::net::{DownloadRequest, HttpTransport};
use crate::storage::PartFile;

enum Stop {
    Canceled(u64),
    Failed(TransferError, u64),
}

/// Streams one resolved target to disk. Never retries.
pub struct TransferEngine {
    transport: Arc<dyn HttpTransport>,
    chunk_size: usize,
}

impl TransferEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            transport,
            chunk_size,
        }
    }

    /// Fetches `target` into `destination`, calling `on_progress` with the
    /// running byte total after every chunk. The destination only appears
    /// once every byte is on disk.
    pub fn transfer<F>(
        &self,
        job_id: JobId,
        target: &ResolvedTarget,
        destination: &Path,
        expected_sha256: Option<&str>,
        cancel: &CancelToken,
        on_progress: F,
    ) -> JobResult
    where
        F: FnMut(u64),
    {
        match self.stream(target, destination, expected_sha256, cancel, on_progress) {
            Ok(written) => {
                if let Some(expected) = target.expected_size.bytes() {
                    if expected != written {
                        tracing::warn!(
                            "{}: server declared {} bytes, received {}",
                            target.stream_url,
                            expected,
                            written
                        );
                    }
                }
                JobResult::succeeded(job_id, destination.to_path_buf(), written)
            }
            Err(Stop::Canceled(written)) => {
                tracing::info!("{}: canceled after {} bytes", target.stream_url, written);
                JobResult::canceled(job_id, written)
            }
            Err(Stop::Failed(err, written)) => {
                tracing::warn!("{}: {}", target.stream_url, err);
                JobResult::failed(job_id, err, written)
            }
        }
    }

    fn stream<F>(
        &self,
        target: &ResolvedTarget,
        destination: &Path,
        expected_sha256: Option<&str>,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<u64, Stop>
    where
        F: FnMut(u64),
    {
        if cancel.is_canceled() {
            return Err(Stop::Canceled(0));
        }

        let response = self
            .transport
            .get_stream(&DownloadRequest::new(target.stream_url.clone()))
            .map_err(|err| Stop::Failed(TransferError::TransferInterrupted(err.to_string()), 0))?;
        if !response.meta.is_success() {
            return Err(Stop::Failed(
                TransferError::BadStatus(response.meta.status_code),
                0,
            ));
        }
        let mut body = response.body;

        let mut part = PartFile::create(destination).map_err(|err| {
            Stop::Failed(TransferError::FilesystemError(err.to_string()), 0)
        })?;
        tracing::debug!(
            "streaming {} into {}",
            target.stream_url,
            part.path().display()
        );

        let mut digest = expected_sha256.map(|_| StreamDigest::new());
        let mut buffer = vec![0u8; self.chunk_size];
        on_progress(0);
        loop {
            if cancel.is_canceled() {
                return Err(Stop::Canceled(part.written()));
            }
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(Stop::Failed(
                        TransferError::TransferInterrupted(err.to_string()),
                        part.written(),
                    ))
                }
            };
            part.write_chunk(&buffer[..read]).map_err(|err| {
                Stop::Failed(TransferError::FilesystemError(err.to_string()), part.written())
            })?;
            if let Some(digest) = digest.as_mut() {
                digest.update(&buffer[..read]);
            }
            on_progress(part.written());
        }

        if let (Some(expected), Some(digest)) = (expected_sha256, digest) {
            let actual = digest.finalize_hex();
            if !matches_hex(&actual, expected) {
                return Err(Stop::Failed(
                    TransferError::ChecksumMismatch {
                        expected: expected.trim().to_ascii_lowercase(),
                        actual,
                    },
                    part.written(),
                ));
            }
        }

        let written = part.written();
        part.commit(destination)
            .map_err(|err| Stop::Failed(TransferError::FilesystemError(err.to_string()), written))
    }
}
