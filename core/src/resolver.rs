use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ResolutionError;
use crate::job::{DownloadJob, ExpectedSize, MediaMode, QualityPreference, ResolvedTarget};
use crate::net::{DownloadRequest, HttpTransport};
use crate::storage::{sanitize_filename, suggest_filename};

const DEFAULT_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Needs a metadata lookup to pick among stream variants.
    Structured,
    /// A plain byte stream reachable with GET.
    Direct,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    pub url: String,
    pub is_audio_only: bool,
    /// Larger is better; typically the vertical resolution.
    pub resolution_rank: u32,
    pub filesize: Option<u64>,
    /// Carries both audio and video, no merge step needed.
    pub self_contained: bool,
    pub file_extension: Option<String>,
}

/// Site-specific lookup for structured sources.
pub trait MetadataProvider: Send + Sync {
    fn probe(&self, url: &str) -> Result<SourceMetadata, ResolutionError>;
    fn fetch_variants(&self, url: &str) -> Result<Vec<StreamVariant>, ResolutionError>;
}

/// Provider for builds without any site integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProvider;

impl MetadataProvider for UnsupportedProvider {
    fn probe(&self, url: &str) -> Result<SourceMetadata, ResolutionError> {
        Err(ResolutionError::Unsupported(format!(
            "no metadata provider for {}",
            url
        )))
    }

    fn fetch_variants(&self, url: &str) -> Result<Vec<StreamVariant>, ResolutionError> {
        Err(ResolutionError::Unsupported(format!(
            "no metadata provider for {}",
            url
        )))
    }
}

pub fn classify(url: &str, structured_hosts: &[String]) -> Result<SourceKind, ResolutionError> {
    let parsed =
        Url::parse(url).map_err(|err| ResolutionError::Unsupported(format!("{}: {}", url, err)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ResolutionError::Unsupported(format!(
            "unsupported scheme {}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| ResolutionError::Unsupported(format!("{}: missing host", url)))?
        .to_ascii_lowercase();

    let structured = structured_hosts.iter().any(|known| {
        let known = known.to_ascii_lowercase();
        host == known || host.ends_with(&format!(".{}", known))
    });
    if structured {
        Ok(SourceKind::Structured)
    } else {
        Ok(SourceKind::Direct)
    }
}

/// Audio-only takes the first audio variant as listed. Video ranks the
/// self-contained variants by resolution; ties keep the earliest.
pub fn select_variant(
    variants: &[StreamVariant],
    mode: MediaMode,
    quality: QualityPreference,
) -> Option<&StreamVariant> {
    match mode {
        MediaMode::AudioOnly => variants.iter().find(|variant| variant.is_audio_only),
        MediaMode::Video => variants
            .iter()
            .filter(|variant| variant.self_contained && !variant.is_audio_only)
            .reduce(|best, candidate| {
                let better = match quality {
                    QualityPreference::Highest => candidate.resolution_rank > best.resolution_rank,
                    QualityPreference::Lowest => candidate.resolution_rank < best.resolution_rank,
                };
                if better {
                    candidate
                } else {
                    best
                }
            }),
    }
}

pub struct Resolver {
    transport: Arc<dyn HttpTransport>,
    provider: Arc<dyn MetadataProvider>,
    structured_hosts: Vec<String>,
}

impl Resolver {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        provider: Arc<dyn MetadataProvider>,
        structured_hosts: Vec<String>,
    ) -> Self {
        Self {
            transport,
            provider,
            structured_hosts,
        }
    }

    pub fn resolve(&self, job: &DownloadJob) -> Result<ResolvedTarget, ResolutionError> {
        match classify(&job.source_url, &self.structured_hosts)? {
            SourceKind::Structured => self.resolve_structured(job),
            SourceKind::Direct => self.resolve_direct(&job.source_url),
        }
    }

    fn resolve_structured(&self, job: &DownloadJob) -> Result<ResolvedTarget, ResolutionError> {
        let metadata = self.provider.probe(&job.source_url)?;
        let variants = self.provider.fetch_variants(&job.source_url)?;
        tracing::debug!(
            "{} offers {} variants",
            job.source_url,
            variants.len()
        );
        let variant = select_variant(&variants, job.mode, job.quality).ok_or_else(|| {
            ResolutionError::NotFound(format!(
                "no {} variant for {}",
                match job.mode {
                    MediaMode::Video => "self-contained video",
                    MediaMode::AudioOnly => "audio-only",
                },
                job.source_url
            ))
        })?;

        let extension = variant
            .file_extension
            .as_deref()
            .map(|ext| ext.trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_EXTENSION);
        let title = if metadata.title.trim().is_empty() {
            "video".to_string()
        } else {
            metadata.title.trim().to_string()
        };
        Ok(ResolvedTarget {
            stream_url: variant.url.clone(),
            expected_size: ExpectedSize::from_length(variant.filesize),
            suggested_filename: format!("{}.{}", sanitize_filename(&title), extension),
            media_title: title,
        })
    }

    fn resolve_direct(&self, url: &str) -> Result<ResolvedTarget, ResolutionError> {
        let meta = self
            .transport
            .head(&DownloadRequest::new(url))
            .map_err(|err| ResolutionError::Unreachable(err.to_string()))?;

        let (expected_size, content_disposition) = if meta.is_success() {
            (
                ExpectedSize::from_length(meta.content_length),
                meta.content_disposition.as_deref(),
            )
        } else {
            tracing::debug!(
                "HEAD {} answered {}, size unknown until GET",
                url,
                meta.status_code
            );
            (ExpectedSize::Unknown, None)
        };
        let suggested_filename = suggest_filename(url, content_disposition);
        Ok(ResolvedTarget {
            stream_url: url.to_string(),
            expected_size,
            media_title: suggested_filename.clone(),
            suggested_filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> Vec<String> {
        vec!["youtube.com".to_string(), "youtu.be".to_string()]
    }

    fn variant(rank: u32, audio: bool, self_contained: bool) -> StreamVariant {
        StreamVariant {
            url: format!("https://media.example.com/{}-{}-{}", rank, audio, self_contained),
            is_audio_only: audio,
            resolution_rank: rank,
            filesize: None,
            self_contained,
            file_extension: None,
        }
    }

    #[test]
    fn classify_by_host() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=abc", &hosts()),
            Ok(SourceKind::Structured)
        );
        assert_eq!(classify("https://youtu.be/abc", &hosts()), Ok(SourceKind::Structured));
        assert_eq!(
            classify("https://cdn.example.com/clip.mp4", &hosts()),
            Ok(SourceKind::Direct)
        );
        assert_eq!(
            classify("https://notyoutube.com/x", &hosts()),
            Ok(SourceKind::Direct)
        );
    }

    #[test]
    fn classify_rejects_malformed() {
        assert!(matches!(
            classify("not a url", &hosts()),
            Err(ResolutionError::Unsupported(_))
        ));
        assert!(matches!(
            classify("ftp://example.com/file", &hosts()),
            Err(ResolutionError::Unsupported(_))
        ));
    }

    #[test]
    fn video_picks_highest_self_contained() {
        let variants = vec![
            variant(1080, false, false),
            variant(360, false, true),
            variant(720, false, true),
            variant(0, true, false),
        ];
        let picked = select_variant(&variants, MediaMode::Video, QualityPreference::Highest);
        assert_eq!(picked.map(|v| v.resolution_rank), Some(720));
        let picked = select_variant(&variants, MediaMode::Video, QualityPreference::Lowest);
        assert_eq!(picked.map(|v| v.resolution_rank), Some(360));
    }

    #[test]
    fn ties_keep_first_listed() {
        let mut first = variant(720, false, true);
        first.url = "https://media.example.com/first".to_string();
        let variants = vec![first, variant(720, false, true)];
        let picked = select_variant(&variants, MediaMode::Video, QualityPreference::Highest);
        assert_eq!(picked.map(|v| v.url.as_str()), Some("https://media.example.com/first"));
    }

    #[test]
    fn audio_picks_first_audio_without_ranking() {
        let variants = vec![variant(720, false, true), variant(48, true, false), variant(160, true, false)];
        let picked = select_variant(&variants, MediaMode::AudioOnly, QualityPreference::Highest);
        assert_eq!(picked.map(|v| v.resolution_rank), Some(48));
    }

    #[test]
    fn no_match_is_none() {
        let variants = vec![variant(1080, false, false)];
        assert!(select_variant(&variants, MediaMode::Video, QualityPreference::Highest).is_none());
        assert!(select_variant(&variants, MediaMode::AudioOnly, QualityPreference::Highest).is_none());
    }

    #[test]
    fn unsupported_provider_refuses() {
        assert!(matches!(
            UnsupportedProvider.probe("https://youtube.com/watch?v=1"),
            Err(ResolutionError::Unsupported(_))
        ));
    }
}
