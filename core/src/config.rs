use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_jobs: usize,
    pub chunk_size_bytes: usize,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub retry_count: u32,
    pub retry_backoff_millis: u64,
    /// Hosts whose pages need a metadata lookup; subdomains match too.
    pub structured_hosts: Vec<String>,
    pub proxy_url: Option<String>,
    /// Sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            user_agent: "mediafetch/0.1".to_string(),
            connect_timeout_secs: 30,
            retry_count: 2,
            retry_backoff_millis: 1000,
            structured_hosts: vec!["youtube.com".to_string(), "youtu.be".to_string()],
            proxy_url: None,
            headers: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(data: &str) -> CoreResult<Self> {
        let config: EngineConfig =
            toml::from_str(data).map_err(|err| CoreError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|err| CoreError::Io(format!("{}: {}", path.display(), err)))?;
        let config = Self::from_toml_str(&data)?;
        tracing::debug!("loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.chunk_size_bytes == 0 {
            return Err(CoreError::Config("chunk_size_bytes must be positive".to_string()));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(CoreError::Config(
                "max_concurrent_jobs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("max_concurrent_jobs = 5\nretry_count = 0\n")
            .expect("parse");
        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.chunk_size_bytes, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.structured_hosts, vec!["youtube.com", "youtu.be"]);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = EngineConfig::from_toml_str("chunk_size_bytes = 0").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mediafetch.toml");
        fs::write(&path, "user_agent = \"test-agent\"\nproxy_url = \"http://proxy:8080\"\n")
            .expect("write");
        let config = EngineConfig::load(&path).expect("load");
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:8080"));
    }

    #[test]
    fn headers_table_parses() {
        let config = EngineConfig::from_toml_str(
            "[headers]\nReferer = \"https://www.example.com/\"\nCookie = \"a=1\"\n",
        )
        .expect("parse");
        assert_eq!(config.headers.len(), 2);
        assert_eq!(config.headers["Cookie"], "a=1");
        assert!(EngineConfig::default().headers.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::load("/nonexistent/mediafetch.toml").unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
