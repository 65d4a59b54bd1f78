use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH,
};

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub content_disposition: Option<String>,
}

impl ResponseMeta {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// An open GET whose body has not been read yet.
pub struct StreamResponse {
    pub meta: ResponseMeta,
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

pub trait HttpTransport: Send + Sync {
    fn head(&self, req: &DownloadRequest) -> CoreResult<ResponseMeta>;
    fn get_stream(&self, req: &DownloadRequest) -> CoreResult<StreamResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .default_headers(header_map(&config.headers)?);
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|err| CoreError::Network(err.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

/// Headers from the config sent with every request, such as a cookie or referer.
fn header_map(headers: &BTreeMap<String, String>) -> CoreResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| CoreError::Config(format!("header {}: {}", key, err)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| CoreError::Config(format!("header {}: {}", key, err)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn response_meta(resp: &Response) -> ResponseMeta {
    let headers = resp.headers();
    ResponseMeta {
        status_code: resp.status().as_u16(),
        content_length: header_str(headers, CONTENT_LENGTH)
            .and_then(|value| value.trim().parse::<u64>().ok()),
        content_disposition: header_str(headers, CONTENT_DISPOSITION),
    }
}

impl HttpTransport for ReqwestTransport {
    fn head(&self, req: &DownloadRequest) -> CoreResult<ResponseMeta> {
        let resp = self
            .client
            .head(&req.url)
            .send()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        Ok(response_meta(&resp))
    }

    fn get_stream(&self, req: &DownloadRequest) -> CoreResult<StreamResponse> {
        let resp = self
            .client
            .get(&req.url)
            .send()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        Ok(StreamResponse {
            meta: response_meta(&resp),
            body: Box::new(resp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_headers_become_defaults() {
        let mut headers = BTreeMap::new();
        headers.insert("Referer".to_string(), "https://www.example.com/".to_string());
        headers.insert("cookie".to_string(), "session=abc".to_string());
        let map = header_map(&headers).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("referer").unwrap(), "https://www.example.com/");
        assert_eq!(map.get("Cookie").unwrap(), "session=abc");
    }

    #[test]
    fn invalid_header_is_a_config_error() {
        let mut config = EngineConfig::default();
        config.headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(ReqwestTransport::new(&config), Err(CoreError::Config(_))));

        let mut config = EngineConfig::default();
        config.headers.insert("X-Token".to_string(), "line\nbreak".to_string());
        assert!(matches!(ReqwestTransport::new(&config), Err(CoreError::Config(_))));
    }

    #[test]
    fn success_is_any_2xx() {
        let meta = |status_code| ResponseMeta {
            status_code,
            ..ResponseMeta::default()
        };
        assert!(meta(200).is_success());
        assert!(meta(206).is_success());
        assert!(!meta(304).is_success());
        assert!(!meta(404).is_success());
    }
}
