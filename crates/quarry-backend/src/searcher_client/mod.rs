//! HTTP client for the unindexed matcher service
//!
//! Requests go to one of several searcher replicas; the replica is picked by
//! hashing the repository name so that a repository's archive stays warm on
//! one host.

pub mod stream;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};
use crate::protocol::{FileMatch, SearcherRequest};
use crate::traits::UnindexedSearcher;

pub use stream::{StreamDecoder, StreamEvent};

/// Searcher replica URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearcherEndpoints {
    urls: Vec<String>,
}

impl SearcherEndpoints {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    /// Read a comma-separated list from `QUARRY_SEARCHER_URLS`.
    pub fn from_env() -> Self {
        let urls = std::env::var("QUARRY_SEARCHER_URLS").unwrap_or_default();
        Self::parse(&urls)
    }

    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Pick the endpoint serving `repo`.
    pub fn get(&self, repo: &str) -> BackendResult<&str> {
        if self.urls.is_empty() {
            return Err(BackendError::NoEndpoints);
        }
        let digest = Sha256::digest(repo.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let idx = (u64::from_be_bytes(prefix) % self.urls.len() as u64) as usize;
        debug!(repo, endpoint = %self.urls[idx], hash = %hex::encode(&digest[..4]), "Picked searcher endpoint");
        Ok(&self.urls[idx])
    }
}

/// `UnindexedSearcher` backed by the matcher service over HTTP.
pub struct HttpSearcher {
    endpoints: SearcherEndpoints,
    http_client: reqwest::Client,
}

impl HttpSearcher {
    pub fn new(endpoints: SearcherEndpoints) -> BackendResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("quarry-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            endpoints,
            http_client,
        })
    }

    pub fn from_env() -> BackendResult<Self> {
        Self::new(SearcherEndpoints::from_env())
    }

    pub fn endpoints(&self) -> &SearcherEndpoints {
        &self.endpoints
    }
}

#[async_trait]
impl UnindexedSearcher for HttpSearcher {
    async fn search(
        &self,
        request: &SearcherRequest,
        on_matches: &(dyn Fn(Vec<FileMatch>) + Send + Sync),
    ) -> BackendResult<bool> {
        let base = self.endpoints.get(&request.repo)?;
        let url = format!("{}/search", base.trim_end_matches('/'));

        let response = self.http_client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut decoder = StreamDecoder::new();
        let mut body = response.bytes_stream();
        let mut done = None;
        let mut handle = |event: StreamEvent| match event {
            StreamEvent::Matches(matches) => on_matches(matches),
            StreamEvent::Done(d) => done = Some(d),
            StreamEvent::Unknown(name) => warn!(event = %name, "Ignoring unknown searcher event"),
        };
        while let Some(chunk) = body.next().await {
            for event in decoder.feed(&chunk?)? {
                handle(event);
            }
        }
        if let Some(event) = decoder.finish()? {
            handle(event);
        }

        let done = done.ok_or_else(|| {
            BackendError::Protocol("stream ended without a done event".to_string())
        })?;
        if !done.error.is_empty() {
            return Err(BackendError::Searcher(done.error));
        }
        Ok(done.limit_hit)
    }
}
