// HTTP seam for media downloads. The engine reads the reported length
// before pulling any of the body, so responses are consumed chunk by chunk.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tweetvault_common::MediaConfig;
use url::Url;

/// Why a single download attempt failed. Always retry-eligible.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid media URL {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("truncated transfer: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("local file error on {path}: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout
        } else {
            DownloadError::Network(err.to_string())
        }
    }
}

impl DownloadError {
    pub(crate) fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::Local {
            path: path.into(),
            source,
        }
    }
}

/// An opened 2xx response whose body has not been read yet.
#[async_trait]
pub trait MediaResponse: Send {
    /// Length reported by the server, if any.
    fn content_length(&self) -> Option<u64>;

    /// Next body chunk; `None` at end of body.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError>;
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Send the request and return once headers are in. Non-2xx statuses
    /// are errors.
    async fn open(&self, url: &str) -> Result<Box<dyn MediaResponse>, DownloadError>;
}

pub struct HttpMediaSource {
    client: reqwest::Client,
}

impl HttpMediaSource {
    pub fn new(config: &MediaConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn open(&self, url: &str) -> Result<Box<dyn MediaResponse>, DownloadError> {
        let url = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        Ok(Box::new(HttpMediaResponse {
            length: resp.content_length(),
            body: resp.bytes_stream().boxed(),
        }))
    }
}

struct HttpMediaResponse {
    length: Option<u64>,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
}

#[async_trait]
impl MediaResponse for HttpMediaResponse {
    fn content_length(&self) -> Option<u64> {
        self.length
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        match self.body.next().await {
            Some(chunk) => Ok(Some(chunk?)),
            None => Ok(None),
        }
    }
}
