//! `HttpTransfer`: the `TransferOperation` implementation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use netq_core::{
    Direction, ProbeOperation, ResponseInfo, TransferContext, TransferError, TransferOperation,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};

use crate::config::RedirectPolicy;
use crate::error::HttpTransferError;
use crate::probe::HeadProbe;
use crate::request::{self, RequestSpec};
use crate::sink::{BodyTarget, BodyWriter};

/// What the final response of a finished transfer looked like.
#[derive(Debug, Default)]
struct Outcome {
    response: Option<ResponseInfo>,
    final_url: Option<Url>,
    body: Option<Bytes>,
}

/// One HTTP request run by a `NetworkQueue`.
///
/// GET transfers are downloads: the response body is streamed into the
/// configured `BodyTarget` and counted as download progress. PUT and POST
/// transfers are uploads: the request body is counted as upload progress
/// and the response body is kept in memory.
///
/// # Example
///
/// ```ignore
/// let client = HttpTransferConfig::new().build_client()?;
/// let transfer = Arc::new(HttpTransfer::get(client, url).save_to("out/file.bin"));
/// queue.enqueue(transfer.clone())?;
/// ```
pub struct HttpTransfer {
    client: Client,
    spec: RequestSpec,
    target: BodyTarget,
    redirects: RedirectPolicy,
    declared_size: Option<u64>,
    outcome: Mutex<Outcome>,
}

impl HttpTransfer {
    fn new(client: Client, method: Method, url: Url, body: Option<Bytes>) -> Self {
        Self {
            client,
            spec: RequestSpec {
                method,
                url,
                headers: HeaderMap::new(),
                body,
            },
            target: BodyTarget::Memory,
            redirects: RedirectPolicy::default(),
            declared_size: None,
            outcome: Mutex::new(Outcome::default()),
        }
    }

    /// Download `url` into memory.
    pub fn get(client: Client, url: Url) -> Self {
        Self::new(client, Method::GET, url, None)
    }

    /// Upload `body` to `url` with PUT.
    pub fn put(client: Client, url: Url, body: impl Into<Bytes>) -> Self {
        Self::new(client, Method::PUT, url, Some(body.into()))
    }

    /// Upload `body` to `url` with POST.
    pub fn post(client: Client, url: Url, body: impl Into<Bytes>) -> Self {
        Self::new(client, Method::POST, url, Some(body.into()))
    }

    /// Write the response body to `path`.
    #[must_use]
    pub fn save_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.target = BodyTarget::File(path.into());
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: BodyTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.spec.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.redirects = policy;
        self
    }

    /// Size of the download, when the caller already knows it.
    #[must_use]
    pub const fn with_declared_size(mut self, bytes: u64) -> Self {
        self.declared_size = Some(bytes);
        self
    }

    pub fn url(&self) -> &Url {
        &self.spec.url
    }

    pub fn method(&self) -> &Method {
        &self.spec.method
    }

    /// Metadata of the final response, once headers arrived.
    pub fn response(&self) -> Option<ResponseInfo> {
        self.outcome().response.clone()
    }

    /// URL of the final response after redirects.
    pub fn final_url(&self) -> Option<Url> {
        self.outcome().final_url.clone()
    }

    /// The response body, for memory targets and uploads.
    pub fn body(&self) -> Option<Bytes> {
        self.outcome().body.clone()
    }

    fn outcome(&self) -> std::sync::MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(&self, ctx: &TransferContext) -> Result<(), HttpTransferError> {
        let sent = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(HttpTransferError::Cancelled),
            sent = request::send(&self.client, self.spec.clone(), &self.redirects, Some(ctx)) => sent,
        };
        let (response, final_url) = sent?;

        let info = request::response_info(&response);
        ctx.response_headers(&info);
        {
            let mut outcome = self.outcome();
            outcome.response = Some(info.clone());
            outcome.final_url = Some(final_url.clone());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(HttpTransferError::Status {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = info.content_length {
            ctx.add_download_total(length);
        }

        let mut writer = BodyWriter::open(&self.target).await?;
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let Some(next) = next else {
                writer.abandon().await;
                return Err(HttpTransferError::Cancelled);
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    writer.abandon().await;
                    return Err(HttpTransferError::request(&final_url, err));
                }
            };
            if let Err(err) = writer.write(&chunk).await {
                writer.abandon().await;
                return Err(err);
            }
            ctx.add_download_progress(chunk.len() as u64);
        }

        let body = writer.finish().await?;
        self.outcome().body = body;
        Ok(())
    }
}

#[async_trait]
impl TransferOperation for HttpTransfer {
    fn label(&self) -> String {
        format!("{} {}", self.spec.method, self.spec.url)
    }

    fn direction(&self) -> Direction {
        if self.spec.body.is_some() {
            Direction::Upload
        } else {
            Direction::Download
        }
    }

    fn declared_size(&self) -> Option<u64> {
        match self.direction() {
            Direction::Upload => self.spec.body.as_ref().map(|body| body.len() as u64),
            Direction::Download => self.declared_size,
        }
    }

    fn size_probe(&self) -> Option<Arc<dyn ProbeOperation>> {
        if self.spec.method != Method::GET {
            return None;
        }
        let probe = HeadProbe::new(self.client.clone(), self.spec.url.clone())
            .with_headers(self.spec.headers.clone())
            .with_redirect_policy(self.redirects.clone());
        Some(Arc::new(probe))
    }

    async fn run(&self, ctx: TransferContext) -> Result<(), TransferError> {
        tracing::debug!(id = %ctx.id(), label = %self.label(), "HTTP transfer starting");
        self.execute(&ctx).await.map_err(|err| {
            if !matches!(err, HttpTransferError::Cancelled) {
                tracing::warn!(id = %ctx.id(), error = %err, "HTTP transfer failed");
            }
            TransferError::from(err)
        })
    }
}

impl std::fmt::Debug for HttpTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransfer")
            .field("method", &self.spec.method)
            .field("url", &self.spec.url.as_str())
            .field("target", &self.target)
            .field("redirects", &self.redirects)
            .finish_non_exhaustive()
    }
}
