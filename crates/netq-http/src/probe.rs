//! `HeadProbe`: size discovery for accurate-progress mode.

use async_trait::async_trait;
use netq_core::{ProbeOperation, TransferError};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Url};
use tokio_util::sync::CancellationToken;

use crate::config::RedirectPolicy;
use crate::error::HttpTransferError;
use crate::request::{self, RequestSpec};

/// HEAD request that reports the declared size of a download.
#[derive(Debug, Clone)]
pub struct HeadProbe {
    client: Client,
    url: Url,
    headers: HeaderMap,
    redirects: RedirectPolicy,
}

impl HeadProbe {
    pub fn new(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            headers: HeaderMap::new(),
            redirects: RedirectPolicy::default(),
        }
    }

    /// Send the same headers as the transfer being sized.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.redirects = policy;
        self
    }

    async fn fetch(&self) -> Result<Option<u64>, HttpTransferError> {
        let spec = RequestSpec {
            method: Method::HEAD,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: None,
        };
        let (response, final_url) = request::send(&self.client, spec, &self.redirects, None).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpTransferError::Status {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(request::content_length(response.headers()))
    }
}

#[async_trait]
impl ProbeOperation for HeadProbe {
    fn label(&self) -> String {
        format!("HEAD {}", self.url)
    }

    async fn probe(&self, cancel: CancellationToken) -> Result<Option<u64>, TransferError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransferError::Cancelled),
            result = self.fetch() => {
                let size = result?;
                tracing::debug!(url = %self.url, size = ?size, "HEAD probe answered");
                Ok(size)
            }
        }
    }
}
