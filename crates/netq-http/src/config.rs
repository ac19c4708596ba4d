//! Client configuration and redirect policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::HttpTransferError;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("netq/", env!("CARGO_PKG_VERSION"));

/// Default number of redirect hops a transfer follows.
const DEFAULT_MAX_REDIRECTS: usize = 10;

type RedirectFilter = dyn Fn(&Url, &Url) -> bool + Send + Sync;

/// Decides whether a transfer follows a redirect.
///
/// Checked before each hop, after the hop count. The filter receives the
/// current URL and the redirect target.
#[derive(Clone)]
pub struct RedirectPolicy {
    max: usize,
    filter: Option<Arc<RedirectFilter>>,
}

impl RedirectPolicy {
    /// Follow up to `max` hops.
    pub const fn limited(max: usize) -> Self {
        Self { max, filter: None }
    }

    /// Never follow; a `3xx` response is the final response.
    pub const fn none() -> Self {
        Self::limited(0)
    }

    /// Follow up to `max` hops that `filter` accepts.
    pub fn custom(max: usize, filter: impl Fn(&Url, &Url) -> bool + Send + Sync + 'static) -> Self {
        Self {
            max,
            filter: Some(Arc::new(filter)),
        }
    }

    /// Whether redirects are followed at all.
    pub const fn follows(&self) -> bool {
        self.max > 0
    }

    pub(crate) fn check(&self, hop: usize, from: &Url, to: &Url) -> Result<(), HttpTransferError> {
        if hop > self.max {
            return Err(HttpTransferError::TooManyRedirects { limit: self.max });
        }
        if let Some(filter) = &self.filter {
            if !filter(from, to) {
                return Err(HttpTransferError::RedirectRejected {
                    location: to.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(DEFAULT_MAX_REDIRECTS)
    }
}

impl fmt::Debug for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectPolicy")
            .field("max", &self.max)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Settings for the `reqwest::Client` shared by transfers and probes.
#[derive(Debug, Clone)]
pub struct HttpTransferConfig {
    /// Whole-request timeout (`None` = no timeout).
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for HttpTransferConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Some(Duration::from_secs(30)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpTransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build a client for `HttpTransfer` and `HeadProbe`.
    ///
    /// Automatic redirects are disabled; transfers follow them themselves
    /// under their `RedirectPolicy`.
    pub fn build_client(&self) -> Result<Client, HttpTransferError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder.build().map_err(HttpTransferError::Client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn limited_policy_counts_hops() {
        let policy = RedirectPolicy::limited(2);
        let (a, b) = (url("http://a/"), url("http://b/"));
        assert!(policy.check(1, &a, &b).is_ok());
        assert!(policy.check(2, &a, &b).is_ok());
        assert!(matches!(
            policy.check(3, &a, &b),
            Err(HttpTransferError::TooManyRedirects { limit: 2 })
        ));
    }

    #[test]
    fn custom_policy_can_veto() {
        let policy = RedirectPolicy::custom(5, |from, to| from.host_str() == to.host_str());
        assert!(policy.check(1, &url("http://a/x"), &url("http://a/y")).is_ok());
        assert!(matches!(
            policy.check(1, &url("http://a/x"), &url("http://evil/")),
            Err(HttpTransferError::RedirectRejected { .. })
        ));
    }

    #[test]
    fn none_policy_does_not_follow() {
        assert!(!RedirectPolicy::none().follows());
        assert!(RedirectPolicy::default().follows());
    }

    #[test]
    fn config_builder() {
        let config = HttpTransferConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test-agent");
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.user_agent, "test-agent");
        assert!(config.build_client().is_ok());
    }
}
