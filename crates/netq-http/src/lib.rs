//! HTTP transport for netq.
//!
//! Implements the `netq-core` ports on top of `reqwest`:
//!
//! - `HttpTransfer` - GET download (memory, file or discard) and PUT/POST upload
//! - `HeadProbe` - HEAD request that reads `Content-Length` for accurate progress
//! - `HttpTransferConfig` - client construction (timeouts, user agent)
//!
//! Redirects are followed by the transfer itself rather than by `reqwest`,
//! so every hop is reported to the queue's `WillRedirect` observers and can
//! be vetoed by a `RedirectPolicy`.

#![deny(unused_crate_dependencies)]

mod config;
mod error;
mod probe;
mod request;
mod sink;
mod transfer;

pub use config::{HttpTransferConfig, RedirectPolicy};
pub use error::HttpTransferError;
pub use probe::HeadProbe;
pub use request::content_length;
pub use sink::BodyTarget;
pub use transfer::HttpTransfer;

#[cfg(test)]
use {netq_queue as _, tokio_test as _, wiremock as _};
