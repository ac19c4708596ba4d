//! Request sending with manual redirect handling.

use bytes::Bytes;
use futures_util::StreamExt;
use netq_core::{ResponseInfo, TransferContext};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, LOCATION};
use reqwest::{Client, Method, Response, StatusCode, Url};

use crate::config::RedirectPolicy;
use crate::error::HttpTransferError;

/// Upload bodies are handed to the connection in pieces of this size so
/// upload progress advances while the body is sent.
const UPLOAD_CHUNK: usize = 16 * 1024;

/// Everything needed to issue (and re-issue) one logical request.
#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Send `spec`, following redirects under `policy`.
///
/// When `ctx` is given, upload bytes of the first transmission and redirect
/// hops are reported to it.
/// Returns the final response and the URL it came from.
pub(crate) async fn send(
    client: &Client,
    mut spec: RequestSpec,
    policy: &RedirectPolicy,
    ctx: Option<&TransferContext>,
) -> Result<(Response, Url), HttpTransferError> {
    let mut hop = 0;
    loop {
        let mut request = client
            .request(spec.method.clone(), spec.url.clone())
            .headers(spec.headers.clone());
        if let Some(body) = &spec.body {
            // The body size is declared up front; a body re-sent after a
            // 307/308 is not counted again.
            let reporter = if hop == 0 { ctx.cloned() } else { None };
            request = request
                .header(CONTENT_LENGTH, body.len())
                .body(upload_body(body.clone(), reporter));
        }

        let response = request
            .send()
            .await
            .map_err(|err| HttpTransferError::request(&spec.url, err))?;

        let status = response.status();
        if !status.is_redirection() || !policy.follows() {
            return Ok((response, spec.url));
        }
        let Some(location) = redirect_target(&spec.url, &response)? else {
            // 304 and friends carry no Location.
            return Ok((response, spec.url));
        };

        hop += 1;
        policy.check(hop, &spec.url, &location)?;
        tracing::debug!(
            from = %spec.url,
            to = %location,
            status = status.as_u16(),
            hop,
            "Following redirect"
        );
        if let Some(ctx) = ctx {
            ctx.will_redirect(location.as_str());
        }

        if rewrites_to_get(status, &spec.method) {
            spec.method = Method::GET;
            spec.body = None;
        }
        spec.url = location;
    }
}

/// 303 always becomes GET; 301/302 do so for POST, as browsers do.
fn rewrites_to_get(status: StatusCode, method: &Method) -> bool {
    status == StatusCode::SEE_OTHER
        || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
            && *method == Method::POST)
}

fn redirect_target(from: &Url, response: &Response) -> Result<Option<Url>, HttpTransferError> {
    let Some(value) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let invalid = || HttpTransferError::InvalidRedirect {
        from: from.to_string(),
        location: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };
    let location = value.to_str().map_err(|_| invalid())?;
    from.join(location).map(Some).map_err(|_| invalid())
}

/// Stream `body` in chunks, counting each chunk as uploaded when the
/// connection pulls it.
fn upload_body(body: Bytes, ctx: Option<TransferContext>) -> reqwest::Body {
    let chunks: Vec<Bytes> = (0..body.len())
        .step_by(UPLOAD_CHUNK)
        .map(|start| body.slice(start..(start + UPLOAD_CHUNK).min(body.len())))
        .collect();
    let stream = futures_util::stream::iter(chunks).map(move |chunk| {
        if let Some(ctx) = &ctx {
            ctx.add_upload_progress(chunk.len() as u64);
        }
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

/// Declared body length from the `Content-Length` header.
///
/// Read from the header rather than `Response::content_length`, which
/// reports the size of the (empty) body for HEAD responses.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Response metadata in the queue's vocabulary. Non-UTF-8 header values are
/// skipped.
pub(crate) fn response_info(response: &Response) -> ResponseInfo {
    let headers = response.headers();
    let mut info =
        ResponseInfo::new(response.status().as_u16()).with_content_length(content_length(headers));
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            info = info.with_header(name.as_str(), value);
        }
    }
    info
}
