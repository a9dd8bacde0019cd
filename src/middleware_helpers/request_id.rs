//! Request correlation for the public API.
//!
//! Buyers' browsers and the payment gateway relay may send their own
//! `x-request-id`. It is kept only when it is a short token that is safe to
//! echo into headers and log lines; anything else is replaced with a fresh
//! uuid. Handlers find the id in request extensions and in the task-local
//! read by error bodies, and the response always carries it back.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::tracing::{scope_request_id, RequestId};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_INBOUND_ID_LEN: usize = 64;

/// `[A-Za-z0-9._:-]{1,64}` after trimming, or nothing.
fn inbound_request_id(value: &HeaderValue) -> Option<RequestId> {
    let raw = value.to_str().ok()?.trim();
    let usable = !raw.is_empty()
        && raw.len() <= MAX_INBOUND_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'));
    usable.then(|| RequestId::new(raw))
}

pub async fn correlate_request(mut request: Request, next: Next) -> Response {
    let request_id = match request.headers().get(&REQUEST_ID_HEADER) {
        Some(value) => inbound_request_id(value).unwrap_or_else(|| {
            debug!(path = %request.uri().path(), "unusable inbound request id replaced");
            RequestId::default()
        }),
        None => RequestId::default(),
    };

    let header_value = HeaderValue::from_str(request_id.as_str()).ok();
    if let Some(value) = header_value.clone() {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    request.extensions_mut().insert(request_id.clone());

    let mut response = scope_request_id(request_id, next.run(request)).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
