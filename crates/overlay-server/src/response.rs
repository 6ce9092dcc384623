//! Response builders and the headers every response carries

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS,
};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

pub type HttpResponse = Response<Full<Bytes>>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// Add the CORS and hardening headers shared by every response
pub fn apply_common_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
}

/// Response with an explicit content type and length
pub fn with_body(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> HttpResponse {
    let body = body.into();
    let length = body.len();

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}

/// Empty body, `Content-Length: 0`
pub fn empty(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(0usize));
    response
}

pub fn text(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    with_body(status, TEXT_PLAIN, message.into())
}

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, APPLICATION_JSON, body),
        Err(e) => {
            error!("failed to encode JSON response: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// The one not-found answer for every refused or missing path
pub fn not_found() -> HttpResponse {
    text(StatusCode::NOT_FOUND, "File not found")
}

pub fn method_not_allowed() -> HttpResponse {
    text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn redirect(location: &str) -> HttpResponse {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = empty(StatusCode::MOVED_PERMANENTLY);
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => not_found(),
    }
}

/// Drop the body but keep status and headers (HEAD requests)
pub fn without_body(response: HttpResponse) -> HttpResponse {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}
