//! Double-submit antiforgery token: a readable cookie the client mirrors into
//! a request header on unsafe methods.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use patchwork_protocol::headers as wire;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::application::error::HttpError;

use super::AppState;

const SOURCE: &str = "infra::http::antiforgery";

pub(super) fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Token carried by the antiforgery cookie, if any.
pub(super) fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == wire::CSRF_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub(super) fn verify(headers: &HeaderMap) -> Result<(), HttpError> {
    let Some(cookie) = cookie_token(headers) else {
        return Err(rejected("antiforgery cookie missing"));
    };
    let Some(submitted) = headers
        .get(wire::CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return Err(rejected("antiforgery header missing"));
    };

    if bool::from(cookie.as_bytes().ct_eq(submitted.as_bytes())) {
        Ok(())
    } else {
        Err(rejected("antiforgery token mismatch"))
    }
}

fn rejected(detail: &'static str) -> HttpError {
    HttpError::new(SOURCE, StatusCode::BAD_REQUEST, "Invalid antiforgery token", detail)
}

/// Hand out a token on safe-method HTML responses when the client has none.
pub(super) async fn issue_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let needs_token = state.protocol.antiforgery
        && is_safe(request.method())
        && cookie_token(request.headers()).is_none();

    let mut response = next.run(request).await;
    if !needs_token || !is_html(&response) {
        return response;
    }

    let token = Uuid::new_v4().simple().to_string();
    let cookie = format!("{}={token}; Path=/; SameSite=Strict", wire::CSRF_COOKIE);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
        debug!(target = "patchwork::http::antiforgery", "issued antiforgery token");
    }
    response
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}
