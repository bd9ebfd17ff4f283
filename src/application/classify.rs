//! Request classification: page, fragment, or error.

use std::fmt;

use axum::http::{HeaderMap, Method, StatusCode, request::Parts};
use patchwork_protocol::headers as wire;

use super::layout::SharedLayout;

/// Layout metadata declared by a route at registration time.
#[derive(Clone, Default)]
pub enum RouteLayout {
    /// Wrap pages in the process-wide default layout.
    #[default]
    Default,
    Explicit(SharedLayout),
    /// Fragment-only route; navigational requests are errors.
    None,
}

impl fmt::Debug for RouteLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteLayout::Default => f.write_str("Default"),
            RouteLayout::Explicit(layout) => write!(f, "Explicit({})", layout.name()),
            RouteLayout::None => f.write_str("None"),
        }
    }
}

/// Outcome of classification, computed once per request.
#[derive(Clone)]
pub enum Classification {
    Page(SharedLayout),
    Fragment,
    Error(StatusCode),
}

impl fmt::Debug for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Page(layout) => write!(f, "Page({})", layout.name()),
            Classification::Fragment => f.write_str("Fragment"),
            Classification::Error(status) => write!(f, "Error({})", status.as_u16()),
        }
    }
}

/// The parts of a request the protocol cares about.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub method: Method,
    pub fragment: bool,
    pub boosted: bool,
    pub error_code: Option<String>,
}

impl RequestFacts {
    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(&parts.method, &parts.headers, parts.uri.query())
    }

    pub fn new(method: &Method, headers: &HeaderMap, query: Option<&str>) -> Self {
        let error_code = query.and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == wire::ERROR_CODE_PARAM)
                .map(|(_, value)| value.into_owned())
        });

        Self {
            method: method.clone(),
            fragment: headers.contains_key(wire::REQUEST),
            boosted: headers.contains_key(wire::BOOSTED),
            error_code,
        }
    }
}

impl RequestFacts {
    /// Status named by the error-code query parameter, or 404 when absent or unknown.
    pub fn error_status(&self) -> StatusCode {
        self.error_code
            .as_deref()
            .and_then(known_status)
            .unwrap_or(StatusCode::NOT_FOUND)
    }
}

/// Pure classifier holding the process default layout.
pub struct Classifier {
    default_layout: SharedLayout,
}

impl Classifier {
    pub fn new(default_layout: SharedLayout) -> Self {
        Self { default_layout }
    }

    pub fn default_layout(&self) -> &SharedLayout {
        &self.default_layout
    }

    pub fn classify(&self, facts: &RequestFacts, route: &RouteLayout) -> Classification {
        if facts.method != Method::GET {
            return Classification::Fragment;
        }
        if facts.fragment && !facts.boosted {
            return Classification::Fragment;
        }

        match route {
            RouteLayout::Default => Classification::Page(self.default_layout.clone()),
            RouteLayout::Explicit(layout) => Classification::Page(layout.clone()),
            RouteLayout::None => Classification::Error(facts.error_status()),
        }
    }
}

/// Parse a status code the client asked to display, accepting only codes
/// with a canonical reason phrase.
fn known_status(raw: &str) -> Option<StatusCode> {
    let code = raw.trim().parse::<u16>().ok()?;
    StatusCode::from_u16(code)
        .ok()
        .filter(|status| status.canonical_reason().is_some())
}
