//! Outbound request descriptors built each time a trigger fires.

use std::{fmt, str::FromStr};

use patchwork_protocol::{SwapStrategy, headers as wire};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Methods whose parameters travel in the query string.
    pub const fn folds_body_into_query(self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported request method `{0}`")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(UnknownMethod(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Name/value pairs collected from the owning form, in document order.
    Form(Vec<(String, String)>),
    Json(String),
    /// Payload rewritten by a config listener, sent as-is.
    Raw { content_type: String, payload: String },
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Form(fields) => fields.is_empty(),
            Body::Json(_) => false,
            Body::Raw { payload, .. } => payload.is_empty(),
        }
    }
}

/// Element the whole response is merged into, overriding the server manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTarget {
    pub id: String,
    pub strategy: SwapStrategy,
}

/// Everything the pipeline needs to issue one request. Config listeners may
/// rewrite any field before dispatch.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub action: String,
    pub method: Method,
    pub body: Body,
    pub headers: Vec<(String, String)>,
    /// Explicit merge target; `None` lets the response manifest decide.
    pub target: Option<MergeTarget>,
    /// Set when another request from the same element is still in flight.
    pub drop: bool,
    pub boosted: bool,
    /// Suppress the browser's default handling of the triggering event.
    pub prevent_default: bool,
    /// Run the merge inside a view transition when the browser supports it.
    pub transition: bool,
}

impl RequestDescriptor {
    pub fn new(action: impl Into<String>, method: Method) -> Self {
        Self {
            action: action.into(),
            method,
            body: Body::Empty,
            headers: vec![(wire::REQUEST.to_string(), "true".to_string())],
            target: None,
            drop: false,
            boosted: false,
            prevent_default: true,
            transition: true,
        }
    }

    /// Mark the request as navigational so the server answers with a page.
    pub fn boosted(mut self) -> Self {
        self.boosted = true;
        self.set_header(wire::BOOSTED, "true");
        self
    }

    pub fn with_fields(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Body::Form(fields);
        self
    }

    pub fn with_target(mut self, id: impl Into<String>, strategy: SwapStrategy) -> Self {
        self.retarget(Some(id.into()), None);
        if let Some(target) = self.target.as_mut() {
            target.strategy = strategy;
        }
        self
    }

    /// Point the merge at element `id`, or back at the manifest when `id` is
    /// `None` or blank. An unknown `strategy` token keeps the current strategy.
    pub fn retarget(&mut self, id: Option<String>, strategy: Option<&str>) {
        let Some(id) = id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) else {
            self.target = None;
            return;
        };
        let current = self
            .target
            .as_ref()
            .map(|target| target.strategy)
            .unwrap_or_default();
        let strategy = match strategy.map(str::parse::<SwapStrategy>) {
            Some(Ok(strategy)) => strategy,
            Some(Err(err)) => {
                warn!(
                    target = "patchwork::client::descriptor",
                    error = %err,
                    "keeping the previous swap strategy"
                );
                current
            }
            None => current,
        };
        self.target = Some(MergeTarget { id, strategy });
    }

    /// Replace the body with a payload a config listener produced.
    ///
    /// Nothing changes when the payload and content type match what would be sent anyway.
    pub fn replace_body(&mut self, content_type: Option<String>, payload: String) {
        let current = self.encoded_body();
        let content_type = content_type
            .filter(|value| !value.is_empty())
            .or_else(|| current.as_ref().map(|(kind, _)| (*kind).to_string()))
            .unwrap_or_else(|| "text/plain;charset=UTF-8".to_string());
        if current.as_ref().is_some_and(|(kind, sent)| *kind == content_type && *sent == payload) {
            return;
        }
        if current.is_none() && payload.is_empty() {
            return;
        }
        self.body = Body::Raw {
            content_type,
            payload,
        };
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Insert or overwrite a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Move form fields into the query string for methods without a body.
    /// Any other body is dropped.
    pub fn fold_query(&mut self) {
        if !self.method.folds_body_into_query() {
            return;
        }
        if let Body::Form(fields) = std::mem::take(&mut self.body) {
            if fields.is_empty() {
                return;
            }
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter())
                .finish();
            let separator = if self.action.contains('?') { '&' } else { '?' };
            self.action.push(separator);
            self.action.push_str(&query);
        }
    }

    /// Content type and payload for the transport, if there is a body to send.
    pub fn encoded_body(&self) -> Option<(&str, String)> {
        match &self.body {
            Body::Empty => None,
            Body::Form(fields) => Some((
                "application/x-www-form-urlencoded",
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish(),
            )),
            Body::Json(json) => Some(("application/json", json.clone())),
            Body::Raw {
                content_type,
                payload,
            } => Some((content_type.as_str(), payload.clone())),
        }
    }
}

/// DOM event that fires a trigger-bearing element when `patch-trigger` is absent.
pub fn default_event(tag_name: &str, input_type: Option<&str>) -> &'static str {
    match tag_name.to_ascii_lowercase().as_str() {
        "form" => "submit",
        "input" if !input_type.is_some_and(|kind| kind.eq_ignore_ascii_case("button")) => "change",
        "select" | "textarea" => "change",
        _ => "click",
    }
}
