//! Config-stage collaborators that rewrite a request before it is sent.

use patchwork_protocol::headers as wire;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    descriptor::Body,
    pipeline::{Exchange, PipelineError},
};

pub trait ConfigHook {
    fn configure(&self, exchange: &mut Exchange) -> Result<(), PipelineError>;
}

/// Copies the antiforgery cookie into the request header the server checks.
pub struct MirrorAntiforgery<F> {
    read_cookies: F,
}

impl<F> MirrorAntiforgery<F>
where
    F: Fn() -> Option<String>,
{
    pub fn new(read_cookies: F) -> Self {
        Self { read_cookies }
    }
}

impl<F> ConfigHook for MirrorAntiforgery<F>
where
    F: Fn() -> Option<String>,
{
    fn configure(&self, exchange: &mut Exchange) -> Result<(), PipelineError> {
        let Some(cookies) = (self.read_cookies)() else {
            return Ok(());
        };
        if let Some(token) = cookie_value(&cookies, wire::CSRF_COOKIE) {
            exchange.request.set_header(wire::CSRF_HEADER, token);
        }
        Ok(())
    }
}

/// Value of cookie `name` in a `document.cookie` style string.
pub fn cookie_value<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Sends form fields as a JSON object; repeated names become arrays.
/// Methods that carry parameters in the query string are left alone.
pub struct JsonBody;

impl ConfigHook for JsonBody {
    fn configure(&self, exchange: &mut Exchange) -> Result<(), PipelineError> {
        let request = &mut exchange.request;
        if request.method.folds_body_into_query() {
            return Ok(());
        }
        if let Body::Form(fields) = &request.body {
            let json = encode_json(fields)?;
            request.body = Body::Json(json);
        }
        Ok(())
    }
}

pub fn encode_json(fields: &[(String, String)]) -> Result<String, PipelineError> {
    let mut object = Map::new();
    for (name, value) in fields {
        let value = Value::String(value.clone());
        match object.get_mut(name) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(name.clone(), value);
            }
        }
    }
    serde_json::to_string(&object).map_err(|err| PipelineError::Encoding(err.to_string()))
}

/// Replaces the drop policy: earlier requests from the element are aborted
/// and the new one proceeds.
pub struct CancelPrevious;

impl ConfigHook for CancelPrevious {
    fn configure(&self, exchange: &mut Exchange) -> Result<(), PipelineError> {
        if exchange.request.drop {
            let aborted = exchange.requests.abort_all();
            exchange.request.drop = false;
            debug!(
                target = "patchwork::client::hooks",
                aborted, "cancelled earlier requests in favour of the new one"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::{
        executor::block_on,
        future::{Abortable, Aborted, pending},
    };
    use serde_json::json;

    use super::*;
    use crate::{
        descriptor::{Method, RequestDescriptor},
        inflight::InFlight,
    };

    fn exchange(request: RequestDescriptor) -> Exchange {
        Exchange::new(request, InFlight::new())
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn antiforgery_cookie_is_mirrored_into_the_header() {
        let hook = MirrorAntiforgery::new(|| Some("theme=dark; patchwork-csrf=tok123".to_string()));
        let mut exchange = exchange(RequestDescriptor::new("/x", Method::Post));
        hook.configure(&mut exchange).expect("hook runs");
        assert_eq!(exchange.request.header("Patch-Csrf-Token"), Some("tok123"));
    }

    #[test]
    fn missing_cookie_leaves_headers_alone() {
        let hook = MirrorAntiforgery::new(|| Some("patchwork-csrf-other=1".to_string()));
        let mut exchange = exchange(RequestDescriptor::new("/x", Method::Post));
        hook.configure(&mut exchange).expect("hook runs");
        assert_eq!(exchange.request.header(wire::CSRF_HEADER), None);
    }

    #[test]
    fn repeated_fields_become_arrays() {
        let encoded = encode_json(&fields(&[("tag", "a"), ("name", "x"), ("tag", "b"), ("tag", "c")]))
            .expect("encodes");
        let value: Value = serde_json::from_str(&encoded).expect("valid json");
        assert_eq!(value, json!({ "name": "x", "tag": ["a", "b", "c"] }));
    }

    #[test]
    fn json_body_skips_query_methods() {
        let request =
            RequestDescriptor::new("/items", Method::Get).with_fields(fields(&[("q", "x")]));
        let mut exchange = exchange(request);
        JsonBody.configure(&mut exchange).expect("hook runs");
        assert!(matches!(exchange.request.body, Body::Form(_)));

        let request =
            RequestDescriptor::new("/items", Method::Post).with_fields(fields(&[("label", "x")]));
        let mut exchange = self::exchange(request);
        JsonBody.configure(&mut exchange).expect("hook runs");
        assert_eq!(exchange.request.body, Body::Json(r#"{"label":"x"}"#.to_string()));
    }

    #[test]
    fn cancel_previous_aborts_and_lets_the_new_request_through() {
        let requests = InFlight::new();
        let (_guard, registration) = requests.register();
        let mut exchange = Exchange::new(RequestDescriptor::new("/x", Method::Post), requests);
        exchange.request.drop = true;

        CancelPrevious.configure(&mut exchange).expect("hook runs");

        assert!(!exchange.request.drop);
        let earlier = block_on(Abortable::new(pending::<()>(), registration));
        assert_eq!(earlier, Err(Aborted));
    }
}
