//! HTTP surface: route registry, protocol middleware and demo handlers.

mod antiforgery;
mod extract;
pub mod handlers;
mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Redirect, Response},
};
use patchwork_protocol::headers as wire;

use crate::{
    application::{
        classify::{Classifier, RequestFacts},
        error::HttpError,
        render::RenderHandle,
    },
    config::ProtocolSettings,
};

use self::handlers::DemoStore;

pub use self::middleware::RequestContext;
pub use self::routes::{REGISTRATIONS, RouteEntry, RouteKind, RouteRegistrar, route_table};

/// Shared state handed to every handler and protocol middleware.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub renderer: RenderHandle,
    pub protocol: Arc<ProtocolSettings>,
    pub store: Arc<DemoStore>,
}

impl AppState {
    pub fn new(classifier: Classifier, renderer: RenderHandle, protocol: ProtocolSettings) -> Self {
        Self {
            classifier: Arc::new(classifier),
            renderer,
            protocol: Arc::new(protocol),
            store: Arc::new(DemoStore::default()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    routes::collect(REGISTRATIONS, &state.protocol)
        .into_router(&state)
        .fallback(middleware::fallback)
        .with_state(state.clone())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::redirect_fragment_errors,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state,
            antiforgery::issue_token,
        ))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

/// Send the client to `location`.
///
/// Fragment exchanges cannot observe transport redirects, so they get the
/// redirect header; everything else gets `303 See Other`.
pub fn client_redirect(facts: &RequestFacts, location: &str) -> Response {
    if !facts.fragment {
        return Redirect::to(location).into_response();
    }

    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::OK.into_response();
            response.headers_mut().insert(wire::REDIRECT, value);
            response
        }
        Err(err) => HttpError::from_error(
            "infra::http::client_redirect",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
        .into_response(),
    }
}
