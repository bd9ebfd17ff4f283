use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use patchwork_protocol::headers as wire;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    application::{
        classify::{Classification, RequestFacts, RouteLayout},
        error::{ErrorReport, HttpError},
        session::{Page, render_page_response},
    },
    presentation::views::ErrorView,
};

use super::{AppState, antiforgery};

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let fragment = request.headers().contains_key(wire::REQUEST);
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "patchwork::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                fragment,
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "patchwork::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                fragment,
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Point failed fragment exchanges at the error route so the client navigates there.
pub async fn redirect_fragment_errors(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let fragment = request.headers().contains_key(wire::REQUEST);
    let mut response = next.run(request).await;
    let status = response.status();

    if !fragment
        || !state.protocol.redirect_fragment_errors
        || !status.is_server_error()
        || response.headers().contains_key(wire::REDIRECT)
    {
        return response;
    }

    let location = format!(
        "{}?{}={}",
        state.protocol.error_route,
        wire::ERROR_CODE_PARAM,
        status.as_u16()
    );
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(wire::REDIRECT, value);
    }
    response
}

/// Per-route metadata carried into [`guard_route`].
#[derive(Clone)]
pub(super) struct RouteGuard {
    pub(super) state: AppState,
    pub(super) layout: RouteLayout,
    pub(super) antiforgery: bool,
}

/// Validate the antiforgery token, classify the request once, and answer
/// error classifications with the error page.
pub(super) async fn guard_route(
    State(guard): State<RouteGuard>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if guard.antiforgery
        && guard.state.protocol.antiforgery
        && !antiforgery::is_safe(request.method())
    {
        if let Err(err) = antiforgery::verify(request.headers()) {
            return err.into_response();
        }
    }

    let classification = match request.extensions().get::<Classification>() {
        Some(existing) => existing.clone(),
        None => {
            let facts = RequestFacts::new(
                request.method(),
                request.headers(),
                request.uri().query(),
            );
            let classification = guard.state.classifier.classify(&facts, &guard.layout);
            request.extensions_mut().insert(classification.clone());
            classification
        }
    };

    if let Classification::Error(status) = classification {
        return render_error_page(&guard.state, status, "infra::http::guard_route").await;
    }

    next.run(request).await
}

pub(super) async fn fallback(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let facts = RequestFacts::new(&method, &headers, None);
    if method != Method::GET || (facts.fragment && !facts.boosted) {
        return HttpError::new(
            "infra::http::fallback",
            StatusCode::NOT_FOUND,
            "Not found",
            "no route matched the request",
        )
        .into_response();
    }

    render_error_page(&state, StatusCode::NOT_FOUND, "infra::http::fallback").await
}

/// Render the error page with `status` through the process default layout.
async fn render_error_page(state: &AppState, status: StatusCode, source: &'static str) -> Response {
    let page = Page::new(ErrorView::new(status))
        .with_title(status.canonical_reason().unwrap_or("Error"))
        .with_status(status);

    match render_page_response(&state.renderer, page, state.classifier.default_layout()).await {
        Ok(mut response) => {
            ErrorReport::from_message(source, status, "request classified as an error page")
                .attach(&mut response);
            response
        }
        Err(err) => err.into_response(),
    }
}
