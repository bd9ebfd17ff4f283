use axum::{response::Response, routing::get};

use crate::{
    application::{error::HttpError, session::RenderSession},
    infra::http::RouteRegistrar,
    presentation::views::ErrorView,
};

/// The error route is fragment-only: navigating to it is classified as an
/// error and answered with the error page for the requested code.
pub fn register(routes: &mut RouteRegistrar) {
    let path = routes.error_route().to_string();
    routes.fragment(path, get(show));
}

async fn show(mut session: RenderSession) -> Result<Response, HttpError> {
    let status = session.facts().error_status();
    session.add_fragment(ErrorView::new(status), "page-error")?;
    session.render().await
}
