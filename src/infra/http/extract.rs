use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::application::{
    classify::{Classification, RequestFacts},
    session::RenderSession,
};

use super::AppState;

impl FromRequestParts<AppState> for RenderSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let facts = RequestFacts::from_parts(parts);
        let layout = match parts.extensions.get::<Classification>() {
            Some(Classification::Page(layout)) => layout.clone(),
            _ => state.classifier.default_layout().clone(),
        };
        Ok(RenderSession::new(facts, layout, state.renderer.clone()))
    }
}
