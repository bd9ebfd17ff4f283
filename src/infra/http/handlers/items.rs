use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::{
    application::{
        error::HttpError,
        session::{Page, RenderSession},
    },
    infra::http::{AppState, RouteRegistrar},
    presentation::views::{ItemList, ItemsPage},
};

const MAX_LABEL_CHARS: usize = 80;

pub fn register(routes: &mut RouteRegistrar) {
    routes
        .page("/items", get(show))
        .fragment("/items", post(create))
        .fragment("/items/{id}", delete(remove));
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NewItemForm {
    label: String,
}

async fn show(
    State(state): State<AppState>,
    mut session: RenderSession,
) -> Result<Response, HttpError> {
    let items = state.store.items().await;
    session.add_page(Page::new(ItemsPage { items }).with_title("Items"))?;
    session.render().await
}

async fn create(
    State(state): State<AppState>,
    mut session: RenderSession,
    Form(form): Form<NewItemForm>,
) -> Result<Response, HttpError> {
    let label = form.label.trim();
    if label.is_empty() {
        // Nothing to merge; the client keeps the page as it is.
        return session.render().await;
    }

    let label: String = label.chars().take(MAX_LABEL_CHARS).collect();
    let items = state.store.push_item(label).await;
    session.add_fragment(ItemList { items }, "item-list")?;
    session.render().await
}

/// Deletion answers with an empty 200; the client removes the element itself.
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    mut session: RenderSession,
) -> Result<Response, HttpError> {
    if !state.store.remove_item(id).await {
        return Err(HttpError::new(
            "infra::http::handlers::items::remove",
            StatusCode::NOT_FOUND,
            "Item not found",
            format!("no item with id {id}"),
        ));
    }
    session.render().await
}
