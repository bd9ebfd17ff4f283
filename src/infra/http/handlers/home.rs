use axum::{extract::State, response::Response, routing::get};

use crate::{
    application::{
        error::HttpError,
        session::{Page, RenderSession},
    },
    infra::http::{AppState, RouteRegistrar},
    presentation::views::{HeadMeta, HomeView},
};

pub fn register(routes: &mut RouteRegistrar) {
    routes.page("/", get(show));
}

async fn show(
    State(state): State<AppState>,
    mut session: RenderSession,
) -> Result<Response, HttpError> {
    let view = HomeView {
        counter: state.store.counter(),
        items: state.store.items().await.len(),
    };
    session.add_page(
        Page::new(view)
            .with_title("Home")
            .with_head(HeadMeta {
                description: "Server-rendered partial updates".to_string(),
            }),
    )?;
    session.render().await
}
