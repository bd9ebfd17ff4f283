use askama::Template;
use axum::http::StatusCode;
use thiserror::Error;

use crate::application::error::HttpError;

use super::RenderContext;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed")]
    Template(#[from] askama::Error),
    #[error("render worker is not accepting jobs")]
    Closed,
    #[error("render worker dropped the job without replying")]
    Dropped,
    #[error("component `{component}` failed: {message}")]
    Component {
        component: &'static str,
        message: String,
    },
    #[error("render job panicked: {message}")]
    Panicked { message: String },
}

impl RenderError {
    pub fn component(component: &'static str, message: impl Into<String>) -> Self {
        Self::Component {
            component,
            message: message.into(),
        }
    }
}

impl From<RenderError> for HttpError {
    fn from(err: RenderError) -> Self {
        let status = match err {
            RenderError::Closed | RenderError::Dropped => StatusCode::SERVICE_UNAVAILABLE,
            RenderError::Template(_)
            | RenderError::Component { .. }
            | RenderError::Panicked { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpError::from_error("application::render", status, "Rendering failed", &err)
    }
}

/// Anything that can produce an HTML string on the render worker.
///
/// Every askama template is a component. Types that need the render context,
/// for example to allocate element ids, implement the trait by hand.
pub trait Component: Send + Sync + 'static {
    fn render(&self, ctx: &mut RenderContext) -> Result<String, RenderError>;
}

impl<T> Component for T
where
    T: Template + Send + Sync + 'static,
{
    fn render(&self, _ctx: &mut RenderContext) -> Result<String, RenderError> {
        Template::render(self).map_err(RenderError::from)
    }
}

/// A component constructed from a typed model.
pub trait BindModel: Component + Sized {
    type Model: Send + 'static;

    fn bind(model: Self::Model) -> Self;
}
