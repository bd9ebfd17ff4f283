use std::sync::Arc;

use super::render::{RenderContext, RenderError};

/// Rendered pieces a layout wraps into a full document.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub title: Option<String>,
    pub head: Option<String>,
    pub main: String,
}

/// Root document component.
pub trait Layout: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn render(&self, content: PageContent, ctx: &mut RenderContext)
    -> Result<String, RenderError>;
}

pub type SharedLayout = Arc<dyn Layout>;
