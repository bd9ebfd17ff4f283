use askama::Template;

use crate::application::{
    layout::{Layout, PageContent},
    render::{RenderContext, RenderError},
};

#[derive(Template)]
#[template(path = "layout.html")]
struct AppLayoutTemplate<'a> {
    brand: &'a str,
    title: &'a str,
    head: Option<&'a str>,
    main: &'a str,
}

/// Process-wide default document layout.
pub struct AppLayout {
    brand: String,
}

impl AppLayout {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
        }
    }
}

impl Layout for AppLayout {
    fn name(&self) -> &'static str {
        "app"
    }

    fn render(
        &self,
        content: PageContent,
        _ctx: &mut RenderContext,
    ) -> Result<String, RenderError> {
        let template = AppLayoutTemplate {
            brand: &self.brand,
            title: content.title.as_deref().unwrap_or(&self.brand),
            head: content.head.as_deref(),
            main: &content.main,
        };
        Ok(template.render()?)
    }
}
