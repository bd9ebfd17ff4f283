use askama::Template;
use axum::http::StatusCode;

use crate::application::render::{BindModel, Component, RenderContext, RenderError};

#[derive(Template)]
#[template(path = "head.html")]
pub struct HeadMeta {
    pub description: String,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeView {
    pub counter: i64,
    pub items: usize,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorView {
    pub status: u16,
    pub reason: &'static str,
}

impl ErrorView {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unexpected error"),
        }
    }
}

#[derive(Template)]
#[template(path = "counter/value.html")]
pub struct CounterValue {
    pub value: i64,
}

/// Submitted counter form state, echoed back when validation fails.
#[derive(Debug, Clone, Default)]
pub struct CounterFormModel {
    pub amount: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "counter/form.html")]
struct CounterFormTemplate<'a> {
    amount: &'a str,
    error: Option<&'a str>,
    hint_id: &'a str,
}

pub struct CounterForm {
    model: CounterFormModel,
}

impl Component for CounterForm {
    fn render(&self, ctx: &mut RenderContext) -> Result<String, RenderError> {
        let hint_id = ctx.next_id("counter-hint");
        let template = CounterFormTemplate {
            amount: &self.model.amount,
            error: self.model.error.as_deref(),
            hint_id: &hint_id,
        };
        Ok(Template::render(&template)?)
    }
}

impl BindModel for CounterForm {
    type Model = CounterFormModel;

    fn bind(model: Self::Model) -> Self {
        Self { model }
    }
}

#[derive(Template)]
#[template(path = "counter/page.html")]
struct CounterPageTemplate<'a> {
    value: i64,
    amount: &'a str,
    error: Option<&'a str>,
    hint_id: &'a str,
}

pub struct CounterPage {
    pub value: i64,
    pub form: CounterFormModel,
}

impl Component for CounterPage {
    fn render(&self, ctx: &mut RenderContext) -> Result<String, RenderError> {
        let hint_id = ctx.next_id("counter-hint");
        let template = CounterPageTemplate {
            value: self.value,
            amount: &self.form.amount,
            error: self.form.error.as_deref(),
            hint_id: &hint_id,
        };
        Ok(Template::render(&template)?)
    }
}

#[derive(Debug, Clone)]
pub struct ItemView {
    pub id: u64,
    pub label: String,
}

#[derive(Template)]
#[template(path = "items/list.html")]
pub struct ItemList {
    pub items: Vec<ItemView>,
}

#[derive(Template)]
#[template(path = "items/page.html")]
pub struct ItemsPage {
    pub items: Vec<ItemView>,
}
