//! Per-request render session.
//!
//! A session commits to exactly one mode on its first mutator call: a single
//! page, or an ordered list of fragments. [`RenderSession::render`] consumes
//! the accumulated work once and produces the response.

use std::time::Instant;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
};
use metrics::counter;
use patchwork_protocol::{SwapManifest, SwapStrategy, headers as wire};
use thiserror::Error;
use tracing::{debug, error};

use super::{
    classify::RequestFacts,
    error::HttpError,
    layout::{PageContent, SharedLayout},
    render::{BindModel, Component, RenderContext, RenderHandle, RenderJob, component_job},
};

const SOURCE: &str = "application::session";

/// Misuse of the session API. These are programming errors and are never retried.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionFault {
    #[error("render has already been called and may only be called once per request")]
    AlreadyRendered,
    #[error("session is set to render a page; no other operation is allowed before render")]
    PageCommitted,
    #[error("session already holds fragments; a page cannot be added")]
    FragmentsCommitted,
    #[error("a page render was attempted on a fragment request")]
    PageOnFragmentRequest,
}

impl From<SessionFault> for HttpError {
    fn from(fault: SessionFault) -> Self {
        error!(target = "patchwork::session", fault = %fault, "render session misused");
        HttpError::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &fault,
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Ask the client to keep the live value of a focused input inside a morphed subtree.
    pub ignore_active_value_on_morph: bool,
}

/// A full page: main content, optional head content and title, optional layout override.
pub struct Page {
    main: Box<dyn Component>,
    head: Option<Box<dyn Component>>,
    title: Option<String>,
    layout: Option<SharedLayout>,
    status: StatusCode,
}

impl Page {
    pub fn new(main: impl Component) -> Self {
        Self {
            main: Box::new(main),
            head: None,
            title: None,
            layout: None,
            status: StatusCode::OK,
        }
    }

    pub fn bind<C: BindModel>(model: C::Model) -> Self {
        Self::new(C::bind(model))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_head(mut self, head: impl Component) -> Self {
        self.head = Some(Box::new(head));
        self
    }

    /// Use `layout` instead of the one resolved for the route.
    pub fn with_layout(mut self, layout: SharedLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn into_job(self, fallback: &SharedLayout) -> (StatusCode, RenderJob) {
        let Page {
            main,
            head,
            title,
            layout,
            status,
        } = self;
        let layout = layout.unwrap_or_else(|| fallback.clone());

        let job: RenderJob = Box::new(move |ctx: &mut RenderContext| {
            let main = main.render(ctx)?;
            let head = head.map(|head| head.render(ctx)).transpose()?;
            layout.render(PageContent { title, head, main }, ctx)
        });
        (status, job)
    }
}

/// Deferred fragment render bound to a merge target.
pub struct FragmentTask {
    pub target: String,
    pub strategy: SwapStrategy,
    component: Box<dyn Component>,
}

enum SessionState {
    Unset,
    Page(Page),
    Fragment(Vec<FragmentTask>),
    Rendered,
}

pub struct RenderSession {
    facts: RequestFacts,
    layout: SharedLayout,
    renderer: RenderHandle,
    state: SessionState,
}

impl RenderSession {
    pub fn new(facts: RequestFacts, layout: SharedLayout, renderer: RenderHandle) -> Self {
        Self {
            facts,
            layout,
            renderer,
            state: SessionState::Unset,
        }
    }

    pub fn facts(&self) -> &RequestFacts {
        &self.facts
    }

    pub fn add_page(&mut self, page: Page) -> Result<&mut Self, SessionFault> {
        match self.state {
            SessionState::Unset => {
                self.state = SessionState::Page(page);
                Ok(self)
            }
            SessionState::Page(_) => Err(SessionFault::PageCommitted),
            SessionState::Fragment(_) => Err(SessionFault::FragmentsCommitted),
            SessionState::Rendered => Err(SessionFault::AlreadyRendered),
        }
    }

    /// Queue `component` for `target` with the replace strategy.
    pub fn add_fragment(
        &mut self,
        component: impl Component,
        target: impl Into<String>,
    ) -> Result<&mut Self, SessionFault> {
        self.add_fragment_with(component, target, SwapStrategy::Replace)
    }

    pub fn add_fragment_with(
        &mut self,
        component: impl Component,
        target: impl Into<String>,
        strategy: SwapStrategy,
    ) -> Result<&mut Self, SessionFault> {
        self.push_task(FragmentTask {
            target: target.into(),
            strategy,
            component: Box::new(component),
        })
    }

    pub fn add_model_fragment<C: BindModel>(
        &mut self,
        model: C::Model,
        target: impl Into<String>,
        strategy: SwapStrategy,
    ) -> Result<&mut Self, SessionFault> {
        self.add_fragment_with(C::bind(model), target, strategy)
    }

    fn push_task(&mut self, task: FragmentTask) -> Result<&mut Self, SessionFault> {
        match &mut self.state {
            SessionState::Unset => self.state = SessionState::Fragment(vec![task]),
            SessionState::Fragment(tasks) => tasks.push(task),
            SessionState::Page(_) => return Err(SessionFault::PageCommitted),
            SessionState::Rendered => return Err(SessionFault::AlreadyRendered),
        }
        Ok(self)
    }

    /// Manifest for the fragments queued so far.
    pub fn manifest(&self) -> SwapManifest {
        match &self.state {
            SessionState::Fragment(tasks) => tasks
                .iter()
                .fold(SwapManifest::new(), |mut manifest, task| {
                    manifest.push(task.target.clone(), task.strategy);
                    manifest
                }),
            _ => SwapManifest::new(),
        }
    }

    pub async fn render(&mut self) -> Result<Response, HttpError> {
        self.render_with(RenderOptions::default()).await
    }

    pub async fn render_with(&mut self, options: RenderOptions) -> Result<Response, HttpError> {
        match std::mem::replace(&mut self.state, SessionState::Rendered) {
            SessionState::Rendered => Err(SessionFault::AlreadyRendered.into()),
            SessionState::Page(page) => self.render_page(page).await,
            SessionState::Unset => self.render_fragments(Vec::new(), options).await,
            SessionState::Fragment(tasks) => self.render_fragments(tasks, options).await,
        }
    }

    async fn render_page(&self, page: Page) -> Result<Response, HttpError> {
        if self.facts.fragment && !self.facts.boosted {
            return Err(SessionFault::PageOnFragmentRequest.into());
        }
        render_page_response(&self.renderer, page, &self.layout).await
    }

    async fn render_fragments(
        &self,
        tasks: Vec<FragmentTask>,
        options: RenderOptions,
    ) -> Result<Response, HttpError> {
        if !self.facts.fragment {
            return Err(HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Not found",
                "fragment route requested without the protocol header",
            ));
        }
        counter!("patchwork_fragment_responses_total").increment(1);

        if tasks.is_empty() {
            let status = if self.facts.method == Method::DELETE {
                StatusCode::OK
            } else {
                StatusCode::NO_CONTENT
            };
            debug!(
                target = "patchwork::session",
                status = status.as_u16(),
                "empty fragment response"
            );
            return Ok(status.into_response());
        }

        let mut manifest = SwapManifest::new();
        let mut jobs = Vec::with_capacity(tasks.len());
        for task in tasks {
            manifest.push(task.target, task.strategy);
            jobs.push(component_job(task.component));
        }

        let encoded = manifest.to_header_value().map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
        })?;
        let manifest_header = HeaderValue::from_str(&encoded).map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
        })?;

        let started = Instant::now();
        let body = self.renderer.render_all(jobs).await?.concat();
        debug!(
            target = "patchwork::session",
            fragments = manifest.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "fragment response rendered"
        );

        let mut response = (StatusCode::OK, Html(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(wire::MERGE, manifest_header);
        if options.ignore_active_value_on_morph {
            headers.insert(wire::MORPH_IGNORE_ACTIVE, HeaderValue::from_static("true"));
        }
        Ok(response)
    }
}

/// Render `page` through its layout (or `fallback`) into a full document response.
pub async fn render_page_response(
    renderer: &RenderHandle,
    page: Page,
    fallback: &SharedLayout,
) -> Result<Response, HttpError> {
    let (status, job) = page.into_job(fallback);
    let body = renderer.render(job).await?;
    counter!("patchwork_page_responses_total").increment(1);
    Ok((status, Html(body)).into_response())
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, sync::Arc};

    use askama::Template;
    use axum::http::HeaderMap;

    use super::*;
    use crate::application::{
        layout::Layout,
        render::{RenderEngine, RenderError},
    };

    #[derive(Template)]
    #[template(source = r#"<div id="{{ id }}">{{ text }}</div>"#, ext = "html")]
    struct Panel {
        id: &'static str,
        text: &'static str,
    }

    struct Bare;

    impl Layout for Bare {
        fn name(&self) -> &'static str {
            "bare"
        }

        fn render(
            &self,
            content: PageContent,
            _ctx: &mut RenderContext,
        ) -> Result<String, RenderError> {
            Ok(format!(
                "<title>{}</title><main>{}</main>",
                content.title.unwrap_or_default(),
                content.main
            ))
        }
    }

    fn session(engine: &RenderEngine, method: Method, marker: &[&'static str]) -> RenderSession {
        let mut headers = HeaderMap::new();
        for name in marker {
            headers.insert(*name, HeaderValue::from_static("true"));
        }
        RenderSession::new(
            RequestFacts::new(&method, &headers, None),
            Arc::new(Bare),
            engine.handle(),
        )
    }

    fn engine() -> RenderEngine {
        RenderEngine::spawn(NonZeroUsize::new(8).expect("non-zero")).expect("worker starts")
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    fn panel(id: &'static str) -> Panel {
        Panel { id, text: "x" }
    }

    #[tokio::test]
    async fn every_mutator_faults_after_render() {
        let engine = engine();
        let mut session = session(&engine, Method::POST, &[wire::REQUEST]);
        session.render().await.expect("first render");

        assert_eq!(
            session.add_fragment(panel("a"), "a").err(),
            Some(SessionFault::AlreadyRendered)
        );
        assert_eq!(
            session.add_page(Page::new(panel("p"))).err(),
            Some(SessionFault::AlreadyRendered)
        );
        let err = session.render().await.expect_err("second render");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn assert_sync<T: Sync>() {}

    #[tokio::test]
    async fn session_renders_from_a_spawned_task() {
        assert_sync::<RenderSession>();
        assert_sync::<Page>();
        let engine = engine();

        let mut page = session(&engine, Method::GET, &[]);
        page.add_page(Page::new(panel("p")).with_title("Spawned"))
            .expect("page accepted");
        let response = tokio::spawn(async move { page.render().await })
            .await
            .expect("task joins")
            .expect("page renders");
        assert!(body_text(response).await.contains("<title>Spawned</title>"));

        let mut fragments = session(&engine, Method::POST, &[wire::REQUEST]);
        fragments.add_fragment(panel("a"), "a").expect("fragment accepted");
        let response = tokio::spawn(async move { fragments.render().await })
            .await
            .expect("task joins")
            .expect("fragments render");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn page_render_faults_on_fragment_requests_unless_boosted() {
        let engine = engine();

        let mut fragment = session(&engine, Method::GET, &[wire::REQUEST]);
        fragment.add_page(Page::new(panel("p"))).expect("page accepted");
        let err = fragment.render().await.expect_err("page on a fragment request");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let mut boosted = session(&engine, Method::GET, &[wire::REQUEST, wire::BOOSTED]);
        boosted.add_page(Page::new(panel("p"))).expect("page accepted");
        let response = boosted.render().await.expect("boosted page renders");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mixing_modes_faults_in_either_order() {
        let engine = engine();

        let mut page_first = session(&engine, Method::GET, &[]);
        page_first
            .add_page(Page::new(panel("p")))
            .expect("page accepted");
        assert_eq!(
            page_first.add_fragment(panel("a"), "a").err(),
            Some(SessionFault::PageCommitted)
        );
        assert_eq!(
            page_first.add_page(Page::new(panel("p"))).err(),
            Some(SessionFault::PageCommitted)
        );

        let mut fragments_first = session(&engine, Method::GET, &[wire::REQUEST]);
        fragments_first
            .add_fragment(panel("a"), "a")
            .expect("fragment accepted");
        assert_eq!(
            fragments_first.add_page(Page::new(panel("p"))).err(),
            Some(SessionFault::FragmentsCommitted)
        );
    }

    #[tokio::test]
    async fn manifest_matches_tasks_in_declaration_order() {
        let engine = engine();
        let mut session = session(&engine, Method::POST, &[wire::REQUEST]);
        session
            .add_fragment(panel("a"), "a")
            .expect("a")
            .add_fragment_with(panel("b"), "b", SwapStrategy::Morph)
            .expect("b")
            .add_fragment_with(panel("c"), "c", SwapStrategy::Replace)
            .expect("c");

        let expected = session.manifest();
        let response = session.render().await.expect("render");

        assert_eq!(response.status(), StatusCode::OK);
        let header = response
            .headers()
            .get(wire::MERGE)
            .and_then(|value| value.to_str().ok())
            .expect("manifest header")
            .to_string();
        let decoded = SwapManifest::from_header_value(&header).expect("decodes");
        assert_eq!(decoded, expected);
        let targets: Vec<_> = decoded.iter().map(|entry| entry.target.as_str()).collect();
        assert_eq!(targets, ["a", "b", "c"]);
        assert!(response.headers().get(wire::MORPH_IGNORE_ACTIVE).is_none());

        assert_eq!(
            body_text(response).await,
            r#"<div id="a">x</div><div id="b">x</div><div id="c">x</div>"#
        );
    }

    #[tokio::test]
    async fn ignore_active_flag_is_sent_when_requested() {
        let engine = engine();
        let mut session = session(&engine, Method::POST, &[wire::REQUEST]);
        session
            .add_fragment_with(panel("a"), "a", SwapStrategy::Morph)
            .expect("a");

        let response = session
            .render_with(RenderOptions {
                ignore_active_value_on_morph: true,
            })
            .await
            .expect("render");

        assert_eq!(
            response.headers().get(wire::MORPH_IGNORE_ACTIVE),
            Some(&HeaderValue::from_static("true"))
        );
    }

    #[tokio::test]
    async fn zero_task_delete_is_ok_with_empty_body() {
        let engine = engine();
        let mut session = session(&engine, Method::DELETE, &[wire::REQUEST]);

        let response = session.render().await.expect("render");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(wire::MERGE).is_none());
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn zero_task_patch_is_no_content() {
        let engine = engine();
        let mut session = session(&engine, Method::PATCH, &[wire::REQUEST]);

        let response = session.render().await.expect("render");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(wire::MERGE).is_none());
    }

    #[tokio::test]
    async fn fragments_without_protocol_header_are_not_found() {
        let engine = engine();
        let mut session = session(&engine, Method::GET, &[]);
        session.add_fragment(panel("a"), "a").expect("a");

        let err = session.render().await.expect_err("not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn page_on_fragment_request_faults() {
        let engine = engine();
        let mut session = session(&engine, Method::GET, &[wire::REQUEST]);
        session.add_page(Page::new(panel("p"))).expect("page");

        let err = session.render().await.expect_err("fault");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.report().messages[0].contains("fragment request"));
    }

    #[tokio::test]
    async fn page_renders_through_layout_with_title() {
        let engine = engine();
        let mut session = session(&engine, Method::GET, &[wire::REQUEST, wire::BOOSTED]);
        session
            .add_page(Page::new(panel("p")).with_title("Hello"))
            .expect("page");

        let response = session.render().await.expect("render");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            r#"<title>Hello</title><main><div id="p">x</div></main>"#
        );
    }
}
