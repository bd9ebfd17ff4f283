use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use patchwork_protocol::headers as wire;
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue, closure::Closure};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AbortController, CustomEvent, CustomEventInit, Element, EventTarget, Headers, RequestInit,
    Response,
};

use crate::{
    descriptor::RequestDescriptor,
    pipeline::{Exchange, Host, PipelineError},
    reconcile::{MergePlan, ResponseSnapshot},
    signal::Stage,
};

use super::{document, fragments, js_message};

/// Response headers copied out of the browser `Response`.
const PROTOCOL_HEADERS: [&str; 3] = [wire::MERGE, wire::MORPH_IGNORE_ACTIVE, wire::REDIRECT];

/// Pipeline host bound to one trigger-bearing element.
pub(super) struct DomHost {
    element: Element,
}

impl DomHost {
    pub(super) fn new(element: Element) -> Self {
        Self { element }
    }

    /// Dispatch `patch:<stage>` on `target`; `false` when a listener cancelled it.
    pub(super) fn announce(target: &EventTarget, stage: Stage, detail: &JsValue) -> bool {
        let init = CustomEventInit::new();
        init.set_bubbles(stage.bubbles());
        init.set_cancelable(true);
        init.set_composed(true);
        init.set_detail(detail);

        let dispatched = CustomEvent::new_with_event_init_dict(&stage.event_name(), &init)
            .and_then(|event| target.dispatch_event(&event));
        match dispatched {
            Ok(proceed) => proceed,
            Err(err) => {
                warn!(
                    target = "patchwork::client::web",
                    stage = %stage,
                    error = %js_message(&err),
                    "signal dispatch failed"
                );
                true
            }
        }
    }
}

#[async_trait(?Send)]
impl Host for DomHost {
    fn signal(&self, stage: Stage, exchange: &mut Exchange) -> bool {
        let detail = detail(exchange);
        let proceed = Self::announce(&self.element, stage, &detail);
        if stage == Stage::Config {
            read_back(&detail, exchange);
        }
        if stage == Stage::Merged {
            if !self.element.is_connected() {
                if let Ok(document) = document() {
                    Self::announce(&document, Stage::Merged, &detail);
                }
            }
        }
        proceed
    }

    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, PipelineError> {
        let transport = |err: JsValue| PipelineError::Transport(js_message(&err));

        let controller = AbortController::new().map_err(transport)?;
        let _abort = AbortOnDrop(controller.clone());

        let headers = Headers::new().map_err(transport)?;
        for (name, value) in &request.headers {
            headers.set(name, value).map_err(transport)?;
        }

        let init = RequestInit::new();
        init.set_method(request.method.as_str());
        init.set_signal(Some(&controller.signal()));
        if let Some((content_type, payload)) = request.encoded_body() {
            if request.header("content-type").is_none() {
                headers.set("content-type", content_type).map_err(transport)?;
            }
            init.set_body(&JsValue::from_str(&payload));
        }
        init.set_headers(&headers);

        let window = web_sys::window()
            .ok_or_else(|| PipelineError::Transport("no window available".to_string()))?;
        let response: Response = JsFuture::from(window.fetch_with_str_and_init(&request.action, &init))
            .await
            .map_err(transport)?
            .dyn_into()
            .map_err(transport)?;
        let text = JsFuture::from(response.text().map_err(transport)?)
            .await
            .map_err(transport)?
            .as_string()
            .unwrap_or_default();

        let mut snapshot = ResponseSnapshot::new(response.status(), text);
        for name in PROTOCOL_HEADERS {
            if let Ok(Some(value)) = response.headers().get(name) {
                snapshot = snapshot.with_header(name, value);
            }
        }
        Ok(snapshot)
    }

    async fn merge(&self, plan: &MergePlan, exchange: &Exchange) -> Result<(), PipelineError> {
        let text = exchange
            .response
            .as_ref()
            .map(|response| response.text.clone())
            .unwrap_or_default();
        let apply = {
            let plan = plan.clone();
            let action = exchange.request.action.clone();
            move || fragments::apply(&plan, &text, &action)
        };

        if exchange.request.transition {
            if let Some(result) = with_view_transition(apply.clone()).await {
                return result;
            }
        }
        apply()
    }

    fn navigate(&self, location: &str) -> Result<(), PipelineError> {
        web_sys::window()
            .ok_or_else(|| PipelineError::Navigation("no window available".to_string()))?
            .location()
            .assign(location)
            .map_err(|err| PipelineError::Navigation(js_message(&err)))
    }
}

/// Aborts the network request if the fetch future is dropped before it settles.
struct AbortOnDrop(AbortController);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run `apply` inside `document.startViewTransition` when the browser has it.
/// Returns `None` when view transitions are unavailable.
async fn with_view_transition<F>(apply: F) -> Option<Result<(), PipelineError>>
where
    F: FnOnce() -> Result<(), PipelineError> + 'static,
{
    let document = document().ok()?;
    let start = Reflect::get(&document, &JsValue::from_str("startViewTransition"))
        .ok()?
        .dyn_into::<Function>()
        .ok()?;

    let outcome = std::rc::Rc::new(std::cell::RefCell::new(None));
    let callback: Closure<dyn FnMut()> = {
        let outcome = outcome.clone();
        Closure::once(move || {
            outcome.replace(Some(apply()));
        })
    };

    let transition = match start.call1(&document, callback.as_ref().unchecked_ref()) {
        Ok(transition) => transition,
        Err(err) => {
            debug!(
                target = "patchwork::client::web",
                error = %js_message(&err),
                "view transition unavailable"
            );
            return None;
        }
    };
    if let Some(finished) = Reflect::get(&transition, &JsValue::from_str("finished"))
        .ok()
        .and_then(|finished| finished.dyn_into::<Promise>().ok())
    {
        if let Err(err) = JsFuture::from(finished).await {
            debug!(
                target = "patchwork::client::web",
                error = %js_message(&err),
                "view transition skipped"
            );
        }
    }

    let result = outcome.borrow_mut().take();
    Some(result.unwrap_or(Ok(())))
}

/// Event detail describing the exchange to page listeners.
fn detail(exchange: &Exchange) -> JsValue {
    let detail = Object::new();
    let request = &exchange.request;
    let headers = Object::new();
    for (name, value) in &request.headers {
        let _ = Reflect::set(&headers, &JsValue::from_str(name), &JsValue::from_str(value));
    }

    let optional = |value: Option<&str>| value.map_or(JsValue::NULL, JsValue::from_str);
    let body = request.encoded_body();
    let fields: [(&str, JsValue); 11] = [
        ("action", JsValue::from_str(&request.action)),
        ("method", JsValue::from_str(request.method.as_str())),
        ("headers", headers.into()),
        ("drop", JsValue::from_bool(request.drop)),
        ("boosted", JsValue::from_bool(request.boosted)),
        ("preventDefault", JsValue::from_bool(request.prevent_default)),
        ("requests", JsValue::from_f64(exchange.requests.len() as f64)),
        ("target", optional(request.target.as_ref().map(|target| target.id.as_str()))),
        (
            "swap",
            optional(request.target.as_ref().map(|target| target.strategy.as_str())),
        ),
        ("body", optional(body.as_ref().map(|(_, payload)| payload.as_str()))),
        ("contentType", optional(body.as_ref().map(|(kind, _)| *kind))),
    ];
    for (key, value) in fields {
        let _ = Reflect::set(&detail, &JsValue::from_str(key), &value);
    }
    if let Some(response) = &exchange.response {
        let _ = Reflect::set(
            &detail,
            &JsValue::from_str("status"),
            &JsValue::from_f64(f64::from(response.status)),
        );
    }
    if let Some(error) = &exchange.error {
        let _ = Reflect::set(
            &detail,
            &JsValue::from_str("error"),
            &JsValue::from_str(&error.to_string()),
        );
    }
    detail.into()
}

/// Apply edits config listeners made to the event detail.
fn read_back(detail: &JsValue, exchange: &mut Exchange) {
    let request = &mut exchange.request;
    let get = |key: &str| Reflect::get(detail, &JsValue::from_str(key)).ok();

    if let Some(action) = get("action").and_then(|value| value.as_string()) {
        request.action = action;
    }
    if let Some(drop) = get("drop").and_then(|value| value.as_bool()) {
        request.drop = drop;
    }
    if let Some(prevent) = get("preventDefault").and_then(|value| value.as_bool()) {
        request.prevent_default = prevent;
    }
    if let Some(target) = get("target") {
        let swap = get("swap").and_then(|value| value.as_string());
        request.retarget(target.as_string(), swap.as_deref());
    }
    if let Some(payload) = get("body").and_then(|value| value.as_string()) {
        let content_type = get("contentType").and_then(|value| value.as_string());
        request.replace_body(content_type, payload);
    }
    if let Some(headers) = get("headers").and_then(|value| value.dyn_into::<Object>().ok()) {
        for entry in Object::entries(&headers).iter() {
            let pair: js_sys::Array = entry.unchecked_into();
            if let (Some(name), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string()) {
                request.set_header(name, value);
            }
        }
    }
}
