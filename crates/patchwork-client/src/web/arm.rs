use std::rc::Rc;

use js_sys::{Reflect, try_iter};
use patchwork_protocol::headers::attr;
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue, closure::Closure};
use web_sys::{Document, Element, Event, FormData, HtmlFormElement, Node, SubmitEvent};

use crate::{
    descriptor::{Method, RequestDescriptor, default_event},
    hooks::ConfigHook,
    inflight::InFlight,
    pipeline::Pipeline,
    signal::Stage,
};

use super::{host::DomHost, js_message};

/// Property holding an armed element's listener; its presence marks the element as armed.
const ARMED_KEY: &str = "__patchwork";

fn action_selector() -> String {
    format!("[{}]", attr::ACTION)
}

/// Finds trigger-bearing elements and arms each one exactly once.
#[derive(Clone)]
pub(super) struct Scanner {
    hooks: Rc<[Box<dyn ConfigHook>]>,
}

impl Scanner {
    pub(super) fn new(hooks: Rc<[Box<dyn ConfigHook>]>) -> Self {
        Self { hooks }
    }

    /// Arm `node` and every trigger-bearing element below it.
    pub(super) fn process(&self, node: &Node) {
        let selector = action_selector();
        let found = if let Some(element) = node.dyn_ref::<Element>() {
            if is_ignored(element) {
                return;
            }
            if element.has_attribute(attr::ACTION) {
                self.arm(element);
            }
            element.query_selector_all(&selector)
        } else if let Some(document) = node.dyn_ref::<Document>() {
            document.query_selector_all(&selector)
        } else {
            return;
        };

        match found {
            Ok(list) => {
                for index in 0..list.length() {
                    if let Some(element) = list.item(index).and_then(|n| n.dyn_into::<Element>().ok())
                    {
                        self.arm(&element);
                    }
                }
            }
            Err(err) => warn!(
                target = "patchwork::client::web",
                error = %js_message(&err),
                "subtree scan failed"
            ),
        }
    }

    fn arm(&self, element: &Element) {
        if is_armed(element) || is_ignored(element) {
            return;
        }
        if !DomHost::announce(element, Stage::Init, &JsValue::UNDEFINED) {
            debug!(
                target = "patchwork::client::web",
                id = %element.id(),
                "arming vetoed by an init listener"
            );
            return;
        }

        let method = match element
            .get_attribute(attr::METHOD)
            .map(|raw| raw.parse::<Method>())
            .unwrap_or(Ok(Method::Get))
        {
            Ok(method) => method,
            Err(err) => {
                warn!(
                    target = "patchwork::client::web",
                    id = %element.id(),
                    error = %err,
                    "element left unarmed"
                );
                return;
            }
        };
        let event_name = element
            .get_attribute(attr::TRIGGER)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                default_event(&element.tag_name(), element.get_attribute("type").as_deref())
                    .to_string()
            });

        let pipeline = Rc::new(Pipeline::new(
            DomHost::new(element.clone()),
            self.hooks.clone(),
        ));
        let requests = InFlight::new();
        let target = element.clone();

        let handler = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let request = describe(&target, &event, method);
            let prepared = pipeline.prepare(&requests, request);
            if prepared.prevent_default() {
                event.prevent_default();
            }
            if prepared.settled_early().is_some() {
                return;
            }
            let pipeline = pipeline.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let settled = pipeline.dispatch(prepared).await;
                debug!(
                    target = "patchwork::client::web",
                    settled = ?settled,
                    "trigger settled"
                );
            });
        });

        if let Err(err) =
            element.add_event_listener_with_callback(&event_name, handler.as_ref().unchecked_ref())
        {
            warn!(
                target = "patchwork::client::web",
                error = %js_message(&err),
                "could not listen for trigger event"
            );
            return;
        }
        // The element owns its listener from here on.
        if let Err(err) = Reflect::set(element, &JsValue::from_str(ARMED_KEY), &handler.into_js_value()) {
            warn!(
                target = "patchwork::client::web",
                error = %js_message(&err),
                "could not mark element as armed"
            );
        }
        DomHost::announce(element, Stage::Inited, &JsValue::UNDEFINED);
    }
}

fn is_armed(element: &Element) -> bool {
    Reflect::has(element, &JsValue::from_str(ARMED_KEY)).unwrap_or(false)
}

fn is_ignored(element: &Element) -> bool {
    matches!(element.closest(&format!("[{}]", attr::IGNORE)), Ok(Some(_)))
}

/// Build the request for one firing of `element`.
fn describe(element: &Element, event: &Event, method: Method) -> RequestDescriptor {
    let action = element.get_attribute(attr::ACTION).unwrap_or_default();
    let mut request = RequestDescriptor::new(action, method).with_fields(fields(element, event));
    if element.has_attribute(attr::BOOST) {
        request = request.boosted();
    }
    let swap = element.get_attribute(attr::SWAP);
    request.retarget(element.get_attribute(attr::TARGET), swap.as_deref());
    request
}

/// Form fields for the firing: the owning form's entries plus the submitter,
/// or the element's own name and value when it has no form.
fn fields(element: &Element, event: &Event) -> Vec<(String, String)> {
    let form = match element.dyn_ref::<HtmlFormElement>() {
        Some(form) => Some(form.clone()),
        None => element
            .closest("form")
            .ok()
            .flatten()
            .and_then(|form| form.dyn_into::<HtmlFormElement>().ok()),
    };

    let Some(form) = form else {
        return element
            .get_attribute("name")
            .filter(|name| !name.is_empty())
            .map(|name| vec![(name, live_value(element))])
            .unwrap_or_default();
    };

    let mut fields = FormData::new_with_form(&form)
        .ok()
        .map(|data| form_entries(&data))
        .unwrap_or_default();

    if let Some(submitter) = event
        .dyn_ref::<SubmitEvent>()
        .and_then(SubmitEvent::submitter)
    {
        if let Some(name) = submitter.get_attribute("name").filter(|name| !name.is_empty()) {
            fields.push((name, live_value(&submitter)));
        }
    }
    fields
}

fn form_entries(data: &FormData) -> Vec<(String, String)> {
    let Ok(Some(entries)) = try_iter(data) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let pair: js_sys::Array = entry.dyn_into().ok()?;
            // File entries have no string value and are not sent.
            Some((pair.get(0).as_string()?, pair.get(1).as_string()?))
        })
        .collect()
}

fn live_value(element: &Element) -> String {
    Reflect::get(element, &JsValue::from_str("value"))
        .ok()
        .and_then(|value| value.as_string())
        .unwrap_or_default()
}
