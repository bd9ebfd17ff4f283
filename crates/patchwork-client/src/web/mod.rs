//! DOM bindings: arming, fetch, fragment merging and morphing.

mod arm;
pub mod fragments;
mod host;
pub mod morph;

use std::{cell::RefCell, rc::Rc};

use js_sys::Array;
use tracing::{debug, info};
use wasm_bindgen::{JsCast, JsValue, closure::Closure, prelude::wasm_bindgen};
use web_sys::{
    Document, Event, HtmlDocument, MutationObserver, MutationObserverInit, MutationRecord, Node,
};

use crate::{
    hooks::{CancelPrevious, ConfigHook, JsonBody, MirrorAntiforgery},
    signal::Stage,
};

use self::arm::Scanner;

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Encode form bodies as JSON instead of `application/x-www-form-urlencoded`.
    pub json_bodies: bool,
    /// Abort a running request when its element fires again instead of dropping the new one.
    pub cancel_previous: bool,
}

/// Start the runtime with default options.
#[wasm_bindgen]
pub fn start() -> Result<(), JsValue> {
    Runtime::start(RuntimeOptions::default())
}

#[wasm_bindgen(js_name = startWith)]
pub fn start_with(json_bodies: bool, cancel_previous: bool) -> Result<(), JsValue> {
    Runtime::start(RuntimeOptions {
        json_bodies,
        cancel_previous,
    })
}

/// Keeps the observer and listeners alive for the lifetime of the page.
pub struct Runtime {
    _observer: MutationObserver,
    _on_mutation: Closure<dyn FnMut(Array, MutationObserver)>,
    _on_process: Closure<dyn FnMut(Event)>,
    _on_ready: Option<Closure<dyn FnMut(Event)>>,
}

impl Runtime {
    pub fn start(options: RuntimeOptions) -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        if tracing_wasm::try_set_as_global_default().is_err() {
            debug!(target = "patchwork::client::web", "tracing already installed");
        }

        if RUNTIME.with(|slot| slot.borrow().is_some()) {
            debug!(target = "patchwork::client::web", "runtime already started");
            return Ok(());
        }

        let document = document()?;
        let scanner = Scanner::new(hooks(options));

        let on_process = {
            let scanner = scanner.clone();
            Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                if let Some(node) = event.target().and_then(|target| target.dyn_into::<Node>().ok()) {
                    scanner.process(&node);
                }
            })
        };
        document.add_event_listener_with_callback(
            &Stage::Process.event_name(),
            on_process.as_ref().unchecked_ref(),
        )?;

        let on_mutation = {
            let scanner = scanner.clone();
            Closure::<dyn FnMut(Array, MutationObserver)>::new(
                move |records: Array, _observer: MutationObserver| {
                    for record in records.iter() {
                        let record: MutationRecord = record.unchecked_into();
                        if record.type_() != "childList" {
                            continue;
                        }
                        let added = record.added_nodes();
                        for index in 0..added.length() {
                            if let Some(node) = added.item(index) {
                                scanner.process(&node);
                            }
                        }
                    }
                },
            )
        };
        let observer = MutationObserver::new(on_mutation.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        if let Some(root) = document.document_element() {
            observer.observe_with_options(&root, &init)?;
        }

        let on_ready = if document.ready_state() == "loading" {
            let scanner = scanner.clone();
            let ready = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                if let Ok(document) = self::document() {
                    if let Some(body) = document.body() {
                        scanner.process(&body);
                    }
                }
            });
            document.add_event_listener_with_callback(
                "DOMContentLoaded",
                ready.as_ref().unchecked_ref(),
            )?;
            Some(ready)
        } else {
            if let Some(body) = document.body() {
                scanner.process(&body);
            }
            None
        };

        RUNTIME.with(|slot| {
            slot.replace(Some(Runtime {
                _observer: observer,
                _on_mutation: on_mutation,
                _on_process: on_process,
                _on_ready: on_ready,
            }))
        });
        info!(
            target = "patchwork::client::web",
            json_bodies = options.json_bodies,
            cancel_previous = options.cancel_previous,
            "runtime started"
        );
        Ok(())
    }
}

fn hooks(options: RuntimeOptions) -> Rc<[Box<dyn ConfigHook>]> {
    let mut hooks: Vec<Box<dyn ConfigHook>> = vec![Box::new(MirrorAntiforgery::new(read_cookies))];
    if options.cancel_previous {
        hooks.push(Box::new(CancelPrevious));
    }
    if options.json_bodies {
        hooks.push(Box::new(JsonBody));
    }
    Rc::from(hooks)
}

fn read_cookies() -> Option<String> {
    document()
        .ok()?
        .dyn_into::<HtmlDocument>()
        .ok()?
        .cookie()
        .ok()
}

pub(crate) fn document() -> Result<Document, JsValue> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document available"))
}

/// Best-effort text for a thrown JavaScript value.
pub(crate) fn js_message(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{value:?}")
}
