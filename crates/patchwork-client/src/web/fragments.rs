use patchwork_protocol::SwapStrategy;
use tracing::{debug, error};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, DomParser, Element, HtmlTemplateElement, Node, SupportedType};

use crate::{
    descriptor::MergeTarget,
    pipeline::PipelineError,
    reconcile::{FragmentNode, MergePlan, Step, plan_fragments},
    signal::Stage,
};

use super::{
    document,
    host::DomHost,
    js_message,
    morph::{MorphOptions, morph},
};

fn merge_error(err: JsValue) -> PipelineError {
    PipelineError::Merge(js_message(&err))
}

/// Merge a response body into the page according to `plan`.
///
/// Each merged element gets `patch:process` once its scripts have been
/// recreated. A node whose target or manifest entry is missing is skipped
/// without affecting the others.
pub fn apply(plan: &MergePlan, text: &str, action: &str) -> Result<(), PipelineError> {
    let document = document().map_err(merge_error)?;
    match plan {
        MergePlan::Fragments {
            manifest,
            ignore_active_value,
        } => {
            let nodes = parse_fragments(&document, text).map_err(merge_error)?;
            let shape: Vec<FragmentNode> = nodes.iter().map(shape_of).collect();
            let steps = plan_fragments(manifest, &shape, |id| {
                document.get_element_by_id(id).is_some()
            });

            let options = MorphOptions {
                ignore_active_value: *ignore_active_value,
            };
            for step in steps {
                let Step::Apply {
                    index,
                    target,
                    strategy,
                } = step
                else {
                    continue;
                };
                let (Some(live), Some(incoming)) = (
                    document.get_element_by_id(&target),
                    nodes[index].dyn_ref::<Element>(),
                ) else {
                    continue;
                };
                let merged = match strategy {
                    SwapStrategy::Replace => {
                        live.replace_with_with_node_1(incoming).map_err(merge_error)?;
                        incoming.clone()
                    }
                    SwapStrategy::Morph => morph(&live, incoming, options).map_err(merge_error)?,
                };
                recreate_scripts(&document, &merged).map_err(merge_error)?;
                debug!(
                    target = "patchwork::client::web",
                    id = %target,
                    strategy = %strategy,
                    "fragment merged"
                );
                DomHost::announce(&merged, Stage::Process, &JsValue::UNDEFINED);
            }
            Ok(())
        }
        MergePlan::Target {
            target,
            ignore_active_value,
        } => {
            let options = MorphOptions {
                ignore_active_value: *ignore_active_value,
            };
            merge_into_target(&document, target, text, options).map_err(merge_error)
        }
        MergePlan::Document => merge_document(&document, text, action).map_err(merge_error),
    }
}

/// Merge the whole body into one live element named by the request.
fn merge_into_target(
    document: &Document,
    target: &MergeTarget,
    text: &str,
    options: MorphOptions,
) -> Result<(), JsValue> {
    let Some(live) = document.get_element_by_id(&target.id) else {
        error!(
            target = "patchwork::client::web",
            id = %target.id,
            "explicit merge target is not in the page"
        );
        return Ok(());
    };
    let nodes = parse_fragments(document, text)?;

    let merged: Vec<Element> = match target.strategy {
        SwapStrategy::Replace => {
            let Some(parent) = live.parent_node() else {
                return Ok(());
            };
            let anchor: &Node = &live;
            for node in &nodes {
                parent.insert_before(node, Some(anchor))?;
            }
            live.remove();
            nodes
                .iter()
                .filter_map(|node| node.dyn_ref::<Element>().cloned())
                .collect()
        }
        SwapStrategy::Morph => {
            let Some(incoming) = nodes.iter().find_map(|node| node.dyn_ref::<Element>()) else {
                return Ok(());
            };
            vec![morph(&live, incoming, options)?]
        }
    };

    for element in &merged {
        recreate_scripts(document, element)?;
    }
    debug!(
        target = "patchwork::client::web",
        id = %target.id,
        strategy = %target.strategy,
        "explicit target merged"
    );
    for element in &merged {
        if element.is_connected() {
            DomHost::announce(element, Stage::Process, &JsValue::UNDEFINED);
        }
    }
    Ok(())
}

/// Parse concatenated fragments through an inert `<template>`.
fn parse_fragments(document: &Document, text: &str) -> Result<Vec<Node>, JsValue> {
    let template: HtmlTemplateElement = document.create_element("template")?.dyn_into()?;
    template.set_inner_html(text);
    let nodes = template.content().child_nodes();
    Ok((0..nodes.length()).filter_map(|index| nodes.get(index)).collect())
}

fn shape_of(node: &Node) -> FragmentNode {
    match node.dyn_ref::<Element>() {
        Some(element) if element.tag_name().eq_ignore_ascii_case("template") => {
            FragmentNode::Template
        }
        Some(element) => FragmentNode::Element { id: element.id() },
        None => FragmentNode::Other,
    }
}

/// Swap in the body of a full document answering a boosted request.
fn merge_document(document: &Document, text: &str, action: &str) -> Result<(), JsValue> {
    let parsed = DomParser::new()?.parse_from_string(text, SupportedType::TextHtml)?;
    document.set_title(&parsed.title());

    if let (Some(incoming), Some(live)) = (parsed.body(), document.body()) {
        let imported: Element = document.import_node_with_deep(&incoming, true)?.dyn_into()?;
        live.replace_with_with_node_1(&imported)?;
        recreate_scripts(document, &imported)?;
        DomHost::announce(&imported, Stage::Process, &JsValue::UNDEFINED);
    }

    if let Some(window) = web_sys::window() {
        window
            .history()?
            .push_state_with_url(&JsValue::NULL, "", Some(action))?;
    }
    Ok(())
}

/// Scripts inserted through `innerHTML` never run; clone them into fresh elements so they do.
fn recreate_scripts(document: &Document, root: &Element) -> Result<(), JsValue> {
    let mut scripts = Vec::new();
    if root.tag_name().eq_ignore_ascii_case("script") {
        scripts.push(root.clone());
    }
    let found = root.query_selector_all("script")?;
    scripts.extend(
        (0..found.length())
            .filter_map(|index| found.get(index))
            .filter_map(|node| node.dyn_into::<Element>().ok()),
    );

    for old in scripts {
        let fresh = document.create_element("script")?;
        for name in old.get_attribute_names().iter().filter_map(|name| name.as_string()) {
            if let Some(value) = old.get_attribute(&name) {
                fresh.set_attribute(&name, &value)?;
            }
        }
        fresh.set_text_content(old.text_content().as_deref());
        old.replace_with_with_node_1(&fresh)?;
    }
    Ok(())
}
