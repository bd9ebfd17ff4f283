//! In-place DOM diffing.
//!
//! [`morph`] walks the live subtree and the incoming one side by side and edits
//! the live nodes until they match, so elements that survive keep focus,
//! selection, scroll position and listeners. Children are paired by node type,
//! tag name and `id`; an `id` further along the live siblings is moved up
//! instead of being rebuilt.

use std::collections::HashSet;

use js_sys::Array;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlInputElement, HtmlTextAreaElement, Node};

use super::document;

#[derive(Debug, Clone, Copy, Default)]
pub struct MorphOptions {
    /// Leave the live value of the focused control untouched.
    pub ignore_active_value: bool,
}

/// Patch `target` to match `source`, returning the element now in the page.
///
/// When the tag names differ `target` is replaced by `source` outright.
pub fn morph(target: &Element, source: &Element, options: MorphOptions) -> Result<Element, JsValue> {
    if target.tag_name() != source.tag_name() {
        target.replace_with_with_node_1(source)?;
        return Ok(source.clone());
    }

    let active = document()?.active_element();
    let morpher = Morpher {
        active,
        preserve_active: options.ignore_active_value,
    };
    morpher.element(target, source)?;
    Ok(target.clone())
}

struct Morpher {
    active: Option<Element>,
    preserve_active: bool,
}

impl Morpher {
    fn keeps_value(&self, element: &Element) -> bool {
        self.preserve_active && self.active.as_ref() == Some(element)
    }

    fn node(&self, live: &Node, incoming: &Node) -> Result<(), JsValue> {
        match (live.dyn_ref::<Element>(), incoming.dyn_ref::<Element>()) {
            (Some(live), Some(incoming)) => self.element(live, incoming),
            _ => {
                if live.node_value() != incoming.node_value() {
                    live.set_node_value(incoming.node_value().as_deref());
                }
                Ok(())
            }
        }
    }

    fn element(&self, live: &Element, incoming: &Element) -> Result<(), JsValue> {
        self.attributes(live, incoming)?;
        self.live_value(live, incoming);
        self.children(live, incoming)
    }

    fn attributes(&self, live: &Element, incoming: &Element) -> Result<(), JsValue> {
        let keep_value = self.keeps_value(live);
        let wanted = attribute_names(incoming);

        for name in &wanted {
            if keep_value && name == "value" {
                continue;
            }
            let value = incoming.get_attribute(name).unwrap_or_default();
            if live.get_attribute(name).as_deref() != Some(value.as_str()) {
                live.set_attribute(name, &value)?;
            }
        }
        for name in attribute_names(live) {
            if keep_value && name == "value" {
                continue;
            }
            if !wanted.contains(&name) {
                live.remove_attribute(&name)?;
            }
        }
        Ok(())
    }

    /// Attributes only seed form controls; the live property needs its own update.
    fn live_value(&self, live: &Element, incoming: &Element) {
        if self.keeps_value(live) {
            return;
        }
        if let Some(input) = live.dyn_ref::<HtmlInputElement>() {
            let value = incoming.get_attribute("value").unwrap_or_default();
            if input.value() != value {
                input.set_value(&value);
            }
            input.set_checked(incoming.has_attribute("checked"));
        } else if let Some(area) = live.dyn_ref::<HtmlTextAreaElement>() {
            let value = incoming.text_content().unwrap_or_default();
            if area.value() != value {
                area.set_value(&value);
            }
        }
    }

    fn children(&self, live: &Node, incoming: &Node) -> Result<(), JsValue> {
        let mut cursor = live.first_child();

        for next in child_list(incoming) {
            match cursor.clone() {
                Some(current) if same_kind(&current, &next) => {
                    self.node(&current, &next)?;
                    cursor = current.next_sibling();
                }
                _ => match find_by_id(cursor.as_ref(), &next) {
                    Some(found) => {
                        live.insert_before(&found, cursor.as_ref())?;
                        self.node(&found, &next)?;
                    }
                    None => {
                        live.insert_before(&next, cursor.as_ref())?;
                    }
                },
            }
        }

        while let Some(stale) = cursor {
            cursor = stale.next_sibling();
            live.remove_child(&stale)?;
        }
        Ok(())
    }
}

fn child_list(parent: &Node) -> Vec<Node> {
    let nodes = parent.child_nodes();
    (0..nodes.length()).filter_map(|index| nodes.get(index)).collect()
}

fn attribute_names(element: &Element) -> HashSet<String> {
    let names: Array = element.get_attribute_names();
    names.iter().filter_map(|name| name.as_string()).collect()
}

fn same_kind(live: &Node, incoming: &Node) -> bool {
    if live.node_type() != incoming.node_type() {
        return false;
    }
    match (live.dyn_ref::<Element>(), incoming.dyn_ref::<Element>()) {
        (Some(live), Some(incoming)) => {
            live.tag_name() == incoming.tag_name() && live.id() == incoming.id()
        }
        _ => true,
    }
}

/// Look ahead from `start` for a live sibling carrying `incoming`'s id.
fn find_by_id(start: Option<&Node>, incoming: &Node) -> Option<Node> {
    let incoming = incoming.dyn_ref::<Element>()?;
    let id = incoming.id();
    if id.is_empty() {
        return None;
    }

    let mut candidate = start.cloned();
    while let Some(node) = candidate {
        if let Some(element) = node.dyn_ref::<Element>() {
            if element.id() == id && element.tag_name() == incoming.tag_name() {
                return Some(node);
            }
        }
        candidate = node.next_sibling();
    }
    None
}
