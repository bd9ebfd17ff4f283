#![cfg(target_arch = "wasm32")]

use patchwork_client::web::morph::{MorphOptions, morph};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{Document, Element, HtmlBodyElement, HtmlInputElement, window};

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> Document {
    window().unwrap().document().unwrap()
}

fn mount(html: &str) -> Element {
    let body = document()
        .body()
        .unwrap()
        .dyn_into::<HtmlBodyElement>()
        .unwrap();
    let host = document().create_element("div").unwrap();
    host.set_inner_html(html);
    body.append_child(&host).unwrap();
    host.first_element_child().unwrap()
}

fn detached(html: &str) -> Element {
    let holder = document().create_element("div").unwrap();
    holder.set_inner_html(html);
    holder.first_element_child().unwrap()
}

fn typed_input(id: &str) -> HtmlInputElement {
    let input = document()
        .get_element_by_id(id)
        .unwrap()
        .dyn_into::<HtmlInputElement>()
        .unwrap();
    input.focus().unwrap();
    input.set_value("typed by the user");
    input
}

#[wasm_bindgen_test]
fn focused_value_survives_when_ignoring_active() {
    let live = mount(r#"<form id="f1"><input id="f1-step" name="step" value="1"><p>old</p></form>"#);
    let input = typed_input("f1-step");

    let incoming = detached(r#"<form id="f1"><input id="f1-step" name="step" value="5"><p>new</p></form>"#);
    let merged = morph(
        &live,
        &incoming,
        MorphOptions {
            ignore_active_value: true,
        },
    )
    .unwrap();

    assert_eq!(merged, live);
    assert_eq!(input.value(), "typed by the user");
    assert_eq!(
        document().active_element().map(|el| el.id()),
        Some("f1-step".to_string())
    );
    assert_eq!(live.query_selector("p").unwrap().unwrap().text_content().unwrap(), "new");
}

#[wasm_bindgen_test]
fn focused_value_is_overwritten_by_default() {
    let live = mount(r#"<form id="f2"><input id="f2-step" name="step" value="1"></form>"#);
    let input = typed_input("f2-step");

    let incoming = detached(r#"<form id="f2"><input id="f2-step" name="step" value="5"></form>"#);
    morph(&live, &incoming, MorphOptions::default()).unwrap();

    assert_eq!(input.value(), "5");
    let same_node = document().get_element_by_id("f2-step").unwrap();
    assert_eq!(same_node, Element::from(input));
}

#[wasm_bindgen_test]
fn keyed_children_are_moved_not_rebuilt() {
    let live = mount(r#"<ul id="m1"><li id="m1-a">a</li><li id="m1-b">b</li></ul>"#);
    let original_b = document().get_element_by_id("m1-b").unwrap();

    let incoming = detached(r#"<ul id="m1"><li id="m1-b">b!</li><li id="m1-c">c</li></ul>"#);
    morph(&live, &incoming, MorphOptions::default()).unwrap();

    let ids: Vec<String> = (0..live.children().length())
        .filter_map(|index| live.children().item(index))
        .map(|child| child.id())
        .collect();
    assert_eq!(ids, ["m1-b", "m1-c"]);
    assert_eq!(live.first_element_child().unwrap(), original_b);
    assert_eq!(original_b.text_content().unwrap(), "b!");
}

#[wasm_bindgen_test]
fn different_tag_replaces_the_target() {
    let live = mount(r#"<div id="r1">old</div>"#);
    let incoming = detached(r#"<section id="r1">new</section>"#);

    let merged = morph(&live, &incoming, MorphOptions::default()).unwrap();

    assert_eq!(merged.tag_name(), "SECTION");
    assert!(!live.is_connected());
    assert_eq!(document().get_element_by_id("r1").unwrap(), merged);
}
