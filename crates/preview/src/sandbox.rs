//! The editing runtime that lives inside the preview document.
//!
//! A [`Sandbox`] turns an arbitrary generated document into an editable
//! surface: hovering outlines elements, clicking selects one and makes it
//! editable in place, and commands from the host patch elements by id. The
//! sandbox never persists anything; it only reports state back through its
//! [`SandboxPort`].

use std::collections::HashMap;

use convert_case::{Case, Casing};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    channel::SandboxPort,
    dom::{Document, ElementData, NodeData, NodeId},
    protocol::{
        ElementAttributes, ElementSelected, ElementUpdated, HostMessage, SandboxMessage,
        UpdateElement,
    },
};

pub const HOVER_OUTLINE: &str = "2px dashed #3b82f6";
pub const SELECTED_OUTLINE: &str = "2px solid #3b82f6";

/// Marks the script element the runtime injects into the document.
pub const RUNTIME_MARKER: &str = "data-editor-runtime";

const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";
const TAILWIND_CONFIG: &str =
    "tailwind.config = { theme: { extend: { fontFamily: { sans: ['Inter', 'sans-serif'] } } } }";
const INTER_FONT: &str =
    "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap";

const ID_PREFIX: &str = "el-";
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// Result of a click inside the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The element became the active selection.
    Selected,
    /// The click landed inside the element being edited; caret placement only.
    AlreadyEditing,
    /// A link was clicked; navigation was suppressed and nothing was selected.
    NavigationBlocked,
    /// The target was not an element.
    Ignored,
}

pub struct Sandbox {
    document: Document,
    selected: Option<NodeId>,
    ids: HashMap<String, NodeId>,
    port: SandboxPort,
}

impl Sandbox {
    /// Loads a document into the preview, adding the stylesheet assets the
    /// generated markup relies on and the runtime anchor script.
    pub fn load(html: &str, port: SandboxPort) -> Self {
        let mut document = Document::parse(html);
        install_head_assets(&mut document);
        install_runtime(&mut document);

        Self {
            document,
            selected: None,
            ids: HashMap::new(),
            port,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Whether `node` is editable in place, honouring inheritance.
    pub fn is_content_editable(&self, node: NodeId) -> bool {
        for ancestor in self.document.ancestors(node) {
            match self.document.attr(ancestor, "contenteditable") {
                Some("false") => return false,
                Some("" | "true" | "plaintext-only") => return true,
                _ => {}
            }
        }
        false
    }

    pub fn pointer_over(&mut self, target: NodeId) {
        if self.selected.is_some() || self.document.element(target).is_none() {
            return;
        }
        self.document.set_style_property(target, "outline", HOVER_OUTLINE);
        self.document.set_style_property(target, "cursor", "pointer");
    }

    pub fn pointer_out(&mut self, target: NodeId) {
        if self.selected == Some(target) {
            return;
        }
        self.document.set_style_property(target, "outline", "");
    }

    pub fn click(&mut self, target: NodeId) -> ClickOutcome {
        if self.document.element(target).is_none() {
            return ClickOutcome::Ignored;
        }

        // Links are intercepted before anything else sees the click.
        if self.document.closest(target, "a").is_some() {
            debug!("link navigation blocked");
            return ClickOutcome::NavigationBlocked;
        }

        if self.is_content_editable(target) {
            return ClickOutcome::AlreadyEditing;
        }

        if let Some(previous) = self.selected.filter(|previous| *previous != target) {
            self.document.set_style_property(previous, "outline", "");
            self.document.set_attr(previous, "contenteditable", "false");
        }

        self.selected = Some(target);
        self.document
            .set_style_property(target, "outline", SELECTED_OUTLINE);
        self.document.set_attr(target, "contenteditable", "true");

        let id = self.ensure_id(target);
        let selected = self.describe(target, id);
        self.emit(SandboxMessage::ElementSelected(selected));
        ClickOutcome::Selected
    }

    /// Text typed into the active element; echoed to the host immediately.
    pub fn input(&mut self, text: &str) {
        let Some(active) = self.selected else {
            return;
        };
        self.document.set_inner_text(active, text);

        let id = self.ensure_id(active);
        let content = self.document.inner_text(active);
        self.emit(SandboxMessage::ElementUpdated(ElementUpdated { id, content }));
    }

    /// Handles every queued host command. Returns how many took effect;
    /// updates for unknown ids are drained but not counted.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(message) = self.port.try_recv() {
            if self.handle(message) {
                applied += 1;
            }
        }
        applied
    }

    /// Returns false when an update names an element that does not exist.
    pub fn handle(&mut self, message: HostMessage) -> bool {
        match message {
            HostMessage::UpdateElement(update) => self.apply_update(update),
            HostMessage::RequestHtml => {
                let html = self.snapshot_html();
                self.emit(SandboxMessage::HtmlResponse(html));
                true
            }
        }
    }

    /// Serializes a copy of the document with every editing artifact removed.
    pub fn snapshot_html(&self) -> String {
        let mut clone = self.document.clone();

        for node in clone.elements() {
            let is_runtime = clone
                .element(node)
                .is_some_and(|el| el.name() == "script" && el.attr(RUNTIME_MARKER).is_some());
            if is_runtime {
                clone.detach(node);
                continue;
            }
            clone.set_style_property(node, "outline", "");
            clone.set_style_property(node, "cursor", "");
            clone.remove_attr(node, "contenteditable");
        }

        clone.serialize()
    }

    fn apply_update(&mut self, update: UpdateElement) -> bool {
        let Some(node) = self.lookup(&update.id) else {
            debug!(id = %update.id, "update target not found; ignoring");
            return false;
        };

        if let Some(content) = update.content {
            self.document
                .set_inner_text(node, content.as_deref().unwrap_or_default());
        }

        if let Some(classes) = update.classes {
            self.document
                .set_attr(node, "class", classes.unwrap_or_default());
        }

        if let Some(styles) = update.styles.as_ref() {
            match parse_style_patch(styles) {
                Ok(declarations) => {
                    for (property, value) in declarations {
                        self.document.set_style_property(node, &property, &value);
                    }
                }
                Err(reason) => debug!(id = %update.id, %reason, "skipping malformed styles"),
            }
        }

        if let Some(attributes) = update.attributes {
            for (name, value) in attributes {
                self.document.set_attr(node, &name, value);
            }
        }
        true
    }

    /// Resolves an element id through the cache, falling back to a scan for
    /// ids authored in the document itself.
    fn lookup(&mut self, id: &str) -> Option<NodeId> {
        if let Some(&node) = self.ids.get(id) {
            if self.document.is_attached(node) && self.document.attr(node, "id") == Some(id) {
                return Some(node);
            }
            self.ids.remove(id);
        }

        let node = self.document.element_by_id(id)?;
        self.ids.insert(id.to_string(), node);
        Some(node)
    }

    fn ensure_id(&mut self, node: NodeId) -> String {
        if let Some(existing) = self.document.attr(node, "id").filter(|id| !id.is_empty()) {
            let existing = existing.to_string();
            self.ids.insert(existing.clone(), node);
            return existing;
        }

        let id = loop {
            let candidate = generate_element_id();
            if self.document.element_by_id(&candidate).is_none() {
                break candidate;
            }
        };
        trace!(%id, "assigned element id");
        self.document.set_attr(node, "id", id.clone());
        self.ids.insert(id.clone(), node);
        id
    }

    fn describe(&self, node: NodeId, id: String) -> ElementSelected {
        let element = self.document.element(node);
        let attr = |name: &str| element.and_then(|el| el.attr(name)).map(str::to_string);

        ElementSelected {
            tag_name: element.map(ElementData::tag_name).unwrap_or_default(),
            text_content: self.document.inner_text(node),
            classes: attr("class").unwrap_or_default(),
            id,
            attributes: ElementAttributes {
                src: attr("src"),
                alt: attr("alt"),
                href: attr("href"),
            },
        }
    }

    fn emit(&self, message: SandboxMessage) {
        if let Err(e) = self.port.send(&message) {
            debug!(error = %e, "host unavailable; dropping sandbox message");
        }
    }
}

fn generate_element_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{ID_PREFIX}{suffix}")
}

/// Turns a style payload into CSS declarations.
///
/// Accepts a JSON object, or a string holding one. Keys may be camelCase
/// script names (`backgroundColor`) or CSS names; custom properties are kept
/// verbatim. `null` clears a property.
pub fn parse_style_patch(styles: &Value) -> Result<Vec<(String, String)>, String> {
    let parsed;
    let object = match styles {
        Value::Object(object) => object,
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())?;
            parsed
                .as_object()
                .ok_or_else(|| "styles must be a JSON object".to_string())?
        }
        _ => return Err("styles must be a JSON object".to_string()),
    };

    Ok(object
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Null => String::new(),
                _ => return None,
            };
            Some((css_property_name(key), value))
        })
        .collect())
}

fn css_property_name(key: &str) -> String {
    if key.starts_with("--") {
        key.to_string()
    } else {
        key.to_case(Case::Kebab)
    }
}

fn install_head_assets(document: &mut Document) {
    let Some(head) = document.find_first("head") else {
        return;
    };

    let has_tailwind = document.elements().into_iter().any(|node| {
        document
            .attr(node, "src")
            .is_some_and(|src| src.contains("cdn.tailwindcss.com"))
    });
    if !has_tailwind {
        let mut script = ElementData::new("script");
        script.set_attr("src", TAILWIND_CDN);
        document.append(head, NodeData::Element(script));
        let config = document.append(head, NodeData::Element(ElementData::new("script")));
        document.append(config, NodeData::Text(TAILWIND_CONFIG.to_string()));
    }

    let has_font = document.elements().into_iter().any(|node| {
        document
            .attr(node, "href")
            .is_some_and(|href| href.contains("family=Inter"))
    });
    if !has_font {
        let mut link = ElementData::new("link");
        link.set_attr("href", INTER_FONT);
        link.set_attr("rel", "stylesheet");
        document.append(head, NodeData::Element(link));
    }
}

fn install_runtime(document: &mut Document) {
    let Some(body) = document.find_first("body") else {
        return;
    };
    let mut script = ElementData::new("script");
    script.set_attr(RUNTIME_MARKER, "");
    document.append(body, NodeData::Element(script));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{self, HostPort},
        protocol::Envelope,
    };

    const PAGE: &str = "<!DOCTYPE html><html><head>\
        <script src=\"https://cdn.tailwindcss.com\"></script>\
        <link href=\"https://fonts.googleapis.com/css2?family=Inter&amp;display=swap\" rel=\"stylesheet\">\
        </head><body><h1 class=\"text-5xl\">Launch faster</h1>\
        <p id=\"lead\">Ship <b>today</b></p>\
        <a href=\"/pricing\"><span>Pricing</span></a>\
        <img src=\"/hero.png\" alt=\"Hero\"></body></html>";

    fn sandbox(html: &str) -> (Sandbox, HostPort) {
        let (host, port) = channel::pair();
        (Sandbox::load(html, port), host)
    }

    fn selected_payload(host: &mut HostPort) -> ElementSelected {
        match host.try_recv() {
            Some(SandboxMessage::ElementSelected(selected)) => selected,
            other => panic!("expected ElementSelected, got {other:?}"),
        }
    }

    #[test]
    fn test_click_selects_and_reports_element() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let h1 = sandbox.document().find_first("h1").unwrap();

        assert_eq!(sandbox.click(h1), ClickOutcome::Selected);

        let selected = selected_payload(&mut host);
        assert_eq!(selected.tag_name, "H1");
        assert_eq!(selected.text_content, "Launch faster");
        assert_eq!(selected.classes, "text-5xl");
        assert!(selected.id.starts_with("el-"));
        assert_eq!(selected.id.len(), 3 + ID_LEN);
        assert_eq!(sandbox.document().attr(h1, "id"), Some(selected.id.as_str()));
        assert_eq!(
            sandbox.document().style_property(h1, "outline").as_deref(),
            Some(SELECTED_OUTLINE)
        );
        assert!(sandbox.is_content_editable(h1));
    }

    #[test]
    fn test_existing_ids_are_reused() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let p = sandbox.document().element_by_id("lead").unwrap();
        sandbox.click(p);
        assert_eq!(selected_payload(&mut host).id, "lead");
    }

    #[test]
    fn test_selecting_another_element_deselects_previous() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let h1 = sandbox.document().find_first("h1").unwrap();
        let p = sandbox.document().find_first("p").unwrap();

        sandbox.click(h1);
        sandbox.click(p);
        let _ = selected_payload(&mut host);
        let _ = selected_payload(&mut host);

        let doc = sandbox.document();
        assert_eq!(doc.style_property(h1, "outline"), None);
        assert!(!sandbox.is_content_editable(h1));
        assert_eq!(
            doc.style_property(p, "outline").as_deref(),
            Some(SELECTED_OUTLINE)
        );
        assert!(sandbox.is_content_editable(p));

        let editing: Vec<_> = doc
            .elements()
            .into_iter()
            .filter(|node| doc.attr(*node, "contenteditable") == Some("true"))
            .collect();
        assert_eq!(editing, vec![p]);
    }

    #[test]
    fn test_click_inside_editing_element_does_not_reselect() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let p = sandbox.document().find_first("p").unwrap();
        let bold = sandbox.document().find_first("b").unwrap();

        sandbox.click(p);
        let _ = selected_payload(&mut host);

        assert_eq!(sandbox.click(bold), ClickOutcome::AlreadyEditing);
        assert_eq!(sandbox.click(p), ClickOutcome::AlreadyEditing);
        assert!(host.try_recv().is_none());
        assert_eq!(sandbox.selected(), Some(p));
    }

    #[test]
    fn test_link_clicks_are_blocked() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let span = sandbox.document().find_first("span").unwrap();

        assert_eq!(sandbox.click(span), ClickOutcome::NavigationBlocked);
        assert!(sandbox.selected().is_none());
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn test_hover_outline_respects_selection() {
        let (mut sandbox, _host) = sandbox(PAGE);
        let h1 = sandbox.document().find_first("h1").unwrap();
        let p = sandbox.document().find_first("p").unwrap();

        sandbox.pointer_over(h1);
        assert_eq!(
            sandbox.document().style_property(h1, "outline").as_deref(),
            Some(HOVER_OUTLINE)
        );
        sandbox.pointer_out(h1);
        assert_eq!(sandbox.document().style_property(h1, "outline"), None);

        sandbox.click(p);
        sandbox.pointer_over(h1);
        assert_eq!(sandbox.document().style_property(h1, "outline"), None);
        sandbox.pointer_out(p);
        assert_eq!(
            sandbox.document().style_property(p, "outline").as_deref(),
            Some(SELECTED_OUTLINE)
        );
    }

    #[test]
    fn test_input_echoes_live_text() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let h1 = sandbox.document().find_first("h1").unwrap();
        sandbox.click(h1);
        let id = selected_payload(&mut host).id;

        sandbox.input("Launch sooner");
        assert_eq!(
            host.try_recv(),
            Some(SandboxMessage::ElementUpdated(ElementUpdated {
                id,
                content: "Launch sooner".to_string(),
            }))
        );
    }

    #[test]
    fn test_update_applies_each_present_field() {
        let (mut sandbox, _host) = sandbox(PAGE);
        sandbox.handle(HostMessage::UpdateElement(
            UpdateElement::new("lead")
                .with_content("New lead")
                .with_classes("text-lg font-bold")
                .with_styles(r##"{"backgroundColor":"#000","--brand":"teal","zIndex":3}"##)
                .with_attribute("title", "Lead copy"),
        ));

        let doc = sandbox.document();
        let p = doc.element_by_id("lead").unwrap();
        assert_eq!(doc.inner_text(p), "New lead");
        assert_eq!(doc.attr(p, "class"), Some("text-lg font-bold"));
        assert_eq!(doc.style_property(p, "background-color").as_deref(), Some("#000"));
        assert_eq!(doc.style_property(p, "--brand").as_deref(), Some("teal"));
        assert_eq!(doc.style_property(p, "z-index").as_deref(), Some("3"));
        assert_eq!(doc.attr(p, "title"), Some("Lead copy"));
    }

    #[test]
    fn test_null_content_clears_and_absent_fields_are_untouched() {
        let (mut sandbox, _host) = sandbox(PAGE);
        let message = HostMessage::decode(serde_json::json!({
            "type": "UPDATE_ELEMENT",
            "payload": { "id": "lead", "content": null }
        }))
        .unwrap()
        .unwrap();
        sandbox.handle(message);

        let doc = sandbox.document();
        let p = doc.element_by_id("lead").unwrap();
        assert_eq!(doc.inner_text(p), "");
        assert_eq!(doc.attr(p, "class"), None);
    }

    #[test]
    fn test_malformed_styles_do_not_block_other_fields() {
        let (mut sandbox, _host) = sandbox(PAGE);
        sandbox.handle(HostMessage::UpdateElement(
            UpdateElement::new("lead")
                .with_styles("{not json")
                .with_classes("italic")
                .with_content("Still applied"),
        ));

        let doc = sandbox.document();
        let p = doc.element_by_id("lead").unwrap();
        assert_eq!(doc.attr(p, "class"), Some("italic"));
        assert_eq!(doc.inner_text(p), "Still applied");
        assert_eq!(doc.attr(p, "style"), None);
    }

    #[test]
    fn test_update_for_missing_id_is_a_no_op() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let before = sandbox.document().serialize();

        sandbox.handle(HostMessage::UpdateElement(
            UpdateElement::new("missing-id").with_content("x"),
        ));

        assert_eq!(sandbox.document().serialize(), before);
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn test_disjoint_updates_commute() {
        let updates = [
            UpdateElement::new("lead").with_content("Copy"),
            UpdateElement::new("lead").with_classes("p-4"),
            UpdateElement::new("lead").with_styles(r#"{"color":"red"}"#),
            UpdateElement::new("lead").with_attribute("data-x", "1"),
        ];

        let apply = |order: &[usize]| {
            let (mut sandbox, _host) = sandbox(PAGE);
            for index in order {
                sandbox.handle(HostMessage::UpdateElement(updates[*index].clone()));
            }
            sandbox.snapshot_html()
        };

        let expected = apply(&[0, 1, 2, 3]);
        for order in [[3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]] {
            assert_eq!(apply(&order), expected);
        }
    }

    #[test]
    fn test_repeated_update_is_idempotent() {
        let (mut sandbox, _host) = sandbox(PAGE);
        let update = UpdateElement::new("lead")
            .with_styles(r#"{"color":"red"}"#)
            .with_content("Once");
        sandbox.handle(HostMessage::UpdateElement(update.clone()));
        let first = sandbox.snapshot_html();
        sandbox.handle(HostMessage::UpdateElement(update));
        assert_eq!(sandbox.snapshot_html(), first);
    }

    #[test]
    fn test_request_html_round_trip_strips_editing_artifacts() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        let h1 = sandbox.document().find_first("h1").unwrap();
        let img = sandbox.document().find_first("img").unwrap();

        sandbox.pointer_over(img);
        sandbox.pointer_out(img);
        sandbox.click(h1);
        let id = selected_payload(&mut host).id;

        sandbox.handle(HostMessage::RequestHtml);
        let Some(SandboxMessage::HtmlResponse(html)) = host.try_recv() else {
            panic!("expected HtmlResponse");
        };

        assert!(!html.contains(RUNTIME_MARKER));
        assert!(!html.contains("outline"));
        assert!(!html.contains("cursor"));
        assert!(!html.contains("contenteditable"));
        assert!(html.starts_with("<!DOCTYPE html>"));

        let mut expected = Document::parse(PAGE);
        let h1_expected = expected.find_first("h1").unwrap();
        expected.set_attr(h1_expected, "id", id);
        assert_eq!(html, expected.serialize());
    }

    #[test]
    fn test_unmodified_round_trip_is_identity() {
        let (sandbox, _host) = sandbox(PAGE);
        let once = sandbox.snapshot_html();
        assert_eq!(once, Document::parse(PAGE).serialize());

        let (reloaded, _host) = self::sandbox(&once);
        assert_eq!(reloaded.snapshot_html(), once);
    }

    #[test]
    fn test_load_adds_missing_assets() {
        let (sandbox, _host) = sandbox("<h1>Bare</h1>");
        let html = sandbox.snapshot_html();
        assert!(html.contains(TAILWIND_CDN));
        assert!(html.contains("family=Inter"));
        assert!(html.contains("tailwind.config"));
    }

    #[test]
    fn test_hover_and_select_keep_author_styles_intact() {
        let (mut sandbox, mut host) = sandbox(
            "<div id=\"d\" style=\"background-image: url(data:image/png;base64,AAAA); color: red\">Hi</div>",
        );
        let div = sandbox.document().element_by_id("d").unwrap();

        sandbox.pointer_over(div);
        sandbox.pointer_out(div);
        assert_eq!(sandbox.click(div), ClickOutcome::Selected);
        selected_payload(&mut host);

        let html = sandbox.snapshot_html();
        assert!(html.contains("url(data:image/png;base64,AAAA)"), "{html}");
        assert!(html.contains("color: red"));
        assert!(!html.contains("outline"));
        assert!(!html.contains("cursor"));
    }

    #[test]
    fn test_request_html_with_empty_payload_is_answered() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        host.send_raw(serde_json::json!({ "type": "REQUEST_HTML", "payload": {} }))
            .unwrap();

        assert_eq!(sandbox.pump(), 1);
        assert!(matches!(
            host.try_recv(),
            Some(SandboxMessage::HtmlResponse(_))
        ));
    }

    #[test]
    fn test_updates_for_missing_ids_are_not_counted() {
        let (mut sandbox, host) = sandbox(PAGE);
        host.send(&HostMessage::UpdateElement(
            UpdateElement::new("missing-id").with_content("x"),
        ))
        .unwrap();
        host.send(&HostMessage::UpdateElement(
            UpdateElement::new("lead").with_content("Found"),
        ))
        .unwrap();

        assert_eq!(sandbox.pump(), 1);
        assert!(sandbox.snapshot_html().contains("<p id=\"lead\">Found</p>"));
    }

    #[test]
    fn test_pump_handles_queued_commands() {
        let (mut sandbox, mut host) = sandbox(PAGE);
        host.send(&HostMessage::UpdateElement(
            UpdateElement::new("lead").with_content("Queued"),
        ))
        .unwrap();
        host.send(&HostMessage::RequestHtml).unwrap();

        assert_eq!(sandbox.pump(), 2);
        let Some(SandboxMessage::HtmlResponse(html)) = host.try_recv() else {
            panic!("expected HtmlResponse");
        };
        assert!(html.contains("<p id=\"lead\">Queued</p>"));
    }
}
