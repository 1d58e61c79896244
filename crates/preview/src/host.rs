//! Host-side controller for the preview.
//!
//! The [`HostBridge`] owns the authoritative document text and the currently
//! selected element, turns property edits into `UPDATE_ELEMENT` commands and
//! reconciles events coming back from the sandbox. It never looks inside the
//! sandbox document; everything it knows arrives through its port.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use ts_rs::TS;

use crate::{
    channel::HostPort,
    fence::strip_code_fences,
    protocol::{ElementAttributes, ElementSelected, HostMessage, SandboxMessage, UpdateElement},
};

/// Host-side snapshot of the element under edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SelectedElement {
    pub element_id: String,
    pub tag_name: String,
    pub text_content: String,
    pub classes: String,
    pub attributes: ElementAttributes,
    /// Inline properties set through the editor, not the computed style.
    pub styles: Option<BTreeMap<String, String>>,
}

impl From<ElementSelected> for SelectedElement {
    fn from(selected: ElementSelected) -> Self {
        Self {
            element_id: selected.id,
            tag_name: selected.tag_name,
            text_content: selected.text_content,
            classes: selected.classes,
            attributes: selected.attributes,
            styles: None,
        }
    }
}

/// Which editing tools the host shows for the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum PropertySurface {
    Image,
    Generic,
}

impl PropertySurface {
    pub fn for_tag(tag_name: &str) -> Self {
        if tag_name.eq_ignore_ascii_case("img") {
            Self::Image
        } else {
            Self::Generic
        }
    }
}

/// An editable property of the selected element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementField {
    Content,
    Classes,
    /// JSON-encoded map of inline style properties.
    Styles,
    Attribute(String),
}

/// A document ready to be offered as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub contents: String,
}

impl ExportFile {
    pub fn html(contents: impl Into<String>) -> Self {
        Self {
            file_name: "index.html",
            content_type: "text/html",
            contents: contents.into(),
        }
    }
}

pub struct HostBridge {
    port: HostPort,
    selection: Option<SelectedElement>,
    surface: Option<PropertySurface>,
    document: String,
    generation: Option<String>,
}

impl HostBridge {
    pub fn new(port: HostPort, document: impl Into<String>) -> Self {
        Self {
            port,
            selection: None,
            surface: None,
            document: document.into(),
            generation: None,
        }
    }

    pub fn selection(&self) -> Option<&SelectedElement> {
        self.selection.as_ref()
    }

    pub fn surface(&self) -> Option<PropertySurface> {
        self.surface
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Handles every queued sandbox event. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.port.try_recv() {
            self.handle(message);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, message: SandboxMessage) {
        match message {
            SandboxMessage::ElementSelected(selected) => {
                self.surface = Some(PropertySurface::for_tag(&selected.tag_name));
                self.selection = Some(selected.into());
            }
            SandboxMessage::ElementUpdated(updated) => match self.selection.as_mut() {
                Some(selection) if selection.element_id == updated.id => {
                    selection.text_content = updated.content;
                }
                _ => trace!(id = %updated.id, "ignoring echo for unselected element"),
            },
            SandboxMessage::HtmlResponse(html) => {
                debug!(bytes = html.len(), "document refreshed from preview");
                self.document = html;
            }
        }
    }

    /// Records an edit locally and forwards it to the sandbox as a
    /// single-field update. Does nothing without a selection.
    pub fn apply_update(&mut self, field: ElementField, value: &str) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };

        let update = UpdateElement::new(selection.element_id.clone());
        let update = match field {
            ElementField::Content => {
                selection.text_content = value.to_string();
                update.with_content(value)
            }
            ElementField::Classes => {
                selection.classes = value.to_string();
                update.with_classes(value)
            }
            ElementField::Styles => {
                if let Some(styles) = parse_style_map(value) {
                    selection.styles = Some(styles);
                }
                update.with_styles(value)
            }
            ElementField::Attribute(name) => {
                selection.attributes.set(&name, Some(value.to_string()));
                update.with_attribute(name, value)
            }
        };

        self.send(HostMessage::UpdateElement(update));
    }

    /// Replaces the selected image's source, keeping its other attributes.
    pub fn apply_image_src(&mut self, src: &str) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };
        selection.attributes.src = Some(src.to_string());
        let update = UpdateElement::new(selection.element_id.clone()).with_attribute("src", src);
        self.send(HostMessage::UpdateElement(update));
    }

    /// Asks the sandbox for its current markup; the answer replaces
    /// [`HostBridge::document`] when it arrives.
    pub fn request_save(&self) {
        self.send(HostMessage::RequestHtml);
    }

    /// Dismisses the property tools and drops the selection.
    pub fn close(&mut self) {
        self.selection = None;
        self.surface = None;
    }

    /// Replaces the document wholesale, e.g. when a project is opened.
    pub fn load_document(&mut self, html: impl Into<String>) {
        self.close();
        self.generation = None;
        self.document = html.into();
    }

    pub fn begin_generation(&mut self) {
        self.close();
        self.generation = Some(String::new());
    }

    /// Appends a streamed fragment and refreshes the document from the
    /// fence-stripped accumulated text.
    pub fn push_fragment(&mut self, fragment: &str) -> &str {
        let accumulated = self.generation.get_or_insert_with(String::new);
        accumulated.push_str(fragment);
        self.document = strip_code_fences(accumulated).to_string();
        &self.document
    }

    /// Ends the current stream. The last document built from it is kept,
    /// whether the stream completed or failed part way.
    pub fn finish_generation(&mut self) {
        self.generation = None;
    }

    pub fn export(&self) -> ExportFile {
        ExportFile::html(self.document.clone())
    }

    fn send(&self, message: HostMessage) {
        if let Err(e) = self.port.send(&message) {
            debug!(error = %e, "preview unavailable; dropping command");
        }
    }
}

fn parse_style_map(raw: &str) -> Option<BTreeMap<String, String>> {
    let Value::Object(object) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };
    Some(
        object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                Value::Number(n) => Some((key, n.to_string())),
                _ => None,
            })
            .collect(),
    )
}
