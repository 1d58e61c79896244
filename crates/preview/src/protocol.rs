//! Messages exchanged between the editor host and the preview sandbox.
//!
//! Every message travels as a JSON object of the form
//! `{"type": "<TAG>", "payload": ...}`. Each side only understands the
//! vocabulary addressed to it; anything else is ignored so either side can
//! grow new message kinds without breaking the other.

use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: MessageKind, reason: String },
    #[error("failed to encode {kind} message: {reason}")]
    Encode { kind: MessageKind, reason: String },
    #[error("peer disconnected")]
    Disconnected,
}

/// Which side of the boundary a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToHost,
    ToSandbox,
}

/// Wire tags understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    ElementSelected,
    ElementUpdated,
    UpdateElement,
    RequestHtml,
    HtmlResponse,
}

impl MessageKind {
    pub fn direction(self) -> Direction {
        match self {
            Self::ElementSelected | Self::ElementUpdated | Self::HtmlResponse => Direction::ToHost,
            Self::UpdateElement | Self::RequestHtml => Direction::ToSandbox,
        }
    }
}

/// Attributes reported for a selected element. Absent attributes are `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ElementAttributes {
    pub src: Option<String>,
    pub alt: Option<String>,
    pub href: Option<String>,
}

impl ElementAttributes {
    pub const NAMES: [&'static str; 3] = ["src", "alt", "href"];

    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "src" => self.src.as_deref(),
            "alt" => self.alt.as_deref(),
            "href" => self.href.as_deref(),
            _ => None,
        }
    }

    /// Sets one of the tracked attributes. Returns false for untracked names.
    pub fn set(&mut self, name: &str, value: Option<String>) -> bool {
        let slot = match name {
            "src" => &mut self.src,
            "alt" => &mut self.alt,
            "href" => &mut self.href,
            _ => return false,
        };
        *slot = value;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ElementSelected {
    pub tag_name: String,
    pub text_content: String,
    pub classes: String,
    pub id: String,
    pub attributes: ElementAttributes,
}

/// Live echo of in-place typing inside the active element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ElementUpdated {
    pub id: String,
    pub content: String,
}

/// Patch for a single element. Absent fields are left untouched.
///
/// `content` and `classes` distinguish an absent key from an explicit
/// `null`, which clears the value. `styles` is a JSON-encoded flat object of
/// inline style properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct UpdateElement {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub content: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub classes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
}

impl UpdateElement {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(Some(content.into()));
        self
    }

    pub fn with_classes(mut self, classes: impl Into<String>) -> Self {
        self.classes = Some(Some(classes.into()));
        self
    }

    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = Some(Value::String(styles.into()));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Commands sent from the host into the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    UpdateElement(UpdateElement),
    RequestHtml,
}

/// Events sent from the sandbox back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxMessage {
    ElementSelected(ElementSelected),
    ElementUpdated(ElementUpdated),
    HtmlResponse(String),
}

/// A message vocabulary addressed to one side of the boundary.
pub trait Envelope: Sized + Serialize + DeserializeOwned {
    const DIRECTION: Direction;

    fn kind(&self) -> MessageKind;

    fn encode(&self) -> Result<Value, ProtocolError> {
        serde_json::to_value(self).map_err(|e| ProtocolError::Encode {
            kind: self.kind(),
            reason: e.to_string(),
        })
    }

    /// Validates the tag and shape of an incoming event.
    ///
    /// Unknown tags, and tags addressed to the other side, yield `Ok(None)`.
    fn decode(value: Value) -> Result<Option<Self>, ProtocolError> {
        let Some(kind) = value
            .get("type")
            .and_then(Value::as_str)
            .and_then(|tag| MessageKind::from_str(tag).ok())
        else {
            return Ok(None);
        };

        if kind.direction() != Self::DIRECTION {
            return Ok(None);
        }

        let mut value = value;
        if kind == MessageKind::RequestHtml {
            // The tag is the whole request; `{}` and `null` payloads mean the same.
            if let Some(object) = value.as_object_mut()
                && object
                    .get("payload")
                    .is_some_and(|payload| payload.is_null() || payload.is_object())
            {
                object.remove("payload");
            }
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ProtocolError::Malformed {
                kind,
                reason: e.to_string(),
            })
    }

    /// Like [`Envelope::decode`] for raw text; non-JSON text is not a message.
    fn decode_str(raw: &str) -> Result<Option<Self>, ProtocolError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::decode(value),
            Err(_) => Ok(None),
        }
    }
}

impl Envelope for HostMessage {
    const DIRECTION: Direction = Direction::ToSandbox;

    fn kind(&self) -> MessageKind {
        match self {
            Self::UpdateElement(_) => MessageKind::UpdateElement,
            Self::RequestHtml => MessageKind::RequestHtml,
        }
    }
}

impl Envelope for SandboxMessage {
    const DIRECTION: Direction = Direction::ToHost;

    fn kind(&self) -> MessageKind {
        match self {
            Self::ElementSelected(_) => MessageKind::ElementSelected,
            Self::ElementUpdated(_) => MessageKind::ElementUpdated,
            Self::HtmlResponse(_) => MessageKind::HtmlResponse,
        }
    }
}
