//! Editable preview surface for generated pages.
//!
//! The host application and the preview sandbox talk only through the
//! message protocol in [`protocol`], carried over a [`channel`] pair. The
//! [`sandbox`] makes a generated document editable and the [`host`] bridge
//! keeps the authoritative copy of it.

pub mod channel;
pub mod dom;
pub mod fence;
pub mod host;
pub mod protocol;
pub mod sandbox;

pub use channel::{HostPort, SandboxPort, pair};
pub use fence::strip_code_fences;
pub use host::{ElementField, ExportFile, HostBridge, PropertySurface, SelectedElement};
pub use protocol::{
    ElementAttributes, ElementSelected, ElementUpdated, Envelope, HostMessage, ProtocolError,
    SandboxMessage, UpdateElement,
};
pub use sandbox::{ClickOutcome, Sandbox};
