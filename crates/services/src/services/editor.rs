//! Applies preview protocol commands to stored markup without a browser.
//!
//! The commands travel through the same host/sandbox channel pair the live
//! editor uses, and the result is read back with a save round trip, so a
//! headless edit produces exactly what the preview would have saved.

use preview::{Envelope, HostBridge, HostMessage, ProtocolError, Sandbox, pair};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no edit commands given")]
    NoCommands,
    #[error("command {index} is invalid: {reason}")]
    InvalidCommand { index: usize, reason: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("preview returned no document")]
    NoResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub html: String,
    pub applied: usize,
}

fn validate(commands: &[Value]) -> Result<Vec<HostMessage>, EditorError> {
    if commands.is_empty() {
        return Err(EditorError::NoCommands);
    }
    commands
        .iter()
        .enumerate()
        .map(|(index, command)| match HostMessage::decode(command.clone()) {
            Ok(Some(message @ HostMessage::UpdateElement(_))) => Ok(message),
            Ok(Some(HostMessage::RequestHtml)) | Ok(None) => Err(EditorError::InvalidCommand {
                index,
                reason: "expected an UPDATE_ELEMENT command".to_string(),
            }),
            Err(e) => Err(EditorError::InvalidCommand {
                index,
                reason: e.to_string(),
            }),
        })
        .collect()
}

/// Loads `html` into a sandbox, applies every `UPDATE_ELEMENT` command in
/// order and returns the saved document. Commands for ids that do not exist
/// change nothing.
pub fn apply_edits(html: &str, commands: &[Value]) -> Result<EditOutcome, EditorError> {
    let messages = validate(commands)?;

    let (host_port, sandbox_port) = pair();
    let mut sandbox = Sandbox::load(html, sandbox_port);
    for message in &messages {
        host_port.send(message)?;
    }

    let mut bridge = HostBridge::new(host_port, html);
    bridge.request_save();
    // The save request always takes effect; the rest are the updates that found their element.
    let applied = sandbox.pump().saturating_sub(1);
    if bridge.pump() == 0 {
        return Err(EditorError::NoResponse);
    }
    tracing::debug!(applied, bytes = bridge.document().len(), "headless edits applied");

    Ok(EditOutcome {
        html: bridge.export().contents,
        applied,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html><html><head><title>Bakery</title></head><body><h1 id="hero" class="text-4xl">Fresh bread</h1><img id="photo" src="/a.png" alt="loaf"></body></html>"#;

    #[test]
    fn test_edits_are_applied() {
        let commands = [
            json!({ "type": "UPDATE_ELEMENT", "payload": { "id": "hero", "content": "Warm bread", "classes": "text-6xl" } }),
            json!({ "type": "UPDATE_ELEMENT", "payload": { "id": "photo", "attributes": { "src": "/b.png" } } }),
        ];
        let outcome = apply_edits(PAGE, &commands).unwrap();

        assert_eq!(outcome.applied, 2);
        assert!(outcome.html.starts_with("<!DOCTYPE html>"));
        assert!(outcome.html.contains(r#"<h1 id="hero" class="text-6xl">Warm bread</h1>"#));
        assert!(outcome.html.contains(r#"src="/b.png""#));
        assert!(outcome.html.contains(r#"alt="loaf""#));
        assert!(!outcome.html.contains("data-editor-runtime"));
        assert!(!outcome.html.contains("contenteditable"));
    }

    #[test]
    fn test_missing_id_changes_nothing() {
        let commands = [json!({ "type": "UPDATE_ELEMENT", "payload": { "id": "missing-id", "content": "x" } })];
        let outcome = apply_edits(PAGE, &commands).unwrap();
        assert_eq!(outcome.applied, 0);
        assert!(outcome.html.contains("Fresh bread"));
        assert!(!outcome.html.contains(">x<"));

        let commands = [
            json!({ "type": "UPDATE_ELEMENT", "payload": { "id": "missing-id", "content": "x" } }),
            json!({ "type": "UPDATE_ELEMENT", "payload": { "id": "hero", "content": "Rye" } }),
        ];
        assert_eq!(apply_edits(PAGE, &commands).unwrap().applied, 1);
    }

    #[test]
    fn test_malformed_styles_do_not_block_other_fields() {
        let commands = [json!({
            "type": "UPDATE_ELEMENT",
            "payload": { "id": "hero", "styles": "{not json", "content": "Still applied" }
        })];
        let outcome = apply_edits(PAGE, &commands).unwrap();
        assert!(outcome.html.contains("Still applied"));
    }

    #[test]
    fn test_rejects_non_update_commands() {
        assert!(matches!(apply_edits(PAGE, &[]), Err(EditorError::NoCommands)));
        assert!(matches!(
            apply_edits(PAGE, &[json!({ "type": "REQUEST_HTML" })]),
            Err(EditorError::InvalidCommand { index: 0, .. })
        ));
        assert!(matches!(
            apply_edits(
                PAGE,
                &[
                    json!({ "type": "UPDATE_ELEMENT", "payload": { "id": "hero" } }),
                    json!({ "type": "SOMETHING_NEW" }),
                ]
            ),
            Err(EditorError::InvalidCommand { index: 1, .. })
        ));
        assert!(matches!(
            apply_edits(PAGE, &[json!({ "type": "UPDATE_ELEMENT", "payload": { "content": "no id" } })]),
            Err(EditorError::InvalidCommand { index: 0, .. })
        ));
    }
}
