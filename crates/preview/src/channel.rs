//! Paired one-way queues standing in for the cross-document message channel.

use std::marker::PhantomData;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};

use crate::protocol::{Envelope, HostMessage, ProtocolError, SandboxMessage};

/// One end of the channel: sends `Out`, receives `In`.
///
/// Events cross as opaque JSON values and are validated on receipt, so a
/// port never yields an unknown or malformed message.
pub struct Port<Out, In> {
    tx: UnboundedSender<Value>,
    rx: UnboundedReceiver<Value>,
    _direction: PhantomData<fn(Out) -> In>,
}

pub type HostPort = Port<HostMessage, SandboxMessage>;
pub type SandboxPort = Port<SandboxMessage, HostMessage>;

/// Creates the host and sandbox ends of a fresh channel.
pub fn pair() -> (HostPort, SandboxPort) {
    let (to_sandbox_tx, to_sandbox_rx) = mpsc::unbounded_channel();
    let (to_host_tx, to_host_rx) = mpsc::unbounded_channel();

    (
        Port {
            tx: to_sandbox_tx,
            rx: to_host_rx,
            _direction: PhantomData,
        },
        Port {
            tx: to_host_tx,
            rx: to_sandbox_rx,
            _direction: PhantomData,
        },
    )
}

impl<Out: Envelope, In: Envelope> Port<Out, In> {
    pub fn send(&self, message: &Out) -> Result<(), ProtocolError> {
        let value = message.encode()?;
        self.send_raw(value)
    }

    /// Posts an arbitrary event, bypassing encoding.
    pub fn send_raw(&self, value: Value) -> Result<(), ProtocolError> {
        self.tx.send(value).map_err(|_| ProtocolError::Disconnected)
    }

    /// Returns the next valid queued message without waiting.
    pub fn try_recv(&mut self) -> Option<In> {
        while let Ok(value) = self.rx.try_recv() {
            if let Some(message) = accept(value) {
                return Some(message);
            }
        }
        None
    }

    /// Waits for the next valid message; `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<In> {
        while let Some(value) = self.rx.recv().await {
            if let Some(message) = accept(value) {
                return Some(message);
            }
        }
        None
    }
}

fn accept<In: Envelope>(value: Value) -> Option<In> {
    match In::decode(value) {
        Ok(Some(message)) => Some(message),
        Ok(None) => {
            trace!("ignoring message of unknown kind");
            None
        }
        Err(e) => {
            warn!(error = %e, "dropping malformed message");
            None
        }
    }
}
