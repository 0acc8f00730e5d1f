//! The seam between a [`GatewaySession`](super::GatewaySession) and the wire.
//!
//! A [`Connector`] opens one [`TransportHandle`] per connect attempt. The
//! handle's own reader reports inbound frames and its closure through the
//! [`TransportEvents`] it was given; those calls only enqueue work and never
//! wait on observer code.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use super::dispatch::{Dispatcher, Lane};
use super::error::WsError;
use super::session::MessageObservers;

/// Close code sent for a normal, requested closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Why a transport handle closed.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloseReason {
    /// WebSocket close code
    pub code: u16,
    /// Close reason text, possibly empty
    pub reason: String,
}

impl CloseReason {
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A connection that ended without a close handshake.
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "")
    }

    #[must_use]
    pub const fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Inbound size ceilings applied to a freshly opened handle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest complete message accepted, in bytes
    pub max_message_size: usize,
    /// Largest single frame accepted, in bytes
    pub max_frame_size: usize,
}

impl FrameLimits {
    /// The same ceiling for messages and frames.
    #[must_use]
    pub const fn uniform(bytes: usize) -> Self {
        Self {
            max_message_size: bytes,
            max_frame_size: bytes,
        }
    }
}

/// Opens transport handles against an address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: TransportHandle;

    /// Perform the handshake and return a live handle.
    ///
    /// The implementation owns the handle's reader and must report every
    /// inbound text frame through `events` in order, followed by exactly one
    /// close notification once the connection is gone.
    async fn connect(
        &self,
        address: &Url,
        limits: FrameLimits,
        events: TransportEvents,
    ) -> Result<Self::Handle, WsError>;
}

/// A live connection.
///
/// Both methods enqueue their request synchronously and return a future that
/// resolves once the transport has acted on it, so callers may invoke them
/// while holding a lock.
pub trait TransportHandle: Send + Sync + 'static {
    fn send_text(&self, frame: String) -> BoxFuture<'static, Result<(), WsError>>;

    /// Close the connection. Closing twice is allowed and may report an error.
    fn close(&self) -> BoxFuture<'static, Result<(), WsError>>;
}

#[derive(Debug)]
pub(crate) struct Closed {
    pub generation: u64,
    pub reason: CloseReason,
}

/// Event sink handed to a [`Connector`] for one connect attempt.
#[derive(Clone)]
pub struct TransportEvents {
    generation: u64,
    dispatcher: Dispatcher,
    messages: Arc<MessageObservers>,
    closed_tx: mpsc::UnboundedSender<Closed>,
}

impl TransportEvents {
    pub(crate) fn new(
        generation: u64,
        dispatcher: Dispatcher,
        messages: Arc<MessageObservers>,
        closed_tx: mpsc::UnboundedSender<Closed>,
    ) -> Self {
        Self {
            generation,
            dispatcher,
            messages,
            closed_tx,
        }
    }

    /// Generation of the handle these events belong to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver one inbound text frame to the message observers.
    pub fn frame(&self, text: String) {
        let observers = Arc::clone(&self.messages);
        self.dispatcher.submit(Lane::Messages, move || {
            observers.for_each(|observer| observer(&text));
        });
    }

    /// Report that the connection is gone.
    pub fn closed(&self, reason: CloseReason) {
        // The session may already be dropped.
        _ = self.closed_tx.send(Closed {
            generation: self.generation,
            reason,
        });
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
