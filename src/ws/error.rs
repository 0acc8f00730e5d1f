#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::transport::CloseReason;

/// Failure outcome of a session operation.
///
/// Values are cheap to clone so every observer of a [`Completion`](super::Completion)
/// receives its own copy.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum WsError {
    /// The transport failed: handshake, write, timeout or abnormal local close
    Transport(TransportFailure),
    /// The remote peer closed the connection
    RemoteDisconnect(CloseReason),
    /// No transport handle is currently established
    NotConnected,
}

impl WsError {
    /// Wrap any transport-level error.
    pub fn transport<E: StdError + Send + Sync + 'static>(cause: E) -> Self {
        Self::Transport(TransportFailure::new(cause))
    }

    #[must_use]
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(failure) => write!(f, "WebSocket transport error: {failure}"),
            Self::RemoteDisconnect(close) => write!(f, "WebSocket closed by remote: {close}"),
            Self::NotConnected => write!(f, "WebSocket connection is not established"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Transport(failure) => Some(failure.cause()),
            _ => None,
        }
    }
}

impl From<TransportFailure> for WsError {
    fn from(failure: TransportFailure) -> Self {
        Self::Transport(failure)
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

/// A transport exception together with its underlying cause.
#[derive(Clone)]
pub struct TransportFailure {
    cause: Arc<dyn StdError + Send + Sync + 'static>,
}

impl TransportFailure {
    pub fn new<E: StdError + Send + Sync + 'static>(cause: E) -> Self {
        Self {
            cause: Arc::new(cause),
        }
    }

    /// The connect handshake did not finish within `after`.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::new(ConnectTimeout { after })
    }

    /// The handle was already closed when the operation reached it.
    #[must_use]
    pub fn closed() -> Self {
        Self::new(HandleClosed)
    }

    #[must_use]
    pub fn cause(&self) -> &(dyn StdError + 'static) {
        &*self.cause
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }
}

impl fmt::Debug for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFailure")
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimeout {
    pub after: Duration,
}

impl fmt::Display for ConnectTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handshake did not complete within {:?}", self.after)
    }
}

impl StdError for ConnectTimeout {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleClosed;

impl fmt::Display for HandleClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport handle is closed")
    }
}

impl StdError for HandleClosed {}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::transport(e)
    }
}
