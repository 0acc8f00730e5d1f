//! Persistent gateway WebSocket session.
//!
//! # Architecture
//!
//! - [`GatewaySession`]: owns the current transport handle, the reconnect
//!   policy and the observer lists; runs the close-handling state machine
//! - [`Completion`]: single-assignment outcome returned by every operation
//! - [`WsError`]: failure taxonomy carried by completions
//! - [`Dispatcher`]: lane workers delivering events to observers off the
//!   transport read path
//! - [`MemoryBudget`]: inbound message ceiling, fixed or a share of memory
//! - [`Connector`] / [`TransportHandle`]: the transport seam, implemented for
//!   `tokio-tungstenite` by [`TungsteniteConnector`]
//!
//! # Example
//!
//! ```rust, no_run
//! use gateway_ws::ws::{GatewaySession, ReconnectPolicy, config::Config};
//!
//! # async fn run() -> gateway_ws::Result<()> {
//! let session = GatewaySession::new("wss://gateway.example.com", Config::default())?;
//! session.set_reconnect_policy(ReconnectPolicy::new(|close| close.code != 4004));
//! session.on_connect(|| println!("connected"));
//!
//! session
//!     .connect()
//!     .on_transport_failure(|failure| eprintln!("handshake failed: {failure}"));
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod session;
pub mod transport;
pub mod tungstenite;

pub use completion::Completion;
pub use config::{Config, ReconnectPolicy, RetryConfig};
pub use dispatch::{Dispatcher, Lane};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use error::{ConnectTimeout, HandleClosed, TransportFailure};
pub use memory::{MemoryBudget, MemoryProbe, SystemMemory};
pub use session::{GatewaySession, ObserverId};
pub use transport::{CloseReason, Connector, FrameLimits, TransportEvents, TransportHandle};
pub use tungstenite::{TungsteniteConnector, TungsteniteHandle};
