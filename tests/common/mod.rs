#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each integration test binary uses a different subset of these helpers"
)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use gateway_ws::ws::{
    CloseReason, Connector, FrameLimits, TransportEvents, TransportFailure, TransportHandle,
    WsError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Receive the next value or panic after [`RECV_TIMEOUT`].
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert nothing arrives within `wait`.
pub async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>, wait: Duration) {
    if let Ok(Some(value)) = timeout(wait, rx.recv()).await {
        panic!("unexpected event: {value:?}");
    }
}

/// In-memory transport tagging every handle with the session generation it
/// was opened for.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    attempts: AtomicUsize,
    failures_pending: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    handles: Mutex<HashMap<u64, FakeHandle>>,
    /// Every frame a handle accepted, with that handle's generation
    delivered: Mutex<Vec<(u64, String)>>,
    limits: Mutex<Vec<FrameLimits>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handshakes attempted so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Make the next `count` handshakes fail.
    pub fn fail_next(&self, count: usize) {
        self.state.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Delay every following handshake.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.state.connect_delay.lock().unwrap() = delay;
    }

    #[must_use]
    pub fn handle(&self, generation: u64) -> FakeHandle {
        self.state.handles.lock().unwrap()[&generation].clone()
    }

    #[must_use]
    pub fn delivered(&self) -> Vec<(u64, String)> {
        self.state.delivered.lock().unwrap().clone()
    }

    #[must_use]
    pub fn limits(&self) -> Vec<FrameLimits> {
        self.state.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Handle = FakeHandle;

    async fn connect(
        &self,
        _address: &Url,
        limits: FrameLimits,
        events: TransportEvents,
    ) -> Result<FakeHandle, WsError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        self.state.limits.lock().unwrap().push(limits);

        let delay = *self.state.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .state
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WsError::transport(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "handshake refused",
            )));
        }

        let handle = FakeHandle {
            generation: events.generation(),
            open: Arc::new(AtomicBool::new(true)),
            events,
            state: Arc::clone(&self.state),
        };
        self.state
            .handles
            .lock()
            .unwrap()
            .insert(handle.generation, handle.clone());

        Ok(handle)
    }
}

#[derive(Clone)]
pub struct FakeHandle {
    generation: u64,
    open: Arc<AtomicBool>,
    events: TransportEvents,
    state: Arc<FakeState>,
}

impl FakeHandle {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Simulate an inbound text frame.
    pub fn push_frame(&self, text: &str) {
        self.events.frame(text.to_owned());
    }

    /// Simulate the remote peer closing the connection.
    pub fn remote_close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.events.closed(CloseReason::new(code, reason));
        }
    }
}

impl TransportHandle for FakeHandle {
    fn send_text(&self, frame: String) -> BoxFuture<'static, Result<(), WsError>> {
        let result = if self.is_open() {
            self.state
                .delivered
                .lock()
                .unwrap()
                .push((self.generation, frame));
            Ok(())
        } else {
            Err(TransportFailure::closed().into())
        };
        Box::pin(async move { result })
    }

    fn close(&self) -> BoxFuture<'static, Result<(), WsError>> {
        let result = if self.open.swap(false, Ordering::SeqCst) {
            self.events.closed(CloseReason::new(1000, ""));
            Ok(())
        } else {
            Err(TransportFailure::closed().into())
        };
        Box::pin(async move { result })
    }
}
