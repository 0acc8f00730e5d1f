use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use url::Url;

use super::completion::Completion;
use super::config::{Config, ReconnectPolicy};
use super::dispatch::{Dispatcher, Lane};
use super::error::{TransportFailure, WsError};
use super::transport::{CloseReason, Closed, Connector, TransportEvents, TransportHandle as _};
use super::tungstenite::TungsteniteConnector;
use crate::Result;
use crate::error::Error;

type MessageObserver = dyn Fn(&str) + Send + Sync + 'static;
type ConnectObserver = dyn Fn() + Send + Sync + 'static;
type DisconnectObserver = dyn Fn(&CloseReason) + Send + Sync + 'static;
type ReconnectFailedObserver = dyn Fn(&CloseReason, &WsError) + Send + Sync + 'static;

pub(crate) type MessageObservers = Registry<MessageObserver>;

/// Handle returned when registering an observer, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Copy-on-write observer list.
///
/// Notification iterates a snapshot, so observers may add or remove
/// observers (including themselves) while being notified.
pub(crate) struct Registry<F: ?Sized> {
    entries: RwLock<Arc<Vec<(ObserverId, Arc<F>)>>>,
}

impl<F: ?Sized> Registry<F> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    fn add(&self, id: ObserverId, observer: Arc<F>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push((id, observer));
        *entries = Arc::new(next);
    }

    fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !entries.iter().any(|(entry, _)| *entry == id) {
            return false;
        }
        let next = entries
            .iter()
            .filter(|(entry, _)| *entry != id)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    /// Call `notify` with each observer in registration order.
    ///
    /// A panicking observer is logged and skipped.
    pub(crate) fn for_each<N: FnMut(&F)>(&self, mut notify: N) {
        let snapshot = Arc::clone(
            &self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (id, observer) in snapshot.iter() {
            if catch_unwind(AssertUnwindSafe(|| notify(&**observer))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!(?id, "Session observer panicked");
                #[cfg(not(feature = "tracing"))]
                let _ = id;
            }
        }
    }
}

struct Current<H> {
    generation: u64,
    handle: H,
}

/// What a close notification refers to.
enum Closing<H> {
    /// The current handle closed on its own. Carries the disconnect epoch
    /// observed when it was unpublished.
    Unrequested(Current<H>, u64),
    /// A handle the caller disconnected
    Requested,
    /// A handle that was replaced or never published
    Stale,
}

/// A persistent, auto-reconnecting connection to one gateway address.
///
/// The session owns at most one transport handle at a time. Every inbound text
/// frame is fanned out to message observers without blocking the transport
/// reader. When the transport closes on its own, disconnect observers run, the
/// [`ReconnectPolicy`] is consulted and, if it agrees, one new connect attempt
/// is made. Close notifications are processed one at a time, so a reconnect
/// attempt finishes before the next close is looked at.
///
/// Calling [`connect`](Self::connect) while connected replaces the current
/// handle: the new handle is published first, then the old one is closed and
/// its close notification ignored. A handle closed through
/// [`disconnect`](Self::disconnect) still notifies disconnect observers but
/// never triggers a reconnect.
///
/// # Example
///
/// ```rust, no_run
/// use gateway_ws::ws::{GatewaySession, config::Config};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let session = GatewaySession::new("wss://gateway.example.com/?v=10", Config::default())?;
///
///     session.on_message(|frame| println!("{frame}"));
///     session.on_disconnect(|close| println!("closed: {close}"));
///
///     session.connect().await?;
///     session.send(r#"{"op":1,"d":null}"#).await?;
///
///     Ok(())
/// }
/// ```
pub struct GatewaySession<C: Connector = TungsteniteConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for GatewaySession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C: Connector> {
    address: Url,
    config: Config,
    connector: C,
    reconnect_policy: RwLock<ReconnectPolicy>,
    current: Mutex<Option<Current<C::Handle>>>,
    /// Generations closed through `disconnect` whose notification is pending
    requested_closes: Mutex<HashSet<u64>>,
    /// Serializes handshakes
    connecting: tokio::sync::Mutex<()>,
    /// Bumped by every `disconnect`, under the `current` lock
    disconnect_epoch: AtomicU64,
    generation: AtomicU64,
    next_observer_id: AtomicU64,
    messages: Arc<MessageObservers>,
    connects: Registry<ConnectObserver>,
    disconnects: Arc<Registry<DisconnectObserver>>,
    reconnect_failures: Arc<Registry<ReconnectFailedObserver>>,
    dispatcher: Dispatcher,
    closed_tx: mpsc::UnboundedSender<Closed>,
}

impl GatewaySession {
    /// Create a session that connects with [`TungsteniteConnector`].
    ///
    /// No connection is made until [`connect`](Self::connect) is called.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_connector(endpoint, config, TungsteniteConnector::default())
    }
}

impl<C: Connector> GatewaySession<C> {
    /// Create a session that opens its transport handles with `connector`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn with_connector(endpoint: &str, config: Config, connector: C) -> Result<Self> {
        let address = Url::parse(endpoint)?;
        if !matches!(address.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "gateway endpoint must use ws or wss, got {}",
                address.scheme()
            )));
        }

        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let reconnect_policy = RwLock::new(config.reconnect_policy.clone());

        let inner = Arc::new(Inner {
            address,
            config,
            connector,
            reconnect_policy,
            current: Mutex::new(None),
            requested_closes: Mutex::new(HashSet::new()),
            connecting: tokio::sync::Mutex::new(()),
            disconnect_epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            next_observer_id: AtomicU64::new(0),
            messages: Arc::new(Registry::new()),
            connects: Registry::new(),
            disconnects: Arc::new(Registry::new()),
            reconnect_failures: Arc::new(Registry::new()),
            dispatcher: Dispatcher::new(),
            closed_tx,
        });

        tokio::spawn(close_loop(Arc::downgrade(&inner), closed_rx));

        Ok(Self { inner })
    }

    /// Open a new transport handle and publish it.
    ///
    /// On success the returned completion resolves first, then connect
    /// observers run in registration order.
    #[must_use = "the completion reports whether the handshake succeeded"]
    pub fn connect(&self) -> Completion<()> {
        let completion = Completion::new();
        let result = completion.clone();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            match inner.establish(None).await {
                Ok(_) => {
                    result.complete(());
                    inner.notify_connected();
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(address = %inner.address, error = %e, "Unable to connect");
                    result.fail(e);
                }
            }
        });

        completion
    }

    /// Like [`connect`](Self::connect), retrying failed handshakes with the
    /// exponential backoff from [`Config::retry`].
    ///
    /// Fails with the last handshake error once `max_attempts` is reached.
    #[must_use = "the completion reports whether a handshake eventually succeeded"]
    pub fn connect_with_retry(&self) -> Completion<()> {
        let completion = Completion::new();
        let result = completion.clone();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let max_attempts = inner.config.retry.max_attempts;
            let mut backoff: ExponentialBackoff = inner.config.retry.clone().into();
            let mut attempt = 0_u32;

            loop {
                let error = match inner.establish(None).await {
                    Ok(_) => {
                        result.complete(());
                        inner.notify_connected();
                        return;
                    }
                    Err(e) => e,
                };

                attempt = attempt.saturating_add(1);
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt, error = %error, "Unable to connect");

                if max_attempts.is_some_and(|max| attempt >= max) {
                    result.fail(error);
                    return;
                }

                match backoff.next_backoff() {
                    Some(duration) => sleep(duration).await,
                    None => {
                        result.fail(error);
                        return;
                    }
                }
            }
        });

        completion
    }

    /// Close the current handle.
    ///
    /// Sends fail with [`WsError::NotConnected`] from the moment this is
    /// called. Disconnect observers run once the transport reports the close;
    /// no reconnect follows. An automatic reconnect that is still handshaking
    /// is abandoned, even when no handle is current and the completion fails
    /// with [`WsError::NotConnected`].
    #[must_use = "the completion reports whether the handle closed cleanly"]
    pub fn disconnect(&self) -> Completion<()> {
        let (generation, close) = {
            let mut slot = self.inner.lock_current();
            self.inner.disconnect_epoch.fetch_add(1, Ordering::SeqCst);
            let Some(current) = slot.take() else {
                return Completion::failed(WsError::NotConnected);
            };
            self.inner.lock_requested().insert(current.generation);
            (current.generation, current.handle.close())
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(address = %self.inner.address, generation, "Disconnect requested");

        let completion = Completion::new();
        let result = completion.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = close.await;
            if let Err(e) = &outcome {
                inner.close_failed(generation, e);
            }
            result.settle(outcome);
        });

        completion
    }

    /// Write one text frame to the current handle.
    ///
    /// The handle is read once, under the lock that guards its replacement,
    /// so a frame is never written to a handle that has been superseded.
    /// Fails fast with [`WsError::NotConnected`] while no handle is current.
    #[must_use = "the completion reports whether the frame was written"]
    pub fn send<S: Into<String>>(&self, frame: S) -> Completion<()> {
        let write = {
            let slot = self.inner.lock_current();
            let Some(current) = slot.as_ref() else {
                return Completion::failed(WsError::NotConnected);
            };
            current.handle.send_text(frame.into())
        };

        let completion = Completion::new();
        let result = completion.clone();
        tokio::spawn(async move {
            result.settle(write.await);
        });

        completion
    }

    /// Replace the predicate consulted after the transport closes.
    pub fn set_reconnect_policy(&self, policy: ReconnectPolicy) {
        *self
            .inner
            .reconnect_policy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Observe every inbound text frame.
    pub fn on_message<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id();
        self.inner.messages.add(id, Arc::new(observer));
        id
    }

    pub fn remove_message_observer(&self, id: ObserverId) -> bool {
        self.inner.messages.remove(id)
    }

    /// Observe every successful connect, including automatic reconnects.
    pub fn on_connect<F>(&self, observer: F) -> ObserverId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id();
        self.inner.connects.add(id, Arc::new(observer));
        id
    }

    pub fn remove_connect_observer(&self, id: ObserverId) -> bool {
        self.inner.connects.remove(id)
    }

    /// Observe transport closures.
    pub fn on_disconnect<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id();
        self.inner.disconnects.add(id, Arc::new(observer));
        id
    }

    pub fn remove_disconnect_observer(&self, id: ObserverId) -> bool {
        self.inner.disconnects.remove(id)
    }

    /// Observe automatic reconnect attempts that failed, together with the
    /// close that triggered them.
    pub fn on_reconnect_failed<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&CloseReason, &WsError) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id();
        self.inner.reconnect_failures.add(id, Arc::new(observer));
        id
    }

    pub fn remove_reconnect_failed_observer(&self, id: ObserverId) -> bool {
        self.inner.reconnect_failures.remove(id)
    }

    /// Whether a transport handle is currently published.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock_current().is_some()
    }

    /// Generation of the current handle. Each connect attempt gets a new one.
    #[must_use]
    pub fn current_generation(&self) -> Option<u64> {
        self.inner
            .lock_current()
            .as_ref()
            .map(|current| current.generation)
    }

    #[must_use]
    pub fn address(&self) -> &Url {
        &self.inner.address
    }
}

impl<C: Connector> fmt::Debug for GatewaySession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySession")
            .field("address", &self.inner.address.as_str())
            .field("generation", &self.current_generation())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Inner<C> {
    /// Handshake and publish a new handle. Only one handshake runs at a time.
    ///
    /// With `epoch` set, the handle is only published if no `disconnect` has
    /// happened since that epoch was read; otherwise it is closed and
    /// `Ok(false)` returned.
    async fn establish(&self, epoch: Option<u64>) -> std::result::Result<bool, WsError> {
        let _connecting = self.connecting.lock().await;

        // Resolved per attempt: available memory may have changed.
        let limits = self.config.memory_budget.frame_limits();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let events = TransportEvents::new(
            generation,
            self.dispatcher.clone(),
            Arc::clone(&self.messages),
            self.closed_tx.clone(),
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(
            address = %self.address,
            generation,
            max_message_size = limits.max_message_size,
            "Connecting"
        );

        let handle = match timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.address, limits, events),
        )
        .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => {
                return Err(TransportFailure::timeout(self.config.connect_timeout).into());
            }
        };

        let previous = {
            let mut slot = self.lock_current();
            if epoch.is_some_and(|since| since != self.disconnect_epoch.load(Ordering::SeqCst)) {
                // Never published, so its close notification is stale.
                drop(handle.close());

                #[cfg(feature = "tracing")]
                tracing::debug!(generation, "Disconnect requested during reconnect, dropping handle");
                return Ok(false);
            }
            slot.replace(Current { generation, handle })
        };

        if let Some(previous) = previous {
            // Its close notification no longer matches and is ignored.
            drop(previous.handle.close());
        }

        #[cfg(feature = "tracing")]
        tracing::info!(address = %self.address, generation, "Connected");

        Ok(true)
    }

    async fn handle_close(&self, closed: Closed) {
        let Closed { generation, reason } = closed;

        // Let an in-flight handshake publish its handle before classifying.
        drop(self.connecting.lock().await);

        let closing = {
            let mut slot = self.lock_current();
            if slot
                .as_ref()
                .is_some_and(|current| current.generation == generation)
            {
                let epoch = self.disconnect_epoch.load(Ordering::SeqCst);
                slot.take()
                    .map_or(Closing::Stale, |current| Closing::Unrequested(current, epoch))
            } else if self.lock_requested().remove(&generation) {
                Closing::Requested
            } else {
                Closing::Stale
            }
        };

        match closing {
            Closing::Stale => {
                #[cfg(feature = "tracing")]
                tracing::debug!(generation, close = %reason, "Ignoring close of superseded handle");
            }
            Closing::Requested => {
                #[cfg(feature = "tracing")]
                tracing::info!(generation, close = %reason, "Disconnected");
                self.notify_disconnected(reason);
            }
            Closing::Unrequested(current, epoch) => {
                // The handle may already be closed; errors are not actionable.
                drop(current.handle.close());

                #[cfg(feature = "tracing")]
                tracing::info!(generation, close = %reason, "Connection closed");

                self.notify_disconnected(reason.clone());

                if !self.should_reconnect(&reason) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(close = %reason, "Reconnect policy declined");
                    return;
                }

                match self.establish(Some(epoch)).await {
                    Ok(true) => self.notify_connected(),
                    Ok(false) => {}
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(close = %reason, error = %e, "Reconnect failed");
                        self.notify_reconnect_failed(reason, e);
                    }
                }
            }
        }
    }

    /// A requested close failed, so the handle may never report it. Whichever
    /// of this and `handle_close` removes the pending entry notifies.
    fn close_failed(&self, generation: u64, error: &WsError) {
        if !self.lock_requested().remove(&generation) {
            return;
        }

        let reason = match error {
            WsError::RemoteDisconnect(close) => close.clone(),
            _ => CloseReason::abnormal(),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(generation, close = %reason, error = %error, "Close failed, handle already gone");

        self.notify_disconnected(reason);
    }

    fn should_reconnect(&self, reason: &CloseReason) -> bool {
        let policy = self
            .reconnect_policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        catch_unwind(AssertUnwindSafe(|| policy.should_reconnect(reason))).unwrap_or_else(|_| {
            #[cfg(feature = "tracing")]
            tracing::error!("Reconnect policy panicked, not reconnecting");
            false
        })
    }

    fn notify_connected(&self) {
        self.connects.for_each(|observer| observer());
    }

    fn notify_disconnected(&self, reason: CloseReason) {
        let observers = Arc::clone(&self.disconnects);
        self.dispatcher.submit(Lane::Disconnects, move || {
            observers.for_each(|observer| observer(&reason));
        });
    }

    fn notify_reconnect_failed(&self, reason: CloseReason, error: WsError) {
        let observers = Arc::clone(&self.reconnect_failures);
        self.dispatcher.submit(Lane::Disconnects, move || {
            observers.for_each(|observer| observer(&reason, &error));
        });
    }

    fn next_observer_id(&self) -> ObserverId {
        ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Current<C::Handle>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_requested(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.requested_closes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connector> Drop for Inner<C> {
    fn drop(&mut self) {
        let current = self
            .current
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(current) = current {
            drop(current.handle.close());
        }
    }
}

/// Processes close notifications one at a time for as long as the session lives.
async fn close_loop<C: Connector>(
    session: Weak<Inner<C>>,
    mut closed_rx: mpsc::UnboundedReceiver<Closed>,
) {
    while let Some(closed) = closed_rx.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        inner.handle_close(closed).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::BoxFuture;

    use super::*;
    use crate::ws::transport::{FrameLimits, TransportHandle};

    /// Handles whose transport is already gone: every request fails and no
    /// close is ever reported.
    struct SeveredConnector;

    struct SeveredHandle;

    impl TransportHandle for SeveredHandle {
        fn send_text(&self, _frame: String) -> BoxFuture<'static, std::result::Result<(), WsError>> {
            Box::pin(async { Err(TransportFailure::closed().into()) })
        }

        fn close(&self) -> BoxFuture<'static, std::result::Result<(), WsError>> {
            Box::pin(async { Err(TransportFailure::closed().into()) })
        }
    }

    #[async_trait]
    impl Connector for SeveredConnector {
        type Handle = SeveredHandle;

        async fn connect(
            &self,
            _address: &Url,
            _limits: FrameLimits,
            _events: TransportEvents,
        ) -> std::result::Result<SeveredHandle, WsError> {
            Ok(SeveredHandle)
        }
    }

    #[test]
    fn registry_removal_during_notification_is_safe() {
        let registry: Arc<Registry<dyn Fn() + Send + Sync>> = Arc::new(Registry::new());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = ObserverId(0);
        let second = ObserverId(1);

        let inner_registry = Arc::clone(&registry);
        let first_calls = Arc::clone(&calls);
        registry.add(
            first,
            Arc::new(move || {
                first_calls.lock().unwrap().push("first");
                inner_registry.remove(first);
            }),
        );
        let second_calls = Arc::clone(&calls);
        registry.add(
            second,
            Arc::new(move || second_calls.lock().unwrap().push("second")),
        );

        registry.for_each(|observer| observer());
        registry.for_each(|observer| observer());

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "second"]);
        assert!(!registry.remove(first));
        assert!(registry.remove(second));
    }

    #[test]
    fn panicking_observer_does_not_skip_the_rest() {
        let registry: Registry<dyn Fn() + Send + Sync> = Registry::new();
        let calls = Arc::new(Mutex::new(0));

        registry.add(ObserverId(0), Arc::new(|| panic!("observer failure")));
        let counter = Arc::clone(&calls);
        registry.add(
            ObserverId(1),
            Arc::new(move || *counter.lock().unwrap() += 1),
        );

        registry.for_each(|observer| observer());

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_non_websocket_scheme() {
        let error =
            GatewaySession::new("https://gateway.example.com", Config::default()).unwrap_err();

        assert_eq!(error.kind(), crate::error::Kind::Validation);
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let session = GatewaySession::new("wss://gateway.example.com", Config::default()).unwrap();

        let error = session.send("hello").await.unwrap_err();

        assert!(matches!(error.as_ws(), Some(WsError::NotConnected)));
        assert!(!session.is_connected());
        assert!(matches!(
            session.disconnect().outcome(),
            Some(Err(WsError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn failed_close_is_not_left_pending() {
        let session =
            GatewaySession::with_connector("ws://gateway.test", Config::default(), SeveredConnector)
                .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.on_disconnect(move |close| drop(tx.send(close.clone())));

        session.connect().await.unwrap();
        let error = session.disconnect().await.unwrap_err();

        assert!(matches!(error.as_ws(), Some(WsError::Transport(_))));
        assert!(session.inner.lock_requested().is_empty());

        let close = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(close, Some(CloseReason::abnormal()));
        assert!(
            timeout(Duration::from_millis(50), rx.recv()).await.is_err(),
            "disconnect observers run once"
        );
    }
}
