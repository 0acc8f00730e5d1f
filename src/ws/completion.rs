//! Single-assignment outcome of an asynchronous session operation.

use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::error::{TransportFailure, WsError};
use super::transport::CloseReason;
use crate::Result;

type SuccessObserver<T> = Box<dyn FnOnce(T) + Send + 'static>;
type FailureObserver = Box<dyn FnOnce(WsError) + Send + 'static>;

/// Either a success value or a [`WsError`], produced exactly once.
///
/// Every session operation returns one of these. Observers may be attached
/// before or after resolution; each runs exactly once, on a spawned task when
/// a tokio runtime is available, never inline in the resolving call.
///
/// Only the first call to [`complete`](Self::complete) or
/// [`fail`](Self::fail) has an effect. Later calls return `false` and leave
/// the stored outcome untouched.
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    resolved: watch::Sender<bool>,
}

struct State<T> {
    outcome: Option<std::result::Result<T, WsError>>,
    on_success: Vec<SuccessObserver<T>>,
    on_failure: Vec<FailureObserver>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Completion<T> {
    #[must_use]
    pub fn new() -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    outcome: None,
                    on_success: Vec::new(),
                    on_failure: Vec::new(),
                }),
                resolved,
            }),
        }
    }

    /// An already succeeded completion.
    #[must_use]
    pub fn succeeded(value: T) -> Self {
        let completion = Self::new();
        completion.complete(value);
        completion
    }

    /// An already failed completion.
    #[must_use]
    pub fn failed(error: WsError) -> Self {
        let completion = Self::new();
        completion.fail(error);
        completion
    }

    /// Resolve with a value. Returns `false` if already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with a failure. Returns `false` if already resolved.
    pub fn fail(&self, error: WsError) -> bool {
        self.resolve(Err(error))
    }

    /// Resolve from a `Result`.
    pub fn settle(&self, outcome: std::result::Result<T, WsError>) -> bool {
        self.resolve(outcome)
    }

    fn resolve(&self, outcome: std::result::Result<T, WsError>) -> bool {
        let (on_success, on_failure) = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut state.on_success),
                std::mem::take(&mut state.on_failure),
            )
        };

        match outcome {
            Ok(value) if !on_success.is_empty() => run_detached(move || {
                for observer in on_success {
                    observer(value.clone());
                }
            }),
            Err(error) if !on_failure.is_empty() => run_detached(move || {
                for observer in on_failure {
                    observer(error.clone());
                }
            }),
            _ => {}
        }

        self.inner.resolved.send_replace(true);
        true
    }

    /// Observe the success value.
    pub fn on_success<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        let value = {
            let mut state = self.lock();
            match &state.outcome {
                None => {
                    state.on_success.push(Box::new(observer));
                    return self;
                }
                Some(Ok(value)) => value.clone(),
                Some(Err(_)) => return self,
            }
        };

        run_detached(move || observer(value));
        self
    }

    /// Observe any failure.
    pub fn on_failure<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(WsError) + Send + 'static,
    {
        let error = {
            let mut state = self.lock();
            match &state.outcome {
                None => {
                    state.on_failure.push(Box::new(observer));
                    return self;
                }
                Some(Err(error)) => error.clone(),
                Some(Ok(_)) => return self,
            }
        };

        run_detached(move || observer(error));
        self
    }

    /// Observe only [`WsError::Transport`] failures.
    pub fn on_transport_failure<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(TransportFailure) + Send + 'static,
    {
        self.on_failure(move |error| {
            if let WsError::Transport(failure) = error {
                observer(failure);
            }
        })
    }

    /// Observe only [`WsError::RemoteDisconnect`] failures.
    pub fn on_remote_disconnect<F>(&self, observer: F) -> &Self
    where
        F: FnOnce(CloseReason) + Send + 'static,
    {
        self.on_failure(move |error| {
            if let WsError::RemoteDisconnect(close) = error {
                observer(close);
            }
        })
    }

    /// Observe only [`WsError::NotConnected`] failures.
    pub fn on_not_connected<F>(&self, observer: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_failure(move |error| {
            if error.is_not_connected() {
                observer();
            }
        })
    }

    /// The outcome, if resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<std::result::Result<T, WsError>> {
        self.lock().outcome.clone()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        *self.inner.resolved.borrow()
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> Result<T> {
        let mut resolved = self.inner.resolved.subscribe();
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome.map_err(Into::into);
            }
            // `self` owns the sender, so this only returns on a change.
            _ = resolved.changed().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Completion<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl<T: fmt::Debug> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Completion")
            .field("outcome", &state.outcome)
            .finish_non_exhaustive()
    }
}

/// Run observer code off the caller's stack.
fn run_detached<F: FnOnce() + Send + 'static>(f: F) {
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { f() });
        }
        Err(_) => f(),
    }
}
