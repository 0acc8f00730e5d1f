//! Fan-out of session events to observer code.
//!
//! Each [`Lane`] is drained by one worker task, so events of the same kind
//! reach observers in the order they were submitted while the submitting side
//! (usually a transport reader) only pays for a channel push.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queued jobs on one lane above which a saturation warning is logged.
pub const LANE_BACKLOG_WARNING: usize = 10_000;

/// Independent ordered queues of observer work.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Inbound frames
    Messages,
    /// Close notifications
    Disconnects,
}

impl Lane {
    const ALL: [Self; 2] = [Self::Messages, Self::Disconnects];

    const fn index(self) -> usize {
        match self {
            Self::Messages => 0,
            Self::Disconnects => 1,
        }
    }
}

/// Fixed pool of lane workers.
///
/// Lane queues are unbounded: submitting never waits and never drops an
/// event, so the transport reader is not held up by slow observers and every
/// frame is delivered. The cost is memory while a lane is backed up; the depth
/// is tracked per lane, exposed through [`backlog`](Self::backlog), and a
/// warning is logged each time it reaches [`LANE_BACKLOG_WARNING`].
///
/// Cloning is cheap; the workers stop once every clone is dropped and their
/// queues are drained.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    lanes: Arc<[LaneQueue]>,
}

#[derive(Debug)]
struct LaneQueue {
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Spawn one worker per lane on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let lanes = Lane::ALL
            .iter()
            .map(|&lane| {
                let (tx, rx) = mpsc::unbounded_channel();
                let depth = Arc::new(AtomicUsize::new(0));
                tokio::spawn(run_lane(lane, rx, Arc::clone(&depth)));
                LaneQueue { tx, depth }
            })
            .collect();

        Self { lanes }
    }

    /// Queue `job` on `lane` without waiting for it to run.
    ///
    /// Returns `false` if the lane worker is gone (runtime shutting down).
    pub fn submit<F>(&self, lane: Lane, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = &self.lanes[lane.index()];
        let depth = queue.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth == LANE_BACKLOG_WARNING {
            #[cfg(feature = "tracing")]
            tracing::warn!(?lane, depth, "Dispatch lane is backed up, observers are too slow");
        }

        if queue.tx.send(Box::new(job)).is_ok() {
            true
        } else {
            queue.depth.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }

    /// Jobs queued or running on `lane`.
    #[must_use]
    pub fn backlog(&self, lane: Lane) -> usize {
        self.lanes[lane.index()].depth.load(Ordering::Relaxed)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_lane(lane: Lane, mut rx: mpsc::UnboundedReceiver<Job>, depth: Arc<AtomicUsize>) {
    while let Some(job) = rx.recv().await {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(?lane, "Observer panicked while handling a session event");
        }
        depth.fetch_sub(1, Ordering::Relaxed);
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(?lane, "Dispatch lane stopped");
    #[cfg(not(feature = "tracing"))]
    let _ = lane;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn preserves_submission_order_within_lane() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            assert!(dispatcher.submit(Lane::Messages, move || seen.lock().unwrap().push(i)));
        }

        let (done_tx, done_rx) = oneshot::channel();
        dispatcher.submit(Lane::Messages, move || drop(done_tx.send(())));
        timeout(Duration::from_secs(1), done_rx).await.unwrap().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_lane() {
        let dispatcher = Dispatcher::new();

        dispatcher.submit(Lane::Disconnects, || panic!("observer failure"));

        let (done_tx, done_rx) = oneshot::channel();
        dispatcher.submit(Lane::Disconnects, move || drop(done_tx.send(())));

        assert!(
            timeout(Duration::from_secs(1), done_rx).await.is_ok(),
            "lane should keep running after a panic"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_lane_does_not_block_other_lane() {
        let dispatcher = Dispatcher::new();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // Parks the messages worker until released.
        dispatcher.submit(Lane::Messages, move || drop(release_rx.recv()));

        let (done_tx, done_rx) = oneshot::channel();
        dispatcher.submit(Lane::Disconnects, move || drop(done_tx.send(())));

        let result = timeout(Duration::from_secs(1), done_rx).await;
        release_tx.send(()).unwrap();
        assert!(result.is_ok(), "disconnect lane must not wait on message lane");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backlog_tracks_queued_jobs() {
        let dispatcher = Dispatcher::new();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel();

        dispatcher.submit(Lane::Messages, move || {
            drop(started_tx.send(()));
            drop(release_rx.recv());
        });
        timeout(Duration::from_secs(1), started_rx).await.unwrap().unwrap();

        for _ in 0..3 {
            dispatcher.submit(Lane::Messages, || {});
        }
        assert_eq!(dispatcher.backlog(Lane::Messages), 4);
        assert_eq!(dispatcher.backlog(Lane::Disconnects), 0);

        release_tx.send(()).unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        dispatcher.submit(Lane::Messages, move || drop(done_tx.send(())));
        timeout(Duration::from_secs(1), done_rx).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.backlog(Lane::Messages), 0);
    }
}
