// feed-server/src/feed.rs
//! Per-connection tick streaming.
//!
//! A [`FeedController`] belongs to one hub session and owns that session's
//! cancellation token. Starting the feed spawns a single loop that emits a
//! tick, then waits one interval; the wait races the cancellation token so a
//! closed connection stops the loop right away instead of after the sleep.

use common::Tick;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Destination for generated ticks
pub trait TickSink: 'static {
    /// Hand one tick to the connection. Returns false once the connection
    /// can no longer accept ticks.
    fn deliver(&self, tick: Tick) -> bool;
}

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStart {
    Started,
    /// A loop is already running for this session; nothing was spawned.
    AlreadyRunning,
    /// The session is already shutting down.
    Cancelled,
}

/// Per-session feed state: at most one loop at a time
#[derive(Debug)]
pub struct FeedController {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    interval: Duration,
    payload_length: usize,
}

impl FeedController {
    pub fn new(interval: Duration, payload_length: usize) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(IDLE)),
            cancel: CancellationToken::new(),
            interval,
            payload_length,
        }
    }

    /// Start streaming into `sink` unless a loop is already running.
    pub fn start<S: TickSink>(&self, sink: S) -> FeedStart {
        if self.cancel.is_cancelled() {
            return FeedStart::Cancelled;
        }
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FeedStart::AlreadyRunning;
        }

        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let interval = self.interval;
        let payload_length = self.payload_length;

        actix_web::rt::spawn(async move {
            let emitted = run_feed(sink, cancel, interval, payload_length).await;
            state.store(IDLE, Ordering::Release);
            tracing::debug!("Feed loop finished after {} ticks", emitted);
        });

        FeedStart::Started
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Signal the session's end. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Emit ticks into `sink` every `interval` until `cancel` fires or the sink
/// goes away. Returns the number of ticks delivered.
pub async fn run_feed<S: TickSink>(
    sink: S,
    cancel: CancellationToken,
    interval: Duration,
    payload_length: usize,
) -> u64 {
    let mut emitted = 0;

    while !cancel.is_cancelled() {
        if !sink.deliver(Tick::generate(payload_length)) {
            break;
        }
        emitted += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    emitted
}
