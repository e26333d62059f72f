//! Background worker reading the daemon's push-event stream.
//!
//! State machine:
//!
//! ```text
//! Stopped -> Connecting -> Streaming -> Backoff -> Connecting ...
//!                 |             |           |
//!                 +-------------+-----------+--> Stopped (on cancel)
//! ```
//!
//! A failed connect, a read error, and a clean end of stream all lead to
//! `Backoff`. Cancellation is raced against every await point, so stopping
//! never waits for a network read or the backoff timer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderValue};
use signal_events::{Classifier, EventFramer, ReplayRegistry, StreamLine, split_lines};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::errors::StreamError;

/// Lifecycle state of the event-stream worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamState {
    /// No worker is running.
    #[default]
    Stopped,
    /// Opening the stream.
    Connecting,
    /// Reading events.
    Streaming,
    /// Waiting before the next connection attempt.
    Backoff,
}

impl StreamState {
    /// Label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration and collaborators of one worker.
pub struct EventStreamWorker {
    http: reqwest::Client,
    events_url: Url,
    classifier: Classifier,
    registry: Arc<ReplayRegistry>,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<StreamState>>,
    cancel: CancellationToken,
}

/// Handle to a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<StreamState>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Current worker state.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// A receiver observing state changes.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Cancel the worker and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "event stream worker did not exit cleanly");
        }
    }

    /// Cancel the worker without waiting.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

impl EventStreamWorker {
    /// Create a worker; nothing runs until [`spawn`](Self::spawn).
    pub fn new(
        http: reqwest::Client,
        events_url: Url,
        classifier: Classifier,
        registry: Arc<ReplayRegistry>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(StreamState::Stopped);
        Self {
            http,
            events_url,
            classifier,
            registry,
            reconnect_delay,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
        }
    }

    /// Publish state changes on a channel owned by the caller, so the state
    /// stays observable across worker restarts.
    #[must_use]
    pub fn with_state(mut self, state: Arc<watch::Sender<StreamState>>) -> Self {
        self.state = state;
        self
    }

    /// Start the worker on the current tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run());
        WorkerHandle {
            cancel,
            state,
            task,
        }
    }

    fn set_state(&self, state: StreamState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "event stream state");
        }
    }

    async fn run(self) {
        info!(url = %self.events_url, "event stream worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(StreamState::Connecting);

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                outcome = self.stream_once() => outcome,
            };
            match outcome {
                Ok(()) => info!("event stream closed by daemon"),
                Err(e) => warn!(error = %e, "event stream failed"),
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(StreamState::Backoff);
            debug!(delay = ?self.reconnect_delay, "reconnecting after delay");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        self.set_state(StreamState::Stopped);
        info!("event stream worker stopped");
    }

    /// One connection: open, read until end or error.
    async fn stream_once(&self) -> Result<(), StreamError> {
        let response = self
            .http
            .get(self.events_url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                status: status.as_u16(),
            });
        }

        self.set_state(StreamState::Streaming);
        info!(url = %self.events_url, "event stream connected");

        let mut lines = std::pin::pin!(split_lines(response.bytes_stream()));
        let mut framer = EventFramer::new();

        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(payload) = framer.feed(&line) else {
                if StreamLine::classify(&line) == StreamLine::KeepAlive {
                    trace!("keep-alive");
                }
                continue;
            };
            if let Some(message) = self.classifier.classify_line(payload).await.into_message() {
                let _ = self.registry.publish(message);
            }
        }
        Ok(())
    }
}
