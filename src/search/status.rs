//! Status reporting for long-running fetches

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Progress and failure events emitted while fetching
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// A fetch started
    FetchStarted { index: String, expected_size: usize, cursor: bool },
    /// The backend throttled a call; it will be retried after `retry_after`
    Throttled { operation: String, attempt: u32, max_attempts: u32, retry_after: Duration },
    /// A cursor batch arrived
    BatchReceived { batch: usize, retrieved: usize },
    /// A fetch finished
    FetchCompleted { retrieved: usize, total_hits: u64 },
    /// A fetch failed; previous results stay in place
    FetchFailed { message: String },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::FetchStarted {
                index,
                expected_size,
                cursor,
            } => write!(
                f,
                "Fetching up to {} documents from {}{}",
                expected_size,
                index,
                if *cursor { " (cursor)" } else { "" }
            ),
            StatusEvent::Throttled {
                operation,
                attempt,
                max_attempts,
                retry_after,
            } => write!(
                f,
                "Rate limited on {} (attempt {}/{}), retrying in {:.1}s",
                operation,
                attempt,
                max_attempts,
                retry_after.as_secs_f64()
            ),
            StatusEvent::BatchReceived { batch, retrieved } => {
                write!(f, "Batch {} received, {} documents so far", batch, retrieved)
            }
            StatusEvent::FetchCompleted {
                retrieved,
                total_hits,
            } => write!(f, "Loaded {} documents ({} hits)", retrieved, total_hits),
            StatusEvent::FetchFailed { message } => write!(f, "Fetch failed: {}", message),
        }
    }
}

/// Receiver of status events
pub trait StatusSink: Send + Sync {
    fn report(&self, event: StatusEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, event: StatusEvent) {
        match &event {
            StatusEvent::Throttled { .. } => warn!(status = %event, "Search status"),
            StatusEvent::FetchFailed { .. } => error!(status = %event, "Search status"),
            _ => info!(status = %event, "Search status"),
        }
    }
}

/// Forwards events to a channel, typically drained by a UI loop
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelStatusSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelStatusSink {
    fn report(&self, event: StatusEvent) {
        // receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelStatusSink::new();
        sink.report(StatusEvent::FetchCompleted {
            retrieved: 3,
            total_hits: 10,
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.to_string(), "Loaded 3 documents (10 hits)");
    }

    #[test]
    fn test_throttle_message() {
        let event = StatusEvent::Throttled {
            operation: "search".to_string(),
            attempt: 2,
            max_attempts: 5,
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(
            event.to_string(),
            "Rate limited on search (attempt 2/5), retrying in 1.5s"
        );
    }
}
