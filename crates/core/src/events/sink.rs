use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
};

use tokio::sync::mpsc;

use crate::{cancel::CancelToken, events::AnalysisEvent};

/// Outbound side of an analysis run's event stream.
///
/// Progress never goes backwards. Once the run's token is cancelled only a
/// `Cancelled` event gets through, so a replaced run cannot leak late results.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<EventSinkInner>,
}

struct EventSinkInner {
    tx: Option<mpsc::UnboundedSender<AnalysisEvent>>,
    cancel: CancelToken,
    last_progress: AtomicU8,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventSink {
    pub fn channel(cancel: CancelToken) -> (Self, mpsc::UnboundedReceiver<AnalysisEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::build(Some(tx), cancel), rx)
    }

    /// A sink nobody listens to.
    pub fn detached(cancel: CancelToken) -> Self {
        Self::build(None, cancel)
    }

    fn build(tx: Option<mpsc::UnboundedSender<AnalysisEvent>>, cancel: CancelToken) -> Self {
        Self {
            inner: Arc::new(EventSinkInner {
                tx,
                cancel,
                last_progress: AtomicU8::new(0),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Returns whether the event was delivered.
    pub fn publish(&self, event: AnalysisEvent) -> bool {
        if self.inner.cancel.is_cancelled() && !matches!(event, AnalysisEvent::Cancelled { .. }) {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let event = match event {
            AnalysisEvent::Progress {
                progress,
                message,
                moments_found,
            } => {
                let progress = progress.min(100);
                let previous = self.inner.last_progress.fetch_max(progress, Ordering::Relaxed);
                AnalysisEvent::Progress {
                    progress: previous.max(progress),
                    message,
                    moments_found,
                }
            }
            other => other,
        };

        let Some(tx) = &self.inner.tx else {
            return false;
        };
        if tx.send(event).is_err() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn progress(&self, progress: u8, message: impl Into<String>, moments_found: usize) -> bool {
        self.publish(AnalysisEvent::Progress {
            progress,
            message: message.into(),
            moments_found,
        })
    }

    pub fn last_progress(&self) -> u8 {
        self.inner.last_progress.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.inner.tx.is_some())
            .field("last_progress", &self.last_progress())
            .field("published", &self.published())
            .field("dropped", &self.dropped())
            .finish()
    }
}
