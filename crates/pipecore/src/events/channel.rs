use crate::ExecutionEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create an event queue.
///
/// The runner (and the nodes it drives) produce through clones of the
/// sender; a single transport adapter consumes through the receiver.
/// Lifecycle events are always queued so a run never stalls on a slow or
/// absent consumer. `progress_capacity` bounds how many events may be
/// pending before progress reports start being dropped.
pub fn event_channel(progress_capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        EventSender {
            tx,
            pending: pending.clone(),
            progress_capacity: progress_capacity.max(1),
        },
        EventReceiver { rx, pending },
    )
}

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
    pending: Arc<AtomicUsize>,
    progress_capacity: usize,
}

impl EventSender {
    /// Queue a lifecycle event. A closed queue is not an error.
    pub fn post(&self, event: ExecutionEvent) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("event receiver dropped, discarding event");
        }
    }

    /// Queue a best-effort event; dropped with a warning once the backlog
    /// reaches the progress capacity.
    pub fn try_post(&self, event: ExecutionEvent) {
        let backlog = self.pending.fetch_add(1, Ordering::SeqCst);
        if backlog >= self.progress_capacity {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("event queue full, dropping event");
            return;
        }
        if self.tx.send(event).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!("event receiver dropped, discarding event");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ExecutionEvent>,
    pending: Arc<AtomicUsize>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        event
    }

    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        let event = self.rx.try_recv().ok();
        if event.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        event
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(n: u64) -> ExecutionEvent {
        ExecutionEvent::NodeProgress {
            node_id: "n".to_string(),
            progress: n,
            total: 3,
        }
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, mut rx) = event_channel(8);
        tx.post(progress(1));
        tx.post(progress(2));
        assert!(rx.has_pending());
        assert_eq!(rx.recv().await, Some(progress(1)));
        assert_eq!(rx.try_recv(), Some(progress(2)));
        assert!(!rx.has_pending());
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn try_post_drops_when_full() {
        let (tx, mut rx) = event_channel(1);
        tx.try_post(progress(1));
        tx.try_post(progress(2));
        assert_eq!(rx.try_recv(), Some(progress(1)));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn post_never_waits_past_capacity() {
        let (tx, mut rx) = event_channel(2);
        for n in 0..10 {
            tx.post(progress(n));
        }
        // the backlog is over capacity, so progress is shed
        tx.try_post(progress(99));

        let mut seen = Vec::new();
        while let Some(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen, (0..10).map(progress).collect::<Vec<_>>());
        assert!(!rx.has_pending());
    }
}
