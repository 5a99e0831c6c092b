use crate::canvas::geometry::Rect;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Signals exchanged between the engine, its scheduler and the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasEvent {
    /// Redraw a document rectangle, or the whole view when `None`.
    ForceRedraw(Option<Rect>),
    /// Toggle raw drawing off and on so the panel repaints.
    RefreshRequested,
    /// Raw drawing enabled (`true`) or suspended (`false`).
    DrawingStateChanged(bool),
    /// Reopen the stylus surface after a layout or toolbar change.
    RestartAfterConfigChange,
    /// Commit pending history now instead of waiting for the debounce.
    CommitHistoryNow,
    /// Select everything inside a document rectangle.
    SelectRectangle(Rect),
    /// Stop the scheduler thread.
    Shutdown,
}

/// Fan-out bus; every subscriber receives every event published after it
/// subscribed. Receivers that were dropped are pruned on the next publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<CanvasEvent>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<CanvasEvent> {
        let (tx, rx) = channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: CanvasEvent) {
        tracing::trace!(?event, "canvas event");
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<CanvasEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_events_in_order() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(CanvasEvent::RefreshRequested);
        bus.publish(CanvasEvent::DrawingStateChanged(false));

        for rx in [a, b] {
            let events: Vec<_> = rx.try_iter().collect();
            assert_eq!(
                events,
                vec![
                    CanvasEvent::RefreshRequested,
                    CanvasEvent::DrawingStateChanged(false)
                ]
            );
        }
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::new();
        bus.publish(CanvasEvent::ForceRedraw(None));
        let rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        drop(bus.subscribe());
        let _live = bus.subscribe();
        bus.publish(CanvasEvent::RefreshRequested);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
