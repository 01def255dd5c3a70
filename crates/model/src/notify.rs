use crate::ElementId;

/// Something in the [`crate::Model`] changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    BreakpointsChanged,
    CallStackChanged,
    /// `Some` when only one watch expression changed
    WatchExpressionsChanged(Option<ElementId>),
    ReplElementsChanged,
}

/// Fans every event out to all live subscribers
#[derive(Default)]
pub(crate) struct Notifier {
    subscribers: Vec<crossbeam_channel::Sender<ModelEvent>>,
}

impl Notifier {
    pub(crate) fn subscribe(&mut self) -> crossbeam_channel::Receiver<ModelEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn fire(&mut self, event: ModelEvent) {
        tracing::trace!(?event, subscribers = self.subscribers.len(), "notifying");
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_events() {
        let mut notifier = Notifier::default();
        let a = notifier.subscribe();
        let b = notifier.subscribe();

        notifier.fire(ModelEvent::CallStackChanged);
        assert_eq!(a.try_recv().unwrap(), ModelEvent::CallStackChanged);
        assert_eq!(b.try_recv().unwrap(), ModelEvent::CallStackChanged);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut notifier = Notifier::default();
        let a = notifier.subscribe();
        drop(notifier.subscribe());

        notifier.fire(ModelEvent::ReplElementsChanged);
        assert_eq!(notifier.subscribers.len(), 1);
        assert!(a.try_recv().is_ok());
    }
}
