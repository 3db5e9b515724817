//! Blocking access to the mixer's sync events
//!
//! Renewals, lapses, send failures and decode faults are produced on the
//! worker thread. [`SyncEventIterator`] hands them to plain threads, for
//! example to surface warnings in a monitor loop without any async code.

use std::iter;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use xair_stream::SyncEvent;

/// Blocking iterator over the mixer's [`SyncEvent`]s
///
/// Every iterator from [`MixerSync::events`](crate::MixerSync::events) reads
/// the same bounded queue, so each event is seen once overall. Iteration ends
/// when the worker shuts down.
pub struct SyncEventIterator {
    queue: Arc<Mutex<mpsc::Receiver<SyncEvent>>>,
}

impl SyncEventIterator {
    pub(crate) fn new(queue: Arc<Mutex<mpsc::Receiver<SyncEvent>>>) -> Self {
        Self { queue }
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SyncEvent> {
        self.queue.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Events already queued, without waiting
    pub fn try_iter(&self) -> impl Iterator<Item = SyncEvent> + '_ {
        iter::from_fn(move || self.queue.lock().ok()?.try_recv().ok())
    }

    /// Events as they arrive, until none shows up for `timeout`
    pub fn timeout_iter(&self, timeout: Duration) -> impl Iterator<Item = SyncEvent> + '_ {
        iter::from_fn(move || self.recv_timeout(timeout))
    }

    /// Queued warnings only: lapses, send failures and bad inbound messages
    pub fn warnings(&self) -> impl Iterator<Item = SyncEvent> + '_ {
        self.try_iter().filter(SyncEvent::is_warning)
    }
}

impl Iterator for SyncEventIterator {
    type Item = SyncEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.lock().ok()?.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use xair_protocol::ParameterPath;

    fn events() -> (mpsc::Sender<SyncEvent>, SyncEventIterator) {
        let (tx, rx) = mpsc::channel();
        (tx, SyncEventIterator::new(Arc::new(Mutex::new(rx))))
    }

    fn lapsed(channel: u8) -> SyncEvent {
        SyncEvent::SubscriptionLapsed {
            path: ParameterPath::channel_fader(channel).unwrap(),
            overdue: Duration::from_millis(500),
        }
    }

    fn torn_down(channel: u8) -> SyncEvent {
        SyncEvent::SubscriptionTornDown {
            path: ParameterPath::channel_fader(channel).unwrap(),
        }
    }

    #[test]
    fn test_recv_timeout_gives_up() {
        let (_tx, events) = events();
        let start = Instant::now();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_try_iter_drains_in_order() {
        let (tx, events) = events();
        for channel in 1..=3 {
            tx.send(torn_down(channel)).unwrap();
        }

        let paths: Vec<_> = events
            .try_iter()
            .filter_map(|event| event.path().copied())
            .collect();
        assert_eq!(
            paths,
            (1..=3)
                .map(|channel| ParameterPath::channel_fader(channel).unwrap())
                .collect::<Vec<_>>()
        );
        assert_eq!(events.try_iter().count(), 0);
    }

    #[test]
    fn test_warnings_skip_routine_events() {
        let (tx, events) = events();
        tx.send(torn_down(1)).unwrap();
        tx.send(lapsed(2)).unwrap();
        tx.send(torn_down(3)).unwrap();

        let warnings: Vec<_> = events.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], SyncEvent::SubscriptionLapsed { .. }));
    }

    #[test]
    fn test_iteration_ends_with_worker() {
        let (tx, mut events) = events();
        tx.send(lapsed(4)).unwrap();
        drop(tx);

        assert!(events.next().is_some());
        assert!(events.next().is_none());
    }
}
