//! Blocking consumption of store updates
//!
//! A [`ChangeIterator`] receives every update the store accepts, across all
//! paths, so a plain thread can follow the console without registering a
//! listener per parameter.

use std::sync::mpsc;
use std::time::Duration;

use crate::event::Update;

/// Every update accepted by the store after this iterator was created
///
/// Created by [`CurrentValueStore::watch_all`](crate::CurrentValueStore::watch_all).
/// Each iterator has its own queue. Liveness refreshes are delivered too;
/// check [`Update::changed`] to skip them. Iteration ends when the store is
/// dropped.
///
/// ```rust,ignore
/// for update in store.watch_all().filter(|u| u.changed) {
///     println!("{} = {:?}", update.path, update.value);
/// }
/// ```
pub struct ChangeIterator {
    rx: mpsc::Receiver<Update>,
}

impl ChangeIterator {
    pub(crate) fn new(rx: mpsc::Receiver<Update>) -> Self {
        Self { rx }
    }

    /// Wait up to `timeout` for the next update
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Update> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Updates already queued, without waiting
    pub fn try_iter(&self) -> mpsc::TryIter<'_, Update> {
        self.rx.try_iter()
    }
}

impl Iterator for ChangeIterator {
    type Item = Update;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}
