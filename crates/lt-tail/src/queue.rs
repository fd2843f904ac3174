//! Per-source bounded work queues.
//!
//! The registry maps each [`SourceId`] to the sending half of a bounded
//! channel whose receiving half is owned by exactly one worker task. Entries
//! are created on the first signal for a source and live until [`close`].
//!
//! Enqueueing never blocks: a full queue drops the new signal with a warning.
//! Signals carry no data, so the next write to the file re-triggers detection
//! of everything the dropped signal would have.
//!
//! A worker that exited while the registry is open is replaced on the next
//! signal for its source.
//!
//! [`close`]: SourceQueues::close

use lt_core::{FxHashMap, SourceId};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::ChangeSignal;

/// What happened to an enqueued signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// First signal for the source: a queue and worker were created.
    Spawned,
    /// Queued behind the source's existing worker.
    Queued,
    /// The source's queue was full; the signal was discarded.
    Dropped,
    /// The registry is closed; the signal was discarded.
    Closed,
}

#[derive(Debug, Default)]
struct Registry {
    senders: FxHashMap<SourceId, mpsc::Sender<ChangeSignal>>,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Lazily created queue-plus-worker pairs, one per source.
#[derive(Debug)]
pub struct SourceQueues {
    capacity: usize,
    registry: Mutex<Registry>,
}

impl SourceQueues {
    /// Creates an empty registry whose queues hold up to `capacity` signals.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Enqueues `signal` on its source's queue.
    ///
    /// If the source has no queue yet, or its worker has exited, a queue is
    /// created and `spawn_worker` is called with the receiving half; it must
    /// spawn the task that drains it.
    pub fn enqueue<F>(&self, mut signal: ChangeSignal, spawn_worker: F) -> EnqueueOutcome
    where
        F: FnOnce(mpsc::Receiver<ChangeSignal>) -> JoinHandle<()>,
    {
        let mut registry = self.registry.lock();
        if registry.closed {
            return EnqueueOutcome::Closed;
        }

        if let Some(tx) = registry.senders.get(&signal.source_id) {
            match tx.try_send(signal) {
                Ok(()) => return EnqueueOutcome::Queued,
                Err(TrySendError::Full(dropped)) => {
                    warn!(
                        source = %dropped.source_id,
                        capacity = self.capacity,
                        "Source queue full, dropping change signal"
                    );
                    return EnqueueOutcome::Dropped;
                }
                Err(TrySendError::Closed(returned)) => {
                    warn!(source = %returned.source_id, "Source worker exited, respawning");
                    registry.senders.remove(&returned.source_id);
                    signal = returned;
                }
            }
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let source = signal.source_id.clone();
        if tx.try_send(signal).is_err() {
            return EnqueueOutcome::Dropped;
        }
        registry.workers.push(spawn_worker(rx));
        registry.senders.insert(source.clone(), tx);
        debug!(source = %source, "Created source queue");
        EnqueueOutcome::Spawned
    }

    /// Returns `true` if `source` has a queue.
    #[must_use]
    pub fn contains(&self, source: &SourceId) -> bool {
        self.registry.lock().senders.contains_key(source)
    }

    /// Number of sources with a queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().senders.len()
    }

    /// Returns `true` if no queue has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.lock().senders.is_empty()
    }

    /// Closes every queue and returns the worker handles for joining.
    ///
    /// Dropping the senders wakes workers blocked on an empty queue. Later
    /// enqueues return [`EnqueueOutcome::Closed`].
    pub fn close(&self) -> Vec<JoinHandle<()>> {
        let mut registry = self.registry.lock();
        registry.closed = true;
        registry.senders.clear();
        std::mem::take(&mut registry.workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signal(source: &str) -> ChangeSignal {
        ChangeSignal::changed(SourceId::new(source), Utf8PathBuf::from(format!("{source}.log")))
    }

    #[tokio::test]
    async fn test_one_worker_per_source() {
        let queues = SourceQueues::new(8);
        let spawned = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));

        for source in ["alpha", "alpha", "bravo", "alpha"] {
            let spawned = Arc::clone(&spawned);
            let received = Arc::clone(&received);
            queues.enqueue(signal(source), move |mut rx| {
                spawned.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    while rx.recv().await.is_some() {
                        received.fetch_add(1, Ordering::SeqCst);
                    }
                })
            });
        }

        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        assert_eq!(queues.len(), 2);
        assert!(queues.contains(&SourceId::new("bravo")));

        for handle in queues.close() {
            handle.await.unwrap();
        }
        assert_eq!(received.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let queues = SourceQueues::new(1);
        // Worker that never drains, so the queue stays full.
        let parked = |rx: mpsc::Receiver<ChangeSignal>| {
            tokio::spawn(async move {
                let _rx = rx;
                std::future::pending::<()>().await;
            })
        };

        assert_eq!(queues.enqueue(signal("alpha"), parked), EnqueueOutcome::Spawned);
        assert_eq!(queues.enqueue(signal("alpha"), parked), EnqueueOutcome::Dropped);

        for handle in queues.close() {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_exited_worker_is_replaced() {
        let queues = SourceQueues::new(4);
        let spawned = Arc::new(AtomicUsize::new(0));
        // Worker that handles one signal and exits.
        let one_shot = |spawned: Arc<AtomicUsize>| {
            move |mut rx: mpsc::Receiver<ChangeSignal>| {
                spawned.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    rx.recv().await;
                })
            }
        };

        let first = queues.enqueue(signal("alpha"), one_shot(Arc::clone(&spawned)));
        assert_eq!(first, EnqueueOutcome::Spawned);
        while !queues.registry.lock().workers.iter().all(JoinHandle::is_finished) {
            tokio::task::yield_now().await;
        }

        let second = queues.enqueue(signal("alpha"), one_shot(Arc::clone(&spawned)));
        assert_eq!(second, EnqueueOutcome::Spawned);
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        assert_eq!(queues.len(), 1);

        for handle in queues.close() {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_enqueue_after_close() {
        let queues = SourceQueues::new(4);
        assert!(queues.close().is_empty());

        let outcome = queues.enqueue(signal("alpha"), |_rx| tokio::spawn(async {}));
        assert_eq!(outcome, EnqueueOutcome::Closed);
        assert!(queues.is_empty());
    }
}
