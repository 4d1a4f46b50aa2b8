//! Inbound event queue: many producers, one consumer.
//!
//! Producers (network handlers, scripting, other game systems) hold cloned
//! [`EventSender`]s. The host system owns the single [`EventQueue`] and
//! drains it once per step, in arrival order, into the coordinator.

use std::collections::VecDeque;
use std::sync::Arc;

use ascent_core::events::ProgressionEvent;
use parking_lot::Mutex;
use tracing::warn;

/// An event as handed over by a producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Already decoded.
    Event(ProgressionEvent),
    /// Wire JSON, decoded by the coordinator when drained.
    Json(String),
}

struct QueueInner {
    pending: VecDeque<Inbound>,
    capacity: usize,
    total_enqueued: u64,
    total_refused: u64,
}

impl QueueInner {
    fn push(&mut self, item: Inbound) -> bool {
        if self.pending.len() >= self.capacity {
            self.total_refused += 1;
            warn!(capacity = self.capacity, "Event queue full; event refused");
            return false;
        }
        self.pending.push_back(item);
        self.total_enqueued += 1;
        true
    }
}

/// Queue depth and lifetime totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Events waiting.
    pub depth: usize,
    /// Events accepted since creation.
    pub total_enqueued: u64,
    /// Events refused because the queue was full.
    pub total_refused: u64,
}

/// Consumer side. Not `Clone`: exactly one owner drains it.
pub struct EventQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue").field("stats", &self.stats()).finish()
    }
}

impl EventQueue {
    /// Queue holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                pending: VecDeque::new(),
                capacity: capacity.max(1),
                total_enqueued: 0,
                total_refused: 0,
            })),
        }
    }

    /// A producer handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take up to `max` events in arrival order.
    pub fn drain(&self, max: usize) -> Vec<Inbound> {
        let mut inner = self.inner.lock();
        let n = max.min(inner.pending.len());
        inner.pending.drain(..n).collect()
    }

    /// Events waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Depth and totals.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            depth: inner.pending.len(),
            total_enqueued: inner.total_enqueued,
            total_refused: inner.total_refused,
        }
    }
}

/// Producer side; cheap to clone and `Send + Sync`.
#[derive(Clone)]
pub struct EventSender {
    inner: Arc<Mutex<QueueInner>>,
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender").finish_non_exhaustive()
    }
}

impl EventSender {
    /// Enqueue a decoded event. Returns `false` when the queue is full.
    pub fn send(&self, event: ProgressionEvent) -> bool {
        self.inner.lock().push(Inbound::Event(event))
    }

    /// Enqueue wire JSON. Returns `false` when the queue is full.
    pub fn send_json(&self, json: impl Into<String>) -> bool {
        self.inner.lock().push(Inbound::Json(json.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order() {
        let queue = EventQueue::new(8);
        let tx = queue.sender();
        assert!(tx.send(ProgressionEvent::skill_experience("a", 1.0)));
        assert!(tx.send_json("{}"));
        assert!(tx.send(ProgressionEvent::skill_experience("b", 2.0)));

        let drained = queue.drain(10);
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], Inbound::Event(ProgressionEvent::skill_experience("a", 1.0)));
        assert_eq!(drained[1], Inbound::Json("{}".to_string()));
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_respects_limit() {
        let queue = EventQueue::new(8);
        let tx = queue.sender();
        for _ in 0..5 {
            tx.send(ProgressionEvent::skill_experience("a", 1.0));
        }
        assert_eq!(queue.drain(2).len(), 2);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn full_queue_refuses() {
        let queue = EventQueue::new(2);
        let tx = queue.sender();
        assert!(tx.send_json("1"));
        assert!(tx.send_json("2"));
        assert!(!tx.send_json("3"));
        let stats = queue.stats();
        assert_eq!(stats.depth, 2);
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(stats.total_refused, 1);
    }

    #[test]
    fn producers_on_other_threads() {
        let queue = EventQueue::new(1_000);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tx = queue.sender();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tx.send(ProgressionEvent::skill_experience(format!("skill-{t}"), 1.0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("producer");
        }
        assert_eq!(queue.len(), 200);
        assert_eq!(queue.drain(usize::MAX).len(), 200);
    }
}
