//! `MessageRegistry` (§4.7): the `EventBuffer` that holds events with no
//! current subscriber for a grace window, and the `DeadLetterQueue` they
//! fall into once that window expires.
//!
//! Both queues are bounded by a per-entry byte cap and a per-queue byte
//! cap, oldest-entry-first eviction once the queue cap is hit — the same
//! bounded-queue shape the mailbox layer uses for backpressure, applied
//! here to unmatched cluster traffic instead of per-agent messages.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use agentmesh_wire::EventEnvelope;
use parking_lot::Mutex;

struct Entry {
    event: EventEnvelope,
    expires_at: Instant,
    bytes: usize,
}

struct DeadEntry {
    event: EventEnvelope,
    bytes: usize,
}

fn entry_size(event: &EventEnvelope) -> usize {
    event.payload.len()
        + event.id.len()
        + event.source.len()
        + event
            .attributes
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
}

/// Holds events published to a topic no currently-connected worker
/// subscribes to, and the dead-letter queue they graduate into.
pub struct MessageRegistry {
    hold_time: Duration,
    max_entry_bytes: usize,
    max_queue_bytes: usize,
    buffer: Mutex<(VecDeque<Entry>, usize)>,
    dlq: Mutex<(VecDeque<DeadEntry>, usize)>,
}

impl MessageRegistry {
    pub fn new(hold_time: Duration, max_entry_bytes: usize, max_queue_bytes: usize) -> Self {
        Self {
            hold_time,
            max_entry_bytes,
            max_queue_bytes,
            buffer: Mutex::new((VecDeque::new(), 0)),
            dlq: Mutex::new((VecDeque::new(), 0)),
        }
    }

    /// Buffers an event with no matching subscriber, dropping it outright
    /// if it exceeds `max_entry_bytes` — there is no smaller form to keep.
    pub fn buffer_unmatched(&self, event: EventEnvelope) -> bool {
        let bytes = entry_size(&event);
        if bytes > self.max_entry_bytes {
            return false;
        }
        let mut guard = self.buffer.lock();
        evict_to_fit(&mut guard.0, &mut guard.1, bytes, self.max_queue_bytes, |e| e.bytes);
        guard.0.push_back(Entry {
            event,
            expires_at: Instant::now() + self.hold_time,
            bytes,
        });
        guard.1 += bytes;
        true
    }

    /// Moves every buffered entry past its hold time into the dead-letter
    /// queue, returning the events that were dead-lettered this sweep.
    pub fn sweep_expired(&self) -> Vec<EventEnvelope> {
        let now = Instant::now();
        let expired: Vec<Entry> = {
            let mut guard = self.buffer.lock();
            let mut expired = Vec::new();
            loop {
                let past_hold_time = matches!(guard.0.front(), Some(entry) if entry.expires_at <= now);
                if !past_hold_time {
                    break;
                }
                if let Some(entry) = guard.0.pop_front() {
                    guard.1 -= entry.bytes;
                    expired.push(entry);
                }
            }
            expired
        };

        let mut dead_events = Vec::with_capacity(expired.len());
        let mut dlq = self.dlq.lock();
        for entry in expired {
            evict_to_fit(&mut dlq.0, &mut dlq.1, entry.bytes, self.max_queue_bytes, |e| e.bytes);
            dlq.0.push_back(DeadEntry {
                event: entry.event.clone(),
                bytes: entry.bytes,
            });
            dlq.1 += entry.bytes;
            dead_events.push(entry.event);
        }
        dead_events
    }

    /// Removes and returns buffered events whose topic type now matches a
    /// freshly-added subscription, so they can be redelivered immediately
    /// instead of waiting out the hold time.
    pub fn take_matching(&self, matches: impl Fn(&str) -> bool) -> Vec<EventEnvelope> {
        let mut guard = self.buffer.lock();
        let (queue, total) = &mut *guard;
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());
        for entry in queue.drain(..) {
            if matches(entry.event.topic.topic_type()) {
                *total -= entry.bytes;
                taken.push(entry.event);
            } else {
                kept.push_back(entry);
            }
        }
        *queue = kept;
        taken
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().0.len()
    }

    pub fn dlq_len(&self) -> usize {
        self.dlq.lock().0.len()
    }
}

/// Evicts oldest entries from `queue` until `incoming_bytes` more would fit
/// under `cap`, matching the mailbox layer's bounded-queue shape.
fn evict_to_fit<T>(queue: &mut VecDeque<T>, total: &mut usize, incoming_bytes: usize, cap: usize, size_of: impl Fn(&T) -> usize) {
    while *total + incoming_bytes > cap {
        match queue.pop_front() {
            Some(evicted) => *total -= size_of(&evicted),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event(id: &str, topic_type: &str, payload_len: usize) -> EventEnvelope {
        EventEnvelope {
            id: id.to_string(),
            topic: agentmesh_wire::TopicId::with_default_source(topic_type).unwrap(),
            source: "worker/agent".to_string(),
            payload: vec![0u8; payload_len],
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let registry = MessageRegistry::new(Duration::from_secs(5), 10, 100);
        assert!(!registry.buffer_unmatched(event("e1", "news", 20)));
        assert_eq!(registry.buffer_len(), 0);
    }

    #[test]
    fn queue_cap_evicts_oldest() {
        let registry = MessageRegistry::new(Duration::from_secs(5), 50, 50);
        assert!(registry.buffer_unmatched(event("e1", "news", 30)));
        assert!(registry.buffer_unmatched(event("e2", "news", 30)));
        assert_eq!(registry.buffer_len(), 1);
    }

    #[test]
    fn sweep_moves_expired_to_dlq() {
        let registry = MessageRegistry::new(Duration::from_millis(0), 50, 50);
        registry.buffer_unmatched(event("e1", "news", 10));
        std::thread::sleep(Duration::from_millis(5));
        let dead = registry.sweep_expired();
        assert_eq!(dead.len(), 1);
        assert_eq!(registry.buffer_len(), 0);
        assert_eq!(registry.dlq_len(), 1);
    }

    #[test]
    fn take_matching_redelivers_without_waiting_for_hold_time() {
        let registry = MessageRegistry::new(Duration::from_secs(60), 50, 200);
        registry.buffer_unmatched(event("e1", "news.sports", 5));
        registry.buffer_unmatched(event("e2", "weather", 5));

        let matched = registry.take_matching(|t| t.starts_with("news."));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "e1");
        assert_eq!(registry.buffer_len(), 1);
    }
}
