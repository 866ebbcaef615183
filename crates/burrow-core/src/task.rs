//! Per-peer timer queue.
//!
//! The daemon is single-threaded; the event loop asks [`TaskQueue`] for the
//! next deadline and feeds expired entries back into the context. Handshake
//! scheduling is idempotent per peer: a new schedule coalesces with a
//! pending one, keeping the earlier deadline. On peer reset every entry for
//! that peer is dropped.

use std::time::Instant;

/// Index of a peer in the context's peer table.
pub type PeerId = usize;

/// What a timer entry does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Start (or retry) a handshake with the peer
    Handshake,
    /// Send a zero-length keepalive to the peer
    Keepalive,
}

#[derive(Debug)]
struct TaskEntry {
    due: Instant,
    peer: PeerId,
    kind: TaskKind,
}

/// Ordered queue of per-peer timers.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: Vec<TaskEntry>,
}

impl TaskQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a handshake for `peer`, coalescing with any pending one
    /// (the earlier deadline wins).
    pub fn schedule_handshake(&mut self, peer: PeerId, due: Instant) {
        for entry in &mut self.entries {
            if entry.peer == peer && entry.kind == TaskKind::Handshake {
                if due < entry.due {
                    entry.due = due;
                }
                return;
            }
        }
        self.entries.push(TaskEntry {
            due,
            peer,
            kind: TaskKind::Handshake,
        });
    }

    /// Schedule a keepalive for `peer`.
    pub fn schedule_keepalive(&mut self, peer: PeerId, due: Instant) {
        self.entries.push(TaskEntry {
            due,
            peer,
            kind: TaskKind::Keepalive,
        });
    }

    /// Drop all pending handshakes for `peer`.
    pub fn cancel_handshakes(&mut self, peer: PeerId) {
        self.entries
            .retain(|e| !(e.peer == peer && e.kind == TaskKind::Handshake));
    }

    /// Drop all pending keepalives for `peer`.
    pub fn cancel_keepalives(&mut self, peer: PeerId) {
        self.entries
            .retain(|e| !(e.peer == peer && e.kind == TaskKind::Keepalive));
    }

    /// Drop every entry for `peer`.
    pub fn cancel_peer(&mut self, peer: PeerId) {
        self.entries.retain(|e| e.peer != peer);
    }

    /// Take the most overdue entry, if any entry is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(PeerId, TaskKind)> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by_key(|(_, e)| e.due)
            .map(|(i, _)| i)?;
        let entry = self.entries.swap_remove(idx);
        Some((entry.peer, entry.kind))
    }

    /// The next deadline, for the event loop's poll timeout.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.due).min()
    }

    /// Whether a handshake is pending for `peer`.
    #[must_use]
    pub fn has_handshake(&self, peer: PeerId) -> bool {
        self.entries
            .iter()
            .any(|e| e.peer == peer && e.kind == TaskKind::Handshake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn handshakes_coalesce_to_earliest() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.schedule_handshake(0, now + Duration::from_secs(5));
        queue.schedule_handshake(0, now + Duration::from_secs(1));
        queue.schedule_handshake(0, now + Duration::from_secs(9));

        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(1)));
        assert!(queue.pop_due(now + Duration::from_secs(1)).is_some());
        // coalesced: nothing further pending
        assert!(queue.pop_due(now + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn pop_due_returns_most_overdue_first() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.schedule_keepalive(0, now + Duration::from_secs(3));
        queue.schedule_handshake(1, now + Duration::from_secs(1));

        let later = now + Duration::from_secs(10);
        assert_eq!(queue.pop_due(later), Some((1, TaskKind::Handshake)));
        assert_eq!(queue.pop_due(later), Some((0, TaskKind::Keepalive)));
        assert_eq!(queue.pop_due(later), None);
    }

    #[test]
    fn nothing_pops_before_deadline() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.schedule_keepalive(0, now + Duration::from_secs(3));
        assert_eq!(queue.pop_due(now), None);
    }

    #[test]
    fn cancel_peer_drops_everything() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.schedule_handshake(0, now);
        queue.schedule_keepalive(0, now);
        queue.schedule_keepalive(1, now);

        queue.cancel_peer(0);
        assert_eq!(queue.pop_due(now), Some((1, TaskKind::Keepalive)));
        assert_eq!(queue.pop_due(now), None);
    }

    #[test]
    fn cancel_by_kind() {
        let now = Instant::now();
        let mut queue = TaskQueue::new();
        queue.schedule_handshake(0, now);
        queue.schedule_keepalive(0, now);

        queue.cancel_keepalives(0);
        assert!(queue.has_handshake(0));
        assert_eq!(queue.pop_due(now), Some((0, TaskKind::Handshake)));
        assert_eq!(queue.pop_due(now), None);
    }
}
