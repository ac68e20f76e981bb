use lattice::message::SnapshotFrame;
use std::collections::VecDeque;

/// Ring of the most recent snapshot frames, retained for in-band redundancy.
/// Frames are immutable once pushed; the ring only ever clones them into
/// outgoing payloads.
pub struct SnapshotHistory {
    frames: VecDeque<SnapshotFrame>,
    depth: usize,
}

impl SnapshotHistory {
    pub fn new(depth: usize) -> SnapshotHistory {
        assert!(depth >= 1, "history depth must be at least 1");

        SnapshotHistory {
            frames: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Retains the frame, evicting the oldest beyond the redundancy depth.
    pub fn push(&mut self, frame: SnapshotFrame) {
        if let Some(newest) = self.newest_id() {
            debug_assert!(frame.id > newest, "snapshot ids must increase");
        }

        if self.frames.len() == self.depth {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Newest retained frame id, if any frame has been produced yet.
    #[inline]
    pub fn newest_id(&self) -> Option<u32> {
        self.frames.back().map(|frame| frame.id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Frames to embed in one datagram, newest first, capped to the budget.
    pub fn embed(&self, budget: usize) -> Vec<SnapshotFrame> {
        self.frames.iter().rev().take(budget).cloned().collect()
    }

    /// Retained frames older than the newest that the given watermark has
    /// not acknowledged, oldest first. Feeds the optional per-session
    /// resend.
    pub fn stale(&self, watermark: i64) -> impl Iterator<Item = &SnapshotFrame> {
        let newest = self.newest_id();

        self.frames.iter().filter(move |frame| {
            Some(frame.id) != newest && i64::from(frame.id) > watermark
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> SnapshotFrame {
        SnapshotFrame {
            id,
            timestamp_ms: u64::from(id) * 50,
            grid: vec![0; 4],
        }
    }

    #[test]
    fn test_bounded_retention() {
        let mut history = SnapshotHistory::new(2);

        history.push(frame(1));
        history.push(frame(2));
        history.push(frame(3));

        assert_eq!(history.len(), 2);
        assert_eq!(history.newest_id(), Some(3));
    }

    #[test]
    fn test_embed_newest_first() {
        let mut history = SnapshotHistory::new(3);
        history.push(frame(1));
        history.push(frame(2));
        history.push(frame(3));

        let embedded = history.embed(3);
        let ids: Vec<u32> = embedded.iter().map(|frame| frame.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        // A tighter datagram budget keeps the newest frames.
        let embedded = history.embed(2);
        let ids: Vec<u32> = embedded.iter().map(|frame| frame.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_embed_before_first_snapshot() {
        let history = SnapshotHistory::new(2);
        assert!(history.embed(2).is_empty());
        assert_eq!(history.newest_id(), None);
    }

    #[test]
    fn test_stale_excludes_newest_and_acked() {
        let mut history = SnapshotHistory::new(3);
        history.push(frame(5));
        history.push(frame(6));
        history.push(frame(7));

        let ids: Vec<u32> = history.stale(-1).map(|frame| frame.id).collect();
        assert_eq!(ids, vec![5, 6]);

        let ids: Vec<u32> = history.stale(5).map(|frame| frame.id).collect();
        assert_eq!(ids, vec![6]);

        let ids: Vec<u32> = history.stale(6).map(|frame| frame.id).collect();
        assert!(ids.is_empty());
    }
}
