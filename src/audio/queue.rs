use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::debug;

use super::track::Track;

/// Unbounded FIFO of tracks for one guild.
///
/// Any number of producers may `push`/`drain_all` concurrently; `pop` is meant
/// for a single consumer (the guild's playback loop).
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: Mutex<VecDeque<Track>>,
    available: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track. Never blocks.
    pub fn push(&self, track: Track) {
        let len = {
            let mut items = self.items.lock();
            items.push_back(track);
            items.len()
        };
        debug!("➕ Track queued ({} pending)", len);
        self.available.notify_one();
    }

    /// Waits for the next track in insertion order.
    ///
    /// Cancel-safe: dropping the future before it resolves removes nothing.
    pub async fn pop(&self) -> Track {
        loop {
            if let Some(track) = self.items.lock().pop_front() {
                return track;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // landing between the check above and this await is not lost.
            self.available.notified().await;
        }
    }

    /// Removes every queued track and returns how many were discarded.
    pub fn drain_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.items.lock());
        if !drained.is_empty() {
            debug!("🗑️ Drained {} queued tracks", drained.len());
        }
        drained.len()
    }

    /// Copy of the pending tracks, next-to-play first.
    pub fn snapshot(&self) -> Vec<Track> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, time::Duration};

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://example.com/{title}"), title)
    }

    #[tokio::test]
    async fn pops_in_insertion_order() {
        let queue = TrackQueue::new();
        queue.push(track("a"));
        queue.push(track("b"));
        queue.push(track("a"));

        assert_eq!(queue.pop().await.title(), "a");
        assert_eq!(queue.pop().await.title(), "b");
        assert_eq!(queue.pop().await.title(), "a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_waits_for_a_later_push() {
        let queue = Arc::new(TrackQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        assert!(!consumer.is_finished());

        queue.push(track("late"));
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should wake up")
            .unwrap();
        assert_eq!(popped.title(), "late");
    }

    #[tokio::test]
    async fn cancelled_pop_loses_nothing() {
        let queue = TrackQueue::new();
        let attempt = tokio::time::timeout(Duration::from_millis(10), queue.pop()).await;
        assert!(attempt.is_err());

        queue.push(track("kept"));
        assert_eq!(queue.pop().await.title(), "kept");
    }

    #[test]
    fn drain_removes_everything_and_reports_count() {
        let queue = TrackQueue::new();
        queue.push(track("a"));
        queue.push(track("b"));

        assert_eq!(queue.drain_all(), 2);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.drain_all(), 0);

        queue.push(track("c"));
        let titles: Vec<_> = queue.snapshot().iter().map(|t| t.title().to_string()).collect();
        assert_eq!(titles, vec!["c".to_string()]);
    }
}
