//! Pairs waiting connections on a fixed cadence.

use crate::config::ServerConfig;
use crate::connection::{ConnHandle, ConnId};
use crate::registry::Registry;
use crate::session::Session;
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

/// FIFO queue of connections waiting for an opponent.
///
/// Mutated from three places: the accept path (enqueue), the pairing tick
/// (dequeue), and a client disconnecting while still searching (remove).
/// The lock makes those mutually exclusive; dequeuing a pair is atomic
/// with pairing, so a connection is never queued and paired at once.
pub struct Matchmaker {
    queue: Mutex<VecDeque<ConnHandle>>,
    eligibility: Duration,
}

impl Matchmaker {
    pub fn new(eligibility: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            eligibility,
        }
    }

    /// Adds a freshly accepted connection to the back of the queue.
    pub async fn enqueue(&self, handle: ConnHandle) {
        let mut queue = self.queue.lock().await;
        debug!(
            "Client {} queued for matchmaking ({} waiting)",
            handle.id,
            queue.len() + 1
        );
        queue.push_back(handle);
    }

    /// Drops a connection that disconnected while still searching.
    pub async fn remove(&self, id: ConnId) {
        let mut queue = self.queue.lock().await;
        queue.retain(|handle| handle.id != id);
    }

    /// Number of connections currently waiting.
    pub async fn waiting(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// One pairing pass: dequeues every eligible pair as of `now`.
    pub async fn collect_pairs(&self, now: Instant) -> Vec<(ConnHandle, ConnHandle)> {
        let mut queue = self.queue.lock().await;
        let mut pairs = Vec::new();
        while let Some(pair) = take_eligible_pair(&mut queue, now, self.eligibility) {
            pairs.push(pair);
        }
        pairs
    }
}

/// Dequeues the two oldest entries when the pairing rule allows it.
///
/// Only the SECOND entry's wait is checked: the head has waited at least
/// as long under FIFO order, and requiring the newer half of the pair to
/// dwell for a full threshold keeps two near-simultaneous arrivals from
/// being matched before a later arrival had a chance to be the better
/// pick. Deliberate policy, not an oversight.
fn take_eligible_pair(
    queue: &mut VecDeque<ConnHandle>,
    now: Instant,
    eligibility: Duration,
) -> Option<(ConnHandle, ConnHandle)> {
    if queue.len() < 2 || queue[1].waited(now) < eligibility {
        return None;
    }
    let first = queue.pop_front()?;
    let second = queue.pop_front()?;
    Some((first, second))
}

/// Periodic pairing task.
///
/// Sessions are spawned, never awaited, so a slow game cannot stall
/// matchmaking for everyone else.
pub async fn run_matchmaker(
    matchmaker: Arc<Matchmaker>,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
) {
    let mut tick = tokio::time::interval(config.matchmaker_tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        let now = Instant::now();
        for (first, second) in matchmaker.collect_pairs(now).await {
            info!("Pairing clients {} and {}", first.id, second.id);
            let session =
                Session::new(first, second, Arc::clone(&registry), Arc::clone(&config)).await;
            tokio::spawn(session.run());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn aged_handle(id: ConnId, waited: Duration) -> ConnHandle {
        // Tests only inspect the queue; nobody reads the command channel.
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let mut handle = ConnHandle::new(id, cmd_tx);
        handle.enqueued_at = Instant::now() - waited;
        handle
    }

    const THRESHOLD: Duration = Duration::from_secs(1);

    #[test]
    fn test_empty_queue_never_pairs() {
        let mut queue = VecDeque::new();
        assert!(take_eligible_pair(&mut queue, Instant::now(), THRESHOLD).is_none());
    }

    #[test]
    fn test_single_entry_never_pairs() {
        let mut queue = VecDeque::from([aged_handle(1, Duration::from_secs(60))]);

        assert!(take_eligible_pair(&mut queue, Instant::now(), THRESHOLD).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_second_entry_too_new_blocks_pairing() {
        let mut queue = VecDeque::from([
            aged_handle(1, Duration::from_secs(10)),
            aged_handle(2, Duration::from_millis(100)),
        ]);

        assert!(take_eligible_pair(&mut queue, Instant::now(), THRESHOLD).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_eligible_pair_dequeued_in_fifo_order() {
        let mut queue = VecDeque::from([
            aged_handle(1, Duration::from_secs(5)),
            aged_handle(2, Duration::from_secs(3)),
            aged_handle(3, Duration::from_millis(10)),
        ]);

        let (first, second) = take_eligible_pair(&mut queue, Instant::now(), THRESHOLD).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        // The too-new third entry stays behind.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, 3);
    }

    #[test]
    fn test_collect_pairs_takes_every_eligible_pair() {
        tokio_test::block_on(async {
            let matchmaker = Matchmaker::new(THRESHOLD);
            for id in 1..=4 {
                matchmaker
                    .enqueue(aged_handle(id, Duration::from_secs(2)))
                    .await;
            }

            let pairs = matchmaker.collect_pairs(Instant::now()).await;
            assert_eq!(pairs.len(), 2);
            assert_eq!((pairs[0].0.id, pairs[0].1.id), (1, 2));
            assert_eq!((pairs[1].0.id, pairs[1].1.id), (3, 4));
            assert_eq!(matchmaker.waiting().await, 0);
        });
    }

    #[test]
    fn test_collect_pairs_stops_at_first_ineligible() {
        tokio_test::block_on(async {
            let matchmaker = Matchmaker::new(THRESHOLD);
            matchmaker
                .enqueue(aged_handle(1, Duration::from_secs(2)))
                .await;
            matchmaker
                .enqueue(aged_handle(2, Duration::from_secs(2)))
                .await;
            matchmaker.enqueue(aged_handle(3, Duration::ZERO)).await;
            matchmaker.enqueue(aged_handle(4, Duration::ZERO)).await;

            let pairs = matchmaker.collect_pairs(Instant::now()).await;
            assert_eq!(pairs.len(), 1);
            assert_eq!(matchmaker.waiting().await, 2);
        });
    }

    #[test]
    fn test_remove_drops_queued_connection() {
        tokio_test::block_on(async {
            let matchmaker = Matchmaker::new(THRESHOLD);
            matchmaker
                .enqueue(aged_handle(1, Duration::from_secs(2)))
                .await;
            matchmaker
                .enqueue(aged_handle(2, Duration::from_secs(2)))
                .await;

            matchmaker.remove(1).await;
            assert_eq!(matchmaker.waiting().await, 1);

            // Only one entry left; no pair can form.
            assert!(matchmaker.collect_pairs(Instant::now()).await.is_empty());
        });
    }

    #[test]
    fn test_remove_unknown_id_is_harmless() {
        tokio_test::block_on(async {
            let matchmaker = Matchmaker::new(THRESHOLD);
            matchmaker
                .enqueue(aged_handle(1, Duration::from_secs(2)))
                .await;

            matchmaker.remove(99).await;
            assert_eq!(matchmaker.waiting().await, 1);
        });
    }
}
