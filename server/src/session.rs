//! One paired game round: countdown, signaling window, outcome.

use crate::config::ServerConfig;
use crate::connection::{ConnHandle, ConnId, GameEvent};
use crate::registry::{Registry, SessionId};
use log::{debug, info};
use rand::Rng;
use shared::{
    countdown_label, COUNTDOWN_STEPS, DRAW, FORFEIT_LOSE, FORFEIT_WIN, LOSE, PAIRED, WIN,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Final result of one round. Exactly one is produced per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Clean win: `winner` signaled first after the window opened.
    Won { winner: ConnId },
    /// `loser` signaled early or disconnected; the other side wins.
    Forfeited { loser: ConnId },
    /// Nobody signaled before the configured deadline.
    Draw,
}

/// Controller for one game between exactly two connections.
///
/// Both connections report into a single event channel; the session
/// consumes exactly the first report, which makes the outcome a
/// single-assignment value. Ties between simultaneous signals fall to
/// channel arrival order.
pub struct Session {
    id: SessionId,
    players: [ConnHandle; 2],
    events_rx: mpsc::UnboundedReceiver<GameEvent>,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
}

impl Session {
    /// Registers the session, wires both connections to it, and notifies
    /// them that they have been paired.
    pub async fn new(
        first: ConnHandle,
        second: ConnHandle,
        registry: Arc<Registry>,
        config: Arc<ServerConfig>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let players = [first, second];
        let id = registry.add(players.clone()).await;

        for player in &players {
            if player.enter_prepared(events_tx.clone()) {
                player.deliver(PAIRED);
            } else {
                // The connection died between pairing and wiring; report
                // the disconnect ourselves so the round resolves at once.
                let _ = events_tx.send(GameEvent::Disconnect { offender: player.id });
            }
        }

        Self {
            id,
            players,
            events_rx,
            registry,
            config,
        }
    }

    pub async fn run(mut self) {
        info!(
            "Session {} started: client {} vs client {}",
            self.id, self.players[0].id, self.players[1].id
        );

        let outcome = self.play().await;
        info!("Session {} resolved: {:?}", self.id, outcome);

        self.announce(outcome);
        sleep(self.config.flush_grace).await;
        self.teardown().await;
    }

    /// Runs the countdown and the race, producing exactly one outcome.
    async fn play(&mut self) -> Outcome {
        // Draw every step delay up front; keeps the RNG out of await scope.
        let delays: Vec<Duration> = {
            let mut rng = rand::thread_rng();
            (0..COUNTDOWN_STEPS)
                .map(|_| {
                    Duration::from_secs_f64(rng.gen_range(self.config.countdown_delay.clone()))
                })
                .collect()
        };

        for (step, delay) in delays.into_iter().enumerate() {
            tokio::select! {
                // Check for faults first: when a fault and the step timer
                // are ready in the same instant, no label may slip out.
                biased;
                event = self.events_rx.recv() => {
                    // A fault before the window opens ends the round; the
                    // remaining countdown labels are never sent.
                    return resolve(event);
                }
                _ = sleep(delay) => {
                    self.broadcast(&countdown_label(step as u32 + 1));
                }
            }
        }

        // Window opens: from here the first signal wins.
        for player in &self.players {
            player.enter_ready();
        }

        match self.config.game_timeout {
            Some(deadline) => tokio::select! {
                event = self.events_rx.recv() => resolve(event),
                _ = sleep(deadline) => Outcome::Draw,
            },
            None => resolve(self.events_rx.recv().await),
        }
    }

    fn announce(&self, outcome: Outcome) {
        match outcome {
            Outcome::Won { winner } => self.split(winner, WIN, LOSE),
            Outcome::Forfeited { loser } => {
                let winner = self.opponent_of(loser);
                self.split(winner, FORFEIT_WIN, FORFEIT_LOSE);
            }
            Outcome::Draw => self.broadcast(DRAW),
        }
    }

    /// Sends `winner_line` to the winner and `loser_line` to the other
    /// player.
    fn split(&self, winner: ConnId, winner_line: &str, loser_line: &str) {
        for player in &self.players {
            if player.id == winner {
                player.deliver(winner_line);
            } else {
                player.deliver(loser_line);
            }
        }
    }

    fn broadcast(&self, line: &str) {
        for player in &self.players {
            player.deliver(line);
        }
    }

    fn opponent_of(&self, id: ConnId) -> ConnId {
        if self.players[0].id == id {
            self.players[1].id
        } else {
            self.players[0].id
        }
    }

    /// Detaches and closes both connections, then unregisters.
    async fn teardown(self) {
        for player in &self.players {
            player.shutdown();
        }
        self.registry.remove(self.id).await;
    }
}

/// Maps the first event observed on the session channel to an outcome.
fn resolve(event: Option<GameEvent>) -> Outcome {
    match event {
        Some(GameEvent::Signal { conn }) => Outcome::Won { winner: conn },
        Some(GameEvent::EarlySignal { offender })
        | Some(GameEvent::Disconnect { offender }) => Outcome::Forfeited { loser: offender },
        // Both connection tasks ended without a report still owed. Should
        // not happen while the round is live; settle for a draw.
        None => {
            debug!("Event channel closed with no report; treating as draw");
            Outcome::Draw
        }
    }
}
