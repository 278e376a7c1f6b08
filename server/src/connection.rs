//! Per-client protocol state machine and the task that runs it.
//!
//! The pure [`Protocol`] machine decides what each inbound line means for
//! the current state; [`run_connection`] owns the socket and executes
//! those decisions, interleaving session commands with client input.

use crate::matchmaker::Matchmaker;
use log::{debug, info, warn};
use shared::{LineBuffer, DIAGNOSTIC, FAREWELL, SIGNAL_TOKEN};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Unique connection identifier assigned by the server on accept.
pub type ConnId = u32;

/// Protocol phase of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Queued for matchmaking; all input is ignored.
    Searching,
    /// Paired, countdown running; the signal token here is a forfeit.
    Prepared,
    /// Signaling window open; the first signal token is a win candidate.
    Ready,
    /// Out of the round. The socket may stay open for outcome delivery.
    Terminated,
}

/// The one report a connection may make to its session per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Signal token received while the window was open.
    Signal { conn: ConnId },
    /// Signal token received before the window opened.
    EarlySignal { offender: ConnId },
    /// Client went away (EOF or read error) while paired.
    Disconnect { offender: ConnId },
}

/// Control messages a connection task accepts from the rest of the server.
#[derive(Debug)]
pub enum ConnCommand {
    /// Write one protocol line to the client.
    Deliver(String),
    /// The matchmaker paired this connection; reports go to the session.
    EnterPrepared {
        events: mpsc::UnboundedSender<GameEvent>,
    },
    /// The countdown completed; open the signaling window.
    EnterReady,
    /// Close the socket and end the task.
    Shutdown,
}

/// What the connection task should do with one inbound line.
#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    Ignore,
    /// Reply with the unknown-input hint when diagnostics are enabled.
    Unknown,
    Report(GameEvent),
}

/// Pure per-connection state machine.
///
/// The I/O task feeds it lines and end-of-stream; it decides what, if
/// anything, to report to the session. At most one report is ever
/// produced per round, whatever arrives afterwards.
#[derive(Debug)]
pub struct Protocol {
    id: ConnId,
    state: ConnState,
    reported: bool,
}

impl Protocol {
    pub fn new(id: ConnId) -> Self {
        Self {
            id,
            state: ConnState::Searching,
            reported: false,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Pairing happened; the countdown is about to start. Terminated is
    /// terminal, so a connection already out of the round stays out.
    pub fn enter_prepared(&mut self) {
        if self.state != ConnState::Terminated {
            self.state = ConnState::Prepared;
        }
    }

    /// Countdown finished; signals count from here on. No-op once
    /// Terminated (an early signal may race the last countdown timer).
    pub fn enter_ready(&mut self) {
        if self.state != ConnState::Terminated {
            self.state = ConnState::Ready;
        }
    }

    fn on_line(&mut self, line: &str) -> LineAction {
        match self.state {
            // Not interested in input until an opponent is found, and not
            // after the round is over.
            ConnState::Searching | ConnState::Terminated => LineAction::Ignore,
            ConnState::Prepared | ConnState::Ready if line != SIGNAL_TOKEN => LineAction::Unknown,
            ConnState::Prepared => {
                // Signaled before the window opened. Out of the round, but
                // the socket stays open so the outcome can be delivered.
                self.state = ConnState::Terminated;
                self.report(GameEvent::EarlySignal { offender: self.id })
            }
            ConnState::Ready => self.report(GameEvent::Signal { conn: self.id }),
        }
    }

    /// End of stream, or a read error treated as one. Returns a report
    /// when one is still owed to a session.
    fn on_eof(&mut self) -> Option<GameEvent> {
        let was = self.state;
        self.state = ConnState::Terminated;
        match was {
            ConnState::Prepared | ConnState::Ready => {
                match self.report(GameEvent::Disconnect { offender: self.id }) {
                    LineAction::Report(event) => Some(event),
                    _ => None,
                }
            }
            ConnState::Searching | ConnState::Terminated => None,
        }
    }

    fn report(&mut self, event: GameEvent) -> LineAction {
        if self.reported {
            return LineAction::Ignore;
        }
        self.reported = true;
        LineAction::Report(event)
    }
}

/// Cloneable, non-owning reference to a running connection task.
///
/// All methods are fire-and-forget; a failed send means the task is
/// already gone, which every caller treats the same as delivered.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub id: ConnId,
    /// When the connection entered the matchmaking queue.
    pub enqueued_at: Instant,
    cmd_tx: mpsc::UnboundedSender<ConnCommand>,
}

impl ConnHandle {
    pub fn new(id: ConnId, cmd_tx: mpsc::UnboundedSender<ConnCommand>) -> Self {
        Self {
            id,
            enqueued_at: Instant::now(),
            cmd_tx,
        }
    }

    /// Queues one line for delivery to the client.
    pub fn deliver(&self, line: impl Into<String>) {
        let _ = self.cmd_tx.send(ConnCommand::Deliver(line.into()));
    }

    /// Attaches the session's event channel and moves the connection to
    /// `Prepared`. Returns false if the connection task is already gone.
    pub fn enter_prepared(&self, events: mpsc::UnboundedSender<GameEvent>) -> bool {
        self.cmd_tx
            .send(ConnCommand::EnterPrepared { events })
            .is_ok()
    }

    pub fn enter_ready(&self) {
        let _ = self.cmd_tx.send(ConnCommand::EnterReady);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(ConnCommand::Shutdown);
    }

    /// How long this connection has been queued, as of `now`.
    pub fn waited(&self, now: Instant) -> Duration {
        now.duration_since(self.enqueued_at)
    }
}

/// Runs one client connection to completion.
///
/// Owns the socket. Sessions and the matchmaker only ever talk to the
/// connection through its command channel, so writes, state changes, and
/// client input are serialized here without locks.
pub async fn run_connection(
    stream: TcpStream,
    id: ConnId,
    mut cmd_rx: mpsc::UnboundedReceiver<ConnCommand>,
    matchmaker: Arc<Matchmaker>,
    diagnostics: bool,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut protocol = Protocol::new(id);
    let mut lines = LineBuffer::new();
    let mut events: Option<mpsc::UnboundedSender<GameEvent>> = None;
    // Protocol lines are one character; 64 bytes covers sloppy clients.
    let mut read_buf = [0u8; 64];
    let mut client_gone = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCommand::Deliver(line)) => {
                    if let Err(e) = write_line(&mut write_half, &line).await {
                        debug!("Write to client {} failed: {}", id, e);
                    }
                }
                Some(ConnCommand::EnterPrepared { events: tx }) => {
                    protocol.enter_prepared();
                    events = Some(tx);
                }
                Some(ConnCommand::EnterReady) => protocol.enter_ready(),
                Some(ConnCommand::Shutdown) | None => break,
            },
            read = read_half.read(&mut read_buf) => {
                let n = match read {
                    Ok(n) => n,
                    Err(e) => {
                        // Closed descriptors and everything else: the
                        // client is unreachable either way.
                        debug!("Read from client {} failed: {}", id, e);
                        0
                    }
                };
                if n == 0 {
                    // A pairing command may already be queued behind this
                    // EOF; apply pending state changes first so a client
                    // that died right at pairing still reports its
                    // disconnect to the session instead of vanishing.
                    while let Ok(cmd) = cmd_rx.try_recv() {
                        match cmd {
                            ConnCommand::EnterPrepared { events: tx } => {
                                protocol.enter_prepared();
                                events = Some(tx);
                            }
                            ConnCommand::EnterReady => protocol.enter_ready(),
                            ConnCommand::Deliver(_) | ConnCommand::Shutdown => {}
                        }
                    }
                    client_gone = true;
                    handle_eof(&mut protocol, &events, &matchmaker, id).await;
                    break;
                }
                lines.extend(&read_buf[..n]);
                while let Some(line) = lines.next_line() {
                    match protocol.on_line(&line) {
                        LineAction::Ignore => {}
                        LineAction::Unknown => {
                            if diagnostics {
                                if let Err(e) = write_line(&mut write_half, DIAGNOSTIC).await {
                                    debug!("Write to client {} failed: {}", id, e);
                                }
                            }
                        }
                        LineAction::Report(event) => forward(&events, event, id),
                    }
                }
            }
        }
    }

    if !client_gone {
        if diagnostics {
            let _ = write_line(&mut write_half, FAREWELL).await;
        }
        let _ = write_half.shutdown().await;
        info!("Client {} closed", id);
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

async fn handle_eof(
    protocol: &mut Protocol,
    events: &Option<mpsc::UnboundedSender<GameEvent>>,
    matchmaker: &Matchmaker,
    id: ConnId,
) {
    let was_searching = protocol.state() == ConnState::Searching;
    if let Some(event) = protocol.on_eof() {
        forward(events, event, id);
    }
    if was_searching {
        // Still unpaired; leave the queue before the matchmaker can pick
        // this connection up.
        matchmaker.remove(id).await;
        info!("Client {} disconnected while searching", id);
    } else {
        info!("Client {} disconnected", id);
    }
}

fn forward(events: &Option<mpsc::UnboundedSender<GameEvent>>, event: GameEvent, id: ConnId) {
    match events {
        Some(tx) => {
            if tx.send(event).is_err() {
                debug!("Session of client {} already resolved, dropping {:?}", id, event);
            }
        }
        None => warn!("Client {} produced {:?} with no session attached", id, event),
    }
}
