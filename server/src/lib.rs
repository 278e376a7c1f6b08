//! # Quickdraw Server Library
//!
//! Server implementation for a line-oriented reaction-timing duel. Clients
//! connect over TCP, wait in a matchmaking queue, and are paired into
//! sessions. A session runs a randomized three-step countdown, opens a
//! signaling window, and declares whichever client sends the signal token
//! first the winner.
//!
//! ## Architecture
//!
//! Each concern runs as its own tokio task, connected by channels:
//!
//! - **Connection tasks** (`connection`): one per socket. Each task owns
//!   its stream and wraps a pure protocol state machine
//!   (Searching → Prepared → Ready → Terminated). It interleaves server
//!   commands with client input, so nothing else ever touches the socket.
//! - **Session tasks** (`session`): one per paired game. A session drives
//!   both connections through the countdown and resolves exactly one
//!   outcome from the first signal, fault, or deadline to arrive.
//! - **Matchmaker task** (`matchmaker`): a periodic tick over a FIFO queue
//!   of waiting connections. Pairs are only formed once the newer half has
//!   waited out the eligibility threshold.
//!
//! The race between two clients signaling at once is resolved by the
//! session's event channel: each connection reports at most once, the
//! session consumes exactly the first report, and everything after it is
//! discarded. Faults (early signal, disconnect) travel the same channel,
//! so the session observes signals and faults in one arrival order and
//! checks for them at every suspension point.
//!
//! ## Module Organization
//!
//! - `config`: plain-value runtime configuration, built by the binary.
//! - `connection`: protocol state machine, connection task, handles.
//! - `session`: game controller and outcome resolution.
//! - `matchmaker`: pairing queue and its periodic task.
//! - `registry`: bookkeeping of in-flight sessions, bulk shutdown.
//! - `network`: listener, accept loop, task wiring.

pub mod config;
pub mod connection;
pub mod matchmaker;
pub mod network;
pub mod registry;
pub mod session;
