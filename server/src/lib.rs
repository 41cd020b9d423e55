//! # Draw-and-Guess Game Server Library
//!
//! This library provides the authoritative server for a multiplayer drawing and
//! guessing game played over plain TCP text lines. One player draws a secret word
//! while everyone else races to guess it in chat.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! The server owns the single shared room: who is connected, the turn order,
//! the scores, the current drawer and word, and the round countdown. Clients
//! only ever see the state through the messages the server sends them.
//!
//! ### Session Management
//! Handles the complete lifecycle of a connection:
//! - Name handshake on the first line, made unique among connected players
//! - Decoding of chat, drawing and control commands
//! - Disconnection handling and cleanup, exactly once per session
//!
//! ### Relay
//! Chat lines are echoed to every player, drawing strokes to everyone except
//! the artist, and canvas clears to all, in the order they arrived.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! Sessions, the acceptor and the round timer never touch game state. They
//! queue `ServerEvent`s into one loop that applies them in arrival order, so a
//! correct guess and a timeout can never both end the same round.
//!
//! ### Per-Session Writers
//! Every session has its own bounded outbound queue drained by a dedicated
//! writer task. Recipients are fixed when a message is emitted and pushing never
//! waits; a client that falls too far behind is disconnected instead of
//! stalling the loop or the other players.
//!
//! ## Module Organization
//!
//! - `registry`: connected sessions, unique names and message fan-out
//! - `room`: round state machine, scoring and turn rotation
//! - `session`: per-connection reader and writer tasks
//! - `timer`: one-second countdown ticks tagged by round
//! - `words`: the secret word bank
//! - `network`: listener, event loop and outbound sender task
//! - `error`: server error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         addr: "127.0.0.1:12345".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;
pub mod registry;
pub mod room;
pub mod session;
pub mod timer;
pub mod words;

pub use error::{ServerError, ServerResult};
pub use network::{Server, ServerConfig, ServerEvent};
