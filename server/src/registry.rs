//! Connection registry and outbound delivery for the game server
//!
//! This module tracks every identified session and fans outbound lines out to them:
//! - Session registration under a unique, protocol-safe display name
//! - Idempotent removal when a connection goes away
//! - Recipient selection for broadcast, exclusion-send and unicast
//! - Delivery through each session's own bounded FIFO queue
//!
//! The registry is owned by the server event loop. Recipients are resolved to
//! session queues there, when a message is emitted, so a message can never reach
//! a session that registered after it was sent. Pushing never waits: a session
//! whose queue is full or closed is reported back for disconnection.

use log::{debug, info, warn};
use rand::Rng;
use shared::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

pub type SessionId = u32;

/// Outbound FIFO of encoded lines, drained by the session's writer task
pub type LineSender = mpsc::Sender<String>;

/// Lines a session may have waiting before it counts as stalled
pub const SESSION_QUEUE_CAPACITY: usize = 256;

/// The server's end of a session
///
/// Dropping it closes the connection: the session watches the paired
/// `oneshot::Receiver` and stops once the handle is gone.
#[derive(Debug)]
pub struct SessionHandle {
    lines: LineSender,
    _close: oneshot::Sender<()>,
}

impl SessionHandle {
    /// Creates a handle together with the session's line queue receiver and
    /// its close notification
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>, oneshot::Receiver<()>) {
        let (lines, outbound) = mpsc::channel(capacity);
        let (close, closed) = oneshot::channel();
        (
            Self {
                lines,
                _close: close,
            },
            outbound,
            closed,
        )
    }
}

/// A connected and identified session
#[derive(Debug)]
pub struct Client {
    /// Server-assigned session handle
    pub id: SessionId,
    /// Display name, unique among registered clients
    pub name: String,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    handle: SessionHandle,
}

impl Client {
    pub fn new(id: SessionId, name: String, addr: SocketAddr, handle: SessionHandle) -> Self {
        Self {
            id,
            name,
            addr,
            handle,
        }
    }
}

/// Who an outbound message is for, addressed by player name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    All,
    AllExcept(String),
    Only(String),
}

/// A message queued for delivery by the broadcaster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub recipients: Recipients,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn to_all(message: ServerMessage) -> Self {
        Self {
            recipients: Recipients::All,
            message,
        }
    }

    pub fn all_except(name: &str, message: ServerMessage) -> Self {
        Self {
            recipients: Recipients::AllExcept(name.to_string()),
            message,
        }
    }

    pub fn only(name: &str, message: ServerMessage) -> Self {
        Self {
            recipients: Recipients::Only(name.to_string()),
            message,
        }
    }
}

/// All identified sessions, keyed by session id
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<SessionId, Client>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under the name it asked for
    ///
    /// Blank names get a `Guest<n>` fallback, characters that would break the
    /// line framing are replaced, and a name already taken by another session
    /// gets the first free `_<n>` suffix. Returns the name actually assigned.
    pub fn register(
        &mut self,
        id: SessionId,
        requested_name: &str,
        addr: SocketAddr,
        handle: SessionHandle,
    ) -> String {
        let base = match sanitize_name(requested_name) {
            Some(name) => name,
            None => format!("Guest{}", rand::thread_rng().gen_range(0..1000)),
        };
        let name = self.unique_name(&base);
        if name != requested_name {
            debug!(
                "Session {} asked for '{}', assigned '{}'",
                id, requested_name, name
            );
        }

        info!("Player '{}' registered (session {} from {})", name, id, addr);
        self.clients
            .insert(id, Client::new(id, name.clone(), addr, handle));
        name
    }

    /// Removes a session. Returns the client only the first time, so callers can
    /// run their cleanup exactly once however many paths report the disconnect.
    pub fn unregister(&mut self, id: SessionId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        info!("Player '{}' unregistered (session {})", client.name, id);
        Some(client)
    }

    pub fn name_of(&self, id: SessionId) -> Option<&str> {
        self.clients.get(&id).map(|client| client.name.as_str())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.clients.values().any(|client| client.name == name)
    }

    /// Registered sessions ordered by session id
    pub fn snapshot(&self) -> Vec<(SessionId, String)> {
        let mut sessions: Vec<(SessionId, String)> = self
            .clients
            .values()
            .map(|client| (client.id, client.name.clone()))
            .collect();
        sessions.sort_by_key(|(id, _)| *id);
        sessions
    }

    /// Captures the queues of every client `outbound` is addressed to
    pub fn resolve(&self, outbound: &Outbound) -> Delivery {
        let targets = self
            .clients
            .values()
            .filter(|client| match &outbound.recipients {
                Recipients::All => true,
                Recipients::AllExcept(name) => &client.name != name,
                Recipients::Only(name) => &client.name == name,
            })
            .map(|client| (client.id, client.handle.lines.clone()))
            .collect();

        Delivery {
            line: outbound.message.encode(),
            targets,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.contains_name(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.contains_name(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Trims a requested name and replaces the field separators of the protocol.
/// Returns None when nothing is left.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.replace([':', ','], "_"))
}

/// One encoded line and the session queues it goes to
#[derive(Debug)]
pub struct Delivery {
    line: String,
    targets: Vec<(SessionId, LineSender)>,
}

impl Delivery {
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Sessions the line will be queued for, in no particular order
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.targets.iter().map(|(id, _)| *id)
    }

    /// Queues the line for every target without waiting. Returns the sessions
    /// whose queue is full or closed; the others still get the line.
    pub fn push(self) -> Vec<SessionId> {
        debug!("Sending to {} session(s): {}", self.targets.len(), self.line);

        let mut failed = Vec::new();
        for (id, sender) in self.targets {
            match sender.try_send(self.line.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue of session {} is full, dropping it", id);
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Outbound queue of session {} is closed", id);
                    failed.push(id);
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    fn handle() -> (SessionHandle, mpsc::Receiver<String>) {
        let (handle, rx, _closed) = SessionHandle::new(SESSION_QUEUE_CAPACITY);
        (handle, rx)
    }

    fn registry_with(names: &[(SessionId, &str)]) -> (Registry, Vec<mpsc::Receiver<String>>) {
        let mut registry = Registry::new();
        let mut receivers = Vec::new();
        for (id, name) in names {
            let (handle, rx) = handle();
            registry.register(*id, name, test_addr(), handle);
            receivers.push(rx);
        }
        (registry, receivers)
    }

    /// A free name is assigned as requested
    #[test]
    fn test_register_assigns_requested_name() {
        let mut registry = Registry::new();
        let (handle, _rx) = handle();

        let name = registry.register(1, "alice", test_addr(), handle);

        assert_eq!(name, "alice");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.name_of(1), Some("alice"));
    }

    /// Taken names get the first free numeric suffix
    #[test]
    fn test_register_renames_duplicates() {
        let (mut registry, _rx) = registry_with(&[]);

        for (id, expected) in [(1, "bob"), (2, "bob_2"), (3, "bob_3")] {
            let (handle, _rx) = handle();
            assert_eq!(registry.register(id, "bob", test_addr(), handle), expected);
        }
    }

    /// Blank names fall back to a numbered guest name
    #[test]
    fn test_register_blank_name_gets_guest_fallback() {
        let mut registry = Registry::new();
        let (handle, _rx) = handle();

        let name = registry.register(1, "   ", test_addr(), handle);

        assert!(name.starts_with("Guest"));
        let number: u32 = name["Guest".len()..].parse().unwrap();
        assert!(number < 1000);
    }

    /// Protocol separators in names are replaced
    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  carol \r"), Some("carol".to_string()));
        assert_eq!(sanitize_name("a:b,c"), Some("a_b_c".to_string()));
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name(" \t "), None);
    }

    /// Only the first removal hands back the client
    #[test]
    fn test_unregister_is_idempotent() {
        let (mut registry, _rx) = registry_with(&[(7, "dave")]);

        let removed = registry.unregister(7);
        assert_eq!(removed.map(|c| c.name), Some("dave".to_string()));
        assert!(registry.unregister(7).is_none());
        assert!(registry.is_empty());
    }

    /// Dropping a registry entry notifies its session
    #[tokio::test]
    async fn test_unregister_closes_session() {
        let mut registry = Registry::new();
        let (handle, _rx, closed) = SessionHandle::new(4);
        registry.register(1, "erin", test_addr(), handle);

        registry.unregister(1);

        assert!(closed.await.is_err());
    }

    #[test]
    fn test_snapshot_is_ordered_by_session() {
        let (registry, _rx) = registry_with(&[(3, "c"), (1, "a"), (2, "b")]);

        assert_eq!(
            registry.snapshot(),
            vec![
                (1, "a".to_string()),
                (2, "b".to_string()),
                (3, "c".to_string())
            ]
        );
    }

    /// Broadcast, exclusion and unicast select the right sessions
    #[test]
    fn test_recipient_selection() {
        let (registry, _rx) = registry_with(&[(1, "a"), (2, "b"), (3, "c")]);

        let ids = |outbound: Outbound| {
            let mut ids: Vec<SessionId> = registry.resolve(&outbound).sessions().collect();
            ids.sort();
            ids
        };

        assert_eq!(ids(Outbound::to_all(ServerMessage::Clear)), vec![1, 2, 3]);
        assert_eq!(ids(Outbound::all_except("b", ServerMessage::Clear)), vec![1, 3]);
        assert_eq!(ids(Outbound::only("c", ServerMessage::Clear)), vec![3]);
        assert!(registry
            .resolve(&Outbound::only("nobody", ServerMessage::Clear))
            .is_empty());
    }

    /// Each session sees exactly the lines addressed to it
    #[test]
    fn test_delivery_pushes_encoded_lines() {
        let (registry, mut rx) = registry_with(&[(1, "a"), (2, "b")]);

        for outbound in [
            Outbound::to_all(ServerMessage::Clear),
            Outbound::all_except("a", ServerMessage::Time { seconds: 3 }),
            Outbound::only(
                "a",
                ServerMessage::Word {
                    word: "kite".to_string(),
                },
            ),
        ] {
            assert!(registry.resolve(&outbound).push().is_empty());
        }

        assert_eq!(rx[0].try_recv().unwrap(), "CLEAR");
        assert_eq!(rx[0].try_recv().unwrap(), "WORD:kite");
        assert!(rx[0].try_recv().is_err());

        assert_eq!(rx[1].try_recv().unwrap(), "CLEAR");
        assert_eq!(rx[1].try_recv().unwrap(), "TIME:3");
        assert!(rx[1].try_recv().is_err());
    }

    /// Targets are fixed when the message is resolved, not when it is pushed
    #[test]
    fn test_delivery_keeps_recipients_captured_at_resolve_time() {
        let (mut registry, mut rx) = registry_with(&[(1, "A"), (2, "B")]);
        let secret = registry.resolve(&Outbound::only(
            "A",
            ServerMessage::Word {
                word: "apple".to_string(),
            },
        ));

        registry.unregister(1);
        let (handle, mut newcomer) = handle();
        assert_eq!(registry.register(3, "A", test_addr(), handle), "A");

        assert!(secret.push().is_empty());
        assert!(newcomer.try_recv().is_err());
        assert_eq!(rx[0].try_recv().unwrap(), "WORD:apple");
    }

    /// A closed queue is reported while the others still receive the line
    #[test]
    fn test_delivery_reports_closed_queues_without_stopping() {
        let (registry, mut rx) = registry_with(&[(1, "gone"), (2, "ok")]);
        rx.remove(0);

        let failed = registry
            .resolve(&Outbound::to_all(ServerMessage::GameEnd))
            .push();

        assert_eq!(failed, vec![1]);
        assert_eq!(rx[0].try_recv().unwrap(), "GAME:END");
    }

    /// A session that stops draining its queue is reported once it is full
    #[test]
    fn test_delivery_reports_full_queue() {
        let mut registry = Registry::new();
        let (slow, _slow_rx, _closed) = SessionHandle::new(2);
        registry.register(1, "slow", test_addr(), slow);

        let failures: Vec<Vec<SessionId>> = (0..3)
            .map(|seconds| {
                registry
                    .resolve(&Outbound::to_all(ServerMessage::Time { seconds }))
                    .push()
            })
            .collect();

        assert_eq!(failures, vec![vec![], vec![], vec![1]]);
    }
}
