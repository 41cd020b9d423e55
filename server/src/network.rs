//! Server network layer: TCP acceptor, event loop and outbound fan-out

use crate::error::{ServerError, ServerResult};
use crate::registry::{Delivery, Outbound, Registry, SessionHandle, SessionId};
use crate::room::{Room, RoomConfig};
use crate::session;
use crate::timer::{RoundId, RoundTimer};
use crate::words::WordBank;
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage, DEFAULT_PORT, ROUND_DURATION_SECS};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Everything that can change server state, queued into the event loop
#[derive(Debug)]
pub enum ServerEvent {
    /// A session sent its name line and is ready to play
    Joined {
        session: SessionId,
        addr: SocketAddr,
        name: String,
        handle: SessionHandle,
    },
    Inbound {
        session: SessionId,
        message: ClientMessage,
    },
    /// Reported by the reader, the network sender or both; handled once
    Disconnected {
        session: SessionId,
    },
    TimerTick {
        round: RoundId,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub round_duration: u32,
    pub words: WordBank,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            round_duration: ROUND_DURATION_SECS,
            words: WordBank::default(),
        }
    }
}

/// Game server coordinating sessions and the shared room
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: Registry,
    room: Room,

    // Communication channels
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    outbox_tx: mpsc::UnboundedSender<Outbound>,
    outbox_rx: mpsc::UnboundedReceiver<Outbound>,
    deliveries_tx: mpsc::UnboundedSender<Delivery>,
    deliveries_rx: Option<mpsc::UnboundedReceiver<Delivery>>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        if config.round_duration == 0 {
            return Err(ServerError::InvalidRoundDuration);
        }

        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();

        let room = Room::new(
            RoomConfig {
                words: config.words,
                round_duration: config.round_duration,
            },
            RoundTimer::new(events_tx.clone()),
            outbox_tx.clone(),
        );

        Ok(Server {
            listener: Some(listener),
            local_addr,
            registry: Registry::new(),
            room,
            events_tx,
            events_rx,
            outbox_tx,
            outbox_rx,
            deliveries_tx,
            deliveries_rx: Some(deliveries_rx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for queueing events from outside, e.g. `ServerEvent::Shutdown`
    pub fn events(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.events_tx.clone()
    }

    /// Spawns task that accepts connections and starts a session for each
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let mut next_session: SessionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let session = next_session;
                        next_session = next_session.wrapping_add(1);
                        info!("New connection from {} (session {})", addr, session);

                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                        }
                        tokio::spawn(session::run_session(
                            stream,
                            addr,
                            session,
                            events_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }

                if events_tx.is_closed() {
                    break;
                }
            }
        });
    }

    /// Spawns task that pushes resolved deliveries into the session queues
    fn spawn_network_sender(&mut self) {
        let Some(mut deliveries_rx) = self.deliveries_rx.take() else {
            return;
        };
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            while let Some(delivery) = deliveries_rx.recv().await {
                for session in delivery.push() {
                    if events_tx
                        .send(ServerEvent::Disconnected { session })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn relay(&self, outbound: Outbound) {
        if let Err(e) = self.outbox_tx.send(outbound) {
            error!("Failed to queue outbound message: {}", e);
        }
    }

    /// Applies one event and hands everything it emitted to the network
    /// sender. Returns false when the loop should stop.
    fn handle_event(&mut self, event: ServerEvent) -> bool {
        let keep_running = self.apply_event(event);
        self.flush_outbox();
        keep_running
    }

    fn apply_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::Joined {
                session,
                addr,
                name,
                handle,
            } => {
                let name = self.registry.register(session, &name, addr, handle);
                self.room.player_joined(&name);
            }

            ServerEvent::Inbound { session, message } => {
                match self.registry.name_of(session).map(str::to_string) {
                    Some(name) => self.handle_message(&name, message),
                    None => debug!("Ignoring message from unregistered session {}", session),
                }
            }

            ServerEvent::Disconnected { session } => {
                if let Some(client) = self.registry.unregister(session) {
                    self.room.player_left(&client.name);
                }
            }

            ServerEvent::TimerTick { round } => {
                self.room.on_timer_tick(round);
            }

            ServerEvent::Shutdown => return false,
        }
        true
    }

    /// Resolves queued messages against the sessions registered right now
    fn flush_outbox(&mut self) {
        while let Ok(outbound) = self.outbox_rx.try_recv() {
            let delivery = self.registry.resolve(&outbound);
            if delivery.is_empty() {
                continue;
            }
            if self.deliveries_tx.send(delivery).is_err() {
                error!("Network sender stopped, dropping outbound message");
            }
        }
    }

    /// Session dispatch: relays chat and drawing, feeds the room
    fn handle_message(&mut self, name: &str, message: ClientMessage) {
        debug!("{} -> {}", name, message);

        match message {
            ClientMessage::Chat { text } => {
                self.relay(Outbound::to_all(ServerMessage::Chat {
                    sender: name.to_string(),
                    text: text.clone(),
                }));
                self.room.answer_submitted(name, &text);
            }
            ClientMessage::Draw { payload } => {
                self.relay(Outbound::all_except(name, ServerMessage::Draw { payload }));
            }
            ClientMessage::Clear => {
                self.relay(Outbound::to_all(ServerMessage::Clear));
            }
            ClientMessage::Start => {
                if !self.room.start_requested() {
                    debug!("Start from {} ignored", name);
                }
            }
        }
    }

    /// Main server loop: the only place game state is mutated
    pub async fn run(mut self) -> ServerResult<()> {
        self.spawn_acceptor();
        self.spawn_network_sender();

        info!("Server started successfully");

        while let Some(event) = self.events_rx.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        if !self.registry.is_empty() {
            warn!(
                "Shutting down with {} player(s) connected",
                self.registry.len()
            );
        }
        info!("Server shutting down");
        Ok(())
    }
}
