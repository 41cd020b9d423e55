//! The shared game room and its round state machine
//!
//! The room is owned by the server event loop, so every transition runs to
//! completion before the next event is looked at. Transitions never write to
//! sockets; they queue `Outbound` messages which the network sender task fans out.

use crate::registry::Outbound;
use crate::timer::{RoundId, RoundTimer};
use crate::words::WordBank;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{guess_points, ServerMessage, DRAWER_POINTS, MIN_PLAYERS, ROUND_DURATION_SECS};
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub words: WordBank,
    pub round_duration: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            words: WordBank::default(),
            round_duration: ROUND_DURATION_SECS,
        }
    }
}

/// The drawer, the secret word and the countdown of the round in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub drawer: String,
    pub word: String,
    pub seconds_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomState {
    Waiting,
    Playing(Round),
}

pub struct Room {
    state: RoomState,
    /// Connected players in join order, which is also the drawing order
    turn_order: Vec<String>,
    scores: HashMap<String, u32>,
    drawer_index: Option<usize>,
    config: RoomConfig,
    rng: StdRng,
    timer: RoundTimer,
    outbox: mpsc::UnboundedSender<Outbound>,
}

impl Room {
    pub fn new(
        config: RoomConfig,
        timer: RoundTimer,
        outbox: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self::with_rng(config, timer, outbox, StdRng::from_entropy())
    }

    pub fn with_rng(
        config: RoomConfig,
        timer: RoundTimer,
        outbox: mpsc::UnboundedSender<Outbound>,
        rng: StdRng,
    ) -> Self {
        Self {
            state: RoomState::Waiting,
            turn_order: Vec::new(),
            scores: HashMap::new(),
            drawer_index: None,
            config,
            rng,
            timer,
            outbox,
        }
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, RoomState::Playing(_))
    }

    pub fn round(&self) -> Option<&Round> {
        match &self.state {
            RoomState::Playing(round) => Some(round),
            RoomState::Waiting => None,
        }
    }

    pub fn current_drawer(&self) -> Option<&str> {
        self.round().map(|round| round.drawer.as_str())
    }

    pub fn current_word(&self) -> Option<&str> {
        self.round().map(|round| round.word.as_str())
    }

    pub fn players(&self) -> &[String] {
        &self.turn_order
    }

    pub fn score_of(&self, name: &str) -> Option<u32> {
        self.scores.get(name).copied()
    }

    /// Roster with scores, in turn order
    pub fn scores(&self) -> Vec<(String, u32)> {
        self.turn_order
            .iter()
            .map(|name| (name.clone(), self.scores.get(name).copied().unwrap_or(0)))
            .collect()
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn player_joined(&mut self, name: &str) {
        if self.scores.contains_key(name) {
            error!("Player '{}' is already in the room", name);
            return;
        }

        self.turn_order.push(name.to_string());
        self.scores.insert(name.to_string(), 0);
        info!("'{}' joined, {} player(s) in room", name, self.turn_order.len());

        self.emit(Outbound::to_all(ServerMessage::system(format!("JOIN:{}", name))));
        self.emit_scores();

        // Bring a late joiner up to date with the round in progress
        if let RoomState::Playing(round) = &self.state {
            let catch_up = [
                ServerMessage::GameStart,
                ServerMessage::NewRound {
                    drawer: round.drawer.clone(),
                },
                ServerMessage::Time {
                    seconds: round.seconds_remaining,
                },
                ServerMessage::hint_for(&round.word),
            ];
            for message in catch_up {
                self.emit(Outbound::only(name, message));
            }
        }
    }

    /// Removes a departed player. Returns false if they were not in the room.
    pub fn player_left(&mut self, name: &str) -> bool {
        let Some(index) = self.turn_order.iter().position(|player| player == name) else {
            debug!("'{}' already left the room", name);
            return false;
        };

        self.turn_order.remove(index);
        self.scores.remove(name);
        info!("'{}' left, {} player(s) in room", name, self.turn_order.len());

        if self.is_playing() && self.turn_order.len() < MIN_PLAYERS {
            self.end_game();
            self.announce_leave(name);
            return true;
        }
        self.announce_leave(name);

        let RoomState::Playing(round) = &self.state else {
            return true;
        };

        let Some(drawer_index) = self.drawer_index else {
            return true;
        };

        if index < drawer_index {
            self.drawer_index = Some(drawer_index - 1);
        } else if index == drawer_index {
            // The drawer walked out: reveal the word and hand the turn to
            // whoever followed them
            let word = round.word.clone();
            self.emit(Outbound::to_all(ServerMessage::system(format!(
                "{} left the game. The answer was: {}",
                name, word
            ))));
            self.drawer_index = Some(if index == 0 {
                self.turn_order.len() - 1
            } else {
                index - 1
            });
            self.timer.stop();
            self.advance_round();
        }
        true
    }

    /// Starts a game if the room is waiting with enough players.
    /// Anything else is ignored.
    pub fn start_requested(&mut self) -> bool {
        if self.is_playing() {
            debug!("Start requested while a game is running, ignoring");
            return false;
        }
        if self.turn_order.len() < MIN_PLAYERS {
            debug!(
                "Start requested with {} player(s), need {}",
                self.turn_order.len(),
                MIN_PLAYERS
            );
            return false;
        }

        for score in self.scores.values_mut() {
            *score = 0;
        }
        self.drawer_index = None;
        info!("Game started with {} players", self.turn_order.len());

        self.emit(Outbound::to_all(ServerMessage::GameStart));
        self.emit_scores();
        self.advance_round();
        true
    }

    /// Checks a chat line against the secret word. Returns true if it won the round.
    pub fn answer_submitted(&mut self, name: &str, text: &str) -> bool {
        let RoomState::Playing(round) = &self.state else {
            return false;
        };
        if round.drawer == name || !self.scores.contains_key(name) {
            return false;
        }
        if !answer_matches(&round.word, text) {
            return false;
        }

        let points = guess_points(round.seconds_remaining);
        let drawer = round.drawer.clone();
        info!(
            "'{}' guessed '{}' with {}s left (+{}), drawer '{}' +{}",
            name, round.word, round.seconds_remaining, points, drawer, DRAWER_POINTS
        );

        if let Some(score) = self.scores.get_mut(name) {
            *score += points;
        }
        if let Some(score) = self.scores.get_mut(&drawer) {
            *score += DRAWER_POINTS;
        }

        self.emit(Outbound::to_all(ServerMessage::Correct {
            name: name.to_string(),
            points,
        }));
        self.emit_scores();
        self.advance_round();
        true
    }

    /// One countdown step. Ticks from a replaced or stopped timer are dropped.
    pub fn on_timer_tick(&mut self, round_id: RoundId) {
        if !self.timer.is_current(round_id) {
            debug!("Dropping stale tick from round timer {}", round_id);
            return;
        }
        let RoomState::Playing(round) = &mut self.state else {
            return;
        };

        round.seconds_remaining = round.seconds_remaining.saturating_sub(1);
        let seconds = round.seconds_remaining;
        self.emit(Outbound::to_all(ServerMessage::Time { seconds }));

        if seconds == 0 {
            self.round_timeout();
        }
    }

    /// Ends the current round unanswered and moves on to the next drawer
    pub fn round_timeout(&mut self) {
        let RoomState::Playing(round) = &self.state else {
            return;
        };

        let word = round.word.clone();
        info!("Round timed out, the word was '{}'", word);
        self.timer.stop();
        self.emit(Outbound::to_all(ServerMessage::system(format!(
            "Time's up! The answer was: {}",
            word
        ))));
        self.advance_round();
    }

    fn end_game(&mut self) {
        info!("Not enough players, game stopped");
        self.state = RoomState::Waiting;
        self.drawer_index = None;
        self.timer.stop();

        self.emit(Outbound::to_all(ServerMessage::GameEnd));
        self.emit(Outbound::to_all(ServerMessage::system(
            "Not enough players. Game stopped.",
        )));
    }

    fn advance_round(&mut self) {
        if self.turn_order.is_empty() {
            return;
        }

        let next = self
            .drawer_index
            .map_or(0, |index| (index + 1) % self.turn_order.len());
        self.drawer_index = Some(next);

        let drawer = self.turn_order[next].clone();
        let word = self.config.words.pick(&mut self.rng).to_string();
        let seconds = self.config.round_duration;
        info!("New round - drawer: {}, word: {}", drawer, word);

        self.emit(Outbound::to_all(ServerMessage::Clear));
        self.emit(Outbound::to_all(ServerMessage::NewRound {
            drawer: drawer.clone(),
        }));
        self.emit(Outbound::to_all(ServerMessage::Time { seconds }));
        self.timer.start();
        self.emit(Outbound::only(
            &drawer,
            ServerMessage::Word { word: word.clone() },
        ));
        self.emit(Outbound::all_except(&drawer, ServerMessage::hint_for(&word)));

        self.state = RoomState::Playing(Round {
            drawer,
            word,
            seconds_remaining: seconds,
        });
    }

    fn announce_leave(&self, name: &str) {
        self.emit(Outbound::to_all(ServerMessage::system(format!("LEAVE:{}", name))));
        self.emit_scores();
    }

    fn emit_scores(&self) {
        self.emit(Outbound::to_all(ServerMessage::Players {
            scores: self.scores(),
        }));
    }

    fn emit(&self, outbound: Outbound) {
        if self.outbox.send(outbound).is_err() {
            error!("Outbound queue closed, dropping message");
        }
    }
}

/// Case-insensitive match of a guess against the secret word, ignoring
/// surrounding whitespace
pub fn answer_matches(word: &str, guess: &str) -> bool {
    guess.trim().to_lowercase() == word.to_lowercase()
}
