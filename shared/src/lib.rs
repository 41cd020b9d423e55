use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 12345;
pub const ROUND_DURATION_SECS: u32 = 90;
pub const MIN_PLAYERS: usize = 2;
pub const BASE_GUESS_POINTS: u32 = 50;
pub const POINTS_PER_SECOND_LEFT: u32 = 2;
pub const DRAWER_POINTS: u32 = 30;

/// Points awarded to a correct guesser with `seconds_remaining` left on the clock
pub fn guess_points(seconds_remaining: u32) -> u32 {
    BASE_GUESS_POINTS + POINTS_PER_SECOND_LEFT * seconds_remaining
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,

    #[error("unknown message type '{0}'")]
    UnknownTag(String),

    #[error("{0} message is missing its payload")]
    MissingPayload(&'static str),

    #[error("{0} message takes no payload")]
    UnexpectedPayload(&'static str),

    #[error("unknown draw action '{0}'")]
    UnknownDrawAction(String),

    #[error("DRAW:{action} expects {expected} fields, got {got}")]
    FieldCount {
        action: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Lines sent from a client to the server, after the name handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Chat {
        text: String,
    },
    /// `payload` is everything after `DRAW:`, kept verbatim for relaying
    Draw {
        payload: String,
    },
    Clear,
    Start,
}

impl ClientMessage {
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }

        let (tag, rest) = match line.split_once(':') {
            Some((tag, rest)) => (tag, Some(rest)),
            None => (line, None),
        };

        match tag {
            "CHAT" => {
                let text = rest.ok_or(DecodeError::MissingPayload("CHAT"))?;
                Ok(ClientMessage::Chat {
                    text: text.to_string(),
                })
            }
            "DRAW" => {
                let payload = rest.ok_or(DecodeError::MissingPayload("DRAW"))?;
                validate_draw_payload(payload)?;
                Ok(ClientMessage::Draw {
                    payload: payload.to_string(),
                })
            }
            "CLEAR" => match rest {
                None => Ok(ClientMessage::Clear),
                Some(_) => Err(DecodeError::UnexpectedPayload("CLEAR")),
            },
            "START" => match rest {
                None => Ok(ClientMessage::Start),
                Some(_) => Err(DecodeError::UnexpectedPayload("START")),
            },
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

/// Checks only the field count of a draw payload. Coordinates and colours
/// are relayed untouched, the server never interprets them.
fn validate_draw_payload(payload: &str) -> Result<(), DecodeError> {
    let fields: Vec<&str> = payload.split(':').collect();
    let (action, expected) = match fields[0] {
        "PRESS" => ("PRESS", 4),
        "DRAG" => ("DRAG", 6),
        other => return Err(DecodeError::UnknownDrawAction(other.to_string())),
    };

    if fields.len() != expected {
        return Err(DecodeError::FieldCount {
            action,
            expected,
            got: fields.len(),
        });
    }
    Ok(())
}

impl FromStr for ClientMessage {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientMessage::decode(s)
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Chat { text } => write!(f, "CHAT:{}", text),
            ClientMessage::Draw { payload } => write!(f, "DRAW:{}", payload),
            ClientMessage::Clear => f.write_str("CLEAR"),
            ClientMessage::Start => f.write_str("START"),
        }
    }
}

/// Lines sent from the server to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Chat { sender: String, text: String },
    System { text: String },
    Draw { payload: String },
    Clear,
    GameStart,
    GameEnd,
    NewRound { drawer: String },
    Word { word: String },
    Hint { length: usize },
    Correct { name: String, points: u32 },
    Time { seconds: u32 },
    Players { scores: Vec<(String, u32)> },
}

impl ServerMessage {
    pub fn system(text: impl Into<String>) -> Self {
        ServerMessage::System { text: text.into() }
    }

    /// Hint for non-drawers: the word's length in characters
    pub fn hint_for(word: &str) -> Self {
        ServerMessage::Hint {
            length: word.chars().count(),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Chat { sender, text } => write!(f, "CHAT:{}:{}", sender, text),
            ServerMessage::System { text } => write!(f, "SYSTEM:{}", text),
            ServerMessage::Draw { payload } => write!(f, "DRAW:{}", payload),
            ServerMessage::Clear => f.write_str("CLEAR"),
            ServerMessage::GameStart => f.write_str("GAME:START"),
            ServerMessage::GameEnd => f.write_str("GAME:END"),
            ServerMessage::NewRound { drawer } => write!(f, "NEW:ROUND:Drawer is {}", drawer),
            ServerMessage::Word { word } => write!(f, "WORD:{}", word),
            ServerMessage::Hint { length } => write!(f, "HINT:{}", length),
            ServerMessage::Correct { name, points } => {
                write!(f, "CORRECT:{} (+{} pt)", name, points)
            }
            ServerMessage::Time { seconds } => write!(f, "TIME:{}", seconds),
            ServerMessage::Players { scores } => {
                f.write_str("PLAYERS:")?;
                for (i, (name, score)) in scores.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{} ({})", name, score)?;
                }
                Ok(())
            }
        }
    }
}
