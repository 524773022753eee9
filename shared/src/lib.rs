//! Wire protocol shared between the viewer client and its tests.
//!
//! Every message is a single JSON object whose `action` field selects the
//! variant. Inbound messages decode into [`ServerMessage`], outbound
//! commands encode from [`ClientMessage`].

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub type PlayerId = String;
pub type AvatarId = String;

/// Actions the client knows how to handle.
pub const SERVER_ACTIONS: [&str; 5] = [
    "join_game",
    "players_moved",
    "player_joined",
    "player_left",
    "chat",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[serde(alias = "up")]
    North,
    #[default]
    #[serde(alias = "down")]
    South,
    #[serde(alias = "right")]
    East,
    #[serde(alias = "left")]
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

/// Full player record as sent in `join_game` and `player_joined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default, deserialize_with = "id_or_empty")]
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub facing: Facing,
    #[serde(default)]
    pub animation_frame: u32,
    #[serde(default)]
    pub avatar: Option<AvatarId>,
    #[serde(default)]
    pub username: String,
}

/// Partial record carried by `players_moved`; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub facing: Option<Facing>,
    #[serde(default)]
    pub animation_frame: Option<u32>,
}

/// Frame sources for each facing. An empty `west` list means "mirror east".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionalFrames {
    #[serde(default)]
    pub north: Vec<String>,
    #[serde(default)]
    pub south: Vec<String>,
    #[serde(default)]
    pub east: Vec<String>,
    #[serde(default)]
    pub west: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub frames: DirectionalFrames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGame {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub players: HashMap<PlayerId, PlayerRecord>,
    #[serde(default)]
    pub avatars: HashMap<AvatarId, AvatarDescriptor>,
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinGame(JoinGame),
    PlayersMoved {
        players: HashMap<PlayerId, PlayerUpdate>,
    },
    PlayerJoined {
        player: PlayerRecord,
        #[serde(default)]
        avatar: Option<AvatarDescriptor>,
    },
    PlayerLeft {
        #[serde(rename = "playerId", deserialize_with = "required_id")]
        player_id: PlayerId,
    },
    Chat {
        username: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("payload has no string `action` field")]
    MissingAction,

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("malformed `{action}` message: {source}")]
    Malformed {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ServerMessage {
    /// Decodes one text frame, classifying why it was rejected.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(ProtocolError::NotJson)?;

        let action = match value.get("action").and_then(serde_json::Value::as_str) {
            Some(action) => action.to_owned(),
            None => return Err(ProtocolError::MissingAction),
        };

        if !SERVER_ACTIONS.contains(&action.as_str()) {
            return Err(ProtocolError::UnknownAction(action));
        }

        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { action, source })
    }

    pub fn action(&self) -> &'static str {
        match self {
            ServerMessage::JoinGame(_) => "join_game",
            ServerMessage::PlayersMoved { .. } => "players_moved",
            ServerMessage::PlayerJoined { .. } => "player_joined",
            ServerMessage::PlayerLeft { .. } => "player_left",
            ServerMessage::Chat { .. } => "chat",
        }
    }
}

/// Body of a `move` command: either a step in one direction or a target point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MoveTarget {
    Direction { direction: Direction },
    Point { x: i32, y: i32 },
}

/// Client to server commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinGame { username: String },
    Move(MoveTarget),
    Stop,
    Chat { message: String },
}

impl ClientMessage {
    pub fn step(direction: Direction) -> Self {
        ClientMessage::Move(MoveTarget::Direction { direction })
    }

    pub fn move_to(x: i32, y: i32) -> Self {
        ClientMessage::Move(MoveTarget::Point { x, y })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Servers send ids either as JSON strings or as bare numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for PlayerId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PlayerId, D::Error> {
    RawId::deserialize(deserializer).map(PlayerId::from)
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PlayerId>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(PlayerId::from))
}

fn id_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PlayerId, D::Error> {
    Ok(optional_id(deserializer)?.unwrap_or_default())
}
