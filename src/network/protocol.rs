//! Protocol Messages
//!
//! Push frames use the named-event text format:
//!
//! ```text
//! event: <name>
//! data: <line 1>
//! data: <line 2>
//!
//! ```
//!
//! Client commands and direct replies on the WebSocket front-end are JSON.

use serde::{Serialize, Deserialize};

use crate::game::state::GameError;

/// Encode one push frame.
///
/// `\r\n` is normalized to `\n`, then every line break in the payload
/// starts a new `data:` line. The frame ends with a blank line.
pub fn encode_event(event: &str, payload: &str) -> String {
    let payload = payload.replace("\r\n", "\n").replace('\n', "\ndata: ");
    format!("event: {event}\ndata: {payload}\n\n")
}

/// Event name for direct replies to a client command.
pub const REPLY_EVENT: &str = "reply";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present the per-browser player id. Must come first.
    Identify {
        /// Opaque id. Omitted by a browser that has none yet.
        #[serde(default)]
        player_id: Option<String>,
    },

    /// Join the game.
    Join {
        /// Display name.
        name: String,
    },

    /// Leave the game.
    Leave,

    /// Roll the die.
    Roll,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp.
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// SERVER -> CLIENT REPLIES
// =============================================================================

/// Direct reply to one client command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    /// Command accepted.
    Ok,

    /// Identified under a freshly issued id, which the client keeps.
    Identified {
        /// Issued id.
        player_id: String,
    },

    /// Joined; echoes the name.
    Joined {
        /// Display name.
        name: String,
    },

    /// Left; echoes the name.
    Left {
        /// Display name.
        name: String,
    },

    /// Die rolled.
    Rolled {
        /// Face rolled.
        roll: u32,
        /// Player changed cell.
        moved: bool,
        /// A portal was taken.
        teleported: bool,
        /// Player reached the finish.
        completed: bool,
        /// Value of the player's cell now.
        cell_value: u32,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time in ms.
        server_time: u64,
    },

    /// Command rejected.
    Error {
        /// Machine-readable code.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },
}

impl ServerReply {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Encode as a `reply` push frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        Ok(encode_event(REPLY_EVENT, &self.to_json()?))
    }

    /// Build an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerReply::Error {
            code,
            message: message.into(),
        }
    }
}

impl From<&GameError> for ServerReply {
    fn from(err: &GameError) -> Self {
        let code = match err {
            GameError::AlreadyJoined(_) => ErrorCode::AlreadyJoined,
            GameError::NotFound(_) => ErrorCode::NotFound,
            GameError::AlreadyCompleted(_) => ErrorCode::AlreadyCompleted,
            GameError::GameFull { .. } => ErrorCode::GameFull,
            GameError::InvalidRoll(_) | GameError::InvalidName => ErrorCode::InvalidInput,
        };
        ServerReply::error(code, err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed command.
    InvalidInput,
    /// Command sent before `identify`.
    NotIdentified,
    /// Id already playing.
    AlreadyJoined,
    /// Id not playing.
    NotFound,
    /// Player already finished.
    AlreadyCompleted,
    /// Player cap reached.
    GameFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_frame() {
        assert_eq!(encode_event("board", "<div/>"), "event: board\ndata: <div/>\n\n");
    }

    #[test]
    fn test_multi_line_frame() {
        let frame = encode_event("players", "<ul>\n<li>a</li>\r\n</ul>");
        assert_eq!(
            frame,
            "event: players\ndata: <ul>\ndata: <li>a</li>\ndata: </ul>\n\n"
        );
    }

    #[test]
    fn test_empty_payload_frame() {
        assert_eq!(encode_event("dice", ""), "event: dice\ndata: \n\n");
    }

    #[test]
    fn test_trailing_newline_frame() {
        assert_eq!(encode_event("stream", "a\n"), "event: stream\ndata: a\ndata: \n\n");
    }

    #[test]
    fn test_client_message_json() {
        let msg = ClientMessage::from_json(r#"{"type":"identify","player_id":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Identify { player_id: Some("abc".into()) });

        let msg = ClientMessage::from_json(r#"{"type":"identify"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Identify { player_id: None });

        let msg = ClientMessage::from_json(r#"{"type":"join","name":"Alice"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Join { name: "Alice".into() });

        assert_eq!(ClientMessage::from_json(r#"{"type":"roll"}"#).unwrap(), ClientMessage::Roll);
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_reply_frame() {
        let frame = ServerReply::Ok.to_frame().unwrap();
        assert_eq!(frame, "event: reply\ndata: {\"type\":\"ok\"}\n\n");
    }

    #[test]
    fn test_game_error_reply() {
        let reply = ServerReply::from(&GameError::AlreadyJoined("p1".into()));
        let json = reply.to_json().unwrap();
        assert!(json.contains("already_joined"));
        assert!(json.contains("Player already exists"));

        let reply = ServerReply::from(&GameError::InvalidName);
        assert!(matches!(reply, ServerReply::Error { code: ErrorCode::InvalidInput, .. }));
    }
}
