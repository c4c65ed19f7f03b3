// Wire envelopes exchanged over the live channel.
//
// Inbound:  {"type":"games_update","data":[...]}
//           {"type":"plays_update","gameId":"...","data":[...]}
// Outbound: {"type":"subscribe_game","gameId":"..."}
//           {"type":"request_plays","gameId":"..."}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{GameState, PlayEvent};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed channel message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot of every game the server knows about.
    GamesUpdate { data: Vec<GameState> },
    /// New plays for a single game. May repeat plays already delivered.
    PlaysUpdate {
        #[serde(rename = "gameId")]
        game_id: String,
        data: Vec<PlayEvent>,
    },
}

/// Requests sent by the client. Both are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeGame {
        #[serde(rename = "gameId")]
        game_id: String,
    },
    RequestPlays {
        #[serde(rename = "gameId")]
        game_id: String,
    },
}

impl ServerMessage {
    /// Parse a raw text frame. Unknown `type` values and missing fields are
    /// reported as [`ProtocolError::Malformed`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_games_update() {
        let text = r#"{"type":"games_update","data":[{
            "id":"g1",
            "homeTeam":{"id":"KC","name":"Kansas City"},
            "awayTeam":{"id":"BUF","name":"Buffalo"},
            "status":"final",
            "startTime":"2026-01-18T20:00:00Z"
        }]}"#;
        match ServerMessage::parse(text).unwrap() {
            ServerMessage::GamesUpdate { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].id, "g1");
            }
            other => panic!("expected GamesUpdate, got {other:?}"),
        }
    }

    #[test]
    fn parses_plays_update_with_game_id() {
        let text = r#"{"type":"plays_update","gameId":"g7","data":[
            {"id":"p1","gameId":"g7","playType":"pass","yards":12,"description":"Deep right"}
        ]}"#;
        match ServerMessage::parse(text).unwrap() {
            ServerMessage::PlaysUpdate { game_id, data } => {
                assert_eq!(game_id, "g7");
                assert_eq!(data[0].yards, 12);
            }
            other => panic!("expected PlaysUpdate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = ServerMessage::parse(r#"{"type":"score_alert","data":[]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn plays_update_without_game_id_is_malformed() {
        assert!(ServerMessage::parse(r#"{"type":"plays_update","data":[]}"#).is_err());
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(ServerMessage::parse("ping").is_err());
    }

    #[test]
    fn client_messages_serialize_with_camel_case_game_id() {
        let json = ClientMessage::SubscribeGame {
            game_id: "g3".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"subscribe_game","gameId":"g3"}"#);

        let json = ClientMessage::RequestPlays {
            game_id: "g3".into(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"request_plays","gameId":"g3"}"#);
    }
}
