// Game and play data as delivered by the live channel and the polling endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// Lifecycle status of a game as reported by the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    Pregame,
    InProgress,
    Halftime,
    Final,
    Postponed,
    Cancelled,
}

impl GameStatus {
    /// `true` while the game clock is in play or paused at the half.
    pub fn is_live(self) -> bool {
        matches!(self, GameStatus::InProgress | GameStatus::Halftime)
    }

    /// `true` before kickoff. Pregame counts as scheduled.
    pub fn is_upcoming(self) -> bool {
        matches!(self, GameStatus::Scheduled | GameStatus::Pregame)
    }
}

/// A team as referenced from a game card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
}

/// Authoritative state of one game.
///
/// Instances are never patched field by field: a fresh snapshot from the
/// server replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub id: String,
    pub home_team: TeamRef,
    pub away_team: TeamRef,
    #[serde(default)]
    pub home_score: u32,
    #[serde(default)]
    pub away_score: u32,
    pub status: GameStatus,
    /// Current quarter; values above 4 are overtime periods.
    #[serde(default)]
    pub quarter: u8,
    /// Game clock as displayed, e.g. `"12:34"`.
    #[serde(default)]
    pub clock: String,
    /// Team id currently in possession.
    #[serde(default)]
    pub possession: Option<String>,
    #[serde(default)]
    pub down: Option<u8>,
    #[serde(default)]
    pub distance: Option<u8>,
    #[serde(default)]
    pub yard_line: Option<u8>,
    #[serde(default)]
    pub red_zone: bool,
    #[serde(default)]
    pub broadcast: Option<String>,
    /// Scheduled kickoff.
    pub start_time: DateTime<Utc>,
}

impl GameState {
    /// Whether `team_id` is playing in this game (home or away).
    pub fn involves(&self, team_id: &str) -> bool {
        self.home_team.id == team_id || self.away_team.id == team_id
    }

    /// Remaining time on the game clock in seconds, if the clock parses.
    pub fn clock_seconds(&self) -> Option<u32> {
        parse_clock(&self.clock)
    }
}

// ---------------------------------------------------------------------------
// Play events
// ---------------------------------------------------------------------------

/// Kind of play. Types this client does not know about map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayType {
    Rush,
    Pass,
    Punt,
    Kickoff,
    Penalty,
    Timeout,
    Turnover,
    Touchdown,
    FieldGoal,
    ExtraPoint,
    Safety,
    #[serde(other)]
    Other,
}

/// A player involved in a play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: Option<String>,
}

/// A single play within a game. Identified by `id`; the same id delivered
/// twice is the same play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayEvent {
    pub id: String,
    pub game_id: String,
    #[serde(default)]
    pub quarter: u8,
    #[serde(default)]
    pub clock: String,
    /// Team that ran the play.
    #[serde(default)]
    pub team_id: Option<String>,
    pub play_type: PlayType,
    /// Yards gained (negative for a loss).
    #[serde(default)]
    pub yards: i32,
    #[serde(default)]
    pub is_scoring: bool,
    #[serde(default)]
    pub is_turnover: bool,
    #[serde(default)]
    pub is_big_play: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub players: Vec<PlayerRef>,
}

// ---------------------------------------------------------------------------
// Clock parsing
// ---------------------------------------------------------------------------

/// Parse a `M:SS` / `MM:SS` game clock into seconds.
///
/// Fractional seconds (`"0:07.4"`) are truncated. Returns `None` for anything
/// that is not a well-formed clock, including seconds of 60 or more.
pub fn parse_clock(clock: &str) -> Option<u32> {
    let (minutes, seconds) = clock.trim().split_once(':')?;
    let seconds = seconds.split('.').next()?;
    if minutes.is_empty() || seconds.len() != 2 {
        return None;
    }
    if !minutes.bytes().all(|b| b.is_ascii_digit()) || !seconds.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    minutes.checked_mul(60)?.checked_add(seconds)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_clock_accepts_common_formats() {
        assert_eq!(parse_clock("15:00"), Some(900));
        assert_eq!(parse_clock("1:45"), Some(105));
        assert_eq!(parse_clock("2:00"), Some(120));
        assert_eq!(parse_clock("0:00"), Some(0));
        assert_eq!(parse_clock(" 0:07.4 "), Some(7));
    }

    #[test]
    fn parse_clock_rejects_garbage() {
        assert_eq!(parse_clock(""), None);
        assert_eq!(parse_clock("Halftime"), None);
        assert_eq!(parse_clock("1:5"), None);
        assert_eq!(parse_clock("1:75"), None);
        assert_eq!(parse_clock(":30"), None);
        assert_eq!(parse_clock("-1:30"), None);
        assert_eq!(parse_clock("4294967295:00"), None);
        assert_eq!(parse_clock("99999999999:00"), None);
    }

    #[test]
    fn game_state_deserializes_camel_case() {
        let json = r#"{
            "id": "g1",
            "homeTeam": { "id": "KC", "name": "Kansas City" },
            "awayTeam": { "id": "BUF", "name": "Buffalo", "abbreviation": "BUF" },
            "homeScore": 21,
            "awayScore": 17,
            "status": "in_progress",
            "quarter": 4,
            "clock": "1:45",
            "possession": "KC",
            "down": 3,
            "distance": 7,
            "yardLine": 18,
            "redZone": true,
            "broadcast": "CBS",
            "startTime": "2026-01-18T20:00:00Z"
        }"#;
        let game: GameState = serde_json::from_str(json).unwrap();
        assert_eq!(game.status, GameStatus::InProgress);
        assert_eq!(game.yard_line, Some(18));
        assert!(game.red_zone);
        assert_eq!(game.clock_seconds(), Some(105));
        assert!(game.involves("BUF"));
        assert!(!game.involves("NE"));
    }

    #[test]
    fn game_state_optional_fields_default() {
        let json = r#"{
            "id": "g2",
            "homeTeam": { "id": "DAL", "name": "Dallas" },
            "awayTeam": { "id": "NYG", "name": "New York" },
            "status": "scheduled",
            "startTime": "2026-01-18T20:00:00Z"
        }"#;
        let game: GameState = serde_json::from_str(json).unwrap();
        assert_eq!(game.home_score, 0);
        assert_eq!(game.quarter, 0);
        assert!(game.possession.is_none());
        assert!(!game.red_zone);
    }

    #[test]
    fn unknown_play_type_maps_to_other() {
        let json = r#"{
            "id": "p1",
            "gameId": "g1",
            "playType": "two_point_conversion",
            "yards": 2
        }"#;
        let play: PlayEvent = serde_json::from_str(json).unwrap();
        assert_eq!(play.play_type, PlayType::Other);
        assert!(play.players.is_empty());
    }

    #[test]
    fn status_helpers() {
        assert!(GameStatus::Halftime.is_live());
        assert!(!GameStatus::Final.is_live());
        assert!(GameStatus::Pregame.is_upcoming());
        assert!(!GameStatus::Postponed.is_upcoming());
    }
}
