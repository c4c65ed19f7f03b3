// Keyed in-memory collections of games and plays.
//
// Games follow full-snapshot semantics: every update carries the complete set
// and replaces whatever was there before. Plays are append-only per game,
// deduplicated by play id and bounded to a rolling window of the most recent
// entries.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::model::{GameState, PlayEvent};
use crate::protocol::ServerMessage;

/// Number of plays retained per game unless configured otherwise.
pub const DEFAULT_PLAY_WINDOW: usize = 50;

/// What a store mutation changed. Used by the caller to decide what to
/// recompute and publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The game collection was replaced; `count` games are now held.
    Games { count: usize },
    /// `added` previously unseen plays were appended for `game_id`.
    Plays { game_id: String, added: usize },
}

#[derive(Debug, Clone)]
pub struct GameStore {
    /// Games in snapshot order.
    games: Vec<GameState>,
    /// Game id -> position in `games`.
    index: HashMap<String, usize>,
    /// Game id -> plays in arrival order, oldest first.
    plays: HashMap<String, Vec<PlayEvent>>,
    play_window: usize,
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new(DEFAULT_PLAY_WINDOW)
    }
}

impl GameStore {
    /// Create an empty store keeping at most `play_window` plays per game.
    /// A window of zero is treated as one.
    pub fn new(play_window: usize) -> Self {
        GameStore {
            games: Vec::new(),
            index: HashMap::new(),
            plays: HashMap::new(),
            play_window: play_window.max(1),
        }
    }

    pub fn play_window(&self) -> usize {
        self.play_window
    }

    /// Replace the entire game collection with `snapshot`.
    ///
    /// No entry from the previous snapshot survives. If the snapshot lists
    /// the same id twice, the later entry wins and keeps the position of the
    /// first.
    pub fn replace_games(&mut self, snapshot: Vec<GameState>) -> StoreChange {
        let mut games: Vec<GameState> = Vec::with_capacity(snapshot.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(snapshot.len());

        for game in snapshot {
            match index.get(&game.id) {
                Some(&pos) => {
                    debug!("Duplicate game id {} in snapshot, keeping latest", game.id);
                    games[pos] = game;
                }
                None => {
                    index.insert(game.id.clone(), games.len());
                    games.push(game);
                }
            }
        }

        self.games = games;
        self.index = index;
        StoreChange::Games {
            count: self.games.len(),
        }
    }

    /// Append unseen plays for `game_id`, then trim to the rolling window.
    ///
    /// Plays whose id is already held for the game (or repeats within the
    /// batch) are skipped, so re-delivery never grows the list. Plays that
    /// have already been trimmed out of the window are not remembered and
    /// would be appended again.
    pub fn merge_plays(&mut self, game_id: &str, incoming: Vec<PlayEvent>) -> StoreChange {
        let list = self.plays.entry(game_id.to_string()).or_default();
        let mut seen: HashSet<String> = list.iter().map(|p| p.id.clone()).collect();

        let mut added = 0;
        for play in incoming {
            if play.game_id != game_id {
                debug!(
                    "Play {} tagged with game {} delivered for game {}",
                    play.id, play.game_id, game_id
                );
            }
            if seen.insert(play.id.clone()) {
                list.push(play);
                added += 1;
            }
        }

        if list.len() > self.play_window {
            let excess = list.len() - self.play_window;
            list.drain(..excess);
        }

        StoreChange::Plays {
            game_id: game_id.to_string(),
            added,
        }
    }

    /// Apply a parsed server message.
    pub fn apply(&mut self, message: ServerMessage) -> StoreChange {
        match message {
            ServerMessage::GamesUpdate { data } => self.replace_games(data),
            ServerMessage::PlaysUpdate { game_id, data } => self.merge_plays(&game_id, data),
        }
    }

    /// Games in snapshot order.
    pub fn games(&self) -> &[GameState] {
        &self.games
    }

    pub fn game(&self, id: &str) -> Option<&GameState> {
        self.index.get(id).map(|&pos| &self.games[pos])
    }

    /// Plays held for `game_id`, oldest first. Empty if none arrived yet.
    pub fn plays(&self, game_id: &str) -> &[PlayEvent] {
        self.plays.get(game_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
