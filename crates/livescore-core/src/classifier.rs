// Feed classification: ranks games by how much they deserve the user's
// attention right now.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::model::{GameState, GameStatus};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Final stretch of the fourth quarter that counts as the two-minute warning.
pub const TWO_MINUTE_WARNING_SECONDS: u32 = 120;

/// How far ahead a favorite's kickoff is announced as "starts soon".
pub const STARTS_SOON_WINDOW_MINUTES: i64 = 60;

/// Kickoffs this close are featured.
pub const IMMINENT_START_MINUTES: i64 = 15;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Team ids the user follows. Owned elsewhere; the classifier only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteSet(HashSet<String>);

impl FavoriteSet {
    pub fn new<I, S>(teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FavoriteSet(teams.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, team_id: &str) -> bool {
        self.0.contains(team_id)
    }

    /// Whether either side of `game` is a favorite.
    pub fn involves(&self, game: &GameState) -> bool {
        self.contains(&game.home_team.id) || self.contains(&game.away_team.id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a game is in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedTag {
    Overtime,
    TwoMinuteWarning,
    FourthQuarter,
    Live,
    StartsSoon { minutes: u32 },
    Upcoming,
    WhatYouMissed,
    Final,
}

impl fmt::Display for FeedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedTag::Overtime => write!(f, "overtime"),
            FeedTag::TwoMinuteWarning => write!(f, "two_minute_warning"),
            FeedTag::FourthQuarter => write!(f, "fourth_quarter"),
            FeedTag::Live => write!(f, "live"),
            FeedTag::StartsSoon { minutes } => write!(f, "starts_soon ({minutes} min)"),
            FeedTag::Upcoming => write!(f, "upcoming"),
            FeedTag::WhatYouMissed => write!(f, "what_you_missed"),
            FeedTag::Final => write!(f, "final"),
        }
    }
}

/// One ranked entry of the feed. Derived on every recompute; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub game: GameState,
    pub tag: FeedTag,
    pub priority: u8,
    pub featured: bool,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Build the ranked feed for `games`.
///
/// Pure: the same games, favorites and `now` always yield the same list.
/// Postponed and cancelled games are left out. Items are ordered by
/// descending priority; equal priorities keep the order of `games`.
pub fn classify(games: &[GameState], favorites: &FavoriteSet, now: DateTime<Utc>) -> Vec<FeedItem> {
    let mut feed: Vec<FeedItem> = games
        .iter()
        .filter_map(|game| {
            let favorite = favorites.involves(game);
            classify_game(game, favorite, now).map(|(tag, priority, featured)| FeedItem {
                game: game.clone(),
                tag,
                priority,
                featured,
            })
        })
        .collect();

    // `sort_by` is stable, which keeps ties in input order.
    feed.sort_by(|a, b| b.priority.cmp(&a.priority));
    feed
}

/// Tag, priority and featured flag for a single game, or `None` when the
/// game does not belong in the feed.
fn classify_game(
    game: &GameState,
    favorite: bool,
    now: DateTime<Utc>,
) -> Option<(FeedTag, u8, bool)> {
    let status = game.status;

    if status.is_live() {
        let overtime = game.quarter > 4;
        let fourth = game.quarter == 4;

        return Some(if favorite {
            if overtime {
                (FeedTag::Overtime, 100, true)
            } else if fourth && in_two_minute_window(game) {
                (FeedTag::TwoMinuteWarning, 95, true)
            } else if fourth {
                (FeedTag::FourthQuarter, 90, true)
            } else {
                (FeedTag::Live, 85, true)
            }
        } else if overtime {
            (FeedTag::Overtime, 80, false)
        } else if fourth {
            (FeedTag::FourthQuarter, 70, false)
        } else {
            (FeedTag::Live, 60, false)
        });
    }

    if status.is_upcoming() {
        if !favorite {
            return Some((FeedTag::Upcoming, 20, false));
        }
        return Some(match minutes_until(game.start_time, now) {
            Some(minutes) if minutes <= IMMINENT_START_MINUTES => (
                FeedTag::StartsSoon {
                    minutes: minutes as u32,
                },
                75,
                true,
            ),
            Some(minutes) => (
                FeedTag::StartsSoon {
                    minutes: minutes as u32,
                },
                50,
                false,
            ),
            None => (FeedTag::Upcoming, 40, false),
        });
    }

    match status {
        GameStatus::Final if favorite => Some((FeedTag::WhatYouMissed, 30, false)),
        GameStatus::Final => Some((FeedTag::Final, 10, false)),
        _ => None,
    }
}

/// Whether a fourth-quarter clock reads 2:00 or less. An unreadable clock is
/// never inside the window.
fn in_two_minute_window(game: &GameState) -> bool {
    game.quarter == 4
        && game
            .clock_seconds()
            .is_some_and(|secs| secs <= TWO_MINUTE_WARNING_SECONDS)
}

/// Whole minutes (rounded up) until `start`, if kickoff is within the
/// starts-soon window and not already past.
fn minutes_until(start: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let secs = (start - now).num_seconds();
    if secs < 0 || secs > STARTS_SOON_WINDOW_MINUTES * 60 {
        return None;
    }
    Some((secs + 59) / 60)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
