// Polling fallback: refetches the full game list over HTTP on a fixed
// interval while the live channel is not open.
//
// `PollingFallback` owns the timer and the in-flight fetch; the coordinator
// calls `sync` after every channel status change, `on_tick` when the deadline
// passes, and `accepts` before applying a result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livescore_core::model::GameState;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::channel::ChannelStatus;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("games request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("games endpoint returned status {0}")]
    Status(StatusCode),
}

/// Where full game snapshots come from.
#[async_trait]
pub trait GamesSource: Send + Sync {
    async fn fetch_games(&self) -> Result<Vec<GameState>, FetchError>;
}

/// `GET {base_url}{games_path}` returning a JSON array of games.
pub struct HttpGamesSource {
    http: reqwest::Client,
    url: Url,
}

impl HttpGamesSource {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        HttpGamesSource { http, url }
    }
}

#[async_trait]
impl GamesSource for HttpGamesSource {
    async fn fetch_games(&self) -> Result<Vec<GameState>, FetchError> {
        let response = self.http.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.json::<Vec<GameState>>().await?)
    }
}

/// Outcome of one fetch, tagged with the activation it was started under.
#[derive(Debug)]
pub struct PollResult {
    pub generation: u64,
    pub result: Result<Vec<GameState>, FetchError>,
}

pub struct PollingFallback {
    interval: Duration,
    active: bool,
    next_tick: Option<Instant>,
    /// Bumped on every deactivation so results from an earlier activation
    /// are recognisable.
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl PollingFallback {
    pub fn new(interval: Duration) -> Self {
        PollingFallback {
            interval,
            active: false,
            next_tick: None,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Match polling to the channel: active exactly while the channel is not
    /// open. Returns whether activity changed.
    pub fn sync(&mut self, channel: ChannelStatus, now: Instant) -> bool {
        let should_poll = channel != ChannelStatus::Open;
        if should_poll == self.active {
            return false;
        }
        if should_poll {
            info!("Live channel {channel}, polling every {:?}", self.interval);
            self.active = true;
            self.next_tick = Some(now + self.interval);
        } else {
            info!("Live channel open, polling stopped");
            self.deactivate();
        }
        true
    }

    /// Called when the poll deadline passes. Schedules the next tick and
    /// returns whether a fetch should be started now.
    pub fn on_tick(&mut self, online: bool, now: Instant) -> bool {
        if !self.active {
            self.next_tick = None;
            return false;
        }
        self.next_tick = Some(now + self.interval);

        if !online {
            debug!("Offline, skipping poll");
            return false;
        }
        if self.is_fetching() {
            debug!("Previous poll still in flight, skipping");
            return false;
        }
        true
    }

    /// Spawn a fetch that reports to `results`.
    pub fn start_fetch(&mut self, source: Arc<dyn GamesSource>, results: mpsc::Sender<PollResult>) {
        let generation = self.generation;
        debug!("Polling games (generation {generation})");
        self.in_flight = Some(tokio::spawn(async move {
            let result = source.fetch_games().await;
            let _ = results.send(PollResult { generation, result }).await;
        }));
    }

    /// Whether a result tagged `generation` should be applied. Results from
    /// an earlier activation, or arriving while inactive, are not.
    pub fn accepts(&mut self, generation: u64) -> bool {
        if !self.active || generation != self.generation {
            debug!(
                "Discarding poll result from generation {generation} (current {}, active {})",
                self.generation, self.active
            );
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Stop for good (teardown).
    pub fn stop(&mut self) {
        if self.active {
            info!("Polling stopped");
        }
        self.deactivate();
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.next_tick = None;
        self.generation += 1;
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
