// Sync coordinator: owns the game store and drives the live channel, the
// polling fallback, and feed classification from a single event loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use livescore_core::classifier::{classify, FavoriteSet, FeedItem};
use livescore_core::model::PlayEvent;
use livescore_core::store::{GameStore, StoreChange};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelManager, ChannelOutcome, ChannelStatus};
use crate::connectivity::{ConnectivityCommand, ConnectivityState, NetworkStatus};
use crate::polling::{GamesSource, PollResult, PollingFallback};

/// Interval used to build the feed timer when periodic refresh is disabled.
/// The timer is never polled in that case.
const IDLE_FEED_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Requests from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    SubscribeGame(String),
    RequestPlays(String),
    SetFavorites(Vec<String>),
    Shutdown,
}

/// Everything the presentation layer needs to render.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    ChannelStatus(ChannelStatus),
    Connectivity(ConnectivityState),
    Feed(Vec<FeedItem>),
    Plays {
        game_id: String,
        plays: Vec<PlayEvent>,
    },
}

// ---------------------------------------------------------------------------
// Coordinator state
// ---------------------------------------------------------------------------

pub struct SyncState {
    pub store: GameStore,
    pub channel: ChannelManager,
    pub polling: PollingFallback,
    pub favorites: FavoriteSet,
    /// Last state seen from the connectivity monitor.
    pub connectivity: ConnectivityState,
    /// Periodic feed recompute, so time-based tags ("starts in N min") stay
    /// current between updates.
    pub feed_refresh: Option<Duration>,
    source: Arc<dyn GamesSource>,
    poll_tx: mpsc::Sender<PollResult>,
    /// Asks the connectivity monitor to check reachability after a
    /// transport failure.
    connectivity_checks: Option<mpsc::Sender<ConnectivityCommand>>,
}

impl SyncState {
    pub fn new(
        channel: ChannelManager,
        polling: PollingFallback,
        source: Arc<dyn GamesSource>,
        poll_tx: mpsc::Sender<PollResult>,
        play_window: usize,
        favorites: FavoriteSet,
        feed_refresh: Option<Duration>,
    ) -> Self {
        SyncState {
            store: GameStore::new(play_window),
            channel,
            polling,
            favorites,
            connectivity: ConnectivityState {
                status: NetworkStatus::Online,
                reconnected: false,
            },
            feed_refresh,
            source,
            poll_tx,
            connectivity_checks: None,
        }
    }

    /// Report channel drops and failed polls to the connectivity monitor.
    pub fn with_connectivity_checks(
        mut self,
        commands: mpsc::Sender<ConnectivityCommand>,
    ) -> Self {
        self.connectivity_checks = Some(commands);
        self
    }

    /// Current ranked feed.
    pub fn feed(&self) -> Vec<FeedItem> {
        classify(self.store.games(), &self.favorites, Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the sync loop until `Shutdown` arrives or the command channel closes.
///
/// Opens the live channel on entry. On exit the channel is disposed and
/// polling stopped, cancelling all timers and any in-flight fetch.
pub async fn run(
    mut channel_rx: mpsc::Receiver<ChannelEvent>,
    mut poll_rx: mpsc::Receiver<PollResult>,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    mut connectivity: watch::Receiver<ConnectivityState>,
    updates: mpsc::Sender<SyncUpdate>,
    mut state: SyncState,
) -> anyhow::Result<()> {
    info!("Sync loop started");

    state.connectivity = *connectivity.borrow_and_update();
    let _ = updates
        .send(SyncUpdate::Connectivity(state.connectivity))
        .await;

    state.channel.connect();
    let status = state.channel.status();
    on_channel_status(&mut state, status, &updates).await;

    // Cleared when the monitor goes away so select! stops polling it.
    let mut connectivity_open = true;

    let feed_enabled = state.feed_refresh.is_some();
    let mut feed_interval =
        tokio::time::interval(state.feed_refresh.unwrap_or(IDLE_FEED_INTERVAL));
    // The first tick completes immediately.
    feed_interval.tick().await;

    loop {
        let reconnect_at = state.channel.reconnect_deadline();
        let poll_at = state.polling.next_tick();

        tokio::select! {
            // The state holds senders for both of these, so they never
            // yield None while the loop runs.
            Some(event) = channel_rx.recv() => {
                handle_channel_event(&mut state, event, &updates).await;
            }

            Some(result) = poll_rx.recv() => {
                handle_poll_result(&mut state, result, &updates).await;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SyncCommand::Shutdown) => {
                        info!("Shutdown requested");
                        break;
                    }
                    Some(cmd) => handle_command(&mut state, cmd, &updates).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            changed = connectivity.changed(), if connectivity_open => {
                match changed {
                    Ok(()) => {
                        let next = *connectivity.borrow_and_update();
                        handle_connectivity(&mut state, next, &updates).await;
                    }
                    Err(_) => {
                        warn!("Connectivity monitor stopped; keeping last known state");
                        connectivity_open = false;
                    }
                }
            }

            _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                let status = state.channel.on_reconnect_due();
                on_channel_status(&mut state, status, &updates).await;
            }

            _ = sleep_until(poll_at.unwrap_or_else(Instant::now)), if poll_at.is_some() => {
                handle_poll_tick(&mut state);
            }

            _ = feed_interval.tick(), if feed_enabled => {
                publish_feed(&state, &updates).await;
            }
        }
    }

    // Cleanup
    state.channel.dispose();
    state.polling.stop();
    info!("Sync loop exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_channel_event(
    state: &mut SyncState,
    event: ChannelEvent,
    updates: &mpsc::Sender<SyncUpdate>,
) {
    let outcome = state
        .channel
        .handle_event(event, &mut state.store, Instant::now());

    match outcome {
        ChannelOutcome::StatusChanged(status) => {
            if status == ChannelStatus::Closed {
                request_connectivity_check(state);
            }
            on_channel_status(state, status, updates).await;
        }
        ChannelOutcome::Applied(StoreChange::Games { count }) => {
            debug!("Games snapshot from channel: {} games", count);
            publish_feed(state, updates).await;
        }
        ChannelOutcome::Applied(StoreChange::Plays { game_id, added }) => {
            if added > 0 {
                publish_plays(state, &game_id, updates).await;
            }
        }
        ChannelOutcome::Ignored => {}
    }
}

async fn handle_poll_result(
    state: &mut SyncState,
    result: PollResult,
    updates: &mpsc::Sender<SyncUpdate>,
) {
    if !state.polling.accepts(result.generation) {
        return;
    }
    match result.result {
        Ok(games) => {
            state.store.replace_games(games);
            debug!("Games snapshot from poll: {} games", state.store.games().len());
            publish_feed(state, updates).await;
        }
        Err(e) => {
            warn!("Poll failed, keeping last snapshot: {}", e);
            request_connectivity_check(state);
        }
    }
}

/// Ask the monitor to confirm reachability. Skipped while offline, since the
/// monitor is already retrying on its own schedule.
fn request_connectivity_check(state: &SyncState) {
    let Some(commands) = &state.connectivity_checks else {
        return;
    };
    if !state.connectivity.is_online() {
        return;
    }
    match commands.try_send(ConnectivityCommand::CheckNow) {
        Ok(()) => debug!("Requested connectivity check"),
        Err(mpsc::error::TrySendError::Full(_)) => debug!("Connectivity check already queued"),
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

fn handle_poll_tick(state: &mut SyncState) {
    if state
        .polling
        .on_tick(state.connectivity.is_online(), Instant::now())
    {
        state
            .polling
            .start_fetch(Arc::clone(&state.source), state.poll_tx.clone());
    }
}

async fn handle_connectivity(
    state: &mut SyncState,
    next: ConnectivityState,
    updates: &mpsc::Sender<SyncUpdate>,
) {
    let was_online = state.connectivity.is_online();
    state.connectivity = next;
    let _ = updates.send(SyncUpdate::Connectivity(next)).await;

    // Back online with the channel waiting out its backoff: retry now.
    if !was_online && next.is_online() && state.channel.reconnect_now() {
        let status = state.channel.status();
        on_channel_status(state, status, updates).await;
    }
}

async fn handle_command(
    state: &mut SyncState,
    cmd: SyncCommand,
    updates: &mpsc::Sender<SyncUpdate>,
) {
    match cmd {
        SyncCommand::SubscribeGame(game_id) => {
            if !state.channel.subscribe_to_game(&game_id) {
                debug!("Subscription to {} deferred until the channel opens", game_id);
            }
        }
        SyncCommand::RequestPlays(game_id) => {
            state.channel.request_plays(&game_id);
            // Serve what is already held while the server responds.
            if !state.store.plays(&game_id).is_empty() {
                publish_plays(state, &game_id, updates).await;
            }
        }
        SyncCommand::SetFavorites(teams) => {
            state.favorites = FavoriteSet::new(teams);
            info!("Favorites updated: {} teams", state.favorites.len());
            publish_feed(state, updates).await;
        }
        // Handled by the event loop.
        SyncCommand::Shutdown => {}
    }
}

/// Publish a channel status change and bring polling in line with it.
async fn on_channel_status(
    state: &mut SyncState,
    status: ChannelStatus,
    updates: &mpsc::Sender<SyncUpdate>,
) {
    state.polling.sync(status, Instant::now());
    let _ = updates.send(SyncUpdate::ChannelStatus(status)).await;
}

async fn publish_feed(state: &SyncState, updates: &mpsc::Sender<SyncUpdate>) {
    let _ = updates.send(SyncUpdate::Feed(state.feed())).await;
}

async fn publish_plays(state: &SyncState, game_id: &str, updates: &mpsc::Sender<SyncUpdate>) {
    let _ = updates
        .send(SyncUpdate::Plays {
            game_id: game_id.to_string(),
            plays: state.store.plays(game_id).to_vec(),
        })
        .await;
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
