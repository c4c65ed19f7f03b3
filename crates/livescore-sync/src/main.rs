// Live scores entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file; stdout carries the feed)
// 2. Load config
// 3. Spawn the connectivity monitor (checked on channel drops and failed polls)
// 4. Build the channel manager, polling fallback and coordinator state
// 5. Spawn the sync loop
// 6. Print updates until Ctrl+C
// 7. Cleanup on exit

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use livescore_core::classifier::{FavoriteSet, FeedItem};
use livescore_sync::app::{self, SyncCommand, SyncState, SyncUpdate};
use livescore_sync::channel::{ChannelManager, TungsteniteConnector};
use livescore_sync::config;
use livescore_sync::connectivity::{ConnectivityHandle, HttpProbe, NetworkStatus};
use livescore_sync::polling::{HttpGamesSource, PollingFallback};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Live scores starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: server={}, channel={}, poll every {:?}, {} favorite teams",
        config.server.base_url,
        config.server.channel_url,
        config.polling.interval,
        config.favorites.len()
    );

    let http = reqwest::Client::new();

    // 3. Connectivity monitor. Held until shutdown; dropping it stops the task.
    let probe = HttpProbe::new(http.clone(), config.server.health_url.clone());
    let (connectivity, monitor_handle) =
        ConnectivityHandle::spawn(probe, &config.connectivity, NetworkStatus::Online);

    // 4. Channels and coordinator state
    let (channel_tx, channel_rx) = mpsc::channel(256);
    let (poll_tx, poll_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (updates_tx, mut updates_rx) = mpsc::channel(256);

    let channel = ChannelManager::new(
        Box::new(TungsteniteConnector),
        config.server.channel_url.clone(),
        config.channel.reconnect_delay,
        channel_tx,
    );
    let source = HttpGamesSource::new(http, config.server.games_url.clone());
    let state = SyncState::new(
        channel,
        PollingFallback::new(config.polling.interval),
        Arc::new(source),
        poll_tx,
        config.channel.play_window,
        FavoriteSet::new(config.favorites.iter().cloned()),
        config.feed_refresh,
    )
    .with_connectivity_checks(connectivity.commands());

    // 5. Sync loop
    let connectivity_rx = connectivity.subscribe();
    let app_handle = tokio::spawn(async move {
        let result = app::run(channel_rx, poll_rx, cmd_rx, connectivity_rx, updates_tx, state);
        if let Err(e) = result.await {
            error!("Sync loop error: {}", e);
        }
    });

    // 6. Print updates; follow featured games on the live channel.
    let mut subscribed: HashSet<String> = HashSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = updates_rx.recv() => {
                let Some(update) = update else {
                    info!("Sync loop ended");
                    break;
                };
                if let SyncUpdate::Feed(feed) = &update {
                    let featured_live = feed
                        .iter()
                        .filter(|item| item.featured && item.game.status.is_live());
                    for item in featured_live {
                        if subscribed.insert(item.game.id.clone()) {
                            let subscribe = SyncCommand::SubscribeGame(item.game.id.clone());
                            let _ = cmd_tx.send(subscribe).await;
                        }
                    }
                }
                print_update(&update);
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // 7. Cleanup
    let _ = cmd_tx.send(SyncCommand::Shutdown).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    drop(connectivity);
    let _ = tokio::time::timeout(Duration::from_secs(2), monitor_handle).await;

    info!("Live scores shut down cleanly");
    Ok(())
}

fn print_update(update: &SyncUpdate) {
    match update {
        SyncUpdate::ChannelStatus(status) => println!("[channel] {status}"),
        SyncUpdate::Connectivity(state) => {
            let status = match state.status {
                NetworkStatus::Online => "online",
                NetworkStatus::Offline => "offline",
            };
            if state.reconnected {
                println!("[network] {status} (reconnected)");
            } else {
                println!("[network] {status}");
            }
        }
        SyncUpdate::Feed(feed) => {
            println!("--- feed: {} games ---", feed.len());
            for item in feed {
                println!("{}", format_feed_item(item));
            }
        }
        SyncUpdate::Plays { game_id, plays } => match plays.last() {
            Some(latest) => println!(
                "[plays] {game_id}: {} held, latest Q{} {} {}",
                plays.len(),
                latest.quarter,
                latest.clock,
                latest.description
            ),
            None => println!("[plays] {game_id}: none yet"),
        },
    }
}

fn format_feed_item(item: &FeedItem) -> String {
    let game = &item.game;
    let marker = if item.featured { '*' } else { ' ' };
    format!(
        "{marker} {:>3}  {:<24} {} {} @ {} {}  Q{} {}",
        item.priority,
        item.tag.to_string(),
        game.away_team.abbreviation,
        game.away_score,
        game.home_team.abbreviation,
        game.home_score,
        game.quarter,
        game.clock
    )
}

/// Initialize tracing to log to a file (stdout is used for the feed).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("livescore.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("livescore=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
