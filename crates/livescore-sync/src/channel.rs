// Live channel manager: a single WebSocket connection to the scores server,
// modelled as a state machine (connecting -> open -> closed -> connecting).
//
// The manager never touches the socket directly. A `Connector` opens a
// connection and reports back through `ChannelEvent`s tagged with the
// connection's generation; `ChannelManager::handle_event` is the single place
// those events are applied.

use std::fmt;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use livescore_core::protocol::{ClientMessage, ServerMessage};
use livescore_core::store::{GameStore, StoreChange};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

/// Outbound frames buffered per connection before sends are dropped.
const OUTBOUND_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Status and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Open => write!(f, "open"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Events reported by a connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened { generation: u64 },
    Message { generation: u64, text: String },
    /// The connection failed to open, errored, or was closed by the server.
    Closed { generation: u64, reason: String },
}

impl ChannelEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ChannelEvent::Opened { generation }
            | ChannelEvent::Message { generation, .. }
            | ChannelEvent::Closed { generation, .. } => *generation,
        }
    }
}

/// Result of applying one [`ChannelEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    StatusChanged(ChannelStatus),
    Applied(StoreChange),
    /// Stale, malformed, or redundant; nothing changed.
    Ignored,
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Write side of an open (or opening) connection. Dropping it asks the
/// connection task to close the socket.
#[derive(Debug)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        ConnectionHandle { outbound }
    }

    fn try_send(&self, text: String) -> bool {
        match self.outbound.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping outbound channel message: {e}");
                false
            }
        }
    }
}

/// Opens live channel connections.
///
/// Implementations must report exactly one `Opened` (on success) followed by
/// any number of `Message`s, and finally one `Closed`, all tagged with
/// `generation`, through `events`.
pub trait Connector: Send + Sync {
    fn open(&self, url: &str, generation: u64, events: mpsc::Sender<ChannelEvent>)
        -> ConnectionHandle;
}

/// Production connector backed by `tokio-tungstenite`. Each connection runs
/// in its own task.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(
        &self,
        url: &str,
        generation: u64,
        events: mpsc::Sender<ChannelEvent>,
    ) -> ConnectionHandle {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(run_connection(url.to_string(), generation, events, rx));
        ConnectionHandle::new(tx)
    }
}

async fn run_connection(
    url: String,
    generation: u64,
    events: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<String>,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!("Live channel connect to {url} failed: {e}");
            let _ = events
                .send(ChannelEvent::Closed {
                    generation,
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    };

    info!("Live channel connected to {url} (generation {generation})");
    if events.send(ChannelEvent::Opened { generation }).await.is_err() {
        return;
    }

    let (write, read) = ws.split();
    if let Some(reason) = pump_connection(read, write, &mut outbound, &events, generation).await {
        let _ = events.send(ChannelEvent::Closed { generation, reason }).await;
    }
}

/// Shuttle frames between an open socket and the manager until either side
/// goes away.
///
/// Text frames are forwarded as [`ChannelEvent::Message`]; binary, ping and
/// pong frames are ignored. Returns the close reason when the socket ended,
/// or `None` when the manager hung up (outbound sender or event receiver
/// dropped), in which case no `Closed` event should be sent.
///
/// Generic over the stream and sink so it can be tested without sockets.
pub async fn pump_connection<St, Si>(
    mut read: St,
    mut write: Si,
    outbound: &mut mpsc::Receiver<String>,
    events: &mpsc::Sender<ChannelEvent>,
    generation: u64,
) -> Option<String>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let event = ChannelEvent::Message { generation, text: text.to_string() };
                    if events.send(event).await.is_err() {
                        return None;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Server sent close frame (generation {generation})");
                    return Some("closed by server".into());
                }
                Some(Ok(_)) => {
                    // Binary, Ping, Pong, Frame.
                }
                Some(Err(e)) => {
                    warn!("Live channel read error: {e}");
                    return Some(format!("read error: {e}"));
                }
                None => return Some("stream ended".into()),
            },
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!("Live channel write error: {e}");
                        return Some(format!("write error: {e}"));
                    }
                }
                None => {
                    let _ = write.close().await;
                    return None;
                }
            },
        }
    }
}

/// Live channel address for a page served from `base`: `ws://host/ws` for
/// http, `wss://host/ws` for https. Other schemes have no channel.
pub fn channel_url(base: &Url) -> Option<String> {
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return None,
    };
    let host = base.host_str()?;
    Some(match base.port() {
        Some(port) => format!("{scheme}://{host}:{port}/ws"),
        None => format!("{scheme}://{host}/ws"),
    })
}

// ---------------------------------------------------------------------------
// ChannelManager
// ---------------------------------------------------------------------------

pub struct ChannelManager {
    connector: Box<dyn Connector>,
    url: String,
    events_tx: mpsc::Sender<ChannelEvent>,
    status: ChannelStatus,
    /// Identifies the current connection. Incremented on every `connect`;
    /// events from older connections are discarded.
    generation: u64,
    connection: Option<ConnectionHandle>,
    reconnect_at: Option<Instant>,
    reconnect_delay: Duration,
    /// Games subscribed to so far, re-sent after every reconnect.
    subscriptions: Vec<String>,
    disposed: bool,
}

impl ChannelManager {
    /// Create a manager in the `Closed` state. Nothing is opened until
    /// [`connect`](Self::connect) is called.
    pub fn new(
        connector: Box<dyn Connector>,
        url: impl Into<String>,
        reconnect_delay: Duration,
        events_tx: mpsc::Sender<ChannelEvent>,
    ) -> Self {
        ChannelManager {
            connector,
            url: url.into(),
            events_tx,
            status: ChannelStatus::Closed,
            generation: 0,
            connection: None,
            reconnect_at: None,
            reconnect_delay,
            subscriptions: Vec::new(),
            disposed: false,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When the pending reconnect fires, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Open a fresh connection, replacing any current one.
    pub fn connect(&mut self) {
        if self.disposed {
            debug!("connect() after dispose ignored");
            return;
        }
        self.generation += 1;
        // Dropping the old handle closes the old socket; its late events
        // carry a stale generation.
        self.connection = None;
        self.status = ChannelStatus::Connecting;
        info!(
            "Connecting live channel to {} (generation {})",
            self.url, self.generation
        );
        self.connection = Some(
            self.connector
                .open(&self.url, self.generation, self.events_tx.clone()),
        );
    }

    /// Apply an event from the connection task.
    pub fn handle_event(
        &mut self,
        event: ChannelEvent,
        store: &mut GameStore,
        now: Instant,
    ) -> ChannelOutcome {
        if self.disposed || event.generation() != self.generation {
            debug!(
                "Ignoring event from generation {} (current {})",
                event.generation(),
                self.generation
            );
            return ChannelOutcome::Ignored;
        }

        match event {
            ChannelEvent::Opened { .. } => {
                info!("Live channel open");
                self.status = ChannelStatus::Open;
                self.reconnect_at = None;
                self.resubscribe();
                ChannelOutcome::StatusChanged(ChannelStatus::Open)
            }
            ChannelEvent::Message { text, .. } => match ServerMessage::parse(&text) {
                Ok(message) => ChannelOutcome::Applied(store.apply(message)),
                Err(e) => {
                    warn!("Failed to parse channel message: {}", e);
                    ChannelOutcome::Ignored
                }
            },
            ChannelEvent::Closed { reason, .. } => {
                self.connection = None;
                if self.status == ChannelStatus::Closed {
                    return ChannelOutcome::Ignored;
                }
                self.status = ChannelStatus::Closed;
                self.reconnect_at = Some(now + self.reconnect_delay);
                warn!(
                    "Live channel closed ({reason}), reconnecting in {:?}",
                    self.reconnect_delay
                );
                ChannelOutcome::StatusChanged(ChannelStatus::Closed)
            }
        }
    }

    /// Called when the reconnect deadline passes. Returns the new status.
    pub fn on_reconnect_due(&mut self) -> ChannelStatus {
        self.reconnect_at = None;
        if !self.disposed {
            self.connect();
        }
        self.status
    }

    /// Skip the remaining backoff and reconnect now. Only acts while
    /// closed; returns whether a connection attempt was started.
    pub fn reconnect_now(&mut self) -> bool {
        if self.disposed || self.status != ChannelStatus::Closed {
            return false;
        }
        info!("Reconnecting live channel early");
        self.reconnect_at = None;
        self.connect();
        true
    }

    /// Send a message if the channel is open. Anything sent while not open
    /// is dropped silently: the next open brings a fresh snapshot anyway.
    pub fn send(&self, message: &ClientMessage) -> bool {
        if self.status != ChannelStatus::Open {
            debug!("Channel not open, dropping {:?}", message);
            return false;
        }
        let Some(connection) = &self.connection else {
            return false;
        };
        match message.to_json() {
            Ok(text) => connection.try_send(text),
            Err(e) => {
                warn!("Failed to encode channel message: {}", e);
                false
            }
        }
    }

    /// Ask the server to stream updates for `game_id`. Remembered and
    /// re-sent whenever the channel reopens.
    pub fn subscribe_to_game(&mut self, game_id: &str) -> bool {
        if !self.subscriptions.iter().any(|g| g == game_id) {
            self.subscriptions.push(game_id.to_string());
        }
        self.send(&ClientMessage::SubscribeGame {
            game_id: game_id.to_string(),
        })
    }

    /// Ask the server for the plays of `game_id`.
    pub fn request_plays(&self, game_id: &str) -> bool {
        self.send(&ClientMessage::RequestPlays {
            game_id: game_id.to_string(),
        })
    }

    /// Close the connection and stop reconnecting for good.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("Disposing live channel");
        self.disposed = true;
        self.reconnect_at = None;
        self.connection = None;
        self.status = ChannelStatus::Closed;
    }

    fn resubscribe(&self) {
        for game_id in &self.subscriptions {
            self.send(&ClientMessage::SubscribeGame {
                game_id: game_id.clone(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
