// Connectivity monitor: tracks whether the scores server is reachable.
//
// Status comes from two sources: platform network-change signals, applied as
// they arrive, and reachability probes against a cheap health endpoint. While
// offline the monitor probes on a fixed interval until a probe succeeds. The
// current state is published on a `watch` channel; the monitor never touches
// game data.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::ConnectivityConfig;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub status: NetworkStatus,
    /// Set for a short while after coming back online, so the UI can show
    /// a "reconnected" notice.
    pub reconnected: bool,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        self.status == NetworkStatus::Online
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("health probe request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("health probe returned status {0}")]
    Status(StatusCode),
}

/// A reachability check.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> Result<(), ProbeError>;
}

/// A health check that takes longer than this counts as unreachable.
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// `HEAD` request against the health endpoint with caching disabled. Any
/// 2xx counts as reachable.
pub struct HttpProbe {
    http: reqwest::Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        HttpProbe { http, url }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        let response = self
            .http
            .head(self.url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(CHECK_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectivityMonitor (state)
// ---------------------------------------------------------------------------

/// Connectivity state and its timers. Holds no I/O; [`run_monitor`] drives it.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: ConnectivityState,
    retry_interval: Duration,
    reconnected_hold: Duration,
    next_probe: Option<Instant>,
    reconnected_until: Option<Instant>,
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkStatus, config: &ConnectivityConfig, now: Instant) -> Self {
        let next_probe = match initial {
            NetworkStatus::Offline => Some(now + config.retry_interval),
            NetworkStatus::Online => None,
        };
        ConnectivityMonitor {
            state: ConnectivityState {
                status: initial,
                reconnected: false,
            },
            retry_interval: config.retry_interval,
            reconnected_hold: config.reconnected_hold,
            next_probe,
            reconnected_until: None,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn status(&self) -> NetworkStatus {
        self.state.status
    }

    /// When the next automatic probe is due. Only set while offline.
    pub fn next_probe(&self) -> Option<Instant> {
        self.next_probe
    }

    /// When the `reconnected` flag clears, if it is up.
    pub fn reconnected_until(&self) -> Option<Instant> {
        self.reconnected_until
    }

    /// Apply a platform network-change signal. Returns whether the state
    /// changed.
    pub fn apply_signal(&mut self, status: NetworkStatus, now: Instant) -> bool {
        match (self.state.status, status) {
            (NetworkStatus::Offline, NetworkStatus::Online) => {
                info!("Network signal: online");
                self.go_online(now);
                true
            }
            (NetworkStatus::Online, NetworkStatus::Offline) => {
                info!("Network signal: offline");
                self.go_offline(now);
                true
            }
            _ => false,
        }
    }

    /// Apply the outcome of a probe. Returns whether the state changed.
    ///
    /// A failure while already offline only reschedules the next probe.
    pub fn record_probe(&mut self, result: &Result<(), ProbeError>, now: Instant) -> bool {
        match (self.state.status, result) {
            (NetworkStatus::Offline, Ok(())) => {
                info!("Health probe succeeded, back online");
                self.go_online(now);
                true
            }
            (NetworkStatus::Online, Ok(())) => false,
            (NetworkStatus::Online, Err(e)) => {
                warn!("Health probe failed, going offline: {}", e);
                self.go_offline(now);
                true
            }
            (NetworkStatus::Offline, Err(e)) => {
                debug!("Health probe failed while offline: {}", e);
                self.next_probe = Some(now + self.retry_interval);
                false
            }
        }
    }

    /// Drop the `reconnected` flag once its hold time has passed. Returns
    /// whether the state changed.
    pub fn clear_reconnected(&mut self, now: Instant) -> bool {
        match self.reconnected_until {
            Some(until) if now >= until => {
                self.reconnected_until = None;
                self.state.reconnected = false;
                true
            }
            _ => false,
        }
    }

    fn go_online(&mut self, now: Instant) {
        self.state = ConnectivityState {
            status: NetworkStatus::Online,
            reconnected: true,
        };
        self.next_probe = None;
        self.reconnected_until = Some(now + self.reconnected_hold);
    }

    fn go_offline(&mut self, now: Instant) {
        self.state = ConnectivityState {
            status: NetworkStatus::Offline,
            reconnected: false,
        };
        self.reconnected_until = None;
        self.next_probe = Some(now + self.retry_interval);
    }
}

// ---------------------------------------------------------------------------
// Monitor task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityCommand {
    /// A platform online/offline notification.
    Signal(NetworkStatus),
    /// Probe right away (manual retry).
    CheckNow,
}

/// Owner-side handle to a running monitor. Dropping it (all clones of the
/// command sender) stops the monitor task.
pub struct ConnectivityHandle {
    commands: mpsc::Sender<ConnectivityCommand>,
    state: watch::Receiver<ConnectivityState>,
}

impl ConnectivityHandle {
    /// Start a monitor task.
    pub fn spawn<P>(
        probe: P,
        config: &ConnectivityConfig,
        initial: NetworkStatus,
    ) -> (Self, JoinHandle<()>)
    where
        P: Probe + 'static,
    {
        let monitor = ConnectivityMonitor::new(initial, config, Instant::now());
        let (state_tx, state_rx) = watch::channel(monitor.state());
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let task = tokio::spawn(run_monitor(probe, monitor, cmd_rx, state_tx));
        (
            ConnectivityHandle {
                commands: cmd_tx,
                state: state_rx,
            },
            task,
        )
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn status(&self) -> NetworkStatus {
        self.state().status
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.clone()
    }

    /// A sender for feeding signals and check requests from elsewhere. The
    /// monitor runs until every sender, this handle's included, is dropped.
    pub fn commands(&self) -> mpsc::Sender<ConnectivityCommand> {
        self.commands.clone()
    }

    pub async fn report_signal(&self, status: NetworkStatus) {
        let _ = self.commands.send(ConnectivityCommand::Signal(status)).await;
    }

    pub async fn check_now(&self) {
        let _ = self.commands.send(ConnectivityCommand::CheckNow).await;
    }
}

/// Drive `monitor` until the command channel closes.
///
/// A pending check runs as its own `select!` branch, so signals keep being
/// applied while the health endpoint is slow to answer. At most one check is
/// in flight; a signal that changes the status drops it.
pub async fn run_monitor<P: Probe>(
    probe: P,
    mut monitor: ConnectivityMonitor,
    mut commands: mpsc::Receiver<ConnectivityCommand>,
    state_tx: watch::Sender<ConnectivityState>,
) {
    info!("Connectivity monitor started ({:?})", monitor.status());

    let mut in_flight: Option<BoxFuture<'_, Result<(), ProbeError>>> = None;

    loop {
        let checking = in_flight.is_some();
        let next_probe = if checking { None } else { monitor.next_probe() };
        let clear_at = monitor.reconnected_until();

        let changed = tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(ConnectivityCommand::Signal(status)) => {
                    let changed = monitor.apply_signal(status, Instant::now());
                    if changed && in_flight.take().is_some() {
                        debug!("Dropped pending health check after network signal");
                    }
                    changed
                }
                Some(ConnectivityCommand::CheckNow) => {
                    if in_flight.is_none() {
                        in_flight = Some(probe.check());
                    }
                    false
                }
                None => break,
            },
            result = async {
                match in_flight.as_mut() {
                    Some(check) => check.await,
                    None => std::future::pending().await,
                }
            }, if checking => {
                in_flight = None;
                monitor.record_probe(&result, Instant::now())
            }
            _ = sleep_until(next_probe.unwrap_or_else(Instant::now)), if next_probe.is_some() => {
                in_flight = Some(probe.check());
                false
            }
            _ = sleep_until(clear_at.unwrap_or_else(Instant::now)), if clear_at.is_some() => {
                monitor.clear_reconnected(Instant::now())
            }
        };

        if changed {
            // send_replace never fails, even with no receivers left.
            state_tx.send_replace(monitor.state());
        }
    }

    info!("Connectivity monitor stopped");
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
