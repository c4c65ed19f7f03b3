// Configuration loading and validation (config/livescore.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::channel::channel_url;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

const CONFIG_FILE: &str = "livescore.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub channel: ChannelConfig,
    pub polling: PollingConfig,
    pub connectivity: ConnectivityConfig,
    /// Periodic feed recompute; `None` when disabled.
    pub feed_refresh: Option<Duration>,
    /// Team ids the user follows.
    pub favorites: Vec<String>,
}

/// Resolved endpoints, all derived from `base_url`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base_url: Url,
    pub games_url: Url,
    pub health_url: Url,
    /// `ws://` or `wss://` address of the live channel.
    pub channel_url: String,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub reconnect_delay: Duration,
    pub play_window: usize,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    pub retry_interval: Duration,
    pub reconnected_hold: Duration,
}

// ---------------------------------------------------------------------------
// livescore.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    server: ServerSection,
    #[serde(default)]
    channel: ChannelSection,
    #[serde(default)]
    polling: PollingSection,
    #[serde(default)]
    connectivity: ConnectivitySection,
    #[serde(default)]
    feed: FeedSection,
    #[serde(default)]
    favorites: FavoritesSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    base_url: String,
    #[serde(default = "default_games_path")]
    games_path: String,
    #[serde(default = "default_health_path")]
    health_path: String,
}

fn default_games_path() -> String {
    "/api/games".into()
}

fn default_health_path() -> String {
    "/api/health".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ChannelSection {
    reconnect_delay_secs: u64,
    play_window: usize,
}

impl Default for ChannelSection {
    fn default() -> Self {
        ChannelSection {
            reconnect_delay_secs: 3,
            play_window: livescore_core::store::DEFAULT_PLAY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct PollingSection {
    interval_secs: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        PollingSection { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ConnectivitySection {
    retry_interval_secs: u64,
    reconnected_hold_secs: u64,
}

impl Default for ConnectivitySection {
    fn default() -> Self {
        ConnectivitySection {
            retry_interval_secs: 30,
            reconnected_hold_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct FeedSection {
    refresh_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        FeedSection { refresh_secs: 60 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FavoritesSection {
    teams: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/livescore.toml` relative to `base_dir`.
///
/// Does not copy defaults; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    parse_config(&text).map_err(|e| match e {
        ConfigError::ParseError { source, .. } => ConfigError::ParseError { path, source },
        other => other,
    })
}

/// Parse and validate config text.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: PathBuf::from(CONFIG_FILE),
        source: e,
    })?;
    validate(&file)?;

    let server = resolve_server(&file.server)?;

    Ok(Config {
        server,
        channel: ChannelConfig {
            reconnect_delay: Duration::from_secs(file.channel.reconnect_delay_secs),
            play_window: file.channel.play_window,
        },
        polling: PollingConfig {
            interval: Duration::from_secs(file.polling.interval_secs),
        },
        connectivity: ConnectivityConfig {
            retry_interval: Duration::from_secs(file.connectivity.retry_interval_secs),
            reconnected_hold: Duration::from_secs(file.connectivity.reconnected_hold_secs),
        },
        feed_refresh: (file.feed.refresh_secs > 0)
            .then(|| Duration::from_secs(file.feed.refresh_secs)),
        favorites: file.favorites.teams,
    })
}

/// Copy `defaults/livescore.toml` into `config/` if it is not there yet.
/// Returns the copied paths.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the crate root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    let source = defaults_dir.join(CONFIG_FILE);
    let target = config_dir.join(CONFIG_FILE);
    if target.exists() || !source.is_file() {
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;
    std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", source.display()),
    })?;

    Ok(vec![target])
}

/// Load config relative to the current working directory, copying defaults
/// first when needed.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn resolve_server(section: &ServerSection) -> Result<ServerConfig, ConfigError> {
    let invalid = |field: &str, message: String| ConfigError::ValidationError {
        field: field.into(),
        message,
    };

    let base_url = Url::parse(&section.base_url)
        .map_err(|e| invalid("server.base_url", format!("not a valid URL: {e}")))?;
    let channel_url = channel_url(&base_url).ok_or_else(|| {
        invalid(
            "server.base_url",
            format!("scheme must be http or https, got `{}`", base_url.scheme()),
        )
    })?;
    let games_url = base_url
        .join(&section.games_path)
        .map_err(|e| invalid("server.games_path", e.to_string()))?;
    let health_url = base_url
        .join(&section.health_path)
        .map_err(|e| invalid("server.health_path", e.to_string()))?;

    Ok(ServerConfig {
        base_url,
        games_url,
        health_url,
        channel_url,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(file: &ConfigFile) -> Result<(), ConfigError> {
    let positive: &[(&str, u64)] = &[
        ("channel.reconnect_delay_secs", file.channel.reconnect_delay_secs),
        ("polling.interval_secs", file.polling.interval_secs),
        ("connectivity.retry_interval_secs", file.connectivity.retry_interval_secs),
        ("connectivity.reconnected_hold_secs", file.connectivity.reconnected_hold_secs),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if file.channel.play_window == 0 {
        return Err(ConfigError::ValidationError {
            field: "channel.play_window".into(),
            message: "must be > 0".into(),
        });
    }

    for (name, path) in [
        ("server.games_path", &file.server.games_path),
        ("server.health_path", &file.server.health_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::ValidationError {
                field: name.into(),
                message: format!("must start with '/', got `{path}`"),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Crate root containing `defaults/`, whether tests run from the crate
    /// or the workspace root.
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        if cwd.join("defaults").exists() {
            cwd
        } else if cwd.join("crates/livescore-sync/defaults").exists() {
            cwd.join("crates/livescore-sync")
        } else {
            panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
        }
    }

    const MINIMAL: &str = "[server]\nbase_url = \"http://scores.local:8080\"\n";

    #[test]
    fn load_valid_config_from_defaults() {
        let text = fs::read_to_string(project_root().join("defaults/livescore.toml")).unwrap();
        let config = parse_config(&text).expect("defaults should be valid");

        assert_eq!(config.channel.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.channel.play_window, 50);
        assert_eq!(config.polling.interval, Duration::from_secs(10));
        assert_eq!(config.connectivity.retry_interval, Duration::from_secs(30));
        assert_eq!(config.feed_refresh, Some(Duration::from_secs(60)));
        assert!(config.favorites.is_empty());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.server.channel_url, "ws://scores.local:8080/ws");
        assert_eq!(
            config.server.games_url.as_str(),
            "http://scores.local:8080/api/games"
        );
        assert_eq!(
            config.server.health_url.as_str(),
            "http://scores.local:8080/api/health"
        );
        assert_eq!(config.connectivity.reconnected_hold, Duration::from_secs(3));
    }

    #[test]
    fn https_base_maps_to_wss_channel() {
        let config = parse_config("[server]\nbase_url = \"https://scores.example.com\"\n").unwrap();
        assert_eq!(config.server.channel_url, "wss://scores.example.com/ws");
    }

    #[test]
    fn favorites_and_feed_refresh_parse() {
        let text = format!("{MINIMAL}[favorites]\nteams = [\"KC\", \"BUF\"]\n[feed]\nrefresh_secs = 0\n");
        let config = parse_config(&text).unwrap();
        assert_eq!(config.favorites, vec!["KC".to_string(), "BUF".to_string()]);
        assert_eq!(config.feed_refresh, None);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = parse_config("[server]\nbase_url = \"ftp://scores.local\"\n").unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "server.base_url"),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_reconnect_delay() {
        let text = format!("{MINIMAL}[channel]\nreconnect_delay_secs = 0\n");
        match parse_config(&text).unwrap_err() {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "channel.reconnect_delay_secs")
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let text = format!("{MINIMAL}[polling]\ninterval_secs = 0\n");
        match parse_config(&text).unwrap_err() {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "polling.interval_secs")
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_play_window() {
        let text = format!("{MINIMAL}[channel]\nplay_window = 0\n");
        match parse_config(&text).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "channel.play_window"),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_relative_games_path() {
        let text = "[server]\nbase_url = \"http://x\"\ngames_path = \"api/games\"\n";
        match parse_config(text).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "server.games_path"),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn missing_server_section_is_parse_error() {
        assert!(matches!(
            parse_config("[polling]\ninterval_secs = 5\n"),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn file_not_found_for_missing_config() {
        let tmp = std::env::temp_dir().join("livescore_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        match load_config_from(&tmp) {
            Err(ConfigError::FileNotFound { path }) => {
                assert!(path.ends_with("config/livescore.toml"))
            }
            other => panic!("expected FileNotFound, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_reports_file_path() {
        let tmp = std::env::temp_dir().join("livescore_config_parse_error");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/livescore.toml"), "[server\nbase_url = 1").unwrap();

        match load_config_from(&tmp) {
            Err(ConfigError::ParseError { path, .. }) => {
                assert_eq!(path, tmp.join("config/livescore.toml"))
            }
            other => panic!("expected ParseError, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_then_skips() {
        let tmp = std::env::temp_dir().join("livescore_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::copy(
            project_root().join("defaults/livescore.toml"),
            tmp.join("defaults/livescore.toml"),
        )
        .unwrap();

        let copied = ensure_config_files(&tmp).unwrap();
        assert_eq!(copied, vec![tmp.join("config/livescore.toml")]);
        assert!(load_config_from(&tmp).is_ok());

        let copied = ensure_config_files(&tmp).unwrap();
        assert!(copied.is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("livescore_config_no_dirs");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        assert!(matches!(
            ensure_config_files(&tmp),
            Err(ConfigError::DefaultsCopyError { .. })
        ));

        let _ = fs::remove_dir_all(&tmp);
    }
}
