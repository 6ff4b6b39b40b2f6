use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use lib_threadwatch::configs::{DEFAULT_FORUM_URL, ForumConfig, MIN_INTERVAL_SECS, WatchConfig};
use lib_threadwatch::loggers::LoggingOptions;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::telegram::TELEGRAM_API_URL;

/// Config file read when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "server_threadwatch.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Watches forum threads and forwards new posts to Telegram chats", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "THREADWATCH_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "THREADWATCH_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "THREADWATCH_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "THREADWATCH_SAVES_DIR", help = "Directory for cursor files and the subscription list.")]
    pub saves_dir: Option<PathBuf>,

    #[clap(long, env = "THREADWATCH_POLL_INTERVAL_SECS", help = "Seconds between two sweeps of the same thread.")]
    pub poll_interval_secs: Option<u64>,

    #[clap(long, env = "THREADWATCH_RESUME_INTERVAL_SECS", help = "Seconds between retries for watched threads left without a poller.")]
    pub resume_interval_secs: Option<u64>,

    #[clap(long, env = "THREADWATCH_DELIVERY_CAP", help = "Maximum number of new posts forwarded per sweep.")]
    pub delivery_cap: Option<usize>,

    #[clap(long, env = "THREADWATCH_FORUM_URL", help = "Forum origin, e.g. https://www.mediavida.com.")]
    pub forum_url: Option<String>,

    #[clap(long, env = "THREADWATCH_AUTH_MARKER", help = "Text present only on pages rendered for a signed-in user.")]
    pub auth_marker: Option<String>,

    #[clap(long, env = "MV_USER", help = "Forum account name. Leave empty to browse anonymously.")]
    pub mv_user: Option<String>,

    #[clap(long, env = "MV_PASS", hide_env_values = true, help = "Forum account password.")]
    #[serde(skip_serializing)]
    pub mv_pass: Option<String>,

    #[clap(long, env = "TELEGRAM_TOKEN", hide_env_values = true, help = "Telegram bot token.")]
    #[serde(skip_serializing)]
    pub telegram_token: Option<String>,

    #[clap(long, env = "THREADWATCH_TELEGRAM_API_URL", help = "Telegram Bot API base URL.")]
    pub telegram_api_url: Option<String>,

    #[clap(long, env = "THREADWATCH_SHUTDOWN_TIMEOUT_SECS", help = "Seconds to wait for tasks on shutdown.")]
    pub shutdown_timeout_secs: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            saves_dir: other.saves_dir.or(self.saves_dir),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            resume_interval_secs: other.resume_interval_secs.or(self.resume_interval_secs),
            delivery_cap: other.delivery_cap.or(self.delivery_cap),
            forum_url: other.forum_url.or(self.forum_url),
            auth_marker: other.auth_marker.or(self.auth_marker),
            mv_user: other.mv_user.or(self.mv_user),
            mv_pass: other.mv_pass.or(self.mv_pass),
            telegram_token: other.telegram_token.or(self.telegram_token),
            telegram_api_url: other.telegram_api_url.or(self.telegram_api_url),
            shutdown_timeout_secs: other.shutdown_timeout_secs.or(self.shutdown_timeout_secs),
        }
    }

    fn defaults() -> Config {
        let watch = WatchConfig::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            saves_dir: Some(watch.saves_dir),
            poll_interval_secs: Some(watch.poll_interval_secs),
            resume_interval_secs: Some(watch.resume_interval_secs),
            delivery_cap: Some(watch.delivery_cap),
            forum_url: Some(DEFAULT_FORUM_URL.to_string()),
            auth_marker: Some(ForumConfig::default().auth_marker),
            telegram_api_url: Some(TELEGRAM_API_URL.to_string()),
            shutdown_timeout_secs: Some(10),
            ..Default::default()
        }
    }

    pub fn forum_config(&self) -> ForumConfig {
        let defaults = ForumConfig::default();
        ForumConfig {
            base_url: self.forum_url.clone().unwrap_or(defaults.base_url),
            username: self.mv_user.clone().unwrap_or_default(),
            password: self.mv_pass.clone().unwrap_or_default(),
            auth_marker: self.auth_marker.clone().unwrap_or(defaults.auth_marker),
            ..defaults
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        let defaults = WatchConfig::default();
        WatchConfig {
            poll_interval_secs: at_least_min(
                "poll interval",
                self.poll_interval_secs.unwrap_or(defaults.poll_interval_secs),
            ),
            resume_interval_secs: at_least_min(
                "resume interval",
                self.resume_interval_secs.unwrap_or(defaults.resume_interval_secs),
            ),
            delivery_cap: self.delivery_cap.unwrap_or(defaults.delivery_cap),
            saves_dir: self.saves_dir.clone().unwrap_or(defaults.saves_dir),
            ..defaults
        }
    }

    pub fn logging_options(&self) -> LoggingOptions {
        let defaults = LoggingOptions::default();
        LoggingOptions {
            app_name: "server_threadwatch".to_string(),
            log_dir: self.log_dir.clone().unwrap_or(defaults.log_dir),
            level: self.log_level.clone().unwrap_or(defaults.level),
            ..defaults
        }
    }

    pub fn telegram_token(&self) -> Result<&str> {
        match self.telegram_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("no Telegram bot token configured (TELEGRAM_TOKEN or --telegram-token)"),
        }
    }

    pub fn telegram_api_url(&self) -> &str {
        self.telegram_api_url.as_deref().unwrap_or(TELEGRAM_API_URL)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs.unwrap_or(10))
    }
}

fn at_least_min(name: &str, secs: u64) -> u64 {
    if secs < MIN_INTERVAL_SECS {
        warn!("{name} of {secs}s is too short, using {MIN_INTERVAL_SECS}s");
        return MIN_INTERVAL_SECS;
    }
    secs
}

/// Reads a JSON config file.
fn read_config_file(path: &Path) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&config_str)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

/// Layers defaults, the config file and `cli` (command line plus
/// environment), later layers winning field by field.
pub fn load_config_from(cli: Config) -> Config {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file (server_threadwatch.conf) if present.
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match read_config_file(&config_file_path) {
            Ok(file_config) => current_config = current_config.merge(file_config),
            Err(e) => warn!("{e:#}. Falling back to other sources."),
        }
    } else {
        info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    // 3. Override with environment variables and CLI arguments
    current_config.merge(cli)
}
