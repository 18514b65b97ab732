//! Global feedmirror configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, DEFAULT_SAMPLE_SIZE,
};
use crate::error::{FeedMirrorError, FeedMirrorResult};

static DEFAULT_MIRROR_DIR: &str = "~/.local/share/feedmirror";
static DEFAULT_BIND_ADDR: &str = "127.0.0.1:4096";
static ENV_PREFIX: &str = "FEEDMIRROR";

fn default_mirror_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MIRROR_DIR)
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_backoff() -> Duration {
    DEFAULT_RETRY_BACKOFF
}

/// Configuration at ~/.config/feedmirror/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMirrorConfig {
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: PathBuf,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_fetch_timeout", with = "super::duration_str")]
    pub fetch_timeout: Duration,

    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff", with = "super::duration_str")]
    pub retry_backoff: Duration,

    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Default for FeedMirrorConfig {
    fn default() -> Self {
        FeedMirrorConfig {
            mirror_dir: default_mirror_dir(),
            bind_addr: default_bind_addr(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sample_size: DEFAULT_SAMPLE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            feeds: Vec::new(),
        }
    }
}

impl FeedMirrorConfig {
    pub fn config_path() -> FeedMirrorResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| FeedMirrorError::Config("Could not determine config directory".into()))?
            .join("feedmirror");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, creating a commented file first if
    /// none exists.
    pub fn load() -> FeedMirrorResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::create_default_config(&path)?;
        }
        Self::load_from(&path)
    }

    /// Load `path` overlaid with `FEEDMIRROR_*` environment variables.
    pub fn load_from(path: &Path) -> FeedMirrorResult<Self> {
        let config: FeedMirrorConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| FeedMirrorError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| FeedMirrorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without touching the filesystem or environment.
    pub fn from_toml_str(content: &str) -> FeedMirrorResult<Self> {
        let config: FeedMirrorConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(|e| FeedMirrorError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| FeedMirrorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FeedMirrorResult<()> {
        let mut seen = HashSet::new();
        for feed in &self.feeds {
            feed.validate()?;
            if !seen.insert(feed.id.as_str()) {
                return Err(FeedMirrorError::Config(format!(
                    "Feed id '{}' is configured more than once",
                    feed.id
                )));
            }
        }
        if self.fetch_timeout.is_zero() {
            return Err(FeedMirrorError::Config("fetch_timeout must be positive".into()));
        }
        Ok(())
    }

    /// The mirror directory with `~` expanded.
    pub fn mirror_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.mirror_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn feed(&self, id: &str) -> FeedMirrorResult<&FeedConfig> {
        self.feeds
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| FeedMirrorError::FeedNotFound(id.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> FeedMirrorResult<()> {
        let contents = format!(
            "\
# feedmirror configuration

# Where mirrored events are stored:
# mirror_dir = \"{DEFAULT_MIRROR_DIR}\"

# Address the server listens on:
# bind_addr = \"{DEFAULT_BIND_ADDR}\"

# fetch_timeout = \"30s\"
# sample_size = 5
# max_retries = 3
# retry_backoff = \"5s\"

# One block per subscribed feed:
# [[feeds]]
# id = \"holidays\"
# url = \"webcal://example.com/holidays.ics\"
# refresh_interval = \"1h\"
# timezone = \"Europe/Berlin\"
# days_back = 365
# days_ahead = 365
# max_events = 2500
# validate_after_sync = true
# resync_on_drift = false
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FeedMirrorError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| FeedMirrorError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_empty_file() {
        let config = FeedMirrorConfig::from_toml_str("").unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:4096");
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.sample_size, 5);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_feeds_and_durations_parse() {
        let config = FeedMirrorConfig::from_toml_str(
            r#"
fetch_timeout = "10s"
retry_backoff = "1m"

[[feeds]]
id = "team"
url = "webcal://example.com/team.ics"
refresh_interval = "15m"
window_start = "2025-01-01"
window_end = "2025-12-31"
timezone = "Europe/Berlin"
resync_on_drift = true
"#,
        )
        .unwrap();

        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_backoff, Duration::from_secs(60));

        let feed = config.feed("team").unwrap();
        assert_eq!(feed.refresh_interval, Some(Duration::from_secs(900)));
        assert_eq!(feed.max_events, 2500);
        assert!(feed.validate_after_sync);
        assert!(feed.resync_on_drift);
        assert_eq!(feed.fetch_url().unwrap(), "https://example.com/team.ics");
    }

    #[test]
    fn test_unknown_feed_and_duplicates() {
        let config = FeedMirrorConfig::from_toml_str("").unwrap();
        assert!(matches!(
            config.feed("nope"),
            Err(FeedMirrorError::FeedNotFound(_))
        ));

        let dup = FeedMirrorConfig::from_toml_str(
            r#"
[[feeds]]
id = "a"
url = "https://example.com/a.ics"

[[feeds]]
id = "a"
url = "https://example.com/b.ics"
"#,
        );
        assert!(matches!(dup, Err(FeedMirrorError::Config(_))));
    }

    #[test]
    fn test_default_file_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedmirror").join("config.toml");
        FeedMirrorConfig::create_default_config(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let config = FeedMirrorConfig::from_toml_str(&content).unwrap();
        assert!(config.feeds.is_empty());
    }
}
