//! Configuration file parser for ~/.config/scephoto/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Sync engine configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Command-line flags override whatever the file sets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master feed URI. Required, either here or on the command line.
    pub feed_uri: Option<Url>,

    /// Directory for cached feed documents and media. Defaults to
    /// `<config dir>/cache` when unset.
    pub cache_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Upper bound on a single downloaded document.
    pub max_feed_size_bytes: usize,

    /// Download images, thumbnails and description files after the feeds.
    pub download_media: bool,

    pub max_concurrent_downloads: usize,

    /// Base delay for retry backoff; doubles on each retry.
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_uri: None,
            cache_dir: None,
            request_timeout_secs: 30,
            max_feed_size_bytes: 10 * 1024 * 1024,
            download_media: false,
            max_concurrent_downloads: 4,
            retry_backoff_ms: 2000,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "feed_uri",
        "cache_dir",
        "request_timeout_secs",
        "max_feed_size_bytes",
        "download_media",
        "max_concurrent_downloads",
        "retry_backoff_ms",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or an unparsable `feed_uri` → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feed_uri = ?config.feed_uri.as_ref().map(Url::as_str),
            download_media = config.download_media,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("scephoto_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.feed_uri.is_none());
        assert!(config.cache_dir.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_feed_size_bytes, 10 * 1024 * 1024);
        assert!(!config.download_media);
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.retry_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/scephoto_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_and_whitespace_files_return_default() {
        for (name, content) in [("empty", ""), ("whitespace", "   \n  \n  ")] {
            let (dir, path) = write_config(name, content);
            assert_eq!(Config::load(&path).unwrap(), Config::default());
            std::fs::remove_dir_all(&dir).ok();
        }
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "download_media = true\n");

        let config = Config::load(&path).unwrap();
        assert!(config.download_media);
        assert_eq!(config.request_timeout_secs, 30); // default
        assert!(config.feed_uri.is_none()); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
feed_uri = "http://photos.example.com/feeds/master.xml"
cache_dir = "/var/cache/scephoto"
request_timeout_secs = 10
max_feed_size_bytes = 4096
download_media = true
max_concurrent_downloads = 8
retry_backoff_ms = 250
"#;
        let (dir, path) = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.feed_uri.as_ref().map(Url::as_str),
            Some("http://photos.example.com/feeds/master.xml")
        );
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/scephoto")));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_feed_size_bytes, 4096);
        assert!(config.download_media);
        assert_eq!(config.max_concurrent_downloads, 8);
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_feed_uri_returns_error() {
        let (dir, path) = write_config("bad_uri", "feed_uri = \"not a uri\"\n");

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let content = r#"
download_media = true
totally_fake_key = "should not fail"
"#;
        let (dir, path) = write_config("unknown", content);

        let config = Config::load(&path).unwrap();
        assert!(config.download_media);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "request_timeout_secs = \"soon\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_at_size_limit_accepted() {
        let mut content = "download_media = false\n".to_string();
        while content.len() < 1_048_576 - 20 {
            content.push_str("# padding comment\n");
        }
        content.truncate(1_048_576);
        let (dir, path) = write_config("at_limit", &content);

        assert!(Config::load(&path).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
