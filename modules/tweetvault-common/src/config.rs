use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, VaultError};

/// Public web-client bearer token used to activate anonymous guest sessions.
pub const DEFAULT_BEARER_TOKEN: &str =
    "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Application configuration. `Default` gives the stock settings;
/// `from_env` overlays `TWEETVAULT_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub fetch: FetchConfig,
    pub media: MediaConfig,
    pub merge: MergePolicy,
    pub retention: RetentionPolicy,
    /// Upper bound on collect/fetch rounds, even when every round is approved.
    pub max_enrichment_rounds: u32,
}

/// Remote lookup client settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub api_base_url: String,
    pub bearer_token: String,
    /// Identities per lookup request. The API caps this at 100.
    pub batch_size: usize,
    /// Fresh guest tokens to try for one batch before giving up on it.
    pub max_token_refreshes: u32,
    pub request_timeout: Duration,
}

/// Media upgrade engine settings.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub max_passes: u32,
    /// Pause between attempts in the first pass.
    pub initial_delay: Duration,
    /// Added to the pause after every pass.
    pub delay_growth: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Prefix of original-quality image URLs; `/<file>:orig` is appended.
    pub original_media_base: String,
}

/// Field-level rules for the merge engine.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    /// Field that identifies objects inside lists (and records themselves).
    pub identity_field: String,
    /// Cumulative counters: the larger value wins.
    pub counter_fields: BTreeSet<String>,
    /// Noisy fields whose incoming value is dropped silently.
    pub ignored_fields: BTreeSet<String>,
}

/// What the merged-record cache keeps between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Every record ever fetched, regardless of author or relation.
    #[default]
    KeepAll,
    /// Archive records plus the records they directly quote or reply to.
    ArchiveAndReferenced,
}

impl FromStr for RetentionPolicy {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keep-all" => Ok(RetentionPolicy::KeepAll),
            "archive-and-referenced" => Ok(RetentionPolicy::ArchiveAndReferenced),
            other => Err(VaultError::Config(format!(
                "unknown retention policy {other:?} (expected keep-all or archive-and-referenced)"
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            media: MediaConfig::default(),
            merge: MergePolicy::default(),
            retention: RetentionPolicy::default(),
            max_enrichment_rounds: 10,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.twitter.com/1.1".to_string(),
            bearer_token: DEFAULT_BEARER_TOKEN.to_string(),
            batch_size: 100,
            max_token_refreshes: 5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_passes: 5,
            initial_delay: Duration::from_millis(250),
            delay_growth: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            original_media_base: "https://pbs.twimg.com/media".to_string(),
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        let set = |fields: &[&str]| fields.iter().map(|f| f.to_string()).collect();
        Self {
            identity_field: "id_str".to_string(),
            counter_fields: set(&[
                "retweet_count",
                "favorite_count",
                "reply_count",
                "quote_count",
                "followers_count",
                "friends_count",
                "listed_count",
                "statuses_count",
                "favourites_count",
                "media_count",
            ]),
            ignored_fields: set(&[
                "favorited",
                "retweeted",
                "possibly_sensitive",
                "truncated",
                "display_text_range",
                "source",
                "lang",
                "edit_info",
                "withheld_in_countries",
            ]),
        }
    }
}

impl Config {
    /// Defaults overlaid with any `TWEETVAULT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = optional_env("TWEETVAULT_API_BASE_URL") {
            config.fetch.api_base_url = url;
        }
        if let Some(token) = optional_env("TWEETVAULT_BEARER_TOKEN") {
            config.fetch.bearer_token = token;
        }
        if let Some(size) = parsed_env::<usize>("TWEETVAULT_BATCH_SIZE")? {
            if size == 0 || size > 100 {
                return Err(VaultError::Config(
                    "TWEETVAULT_BATCH_SIZE must be between 1 and 100".to_string(),
                ));
            }
            config.fetch.batch_size = size;
        }
        if let Some(n) = parsed_env("TWEETVAULT_MAX_TOKEN_REFRESHES")? {
            config.fetch.max_token_refreshes = n;
        }
        if let Some(secs) = parsed_env("TWEETVAULT_FETCH_TIMEOUT_SECS")? {
            config.fetch.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parsed_env("TWEETVAULT_MEDIA_PASSES")? {
            config.media.max_passes = n;
        }
        if let Some(ms) = parsed_env("TWEETVAULT_MEDIA_DELAY_MS")? {
            config.media.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed_env("TWEETVAULT_MEDIA_DELAY_GROWTH_MS")? {
            config.media.delay_growth = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed_env("TWEETVAULT_MEDIA_TIMEOUT_SECS")? {
            config.media.request_timeout = Duration::from_secs(secs);
        }
        if let Some(base) = optional_env("TWEETVAULT_MEDIA_BASE_URL") {
            config.media.original_media_base = base.trim_end_matches('/').to_string();
        }
        if let Some(policy) = parsed_env("TWEETVAULT_RETENTION")? {
            config.retention = policy;
        }
        if let Some(n) = parsed_env("TWEETVAULT_MAX_ROUNDS")? {
            config.max_enrichment_rounds = n;
        }

        Ok(config)
    }

    /// Log the effective configuration with the bearer token masked.
    pub fn log_redacted(&self) {
        info!(
            api_base_url = %self.fetch.api_base_url,
            bearer_token = %redact(&self.fetch.bearer_token),
            batch_size = self.fetch.batch_size,
            max_token_refreshes = self.fetch.max_token_refreshes,
            media_passes = self.media.max_passes,
            media_delay_ms = self.media.initial_delay.as_millis() as u64,
            media_delay_growth_ms = self.media.delay_growth.as_millis() as u64,
            retention = ?self.retention,
            max_enrichment_rounds = self.max_enrichment_rounds,
            "Configuration loaded"
        );
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}***")
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| VaultError::Config(format!("{key}={raw:?} is invalid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stock_settings() {
        let config = Config::default();
        assert_eq!(config.fetch.batch_size, 100);
        assert_eq!(config.media.max_passes, 5);
        assert_eq!(config.media.initial_delay, Duration::from_millis(250));
        assert_eq!(config.media.delay_growth, Duration::from_secs(2));
        assert_eq!(config.retention, RetentionPolicy::KeepAll);
        assert!(config.merge.counter_fields.contains("retweet_count"));
        assert!(config.merge.ignored_fields.contains("possibly_sensitive"));
    }

    #[test]
    fn retention_parses_known_names() {
        assert_eq!(
            "archive-and-referenced".parse::<RetentionPolicy>().unwrap(),
            RetentionPolicy::ArchiveAndReferenced
        );
        assert!("prune-everything".parse::<RetentionPolicy>().is_err());
    }

    #[test]
    fn redaction_keeps_only_prefix() {
        assert_eq!(redact("AAAAAAAAAAAAAAAA"), "AAAA***");
        assert_eq!(redact("short"), "***");
    }
}
