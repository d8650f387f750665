//! Application configuration loaded from environment variables.

use std::time::Duration;

use twopc::{CoordinatorConfig, ParticipantConfig, RetryPolicy, TransactionLayout};

/// Server and engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `TXN_ROOT`: parent node of transaction directories (default: `"/transactions"`)
/// - `COMMIT_MAX_ATTEMPTS`: commit hook attempts per participant (default: `5`)
/// - `COMMIT_BACKOFF_MS`: initial commit retry delay, doubled per retry (default: `100`)
/// - `PREPARE_TIMEOUT_MS`: vote deadline, `0` waits forever (default: `30000`)
/// - `ABORT_GRACE_MS`: wait for nodes to leave after ABORT (default: `5000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub txn_root: String,
    pub commit_max_attempts: u32,
    pub commit_backoff_ms: u64,
    pub prepare_timeout_ms: u64,
    pub abort_grace_ms: u64,
}

/// Upper bound for a single commit retry delay.
const MAX_COMMIT_BACKOFF: Duration = Duration::from_secs(10);

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            txn_root: lookup("TXN_ROOT").unwrap_or(defaults.txn_root),
            commit_max_attempts: lookup("COMMIT_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.commit_max_attempts),
            commit_backoff_ms: parsed("COMMIT_BACKOFF_MS", defaults.commit_backoff_ms),
            prepare_timeout_ms: parsed("PREPARE_TIMEOUT_MS", defaults.prepare_timeout_ms),
            abort_grace_ms: parsed("ABORT_GRACE_MS", defaults.abort_grace_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Commit retry policy handed to every participant.
    pub fn commit_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.commit_max_attempts,
            Duration::from_millis(self.commit_backoff_ms),
            MAX_COMMIT_BACKOFF,
        )
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let prepare_timeout =
            (self.prepare_timeout_ms > 0).then(|| Duration::from_millis(self.prepare_timeout_ms));
        CoordinatorConfig::new(TransactionLayout::new(self.txn_root.clone()))
            .with_prepare_timeout(prepare_timeout)
            .with_participant_commit_retry(&self.commit_retry())
            .with_abort_grace(Duration::from_millis(self.abort_grace_ms))
    }

    pub fn participant_config(&self) -> ParticipantConfig {
        ParticipantConfig::new(TransactionLayout::new(self.txn_root.clone()))
            .with_commit_retry(self.commit_retry())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            txn_root: "/transactions".to_string(),
            commit_max_attempts: 5,
            commit_backoff_ms: 100,
            prepare_timeout_ms: 30_000,
            abort_grace_ms: 5_000,
        }
    }
}
