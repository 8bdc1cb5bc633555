use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the campaign ledger CLI and services.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path (default: `.campaign-ledger/` in current directory)
    pub data_dir: PathBuf,

    /// Output format: "human" (default) or "json"
    pub output_format: String,

    /// Log level: "info", "debug", "warn", "error" (default: "info")
    pub log_level: String,

    /// Platform fee taken from every gross clip payment, in percent (default: 10)
    pub platform_fee_percent: Decimal,

    /// Deadline for calls to the campaign and clip services (default: 5s)
    pub upstream_timeout: Duration,

    /// Most upstream calls allowed on helper threads at once (default: 16)
    pub upstream_max_in_flight: usize,
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        let data_dir = env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".campaign-ledger");

        Config {
            data_dir,
            output_format: "human".to_string(),
            log_level: "info".to_string(),
            platform_fee_percent: Decimal::from(10),
            upstream_timeout: Duration::from_millis(5_000),
            upstream_max_in_flight: 16,
        }
    }

    /// Create config with custom data directory
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Config {
            data_dir,
            ..Config::new()
        }
    }

    pub fn get_data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn set_data_dir(&mut self, dir: PathBuf) {
        self.data_dir = dir;
    }

    pub fn get_output_format(&self) -> &str {
        &self.output_format
    }

    /// Set output format ("human" or "json")
    pub fn set_output_format(&mut self, format: String) {
        self.output_format = format;
    }

    pub fn get_log_level(&self) -> &str {
        &self.log_level
    }

    pub fn set_log_level(&mut self, level: String) {
        self.log_level = level;
    }

    pub fn get_platform_fee_percent(&self) -> Decimal {
        self.platform_fee_percent
    }

    pub fn set_platform_fee_percent(&mut self, percent: Decimal) {
        self.platform_fee_percent = percent;
    }

    pub fn get_upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }

    pub fn get_upstream_max_in_flight(&self) -> usize {
        self.upstream_max_in_flight
    }

    /// Get ledger transaction log path
    pub fn get_tx_log_path(&self) -> PathBuf {
        self.data_dir.join("ledger.log")
    }

    /// Get ledger snapshot path
    pub fn get_state_path(&self) -> PathBuf {
        self.data_dir.join("ledger.bin")
    }

    /// Load config from environment variables
    ///
    /// Environment variables:
    /// - `CAMPAIGN_LEDGER_DATA_DIR`: override data directory
    /// - `CAMPAIGN_LEDGER_OUTPUT_FORMAT`: "human" or "json"
    /// - `CAMPAIGN_LEDGER_LOG_LEVEL`: log level
    /// - `CAMPAIGN_LEDGER_PLATFORM_FEE_PERCENT`: decimal percent, e.g. "12.5"
    /// - `CAMPAIGN_LEDGER_UPSTREAM_TIMEOUT_MS`: milliseconds
    /// - `CAMPAIGN_LEDGER_UPSTREAM_MAX_IN_FLIGHT`: positive count
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Config::new();

        if let Ok(dir) = env::var("CAMPAIGN_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(format) = env::var("CAMPAIGN_LEDGER_OUTPUT_FORMAT") {
            config.output_format = format;
        }

        if let Ok(level) = env::var("CAMPAIGN_LEDGER_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(raw) = env::var("CAMPAIGN_LEDGER_PLATFORM_FEE_PERCENT") {
            match Decimal::from_str(raw.trim()) {
                Ok(percent) if percent >= Decimal::ZERO && percent <= Decimal::ONE_HUNDRED => {
                    config.platform_fee_percent = percent;
                }
                _ => tracing::warn!(value = %raw, "ignoring invalid platform fee percent"),
            }
        }

        if let Ok(raw) = env::var("CAMPAIGN_LEDGER_UPSTREAM_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.upstream_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, "ignoring invalid upstream timeout"),
            }
        }

        if let Ok(raw) = env::var("CAMPAIGN_LEDGER_UPSTREAM_MAX_IN_FLIGHT") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.upstream_max_in_flight = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid upstream in-flight limit"),
            }
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new();
        assert_eq!(config.output_format, "human");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.platform_fee_percent, Decimal::from(10));
        assert_eq!(config.get_upstream_max_in_flight(), 16);
        assert!(config.data_dir.ends_with(".campaign-ledger"));
    }

    #[test]
    fn test_config_paths() {
        let config = Config::with_data_dir(PathBuf::from("/tmp/cl"));
        assert_eq!(config.get_tx_log_path(), PathBuf::from("/tmp/cl/ledger.log"));
        assert!(config.get_state_path().ends_with("ledger.bin"));
    }

    #[test]
    fn test_config_setters() {
        let mut config = Config::new();
        config.set_output_format("json".to_string());
        assert_eq!(config.get_output_format(), "json");

        config.set_log_level("debug".to_string());
        assert_eq!(config.get_log_level(), "debug");

        config.set_platform_fee_percent(Decimal::new(125, 1));
        assert_eq!(config.get_platform_fee_percent(), Decimal::new(125, 1));
    }
}
