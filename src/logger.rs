//! Logging setup for campaign-ledger.
//!
//! Library code only emits `tracing` events; binaries call [`init`] once.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered at `level` ("info", "debug", "warn", "error").
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is harmless: the second
/// install fails quietly and the first subscriber stays active.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("campaign_ledger={}", normalize_level(level))));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}
