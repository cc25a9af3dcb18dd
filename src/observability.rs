// Logging and tracing initialization.
// Called once at startup; repeated calls (test harnesses) are a no-op.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging honouring LOG_LEVEL, with RUST_LOG as an
/// override for finer-grained per-module filtering.
pub fn init_logging(log_level: &str) -> Result<()> {
    let default_filter = match log_level.to_ascii_uppercase().as_str() {
        "TRACE" => "engagic=trace,info",
        "DEBUG" => "engagic=debug,info",
        "INFO" => "engagic=info,warn",
        "WARN" | "WARNING" => "engagic=warn,error",
        "ERROR" => "error",
        other => {
            eprintln!("unknown LOG_LEVEL {other:?}, falling back to INFO");
            "engagic=info,warn"
        }
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true);

    // try_init fails when a subscriber is already set, which is fine in
    // test environments.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    Ok(())
}
