use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, filter::EnvFilter, fmt};

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

const ENV_DEBUG: &str = "PAVEL_DEBUG";
const ENV_LOG_FORMAT: &str = "PAVEL_LOG_FORMAT";

fn panic_message<'a>(panic_info: &'a PanicHookInfo<'_>) -> &'a str {
    let payload = panic_info.payload();
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Reports panics as a single `error` event, so they end up in the configured log format on
/// stderr instead of the default panic output.
fn report_panic(panic_info: &PanicHookInfo<'_>) {
    let message = panic_message(panic_info);
    let location = panic_info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_default();

    // only captured when RUST_BACKTRACE or RUST_LIB_BACKTRACE is set
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        tracing::error!(location, "panicked: {message}\n{backtrace}");
    } else {
        tracing::error!(location, "panicked: {message}");
    }
}

fn env_flag(name: &str, expected: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v.eq_ignore_ascii_case(expected))
}

/// Installs the global subscriber. Everything is written to stderr, stdout carries delivery
/// reports and consumed payloads.
pub fn register() {
    // RUST_LOG can be used to set the log level, the default is `info`.
    let debug_mode = env_flag(ENV_DEBUG, "true");
    let default_log_level = if debug_mode { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::builder()
        .with_default_directive(default_log_level.into())
        .from_env_lossy();

    let layer = if env_flag(ENV_LOG_FORMAT, "json") {
        // JSON format, flattened
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .init();

    std::panic::set_hook(Box::new(report_panic));
}
