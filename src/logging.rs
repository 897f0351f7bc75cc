/// Filter directive read at startup; falls back to `DEFAULT_FILTER`.
pub const LOG_ENV: &str = "RECORDBOOKD_LOG";
pub const DEFAULT_FILTER: &str = "recordbookd=info";

/// JSON lines on stderr. Stdout carries IPC responses and must stay clean.
pub fn init() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .json()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}
