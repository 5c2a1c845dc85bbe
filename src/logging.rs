use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes logging: human-readable console output plus a daily-rolled
/// JSON file under the log directory (DWH_LOG_DIR, default "logs").
pub fn init_logging() {
    let log_dir = std::env::var("DWH_LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _ = fs::create_dir_all(&log_dir);

    // Non-blocking appender so a slow disk never stalls a stage
    let file_appender = tracing_appender::rolling::daily(&log_dir, "dwh_etl.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("dwh_etl=info".parse().unwrap()))
        .with(file_layer)
        .with(console_layer)
        .init();

    // The guard must outlive main or buffered lines are lost on exit
    std::mem::forget(_guard);
}
