use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialise the global tracing subscriber.
///
/// Always installs a compact stderr layer. When `log_dir` is configured, a
/// JSON daily-rolling file layer is added; the returned [`WorkerGuard`] must
/// be held for the process lifetime — dropping it flushes the file writer.
pub fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("perp_pilot=info,warn"));

    match &logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "pilot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false).json())
                .with(stderr_layer)
                .init();

            Ok(Some(guard))
        }
        None => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();

            Ok(None)
        }
    }
}
