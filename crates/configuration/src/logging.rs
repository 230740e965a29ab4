use crate::error::ConfigError;
use crate::settings::LoggingSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global `tracing` subscriber.
///
/// Log lines go to stdout through a non-blocking writer. The returned guard flushes
/// that writer when dropped, so keep it alive for as long as the process runs.
pub fn init_tracing(settings: &LoggingSettings) -> Result<WorkerGuard, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| ConfigError::ValidationError(format!("logging.filter: {e}")))?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

/// Routes panic reports through `tracing`, with a backtrace captured at the panic site.
///
/// Handlers that panic are still answered by the HTTP fallback layer; this hook only
/// makes sure the operator sees where it happened.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!(panic = %info, backtrace = %backtrace, "Panic.");
    }));
}
