/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::IngestConfig;
use crate::error::{CdmError, Result};

/// Resolve the effective level: `verbose` wins over `log_level`
pub fn effective_level(config: &IngestConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &IngestConfig) -> Result<()> {
    let log_level = effective_level(config);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("cdm_ingest={}", log_level)))
        .map_err(|e| CdmError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stderr_logging(env_filter);
    }

    Ok(())
}

/// Log to stderr so the summary on stdout stays clean
fn init_stderr_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// One JSON object per event, item fields (`genome_id`, `key`, ...) at top level
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path).map_err(|e| {
        CdmError::Config(format!("Failed to create log file {}: {}", log_path.display(), e))
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cdm_ingest=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}
