//! Logging setup
//!
//! Every call runs inside a [`call_span`] carrying its Call-ID. Text output
//! prefixes each record with `call{call_id=...}`; JSON output nests the
//! fields under `span`. `RUST_LOG` directives take precedence over the
//! configured level.

use std::io::IsTerminal;
use std::str::FromStr;

use tracing::{info, info_span, Level, Span, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;
use crate::errors::ConfigError;

/// Span every record of one call is emitted under
pub fn call_span(call_id: &str) -> Span {
    info_span!("call", call_id = %call_id)
}

/// Parse a log level such as `info` or `DEBUG`
pub fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    Level::from_str(level)
        .map_err(|_| ConfigError::Invalid(format!("Invalid log level: {}", level)))
}

fn env_filter(settings: &LogSettings) -> Result<EnvFilter, ConfigError> {
    let level = parse_log_level(&settings.level)?;
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy())
}

/// Build the fmt subscriber described by `settings`, writing to `writer`
pub fn build_subscriber<W>(
    settings: &LogSettings,
    writer: W,
    ansi: bool,
) -> Result<Box<dyn Subscriber + Send + Sync>, ConfigError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter(settings)?)
        .with_writer(writer)
        .with_file(settings.file_info)
        .with_line_number(settings.file_info);

    if settings.json {
        Ok(Box::new(
            builder
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ))
    } else {
        Ok(Box::new(builder.with_ansi(ansi).finish()))
    }
}

/// Install the global subscriber on stdout. Fails if one is already installed.
pub fn setup_logging(settings: &LogSettings) -> Result<(), ConfigError> {
    let subscriber = build_subscriber(settings, std::io::stdout, std::io::stdout().is_terminal())?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        json = settings.json,
        "recording B2BUA logging ready at {}",
        settings.level
    );
    Ok(())
}
