//! Tracing setup. Console output goes to stderr: stdout carries the MCP stdio transport.

use anyhow::Context as _;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

pub const LOG_FILE_NAME: &str = "server.log";

pub struct LogOptions<'a> {
    pub level: &'a str,
    pub dir: Option<&'a Path>,
    pub json: bool,
}

/// `RUST_LOG` wins over the configured level.
///
/// # Errors
///
/// Fails if `level` is not a valid filter directive.
pub fn filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(f) => Ok(f),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'")),
    }
}

/// Install the global subscriber. Keep the returned guard alive for the life of the process so
/// buffered file output is flushed.
///
/// # Errors
///
/// Fails on an invalid level, an unusable log directory, or if a global subscriber is
/// already installed.
pub fn init(opts: &LogOptions<'_>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = filter(opts.level)?;

    let (file_layer, guard) = match opts.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let console_json = opts
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let console_text = (!opts.json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_json)
        .with(console_text)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(filter("INFO").is_ok());
        assert!(filter("debug").is_ok());
        assert!(filter("cube_mcp_client=trace,info").is_ok());
    }

    #[test]
    fn garbage_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(filter("info,cube_mcp_client=loud").is_err());
    }
}
