use anyhow::{anyhow, Result};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Noisy HTTP internals stay at warn unless -vv is given
const DEBUG_FILTER: &str = "debug,hyper::proto::h1=warn,hyper::client::pool=warn,rustls=warn";

pub fn init_logging(verbose_level: u8, quiet: bool) -> Result<()> {
    init_logging_with_file(verbose_level, quiet, None)
}

/// Log to stderr, or to a daily-rotated file when `log_file` is set
/// (`scrobbler.log` becomes `scrobbler.2026-10-18`).
pub fn init_logging_with_file(verbose_level: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let registry = Registry::default().with(build_filter(verbose_level, quiet));
    let json = wants_json();

    match log_file {
        Some(path) => {
            let appender = file_appender(&path)?;
            if json {
                registry
                    .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).with_writer(appender))
                    .init();
            } else {
                registry
                    .with(
                        fmt::layer()
                            .with_timer(ChronoUtc::rfc_3339())
                            .with_ansi(false)
                            .with_writer(appender),
                    )
                    .init();
            }
        }
        None if json => {
            registry
                .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).with_writer(io::stderr))
                .init();
        }
        None => {
            registry
                .with(fmt::layer().with_timer(ChronoUtc::rfc_3339()).with_writer(io::stderr))
                .init();
        }
    }

    Ok(())
}

fn build_filter(verbose_level: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    let default = match verbose_level {
        0 => "info",
        1 => DEBUG_FILTER,
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn wants_json() -> bool {
    std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal())
}

fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("Log file path has no parent directory: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;

    let prefix = log_prefix(path).ok_or_else(|| anyhow!("Invalid log filename: {}", path.display()))?;
    Ok(RollingFileAppender::new(Rotation::DAILY, dir, prefix))
}

fn log_prefix(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    Some(name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_prefix_strips_extension() {
        assert_eq!(log_prefix(Path::new("/var/log/scrobbler.log")), Some("scrobbler"));
        assert_eq!(log_prefix(Path::new("/var/log/scrobbler")), Some("scrobbler"));
        assert_eq!(log_prefix(Path::new("/")), None);
    }
}
