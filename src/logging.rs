use crate::error::{AnalysisError, Result};
use chrono::Local;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use yansi::Paint;

/// Installs the global logger for the CLI
///
/// `level` comes from the `--log-level` flag; an unknown name is a startup
/// configuration error. A `RUST_LOG` spec in the environment overrides the
/// flag, so per-module filtering stays available in the field.
pub fn init(level: &str) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .filter_level(level_filter(level)?)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {} {}",
                Local::now().format("%H:%M:%S%.3f"),
                colored_level(record.level()),
                Paint::new(record.target()).dimmed(),
                record.args()
            )
        });
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder
        .try_init()
        .map_err(|e| AnalysisError::Config(format!("logger already installed: {}", e)))?;
    Ok(())
}

fn level_filter(level: &str) -> Result<LevelFilter> {
    match level.to_lowercase().as_str() {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => Err(AnalysisError::Config(format!(
            "unknown log level '{}', expected one of off, error, warn, info, debug, trace",
            other
        ))),
    }
}

// Fixed-width so multi-line output stays aligned
fn colored_level(level: Level) -> String {
    match level {
        Level::Error => Paint::red("ERROR").bold().to_string(),
        Level::Warn => Paint::yellow(" WARN").to_string(),
        Level::Info => Paint::green(" INFO").to_string(),
        Level::Debug => Paint::blue("DEBUG").to_string(),
        Level::Trace => Paint::magenta("TRACE").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names_map_to_filters() {
        assert_eq!(level_filter("info").unwrap(), LevelFilter::Info);
        assert_eq!(level_filter("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(level_filter("off").unwrap(), LevelFilter::Off);
    }

    #[test]
    fn test_unknown_level_is_a_config_error() {
        let err = level_filter("loud").unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
        assert!(err.to_string().contains("loud"));
    }
}
