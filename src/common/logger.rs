use crate::common::config::LoggerConfig;
use log::{info, LevelFilter};
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{runtime::ConfigErrors, Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {t} - {m}\n";

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Failed to prepare log file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to build log roller: {0}")]
    Roller(String),
    #[error("Invalid logger configuration: {0}")]
    Config(#[from] ConfigErrors),
    #[error("Logger already initialised: {0}")]
    Init(#[from] log::SetLoggerError),
}

pub fn parse_level(level: &str) -> LevelFilter {
    LevelFilter::from_str(level).unwrap_or(LevelFilter::Info)
}

/// Builds the log4rs configuration: a threshold-filtered stderr appender
/// plus, unless `path` is empty, a size-rolled log file.
pub fn build_config(config: &LoggerConfig) -> Result<Config, LoggerError> {
    let level = parse_level(&config.level);

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(level)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");

    if !config.path.is_empty() {
        let trigger = SizeTrigger::new(config.file_size * 1024 * 1024);
        let roller = FixedWindowRoller::builder()
            .base(0)
            .build(&config.archive_pattern, config.file_count)
            .map_err(|e| LoggerError::Roller(e.to_string()))?;
        let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

        if let Some(parent) = Path::new(&config.path).parent() {
            fs::create_dir_all(parent)?;
        }

        let logfile = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(&config.path, Box::new(policy))?;

        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    Ok(builder.build(root.build(level))?)
}

pub fn setup_logger(config: &LoggerConfig) -> Result<log4rs::Handle, LoggerError> {
    let handle = log4rs::init_config(build_config(config)?)?;

    info!("Logger initialized ({})", parse_level(&config.level));
    if config.path.is_empty() {
        info!("File logging disabled");
    } else {
        info!(
            "Log file: '{}', archive: '{}'",
            config.path, config.archive_pattern
        );
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("chatty"), LevelFilter::Info);
    }

    #[test]
    fn test_console_only_config() {
        let config = LoggerConfig {
            path: String::new(),
            ..LoggerConfig::default()
        };
        let built = build_config(&config).unwrap();
        assert_eq!(built.appenders().len(), 1);
        assert_eq!(built.root().level(), LevelFilter::Info);
    }

    #[test]
    fn test_file_config_creates_log_directory() {
        let dir = std::env::temp_dir().join(format!("socks5-relay-logs-{}", std::process::id()));
        let config = LoggerConfig {
            level: "debug".to_string(),
            path: dir.join("relay.log").to_string_lossy().into_owned(),
            archive_pattern: dir.join("relay-{}.log").to_string_lossy().into_owned(),
            ..LoggerConfig::default()
        };

        let built = build_config(&config).unwrap();
        assert_eq!(built.appenders().len(), 2);
        assert_eq!(built.root().level(), LevelFilter::Debug);
        assert!(dir.is_dir());

        let _ = fs::remove_dir_all(&dir);
    }
}
