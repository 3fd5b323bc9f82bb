use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use clap::Parser;
use serde::Deserialize;

use dlog_logs::SourceOptions;
use dlog_session::SessionConfig;

const DEFAULT_TAIL: i64 = 1000;
const DEFAULT_WINDOW_HOURS: i64 = 24;
/// Ten years; anything larger cannot be walked back through sensibly
const MAX_WINDOW_HOURS: i64 = 24 * 365 * 10;

/// dlog - A terminal pager for Docker container logs
#[derive(Parser, Debug, Default)]
#[command(name = "dlog")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of lines to show from the end of the logs (0 or less: only new output)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub tail: Option<i64>,

    /// Show timestamps
    #[arg(short, long)]
    pub timestamps: bool,

    /// Show existing logs and exit the stream instead of following
    #[arg(long)]
    pub no_follow: bool,

    /// Also load older history in windows, walking back to container creation
    #[arg(short, long)]
    pub download: bool,

    /// Send log messages to file
    #[arg(short, long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Read settings from a TOML file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Size of each history window in hours
    #[arg(long, value_name = "HOURS")]
    pub window_hours: Option<i64>,

    /// Mirror each container's logs to a temp file
    #[arg(long)]
    pub cache_file: bool,

    /// Keep at most this many lines in memory, dropping the oldest
    #[arg(long, value_name = "LINES")]
    pub max_lines: Option<usize>,
}

/// Settings file; every key is optional and command-line flags win
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub tail: Option<i64>,
    pub timestamps: Option<bool>,
    pub follow: Option<bool>,
    pub download: Option<bool>,
    pub log: Option<PathBuf>,
    pub window_hours: Option<i64>,
    pub cache_file: Option<bool>,
    pub max_lines: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }
}

/// Resolved settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub tail: i64,
    pub timestamps: bool,
    pub follow: bool,
    pub download: bool,
    pub log: Option<PathBuf>,
    pub window: TimeDelta,
    pub cache_file: bool,
    pub max_lines: Option<usize>,
}

impl Config {
    /// Resolve command-line flags, reading `--config` if given
    pub fn from_args(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let window_hours = args
            .window_hours
            .or(file.window_hours)
            .unwrap_or(DEFAULT_WINDOW_HOURS);
        if !(1..=MAX_WINDOW_HOURS).contains(&window_hours) {
            bail!(
                "window size must be between 1 and {} hours, got {}",
                MAX_WINDOW_HOURS,
                window_hours
            );
        }
        let window = TimeDelta::try_hours(window_hours).context("window size out of range")?;

        Ok(Self {
            tail: args.tail.or(file.tail).unwrap_or(DEFAULT_TAIL),
            timestamps: args.timestamps || file.timestamps.unwrap_or(false),
            follow: !args.no_follow && file.follow.unwrap_or(true),
            download: args.download || file.download.unwrap_or(false),
            log: args.log.or(file.log),
            window,
            cache_file: args.cache_file || file.cache_file.unwrap_or(false),
            max_lines: args.max_lines.or(file.max_lines),
        })
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            tail: self.tail,
            follow: self.follow,
            timestamps: self.timestamps,
            download: self.download,
            window: self.window,
            ..Default::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            source: self.source_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::merge(Args::default(), FileConfig::default()).unwrap();
        assert_eq!(config.tail, 1000);
        assert!(config.follow);
        assert!(!config.download);
        assert_eq!(config.window, TimeDelta::hours(24));
        assert_eq!(config.max_lines, None);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            tail = 50
            follow = true
            download = true
            window-hours = 6
            max-lines = 500
            log = "/tmp/dlog.log"
            "#,
        )
        .unwrap();

        let args = Args::try_parse_from(["dlog", "-n", "10", "--no-follow", "--window-hours", "12"]).unwrap();
        let config = Config::merge(args, file).unwrap();

        assert_eq!(config.tail, 10);
        assert!(!config.follow);
        assert!(config.download);
        assert_eq!(config.window, TimeDelta::hours(12));
        assert_eq!(config.log, Some(PathBuf::from("/tmp/dlog.log")));
        assert_eq!(config.max_lines, Some(500));
    }

    #[test]
    fn test_negative_tail_and_bad_window() {
        let args = Args::try_parse_from(["dlog", "--tail", "-1"]).unwrap();
        assert_eq!(Config::merge(args, FileConfig::default()).unwrap().tail, -1);

        let args = Args::try_parse_from(["dlog", "--window-hours", "0"]).unwrap();
        assert!(Config::merge(args, FileConfig::default()).is_err());
    }

    #[test]
    fn test_oversized_window_is_rejected() {
        for hours in ["3000000000", "9223372036854775807"] {
            let args = Args::try_parse_from(["dlog", "--window-hours", hours]).unwrap();
            let err = Config::merge(args, FileConfig::default()).unwrap_err();
            assert!(err.to_string().contains("window size must be between"));
        }

        let file: FileConfig = toml::from_str("window-hours = 87600").unwrap();
        let config = Config::merge(Args::default(), file).unwrap();
        assert_eq!(config.window, TimeDelta::hours(87_600));
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = true").is_err());
    }
}
