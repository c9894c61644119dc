//! Log file writer with size- or time-based rotation.
//!
//! Size rotation keeps numbered backups (`42.log.1` is the newest). Time
//! rotation renames the active file with a timestamp of the interval that
//! just ended (`42.log.2024-05-01`) and prunes the oldest backups.

use crate::config::LogConfig;
use chrono::{DateTime, Datelike, Duration, Local, TimeZone};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Rollover interval for time-based rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateWhen {
    Seconds,
    Minutes,
    Hours,
    Days,
    Midnight,
    /// Midnight before the given weekday, Monday = 0
    Weekday(u32),
}

impl RotateWhen {
    /// Parse `S`, `M`, `H`, `D`, `midnight` or `W0`..`W6` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "S" => Some(Self::Seconds),
            "M" => Some(Self::Minutes),
            "H" => Some(Self::Hours),
            "D" => Some(Self::Days),
            "MIDNIGHT" => Some(Self::Midnight),
            weekday => weekday
                .strip_prefix('W')
                .and_then(|day| day.parse::<u32>().ok())
                .filter(|day| *day <= 6)
                .map(Self::Weekday),
        }
    }

    fn interval(self) -> Duration {
        match self {
            Self::Seconds => Duration::seconds(1),
            Self::Minutes => Duration::minutes(1),
            Self::Hours => Duration::hours(1),
            Self::Days | Self::Midnight => Duration::days(1),
            Self::Weekday(_) => Duration::days(7),
        }
    }

    fn suffix_format(self) -> &'static str {
        match self {
            Self::Seconds => "%Y-%m-%d_%H-%M-%S",
            Self::Minutes => "%Y-%m-%d_%H-%M",
            Self::Hours => "%Y-%m-%d_%H",
            Self::Days | Self::Midnight | Self::Weekday(_) => "%Y-%m-%d",
        }
    }

    /// First rollover instant after `from`.
    pub fn next_rollover(self, from: DateTime<Local>) -> DateTime<Local> {
        match self {
            Self::Midnight => next_midnight(from),
            Self::Weekday(day) => {
                let today = from.weekday().num_days_from_monday();
                let wait = (day + 7 - today) % 7;
                next_midnight(from) + Duration::days(i64::from(wait))
            }
            other => from + other.interval(),
        }
    }
}

fn next_midnight(from: DateTime<Local>) -> DateTime<Local> {
    let date = from.date_naive() + Duration::days(1);
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| from + Duration::days(1))
}

/// How the scene log file is rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRotation {
    Never,
    Size { max_bytes: u64, backups: usize },
    Time { when: RotateWhen, backups: usize },
}

impl FileRotation {
    /// Read `LOG_FILE_TYPE` and its companion keys.
    pub fn from_config(config: &LogConfig) -> anyhow::Result<Self> {
        let backups = config.log_file_backup_count;
        match config.log_file_type.trim().to_ascii_uppercase().as_str() {
            "SINGLE-FILE" => Ok(Self::Never),
            "ROTATING_SIZE" => Ok(Self::Size {
                max_bytes: config.log_file_max_bytes,
                backups,
            }),
            "ROTATING_TIME" => {
                let when = RotateWhen::parse(&config.log_file_rotate_when).ok_or_else(|| {
                    anyhow::anyhow!(
                        "LOG_FILE_ROTATE_WHEN '{}' is not a valid interval",
                        config.log_file_rotate_when
                    )
                })?;
                Ok(Self::Time { when, backups })
            }
            _ => anyhow::bail!("LOG_FILE_TYPE '{}' not implemented", config.log_file_type),
        }
    }
}

/// Append-only log file that rotates itself before a write when due
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    rotation: FileRotation,
    written: u64,
    rollover_at: Option<DateTime<Local>>,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, rotation: FileRotation) -> io::Result<Self> {
        Self::open_at(path.into(), rotation, Local::now())
    }

    fn open_at(path: PathBuf, rotation: FileRotation, now: DateTime<Local>) -> io::Result<Self> {
        // An existing file rolls over relative to its last write
        let since = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Local>::from)
            .unwrap_or(now);

        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        let rollover_at = match rotation {
            FileRotation::Time { when, .. } => Some(when.next_rollover(since)),
            _ => None,
        };

        Ok(Self {
            path,
            file,
            rotation,
            written,
            rollover_at,
        })
    }

    fn write_at(&mut self, buf: &[u8], now: DateTime<Local>) -> io::Result<usize> {
        if self.should_roll(buf.len() as u64, now) {
            self.roll(now)?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn should_roll(&self, incoming: u64, now: DateTime<Local>) -> bool {
        match self.rotation {
            FileRotation::Never => false,
            // zero for either setting disables size rotation
            FileRotation::Size { max_bytes, backups } => {
                max_bytes > 0
                    && backups > 0
                    && self.written > 0
                    && self.written + incoming >= max_bytes
            }
            FileRotation::Time { .. } => self.rollover_at.is_some_and(|at| now >= at),
        }
    }

    fn roll(&mut self, now: DateTime<Local>) -> io::Result<()> {
        self.file.flush()?;

        match self.rotation {
            FileRotation::Never => return Ok(()),
            FileRotation::Size { backups, .. } => shift_numbered(&self.path, backups)?,
            FileRotation::Time { when, backups } => {
                let ended = self.rollover_at.unwrap_or(now) - when.interval();
                let target = with_suffix(&self.path, &ended.format(when.suffix_format()).to_string());
                replace(&self.path, &target)?;
                prune_dated(&self.path, backups)?;
                self.rollover_at = Some(when.next_rollover(now));
            }
        }

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(buf, Local::now())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn replace(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_file(to)?;
    }
    fs::rename(from, to)
}

/// `log` -> `log.1`, `log.1` -> `log.2`, ... dropping anything past `backups`.
fn shift_numbered(path: &Path, backups: usize) -> io::Result<()> {
    for index in (1..backups).rev() {
        let source = with_suffix(path, &index.to_string());
        if source.exists() {
            replace(&source, &with_suffix(path, &(index + 1).to_string()))?;
        }
    }
    replace(path, &with_suffix(path, "1"))
}

/// Keep the newest `backups` timestamped files. Zero keeps all of them.
fn prune_dated(path: &Path, backups: usize) -> io::Result<()> {
    if backups == 0 {
        return Ok(());
    }
    let (Some(dir), Some(base)) = (path.parent(), path.file_name()) else {
        return Ok(());
    };
    let prefix = format!("{}.", base.to_string_lossy());

    let mut dated: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.strip_prefix(&prefix)
                .and_then(|stamp| stamp.chars().next())
                .is_some_and(|c| c.is_ascii_digit())
        })
        .map(|entry| entry.path())
        .collect();

    // timestamps sort chronologically as text
    dated.sort();
    let excess = dated.len().saturating_sub(backups);
    for old in dated.into_iter().take(excess) {
        fs::remove_file(old)?;
    }
    Ok(())
}
