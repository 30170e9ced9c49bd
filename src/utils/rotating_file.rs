//! Rotating log file sink
//!
//! Files are named `<prefix>_<unix start>.log` and each one opens with a session
//! banner. Rotation is triggered by elapsed time, file size, or either of them.
//! The writer is wrapped in `tracing_appender::non_blocking` by the binary.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What triggers a rotation
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationType {
    #[default]
    None,
    Time,
    Size,
    TimeSize,
}

/// Parsed rotation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub kind: RotationType,
    /// Maximum file age in seconds
    pub max_age_secs: Option<u64>,
    /// Maximum file size in bytes
    pub max_size_bytes: Option<u64>,
}

impl RotationPolicy {
    pub fn none() -> Self {
        Self {
            kind: RotationType::None,
            max_age_secs: None,
            max_size_bytes: None,
        }
    }

    /// Build a policy from its type and amount string.
    ///
    /// `time_size` expects `"<time>|<size>"`, e.g. `"1 day|10 mb"`.
    pub fn parse(kind: RotationType, amount: Option<&str>) -> Result<Self> {
        let require = || amount.context("rotation_amount is required for this rotation type");
        match kind {
            RotationType::None => Ok(Self::none()),
            RotationType::Size => Ok(Self {
                kind,
                max_age_secs: None,
                max_size_bytes: Some(parse_size(require()?)?),
            }),
            RotationType::Time => Ok(Self {
                kind,
                max_age_secs: Some(parse_duration_secs(require()?)?),
                max_size_bytes: None,
            }),
            RotationType::TimeSize => {
                let (time, size) = require()?
                    .split_once('|')
                    .context("time_size rotation expects \"<time>|<size>\"")?;
                Ok(Self {
                    kind,
                    max_age_secs: Some(parse_duration_secs(time)?),
                    max_size_bytes: Some(parse_size(size)?),
                })
            }
        }
    }

    /// Decide whether a file started at `start` should be closed.
    pub fn should_rotate(&self, start: i64, now: i64, size: u64) -> bool {
        let elapsed = u64::try_from(now.saturating_sub(start)).unwrap_or(0);
        let too_old = self
            .max_age_secs
            .map(|limit| elapsed > limit)
            .unwrap_or(false);
        let too_big = self
            .max_size_bytes
            .map(|limit| size >= limit)
            .unwrap_or(false);

        match self.kind {
            RotationType::None => false,
            RotationType::Time => too_old,
            RotationType::Size => too_big,
            RotationType::TimeSize => too_old || too_big,
        }
    }
}

fn split_amount(amount: &str) -> Result<(u64, String)> {
    let parts: Vec<&str> = amount.split_whitespace().collect();
    if parts.len() != 2 {
        bail!("expected \"<number> <unit>\", got {:?}", amount);
    }
    let value = parts[0]
        .parse::<u64>()
        .with_context(|| format!("invalid number in {:?}", amount))?;
    Ok((value, parts[1].to_lowercase()))
}

/// Parse `"10 mb"` into bytes. Unknown units count as bytes.
pub fn parse_size(amount: &str) -> Result<u64> {
    let (value, unit) = split_amount(amount)?;
    let coefficient: u64 = match unit.as_str() {
        "b" | "byte" | "bytes" => 1,
        "kb" | "kilobyte" | "kilobytes" => 1024,
        "mb" | "megabyte" | "megabytes" => 1024 * 1024,
        "gb" | "gigabyte" | "gigabytes" => 1024 * 1024 * 1024,
        _ => 1,
    };
    value
        .checked_mul(coefficient)
        .with_context(|| format!("size {:?} is too large", amount))
}

/// Parse `"2 hours"` into seconds. Unknown units count as seconds.
pub fn parse_duration_secs(amount: &str) -> Result<u64> {
    let (value, unit) = split_amount(amount)?;
    let coefficient: u64 = match unit.as_str() {
        "s" | "second" | "seconds" => 1,
        "m" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 60 * 60 * 24,
        _ => 1,
    };
    value
        .checked_mul(coefficient)
        .with_context(|| format!("duration {:?} is too large", amount))
}

fn session_banner(stamp: i64) -> String {
    format!(
        "--- Logging Session Start ---\nTimestamp: {}\nProject: TELERAG\nVersion: {}\n\n{}\n",
        stamp,
        env!("CARGO_PKG_VERSION"),
        "-".repeat(20)
    )
}

/// Log file writer with time and size based rotation
pub struct RotatingFileWriter {
    dir: PathBuf,
    prefix: String,
    policy: RotationPolicy,
    start: i64,
    size: u64,
    path: PathBuf,
    file: File,
}

impl RotatingFileWriter {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>, policy: RotationPolicy) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {:?}", dir))?;

        let prefix = prefix.into();
        let start = Utc::now().timestamp();
        let (path, file, size) = open_session(&dir, &prefix, start)?;

        Ok(Self {
            dir,
            prefix,
            policy,
            start,
            size,
            path,
            file,
        })
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let start = Utc::now().timestamp();
        let (path, file, size) = open_session(&self.dir, &self.prefix, start)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.start = start;
        self.size = size;
        self.path = path;
        self.file = file;
        Ok(())
    }
}

fn open_session(dir: &Path, prefix: &str, start: i64) -> Result<(PathBuf, File, u64)> {
    let mut path = dir.join(format!("{}_{}.log", prefix, start));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}_{}.log", prefix, start, n));
        n += 1;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;

    let banner = session_banner(start);
    file.write_all(banner.as_bytes())?;
    file.flush()?;

    Ok((path, file, banner.len() as u64))
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.size += written as u64;

        if self
            .policy
            .should_rotate(self.start, Utc::now().timestamp(), self.size)
        {
            self.rotate()?;
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
