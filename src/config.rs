//! Configuration from the environment.
//!
//! rsvg-convert is normally run by other programs, which makes environment variables
//! the only practical way to configure it.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::cache::CacheOptions;
use crate::error::ParseError;

pub const CACHE_DIR_VAR: &str = "RSVG_CONVERT_CACHE_DIR";
pub const INKSCAPE_VAR: &str = "RSVG_CONVERT_INKSCAPE";
pub const TIMEOUT_VAR: &str = "RSVG_CONVERT_TIMEOUT";
pub const TOLERANT_VAR: &str = "RSVG_CONVERT_TOLERANT";
pub const MAX_AGE_VAR: &str = "RSVG_CONVERT_CACHE_MAX_AGE";
pub const LOG_VAR: &str = "RSVG_CONVERT_LOG";
pub const SOURCE_DATE_EPOCH_VAR: &str = "SOURCE_DATE_EPOCH";

const DEFAULT_CACHE_SUBDIR: &str = "rsvg-convert-cache";
const DEFAULT_INKSCAPE: &str = "inkscape";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub renderer: PathBuf,
    pub timeout: Duration,

    /// Ignore unknown options with a warning instead of failing.
    pub tolerant: bool,
    pub max_age: Option<Duration>,
    pub source_date_epoch: Option<i64>,
}

impl Config {
    pub fn from_env() -> Result<Config, ParseError> {
        Config::from_lookup(|var| env::var(var))
    }

    /// Reads the configuration through `lookup`, which behaves like [`std::env::var`].
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ParseError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let get = |var: &'static str| match lookup(var) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(ParseError::Environment {
                var,
                message: String::from("not valid Unicode"),
            }),
        };

        let cache_dir = get(CACHE_DIR_VAR)?
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join(DEFAULT_CACHE_SUBDIR));

        let renderer = get(INKSCAPE_VAR)?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INKSCAPE));

        let timeout = match get(TIMEOUT_VAR)? {
            Some(s) => seconds(TIMEOUT_VAR, &s)?,
            None => DEFAULT_TIMEOUT,
        };

        let tolerant = match get(TOLERANT_VAR)? {
            Some(s) => flag(TOLERANT_VAR, &s)?,
            None => false,
        };

        let max_age = get(MAX_AGE_VAR)?
            .map(|s| seconds(MAX_AGE_VAR, &s))
            .transpose()?;

        let source_date_epoch = get(SOURCE_DATE_EPOCH_VAR)?
            .map(|s| source_date_epoch(&s))
            .transpose()?;

        Ok(Config {
            cache_dir,
            renderer,
            timeout,
            tolerant,
            max_age,
            source_date_epoch,
        })
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            root: self.cache_dir.clone(),
            max_age: self.max_age,
            lock_stale_after: self.timeout.saturating_mul(2),
        }
    }
}

fn seconds(var: &'static str, s: &str) -> Result<Duration, ParseError> {
    match f64::from_str(s.trim()) {
        Ok(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).map_err(|_| {
            ParseError::Environment {
                var,
                message: format!("'{s}' is too large"),
            }
        }),
        Ok(_) => Err(ParseError::Environment {
            var,
            message: format!("'{s}' must be a positive number of seconds"),
        }),
        Err(e) => Err(ParseError::Environment {
            var,
            message: format!("'{s}': {e}"),
        }),
    }
}

fn flag(var: &'static str, s: &str) -> Result<bool, ParseError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ParseError::Environment {
            var,
            message: format!("'{s}' is not a boolean; use 1 or 0"),
        }),
    }
}

fn source_date_epoch(s: &str) -> Result<i64, ParseError> {
    let invalid = |message: String| ParseError::Environment {
        var: SOURCE_DATE_EPOCH_VAR,
        message,
    };

    let seconds = i64::from_str(s.trim()).map_err(|e| invalid(format!("{e}")))?;

    match Utc.timestamp_opt(seconds, 0).single() {
        Some(datetime) => {
            convert_log!("using {} as the creation date", datetime.to_rfc3339());
            Ok(seconds)
        }
        None => Err(invalid(format!("{seconds} is out of range"))),
    }
}
