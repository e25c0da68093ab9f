//! Error types.
//!
//! Errors are split by who caused them: [`ParseError`] is the user's doing (bad flags,
//! missing input) and is never retried, while [`ConversionError`] covers everything that
//! can go wrong once a valid request is handed to the cache and the renderer.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::request::FORMAT_NAMES;

/// Exit status for bad command lines; it matches what clap uses for usage errors.
pub const EXIT_USAGE: i32 = 2;

/// Exit status for conversions that failed outside the renderer (cache, I/O, bad artifact).
pub const EXIT_CONVERSION: i32 = 3;

/// Exit status for a renderer that failed or timed out.
pub const EXIT_RENDERER: i32 = 4;

/// Exit status after an interrupt, following the shell convention of 128 + SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors from interpreting the command line and the environment.
#[derive(Debug, Error)]
pub enum ParseError {
    /// An option that rsvg-convert does not know about.
    #[error("Unsupported option '{0}'")]
    UnsupportedOption(String),

    /// Two options which select different, mutually exclusive behaviors.
    #[error("Conflicting options: {first} cannot be used together with {second}")]
    ConflictingOptions { first: String, second: String },

    #[error("Error reading file \"{}\": file does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid output format '{0}'; supported formats are {}", FORMAT_NAMES)]
    InvalidFormat(String),

    #[error("Invalid value for {option}: {message}")]
    InvalidValue {
        option: &'static str,
        message: String,
    },

    #[error("Only one SVG file can be converted at a time")]
    TooManyInputs,

    #[error("Environment variable ${var}: {message}")]
    Environment { var: &'static str, message: String },

    /// Errors detected by clap itself, including requests for `--help`.
    #[error(transparent)]
    Usage(#[from] clap::Error),
}

/// Errors from producing or delivering an artifact.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("renderer failed with {}:\n{stderr}", ExitCode(.exit_code))]
    RendererFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("renderer did not finish within {} seconds and was terminated", .timeout.as_secs_f64())]
    RendererTimeout { timeout: Duration },

    #[error("conversion was interrupted")]
    Cancelled,

    #[error("could not run renderer \"{}\": {source}", .program.display())]
    Spawn { program: PathBuf, source: io::Error },

    #[error("renderer produced an invalid artifact \"{}\": {reason}", .path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("cache directory error at \"{}\": {source}", .path.display())]
    CacheIo { path: PathBuf, source: io::Error },

    #[error("Error reading file \"{input}\": {source}")]
    InputUnreadable { input: String, source: io::Error },

    #[error("\"{input}\" changed while it was being converted")]
    InputChanged { input: String },

    #[error("Error saving output {output}: {source}")]
    Output { output: String, source: io::Error },
}

impl ConversionError {
    pub(crate) fn cache_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ConversionError::CacheIo {
            path: path.into(),
            source,
        }
    }
}

/// A flag mapping for which the renderer has no exact equivalent.
///
/// This is not an error: the conversion goes ahead with an approximation, and the
/// caller is expected to print the warning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LossyTranslation {
    pub option: &'static str,
    pub message: String,
}

impl LossyTranslation {
    pub fn new(option: &'static str, message: impl Into<String>) -> Self {
        Self {
            option,
            message: message.into(),
        }
    }
}

impl fmt::Display for LossyTranslation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.option, self.message)
    }
}

/// Any error that stops rsvg-convert.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl Error {
    /// Process exit status, so that pipelines can tell usage errors from failed conversions.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse(_) => EXIT_USAGE,
            Error::Conversion(ConversionError::RendererFailed { .. })
            | Error::Conversion(ConversionError::RendererTimeout { .. }) => EXIT_RENDERER,
            Error::Conversion(ConversionError::Cancelled) => EXIT_INTERRUPTED,
            Error::Conversion(_) => EXIT_CONVERSION,
        }
    }
}

struct ExitCode<'a>(&'a Option<i32>);

impl fmt::Display for ExitCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "a signal"),
        }
    }
}
