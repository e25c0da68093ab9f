//! The conversion pipeline: translate, look up or build in the cache, deliver.

use std::path::{Path, PathBuf};

use crate::cache::{Cache, CacheKey, Fingerprint, KeyContext};
use crate::error::{ConversionError, Error, LossyTranslation};
use crate::request::{ConversionRequest, Input};
use crate::runner::{materialize, CancelToken, Renderer};
use crate::translate::translate;

/// What a successful conversion did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversion {
    /// The cached artifact that was delivered.
    pub artifact: PathBuf,
    pub cache_hit: bool,
    pub warnings: Vec<LossyTranslation>,
}

pub struct Converter<'a, R: Renderer + ?Sized> {
    cache: &'a Cache,
    renderer: &'a R,
    cancel: CancelToken,
    source_date_epoch: Option<i64>,
}

impl<'a, R: Renderer + ?Sized> Converter<'a, R> {
    pub fn new(cache: &'a Cache, renderer: &'a R) -> Self {
        Converter {
            cache,
            renderer,
            cancel: CancelToken::new(),
            source_date_epoch: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_source_date_epoch(mut self, epoch: Option<i64>) -> Self {
        self.source_date_epoch = epoch;
        self
    }

    pub fn key(&self, request: &ConversionRequest) -> CacheKey {
        let context = KeyContext {
            renderer: self.renderer.identity(),
            source_date_epoch: self.source_date_epoch,
        };

        CacheKey::new(request, &context)
    }

    /// Converts `request` and writes the result to its output.
    ///
    /// Lossy translations are reported on stderr as they are found, and also returned.
    pub fn convert(&self, request: &ConversionRequest) -> Result<Conversion, Error> {
        let translation = translate(request);
        for warning in &translation.warnings {
            convert_warn!("{}", warning);
        }

        let key = self.key(request);
        convert_log!("{} -> {} as {} (key {})", request.input, request.output, request.format, key);

        let lookup = self
            .cache
            .get_or_compute(&key, request.format, &self.cancel, |export_filename| {
                let input = self.input_path(request)?;
                let args = translation.command_line(&input, export_filename);

                let output = self.renderer.render(&args, &self.cancel)?.check()?;
                if !output.stderr.is_empty() {
                    convert_log!(
                        "renderer said: {}",
                        String::from_utf8_lossy(&output.stderr).trim_end()
                    );
                }

                // The key was computed from the bytes seen at parse time
                ensure_unchanged(request, &input)
            })?;

        materialize(&lookup.path, &request.output)?;

        Ok(Conversion {
            artifact: lookup.path,
            cache_hit: lookup.hit,
            warnings: translation.warnings,
        })
    }

    fn input_path(&self, request: &ConversionRequest) -> Result<PathBuf, ConversionError> {
        match request.input {
            Input::Path(ref path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(ConversionError::InputUnreadable {
                        input: path.display().to_string(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    })
                }
            }

            Input::Stdin(ref data) => self.cache.spool_input(&request.fingerprint, data),
        }
    }
}

fn ensure_unchanged(request: &ConversionRequest, input: &Path) -> Result<(), ConversionError> {
    if let Input::Stdin(_) = request.input {
        return Ok(());
    }

    let fingerprint =
        Fingerprint::of_file(input).map_err(|source| ConversionError::InputUnreadable {
            input: input.display().to_string(),
            source,
        })?;

    if fingerprint != request.fingerprint {
        return Err(ConversionError::InputChanged {
            input: input.display().to_string(),
        });
    }

    Ok(())
}
