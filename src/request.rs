//! The normalized form of an rsvg-convert command line.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use cssparser::{_cssparser_internal_to_lowercase, match_ignore_ascii_case};

use crate::cache::Fingerprint;
use crate::color::Background;

/// Human-readable list of the values accepted by `--format`.
pub const FORMAT_NAMES: &str = "png, pdf, pdf1.7, pdf1.6, pdf1.5, pdf1.4, ps, eps, svg";

// Keep this enum in sync with FORMAT_NAMES
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Png,
    Pdf,
    Pdf1_7,
    Pdf1_6,
    Pdf1_5,
    Pdf1_4,
    Ps,
    Eps,
    Svg,
}

impl Format {
    pub const ALL: [Format; 9] = [
        Format::Png,
        Format::Pdf,
        Format::Pdf1_7,
        Format::Pdf1_6,
        Format::Pdf1_5,
        Format::Pdf1_4,
        Format::Ps,
        Format::Eps,
        Format::Svg,
    ];

    /// Parses a `--format` value, ignoring ASCII case like rsvg-convert does.
    pub fn from_name(s: &str) -> Option<Format> {
        let format = match_ignore_ascii_case! { s,
            "png" => Format::Png,
            "pdf" => Format::Pdf,
            "pdf1.7" => Format::Pdf1_7,
            "pdf1.6" => Format::Pdf1_6,
            "pdf1.5" => Format::Pdf1_5,
            "pdf1.4" => Format::Pdf1_4,
            "ps" => Format::Ps,
            "eps" => Format::Eps,
            "svg" => Format::Svg,
            _ => return None,
        };

        Some(format)
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Pdf => "pdf",
            Format::Pdf1_7 => "pdf1.7",
            Format::Pdf1_6 => "pdf1.6",
            Format::Pdf1_5 => "pdf1.5",
            Format::Pdf1_4 => "pdf1.4",
            Format::Ps => "ps",
            Format::Eps => "eps",
            Format::Svg => "svg",
        }
    }

    /// File extension of the artifact, which is also what Inkscape calls the export type.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Pdf | Format::Pdf1_7 | Format::Pdf1_6 | Format::Pdf1_5 | Format::Pdf1_4 => {
                "pdf"
            }
            Format::Ps => "ps",
            Format::Eps => "eps",
            Format::Svg => "svg",
        }
    }

    pub fn is_vector(self) -> bool {
        !matches!(self, Format::Png)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    #[allow(clippy::float_cmp)]
    pub fn is_uniform(&self) -> bool {
        self.x == self.y
    }
}

/// How the output size is determined.  Exactly one of these is in effect per request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sizing {
    /// Natural size of the document at 96 DPI.
    Default,

    /// `--dpi-x` / `--dpi-y`.
    Dpi { x: f64, y: f64 },

    /// `--width` / `--height`, already normalized to whole pixels.
    Size {
        width: Option<u32>,
        height: Option<u32>,
    },

    /// `--zoom`, `--x-zoom`, `--y-zoom`.
    Zoom(Scale),
}

/// Where the image sits on the output page, in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Placement {
    /// `--page-width` and `--page-height`.
    pub page_size: Option<(f64, f64)>,
    pub left: f64,
    pub top: f64,
}

impl Placement {
    #[allow(clippy::float_cmp)]
    pub fn has_offset(&self) -> bool {
        self.left != 0.0 || self.top != 0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    /// The SVG data was read from stdin before the request was built.
    Stdin(Arc<[u8]>),
    Path(PathBuf),
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Stdin(_) => "stdin".fmt(f),
            Input::Path(p) => p.display().fmt(f),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Stdout,
    Path(PathBuf),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => "stdout".fmt(f),
            Output::Path(p) => p.display().fmt(f),
        }
    }
}

/// A fully validated conversion request.
///
/// Everything here except `input` and `output` may change the rendered bytes, and
/// goes into the [`CacheKey`](crate::cache::CacheKey).
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionRequest {
    pub input: Input,
    pub fingerprint: Fingerprint,
    pub format: Format,
    pub sizing: Sizing,
    pub keep_aspect_ratio: bool,
    pub background: Option<Background>,

    /// Object id without the leading `#`.
    pub export_id: Option<String>,

    /// 1-based page number.
    pub page: Option<u32>,
    pub placement: Placement,
    pub output: Output,

    /// Accepted for compatibility; Inkscape has no way to apply these.
    pub stylesheet: Option<PathBuf>,
    pub accept_language: Option<String>,
}

impl ConversionRequest {
    /// A request with rsvg-convert's defaults: PNG to stdout at the natural size.
    pub fn new(input: Input, fingerprint: Fingerprint) -> Self {
        ConversionRequest {
            input,
            fingerprint,
            format: Format::Png,
            sizing: Sizing::Default,
            keep_aspect_ratio: false,
            background: None,
            export_id: None,
            page: None,
            placement: Placement::default(),
            output: Output::Stdout,
            stylesheet: None,
            accept_language: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip() {
        for format in Format::ALL {
            assert_eq!(Format::from_name(format.name()), Some(format));
            assert!(FORMAT_NAMES.contains(format.name()));
        }
    }

    #[test]
    fn format_names_ignore_case() {
        assert_eq!(Format::from_name("PDF1.5"), Some(Format::Pdf1_5));
        assert_eq!(Format::from_name("Svg"), Some(Format::Svg));
        assert_eq!(Format::from_name("gif"), None);
    }

    #[test]
    fn pdf_versions_share_an_extension() {
        assert_eq!(Format::Pdf1_4.extension(), "pdf");
        assert_eq!(Format::Eps.extension(), "eps");
    }
}
