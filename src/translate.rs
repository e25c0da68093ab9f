//! Translation of rsvg-convert options into an Inkscape 1.x command line.
//!
//! The two programs do not agree on much.  rsvg-convert sizes the output with
//! resolutions, zoom factors, or CSS lengths, and composes a background from a
//! color and an opacity; Inkscape has a single export resolution, bitmap sizes
//! in whole pixels, and a single background color with alpha.  Where there is
//! no exact equivalent, the closest approximation is used and a
//! [`LossyTranslation`] is reported alongside the arguments.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::LossyTranslation;
use crate::length::PIXELS_PER_INCH;
use crate::request::{ConversionRequest, Format, Scale, Sizing};

/// Bump this whenever the mapping below changes in a way that alters rendered output,
/// so that cached artifacts made by an older mapping are not reused.
pub const TRANSLATION_VERSION: u32 = 1;

/// The complete argument vector for one renderer invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedArgs {
    args: Vec<OsString>,
    export_filename: PathBuf,
}

impl TranslatedArgs {
    pub fn iter(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(OsString::as_os_str)
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.args
    }

    /// The file the renderer has been told to write.
    pub fn export_filename(&self) -> &Path {
        &self.export_filename
    }
}

/// Renderer options for a request, independent of where the input and output files live.
#[derive(Clone, Debug, PartialEq)]
pub struct Translation {
    options: Vec<String>,
    pub warnings: Vec<LossyTranslation>,
}

impl Translation {
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Builds the full command line: options, output file, and finally the input file.
    pub fn command_line(&self, input: &Path, export_filename: &Path) -> TranslatedArgs {
        let mut args: Vec<OsString> = self.options.iter().map(OsString::from).collect();

        let mut export = OsString::from("--export-filename=");
        export.push(export_filename);
        args.push(export);

        // A relative input path that looks like an option would be misparsed
        if input.as_os_str().to_string_lossy().starts_with('-') {
            args.push(Path::new(".").join(input).into_os_string());
        } else {
            args.push(input.as_os_str().to_owned());
        }

        TranslatedArgs {
            args,
            export_filename: export_filename.to_owned(),
        }
    }
}

#[derive(Default)]
struct Builder {
    options: Vec<String>,
    warnings: Vec<LossyTranslation>,
}

impl Builder {
    fn arg(&mut self, arg: impl Into<String>) {
        self.options.push(arg.into());
    }

    fn warn(&mut self, option: &'static str, message: impl Into<String>) {
        self.warnings.push(LossyTranslation::new(option, message));
    }
}

/// Maps a request onto Inkscape's options.
///
/// This is a pure function of the request: equal requests always produce equal
/// translations, with the options in a fixed order.
pub fn translate(request: &ConversionRequest) -> Translation {
    let mut b = Builder::default();

    export_type(&mut b, request.format);
    export_area(&mut b, request);

    if let Some(page) = request.page {
        b.arg(format!("--export-page={page}"));
    }

    sizing(&mut b, request);

    if let Some(ref background) = request.background {
        b.arg(format!("--export-background={}", background.to_hex()));
    }

    if request.stylesheet.is_some() {
        b.warn(
            "--stylesheet",
            "Inkscape cannot apply a user stylesheet; the stylesheet is ignored",
        );
    }

    if request.accept_language.is_some() {
        b.warn(
            "--accept-language",
            "Inkscape takes the language from its environment; the option is ignored",
        );
    }

    Translation {
        options: b.options,
        warnings: b.warnings,
    }
}

fn export_type(b: &mut Builder, format: Format) {
    b.arg(format!("--export-type={}", format.extension()));

    match format {
        Format::Png | Format::Pdf => (),

        Format::Pdf1_5 => b.arg("--export-pdf-version=1.5"),
        Format::Pdf1_4 => b.arg("--export-pdf-version=1.4"),

        Format::Pdf1_6 | Format::Pdf1_7 => {
            b.arg("--export-pdf-version=1.5");
            b.warn(
                "--format",
                format!("Inkscape cannot write {format}; writing PDF 1.5 instead"),
            );
        }

        Format::Ps | Format::Eps => b.arg("--export-ps-level=3"),

        // rsvg-convert writes flattened SVG without editor metadata
        Format::Svg => b.arg("--export-plain-svg"),
    }
}

fn export_area(b: &mut Builder, request: &ConversionRequest) {
    let placement = request.placement;

    match (&request.export_id, placement.page_size) {
        (Some(id), page_size) => {
            b.arg(format!("--export-id={id}"));
            b.arg("--export-id-only");

            if page_size.is_some() {
                b.warn(
                    "--page-width",
                    "Inkscape exports a single object at its own size; the page size is ignored",
                );
            }
        }

        (None, Some((width, height))) => {
            // Inkscape's area is in document coordinates, so moving the image right
            // and down on the page means starting the area above and to the left.
            let x0 = -placement.left;
            let y0 = -placement.top;

            b.arg(format!(
                "--export-area={}:{}:{}:{}",
                number(x0),
                number(y0),
                number(x0 + width),
                number(y0 + height)
            ));

            return;
        }

        (None, None) => b.arg("--export-area-page"),
    }

    if placement.has_offset() {
        b.warn(
            "--left",
            "offsets can only be honored together with --page-width and --page-height; ignored",
        );
    }
}

fn sizing(b: &mut Builder, request: &ConversionRequest) {
    match request.sizing {
        Sizing::Default => (),

        Sizing::Dpi { x, y } => {
            let scale = Scale { x, y };
            if !scale.is_uniform() {
                b.warn(
                    "--dpi-y",
                    format!("Inkscape has a single export resolution; using {} DPI", number(x)),
                );
            }

            #[allow(clippy::float_cmp)]
            let changes_page_size = request.format.is_vector() && x != PIXELS_PER_INCH;
            if changes_page_size {
                b.warn(
                    "--dpi-x",
                    "Inkscape only applies the resolution to rasterized content in vector output; \
                     the page size is not changed",
                );
            }

            b.arg(format!("--export-dpi={}", number(x)));
        }

        Sizing::Zoom(scale) => {
            if !scale.is_uniform() {
                b.warn(
                    "--y-zoom",
                    format!(
                        "Inkscape cannot scale the axes independently; using a zoom of {}",
                        number(scale.x)
                    ),
                );
            }

            if request.format.is_vector() {
                b.warn(
                    "--zoom",
                    "Inkscape only applies the zoom factor to rasterized content in vector output",
                );
            }

            b.arg(format!("--export-dpi={}", number(PIXELS_PER_INCH * scale.x)));
        }

        Sizing::Size { width, height } => {
            match (width, height) {
                (Some(w), Some(_)) if request.keep_aspect_ratio => {
                    b.arg(format!("--export-width={w}"));
                    b.warn(
                        "--keep-aspect-ratio",
                        "Inkscape cannot fit an image into a box; only the width is used and \
                         the height follows the aspect ratio",
                    );
                }

                _ => {
                    if let Some(w) = width {
                        b.arg(format!("--export-width={w}"));
                    }
                    if let Some(h) = height {
                        b.arg(format!("--export-height={h}"));
                    }
                }
            }

            if request.format.is_vector() {
                b.warn(
                    "--width",
                    "Inkscape only applies bitmap sizes to rasterized content in vector output",
                );
            }
        }
    }
}

/// Formats a number the shortest way, without ever printing `-0`.
fn number(v: f64) -> String {
    format!("{}", v + 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Fingerprint;
    use crate::color::{Background, Rgba};
    use crate::request::{Input, Placement};
    use proptest::prelude::*;

    fn request(format: Format) -> ConversionRequest {
        let mut r = ConversionRequest::new(
            Input::Path(PathBuf::from("shape.svg")),
            Fingerprint::of_bytes(b"<svg/>"),
        );
        r.format = format;
        r
    }

    fn options(request: &ConversionRequest) -> Vec<String> {
        translate(request).options().to_vec()
    }

    #[test]
    fn pdf_at_96_dpi() {
        let mut r = request(Format::Pdf);
        r.sizing = Sizing::Dpi { x: 96.0, y: 96.0 };

        let t = translate(&r);
        assert_eq!(
            t.options(),
            ["--export-type=pdf", "--export-area-page", "--export-dpi=96"]
        );
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn default_png_has_no_sizing() {
        assert_eq!(
            options(&request(Format::Png)),
            ["--export-type=png", "--export-area-page"]
        );
    }

    #[test]
    fn unsupported_pdf_versions_fall_back_to_1_5() {
        for format in [Format::Pdf1_6, Format::Pdf1_7] {
            let t = translate(&request(format));
            assert!(t.options().contains(&String::from("--export-pdf-version=1.5")));
            assert_eq!(t.warnings.len(), 1);
            assert_eq!(t.warnings[0].option, "--format");
        }
    }

    #[test]
    fn supported_pdf_versions_are_exact() {
        let t = translate(&request(Format::Pdf1_4));
        assert!(t.options().contains(&String::from("--export-pdf-version=1.4")));
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn svg_is_plain() {
        assert!(options(&request(Format::Svg)).contains(&String::from("--export-plain-svg")));
    }

    #[test]
    fn zoom_becomes_resolution() {
        let mut r = request(Format::Png);
        r.sizing = Sizing::Zoom(Scale { x: 1.5, y: 1.5 });

        let t = translate(&r);
        assert!(t.options().contains(&String::from("--export-dpi=144")));
        assert!(t.warnings.is_empty());
    }

    #[test]
    fn resolution_of_vector_output_warns() {
        let mut r = request(Format::Pdf);
        r.sizing = Sizing::Dpi { x: 300.0, y: 300.0 };

        let t = translate(&r);
        assert!(t.options().contains(&String::from("--export-dpi=300")));
        assert_eq!(t.warnings.len(), 1);
        assert_eq!(t.warnings[0].option, "--dpi-x");

        let mut r = request(Format::Png);
        r.sizing = Sizing::Dpi { x: 300.0, y: 300.0 };
        assert!(translate(&r).warnings.is_empty());
    }

    #[test]
    fn anisotropic_resolution_warns() {
        let mut r = request(Format::Png);
        r.sizing = Sizing::Dpi { x: 300.0, y: 150.0 };

        let t = translate(&r);
        assert!(t.options().contains(&String::from("--export-dpi=300")));
        assert_eq!(t.warnings[0].option, "--dpi-y");
    }

    #[test]
    fn width_and_height() {
        let mut r = request(Format::Png);
        r.sizing = Sizing::Size {
            width: Some(200),
            height: Some(100),
        };

        let opts = options(&r);
        assert!(opts.contains(&String::from("--export-width=200")));
        assert!(opts.contains(&String::from("--export-height=100")));
    }

    #[test]
    fn keep_aspect_ratio_with_box_uses_width_only() {
        let mut r = request(Format::Png);
        r.keep_aspect_ratio = true;
        r.sizing = Sizing::Size {
            width: Some(200),
            height: Some(100),
        };

        let t = translate(&r);
        assert!(t.options().contains(&String::from("--export-width=200")));
        assert!(!t.options().iter().any(|o| o.starts_with("--export-height")));
        assert_eq!(t.warnings[0].option, "--keep-aspect-ratio");
    }

    #[test]
    fn background_color_and_opacity_become_one_argument() {
        let mut r = request(Format::Png);
        r.background = Background::new(
            Some(Rgba {
                red: 0xff,
                green: 0,
                blue: 0,
                alpha: 1.0,
            }),
            Some(0.5),
        );

        let opts = options(&r);
        assert!(opts.contains(&String::from("--export-background=#ff000080")));
        assert!(!opts.iter().any(|o| o.starts_with("--export-background-opacity")));
    }

    #[test]
    fn export_id_replaces_page_area() {
        let mut r = request(Format::Png);
        r.export_id = Some(String::from("layer1"));

        assert_eq!(
            options(&r),
            [
                "--export-type=png",
                "--export-id=layer1",
                "--export-id-only"
            ]
        );
    }

    #[test]
    fn page_size_and_offsets_become_an_area() {
        let mut r = request(Format::Pdf);
        r.placement = Placement {
            page_size: Some((200.0, 100.0)),
            left: 10.0,
            top: 0.0,
        };

        assert!(options(&r).contains(&String::from("--export-area=-10:0:190:100")));
    }

    #[test]
    fn offsets_without_page_size_warn() {
        let mut r = request(Format::Pdf);
        r.placement.left = 5.0;

        let t = translate(&r);
        assert!(t.options().contains(&String::from("--export-area-page")));
        assert_eq!(t.warnings[0].option, "--left");
    }

    #[test]
    fn page_number() {
        let mut r = request(Format::Pdf);
        r.page = Some(2);
        assert!(options(&r).contains(&String::from("--export-page=2")));
    }

    #[test]
    fn command_line_ends_with_output_and_input() {
        let t = translate(&request(Format::Pdf));
        let args = t.command_line(Path::new("shape.svg"), Path::new("/tmp/out.partial.pdf"));
        let v: Vec<&OsStr> = args.iter().collect();

        assert_eq!(v[v.len() - 2], "--export-filename=/tmp/out.partial.pdf");
        assert_eq!(v[v.len() - 1], "shape.svg");
        assert_eq!(args.export_filename(), Path::new("/tmp/out.partial.pdf"));
    }

    #[test]
    fn input_that_looks_like_an_option_is_protected() {
        let t = translate(&request(Format::Png));
        let args = t.command_line(Path::new("-weird.svg"), Path::new("out.png"));
        assert_eq!(args.iter().last().unwrap(), Path::new("./-weird.svg").as_os_str());
    }

    #[test]
    fn never_prints_negative_zero() {
        assert_eq!(number(-0.0), "0");
        assert_eq!(number(-2.5), "-2.5");
    }

    fn arbitrary_format() -> impl Strategy<Value = Format> {
        proptest::sample::select(Format::ALL.to_vec())
    }

    fn arbitrary_sizing() -> impl Strategy<Value = Sizing> {
        prop_oneof![
            Just(Sizing::Default),
            (1.0..1200.0f64, 1.0..1200.0f64).prop_map(|(x, y)| Sizing::Dpi { x, y }),
            (proptest::option::of(1..5000u32), proptest::option::of(1..5000u32))
                .prop_map(|(width, height)| Sizing::Size { width, height }),
            (0.01..20.0f64, 0.01..20.0f64).prop_map(|(x, y)| Sizing::Zoom(Scale { x, y })),
        ]
    }

    prop_compose! {
        fn arbitrary_request()(
            format in arbitrary_format(),
            sizing in arbitrary_sizing(),
            keep_aspect_ratio in any::<bool>(),
            rgb in proptest::option::of((any::<u8>(), any::<u8>(), any::<u8>())),
            opacity in proptest::option::of(0.0..=1.0f64),
            export_id in proptest::option::of("[a-z][a-z0-9_-]{0,12}"),
            page in proptest::option::of(1..20u32),
            left in -100.0..100.0f64,
        ) -> ConversionRequest {
            let mut r = request(format);
            r.sizing = sizing;
            r.keep_aspect_ratio = keep_aspect_ratio;
            r.background = Background::new(
                rgb.map(|(red, green, blue)| Rgba { red, green, blue, alpha: 1.0 }),
                opacity,
            );
            r.export_id = export_id;
            r.page = page;
            r.placement.left = left;
            r
        }
    }

    proptest! {
        #[test]
        fn translation_is_deterministic(r in arbitrary_request()) {
            let copy = r.clone();
            prop_assert_eq!(translate(&r), translate(&copy));

            let out = Path::new("/scratch/ab/abcdef.partial.png");
            prop_assert_eq!(
                translate(&r).command_line(Path::new("in.svg"), out),
                translate(&copy).command_line(Path::new("in.svg"), out)
            );
        }

        #[test]
        fn at_most_one_sizing_directive(r in arbitrary_request()) {
            let t = translate(&r);
            let dpi = t.options().iter().filter(|o| o.starts_with("--export-dpi=")).count();
            let size = t
                .options()
                .iter()
                .any(|o| o.starts_with("--export-width=") || o.starts_with("--export-height="));

            prop_assert!(dpi <= 1);
            prop_assert!(!(dpi == 1 && size));
        }

        #[test]
        fn exactly_one_export_type(r in arbitrary_request()) {
            let t = translate(&r);
            let n = t.options().iter().filter(|o| o.starts_with("--export-type=")).count();
            prop_assert_eq!(n, 1);
        }
    }
}
