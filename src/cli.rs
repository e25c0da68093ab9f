//! The rsvg-convert command line.
//!
//! [`build_cli`] describes every option that rsvg-convert accepts, and [`ArgParser`]
//! turns a command line into a validated [`ConversionRequest`].  Options that
//! rsvg-convert does not have are caught before clap sees them, so that they can be
//! either rejected with a clear message or skipped in tolerant mode.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::crate_version;
use clap_complete::Shell;

use crate::cache::Fingerprint;
use crate::color::{parse_background_color, parse_opacity, Background};
use crate::error::{ConversionError, Error, ParseError};
use crate::length::{Length, Sign};
use crate::request::{
    ConversionRequest, Format, Input, Output, Placement, Scale, Sizing, FORMAT_NAMES,
};

pub fn build_cli() -> clap::Command {
    clap::Command::new("rsvg-convert")
        .version(concat!("version ", crate_version!()))
        .about("Convert SVG files to other image formats, using Inkscape")
        .disable_version_flag(true)
        .disable_help_flag(true)
        .arg(
            clap::Arg::new("help")
                .short('?')
                .long("help")
                .help("Display the help")
                .action(clap::ArgAction::Help),
        )
        .arg(
            clap::Arg::new("version")
                .short('v')
                .long("version")
                .help("Display the version information")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("res_x")
                .short('d')
                .long("dpi-x")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_resolution)
                .help("Pixels per inch [defaults to 96]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("res_y")
                .short('p')
                .long("dpi-y")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_resolution)
                .help("Pixels per inch [defaults to 96]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("zoom_x")
                .short('x')
                .long("x-zoom")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_zoom_factor)
                .help("Horizontal zoom factor")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("zoom_y")
                .long("y-zoom")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_zoom_factor)
                .help("Vertical zoom factor")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("zoom")
                .short('z')
                .long("zoom")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_zoom_factor)
                .help("Zoom factor")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("size_x")
                .short('w')
                .long("width")
                .num_args(1)
                .value_name("length")
                .value_parser(parse_unsigned_length)
                .help("Width [defaults to the width of the SVG]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("size_y")
                .short('h')
                .long("height")
                .num_args(1)
                .value_name("length")
                .value_parser(parse_unsigned_length)
                .help("Height [defaults to the height of the SVG]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("top")
                .long("top")
                .num_args(1)
                .value_name("length")
                .allow_negative_numbers(true)
                .value_parser(parse_signed_length)
                .help("Distance between top edge of page and the image [defaults to 0]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("left")
                .long("left")
                .num_args(1)
                .value_name("length")
                .allow_negative_numbers(true)
                .value_parser(parse_signed_length)
                .help("Distance between left edge of page and the image [defaults to 0]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("page_width")
                .long("page-width")
                .num_args(1)
                .value_name("length")
                .value_parser(parse_unsigned_length)
                .help("Width of output media [defaults to the width of the SVG]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("page_height")
                .long("page-height")
                .num_args(1)
                .value_name("length")
                .value_parser(parse_unsigned_length)
                .help("Height of output media [defaults to the height of the SVG]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("page")
                .long("page")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_page)
                .help("Page of a multi-page document to export [defaults to the first]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("format")
                .short('f')
                .long("format")
                .num_args(1)
                .value_name("format")
                .default_value("png")
                .help(format!("Output format: {FORMAT_NAMES}"))
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .num_args(1)
                .value_parser(clap::value_parser!(PathBuf))
                .value_name("filename")
                .help("Output filename [defaults to stdout]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("export_id")
                .short('i')
                .long("export-id")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_name("object-id")
                .help("SVG id of object to export [default is to export all objects]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("accept-language")
                .short('l')
                .long("accept-language")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_name("language-tags")
                .help("Languages to accept, for example \"es-MX,de,en\" [not supported by Inkscape; ignored]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("keep_aspect")
                .short('a')
                .long("keep-aspect-ratio")
                .help("Preserve the aspect ratio")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("background")
                .short('b')
                .long("background-color")
                .num_args(1)
                .value_name("color")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .default_value("none")
                .help("Set the background color using a CSS color spec")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("background_opacity")
                .short('y')
                .long("background-opacity")
                .num_args(1)
                .value_name("number")
                .value_parser(parse_opacity)
                .help("Opacity of the background, from 0 to 1 [defaults to 1]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("stylesheet")
                .short('s')
                .long("stylesheet")
                .num_args(1)
                .value_parser(clap::value_parser!(PathBuf))
                .value_name("filename.css")
                .help("Filename of CSS stylesheet to apply [not supported by Inkscape; ignored]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("unlimited")
                .short('u')
                .long("unlimited")
                .help("Allow huge SVG files")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("keep_image_data")
                .long("keep-image-data")
                .help("Keep image data")
                .conflicts_with("no_keep_image_data")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("no_keep_image_data")
                .long("no-keep-image-data")
                .help("Do not keep image data")
                .conflicts_with("keep_image_data")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("testing")
                .long("testing")
                .help("Render images for librsvg's test suite")
                .hide(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("completion")
                .long("completion")
                .help("Output shell completion for the given shell")
                .num_args(1)
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(Shell))
                .value_name("shell-name"),
        )
        .arg(
            clap::Arg::new("FILE")
                .value_parser(clap::value_parser!(OsString))
                .help("The input file to convert, you can use - for stdin")
                .num_args(1..)
                .action(clap::ArgAction::Append),
        )
}

#[derive(Copy, Clone)]
pub struct Resolution(pub f64);

fn parse_resolution(v: &str) -> Result<Resolution, String> {
    match v.parse::<f64>() {
        Ok(res) if res > 0.0 && res.is_finite() => Ok(Resolution(res)),
        Ok(_) => Err(String::from("Invalid resolution")),
        Err(e) => Err(format!("{e}")),
    }
}

#[derive(Copy, Clone)]
pub struct ZoomFactor(pub f64);

fn parse_zoom_factor(v: &str) -> Result<ZoomFactor, String> {
    match v.parse::<f64>() {
        Ok(res) if res > 0.0 && res.is_finite() => Ok(ZoomFactor(res)),
        Ok(_) => Err(String::from("Invalid zoom factor")),
        Err(e) => Err(format!("{e}")),
    }
}

fn parse_unsigned_length(s: &str) -> Result<Length, String> {
    Length::parse_str(s, Sign::Unsigned)
}

fn parse_signed_length(s: &str) -> Result<Length, String> {
    Length::parse_str(s, Sign::Signed)
}

fn parse_page(v: &str) -> Result<u32, String> {
    match v.parse::<u32>() {
        Ok(page) if page >= 1 => Ok(page),
        Ok(_) => Err(String::from("Pages are numbered from 1")),
        Err(e) => Err(format!("{e}")),
    }
}

/// What the user asked rsvg-convert to do.
#[derive(Debug)]
pub enum Action {
    Convert(ConversionRequest),
    PrintVersion,
    PrintCompletion(Shell),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ArgParser {
    tolerant: bool,
}

impl ArgParser {
    /// In tolerant mode, unknown options are dropped with a warning instead of being an error.
    pub fn new(tolerant: bool) -> ArgParser {
        ArgParser { tolerant }
    }

    /// Parses a full command line, including the program name.
    ///
    /// Usage errors come back as [`Error::Parse`].  Reading the input to fingerprint it
    /// can also fail, which is an [`Error::Conversion`].
    pub fn parse<I, T>(&self, argv: I) -> Result<Action, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let cmd = build_cli();
        let argv = screen_options(&cmd, argv.into_iter().map(Into::into).collect(), self.tolerant)?;
        let matches = cmd.try_get_matches_from(argv).map_err(ParseError::from)?;

        if let Some(shell) = matches.get_one::<Shell>("completion").copied() {
            return Ok(Action::PrintCompletion(shell));
        }

        if matches.get_flag("version") {
            return Ok(Action::PrintVersion);
        }

        let format_str: &String = matches
            .get_one("format")
            .ok_or_else(|| ParseError::InvalidFormat(String::new()))?;
        let format = Format::from_name(format_str)
            .ok_or_else(|| ParseError::InvalidFormat(format_str.clone()))?;

        let sizing = sizing(&matches)?;
        let placement = placement(&matches)?;

        let background_str = matches
            .get_one::<String>("background")
            .map_or("none", String::as_str);
        let color = parse_background_color(background_str).map_err(|message| {
            ParseError::InvalidValue {
                option: "--background-color",
                message,
            }
        })?;
        let opacity = matches.get_one::<f64>("background_opacity").copied();

        // Inkscape wants a bare id; rsvg-convert has always accepted both forms.
        let export_id = match matches.get_one::<String>("export_id") {
            Some(id) => {
                let id = id.strip_prefix('#').unwrap_or(id);
                if id.is_empty() {
                    return Err(ParseError::InvalidValue {
                        option: "--export-id",
                        message: String::from("the object id is empty"),
                    }
                    .into());
                }
                Some(id.to_string())
            }
            None => None,
        };

        let output = match matches.get_one::<PathBuf>("output") {
            None => Output::Stdout,
            Some(path) => Output::Path(path.clone()),
        };

        let files: Vec<&OsString> = matches
            .get_many::<OsString>("FILE")
            .map(|values| values.collect())
            .unwrap_or_default();

        if files.len() > 1 {
            return Err(ParseError::TooManyInputs.into());
        }

        let (input, fingerprint) = match files.first() {
            Some(f) if f.as_os_str() != "-" => read_file(PathBuf::from(f))?,
            _ => read_stdin()?,
        };

        let mut request = ConversionRequest::new(input, fingerprint);
        request.format = format;
        request.sizing = sizing;
        request.keep_aspect_ratio = matches.get_flag("keep_aspect");
        request.background = Background::new(color, opacity);
        request.export_id = export_id;
        request.page = matches.get_one::<u32>("page").copied();
        request.placement = placement;
        request.output = output;
        request.stylesheet = matches.get_one::<PathBuf>("stylesheet").cloned();
        request.accept_language = matches.get_one::<String>("accept-language").cloned();

        Ok(Action::Convert(request))
    }
}

/// Works out the single sizing mode; options from different modes conflict.
fn sizing(matches: &clap::ArgMatches) -> Result<Sizing, ParseError> {
    let res_x = matches.get_one::<Resolution>("res_x").map(|r| r.0);
    let res_y = matches.get_one::<Resolution>("res_y").map(|r| r.0);

    let zoom = matches.get_one::<ZoomFactor>("zoom").map(|z| z.0);
    let zoom_x = matches.get_one::<ZoomFactor>("zoom_x").map(|z| z.0);
    let zoom_y = matches.get_one::<ZoomFactor>("zoom_y").map(|z| z.0);

    let width = matches.get_one::<Length>("size_x").copied();
    let height = matches.get_one::<Length>("size_y").copied();

    if zoom.is_some() && (zoom_x.is_some() || zoom_y.is_some()) {
        return Err(ParseError::ConflictingOptions {
            first: String::from("--zoom"),
            second: String::from(if zoom_x.is_some() { "--x-zoom" } else { "--y-zoom" }),
        });
    }

    let dpi_flag = first_flag(&[(res_x.is_some(), "--dpi-x"), (res_y.is_some(), "--dpi-y")]);
    let zoom_flag = first_flag(&[
        (zoom.is_some(), "--zoom"),
        (zoom_x.is_some(), "--x-zoom"),
        (zoom_y.is_some(), "--y-zoom"),
    ]);
    let size_flag = first_flag(&[(width.is_some(), "--width"), (height.is_some(), "--height")]);

    let given: Vec<&str> = [dpi_flag, zoom_flag, size_flag].into_iter().flatten().collect();
    if let [first, second, ..] = given.as_slice() {
        return Err(ParseError::ConflictingOptions {
            first: first.to_string(),
            second: second.to_string(),
        });
    }

    if dpi_flag.is_some() {
        return Ok(Sizing::Dpi {
            x: res_x.or(res_y).unwrap_or(96.0),
            y: res_y.or(res_x).unwrap_or(96.0),
        });
    }

    if zoom_flag.is_some() {
        return Ok(Sizing::Zoom(Scale {
            x: zoom.or(zoom_x).unwrap_or(1.0),
            y: zoom.or(zoom_y).unwrap_or(1.0),
        }));
    }

    if size_flag.is_some() {
        return Ok(Sizing::Size {
            width: width.map(|w| whole_pixels("--width", w)).transpose()?,
            height: height.map(|h| whole_pixels("--height", h)).transpose()?,
        });
    }

    Ok(Sizing::Default)
}

fn first_flag(flags: &[(bool, &'static str)]) -> Option<&'static str> {
    flags.iter().find(|(given, _)| *given).map(|(_, name)| *name)
}

/// Bitmap sizes are whole pixels; partial pixels are rounded up so nothing is cut off.
fn whole_pixels(option: &'static str, length: Length) -> Result<u32, ParseError> {
    let invalid = |message: String| ParseError::InvalidValue { option, message };

    let pixels = cast::u32(length.to_pixels().ceil())
        .map_err(|_| invalid(format!("{} is too large", length.length)))?;

    if pixels == 0 {
        return Err(invalid(String::from("the size must be at least 1 pixel")));
    }

    Ok(pixels)
}

fn placement(matches: &clap::ArgMatches) -> Result<Placement, ParseError> {
    let px = |id: &str| matches.get_one::<Length>(id).map(Length::to_pixels);

    let page_size = match (px("page_width"), px("page_height")) {
        (None, None) => None,
        (Some(_), None) | (None, Some(_)) => {
            return Err(ParseError::InvalidValue {
                option: "--page-width",
                message: String::from(
                    "Please specify both the --page-width and --page-height options together.",
                ),
            });
        }
        (Some(w), Some(h)) => Some((w, h)),
    };

    Ok(Placement {
        page_size,
        left: px("left").unwrap_or(0.0),
        top: px("top").unwrap_or(0.0),
    })
}

fn read_file(path: PathBuf) -> Result<(Input, Fingerprint), Error> {
    if !path.exists() {
        return Err(ParseError::InputNotFound(path).into());
    }

    let fingerprint =
        Fingerprint::of_file(&path).map_err(|source| ConversionError::InputUnreadable {
            input: path.display().to_string(),
            source,
        })?;

    Ok((Input::Path(path), fingerprint))
}

fn read_stdin() -> Result<(Input, Fingerprint), Error> {
    let stdin = io::stdin();

    if stdin.is_terminal() {
        eprintln!("rsvg-convert is reading from standard input.");
        eprintln!("Type Control-C to exit if this is not what you expected.");
    }

    let mut data = Vec::new();
    stdin
        .lock()
        .read_to_end(&mut data)
        .map_err(|source| ConversionError::InputUnreadable {
            input: String::from("stdin"),
            source,
        })?;

    let fingerprint = Fingerprint::of_bytes(&data);
    Ok((Input::Stdin(Arc::from(data)), fingerprint))
}

/// Removes or rejects options that rsvg-convert does not have.
///
/// Values of options that take one are passed through untouched, whether they are
/// attached (`-d96`, `--dpi-x=96`) or separate (`-d 96`), and so is everything after `--`.
fn screen_options(
    cmd: &clap::Command,
    argv: Vec<OsString>,
    tolerant: bool,
) -> Result<Vec<OsString>, ParseError> {
    let mut longs = HashMap::new();
    let mut shorts = HashMap::new();

    for arg in cmd.get_arguments() {
        let takes_value = arg.get_action().takes_values();

        if let Some(long) = arg.get_long() {
            longs.insert(long, takes_value);
        }
        if let Some(short) = arg.get_short() {
            shorts.insert(short, takes_value);
        }
    }

    let mut screened = Vec::with_capacity(argv.len());
    let mut args = argv.into_iter();

    if let Some(program) = args.next() {
        screened.push(program);
    }

    // Positional arguments seen, and those of them that came right after an unknown
    // long option and may really be its value.
    let mut positionals = 0;
    let mut maybe_values = Vec::new();
    let mut after_unknown = false;

    while let Some(arg) = args.next() {
        let follows_unknown = std::mem::take(&mut after_unknown);

        let s = match arg.to_str() {
            Some(s) => s.to_string(),
            None => {
                positionals += 1;
                if follows_unknown {
                    maybe_values.push(screened.len());
                }
                screened.push(arg);
                continue;
            }
        };

        if s == "--" {
            screened.push(arg);
            let rest: Vec<OsString> = args.collect();
            positionals += rest.len();
            screened.extend(rest);
            break;
        }

        if let Some(long) = s.strip_prefix("--") {
            let (name, attached) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };

            match longs.get(name) {
                Some(&takes_value) => {
                    screened.push(arg);
                    if takes_value && !attached {
                        screened.extend(args.next());
                    }
                }

                None => {
                    unsupported(format!("--{name}"), tolerant)?;
                    after_unknown = !attached;
                }
            }
        } else if let Some(cluster) = s.strip_prefix('-').filter(|c| !c.is_empty()) {
            let mut kept = String::from("-");
            let mut needs_value = false;

            for (i, c) in cluster.char_indices() {
                match shorts.get(&c) {
                    Some(&true) => {
                        kept.push(c);
                        let rest = &cluster[i + c.len_utf8()..];
                        if rest.is_empty() {
                            needs_value = true;
                        } else {
                            kept.push_str(rest);
                        }
                        break;
                    }

                    Some(&false) => kept.push(c),

                    None => unsupported(format!("-{c}"), tolerant)?,
                }
            }

            if kept.len() > 1 {
                screened.push(OsString::from(kept));
            }

            if needs_value {
                screened.extend(args.next());
            }
        } else {
            positionals += 1;
            if follows_unknown {
                maybe_values.push(screened.len());
            }
            screened.push(arg);
        }
    }

    // Only one input is allowed, so extra positionals are taken to be option values.
    let extra = positionals.saturating_sub(1);
    for i in maybe_values.into_iter().take(extra).rev() {
        let value = screened.remove(i);
        convert_warn!(
            "ignoring '{}' as the value of an unsupported option",
            value.to_string_lossy()
        );
    }

    Ok(screened)
}

fn unsupported(flag: String, tolerant: bool) -> Result<(), ParseError> {
    if tolerant {
        convert_warn!("ignoring unsupported option '{}'", flag);
        Ok(())
    } else {
        Err(ParseError::UnsupportedOption(flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        input: String,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("shape.svg");
        fs::write(&input, b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();

        Fixture {
            input: input.to_str().unwrap().to_string(),
            _dir: dir,
        }
    }

    fn parse_with(tolerant: bool, args: &[&str]) -> Result<Action, Error> {
        let mut argv = vec!["rsvg-convert"];
        argv.extend_from_slice(args);
        ArgParser::new(tolerant).parse(argv)
    }

    fn request(args: &[&str]) -> ConversionRequest {
        let f = fixture();
        let mut args = args.to_vec();
        args.push(f.input.as_str());

        match parse_with(false, &args).unwrap() {
            Action::Convert(r) => r,
            other => panic!("expected a conversion, got {other:?}"),
        }
    }

    fn parse_error(args: &[&str]) -> ParseError {
        let f = fixture();
        let mut args = args.to_vec();
        args.push(f.input.as_str());

        match parse_with(false, &args) {
            Err(Error::Parse(e)) => e,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let r = request(&[]);
        assert_eq!(r.format, Format::Png);
        assert_eq!(r.sizing, Sizing::Default);
        assert_eq!(r.output, Output::Stdout);
        assert_eq!(r.background, None);
        assert!(matches!(r.input, Input::Path(_)));
    }

    #[test]
    fn pdf_at_96_dpi() {
        let r = request(&["-f", "pdf", "-d", "96", "-o", "shape.pdf"]);
        assert_eq!(r.format, Format::Pdf);
        assert_eq!(r.sizing, Sizing::Dpi { x: 96.0, y: 96.0 });
        assert_eq!(r.output, Output::Path(PathBuf::from("shape.pdf")));
    }

    #[test]
    fn all_value_forms_are_equivalent() {
        let f = fixture();
        let parse = |args: &[&str]| {
            let mut args = args.to_vec();
            args.push(f.input.as_str());

            match parse_with(false, &args).unwrap() {
                Action::Convert(r) => r,
                other => panic!("expected a conversion, got {other:?}"),
            }
        };

        let a = parse(&["--dpi-x", "150"]);
        assert_eq!(a.sizing, Sizing::Dpi { x: 150.0, y: 150.0 });

        assert_eq!(a, parse(&["--dpi-x=150"]));
        assert_eq!(a, parse(&["-d150"]));
        assert_eq!(a, parse(&["-d", "150"]));
    }

    #[test]
    fn single_dpi_axis_applies_to_both() {
        assert_eq!(request(&["-p", "300"]).sizing, Sizing::Dpi { x: 300.0, y: 300.0 });
        assert_eq!(
            request(&["-d", "300", "-p", "150"]).sizing,
            Sizing::Dpi { x: 300.0, y: 150.0 }
        );
    }

    #[test]
    fn zoom() {
        assert_eq!(
            request(&["-z", "2"]).sizing,
            Sizing::Zoom(Scale { x: 2.0, y: 2.0 })
        );
        assert_eq!(
            request(&["-x", "2", "--y-zoom", "3"]).sizing,
            Sizing::Zoom(Scale { x: 2.0, y: 3.0 })
        );
    }

    #[test]
    fn size_is_rounded_up_to_pixels() {
        assert_eq!(
            request(&["-w", "1in", "-h", "10.2"]).sizing,
            Sizing::Size {
                width: Some(96),
                height: Some(11)
            }
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            parse_error(&["-w", "0"]),
            ParseError::InvalidValue { option: "--width", .. }
        ));
    }

    #[test]
    fn sizing_modes_conflict() {
        match parse_error(&["-d", "96", "-w", "100"]) {
            ParseError::ConflictingOptions { first, second } => {
                assert_eq!(first, "--dpi-x");
                assert_eq!(second, "--width");
            }
            e => panic!("unexpected {e:?}"),
        }

        assert!(matches!(
            parse_error(&["-z", "2", "-h", "100"]),
            ParseError::ConflictingOptions { .. }
        ));
        assert!(matches!(
            parse_error(&["-z", "2", "-x", "3"]),
            ParseError::ConflictingOptions { .. }
        ));
    }

    #[test]
    fn format_is_case_insensitive() {
        assert_eq!(request(&["-f", "PDF1.4"]).format, Format::Pdf1_4);
    }

    #[test]
    fn unknown_format_is_invalid() {
        match parse_error(&["-f", "gif"]) {
            ParseError::InvalidFormat(f) => assert_eq!(f, "gif"),
            e => panic!("unexpected {e:?}"),
        }
    }

    #[test]
    fn background_and_opacity_compose() {
        let r = request(&["-b", "red", "-y", "0.5"]);
        assert_eq!(
            r.background,
            Some(Background {
                color: Rgba {
                    red: 0xff,
                    green: 0,
                    blue: 0,
                    alpha: 1.0
                },
                opacity: 0.5
            })
        );
    }

    #[test]
    fn invalid_background_names_the_option() {
        assert!(matches!(
            parse_error(&["-b", "not-a-color"]),
            ParseError::InvalidValue {
                option: "--background-color",
                ..
            }
        ));
    }

    #[test]
    fn export_id_hash_is_optional() {
        assert_eq!(request(&["-i", "#layer1"]).export_id.as_deref(), Some("layer1"));
        assert_eq!(request(&["--export-id=layer1"]).export_id.as_deref(), Some("layer1"));
    }

    #[test]
    fn page_and_area() {
        let r = request(&[
            "--page",
            "2",
            "--page-width",
            "2in",
            "--page-height",
            "1in",
            "--left",
            "-10",
            "--top=5mm",
        ]);

        assert_eq!(r.page, Some(2));
        assert_eq!(r.placement.page_size, Some((192.0, 96.0)));
        assert_eq!(r.placement.left, -10.0);
        assert!((r.placement.top - 5.0 * 96.0 / 25.4).abs() < 1e-3);
    }

    #[test]
    fn page_size_needs_both_dimensions() {
        assert!(matches!(
            parse_error(&["--page-width", "100"]),
            ParseError::InvalidValue { .. }
        ));
    }

    #[test]
    fn page_zero_is_a_usage_error() {
        assert!(matches!(parse_error(&["--page", "0"]), ParseError::Usage(_)));
    }

    #[test]
    fn compatibility_flags_are_accepted() {
        let r = request(&["-u", "--keep-image-data", "--testing", "-a"]);
        assert!(r.keep_aspect_ratio);
    }

    #[test]
    fn flags_can_be_clustered() {
        let r = request(&["-ua", "-d96"]);
        assert!(r.keep_aspect_ratio);
        assert_eq!(r.sizing, Sizing::Dpi { x: 96.0, y: 96.0 });
    }

    #[test]
    fn unsupported_long_option() {
        match parse_error(&["--export-plain-svg"]) {
            ParseError::UnsupportedOption(flag) => assert_eq!(flag, "--export-plain-svg"),
            e => panic!("unexpected {e:?}"),
        }
    }

    #[test]
    fn unsupported_short_option_in_cluster() {
        match parse_error(&["-aQ"]) {
            ParseError::UnsupportedOption(flag) => assert_eq!(flag, "-Q"),
            e => panic!("unexpected {e:?}"),
        }
    }

    #[test]
    fn tolerant_mode_drops_unknown_options() {
        let f = fixture();
        let action =
            parse_with(true, &["--frobnicate", "-aQ", "-f", "pdf", f.input.as_str()]).unwrap();

        match action {
            Action::Convert(r) => {
                assert!(r.keep_aspect_ratio);
                assert_eq!(r.format, Format::Pdf);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tolerant_mode_drops_the_value_of_an_unknown_option() {
        let f = fixture();
        let args = ["--frobnicate", "5", "-f", "pdf", f.input.as_str()];

        match parse_with(true, &args).unwrap() {
            Action::Convert(r) => {
                assert_eq!(r.format, Format::Pdf);
                assert_eq!(r.input, Input::Path(PathBuf::from(&f.input)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tolerant_mode_keeps_a_lone_input_after_an_unknown_option() {
        let f = fixture();

        match parse_with(true, &["--frobnicate", f.input.as_str()]).unwrap() {
            Action::Convert(r) => assert_eq!(r.input, Input::Path(PathBuf::from(&f.input))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn option_values_are_not_screened() {
        let argv: Vec<OsString> = ["rsvg-convert", "-o", "--weird.png", "-b", "-x", "--", "-z"]
            .iter()
            .map(OsString::from)
            .collect();

        assert_eq!(screen_options(&build_cli(), argv.clone(), false).unwrap(), argv);
    }

    #[test]
    fn missing_input() {
        match parse_with(false, &["/nonexistent/shape.svg"]) {
            Err(Error::Parse(ParseError::InputNotFound(p))) => {
                assert_eq!(p, PathBuf::from("/nonexistent/shape.svg"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn more_than_one_input() {
        let f = fixture();
        assert!(matches!(
            parse_with(false, &[f.input.as_str(), f.input.as_str()]),
            Err(Error::Parse(ParseError::TooManyInputs))
        ));
    }

    #[test]
    fn version_and_completion() {
        assert!(matches!(parse_with(false, &["-v"]), Ok(Action::PrintVersion)));
        assert!(matches!(
            parse_with(false, &["--completion", "bash"]),
            Ok(Action::PrintCompletion(Shell::Bash))
        ));
    }

    #[test]
    fn help_is_a_clap_error() {
        match parse_with(false, &["-?"]) {
            Err(Error::Parse(ParseError::Usage(e))) => {
                assert_eq!(e.kind(), clap::error::ErrorKind::DisplayHelp)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fingerprint_follows_content() {
        assert_eq!(
            request(&[]).fingerprint,
            Fingerprint::of_bytes(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>")
        );
    }

    #[test]
    fn every_option_is_documented() {
        for arg in build_cli().get_arguments() {
            if arg.get_id() == "FILE" || arg.is_hide_set() {
                continue;
            }
            assert!(arg.get_help().is_some(), "{} has no help", arg.get_id());
        }
    }
}
