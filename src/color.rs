//! Page background: a CSS color from `--background-color` combined with `--background-opacity`.

use cssparser::{Color, Parser, ParserInput};

/// An sRGB color with straight (non-premultiplied) alpha in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba {
        red: 0xff,
        green: 0xff,
        blue: 0xff,
        alpha: 1.0,
    };
}

/// Parses the value of `--background-color`; `none` means no background at all.
pub fn parse_background_color(s: &str) -> Result<Option<Rgba>, String> {
    match s {
        "none" | "None" => Ok(None),
        _ => parse_css_color(s).map(Some).ok_or_else(|| {
            format!("Invalid value: The argument '{s}' can not be parsed as a CSS color value")
        }),
    }
}

fn parse_css_color(s: &str) -> Option<Rgba> {
    let mut input = ParserInput::new(s);
    let mut parser = Parser::new(&mut input);

    let color = Color::parse(&mut parser).ok()?;
    parser.expect_exhausted().ok()?;

    match color {
        Color::RGBA(rgba) => Some(Rgba {
            red: rgba.red,
            green: rgba.green,
            blue: rgba.blue,
            alpha: f64::from(rgba.alpha) / 255.0,
        }),

        // currentColor has nothing to refer to on the command line
        _ => None,
    }
}

/// Parses the value of `--background-opacity`.
pub fn parse_opacity(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(o) if (0.0..=1.0).contains(&o) => Ok(o),
        Ok(_) => Err(String::from("Invalid opacity; it must be between 0 and 1")),
        Err(e) => Err(format!("{e}")),
    }
}

/// The background requested on the command line.
///
/// rsvg-convert takes the color and the opacity separately, but Inkscape wants a single
/// color with alpha, so the two are composed here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Background {
    pub color: Rgba,
    pub opacity: f64,
}

impl Background {
    /// Returns `None` when neither option asks for a background.
    pub fn new(color: Option<Rgba>, opacity: Option<f64>) -> Option<Background> {
        match (color, opacity) {
            (None, None) => None,
            (Some(color), opacity) => Some(Background {
                color,
                opacity: opacity.unwrap_or(1.0),
            }),
            (None, Some(opacity)) => Some(Background {
                color: Rgba::WHITE,
                opacity,
            }),
        }
    }

    pub fn alpha(&self) -> u8 {
        let a = (self.color.alpha * self.opacity * 255.0).round();
        cast::u8(a.clamp(0.0, 255.0)).unwrap_or(u8::MAX)
    }

    /// Formats as `#rrggbbaa`.
    pub fn to_hex(&self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            self.color.red,
            self.color.green,
            self.color.blue,
            self.alpha()
        )
    }
}
