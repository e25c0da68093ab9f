//! CSS lengths as accepted by `--width`, `--height`, `--left`, `--top` and the page size options.
//!
//! Only absolute units make sense on a command line, since there is no font or
//! viewport to resolve `em` or percentages against.  Lengths are normalized to
//! CSS pixels (1/96 of an inch), which is what Inkscape expects for its export
//! area and bitmap sizes.

use cssparser::{
    _cssparser_internal_to_lowercase, match_ignore_ascii_case, Parser, ParserInput, Token,
};

pub const PIXELS_PER_INCH: f64 = 96.0;
const POINTS_PER_INCH: f64 = 72.0;
const CM_PER_INCH: f64 = 2.54;
const MM_PER_INCH: f64 = 25.4;
const PICA_PER_INCH: f64 = 6.0;

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum LengthUnit {
    Px,
    In,
    Cm,
    Mm,
    Pt,
    Pc,
}

/// Whether a length may be negative.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Sign {
    Signed,
    Unsigned,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Length {
    pub length: f64,
    pub unit: LengthUnit,
}

impl Length {
    pub fn new(length: f64, unit: LengthUnit) -> Self {
        Self { length, unit }
    }

    /// Parses a length like `"210mm"` or `"300"` (pixels when no unit is given).
    pub fn parse_str(s: &str, sign: Sign) -> Result<Length, String> {
        let mut input = ParserInput::new(s);
        let mut parser = Parser::new(&mut input);

        let length = parse_length(&mut parser).ok_or_else(|| {
            format!("Invalid value: The argument '{s}' can not be parsed as a length")
        })?;

        if parser.expect_exhausted().is_err() {
            return Err(format!(
                "Invalid value: The argument '{s}' can not be parsed as a length"
            ));
        }

        let length = length.map_err(|unit| {
            format!("Invalid value '{s}': unit '{unit}' is not supported; supported units are px, in, cm, mm, pt, pc")
        })?;

        if !length.length.is_finite() {
            return Err(format!("Invalid value '{s}': the length must be finite"));
        }

        if sign == Sign::Unsigned && length.length < 0.0 {
            return Err(format!("Invalid value '{s}': the length can not be negative"));
        }

        Ok(length)
    }

    /// Converts to CSS pixels at 96 DPI.
    pub fn to_pixels(&self) -> f64 {
        match self.unit {
            LengthUnit::Px => self.length,
            LengthUnit::In => self.length * PIXELS_PER_INCH,
            LengthUnit::Cm => self.length * PIXELS_PER_INCH / CM_PER_INCH,
            LengthUnit::Mm => self.length * PIXELS_PER_INCH / MM_PER_INCH,
            LengthUnit::Pt => self.length * PIXELS_PER_INCH / POINTS_PER_INCH,
            LengthUnit::Pc => self.length * PIXELS_PER_INCH / PICA_PER_INCH,
        }
    }
}

/// Returns `None` for tokens that are not lengths at all, and `Some(Err(unit))` for
/// lengths with a relative or unknown unit.
fn parse_length(parser: &mut Parser<'_, '_>) -> Option<Result<Length, String>> {
    let token = parser.next().ok()?.clone();

    match token {
        Token::Number { value, .. } => Some(Ok(Length::new(f64::from(value), LengthUnit::Px))),

        Token::Percentage { .. } => Some(Err(String::from("%"))),

        Token::Dimension {
            value, ref unit, ..
        } => {
            let unit = match_ignore_ascii_case! {unit.as_ref(),
                "px" => LengthUnit::Px,
                "in" => LengthUnit::In,
                "cm" => LengthUnit::Cm,
                "mm" => LengthUnit::Mm,
                "pt" => LengthUnit::Pt,
                "pc" => LengthUnit::Pc,
                _ => return Some(Err(unit.as_ref().to_string())),
            };

            Some(Ok(Length::new(f64::from(value), unit)))
        }

        _ => None,
    }
}
