use predicates::prelude::*;
use predicates::reflection::PredicateReflection;
use std::fmt;

/// Checks that some output ([u8]) starts with the signature of a file type.
///
/// The renderer is a stand-in during these tests, so the signature is all there is to check.
#[derive(Debug)]
pub struct MagicPredicate {
    name: &'static str,
    magic: &'static [u8],
}

impl Predicate<[u8]> for MagicPredicate {
    fn eval(&self, data: &[u8]) -> bool {
        data.starts_with(self.magic)
    }
}

impl PredicateReflection for MagicPredicate {}

impl fmt::Display for MagicPredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "is a {} file", self.name)
    }
}

pub fn is_png() -> MagicPredicate {
    MagicPredicate {
        name: "PNG",
        magic: b"\x89PNG\r\n\x1a\n",
    }
}

pub fn is_pdf() -> MagicPredicate {
    MagicPredicate {
        name: "PDF",
        magic: b"%PDF-",
    }
}

pub fn is_ps() -> MagicPredicate {
    MagicPredicate {
        name: "PostScript",
        magic: b"%!PS-Adobe-3.0\n",
    }
}

pub fn is_eps() -> MagicPredicate {
    MagicPredicate {
        name: "EPS",
        magic: b"%!PS-Adobe-3.0 EPSF-3.0\n",
    }
}

pub fn is_svg() -> MagicPredicate {
    MagicPredicate {
        name: "SVG",
        magic: b"<svg",
    }
}
