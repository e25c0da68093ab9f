//! A drop-in replacement for `rsvg-convert` that delegates rendering to Inkscape.
//!
//! The command line of rsvg-convert is parsed into a [`ConversionRequest`](request::ConversionRequest)
//! by [`cli`], translated into Inkscape options by [`translate`], and the artifact is
//! either found in, or built into, the on-disk [`cache`] before being copied to its
//! destination by [`runner::materialize`].  [`convert::Converter`] ties these together.

#[macro_use]
pub mod log;

pub mod cache;
pub mod cli;
pub mod color;
pub mod config;
pub mod convert;
pub mod error;
pub mod length;
pub mod request;
pub mod runner;
pub mod translate;
