//! Bitstream decompressors for vendor specific camera raw formats.
//!
//! The crate takes an already parsed TIFF directory ([`ifd::Ifd`]) plus the
//! raw file bytes and reconstructs the 16-bit sensor samples. Supported
//! encodings are Sony ARW (legacy and ARW2), Phase One IIQ, Panasonic RW2
//! and Kodak 65000.
//!
//! # Example
//! ```rust,no_run
//! use rawcodec::decoders::{RawDecodeParams, RawFormat};
//! use rawcodec::ifd::Ifd;
//!
//! fn decode(ifd: &Ifd, make: &str, file: &[u8]) -> rawcodec::Result<()> {
//!   let format = RawFormat::from_make(make).ok_or("unknown camera make")?;
//!   let image = rawcodec::decode(format, ifd, file, &RawDecodeParams::default())?;
//!   println!("{}x{} pixels, {} bad", image.width, image.height, image.bad_pixels.len());
//!   Ok(())
//! }
//! ```

#![deny(
    //missing_docs,
    //missing_debug_implementations,
    //missing_copy_implementations,
    //unsafe_code,
    unstable_features,
    //unused_import_braces,
    //unused_qualifications
  )]

pub mod bits;
pub mod cfa;
pub mod decoders;
pub mod decompressors;
pub(crate) mod envparams;
pub mod ifd;
pub mod imgop;
pub mod pixarray;
pub mod pumps;
pub mod rawimage;
pub mod strips;

pub use cfa::CFA;
pub use decoders::RawDecodeParams;
pub use decoders::RawFormat;
pub use rawimage::RawImage;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RawcodecError {
  #[error("Unsupported: {}", _0)]
  Unsupported(String),

  #[error("Decoder failed: {}", _0)]
  DecoderFailed(String),

  #[error("Corrupt bitstream: {}", _0)]
  Corrupt(String),

  #[error("Out of buffer: {}", _0)]
  OutOfBuffer(String),

  #[error("Invalid curve: {}", _0)]
  InvalidCurve(String),

  #[error("Too many errors: {failed} of {total} strips failed, first error: {first}")]
  TooManyErrors { failed: usize, total: usize, first: String },
}

pub type Result<T> = std::result::Result<T, RawcodecError>;

impl RawcodecError {
  pub fn unsupported(what: impl AsRef<str>) -> Self {
    Self::Unsupported(what.as_ref().to_string())
  }

  pub fn corrupt(what: impl AsRef<str>) -> Self {
    Self::Corrupt(what.as_ref().to_string())
  }
}

impl From<&String> for RawcodecError {
  fn from(str: &String) -> Self {
    Self::DecoderFailed(str.clone())
  }
}

impl From<String> for RawcodecError {
  fn from(str: String) -> Self {
    Self::DecoderFailed(str)
  }
}

impl From<&str> for RawcodecError {
  fn from(str: &str) -> Self {
    Self::DecoderFailed(str.to_string())
  }
}

/// Decode the raw image of the given format.
///
/// `ifd` is the directory holding the raw image tags, `file` the complete
/// file buffer all offsets are relative to.
pub fn decode(format: RawFormat, ifd: &ifd::Ifd, file: &[u8], params: &RawDecodeParams) -> Result<RawImage> {
  decoders::get_decoder(format, ifd, file)?.raw_image(params)
}

#[cfg(test)]
pub(crate) fn init_test_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}
