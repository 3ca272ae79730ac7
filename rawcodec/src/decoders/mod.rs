// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::RawImage;
use crate::RawcodecError;
use crate::Result;
use crate::envparams::rawcodec_ignore_corrections;
use crate::envparams::rawcodec_max_strip_failures;
use crate::ifd::Ifd;
use crate::pixarray::PixU16;
use crate::rawimage::BadPixel;
use crate::strips::DEFAULT_MAX_STRIP_FAILURES;
use crate::strips::Decoded;

/// Implement the conversions needed to use an enum as tag identifier.
macro_rules! tag_enum {
  ($name:ident) => {
    impl From<$name> for u16 {
      fn from(tag: $name) -> u16 {
        tag as u16
      }
    }

    impl crate::ifd::Tag for $name {}

    impl TryFrom<u16> for $name {
      type Error = String;

      fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Self::n(value).ok_or(format!("Unable to convert tag: {}, not defined in enum {}", value, stringify!($name)))
      }
    }
  };
}

pub mod arw;
pub mod dcr;
pub mod iiq;
pub mod rw2;

#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum TiffCommonTag {
  ImageWidth = 0x0100,
  ImageLength = 0x0101,
  BitsPerSample = 0x0102,
  Compression = 0x0103,
  Make = 0x010f,
  StripOffsets = 0x0111,
  StripByteCounts = 0x0117,
  KodakIFD = 0x8290,
}

tag_enum!(TiffCommonTag);

/// Raw formats handled by this crate
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawFormat {
  Arw,
  Iiq,
  Rw2,
  Kodak,
}

impl RawFormat {
  /// Select the format by the camera make as stored in the Make tag.
  pub fn from_make(make: &str) -> Option<Self> {
    match make.trim() {
      "SONY" => Some(Self::Arw),
      "Phase One A/S" | "Phase One" => Some(Self::Iiq),
      "Panasonic" | "LEICA" => Some(Self::Rw2),
      "Kodak" | "EASTMAN KODAK COMPANY" => Some(Self::Kodak),
      _ => None,
    }
  }
}

impl fmt::Display for RawFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Arw => "ARW",
      Self::Iiq => "IIQ",
      Self::Rw2 => "RW2",
      Self::Kodak => "DCR",
    };
    f.write_str(name)
  }
}

/// Decode time options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDecodeParams {
  /// Report zero samples of Panasonic files as bad pixels
  pub zero_is_bad: bool,
  /// Strip failures tolerated before the decode is aborted
  pub max_strip_failures: usize,
  /// Apply the sensor calibration stored in IIQ files
  pub apply_corrections: bool,
  /// Interpolate all bad pixels before returning the image
  pub fix_bad_pixels: bool,
}

impl Default for RawDecodeParams {
  fn default() -> Self {
    Self {
      zero_is_bad: true,
      max_strip_failures: DEFAULT_MAX_STRIP_FAILURES,
      apply_corrections: true,
      fix_bad_pixels: false,
    }
  }
}

impl RawDecodeParams {
  /// Parse parameters from a TOML document, missing keys keep their defaults.
  pub fn from_toml(doc: &str) -> Result<Self> {
    toml::from_str(doc).map_err(|e| RawcodecError::DecoderFailed(format!("Invalid decode parameters: {}", e)))
  }

  pub(crate) fn strip_failure_limit(&self) -> usize {
    rawcodec_max_strip_failures().unwrap_or(self.max_strip_failures)
  }

  pub(crate) fn corrections_enabled(&self) -> bool {
    self.apply_corrections && !rawcodec_ignore_corrections()
  }
}

pub trait Decoder {
  fn raw_image(&self, params: &RawDecodeParams) -> Result<RawImage>;

  fn format(&self) -> RawFormat;
}

/// Create the decoder for `format`. `ifd` holds the raw image tags,
/// `file` is the complete file buffer.
pub fn get_decoder<'a>(format: RawFormat, ifd: &'a Ifd, file: &'a [u8]) -> Result<Box<dyn Decoder + 'a>> {
  debug!("Using {} decoder", format);
  let decoder: Box<dyn Decoder + 'a> = match format {
    RawFormat::Arw => Box::new(arw::ArwDecoder::new(ifd, file)?),
    RawFormat::Iiq => Box::new(iiq::IiqDecoder::new(file)?),
    RawFormat::Rw2 => Box::new(rw2::Rw2Decoder::new(ifd, file)?),
    RawFormat::Kodak => Box::new(dcr::DcrDecoder::new(ifd, file)?),
  };
  Ok(decoder)
}

/// Slice `len` bytes at `offset` out of the file.
pub(crate) fn file_slice(file: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
  offset
    .checked_add(len)
    .and_then(|end| file.get(offset..end))
    .ok_or_else(|| RawcodecError::DecoderFailed(format!("Data at {}+{} is outside of file ({} bytes)", offset, len, file.len())))
}

/// Move decoder results into the image, bad pixels get fixed on request.
pub(crate) fn finish_image(mut image: RawImage, decoded_errors: Vec<String>, params: &RawDecodeParams) -> RawImage {
  image.errors.extend(decoded_errors);
  if params.fix_bad_pixels {
    image.fix_bad_pixels();
  }
  image
}

/// Split a parallel decode result into pixels and the remaining report.
pub(crate) fn split_decoded(decoded: Decoded) -> (PixU16, Vec<BadPixel>, Vec<String>) {
  let messages = decoded.errors.messages();
  (decoded.image, decoded.errors.bad_pixels, messages)
}
