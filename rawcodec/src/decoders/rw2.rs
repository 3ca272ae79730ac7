// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use log::debug;

use crate::CFA;
use crate::RawImage;
use crate::RawcodecError;
use crate::Result;
use crate::bits::LEu16;
use crate::decompressors::check_dimensions;
use crate::decompressors::checked_size;
use crate::decompressors::panasonic::PANA_SPLIT_OFFSET;
use crate::decompressors::panasonic::decode_panasonic;
use crate::ifd::Ifd;
use crate::strips::decode_threaded;

use super::Decoder;
use super::RawDecodeParams;
use super::RawFormat;
use super::TiffCommonTag;
use super::finish_image;
use super::split_decoded;

#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum PanasonicTag {
  PanaWidth = 0x02,
  PanaLength = 0x03,
  CFAPattern = 0x09,
  BitsPerSample = 0x0a,
  PanaWBsR = 0x11,
  PanaWBsB = 0x12,
  BlackLevelRed = 0x1c,
  BlackLevelGreen = 0x1d,
  BlackLevelBlue = 0x1e,
  PanaWBs2R = 0x24,
  PanaWBs2G = 0x25,
  PanaWBs2B = 0x26,
  RawFormat = 0x2d,
  PanaStripOffset = 0x118,
}

tag_enum!(PanasonicTag);

/// Panasonic raw format version handled by the predictive codec
const RAW_FORMAT_V4: u32 = 4;

/// Panasonic RW2 decoder
#[derive(Debug, Clone)]
pub struct Rw2Decoder<'a> {
  ifd: &'a Ifd,
  file: &'a [u8],
}

impl<'a> Rw2Decoder<'a> {
  pub fn new(ifd: &'a Ifd, file: &'a [u8]) -> Result<Rw2Decoder<'a>> {
    Ok(Rw2Decoder { ifd, file })
  }

  /// Files without a PanaStripOffset tag store the data in the regular strip
  fn is_old_panasonic(&self) -> bool {
    !self.ifd.has_entry(PanasonicTag::PanaStripOffset)
  }

  fn raw_format(&self) -> Option<u32> {
    self.ifd.get_entry(PanasonicTag::RawFormat).and_then(|v| v.get_u32(0))
  }

  fn get_wb(&self) -> [f32; 4] {
    let tag = |t: PanasonicTag| self.ifd.get_entry(t).and_then(|v| v.get_f32(0));
    if let (Some(r), Some(b)) = (tag(PanasonicTag::PanaWBsR), tag(PanasonicTag::PanaWBsB)) {
      [r, 256.0, b, f32::NAN]
    } else if let (Some(r), Some(g), Some(b)) = (tag(PanasonicTag::PanaWBs2R), tag(PanasonicTag::PanaWBs2G), tag(PanasonicTag::PanaWBs2B)) {
      [r, g, b, f32::NAN]
    } else {
      debug!("RW2: no white balance found");
      [f32::NAN; 4]
    }
  }

  fn get_cfa(&self) -> Result<CFA> {
    match self.ifd.get_entry(PanasonicTag::CFAPattern).and_then(|v| v.get_u16(0)) {
      Some(code) => CFA::from_panasonic_code(code),
      None => CFA::new("RGGB"),
    }
  }

  /// Black levels in RGBE order. Older raw versions store them 15 too low.
  fn get_blacklevels(&self) -> Option<[u16; 4]> {
    let tag = |t: PanasonicTag| self.ifd.get_entry(t).and_then(|v| v.get_u16(0));
    let (r, g, b) = (tag(PanasonicTag::BlackLevelRed)?, tag(PanasonicTag::BlackLevelGreen)?, tag(PanasonicTag::BlackLevelBlue)?);
    let offset = if self.is_old_panasonic() || self.raw_format().unwrap_or(RAW_FORMAT_V4) <= RAW_FORMAT_V4 {
      15
    } else {
      0
    };
    Some([r.saturating_add(offset), g.saturating_add(offset), b.saturating_add(offset), g.saturating_add(offset)])
  }

  /// Locate the raw data and the section split offset
  fn data_location(&self) -> Result<(usize, usize)> {
    let (tag, split) = if self.is_old_panasonic() {
      (TiffCommonTag::StripOffsets.into(), 0)
    } else {
      if let Some(format) = self.raw_format() {
        if format != RAW_FORMAT_V4 {
          return Err(RawcodecError::unsupported(format!("RW2: raw format version {} is not supported", format)));
        }
      }
      (PanasonicTag::PanaStripOffset.into(), PANA_SPLIT_OFFSET)
    };
    let offsets = self.ifd.fetch::<u16>(tag)?;
    if offsets.count() != 1 {
      return Err(RawcodecError::unsupported(format!("RW2: multiple strips found: {}", offsets.count())));
    }
    let offset = offsets.get_usize(0).ok_or("RW2: invalid strip offset")?;
    if offset >= self.file.len() {
      return Err(RawcodecError::DecoderFailed("RW2: invalid image data offset, cannot decode".into()));
    }
    Ok((offset, split))
  }
}

impl<'a> Decoder for Rw2Decoder<'a> {
  fn raw_image(&self, params: &RawDecodeParams) -> Result<RawImage> {
    let width = self.ifd.fetch_usize(PanasonicTag::PanaWidth, 0)?;
    let height = self.ifd.fetch_usize(PanasonicTag::PanaLength, 0)?;
    let bps = match self.ifd.get_entry(PanasonicTag::BitsPerSample).and_then(|v| v.get_usize(0)) {
      Some(bps) => bps,
      None => 12,
    };
    let (offset, split) = self.data_location()?;
    let src = &self.file[offset..];
    debug!("RW2: {}x{}, data at {}, split offset {}", width, height, offset, split);

    let pixels = check_dimensions("RW2", width, height)?;
    let unpacked_size = checked_size("RW2", &[pixels, 2])?;
    let packed_size = checked_size("RW2", &[pixels, 3])? / 2;
    let max_failures = params.strip_failure_limit();
    let decoded = if self.is_old_panasonic() && src.len() >= unpacked_size {
      // completely unpacked, 12 bits left aligned in little-endian words
      decode_threaded(width, height, max_failures, &|out: &mut [u16], row| {
        for (col, pix) in out.iter_mut().enumerate() {
          *pix = LEu16(src, (row * width + col) * 2) >> 4;
        }
        Ok(Vec::new())
      })?
    } else if self.is_old_panasonic() && src.len() >= packed_size {
      return Err(RawcodecError::unsupported("RW2: packed 12 bit data with control bytes"));
    } else {
      decode_panasonic(src, width, height, split, params.zero_is_bad, max_failures)?
    };

    let (pixels, bad_pixels, errors) = split_decoded(decoded);
    let mut image = RawImage::new(RawFormat::Rw2, pixels, bps, self.get_cfa()?).with_wb(self.get_wb());
    if let Some(blacks) = self.get_blacklevels() {
      image.blacklevels = blacks;
    }
    image.bad_pixels = bad_pixels;
    Ok(finish_image(image, errors, params))
  }

  fn format(&self) -> RawFormat {
    RawFormat::Rw2
  }
}
