// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Phase One IIQ decoder.
//!
//! IIQ files are TIFF files, but the raw data is described by a private
//! little-endian tag table that starts directly behind the TIFF header.
//! All offsets in this table are relative to the start of that block.

use std::collections::BTreeMap;

use log::debug;
use log::warn;

use crate::CFA;
use crate::RawImage;
use crate::RawcodecError;
use crate::Result;
use crate::bits::Endian;
use crate::bits::LEu16;
use crate::decompressors::phaseone::PHASEONE_MAX_HEIGHT;
use crate::decompressors::phaseone::PHASEONE_MAX_WIDTH;
use crate::decompressors::phaseone::decode_phaseone;
use crate::pumps::ByteStream;
use crate::strips::StripSet;
use crate::strips::decode_threaded;

use super::Decoder;
use super::RawDecodeParams;
use super::RawFormat;
use super::file_slice;
use super::finish_image;
use super::split_decoded;

mod correction;

pub use correction::Defect;
pub use correction::SensorCalibration;
pub use correction::fix_bad_column;

/// Start of the IIQ block, directly after the TIFF header
const IIQ_BASE: usize = 8;
const IIQ_MAGIC: u32 = 0x4949_4949;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum IiqTag {
  WhiteBalance = 0x107,
  Width = 0x108,
  Height = 0x109,
  Format = 0x10e,
  DataOffset = 0x10f,
  SensorCorrection = 0x110,
  StripOffset = 0x21c,
  BlackLevel = 0x21d,
  SplitCol = 0x222,
  SplitRow = 0x224,
}

impl From<IiqTag> for u32 {
  fn from(tag: IiqTag) -> u32 {
    tag as u32
  }
}

/// Known IIQ compression formats
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum IiqCompression {
  Uncompressed,
  Raw1,
  // L14
  IIQ_L,
  // "IIQ 16 Extended" and "IIQ 16 Large"
  IIQ_L16,
}

impl IiqCompression {
  fn from_code(code: u32) -> Result<Self> {
    match code {
      0 => Ok(Self::Uncompressed),
      1 => Ok(Self::Raw1),
      3 => Ok(Self::IIQ_L),
      8 => Ok(Self::IIQ_L16),
      _ => Err(RawcodecError::unsupported(format!("IIQ: compression format {} is not supported", code))),
    }
  }

  fn bits(&self) -> usize {
    match self {
      Self::IIQ_L16 => 16,
      _ => 14,
    }
  }
}

/// Entry of the private tag table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IiqEntry {
  pub typ: u32,
  pub len: usize,
  pub data: u32,
}

/// Parse the private tag table of an IIQ file.
pub fn parse_iiq_entries(file: &[u8]) -> Result<BTreeMap<u32, IiqEntry>> {
  let file_stream = ByteStream::new(file, Endian::Little);
  let mut block = file_stream.sub_stream(IIQ_BASE, file.len().saturating_sub(IIQ_BASE))?;
  let magic = block.get_u32()?;
  if magic != IIQ_MAGIC {
    return Err(RawcodecError::DecoderFailed(format!("IIQ: invalid magic 0x{:08x}", magic)));
  }
  block.seek(8)?;
  let table = block.get_u32()? as usize;
  block.seek(table)?;
  let count = block.get_u32()? as usize;
  block.skip_bytes(4)?;
  if count.saturating_mul(16) > block.remaining_bytes() {
    return Err(RawcodecError::DecoderFailed(format!("IIQ: tag table with {} entries exceeds file", count)));
  }

  let mut entries = BTreeMap::new();
  for _ in 0..count {
    let tag = block.get_u32()?;
    let typ = block.get_u32()?;
    let len = block.get_u32()? as usize;
    let data = block.get_u32()?;
    entries.insert(tag, IiqEntry { typ, len, data });
  }
  debug!("IIQ: found {} entries in tag table", entries.len());
  Ok(entries)
}

/// Phase One IIQ decoder
#[derive(Debug, Clone)]
pub struct IiqDecoder<'a> {
  file: &'a [u8],
  entries: BTreeMap<u32, IiqEntry>,
}

impl<'a> IiqDecoder<'a> {
  pub fn new(file: &'a [u8]) -> Result<IiqDecoder<'a>> {
    let entries = parse_iiq_entries(file)?;
    Ok(IiqDecoder { file, entries })
  }

  fn value(&self, tag: IiqTag) -> Option<u32> {
    self.entries.get(&tag.into()).map(|e| e.data)
  }

  fn fetch(&self, tag: IiqTag) -> Result<u32> {
    self
      .value(tag)
      .ok_or_else(|| RawcodecError::DecoderFailed(format!("IIQ: unable to find {:?} in tag table", tag)))
  }

  /// Absolute file offset for an offset value of the tag table
  fn file_offset(&self, tag: IiqTag) -> Result<usize> {
    (self.fetch(tag)? as usize)
      .checked_add(IIQ_BASE)
      .ok_or_else(|| RawcodecError::DecoderFailed(format!("IIQ: {:?} offset out of range", tag)))
  }

  fn compression(&self) -> Result<IiqCompression> {
    match self.value(IiqTag::Format) {
      Some(code) => IiqCompression::from_code(code),
      None => Ok(IiqCompression::IIQ_L),
    }
  }

  fn get_wb(&self) -> Result<[f32; 4]> {
    if !self.entries.contains_key(&IiqTag::WhiteBalance.into()) {
      return Ok([f32::NAN; 4]);
    }
    let mut wb = ByteStream::new(file_slice(self.file, self.file_offset(IiqTag::WhiteBalance)?, 12)?, Endian::Little);
    Ok([wb.get_f32()?, wb.get_f32()?, wb.get_f32()?, f32::NAN])
  }

  fn split_offsets(&self) -> Option<(usize, usize)> {
    match (self.value(IiqTag::SplitCol), self.value(IiqTag::SplitRow)) {
      (Some(col), Some(row)) => Some((col as usize, row as usize)),
      _ => None,
    }
  }

  fn sensor_calibration(&self) -> Result<Option<SensorCalibration>> {
    if !self.entries.contains_key(&IiqTag::SensorCorrection.into()) {
      return Ok(None);
    }
    let offset = self.file_offset(IiqTag::SensorCorrection)?;
    let stream = ByteStream::new(self.file, Endian::Little).sub_stream(offset, self.file.len().saturating_sub(offset))?;
    SensorCalibration::parse(&stream).map(Some)
  }

  /// Row start offsets relative to the data block
  fn strip_offsets(&self, height: usize) -> Result<Vec<(usize, usize)>> {
    let table = file_slice(self.file, self.file_offset(IiqTag::StripOffset)?, height * 4)?;
    let mut stream = ByteStream::new(table, Endian::Little);
    (0..height).map(|row| Ok((row, stream.get_u32()? as usize))).collect()
  }
}

impl<'a> Decoder for IiqDecoder<'a> {
  fn raw_image(&self, params: &RawDecodeParams) -> Result<RawImage> {
    let format = self.compression()?;
    let width = self.fetch(IiqTag::Width)? as usize;
    let height = self.fetch(IiqTag::Height)? as usize;
    if width == 0 || height == 0 || width > PHASEONE_MAX_WIDTH || height > PHASEONE_MAX_HEIGHT {
      return Err(RawcodecError::DecoderFailed(format!("IIQ: unexpected image dimensions: ({}; {})", width, height)));
    }
    let data_offset = self.file_offset(IiqTag::DataOffset)?;
    if data_offset > self.file.len() {
      return Err(RawcodecError::DecoderFailed(format!("IIQ: data offset {} out of bounds", data_offset)));
    }
    let data = &self.file[data_offset..];
    debug!("IIQ: {}x{} format {:?}, data at {}", width, height, format, data_offset);

    let max_failures = params.strip_failure_limit();
    let decoded = match format {
      IiqCompression::Uncompressed => {
        file_slice(data, 0, width * height * 2)?;
        decode_threaded(width, height, max_failures, &|out: &mut [u16], row| {
          for (col, pix) in out.iter_mut().enumerate() {
            *pix = LEu16(data, (row * width + col) * 2);
          }
          Ok(Vec::new())
        })?
      }
      IiqCompression::Raw1 | IiqCompression::IIQ_L | IiqCompression::IIQ_L16 => {
        let offsets = self.strip_offsets(height)?;
        let strips = StripSet::from_offsets(data, &offsets, height)?;
        decode_phaseone(&strips, width, height, max_failures)?
      }
    };
    let (mut pixels, mut bad_pixels, errors) = split_decoded(decoded);

    let cfa = CFA::new("RGGB")?;
    if params.corrections_enabled() {
      if let Some(calib) = self.sensor_calibration()? {
        debug!("IIQ: applying sensor calibration with {} defects", calib.defects.len());
        bad_pixels.extend(calib.apply(&mut pixels, &cfa, self.split_offsets())?);
      }
    } else {
      warn!("IIQ: sensor corrections are disabled");
    }

    let bits = format.bits();
    let black = self.value(IiqTag::BlackLevel).map(|b| (b >> (16 - bits)) as u16).unwrap_or(0);
    let mut image = RawImage::new(RawFormat::Iiq, pixels, bits, cfa)
      .with_wb(self.get_wb()?)
      .with_blacklevel(black);
    image.bad_pixels = bad_pixels;
    Ok(finish_image(image, errors, params))
  }

  fn format(&self) -> RawFormat {
    RawFormat::Iiq
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Minimal IIQ file: TIFF header, IIQ header, payload and tag table
  fn iiq_file(entries: &[(IiqTag, u32)], payload: &[u8]) -> Vec<u8> {
    let mut block = vec![0_u8; 16];
    block[0..4].copy_from_slice(&IIQ_MAGIC.to_le_bytes());
    block.extend_from_slice(payload);
    let table = block.len() as u32;
    block[8..12].copy_from_slice(&table.to_le_bytes());
    block.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    block.extend_from_slice(&[0; 4]);
    for (tag, data) in entries {
      for v in [*tag as u32, 4, 4, *data] {
        block.extend_from_slice(&v.to_le_bytes());
      }
    }
    let mut file = b"II*\0\x08\0\0\0".to_vec();
    file.extend(block);
    file
  }

  #[test]
  fn parse_tag_table() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    let file = iiq_file(&[(IiqTag::Width, 640), (IiqTag::Height, 480)], &[]);
    let entries = parse_iiq_entries(&file)?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[&0x108].data, 640);
    Ok(())
  }

  #[test]
  fn invalid_container() {
    let mut file = iiq_file(&[(IiqTag::Width, 640)], &[]);
    file[8] = 0;
    assert!(IiqDecoder::new(&file).is_err());
    let file = iiq_file(&[(IiqTag::Width, 640)], &[]);
    assert!(IiqDecoder::new(&file[..file.len() - 4]).is_err());
    assert!(IiqDecoder::new(&[0; 10]).is_err());
  }

  #[test]
  fn uncompressed_with_wb_and_black() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut payload = Vec::new();
    for v in [1_u16, 2, 3, 0x3fff] {
      payload.extend_from_slice(&v.to_le_bytes());
    }
    for v in [1.5_f32, 1.0, 2.25] {
      payload.extend_from_slice(&v.to_le_bytes());
    }
    let file = iiq_file(
      &[
        (IiqTag::Format, 0),
        (IiqTag::Width, 2),
        (IiqTag::Height, 2),
        (IiqTag::DataOffset, 16),
        (IiqTag::WhiteBalance, 24),
        (IiqTag::BlackLevel, 1024),
      ],
      &payload,
    );
    let image = IiqDecoder::new(&file)?.raw_image(&RawDecodeParams::default())?;
    assert_eq!(image.pixels(), &[1, 2, 3, 0x3fff]);
    assert_eq!(&image.wb_coeffs[..3], &[1.5, 1.0, 2.25]);
    assert!(image.wb_coeffs[3].is_nan());
    assert_eq!(image.blacklevels, [256; 4]);
    assert_eq!(image.whitelevels, [0x3fff; 4]);
    assert_eq!(image.format, RawFormat::Iiq);
    Ok(())
  }

  #[test]
  fn missing_wb_is_nan() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let file = iiq_file(&[(IiqTag::Format, 0), (IiqTag::Width, 1), (IiqTag::Height, 1), (IiqTag::DataOffset, 16)], &[7, 0]);
    let image = IiqDecoder::new(&file)?.raw_image(&RawDecodeParams::default())?;
    assert_eq!(image.pixels(), &[7]);
    assert!(image.wb_coeffs.iter().all(|c| c.is_nan()));
    Ok(())
  }

  #[test]
  fn unsupported_format() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let file = iiq_file(&[(IiqTag::Format, 5), (IiqTag::Width, 2), (IiqTag::Height, 2), (IiqTag::DataOffset, 16)], &[]);
    let res = IiqDecoder::new(&file)?.raw_image(&RawDecodeParams::default());
    assert!(matches!(res, Err(RawcodecError::Unsupported(_))));
    Ok(())
  }

  #[test]
  fn oversized_dimensions_are_rejected() -> std::result::Result<(), Box<dyn std::error::Error>> {
    for (format, width, height) in [(0, u32::MAX, u32::MAX), (3, u32::MAX, u32::MAX), (0, 11610, 2), (8, 2, 8710)] {
      let file = iiq_file(
        &[(IiqTag::Format, format), (IiqTag::Width, width), (IiqTag::Height, height), (IiqTag::DataOffset, 16), (IiqTag::StripOffset, 16)],
        &[0; 16],
      );
      let res = IiqDecoder::new(&file)?.raw_image(&RawDecodeParams::default());
      assert!(matches!(res, Err(RawcodecError::DecoderFailed(_))), "{}x{} format {}", width, height, format);
    }
    Ok(())
  }

  #[test]
  fn compressed_literal_rows() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // width 2 is below one 8 pixel group, every sample is a 16 bit literal
    // rows: [0x0102, 0x0304], [0x0506, 0x0708] as MSB32 words
    let mut payload = vec![0x04, 0x03, 0x02, 0x01, 0x08, 0x07, 0x06, 0x05];
    // strip table at 24: row 1 comes first in the payload
    let rows = [4_u32, 0];
    payload.extend(rows.iter().flat_map(|v| v.to_le_bytes()));
    let file = iiq_file(
      &[(IiqTag::Format, 8), (IiqTag::Width, 2), (IiqTag::Height, 2), (IiqTag::DataOffset, 16), (IiqTag::StripOffset, 24)],
      &payload,
    );
    let image = IiqDecoder::new(&file)?.raw_image(&RawDecodeParams::default())?;
    assert_eq!(image.pixels(), &[0x0506, 0x0708, 0x0102, 0x0304]);
    assert_eq!(image.bps, 16);
    Ok(())
  }
}
