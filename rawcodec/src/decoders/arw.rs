// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use log::debug;

use crate::CFA;
use crate::RawImage;
use crate::RawcodecError;
use crate::Result;
use crate::decompressors::sony::arw2_whitelevel;
use crate::decompressors::sony::decode_arw1;
use crate::decompressors::sony::decode_arw2;
use crate::decompressors::sony::decode_arw2_12bpp;
use crate::decompressors::sony::sony_curve;
use crate::ifd::Ifd;

use super::Decoder;
use super::RawDecodeParams;
use super::RawFormat;
use super::TiffCommonTag;
use super::finish_image;
use super::split_decoded;

/// Sony compression code for ARW1 and ARW2
pub const SONY_COMPRESSION: u32 = 32767;

/// Largest sensor any ARW body writes
const MAX_WIDTH: usize = 9600;
const MAX_HEIGHT: usize = 6376;

#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum SonyTag {
  SonyCurve = 0x7010,
}

tag_enum!(SonyTag);

/// Sony ARW decoder
#[derive(Debug, Clone)]
pub struct ArwDecoder<'a> {
  ifd: &'a Ifd,
  file: &'a [u8],
}

impl<'a> ArwDecoder<'a> {
  pub fn new(ifd: &'a Ifd, file: &'a [u8]) -> Result<ArwDecoder<'a>> {
    Ok(ArwDecoder { ifd, file })
  }

  fn curve_points(&self) -> Result<[u16; 4]> {
    let mut points = [0_u16; 4];
    for (i, p) in points.iter_mut().enumerate() {
      *p = self.ifd.fetch_u32(SonyTag::SonyCurve, i)? as u16;
    }
    Ok(points)
  }
}

impl<'a> Decoder for ArwDecoder<'a> {
  fn raw_image(&self, params: &RawDecodeParams) -> Result<RawImage> {
    let compression = self.ifd.fetch_u32(TiffCommonTag::Compression, 0)?;
    if compression != SONY_COMPRESSION {
      return Err(RawcodecError::unsupported(format!("ARW: unsupported compression {}", compression)));
    }

    let offsets = self.ifd.fetch(TiffCommonTag::StripOffsets)?;
    let counts = self.ifd.fetch(TiffCommonTag::StripByteCounts)?;
    if offsets.count() != 1 {
      return Err(RawcodecError::unsupported(format!("ARW: multiple strips found: {}", offsets.count())));
    }
    if counts.count() != offsets.count() {
      return Err(RawcodecError::DecoderFailed(format!(
        "ARW: byte count number does not match strip size: count:{}, strips:{}",
        counts.count(),
        offsets.count()
      )));
    }

    let width = self.ifd.fetch_usize(TiffCommonTag::ImageWidth, 0)?;
    let height = self.ifd.fetch_usize(TiffCommonTag::ImageLength, 0)?;
    let bps = self.ifd.fetch_usize(TiffCommonTag::BitsPerSample, 0)?;
    if !matches!(bps, 8 | 12 | 14) {
      return Err(RawcodecError::DecoderFailed(format!("ARW: unexpected bits per pixel: {}", bps)));
    }
    if width == 0 || height == 0 || height % 2 != 0 || width > MAX_WIDTH || height > MAX_HEIGHT {
      return Err(RawcodecError::DecoderFailed(format!("ARW: unexpected image dimensions found: ({}; {})", width, height)));
    }

    let offset = offsets.get_usize(0).ok_or("ARW: invalid strip offset")?;
    let mut count = counts.get_usize(0).ok_or("ARW: invalid strip byte count")?;
    let arw1 = count.checked_mul(8) != Some(width * height * bps);
    if offset >= self.file.len() {
      return Err(RawcodecError::DecoderFailed("ARW: data offset after EOF, file probably truncated".into()));
    }
    count = count.min(self.file.len() - offset);
    let src = &self.file[offset..offset + count];
    debug!("ARW: {}x{} {} bps, {} bytes, arw1: {}", width, height, bps, count, arw1);

    let cfa = CFA::new("RGGB")?;
    let image = if arw1 {
      // hidden rows at the bottom
      let height = height + 8;
      RawImage::new(RawFormat::Arw, decode_arw1(src, width, height)?, 12, cfa)
    } else {
      let max_failures = params.strip_failure_limit();
      match bps {
        8 => {
          let curve = sony_curve(self.curve_points()?);
          let (pixels, bad_pixels, errors) = split_decoded(decode_arw2(src, width, height, &curve, max_failures)?);
          let mut image = RawImage::new(RawFormat::Arw, pixels, 14, cfa).with_whitelevel(arw2_whitelevel(&curve));
          image.bad_pixels = bad_pixels;
          image.errors = errors;
          image
        }
        12 => {
          let (pixels, bad_pixels, errors) = split_decoded(decode_arw2_12bpp(src, width, height, max_failures)?);
          let mut image = RawImage::new(RawFormat::Arw, pixels, 12, cfa);
          image.bad_pixels = bad_pixels;
          image.errors = errors;
          image
        }
        _ => return Err(RawcodecError::unsupported(format!("ARW: unsupported bit depth {}", bps))),
      }
    };
    Ok(finish_image(image, Vec::new(), params))
  }

  fn format(&self) -> RawFormat {
    RawFormat::Arw
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decompressors::testbits::BitWriter;
  use crate::ifd::Value;

  fn arw_ifd(width: u32, height: u32, bps: u16, offset: u32, count: u32) -> Ifd {
    let mut ifd = Ifd::new();
    ifd
      .add_entry(TiffCommonTag::Compression, Value::Short(vec![32767]))
      .add_entry(TiffCommonTag::ImageWidth, Value::Long(vec![width]))
      .add_entry(TiffCommonTag::ImageLength, Value::Long(vec![height]))
      .add_entry(TiffCommonTag::BitsPerSample, Value::Short(vec![bps]))
      .add_entry(TiffCommonTag::StripOffsets, Value::Long(vec![offset]))
      .add_entry(TiffCommonTag::StripByteCounts, Value::Long(vec![count]))
      .add_entry(SonyTag::SonyCurve, Value::Short(vec![8000, 10400, 12900, 14100]));
    ifd
  }

  #[test]
  fn arw1_adds_hidden_rows() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    let mut bits = BitWriter::msb();
    for _ in 0..4 * 10 {
      bits.put(0b011, 3);
    }
    let mut file = vec![0xff_u8; 16];
    let data = bits.finish();
    file.extend_from_slice(&data);
    let ifd = arw_ifd(4, 2, 8, 16, data.len() as u32);
    let image = ArwDecoder::new(&ifd, &file)?.raw_image(&RawDecodeParams::default())?;
    assert_eq!((image.width, image.height), (4, 10));
    assert!(image.pixels().iter().all(|p| *p == 0));
    assert_eq!(image.whitelevels, [4095; 4]);
    Ok(())
  }

  #[test]
  fn arw2_12bpp() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let file = [0x21, 0x43, 0x65, 0x21, 0x43, 0x65];
    let ifd = arw_ifd(2, 2, 12, 0, 6);
    let image = ArwDecoder::new(&ifd, &file)?.raw_image(&RawDecodeParams::default())?;
    assert_eq!(image.pixels(), &[0x321, 0x654, 0x321, 0x654]);
    Ok(())
  }

  #[test]
  fn count_is_clamped_to_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Declared count runs past the end of the file
    let mut bits = BitWriter::msb();
    for _ in 0..2 * 10 {
      bits.put(0b011, 3);
    }
    let file = bits.finish();
    let ifd = arw_ifd(2, 2, 8, 0, 600);
    let image = ArwDecoder::new(&ifd, &file)?.raw_image(&RawDecodeParams::default())?;
    assert_eq!(image.pixels().len(), 20);
    Ok(())
  }

  #[test]
  fn rejects_invalid_headers() {
    let file = [0_u8; 64];
    let params = RawDecodeParams::default();
    let decode = |ifd: &Ifd| ArwDecoder::new(ifd, &file).and_then(|d| d.raw_image(&params));

    let mut ifd = arw_ifd(2, 2, 8, 0, 4);
    ifd.add_entry(TiffCommonTag::Compression, Value::Short(vec![1]));
    assert!(matches!(decode(&ifd), Err(RawcodecError::Unsupported(_))));

    assert!(decode(&arw_ifd(2, 2, 10, 0, 4)).is_err());
    assert!(decode(&arw_ifd(2, 3, 8, 0, 4)).is_err());
    assert!(decode(&arw_ifd(2, 2, 8, 64, 4)).is_err());
    // 14 bps is a valid header but not a supported ARW2 depth
    assert!(matches!(decode(&arw_ifd(2, 2, 14, 0, 7)), Err(RawcodecError::Unsupported(_))));
  }

  #[test]
  fn oversized_dimensions_are_rejected() {
    let file = [0_u8; 64];
    let params = RawDecodeParams::default();
    let decode = |ifd: &Ifd| ArwDecoder::new(ifd, &file).and_then(|d| d.raw_image(&params));
    for (width, height) in [(u32::MAX, u32::MAX - 1), (9602, 2), (32, 6378)] {
      assert!(matches!(decode(&arw_ifd(width, height, 8, 0, 64)), Err(RawcodecError::DecoderFailed(_))));
    }
    assert!(decode(&arw_ifd(4, 2, 8, 0, u32::MAX)).is_err());
  }
}
