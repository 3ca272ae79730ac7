use log::debug;

use crate::CFA;
use crate::RawImage;
use crate::RawcodecError;
use crate::Result;
use crate::decompressors::kodak::decode_kodak65000;
use crate::ifd::Ifd;
use crate::ifd::Value;

use super::Decoder;
use super::RawDecodeParams;
use super::RawFormat;
use super::TiffCommonTag;
use super::finish_image;

/// Kodak compression code handled by this decoder
pub const KODAK_65000: u32 = 65000;

#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum KodakTag {
  WhiteBalanceBlob = 0x03fd,
  Linearization = 0x090d,
}

tag_enum!(KodakTag);

/// Kodak DCR decoder
#[derive(Debug, Clone)]
pub struct DcrDecoder<'a> {
  ifd: &'a Ifd,
  kodak_ifd: &'a Ifd,
  file: &'a [u8],
}

impl<'a> DcrDecoder<'a> {
  pub fn new(ifd: &'a Ifd, file: &'a [u8]) -> Result<DcrDecoder<'a>> {
    let kodak_ifd = ifd
      .get_sub_ifd(TiffCommonTag::KodakIFD)
      .ok_or_else(|| RawcodecError::DecoderFailed("DCR: couldn't find the Kodak IFD".into()))?;
    Ok(DcrDecoder { ifd, kodak_ifd, file })
  }

  /// Linearization table, its size selects the bit depth
  fn linearization(&self) -> Result<(&'a [u16], u32)> {
    match self.kodak_ifd.get_entry(KodakTag::Linearization) {
      Some(Value::Short(table)) if table.len() == 1024 => Ok((table.as_slice(), 10)),
      Some(Value::Short(table)) if table.len() == 4096 => Ok((table.as_slice(), 12)),
      _ => Err(RawcodecError::DecoderFailed("DCR: couldn't find the linearization table".into())),
    }
  }

  fn get_wb(&self) -> Result<[f32; 4]> {
    let mut wb = [f32::NAN; 4];
    if let Some(blob) = self.kodak_ifd.get_entry(KodakTag::WhiteBalanceBlob) {
      if blob.count() == 72 {
        for (i, coeff) in wb.iter_mut().take(3).enumerate() {
          let mul = blob.get_u16(20 + i).unwrap_or(0);
          if mul == 0 {
            return Err(RawcodecError::DecoderFailed("DCR: WB coefficient is zero".into()));
          }
          *coeff = 2048.0 / mul as f32;
        }
      }
    }
    Ok(wb)
  }
}

impl<'a> Decoder for DcrDecoder<'a> {
  fn raw_image(&self, params: &RawDecodeParams) -> Result<RawImage> {
    let compression = self.ifd.fetch_u32(TiffCommonTag::Compression, 0)?;
    if compression != KODAK_65000 {
      return Err(RawcodecError::unsupported(format!("DCR: unsupported compression {}", compression)));
    }
    let width = self.ifd.fetch_usize(TiffCommonTag::ImageWidth, 0)?;
    let height = self.ifd.fetch_usize(TiffCommonTag::ImageLength, 0)?;
    if width > 4516 || height > 3012 {
      return Err(RawcodecError::DecoderFailed(format!("DCR: unexpected image dimensions found: ({}; {})", width, height)));
    }
    let offset = self.ifd.fetch_usize(TiffCommonTag::StripOffsets, 0)?;
    let src = self
      .file
      .get(offset..)
      .ok_or_else(|| RawcodecError::DecoderFailed(format!("DCR: strip offset {} beyond end of file", offset)))?;

    let (curve, bps) = self.linearization()?;
    debug!("DCR: {}x{} {} bps, data at {}", width, height, bps, offset);
    let pixels = decode_kodak65000(src, width, height, bps, Some(curve))?;
    let image = RawImage::new(RawFormat::Kodak, pixels, bps as usize, CFA::new("RGGB")?).with_wb(self.get_wb()?);
    Ok(finish_image(image, Vec::new(), params))
  }

  fn format(&self) -> RawFormat {
    RawFormat::Kodak
  }
}
