// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::RawcodecError;
use crate::Result;
use crate::pumps::BitPump;
use crate::pumps::BitPumpMSB32;
use crate::rawimage::BadPixel;
use crate::strips::Decoded;
use crate::strips::Strip;
use crate::strips::StripSet;
use crate::strips::decode_strips;

use super::check_dimensions;

/// Literal lengths selected by the per-group length code
pub const PHASEONE_LENGTHS: [u32; 10] = [8, 7, 6, 9, 11, 10, 5, 12, 14, 13];

/// Length value that marks a raw 16 bit literal
const LITERAL: u32 = 14;

/// Largest Phase One sensor
pub const PHASEONE_MAX_WIDTH: usize = 11608;
pub const PHASEONE_MAX_HEIGHT: usize = 8708;

/// Decode a Phase One IIQ compressed image, one strip per row.
pub fn decode_phaseone(strips: &StripSet, width: usize, height: usize, max_failures: usize) -> Result<Decoded> {
  check_dimensions("PhaseOne", width, height)?;
  if width > PHASEONE_MAX_WIDTH || height > PHASEONE_MAX_HEIGHT {
    return Err(RawcodecError::DecoderFailed(format!("PhaseOne: image dimensions too large: ({}; {})", width, height)));
  }
  if width % 2 != 0 {
    return Err(RawcodecError::DecoderFailed(format!("PhaseOne: width must be even, got {}", width)));
  }
  if strips.len() != height {
    return Err(RawcodecError::DecoderFailed(format!(
      "PhaseOne: height ({}) vs strip count ({}) mismatch",
      height,
      strips.len()
    )));
  }
  decode_strips(width, height, strips, max_failures, &|out: &mut [u16], strip: &Strip| {
    decode_phaseone_row(strip.data, out)?;
    Ok(Vec::<BadPixel>::new())
  })
}

/// Decode a single row. Values written before an error stay in `out`.
pub fn decode_phaseone_row(src: &[u8], out: &mut [u16]) -> Result<()> {
  let width = out.len();
  let mut pump = BitPumpMSB32::new(src);
  let mut pred = [0_i32; 2];
  let mut len = [0_u32; 2];

  for col in 0..width {
    if col >= (width & !7) {
      len = [LITERAL; 2];
    } else if col & 7 == 0 {
      for l in len.iter_mut() {
        let mut j = 0;
        while j < 5 && !pump.get_bit()? {
          j += 1;
        }
        if j > 0 {
          *l = PHASEONE_LENGTHS[2 * (j - 1) + pump.get_bits(1)? as usize];
        } else if col == 0 {
          return Err(RawcodecError::corrupt("PhaseOne: can not initialize lengths, data is corrupt"));
        }
      }
    }

    let i = len[col & 1];
    if i == LITERAL {
      pred[col & 1] = pump.get_bits(16)? as i32;
    } else {
      let diff = pump.get_bits(i)? as i32 + 1 - (1 << (i - 1));
      pred[col & 1] = pred[col & 1].wrapping_add(diff);
    }
    out[col] = pred[col & 1] as u16;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decompressors::testbits::BitWriter;
  use crate::decompressors::testbits::msb32;

  /// Length code for stream length `len` as written by the encoder
  fn put_length(bits: &mut BitWriter, len: u32) {
    let idx = PHASEONE_LENGTHS.iter().position(|l| *l == len).expect("length");
    let j = idx / 2 + 1;
    bits.put(0, j as u32);
    if j < 5 {
      bits.put(1, 1);
    }
    bits.put((idx % 2) as u32, 1);
  }

  #[test]
  fn length_table_lookup() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    // j = 1 next 0 -> 8 bits, j = 1 next 1 -> 7 bits
    let mut bits = BitWriter::msb();
    bits.put(0b010, 3).put(0b011, 3);
    // even: 8 bit diff of 128 -> 128 + 1 - 128 = 1, odd: 7 bit diff of 64 -> 64 + 1 - 64 = 1
    for _ in 0..4 {
      bits.put(128, 8).put(64, 7);
    }
    let mut out = [0_u16; 8];
    decode_phaseone_row(&msb32(&bits), &mut out)?;
    assert_eq!(out, [1, 1, 2, 2, 3, 3, 4, 4]);
    Ok(())
  }

  #[test]
  fn five_zeros_select_literal() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut bits = BitWriter::msb();
    put_length(&mut bits, 14);
    put_length(&mut bits, 14);
    for v in [0xABCD_u32, 0x1234, 7, 9, 0xffff, 0, 1, 2] {
      bits.put(v, 16);
    }
    let mut out = [0_u16; 8];
    decode_phaseone_row(&msb32(&bits), &mut out)?;
    assert_eq!(out, [0xABCD, 0x1234, 7, 9, 0xffff, 0, 1, 2]);
    Ok(())
  }

  #[test]
  fn five_zeros_then_one_select_13_bits() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut bits = BitWriter::msb();
    // even stream: 00000 1 -> 13 bit diffs, odd stream: 00000 0 -> literals
    bits.put(0b000001, 6).put(0b000000, 6);
    for (diff, literal) in [(4096_u32, 0x0100_u32), (4100, 0x0200), (4095, 0x0300), (4096, 0x0400)] {
      bits.put(diff, 13).put(literal, 16);
    }
    let mut out = [0_u16; 8];
    decode_phaseone_row(&msb32(&bits), &mut out)?;
    assert_eq!(out, [1, 0x0100, 6, 0x0200, 6, 0x0300, 7, 0x0400]);
    Ok(())
  }

  #[test]
  fn literal_overwrites_predictor() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut bits = BitWriter::msb();
    // group 0: 5 bit diffs for both streams
    put_length(&mut bits, 5);
    put_length(&mut bits, 5);
    for _ in 0..8 {
      // 31 + 1 - 16 = +16
      bits.put(31, 5);
    }
    // group 1: literals
    put_length(&mut bits, 14);
    put_length(&mut bits, 14);
    for _ in 0..8 {
      bits.put(5, 16);
    }
    let mut out = [0_u16; 16];
    decode_phaseone_row(&msb32(&bits), &mut out)?;
    assert_eq!(&out[..8], &[16, 16, 32, 32, 48, 48, 64, 64]);
    assert_eq!(&out[8..], &[5; 8]);
    Ok(())
  }

  #[test]
  fn reuse_lengths_after_first_group() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut bits = BitWriter::msb();
    put_length(&mut bits, 6);
    put_length(&mut bits, 6);
    for _ in 0..8 {
      // 32 + 1 - 32 = +1
      bits.put(32, 6);
    }
    // keep previous lengths
    bits.put(1, 1).put(1, 1);
    for _ in 0..8 {
      bits.put(32, 6);
    }
    let mut out = [0_u16; 16];
    decode_phaseone_row(&msb32(&bits), &mut out)?;
    assert_eq!(out[14], 8);
    assert_eq!(out[15], 8);
    Ok(())
  }

  #[test]
  fn tail_columns_are_literals() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut bits = BitWriter::msb();
    bits.put(0x0102, 16).put(0x0304, 16);
    let mut out = [0_u16; 2];
    decode_phaseone_row(&msb32(&bits), &mut out)?;
    assert_eq!(out, [0x0102, 0x0304]);
    Ok(())
  }

  #[test]
  fn corrupt_first_group() {
    let mut bits = BitWriter::msb();
    bits.put(1, 1).pad_to(8);
    let mut out = [0_u16; 8];
    assert!(matches!(decode_phaseone_row(&msb32(&bits), &mut out), Err(RawcodecError::Corrupt(_))));
  }

  #[test]
  fn truncated_row() {
    let mut out = [0_u16; 8];
    assert!(matches!(decode_phaseone_row(&[0x00, 0x00], &mut out), Err(RawcodecError::OutOfBuffer(_))));
  }
}
