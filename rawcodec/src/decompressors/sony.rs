// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::RawcodecError;
use crate::Result;
use crate::bits::extend_diff;
use crate::pixarray::PixU16;
use crate::pumps::BitPump;
use crate::pumps::BitPumpLSB;
use crate::pumps::BitPumpMSB;
use crate::strips::Decoded;
use crate::strips::decode_threaded;

use super::check_dimensions;
use super::check_input;
use super::checked_size;

/// Entries of the oversampled tone curve
pub const SONY_CURVE_SIZE: usize = 0x4001;

/// Build the ARW2 tone curve from the four SonyCurve breakpoints.
pub fn sony_curve(points: [u16; 4]) -> Vec<u16> {
  let mut bp = [0_usize, 0, 0, 0, 0, 4095];
  for (i, p) in points.iter().enumerate() {
    bp[i + 1] = ((p >> 2) & 0xfff) as usize;
  }

  let mut curve: Vec<u16> = (0..SONY_CURVE_SIZE).map(|i| i as u16).collect();
  for i in 0..5 {
    for j in (bp[i] + 1)..=bp[i + 1] {
      curve[j] = curve[j - 1].wrapping_add(1 << i);
    }
  }
  curve
}

/// Largest value an 11 bit ARW2 sample can map to
pub fn arw2_whitelevel(curve: &[u16]) -> u16 {
  curve.get(0x7ff << 1).map(|v| v >> 1).unwrap_or(u16::MAX)
}

/// Legacy ARW differential code. The image is stored column by column,
/// starting at the right edge, even rows before odd rows.
pub fn decode_arw1(buf: &[u8], width: usize, height: usize) -> Result<PixU16> {
  let pixels = check_dimensions("ARW1", width, height)?;
  if height % 2 != 0 {
    return Err(RawcodecError::DecoderFailed(format!("ARW1: height must be even, got {}", height)));
  }
  // every sample takes at least 3 bits
  check_input("ARW1", buf, checked_size("ARW1", &[pixels, 3])?.div_ceil(8))?;

  let mut out = PixU16::new(width, height);
  let mut pump = BitPumpMSB::new(buf);

  let mut sum: i32 = 0;
  for col in (0..width).rev() {
    let mut row = 0;
    while row < height + 1 {
      if row == height {
        row = 1;
      }
      let mut len: u32 = 4 - pump.get_bits(2)?;
      if len == 3 && pump.get_bit()? {
        len = 0;
      }
      if len == 4 {
        while len < 17 && !pump.get_bit()? {
          len += 1;
        }
      }
      let diff = extend_diff(pump.get_ibits(len)?, len);
      sum += diff;
      if !(0..4096).contains(&sum) {
        return Err(RawcodecError::corrupt(format!("ARW1: sample {} out of range at row {}, col {}", sum, row, col)));
      }
      *out.at_mut(row, col) = sum as u16;
      row += 2;
    }
  }
  Ok(out)
}

/// ARW2 8 bpp block code: 16 interleaved pixels per block, coded relative
/// to the block minimum and mapped through the oversampled tone curve.
pub fn decode_arw2(buf: &[u8], width: usize, height: usize, curve: &[u16], max_failures: usize) -> Result<Decoded> {
  let pixels = check_dimensions("ARW2", width, height)?;
  if width % 32 != 0 {
    return Err(RawcodecError::DecoderFailed(format!("ARW2: width {} is not a multiple of 32", width)));
  }
  check_input("ARW2", buf, pixels)?;
  if curve.len() < SONY_CURVE_SIZE {
    return Err(RawcodecError::InvalidCurve(format!("ARW2: tone curve has {} entries", curve.len())));
  }

  decode_threaded(width, height, max_failures, &|out: &mut [u16], row| {
    let mut pump = BitPumpLSB::new(buf);
    pump.set_absolute_offset(width * row)?;

    let mut x = 0;
    while x + 30 < width {
      let max = pump.get_bits(11)?;
      let min = pump.get_bits(11)?;
      let imax = pump.get_bits(4)?;
      let imin = pump.get_bits(4)?;

      let mut sh = 0;
      while sh < 4 && (0x80 << sh) <= max - min.min(max) {
        sh += 1;
      }

      for i in 0..16 {
        let p = if i == imax {
          max
        } else if i == imin {
          min
        } else {
          ((pump.get_bits(7)? << sh) + min).min(0x7ff)
        };
        out[x + i as usize * 2] = curve[(p as usize) << 1] >> 1;
      }
      x += if x & 1 != 0 { 31 } else { 1 };
    }
    Ok(Vec::new())
  })
}

/// ARW2 12 bpp: plain little-endian packed samples, two per three bytes.
pub fn decode_arw2_12bpp(buf: &[u8], width: usize, height: usize, max_failures: usize) -> Result<Decoded> {
  check_dimensions("ARW2", width, height)?;
  if width % 2 != 0 {
    return Err(RawcodecError::DecoderFailed(format!("ARW2: 12 bpp width must be even, got {}", width)));
  }
  let stride = checked_size("ARW2", &[width / 2, 3])?;
  check_input("ARW2", buf, checked_size("ARW2", &[stride, height])?)?;

  decode_threaded(width, height, max_failures, &|out: &mut [u16], row| {
    let src = &buf[row * stride..(row + 1) * stride];
    for (pair, bytes) in out.chunks_exact_mut(2).zip(src.chunks_exact(3)) {
      let (b0, b1, b2) = (bytes[0] as u16, bytes[1] as u16, bytes[2] as u16);
      pair[0] = b0 | ((b1 & 0x0f) << 8);
      pair[1] = (b1 >> 4) | (b2 << 4);
    }
    Ok(Vec::new())
  })
}
