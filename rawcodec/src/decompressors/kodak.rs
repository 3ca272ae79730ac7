// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::RawcodecError;
use crate::Result;
use crate::bits::Endian;
use crate::bits::extend_diff;
use crate::pixarray::PixU16;
use crate::pumps::ByteStream;

use super::check_dimensions;
use super::check_input;

const SEGMENT_SIZE: usize = 256;

/// Kodak 65000 compression. Rows are split into segments of up to 256
/// pixels, each prefixed by a table of 4 bit code lengths.
///
/// The optional `curve` maps decoded values to linear output.
pub fn decode_kodak65000(buf: &[u8], width: usize, height: usize, bps: u32, curve: Option<&[u16]>) -> Result<PixU16> {
  let pixels = check_dimensions("Kodak65000", width, height)?;
  if width % 4 != 0 {
    return Err(RawcodecError::DecoderFailed(format!("Kodak65000: width {} is not a multiple of 4", width)));
  }
  if bps != 10 && bps != 12 {
    return Err(RawcodecError::unsupported(format!("Kodak65000: unexpected bits per sample: {}", bps)));
  }
  // at least half a byte per pixel
  check_input("Kodak65000", buf, pixels / 2)?;

  let mut out = PixU16::new(width, height);
  let mut input = ByteStream::new(buf, Endian::Little);
  let mut segment = [0_i32; SEGMENT_SIZE];
  let limit = 1_i32 << bps;

  for row in 0..height {
    let line = &mut out.data[row * width..(row + 1) * width];
    let mut col = 0;
    while col < width {
      let len = SEGMENT_SIZE.min(width - col);
      decode_segment(&mut input, &mut segment[..len])?;

      let mut pred = [0_i32; 2];
      for (i, diff) in segment[..len].iter().enumerate() {
        pred[i & 1] += diff;
        let value = pred[i & 1];
        if !(0..limit).contains(&value) {
          return Err(RawcodecError::corrupt(format!("Kodak65000: value out of bounds {} (bps = {})", value, bps)));
        }
        line[col] = match curve {
          Some(curve) => curve.get(value as usize).copied().unwrap_or(value as u16),
          None => value as u16,
        };
        col += 1;
      }
    }
  }
  Ok(out)
}

fn decode_segment(input: &mut ByteStream, out: &mut [i32]) -> Result<()> {
  let bsize = out.len();
  let mut blen = [0_u32; SEGMENT_SIZE];
  for i in (0..bsize).step_by(2) {
    let byte = input.get_u8()?;
    blen[i] = (byte & 0x0f) as u32;
    blen[i + 1] = (byte >> 4) as u32;
  }

  let mut bitbuf: u64 = 0;
  let mut bits: u32 = 0;
  if bsize & 7 == 4 {
    bitbuf = (input.get_u8()? as u64) << 8;
    bitbuf += input.get_u8()? as u64;
    bits = 16;
  }

  for (i, diff) in out.iter_mut().enumerate() {
    let len = blen[i];
    if bits < len {
      for j in (0..32).step_by(8) {
        bitbuf += (input.get_u8()? as u64) << (bits + (j ^ 8));
      }
      bits += 32;
    }
    let value = (bitbuf as u32) & (0xffff >> (16 - len));
    bitbuf >>= len;
    bits -= len;
    *diff = extend_diff(value as i32, len);
  }
  Ok(())
}
