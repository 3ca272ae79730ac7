// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::RawcodecError;
use crate::Result;
use crate::rawimage::BadPixel;
use crate::strips::Decoded;
use crate::strips::decode_threaded_multiline;

use super::check_dimensions;
use super::checked_size;

/// Size of one rotated input section
pub const PANA_BUF_SIZE: usize = 0x4000;

/// Split offset used by files carrying a PanaStripOffset tag
pub const PANA_SPLIT_OFFSET: usize = 0x1FF8;

/// Rows handled by one parallel task
const ROWS_PER_TASK: usize = 16;

/// Bit pump over 0x4000 byte sections. Each section is stored rotated
/// around `split` and read backwards through a 17 bit cursor.
pub struct BitPumpPanasonic<'a> {
  input: &'a [u8],
  pos: usize,
  buf: Vec<u8>,
  vbits: u32,
  split: usize,
}

impl<'a> BitPumpPanasonic<'a> {
  pub fn new(input: &'a [u8], split: usize) -> Self {
    Self {
      input,
      pos: 0,
      buf: vec![0; PANA_BUF_SIZE + 1],
      vbits: 0,
      split,
    }
  }

  fn refill(&mut self) -> Result<()> {
    let remaining = self.input.len() - self.pos;
    if remaining == 0 {
      return Err(RawcodecError::OutOfBuffer(format!("BitPumpPanasonic: no data left at byte {}", self.pos)));
    }
    let size = remaining.min(PANA_BUF_SIZE - self.split);
    self.buf[self.split..self.split + size].copy_from_slice(&self.input[self.pos..self.pos + size]);
    self.pos += size;

    let size = (self.input.len() - self.pos).min(self.split);
    if size != 0 {
      self.buf[..size].copy_from_slice(&self.input[self.pos..self.pos + size]);
      self.pos += size;
    }
    Ok(())
  }

  pub fn get_bits(&mut self, nbits: u32) -> Result<u32> {
    if self.vbits == 0 {
      self.refill()?;
    }
    self.vbits = self.vbits.wrapping_sub(nbits) & 0x1ffff;
    let byte = ((self.vbits >> 3) ^ 0x3ff0) as usize;
    let word = self.buf[byte] as u32 | (self.buf[byte + 1] as u32) << 8;
    Ok((word >> (self.vbits & 7)) & ((1 << nbits) - 1))
  }

  pub fn skip_bytes(&mut self, bytes: usize) -> Result<()> {
    let blocks = (bytes / PANA_BUF_SIZE) * PANA_BUF_SIZE;
    if blocks > self.input.len() - self.pos {
      return Err(RawcodecError::OutOfBuffer(format!("BitPumpPanasonic: can not skip {} bytes", blocks)));
    }
    self.pos += blocks;
    for _ in blocks..bytes {
      self.get_bits(8)?;
    }
    Ok(())
  }
}

/// Bytes of input needed for the given geometry
pub fn panasonic_input_size(width: usize, height: usize, split: usize) -> Result<usize> {
  let normal = checked_size("Panasonic", &[check_dimensions("Panasonic", width, height)? / 7, 8])?;
  if split == 0 {
    Ok(normal)
  } else {
    checked_size("Panasonic", &[normal.div_ceil(PANA_BUF_SIZE), PANA_BUF_SIZE])
  }
}

/// Decode a Panasonic RW2 image. Zero valued samples are reported as bad
/// pixels when `zero_is_bad` is set.
pub fn decode_panasonic(buf: &[u8], width: usize, height: usize, split: usize, zero_is_bad: bool, max_failures: usize) -> Result<Decoded> {
  check_dimensions("Panasonic", width, height)?;
  if width % 14 != 0 {
    return Err(RawcodecError::DecoderFailed(format!("Panasonic: width {} is not a multiple of 14", width)));
  }
  if split > PANA_BUF_SIZE {
    return Err(RawcodecError::DecoderFailed(format!(
      "Panasonic: bad section split offset {}, larger than section size {}",
      split, PANA_BUF_SIZE
    )));
  }
  let size = panasonic_input_size(width, height, split)?;
  if buf.len() < size {
    return Err(RawcodecError::OutOfBuffer(format!(
      "Panasonic: need {} bytes of input but only {} are available",
      size,
      buf.len()
    )));
  }
  let input = &buf[..size];

  decode_threaded_multiline(width, height, ROWS_PER_TASK, max_failures, &|out: &mut [u16], start| {
    let mut pump = BitPumpPanasonic::new(input, split);
    // 9 + 1/7 bits per pixel
    pump.skip_bytes(8 * width * start / 7)?;

    let mut zeros: Vec<BadPixel> = Vec::new();
    for (i, line) in out.chunks_exact_mut(width).enumerate() {
      let row = start + i;
      decode_panasonic_row(&mut pump, line, |col| {
        if zero_is_bad {
          zeros.push((row, col));
        }
      })?;
    }
    Ok(zeros)
  })
}

fn decode_panasonic_row<F>(pump: &mut BitPumpPanasonic, line: &mut [u16], mut zero: F) -> Result<()>
where
  F: FnMut(usize),
{
  let mut sh: i32 = 0;
  for (block, pixels) in line.chunks_exact_mut(14).enumerate() {
    let mut pred = [0_i32; 2];
    let mut nonz = [0_i32; 2];
    let mut u = 0;

    for (x, pixel) in pixels.iter_mut().enumerate() {
      let c = x & 1;
      if u == 2 {
        sh = 4 >> (3 - pump.get_bits(2)? as i32);
        u = -1;
      }

      if nonz[c] != 0 {
        let j = pump.get_bits(8)? as i32;
        if j != 0 {
          pred[c] -= 0x80 << sh;
          if pred[c] < 0 || sh == 4 {
            pred[c] &= !(-1_i32 << sh);
          }
          pred[c] += j << sh;
        }
      } else {
        nonz[c] = pump.get_bits(8)? as i32;
        if nonz[c] != 0 || x > 11 {
          pred[c] = (nonz[c] << 4) | pump.get_bits(4)? as i32;
        }
      }

      *pixel = pred[c] as u16;
      if pred[c] == 0 {
        zero(block * 14 + x);
      }
      u += 1;
    }
  }
  Ok(())
}
