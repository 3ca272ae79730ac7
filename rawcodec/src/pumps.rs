// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use crate::RawcodecError;
use crate::Result;
use crate::bits::*;

#[inline(always)]
fn out_of_buffer(pump: &str, pos: usize, len: usize) -> RawcodecError {
  RawcodecError::OutOfBuffer(format!("{}: refill at byte {} beyond end of stream ({} bytes)", pump, pos, len))
}

/// Bits are consumed LSB first out of little-endian 32 bit words.
#[derive(Debug, Copy, Clone)]
pub struct BitPumpLSB<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
}

impl<'a> BitPumpLSB<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpLSB<'a> {
    BitPumpLSB {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
    }
  }

  /// Drop all buffered bits and continue reading at the given byte offset.
  pub fn set_absolute_offset(&mut self, offset: usize) -> Result<()> {
    if offset > self.buffer.len() {
      return Err(out_of_buffer("BitPumpLSB", offset, self.buffer.len()));
    }
    self.pos = offset;
    self.bits = 0;
    self.nbits = 0;
    Ok(())
  }
}

/// Bits are consumed MSB first, the buffer is refilled byte by byte.
#[derive(Debug, Copy, Clone)]
pub struct BitPumpMSB<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
}

impl<'a> BitPumpMSB<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpMSB<'a> {
    BitPumpMSB {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
    }
  }
}

/// Bits are consumed MSB first out of little-endian 32 bit words.
#[derive(Debug, Copy, Clone)]
pub struct BitPumpMSB32<'a> {
  buffer: &'a [u8],
  pos: usize,
  bits: u64,
  nbits: u32,
}

impl<'a> BitPumpMSB32<'a> {
  pub fn new(src: &'a [u8]) -> BitPumpMSB32<'a> {
    BitPumpMSB32 {
      buffer: src,
      pos: 0,
      bits: 0,
      nbits: 0,
    }
  }
}

/// Little-endian word at `pos`, a trailing partial word is padded with zeros.
#[inline(always)]
fn fetch_le_word(buffer: &[u8], pos: usize) -> Option<u32> {
  if pos + 4 <= buffer.len() {
    Some(LEu32(buffer, pos))
  } else if pos < buffer.len() {
    let mut word = [0_u8; 4];
    word[..buffer.len() - pos].copy_from_slice(&buffer[pos..]);
    Some(u32::from_le_bytes(word))
  } else {
    None
  }
}

pub trait BitPump {
  /// Look at the next `num` bits (0 < num <= 32) without consuming them.
  fn peek_bits(&mut self, num: u32) -> Result<u32>;
  fn consume_bits(&mut self, num: u32);

  #[inline(always)]
  fn get_bits(&mut self, num: u32) -> Result<u32> {
    if num == 0 {
      return Ok(0);
    }

    let val = self.peek_bits(num)?;
    self.consume_bits(num);

    Ok(val)
  }

  #[inline(always)]
  fn get_bit(&mut self) -> Result<bool> {
    Ok(self.get_bits(1)? != 0)
  }

  #[inline(always)]
  fn get_ibits(&mut self, num: u32) -> Result<i32> {
    Ok(self.get_bits(num)? as i32)
  }
}

#[inline(always)]
fn mask(num: u32) -> u64 {
  (1_u64 << num) - 1
}

impl BitPump for BitPumpLSB<'_> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> Result<u32> {
    debug_assert!(num <= 32);
    if num > self.nbits {
      let inbits = fetch_le_word(self.buffer, self.pos).ok_or_else(|| out_of_buffer("BitPumpLSB", self.pos, self.buffer.len()))?;
      self.bits |= (inbits as u64) << self.nbits;
      self.pos += 4;
      self.nbits += 32;
    }
    Ok((self.bits & mask(num)) as u32)
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    self.nbits -= num;
    self.bits >>= num;
  }
}

impl BitPump for BitPumpMSB<'_> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> Result<u32> {
    debug_assert!(num <= 32);
    while num > self.nbits {
      let byte = *self.buffer.get(self.pos).ok_or_else(|| out_of_buffer("BitPumpMSB", self.pos, self.buffer.len()))?;
      self.bits = (self.bits << 8) | byte as u64;
      self.pos += 1;
      self.nbits += 8;
    }
    Ok(((self.bits >> (self.nbits - num)) & mask(num)) as u32)
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    self.nbits -= num;
    self.bits &= mask(self.nbits);
  }
}

impl BitPump for BitPumpMSB32<'_> {
  #[inline(always)]
  fn peek_bits(&mut self, num: u32) -> Result<u32> {
    debug_assert!(num <= 32);
    if num > self.nbits {
      let inbits = fetch_le_word(self.buffer, self.pos).ok_or_else(|| out_of_buffer("BitPumpMSB32", self.pos, self.buffer.len()))?;
      self.bits = (self.bits << 32) | inbits as u64;
      self.pos += 4;
      self.nbits += 32;
    }
    Ok(((self.bits >> (self.nbits - num)) & mask(num)) as u32)
  }

  #[inline(always)]
  fn consume_bits(&mut self, num: u32) {
    self.nbits -= num;
    self.bits &= mask(self.nbits);
  }
}

/// Bounds checked cursor over a byte slice.
#[derive(Debug, Copy, Clone)]
pub struct ByteStream<'a> {
  buffer: &'a [u8],
  pos: usize,
  endian: Endian,
}

impl<'a> ByteStream<'a> {
  pub fn new(src: &'a [u8], endian: Endian) -> ByteStream<'a> {
    ByteStream { buffer: src, pos: 0, endian }
  }

  #[inline(always)]
  fn check(&self, n: usize) -> Result<()> {
    if self.remaining_bytes() < n {
      Err(RawcodecError::OutOfBuffer(format!(
        "ByteStream: reading {} bytes at {} exceeds stream size {}",
        n,
        self.pos,
        self.buffer.len()
      )))
    } else {
      Ok(())
    }
  }

  #[inline(always)]
  pub fn remaining_bytes(&self) -> usize {
    self.buffer.len().saturating_sub(self.pos)
  }

  pub fn seek(&mut self, pos: usize) -> Result<()> {
    if pos > self.buffer.len() {
      return Err(RawcodecError::OutOfBuffer(format!("ByteStream: seek to {} beyond size {}", pos, self.buffer.len())));
    }
    self.pos = pos;
    Ok(())
  }

  #[inline(always)]
  pub fn peek_u8(&self) -> Result<u8> {
    self.check(1)?;
    Ok(self.buffer[self.pos])
  }

  #[inline(always)]
  pub fn get_u8(&mut self) -> Result<u8> {
    let val = self.peek_u8()?;
    self.pos += 1;
    Ok(val)
  }

  #[inline(always)]
  pub fn get_u16(&mut self) -> Result<u16> {
    self.check(2)?;
    let val = self.endian.read_u16(self.buffer, self.pos);
    self.pos += 2;
    Ok(val)
  }

  #[inline(always)]
  pub fn get_u32(&mut self) -> Result<u32> {
    self.check(4)?;
    let val = self.endian.read_u32(self.buffer, self.pos);
    self.pos += 4;
    Ok(val)
  }

  #[inline(always)]
  pub fn get_f32(&mut self) -> Result<f32> {
    self.check(4)?;
    let val = self.endian.read_f32(self.buffer, self.pos);
    self.pos += 4;
    Ok(val)
  }

  #[inline(always)]
  pub fn skip_bytes(&mut self, num: usize) -> Result<()> {
    self.check(num)?;
    self.pos += num;
    Ok(())
  }

  /// New stream over `len` bytes at absolute `offset`, same byte order.
  pub fn sub_stream(&self, offset: usize, len: usize) -> Result<ByteStream<'a>> {
    let buffer = offset.checked_add(len).and_then(|end| self.buffer.get(offset..end)).ok_or_else(|| {
      RawcodecError::OutOfBuffer(format!(
        "ByteStream: sub stream {}+{} exceeds stream size {}",
        offset,
        len,
        self.buffer.len()
      ))
    })?;
    Ok(ByteStream::new(buffer, self.endian))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn msb_pump_reads_bytewise() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    let buf = [0b1010_0000, 0xFF];
    let mut pump = BitPumpMSB::new(&buf);
    assert_eq!(pump.get_bits(1)?, 1);
    assert_eq!(pump.get_bits(2)?, 0b01);
    assert_eq!(pump.get_bits(5)?, 0);
    assert_eq!(pump.get_bits(8)?, 0xFF);
    assert!(matches!(pump.get_bits(1), Err(RawcodecError::OutOfBuffer(_))));
    Ok(())
  }

  #[test]
  fn msb32_pump_reads_le_words() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    // Word 0x80000001 stored little-endian
    let buf = [0x01, 0x00, 0x00, 0x80];
    let mut pump = BitPumpMSB32::new(&buf);
    assert_eq!(pump.get_bits(1)?, 1);
    assert_eq!(pump.get_bits(30)?, 0);
    assert_eq!(pump.get_bits(1)?, 1);
    assert!(pump.get_bits(1).is_err());
    Ok(())
  }

  #[test]
  fn msb32_pump_pads_partial_word() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0x00, 0x00, 0xAB];
    let mut pump = BitPumpMSB32::new(&buf);
    assert_eq!(pump.get_bits(16)?, 0x00AB);
    assert_eq!(pump.get_bits(16)?, 0);
    assert!(pump.get_bits(8).is_err());
    Ok(())
  }

  #[test]
  fn lsb_pump_reads_lsb_first() -> std::result::Result<(), Box<dyn std::error::Error>> {
    crate::init_test_logger();
    let buf = [0b0000_0101, 0x00, 0x00, 0x00, 0xFF, 0x01, 0x00, 0x00];
    let mut pump = BitPumpLSB::new(&buf);
    assert_eq!(pump.get_bits(1)?, 1);
    assert_eq!(pump.get_bits(2)?, 0b10);
    pump.set_absolute_offset(4)?;
    assert_eq!(pump.get_bits(9)?, 0x1FF);
    assert!(pump.set_absolute_offset(9).is_err());
    Ok(())
  }

  #[test]
  fn lsb_pump_spans_words() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00];
    let mut pump = BitPumpLSB::new(&buf);
    assert_eq!(pump.get_bits(28)?, 0x0FFF_FFFF);
    assert_eq!(pump.get_bits(5)?, 0b1_1111);
    assert_eq!(pump.get_bits(31)?, 0);
    assert!(pump.get_bits(1).is_err());
    Ok(())
  }

  #[test]
  fn bytestream_bounds() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [1, 0, 2, 0, 0, 0];
    let mut stream = ByteStream::new(&buf, Endian::Little);
    assert_eq!(stream.get_u16()?, 1);
    assert_eq!(stream.get_u32()?, 2);
    assert_eq!(stream.remaining_bytes(), 0);
    assert!(stream.get_u8().is_err());
    stream.seek(2)?;
    assert_eq!(stream.get_u16()?, 2);
    assert!(stream.seek(7).is_err());
    Ok(())
  }

  #[test]
  fn bytestream_sub_stream() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let buf = [0, 0, 0, 1, 0, 2];
    let stream = ByteStream::new(&buf, Endian::Big);
    let mut sub = stream.sub_stream(2, 4)?;
    assert_eq!(sub.get_u16()?, 1);
    assert_eq!(sub.get_u16()?, 2);
    assert!(sub.get_u8().is_err());
    assert!(stream.sub_stream(4, 3).is_err());
    assert!(stream.sub_stream(usize::MAX, 1).is_err());
    Ok(())
  }
}
