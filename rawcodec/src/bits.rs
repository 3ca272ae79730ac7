// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Sign extend a `len` bit wide value with the "top bit clear means negative"
/// convention shared by the Sony and Kodak codes.
#[inline(always)]
pub fn extend_diff(diff: i32, len: u32) -> i32 {
  if len > 0 && (diff & (1 << (len - 1))) == 0 {
    diff - ((1 << len) - 1)
  } else {
    diff
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endian {
  Big,
  #[default]
  Little,
}

impl Endian {
  /// Caller must ensure `buf[offset..offset + 2]` is valid.
  #[inline]
  pub fn read_u16(&self, buf: &[u8], offset: usize) -> u16 {
    match *self {
      Self::Big => BigEndian::read_u16(&buf[offset..]),
      Self::Little => LittleEndian::read_u16(&buf[offset..]),
    }
  }

  /// Caller must ensure `buf[offset..offset + 4]` is valid.
  #[inline]
  pub fn read_u32(&self, buf: &[u8], offset: usize) -> u32 {
    match *self {
      Self::Big => BigEndian::read_u32(&buf[offset..]),
      Self::Little => LittleEndian::read_u32(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_f32(&self, buf: &[u8], offset: usize) -> f32 {
    match *self {
      Self::Big => BigEndian::read_f32(&buf[offset..]),
      Self::Little => LittleEndian::read_f32(&buf[offset..]),
    }
  }
}

#[allow(non_snake_case)]
#[inline]
pub fn LEu32(buf: &[u8], pos: usize) -> u32 {
  LittleEndian::read_u32(&buf[pos..pos + 4])
}

#[allow(non_snake_case)]
#[inline]
pub fn LEu16(buf: &[u8], pos: usize) -> u16 {
  LittleEndian::read_u16(&buf[pos..pos + 2])
}
