// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Owned TIFF directory as handed over by the container parser.
//!
//! Parsing the TIFF structure itself happens outside of this crate, the
//! decoders only do typed lookups on already materialized entries.

use std::collections::BTreeMap;

use crate::RawcodecError;
use crate::Result;

/// Value of a TIFF entry
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  /// 8-bit unsigned integer
  Byte(Vec<u8>),
  /// 7-bit ASCII string
  Ascii(String),
  /// 16-bit unsigned integer
  Short(Vec<u16>),
  /// 32-bit unsigned integer
  Long(Vec<u32>),
  /// 32-bit IEEE floating point
  Float(Vec<f32>),
  /// 8-bit byte that may contain anything, depending on the field
  Undefined(Vec<u8>),
}

impl Value {
  pub fn count(&self) -> usize {
    match self {
      Self::Byte(v) => v.len(),
      Self::Ascii(v) => v.len() + 1,
      Self::Short(v) => v.len(),
      Self::Long(v) => v.len(),
      Self::Float(v) => v.len(),
      Self::Undefined(v) => v.len(),
    }
  }

  pub fn get_u32(&self, idx: usize) -> Option<u32> {
    match self {
      Self::Byte(v) => v.get(idx).map(|v| *v as u32),
      Self::Short(v) => v.get(idx).map(|v| *v as u32),
      Self::Long(v) => v.get(idx).copied(),
      Self::Undefined(v) => v.get(idx).map(|v| *v as u32),
      _ => None,
    }
  }

  pub fn get_u16(&self, idx: usize) -> Option<u16> {
    self.get_u32(idx).map(|v| v as u16)
  }

  pub fn get_usize(&self, idx: usize) -> Option<usize> {
    self.get_u32(idx).map(|v| v as usize)
  }

  pub fn get_f32(&self, idx: usize) -> Option<f32> {
    match self {
      Self::Float(v) => v.get(idx).copied(),
      _ => self.get_u32(idx).map(|v| v as f32),
    }
  }
}

/// Types usable as tag identifiers
pub trait Tag: Into<u16> + Copy + std::fmt::Debug {}

impl Tag for u16 {}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ifd {
  entries: BTreeMap<u16, Value>,
  sub: BTreeMap<u16, Ifd>,
}

impl Ifd {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_entry<T: Tag>(&mut self, tag: T, value: Value) -> &mut Self {
    self.entries.insert(tag.into(), value);
    self
  }

  /// Attach a sub-directory that hangs off the pointer tag `tag`.
  pub fn add_sub_ifd<T: Tag>(&mut self, tag: T, ifd: Ifd) -> &mut Self {
    self.sub.insert(tag.into(), ifd);
    self
  }

  pub fn get_entry<T: Tag>(&self, tag: T) -> Option<&Value> {
    self.entries.get(&tag.into())
  }

  pub fn has_entry<T: Tag>(&self, tag: T) -> bool {
    self.entries.contains_key(&tag.into())
  }

  pub fn get_sub_ifd<T: Tag>(&self, tag: T) -> Option<&Ifd> {
    self.sub.get(&tag.into())
  }

  /// Fetch a tag or fail with a descriptive error.
  pub fn fetch<T: Tag>(&self, tag: T) -> Result<&Value> {
    self
      .get_entry(tag)
      .ok_or_else(|| RawcodecError::DecoderFailed(format!("Couldn't find tag {:?}", tag)))
  }

  pub fn fetch_u32<T: Tag>(&self, tag: T, idx: usize) -> Result<u32> {
    self
      .fetch(tag)?
      .get_u32(idx)
      .ok_or_else(|| RawcodecError::DecoderFailed(format!("Tag {:?} has no integer value at index {}", tag, idx)))
  }

  pub fn fetch_usize<T: Tag>(&self, tag: T, idx: usize) -> Result<usize> {
    self.fetch_u32(tag, idx).map(|v| v as usize)
  }
}
