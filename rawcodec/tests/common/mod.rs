// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Builders for small synthetic raw files.

#![allow(dead_code)]

pub(crate) fn init_test_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// MSB first bit sink
#[derive(Default)]
pub(crate) struct BitWriter {
  bytes: Vec<u8>,
  nbits: usize,
}

impl BitWriter {
  pub(crate) fn put(&mut self, value: u32, num: u32) -> &mut Self {
    for i in (0..num).rev() {
      if self.nbits % 8 == 0 {
        self.bytes.push(0);
      }
      if (value >> i) & 1 != 0 {
        let last = self.bytes.len() - 1;
        self.bytes[last] |= 1 << (7 - self.nbits % 8);
      }
      self.nbits += 1;
    }
    self
  }

  /// Bytes as consumed by a pump reading little-endian 32 bit words
  pub(crate) fn finish_msb32(&self) -> Vec<u8> {
    let mut bytes = self.bytes.clone();
    bytes.resize(bytes.len().div_ceil(4) * 4, 0);
    bytes.chunks_exact(4).flat_map(|w| [w[3], w[2], w[1], w[0]]).collect()
  }
}

/// Encode a Phase One row with literal samples only
pub(crate) fn phaseone_literal_row(values: &[u16]) -> Vec<u8> {
  let mut bits = BitWriter::default();
  let groups = values.len() & !7;
  for (col, v) in values.iter().enumerate() {
    if col < groups && col % 8 == 0 {
      // five zero bits select the literal length for each of the two streams
      bits.put(0, 6).put(0, 6);
    }
    bits.put(*v as u32, 16);
  }
  bits.finish_msb32()
}

/// A Phase One row that fails right at the first length code
pub(crate) fn phaseone_corrupt_row() -> Vec<u8> {
  let mut bits = BitWriter::default();
  bits.put(1, 1).put(0, 31);
  bits.finish_msb32()
}

/// Writer for the private IIQ tag table, offsets are relative to the IIQ
/// block which starts behind the 8 byte TIFF header.
pub(crate) struct IiqWriter {
  block: Vec<u8>,
  entries: Vec<[u32; 4]>,
}

impl IiqWriter {
  pub(crate) fn new() -> Self {
    let mut block = vec![0_u8; 16];
    block[0..4].copy_from_slice(&0x4949_4949_u32.to_le_bytes());
    Self { block, entries: Vec::new() }
  }

  /// Append data to the block and return its offset
  pub(crate) fn blob(&mut self, data: &[u8]) -> u32 {
    let offset = self.block.len() as u32;
    self.block.extend_from_slice(data);
    offset
  }

  pub(crate) fn entry(&mut self, tag: u32, data: u32) -> &mut Self {
    self.entries.push([tag, 4, 4, data]);
    self
  }

  pub(crate) fn finish(mut self) -> Vec<u8> {
    let table = self.block.len() as u32;
    self.block[8..12].copy_from_slice(&table.to_le_bytes());
    self.block.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
    self.block.extend_from_slice(&[0; 4]);
    for entry in &self.entries {
      for v in entry {
        self.block.extend_from_slice(&v.to_le_bytes());
      }
    }
    let mut file = b"II*\0\x08\0\0\0".to_vec();
    file.extend(self.block);
    file
  }
}

/// Compressed IIQ file, one strip per row
pub(crate) fn iiq_compressed(width: usize, rows: &[Vec<u8>], calibration: Option<&[u8]>) -> Vec<u8> {
  let mut iiq = IiqWriter::new();
  let mut payload = Vec::new();
  let mut offsets = Vec::new();
  for row in rows {
    offsets.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    payload.extend_from_slice(row);
  }
  let data = iiq.blob(&payload);
  let strips = iiq.blob(&offsets);
  iiq
    .entry(0x10e, 3)
    .entry(0x108, width as u32)
    .entry(0x109, rows.len() as u32)
    .entry(0x10f, data)
    .entry(0x21c, strips)
    .entry(0x21d, 4 * 256);
  if let Some(calibration) = calibration {
    let offset = iiq.blob(calibration);
    iiq.entry(0x110, offset);
  }
  iiq.finish()
}

/// Sensor calibration block with a defect list
pub(crate) fn iiq_defects(defects: &[(u16, u16, u16)]) -> Vec<u8> {
  let list: Vec<u8> = defects.iter().flat_map(|(col, row, typ)| [*col, *row, *typ, 0]).flat_map(|v| v.to_le_bytes()).collect();
  let mut block = vec![0_u8; 16];
  block[8..12].copy_from_slice(&16_u32.to_le_bytes());
  block.extend_from_slice(&1_u32.to_le_bytes());
  block.extend_from_slice(&[0; 4]);
  for v in [0x400_u32, list.len() as u32, 36] {
    block.extend_from_slice(&v.to_le_bytes());
  }
  block.extend(list);
  block
}
