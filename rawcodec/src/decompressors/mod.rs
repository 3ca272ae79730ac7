// SPDX-License-Identifier: LGPL-2.1
// Copyright 2025 Daniel Vogelbacher <daniel@chaospixel.com>

//! Vendor bitstream decompressors.
//!
//! Each decompressor works on a plain byte slice and knows nothing about
//! the container it came from. Parallel ones hand their work to
//! [`crate::strips`].

pub mod kodak;
pub mod panasonic;
pub mod phaseone;
pub mod sony;

use crate::RawcodecError;
use crate::Result;

/// Reject empty or otherwise unusable output dimensions. Returns the
/// number of pixels.
pub(crate) fn check_dimensions(codec: &str, width: usize, height: usize) -> Result<usize> {
  if width == 0 || height == 0 {
    return Err(RawcodecError::DecoderFailed(format!(
      "{}: unexpected image dimensions found: ({}; {})",
      codec, width, height
    )));
  }
  checked_size(codec, &[width, height])
}

/// Product of `factors`, failing instead of wrapping around.
pub(crate) fn checked_size(codec: &str, factors: &[usize]) -> Result<usize> {
  factors
    .iter()
    .try_fold(1_usize, |acc, f| acc.checked_mul(*f))
    .ok_or_else(|| RawcodecError::DecoderFailed(format!("{}: image size {:?} overflows", codec, factors)))
}

/// Fail if `src` holds less than `needed` bytes.
pub(crate) fn check_input(codec: &str, src: &[u8], needed: usize) -> Result<()> {
  if src.len() < needed {
    return Err(RawcodecError::OutOfBuffer(format!(
      "{}: need {} bytes of input but only {} are available",
      codec,
      needed,
      src.len()
    )));
  }
  Ok(())
}

#[cfg(test)]
pub(crate) mod testbits {
  /// Bit sink producing streams in the layouts the pumps consume
  #[derive(Default)]
  pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    nbits: usize,
    lsb: bool,
  }

  impl BitWriter {
    pub(crate) fn msb() -> Self {
      Self::default()
    }

    pub(crate) fn lsb() -> Self {
      Self { lsb: true, ..Self::default() }
    }

    /// Append the `num` low bits of `value`, most significant first for
    /// MSB streams, least significant first for LSB streams.
    pub(crate) fn put(&mut self, value: u32, num: u32) -> &mut Self {
      for i in 0..num {
        let bit = if self.lsb { (value >> i) & 1 } else { (value >> (num - 1 - i)) & 1 };
        if self.nbits % 8 == 0 {
          self.bytes.push(0);
        }
        if bit != 0 {
          let shift = if self.lsb { self.nbits % 8 } else { 7 - self.nbits % 8 };
          let last = self.bytes.len() - 1;
          self.bytes[last] |= 1 << shift;
        }
        self.nbits += 1;
      }
      self
    }

    pub(crate) fn pad_to(&mut self, len: usize) -> &mut Self {
      if self.bytes.len() < len {
        self.bytes.resize(len, 0);
        self.nbits = len * 8;
      }
      self
    }

    pub(crate) fn finish(&self) -> Vec<u8> {
      self.bytes.clone()
    }
  }

  /// MSB first bits stored in little-endian 32 bit words
  pub(crate) fn msb32(writer: &BitWriter) -> Vec<u8> {
    let mut bytes = writer.finish();
    bytes.resize(bytes.len().div_ceil(4) * 4, 0);
    bytes.chunks_exact(4).flat_map(|w| [w[3], w[2], w[1], w[0]]).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn size_overflow_is_an_error() {
    assert_eq!(check_dimensions("test", 6, 4).ok(), Some(24));
    assert!(matches!(check_dimensions("test", usize::MAX, 2), Err(RawcodecError::DecoderFailed(_))));
    assert!(matches!(checked_size("test", &[1 << 40, 1 << 30]), Err(RawcodecError::DecoderFailed(_))));
    assert_eq!(checked_size("test", &[14, 7, 2]).ok(), Some(196));
  }
}
