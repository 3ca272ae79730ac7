use log::debug;

use crate::CFA;
use crate::decoders::RawFormat;
use crate::pixarray::PixU16;

/// Bad pixel position as (row, col)
pub type BadPixel = (usize, usize);

/// Decoded sensor data plus the metadata needed to interpret it
#[derive(Debug, Clone)]
pub struct RawImage {
  /// Format the image was decoded from
  pub format: RawFormat,
  /// width of the full image
  pub width: usize,
  /// height of the full image
  pub height: usize,
  /// number of components per pixel (1 for bayer)
  pub cpp: usize,
  /// Bits per pixel
  pub bps: usize,
  /// color filter array
  pub cfa: CFA,
  /// whitebalance coefficients encoded in the file in RGBE order, NaN if unknown
  pub wb_coeffs: [f32; 4],
  /// image blacklevels in RGBE order
  pub blacklevels: [u16; 4],
  /// image whitelevels in RGBE order
  pub whitelevels: [u16; 4],
  /// image data itself, has `width`\*`height`\*`cpp` elements
  pub data: PixU16,
  /// Pixels flagged by the decompressor or the sensor calibration
  pub bad_pixels: Vec<BadPixel>,
  /// Recoverable errors hit during decoding
  pub errors: Vec<String>,
}

impl RawImage {
  pub fn new(format: RawFormat, data: PixU16, bps: usize, cfa: CFA) -> Self {
    let white = ((1_u32 << bps.min(16)) - 1) as u16;
    Self {
      format,
      width: data.width,
      height: data.height,
      cpp: 1,
      bps,
      cfa,
      wb_coeffs: [f32::NAN; 4],
      blacklevels: [0; 4],
      whitelevels: [white; 4],
      data,
      bad_pixels: Vec::new(),
      errors: Vec::new(),
    }
  }

  pub fn with_wb(mut self, wb_coeffs: [f32; 4]) -> Self {
    self.wb_coeffs = wb_coeffs;
    self
  }

  pub fn with_blacklevel(mut self, black: u16) -> Self {
    self.blacklevels = [black; 4];
    self
  }

  pub fn with_whitelevel(mut self, white: u16) -> Self {
    self.whitelevels = [white; 4];
    self
  }

  pub fn pixels(&self) -> &[u16] {
    self.data.pixels()
  }

  /// Replace every flagged pixel by an interpolation of its nearest good
  /// neighbours of the same CFA color. Returns the number of fixed pixels,
  /// pixels without any good neighbour keep their value.
  pub fn fix_bad_pixels(&mut self) -> usize {
    if self.bad_pixels.is_empty() {
      return 0;
    }
    let (width, height) = (self.width, self.height);
    let mut map = vec![false; width * height];
    for &(row, col) in &self.bad_pixels {
      if row < height && col < width {
        map[row * width + col] = true;
      }
    }
    let step = if self.cfa.is_valid() { 2 } else { 1 };

    let src = self.data.clone();
    let mut fixed = 0;
    for (idx, _) in map.iter().enumerate().filter(|(_, bad)| **bad) {
      let (row, col) = (idx / width, idx % width);
      if let Some(value) = interpolate(&src, &map, row, col, step) {
        *self.data.at_mut(row, col) = value;
        fixed += 1;
      }
    }
    debug!("Fixed {} of {} bad pixels", fixed, self.bad_pixels.len());
    self.bad_pixels.clear();
    fixed
  }
}

/// Nearest good pixel in direction (dr, dc), walking in `step` increments
fn nearest(src: &PixU16, map: &[bool], row: usize, col: usize, step: usize, dr: isize, dc: isize) -> Option<(u32, usize)> {
  let mut r = row as isize;
  let mut c = col as isize;
  let mut dist = 0;
  loop {
    r += dr * step as isize;
    c += dc * step as isize;
    dist += step;
    if r < 0 || c < 0 || r >= src.height as isize || c >= src.width as isize {
      return None;
    }
    let (r, c) = (r as usize, c as usize);
    if !map[r * src.width + c] {
      return Some((*src.at(r, c) as u32, dist));
    }
  }
}

/// Inverse distance weighted value of two opposite neighbours
fn weigh(a: Option<(u32, usize)>, b: Option<(u32, usize)>) -> Option<u32> {
  match (a, b) {
    (Some((va, da)), Some((vb, db))) => {
      let wa = (256 * db / (da + db)) as u32;
      let wb = 256 - wa;
      Some((va * wa + vb * wb + 128) >> 8)
    }
    (Some((v, _)), None) | (None, Some((v, _))) => Some(v),
    (None, None) => None,
  }
}

fn interpolate(src: &PixU16, map: &[bool], row: usize, col: usize, step: usize) -> Option<u16> {
  let horiz = weigh(nearest(src, map, row, col, step, 0, -1), nearest(src, map, row, col, step, 0, 1));
  let vert = weigh(nearest(src, map, row, col, step, -1, 0), nearest(src, map, row, col, step, 1, 0));
  match (horiz, vert) {
    (Some(h), Some(v)) => Some(((h + v + 1) / 2) as u16),
    (Some(x), None) | (None, Some(x)) => Some(x as u16),
    (None, None) => None,
  }
}
