// SPDX-License-Identifier: LGPL-2.1
// Copyright 2022 Daniel Vogelbacher <daniel@chaospixel.com>

//! Sensor calibration stored next to the raw data of IIQ files.
//!
//! The calibration block has its own small tag table. Only the entries
//! needed to repair defects and to equalize the four sensor quadrants are
//! interpreted, everything else is skipped.

use log::debug;

use crate::CFA;
use crate::RawcodecError;
use crate::Result;
use crate::cfa::CFAColor;
use crate::imgop::Point;
use crate::imgop::spline::Spline;
use crate::pixarray::PixU16;
use crate::pumps::ByteStream;
use crate::rawimage::BadPixel;

const TAG_DEFECTS: u32 = 0x0400;
const TAG_QUADRANT_COMBINED: u32 = 0x0431;

/// Single bad photosite
pub const DEFECT_PIXEL: u16 = 129;
/// Complete bad columns
pub const DEFECT_COLUMNS: [u16; 2] = [131, 137];

/// Quadrant curves have 7 inner control points
const QUADRANT_POINTS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defect {
  pub col: usize,
  pub row: usize,
  pub typ: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorCalibration {
  pub defects: Vec<Defect>,
  /// X coordinates and per quadrant Y multipliers (1/10000), quadrants
  /// ordered top-left, top-right, bottom-left, bottom-right
  pub quadrant_combined: Option<([usize; QUADRANT_POINTS], [usize; 4 * QUADRANT_POINTS])>,
}

impl SensorCalibration {
  /// Parse the calibration block, `stream` starts at the block header.
  pub fn parse(stream: &ByteStream) -> Result<Self> {
    let mut header = *stream;
    header.seek(8)?;
    let table = header.get_u32()? as usize;
    header.seek(table)?;
    let count = header.get_u32()? as usize;
    header.skip_bytes(4)?;
    if count.saturating_mul(12) > header.remaining_bytes() {
      return Err(RawcodecError::corrupt(format!("IIQ: sensor calibration table with {} entries exceeds buffer", count)));
    }

    let mut calib = Self::default();
    for _ in 0..count {
      let tag = header.get_u32()?;
      let len = header.get_u32()? as usize;
      let offset = header.get_u32()? as usize;
      match tag {
        TAG_DEFECTS => {
          let mut data = stream.sub_stream(offset, len)?;
          for _ in 0..len / 8 {
            let col = data.get_u16()? as usize;
            let row = data.get_u16()? as usize;
            let typ = data.get_u16()?;
            let _reserved = data.get_u16()?;
            calib.defects.push(Defect { col, row, typ });
          }
        }
        TAG_QUADRANT_COMBINED => {
          let mut data = stream.sub_stream(offset, 5 * QUADRANT_POINTS * 4)?;
          let mut xs = [0; QUADRANT_POINTS];
          for x in xs.iter_mut() {
            *x = data.get_u32()? as usize;
          }
          let mut ys = [0; 4 * QUADRANT_POINTS];
          for y in ys.iter_mut() {
            *y = data.get_u32()? as usize;
          }
          calib.quadrant_combined = Some((xs, ys));
        }
        _ => debug!("IIQ: skipping sensor calibration tag 0x{:x}", tag),
      }
    }
    Ok(calib)
  }

  /// Apply the calibration to the decoded image. Single bad pixels are not
  /// touched but returned so they can be interpolated later.
  pub fn apply(&self, img: &mut PixU16, cfa: &CFA, split: Option<(usize, usize)>) -> Result<Vec<BadPixel>> {
    if let Some((xs, ys)) = &self.quadrant_combined {
      match split {
        Some((split_col, split_row)) => apply_quadrant_combined(img, xs, ys, split_col, split_row)?,
        None => debug!("IIQ: quadrant correction without split position, skipped"),
      }
    }

    let mut bad_pixels = Vec::new();
    for defect in &self.defects {
      if defect.col >= img.width {
        continue;
      }
      match defect.typ {
        t if DEFECT_COLUMNS.contains(&t) => {
          debug!("IIQ: correct bad column {}", defect.col);
          fix_bad_column(img, cfa, defect.col);
        }
        DEFECT_PIXEL if defect.row < img.height => bad_pixels.push((defect.row, defect.col)),
        _ => {}
      }
    }
    Ok(bad_pixels)
  }
}

/// Build the curve for a quadrant, control points are scaled by the
/// quadrant multipliers.
fn quadrant_curve(xs: &[usize; QUADRANT_POINTS], multipliers: &[usize]) -> Result<Vec<u16>> {
  let mut points = Vec::with_capacity(QUADRANT_POINTS + 2);
  points.push(Point::new(0, 0));
  for (x, mul) in xs.iter().zip(multipliers) {
    points.push(Point::new(*x, x * mul / 10_000));
  }
  points.push(Point::new(65535, 65535));
  Ok(Spline::new(&points)?.calculate_curve())
}

fn apply_quadrant_combined(img: &mut PixU16, xs: &[usize; QUADRANT_POINTS], ys: &[usize], split_col: usize, split_row: usize) -> Result<()> {
  let split_col = split_col.min(img.width);
  let split_row = split_row.min(img.height);
  debug!("IIQ: quadrant correction, split col {}, row {}", split_col, split_row);
  let (width, height) = (img.width, img.height);

  for qr in 0..2 {
    for qc in 0..2 {
      let q = qr * 2 + qc;
      let curve = quadrant_curve(xs, &ys[q * QUADRANT_POINTS..(q + 1) * QUADRANT_POINTS])?;
      let rows = if qr > 0 { split_row..height } else { 0..split_row };
      let cols = if qc > 0 { split_col..width } else { 0..split_col };
      img.for_each_in(rows, cols, |pix, _, _| curve[pix as usize]);
    }
  }
  Ok(())
}

/// Interpolate a bad column from same colored neighbours. The two border
/// rows and columns on each side are left alone.
pub fn fix_bad_column(img: &mut PixU16, cfa: &CFA, col: usize) {
  if col < 2 || col + 2 >= img.width || img.height < 5 {
    debug!("IIQ: bad column {} too close to the border", col);
    return;
  }
  for row in 2..img.height - 2 {
    match cfa.cfa_color_at(row, col) {
      CFAColor::GREEN => {
        // four diagonal greens, the one most distant from the mean is dropped
        let val = [
          *img.at(row - 1, col - 1) as i32,
          *img.at(row + 1, col - 1) as i32,
          *img.at(row - 1, col + 1) as i32,
          *img.at(row + 1, col + 1) as i32,
        ];
        let sum: i32 = val.iter().sum();
        let mut max = 0;
        for i in 1..4 {
          if (val[i] * 4 - sum).abs() > (val[max] * 4 - sum).abs() {
            max = i;
          }
        }
        *img.at_mut(row, col) = ((sum - val[max] + 1) / 3) as u16;
      }
      CFAColor::RED | CFAColor::BLUE => {
        let diags = *img.at(row + 2, col - 2) as u32 + *img.at(row - 2, col - 2) as u32 + *img.at(row + 2, col + 2) as u32 + *img.at(row - 2, col + 2) as u32;
        let horiz = *img.at(row, col - 2) as u32 + *img.at(row, col + 2) as u32;
        // biased towards the horizontal neighbours
        *img.at_mut(row, col) = (diags as f32 * 0.0732233 + horiz as f32 * 0.3535534).round() as u16;
      }
      _ => {}
    }
  }
}
