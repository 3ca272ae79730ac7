// SPDX-License-Identifier: LGPL-2.1
// Copyright 2022 Daniel Vogelbacher <daniel@chaospixel.com>

//! Strip partitioning and parallel decoding.
//!
//! Compressed payloads are split into strips that each decode into their own
//! rows of the output grid. Predictor state never crosses a strip boundary,
//! so strips are decoded in parallel with rayon. A failing strip does not
//! abort the other ones: every task hands back its own [`StripOutcome`] and
//! the outcomes are merged single-threaded into an [`ErrorAccumulator`]
//! once the parallel section is done.

use log::{debug, warn};
use rayon::prelude::*;

use crate::RawcodecError;
use crate::Result;
use crate::pixarray::PixU16;
use crate::rawimage::BadPixel;

/// Failure threshold used when the caller does not configure one
pub const DEFAULT_MAX_STRIP_FAILURES: usize = 8;

/// Location of a strip inside the compressed payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripRange {
  /// Row (or block) index this strip decodes into
  pub n: usize,
  pub offset: usize,
  pub len: usize,
}

impl StripRange {
  pub fn new(n: usize, offset: usize, len: usize) -> Self {
    Self { n, offset, len }
  }
}

/// A validated strip with its byte sub-stream
#[derive(Debug, Clone, Copy)]
pub struct Strip<'a> {
  pub n: usize,
  pub data: &'a [u8],
}

/// Set of strips covering every output row exactly once, ordered by row
#[derive(Debug, Clone)]
pub struct StripSet<'a> {
  strips: Vec<Strip<'a>>,
}

impl<'a> StripSet<'a> {
  /// Validate strip ranges against the payload.
  ///
  /// Exactly `height` strips are required, their indices must form
  /// `0..height` without gaps or duplicates and their byte ranges must be
  /// strictly increasing, non-overlapping and inside `payload`.
  pub fn new(payload: &'a [u8], ranges: &[StripRange], height: usize) -> Result<Self> {
    if ranges.len() != height {
      return Err(RawcodecError::DecoderFailed(format!(
        "Height ({}) vs strip count ({}) mismatch",
        height,
        ranges.len()
      )));
    }

    let mut by_offset: Vec<StripRange> = ranges.to_vec();
    by_offset.sort_by_key(|r| r.offset);
    for pair in by_offset.windows(2) {
      if pair[0].offset == pair[1].offset {
        return Err(RawcodecError::DecoderFailed(format!("Two strips share byte offset {}", pair[0].offset)));
      }
      if pair[0].offset + pair[0].len > pair[1].offset {
        return Err(RawcodecError::DecoderFailed(format!(
          "Strip {} at {}+{} overlaps strip {} at {}",
          pair[0].n, pair[0].offset, pair[0].len, pair[1].n, pair[1].offset
        )));
      }
    }
    if let Some(last) = by_offset.last() {
      if last.offset + last.len > payload.len() {
        return Err(RawcodecError::OutOfBuffer(format!(
          "Strip {} at {}+{} exceeds payload of {} bytes",
          last.n,
          last.offset,
          last.len,
          payload.len()
        )));
      }
    }

    let mut by_row = by_offset;
    by_row.sort_by_key(|r| r.n);
    for (i, r) in by_row.iter().enumerate() {
      if r.n != i {
        return Err(RawcodecError::DecoderFailed(format!("Strip index {} found where {} was expected", r.n, i)));
      }
    }

    let strips = by_row
      .iter()
      .map(|r| Strip {
        n: r.n,
        data: &payload[r.offset..r.offset + r.len],
      })
      .collect();

    Ok(Self { strips })
  }

  /// Build strips from a row -> start offset table where each strip ends at
  /// the start of the next strip in byte order, the last one at the end of
  /// `payload`.
  pub fn from_offsets(payload: &'a [u8], offsets: &[(usize, usize)], height: usize) -> Result<Self> {
    let mut sorted = offsets.to_vec();
    sorted.sort_by_key(|(_, offset)| *offset);

    let mut ranges = Vec::with_capacity(sorted.len());
    for (i, (n, offset)) in sorted.iter().enumerate() {
      let end = match sorted.get(i + 1) {
        Some((_, next)) if next > offset => *next,
        Some((_, next)) => {
          return Err(RawcodecError::DecoderFailed(format!(
            "Strip offsets are not strictly increasing: {} followed by {}",
            offset, next
          )));
        }
        None => payload.len(),
      };
      if *offset > end {
        return Err(RawcodecError::OutOfBuffer(format!(
          "Strip {} starts at {} beyond payload of {} bytes",
          n,
          offset,
          payload.len()
        )));
      }
      ranges.push(StripRange::new(*n, *offset, end - offset));
    }
    Self::new(payload, &ranges, height)
  }

  pub fn len(&self) -> usize {
    self.strips.len()
  }

  pub fn is_empty(&self) -> bool {
    self.strips.is_empty()
  }

  pub fn strips(&self) -> &[Strip<'a>] {
    &self.strips
  }
}

/// Result of decoding a single strip
#[derive(Debug)]
pub struct StripOutcome {
  /// First row written by the task
  pub row: usize,
  pub bad_pixels: Vec<BadPixel>,
  pub error: Option<RawcodecError>,
}

/// Merged errors and bad pixels of one decode session
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
  pub bad_pixels: Vec<BadPixel>,
  pub first_error: Option<RawcodecError>,
  pub failed_rows: Vec<usize>,
  pub failures: usize,
}

impl ErrorAccumulator {
  pub fn merge(&mut self, outcome: StripOutcome) {
    self.bad_pixels.extend(outcome.bad_pixels);
    if let Some(err) = outcome.error {
      warn!("Failed to decode strip at row {}: {}", outcome.row, err);
      self.failures += 1;
      self.failed_rows.push(outcome.row);
      if self.first_error.is_none() {
        self.first_error = Some(err);
      }
    }
  }

  /// Error messages in a form suitable for the image report
  pub fn messages(&self) -> Vec<String> {
    match &self.first_error {
      Some(err) if self.failures > 1 => vec![format!("{} (and {} more strip failures)", err, self.failures - 1)],
      Some(err) => vec![err.to_string()],
      None => Vec::new(),
    }
  }

  /// Fail if more than `max_failures` strips or every strip failed.
  pub fn check(&self, total: usize, max_failures: usize) -> Result<()> {
    if self.failures > max_failures || (total > 0 && self.failures == total) {
      return Err(RawcodecError::TooManyErrors {
        failed: self.failures,
        total,
        first: self.first_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
      });
    }
    Ok(())
  }
}

/// Output of a parallel decode
#[derive(Debug)]
pub struct Decoded {
  pub image: PixU16,
  pub errors: ErrorAccumulator,
}

fn finish(image: PixU16, outcomes: Vec<StripOutcome>, max_failures: usize) -> Result<Decoded> {
  let total = outcomes.len();
  let mut errors = ErrorAccumulator::default();
  for outcome in outcomes {
    errors.merge(outcome);
  }
  errors.check(total, max_failures)?;
  if errors.failures > 0 {
    debug!("{} of {} strips failed, keeping partial image", errors.failures, total);
  }
  Ok(Decoded { image, errors })
}

fn outcome(row: usize, res: Result<Vec<BadPixel>>) -> StripOutcome {
  match res {
    Ok(bad_pixels) => StripOutcome {
      row,
      bad_pixels,
      error: None,
    },
    Err(err) => StripOutcome {
      row,
      bad_pixels: Vec::new(),
      error: Some(err),
    },
  }
}

fn check_dimensions(width: usize, height: usize) -> Result<()> {
  if width == 0 || height == 0 {
    return Err(RawcodecError::DecoderFailed(format!("Unexpected image dimensions: ({}; {})", width, height)));
  }
  if width.checked_mul(height).is_none() {
    return Err(RawcodecError::DecoderFailed(format!("Image size overflows: ({}; {})", width, height)));
  }
  Ok(())
}

/// Decode one strip per output row in parallel.
pub fn decode_strips<F>(width: usize, height: usize, strips: &StripSet, max_failures: usize, closure: &F) -> Result<Decoded>
where
  F: Fn(&mut [u16], &Strip) -> Result<Vec<BadPixel>> + Sync,
{
  check_dimensions(width, height)?;
  if strips.len() != height {
    return Err(RawcodecError::DecoderFailed(format!(
      "Height ({}) vs strip count ({}) mismatch",
      height,
      strips.len()
    )));
  }
  let mut image = PixU16::new(width, height);
  let outcomes: Vec<StripOutcome> = image
    .pixels_mut()
    .par_chunks_mut(width)
    .zip(strips.strips().par_iter())
    .map(|(line, strip)| outcome(strip.n, closure(line, strip)))
    .collect();
  finish(image, outcomes, max_failures)
}

/// Decode every row in parallel, the closure gets the row index.
pub fn decode_threaded<F>(width: usize, height: usize, max_failures: usize, closure: &F) -> Result<Decoded>
where
  F: Fn(&mut [u16], usize) -> Result<Vec<BadPixel>> + Sync,
{
  decode_threaded_multiline(width, height, 1, max_failures, closure)
}

/// Decode blocks of `lines` rows in parallel, the closure gets the first
/// row index of its block.
pub fn decode_threaded_multiline<F>(width: usize, height: usize, lines: usize, max_failures: usize, closure: &F) -> Result<Decoded>
where
  F: Fn(&mut [u16], usize) -> Result<Vec<BadPixel>> + Sync,
{
  check_dimensions(width, height)?;
  let lines = lines.clamp(1, height);
  let mut image = PixU16::new(width, height);
  let outcomes: Vec<StripOutcome> = image
    .pixels_mut()
    .par_chunks_mut(width * lines)
    .enumerate()
    .map(|(block, rows)| {
      let row = block * lines;
      outcome(row, closure(rows, row))
    })
    .collect();
  finish(image, outcomes, max_failures)
}
