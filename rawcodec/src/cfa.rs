use std::fmt;

use num_enum::TryFromPrimitive;

use crate::RawcodecError;
use crate::Result;

pub const CFA_COLOR_R: usize = 0;
pub const CFA_COLOR_G: usize = 1;
pub const CFA_COLOR_B: usize = 2;

const MAX_PATTERN: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Default, TryFromPrimitive)]
#[repr(usize)]
#[allow(non_camel_case_types)]
pub enum CFAColor {
  RED = 0,
  GREEN = 1,
  BLUE = 2,
  EMERALD = 3,
  #[default]
  UNKNOWN = 255,
}

/// Representation of the color filter array pattern in raw cameras
///
/// # Example
/// ```
/// use rawcodec::CFA;
/// let cfa = CFA::new("RGGB").unwrap();
/// assert_eq!(cfa.color_at(0,0), 0);
/// assert_eq!(cfa.color_at(0,1), 1);
/// assert_eq!(cfa.color_at(1,0), 1);
/// assert_eq!(cfa.color_at(1,1), 2);
/// ```
#[derive(Clone, Eq, PartialEq)]
pub struct CFA {
  /// CFA pattern as a String
  pub name: String,
  /// Width of the repeating pattern
  pub width: usize,
  /// Height of the repeating pattern
  pub height: usize,

  pattern: [[usize; MAX_PATTERN]; MAX_PATTERN],
}

impl Default for CFA {
  fn default() -> Self {
    Self {
      name: String::new(),
      width: 0,
      height: 0,
      pattern: [[0; MAX_PATTERN]; MAX_PATTERN],
    }
  }
}

impl CFA {
  /// Create a new CFA from a string describing it. Each pixel is one of
  /// R/G/B/E, rows are concatenated, so RGGB means the first row is RG
  /// and the second row GB.
  pub fn new(patname: &str) -> Result<CFA> {
    let (width, height) = match patname.len() {
      0 => return Ok(Self::default()),
      4 => (2, 2),
      16 => (4, 4),
      _ => return Err(RawcodecError::unsupported(format!("Unknown CFA size \"{}\"", patname))),
    };
    let mut pattern = [[0; MAX_PATTERN]; MAX_PATTERN];

    for (i, c) in patname.bytes().enumerate() {
      pattern[i / width][i % width] = match c {
        b'R' => CFA_COLOR_R,
        b'G' => CFA_COLOR_G,
        b'B' => CFA_COLOR_B,
        b'E' => 3,
        _ => return Err(RawcodecError::unsupported(format!("Unknown CFA color in pattern \"{}\"", patname))),
      };
    }

    // extend the pattern into the full matrix
    for row in 0..MAX_PATTERN {
      for col in 0..MAX_PATTERN {
        pattern[row][col] = pattern[row % height][col % width];
      }
    }

    Ok(CFA {
      name: patname.to_string(),
      pattern,
      width,
      height,
    })
  }

  /// Panasonic encodes the 2x2 layout as a single code in its raw IFD.
  pub fn from_panasonic_code(code: u16) -> Result<CFA> {
    match code {
      1 => Self::new("RGGB"),
      2 => Self::new("GRBG"),
      3 => Self::new("GBRG"),
      4 => Self::new("BGGR"),
      _ => Err(RawcodecError::unsupported(format!("Unknown Panasonic CFA pattern code {}", code))),
    }
  }

  pub fn is_valid(&self) -> bool {
    self.width > 0 && self.height > 0
  }

  /// Get the color index at the given position. Designed to be fast so it can be called
  /// from inner loops without performance issues.
  #[inline(always)]
  pub fn color_at(&self, row: usize, col: usize) -> usize {
    self.pattern[row % MAX_PATTERN][col % MAX_PATTERN]
  }

  pub fn cfa_color_at(&self, row: usize, col: usize) -> CFAColor {
    CFAColor::try_from(self.color_at(row, col)).unwrap_or_default()
  }
}

impl fmt::Debug for CFA {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "CFA {{ {} }}", self.name)
  }
}
