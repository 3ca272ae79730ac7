use rayon::prelude::*;

/// Row-major 2D sample grid
#[derive(Clone, Debug, PartialEq)]
pub struct Pix2D<T> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<T>,
}

pub type PixU16 = Pix2D<u16>;

impl<T> Pix2D<T>
where
  T: Copy + Default + Send + Sync,
{
  pub fn new_with(data: Vec<T>, width: usize, height: usize) -> Self {
    assert_eq!(data.len(), height * width);
    Self { data, width, height }
  }

  pub fn new(width: usize, height: usize) -> Self {
    let data = vec![T::default(); width * height];
    Self { data, width, height }
  }

  pub fn pixels(&self) -> &[T] {
    &self.data
  }

  pub fn pixels_mut(&mut self) -> &mut [T] {
    &mut self.data
  }

  pub fn row(&self, row: usize) -> &[T] {
    &self.data[row * self.width..(row + 1) * self.width]
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &T {
    &self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn at_mut(&mut self, row: usize, col: usize) -> &mut T {
    &mut self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn for_each<F>(&mut self, op: F)
  where
    F: Fn(T) -> T + Send + Sync,
  {
    self.data.par_iter_mut().for_each(|v| *v = op(*v));
  }

  /// Apply `op(value, row, col)` to every sample inside the given row and
  /// column window.
  pub fn for_each_in<F>(&mut self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>, op: F)
  where
    F: Fn(T, usize, usize) -> T + Send + Sync,
  {
    let width = self.width;
    let start = rows.start.min(self.height);
    let end = rows.end.min(self.height);
    let cols = cols.start.min(width)..cols.end.min(width);
    self.data[start * width..end * width]
      .par_chunks_exact_mut(width)
      .enumerate()
      .for_each(|(i, rowbuf)| {
        for col in cols.clone() {
          rowbuf[col] = op(rowbuf[col], start + i, col);
        }
      });
  }
}

impl<T> Default for Pix2D<T>
where
  T: Default,
{
  fn default() -> Self {
    Self {
      width: 0,
      height: 0,
      data: Default::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn window_update() {
    let mut img = PixU16::new(4, 3);
    img.for_each_in(1..3, 2..4, |_, row, col| (row * 10 + col) as u16);
    assert_eq!(img.row(0), &[0, 0, 0, 0]);
    assert_eq!(img.row(1), &[0, 0, 12, 13]);
    assert_eq!(img.row(2), &[0, 0, 22, 23]);
    img.for_each(|v| v + 1);
    assert_eq!(*img.at(2, 3), 24);
  }
}
