use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ModeError, Result};

/// Sentinel used for missing data when none is supplied
pub const DEFAULT_BAD_DATA: f64 = -9999.0;

/// Which of the two verification fields an object belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldTag {
    Fcst,
    Obs,
}

impl FieldTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldTag::Fcst => "fcst",
            FieldTag::Obs => "obs",
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-major 2-D grid. `x` is the column (0..nx), `y` the row (0..ny).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    nx: usize,
    ny: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid filled with a single value
    pub fn new(nx: usize, ny: usize, fill: T) -> Self {
        Self {
            nx,
            ny,
            data: vec![fill; nx * ny],
        }
    }

    /// Wrap an existing row-major buffer
    pub fn from_vec(nx: usize, ny: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != nx * ny {
            return Err(ModeError::InvalidField(format!(
                "buffer holds {} values but a {}x{} grid needs {}",
                data.len(),
                nx,
                ny,
                nx * ny
            )));
        }
        Ok(Self { nx, ny, data })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.nx + x
    }

    /// Inverse of `index`
    #[inline]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.nx, idx / self.nx)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[y * self.nx + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    /// Signed lookup returning `None` outside the grid
    #[inline]
    pub fn get_signed(&self, x: isize, y: isize) -> Option<&T> {
        if x < 0 || y < 0 || x as usize >= self.nx || y as usize >= self.ny {
            None
        } else {
            Some(&self.data[y as usize * self.nx + x as usize])
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.nx == other.nx && self.ny == other.ny
    }
}

/// Binary on/off field produced by thresholding
pub type Mask = Grid<bool>;

/// 0 = background, k > 0 = member of simple object k
pub type LabeledField = Grid<usize>;

impl Grid<bool> {
    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&on| on).count()
    }
}

impl Grid<usize> {
    /// Sorted pixel indices for every label 1..=count
    pub fn pixels_by_label(&self, count: usize) -> Vec<Vec<usize>> {
        let mut pixels = vec![Vec::new(); count];
        for (idx, &label) in self.data.iter().enumerate() {
            if label > 0 && label <= count {
                pixels[label - 1].push(idx);
            }
        }
        pixels
    }
}

/// Scalar field with a bad-data sentinel
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    grid: Grid<f64>,
    bad_value: f64,
}

impl RawField {
    pub fn new(nx: usize, ny: usize, data: Vec<f64>, bad_value: f64) -> Result<Self> {
        Ok(Self {
            grid: Grid::from_vec(nx, ny, data)?,
            bad_value,
        })
    }

    pub fn filled(nx: usize, ny: usize, value: f64, bad_value: f64) -> Self {
        Self {
            grid: Grid::new(nx, ny, value),
            bad_value,
        }
    }

    pub fn nx(&self) -> usize {
        self.grid.nx()
    }

    pub fn ny(&self) -> usize {
        self.grid.ny()
    }

    pub fn bad_value(&self) -> f64 {
        self.bad_value
    }

    pub fn grid(&self) -> &Grid<f64> {
        &self.grid
    }

    pub fn data(&self) -> &[f64] {
        self.grid.data()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        *self.grid.get(x, y)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.grid.set(x, y, value);
    }

    pub fn set_bad(&mut self, x: usize, y: usize) {
        let bad = self.bad_value;
        self.grid.set(x, y, bad);
    }

    /// NaN and infinities are treated as bad data as well as the sentinel itself
    #[inline]
    pub fn is_bad(&self, value: f64) -> bool {
        !value.is_finite() || value == self.bad_value
    }

    /// Value at a flat index, `None` for bad data
    #[inline]
    pub fn valid_at(&self, idx: usize) -> Option<f64> {
        let v = self.grid.data()[idx];
        if self.is_bad(v) {
            None
        } else {
            Some(v)
        }
    }

    pub fn same_grid(&self, other: &RawField) -> bool {
        self.grid.same_shape(&other.grid)
    }
}
