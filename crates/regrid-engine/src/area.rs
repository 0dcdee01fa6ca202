//! Per-cell surface areas used as regridding weights.

use crate::error::{RegridError, Result};
use crate::types::Grid;

/// Storage for an [`AreaRaster`].
#[derive(Debug, Clone, PartialEq)]
pub enum AreaValues {
    /// One value per row, shared by every column of that row.
    PerRow(Vec<f64>),
    /// One value per cell, row-major.
    PerCell(Vec<f64>),
}

/// Surface areas (hectares) or caller-supplied weights for every cell of a grid.
///
/// Geometric areas depend only on latitude, so [`crate::grid_cell_areas`]
/// stores a single value per row and `get` broadcasts it across the columns
/// instead of materializing a `rows x cols` array. Auxiliary weight rasters,
/// e.g. area multiplied by a per-dataset confidence layer, are stored per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRaster {
    rows: usize,
    cols: usize,
    values: AreaValues,
}

impl AreaRaster {
    /// Build a per-row raster.
    pub fn per_row(values: Vec<f64>, cols: usize) -> Result<Self> {
        check_weights(&values)?;
        if values.is_empty() || cols == 0 {
            return Err(RegridError::invalid_grid("area raster must not be empty"));
        }
        Ok(Self {
            rows: values.len(),
            cols,
            values: AreaValues::PerRow(values),
        })
    }

    /// Build a per-cell raster matching `grid`.
    pub fn from_cells(grid: &Grid, values: Vec<f64>) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(RegridError::ShapeMismatch {
                expected: grid.len(),
                actual: values.len(),
            });
        }
        check_weights(&values)?;
        Ok(Self {
            rows: grid.rows,
            cols: grid.cols,
            values: AreaValues::PerCell(values),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &AreaValues {
        &self.values
    }

    /// Whether the raster has the same shape as `grid`.
    pub fn matches(&self, grid: &Grid) -> bool {
        self.rows == grid.rows && self.cols == grid.cols
    }

    /// Area of one cell.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match &self.values {
            AreaValues::PerRow(v) => v[row],
            AreaValues::PerCell(v) => v[row * self.cols + col],
        }
    }

    /// The per-row vector, if the raster is stored that way.
    pub fn row_values(&self) -> Option<&[f64]> {
        match &self.values {
            AreaValues::PerRow(v) => Some(v),
            AreaValues::PerCell(_) => None,
        }
    }

    /// Materialize the full row-major `rows x cols` array.
    pub fn broadcast(&self) -> Vec<f64> {
        match &self.values {
            AreaValues::PerRow(v) => v
                .iter()
                .flat_map(|&area| std::iter::repeat(area).take(self.cols))
                .collect(),
            AreaValues::PerCell(v) => v.clone(),
        }
    }

    /// Sum over all cells.
    pub fn total(&self) -> f64 {
        match &self.values {
            AreaValues::PerRow(v) => v.iter().sum::<f64>() * self.cols as f64,
            AreaValues::PerCell(v) => v.iter().sum(),
        }
    }

    /// Bytes held by the stored values.
    pub fn memory_bytes(&self) -> usize {
        let len = match &self.values {
            AreaValues::PerRow(v) | AreaValues::PerCell(v) => v.len(),
        };
        len * std::mem::size_of::<f64>()
    }
}

fn check_weights(values: &[f64]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        Some(bad) => Err(RegridError::InvalidWeights(format!(
            "expected finite non-negative values, found {bad}"
        ))),
        None => Ok(()),
    }
}
