//! Source and target rasters, and the block-reading seam.

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregationMode, ValueDomain};
use crate::error::{RegridError, Result};
use crate::types::{CellBlock, Grid};

/// Anything that can hand out rectangular blocks of a source raster.
///
/// Implementations may read from disk on every call, so the regridder never
/// needs the full raster in memory. Blocks are returned row-major with
/// `block.rows() * block.cols()` values.
pub trait BlockSource {
    /// Grid the source values are aligned to.
    fn grid(&self) -> &Grid;

    /// Read one block of values.
    fn read_block(&self, block: &CellBlock) -> Result<Vec<f32>>;
}

impl<S: BlockSource + ?Sized> BlockSource for &S {
    fn grid(&self) -> &Grid {
        (**self).grid()
    }

    fn read_block(&self, block: &CellBlock) -> Result<Vec<f32>> {
        (**self).read_block(block)
    }
}

/// A fully materialized source raster.
#[derive(Debug, Clone)]
pub struct SourceRaster {
    grid: Grid,
    data: Vec<f32>,
}

impl SourceRaster {
    /// Wrap row-major values aligned to `grid`.
    pub fn new(grid: Grid, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(RegridError::ShapeMismatch {
                expected: grid.len(),
                actual: data.len(),
            });
        }
        Ok(Self { grid, data })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.grid.rows || col >= self.grid.cols {
            return None;
        }
        self.data.get(row * self.grid.cols + col).copied()
    }
}

impl BlockSource for SourceRaster {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn read_block(&self, block: &CellBlock) -> Result<Vec<f32>> {
        check_block(&self.grid, block)?;
        let mut values = Vec::with_capacity(block.len());
        for row in block.row_start..block.row_end {
            let start = row * self.grid.cols;
            values.extend_from_slice(&self.data[start + block.col_start..start + block.col_end]);
        }
        Ok(values)
    }
}

/// A view of a sub-window of another source, e.g. a global raster cropped to
/// a regional target extent.
#[derive(Debug, Clone)]
pub struct WindowedSource<S> {
    inner: S,
    window: CellBlock,
    grid: Grid,
}

impl<S: BlockSource> WindowedSource<S> {
    /// View `window` of `inner`'s cells.
    pub fn new(inner: S, window: CellBlock) -> Result<Self> {
        let grid = inner.grid().sub_grid(&window)?;
        Ok(Self {
            inner,
            window,
            grid,
        })
    }

    /// Crop `inner` to the footprint of `target`.
    pub fn crop_to(inner: S, target: &Grid) -> Result<Self> {
        let window = inner.grid().window(target)?;
        Self::new(inner, window)
    }

    pub fn window(&self) -> &CellBlock {
        &self.window
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: BlockSource> BlockSource for WindowedSource<S> {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn read_block(&self, block: &CellBlock) -> Result<Vec<f32>> {
        check_block(&self.grid, block)?;
        self.inner
            .read_block(&block.offset(self.window.row_start, self.window.col_start))
    }
}

/// Check that a block lies inside a grid.
pub fn check_block(grid: &Grid, block: &CellBlock) -> Result<()> {
    if block.is_empty() || block.row_end > grid.rows || block.col_end > grid.cols {
        return Err(RegridError::invalid_block(format!(
            "{block} is outside {}x{} grid",
            grid.rows, grid.cols
        )));
    }
    Ok(())
}

/// Regridded output for one variable.
#[derive(Debug, Clone)]
pub struct TargetRaster {
    pub name: String,
    pub grid: Grid,
    pub mode: AggregationMode,
    pub domain: ValueDomain,
    /// Sentinel for cells without valid data; NaN unless configured.
    pub nodata: f64,
    /// Row-major values.
    pub data: Vec<f64>,
}

impl TargetRaster {
    pub(crate) fn filled(
        name: String,
        grid: Grid,
        mode: AggregationMode,
        domain: ValueDomain,
        nodata: f64,
    ) -> Self {
        Self {
            name,
            grid,
            mode,
            domain,
            nodata,
            data: vec![nodata; grid.len()],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.grid.rows || col >= self.grid.cols {
            return None;
        }
        self.data.get(row * self.grid.cols + col).copied()
    }

    /// Whether a value equals this raster's no-data sentinel.
    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        if self.nodata.is_nan() {
            value.is_nan()
        } else {
            value == self.nodata
        }
    }

    /// Number of cells holding valid data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Sum of all valid cells.
    pub fn sum_valid(&self) -> f64 {
        self.data.iter().filter(|v| !self.is_nodata(**v)).sum()
    }

    /// Write a block of reduced values into its target region.
    pub(crate) fn write_region(&mut self, region: &CellBlock, values: &[f64]) {
        debug_assert_eq!(values.len(), region.len());
        let cols = self.grid.cols;
        for (i, row) in (region.row_start..region.row_end).enumerate() {
            let start = row * cols + region.col_start;
            self.data[start..start + region.cols()]
                .copy_from_slice(&values[i * region.cols()..(i + 1) * region.cols()]);
        }
    }

    /// Descriptive metadata, suitable for a JSON sidecar.
    pub fn metadata(&self) -> TargetMetadata {
        TargetMetadata {
            name: self.name.clone(),
            grid: self.grid,
            mode: self.mode,
            domain: self.domain,
            nodata: if self.nodata.is_nan() { None } else { Some(self.nodata) },
            valid_cells: self.valid_count(),
        }
    }
}

/// Serializable description of a [`TargetRaster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub name: String,
    pub grid: Grid,
    pub mode: AggregationMode,
    pub domain: ValueDomain,
    /// `None` means NaN marks no-data.
    pub nodata: Option<f64>,
    pub valid_cells: usize,
}

impl TargetMetadata {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
