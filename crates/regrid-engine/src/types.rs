//! Core types: geographic bounds, regular lat/lon grids and cell blocks.

use serde::{Deserialize, Serialize};

use crate::error::{RegridError, Result};

/// Tolerance, in degrees, for extents that should land exactly on ±90.
pub const DEGREE_EPSILON: f64 = 1e-9;

/// Tolerance, in cells, for offsets and ratios that must be whole numbers.
pub const INDEX_EPSILON: f64 = 1e-6;

/// A geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Check if this bounding box intersects another (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lon < other.min_lon
            || self.min_lon > other.max_lon
            || self.max_lat < other.min_lat
            || self.min_lat > other.max_lat)
    }

}

impl Default for BoundingBox {
    fn default() -> Self {
        // Global coverage
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// A regular latitude/longitude grid.
///
/// The origin is the north-west corner of the top-left cell. Rows run from
/// north to south and columns from west to east; raster data aligned to a
/// grid is stored row-major in that order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Latitude of the northern edge of row 0.
    pub origin_lat: f64,
    /// Longitude of the western edge of column 0.
    pub origin_lon: f64,
    /// Cell height in degrees.
    pub res_lat: f64,
    /// Cell width in degrees.
    pub res_lon: f64,
    pub rows: usize,
    pub cols: usize,
}

/// Hashable identity of a grid, used to key cached area rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridKey {
    origin_lat: u64,
    origin_lon: u64,
    res_lat: u64,
    res_lon: u64,
    rows: usize,
    cols: usize,
}

impl Grid {
    /// Create a grid, validating its geometry.
    pub fn new(
        origin_lat: f64,
        origin_lon: f64,
        res_lat: f64,
        res_lon: f64,
        rows: usize,
        cols: usize,
    ) -> Result<Self> {
        let grid = Self {
            origin_lat,
            origin_lon,
            res_lat,
            res_lon,
            rows,
            cols,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Full-Earth grid anchored at (90°N, 180°W).
    pub fn global(res_lat: f64, res_lon: f64) -> Result<Self> {
        if !(res_lat.is_finite() && res_lat > 0.0 && res_lon.is_finite() && res_lon > 0.0) {
            return Err(RegridError::InvalidResolution(format!(
                "({res_lat}, {res_lon}) must be positive"
            )));
        }
        let rows = whole_number(180.0 / res_lat).ok_or_else(|| {
            RegridError::invalid_grid(format!("180 is not a multiple of res_lat {res_lat}"))
        })?;
        let cols = whole_number(360.0 / res_lon).ok_or_else(|| {
            RegridError::invalid_grid(format!("360 is not a multiple of res_lon {res_lon}"))
        })?;
        Self::new(90.0, -180.0, res_lat, res_lon, rows, cols)
    }

    /// Check the grid invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.res_lat.is_finite() && self.res_lat > 0.0) {
            return Err(RegridError::InvalidResolution(format!(
                "res_lat must be > 0, got {}",
                self.res_lat
            )));
        }
        if !(self.res_lon.is_finite() && self.res_lon > 0.0) {
            return Err(RegridError::InvalidResolution(format!(
                "res_lon must be > 0, got {}",
                self.res_lon
            )));
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(RegridError::invalid_grid(format!(
                "extent must be positive, got {}x{}",
                self.rows, self.cols
            )));
        }
        if !(self.origin_lat.is_finite() && self.origin_lon.is_finite()) {
            return Err(RegridError::invalid_grid("origin must be finite"));
        }
        let south = self.origin_lat - self.rows as f64 * self.res_lat;
        if self.origin_lat > 90.0 + DEGREE_EPSILON || south < -90.0 - DEGREE_EPSILON {
            return Err(RegridError::invalid_grid(format!(
                "latitude extent [{south}, {}] exceeds [-90, 90]",
                self.origin_lat
            )));
        }
        let span_lon = self.cols as f64 * self.res_lon;
        if span_lon > 360.0 + DEGREE_EPSILON {
            return Err(RegridError::invalid_grid(format!(
                "longitude extent {span_lon} exceeds 360 degrees"
            )));
        }
        Ok(())
    }

    /// Geographic bounds of the grid.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin_lon,
            self.origin_lat - self.rows as f64 * self.res_lat,
            self.origin_lon + self.cols as f64 * self.res_lon,
            self.origin_lat,
        )
    }

    /// Latitude of the centre of a row.
    pub fn row_center_lat(&self, row: usize) -> f64 {
        self.origin_lat - (row as f64 + 0.5) * self.res_lat
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Check if the grid has no cells. Always false for a validated grid.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key(&self) -> GridKey {
        GridKey {
            origin_lat: self.origin_lat.to_bits(),
            origin_lon: self.origin_lon.to_bits(),
            res_lat: self.res_lat.to_bits(),
            res_lon: self.res_lon.to_bits(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Integer resolution factor `(k_lat, k_lon)` from this grid to a coarser one.
    pub fn ratio_to(&self, target: &Grid) -> Result<(usize, usize)> {
        let k_lat = integer_ratio(target.res_lat / self.res_lat, "lat")?;
        let k_lon = integer_ratio(target.res_lon / self.res_lon, "lon")?;
        Ok((k_lat, k_lon))
    }

    /// The grid with the same footprint and cells `k_lat x k_lon` times larger.
    pub fn coarsen(&self, k_lat: usize, k_lon: usize) -> Result<Grid> {
        if k_lat == 0 || k_lon == 0 {
            return Err(RegridError::InvalidResolution(format!(
                "coarsening factor must be positive, got {k_lat}x{k_lon}"
            )));
        }
        if self.rows % k_lat != 0 || self.cols % k_lon != 0 {
            return Err(RegridError::extent_mismatch(format!(
                "{}x{} cells do not divide into {k_lat}x{k_lon} blocks",
                self.rows, self.cols
            )));
        }
        Grid::new(
            self.origin_lat,
            self.origin_lon,
            self.res_lat * k_lat as f64,
            self.res_lon * k_lon as f64,
            self.rows / k_lat,
            self.cols / k_lon,
        )
    }

    /// Check that a coarser grid covers exactly this grid's footprint with
    /// whole multiples of its cells. Returns the resolution factor.
    pub fn check_covers(&self, target: &Grid) -> Result<(usize, usize)> {
        let (k_lat, k_lon) = self.ratio_to(target)?;
        if self.rows != target.rows * k_lat || self.cols != target.cols * k_lon {
            return Err(RegridError::extent_mismatch(format!(
                "source {}x{} is not target {}x{} scaled by {k_lat}x{k_lon}",
                self.rows, self.cols, target.rows, target.cols
            )));
        }
        let lat_offset = (self.origin_lat - target.origin_lat) / self.res_lat;
        let lon_offset = (self.origin_lon - target.origin_lon) / self.res_lon;
        if lat_offset.abs() > INDEX_EPSILON || lon_offset.abs() > INDEX_EPSILON {
            return Err(RegridError::extent_mismatch(format!(
                "source origin ({}, {}) differs from target origin ({}, {})",
                self.origin_lat, self.origin_lon, target.origin_lat, target.origin_lon
            )));
        }
        Ok((k_lat, k_lon))
    }

    /// The window of this grid's cells covering another grid's footprint.
    ///
    /// The other grid's edges must fall on this grid's cell edges and its
    /// footprint must be contained in this grid.
    pub fn window(&self, other: &Grid) -> Result<CellBlock> {
        let row_start = cell_offset((self.origin_lat - other.origin_lat) / self.res_lat)
            .ok_or_else(|| RegridError::extent_mismatch("northern edge not on a source row edge"))?;
        let col_start = cell_offset((other.origin_lon - self.origin_lon) / self.res_lon)
            .ok_or_else(|| RegridError::extent_mismatch("western edge not on a source column edge"))?;
        let rows = cell_offset(other.rows as f64 * other.res_lat / self.res_lat)
            .ok_or_else(|| RegridError::extent_mismatch("height is not a whole number of source rows"))?;
        let cols = cell_offset(other.cols as f64 * other.res_lon / self.res_lon)
            .ok_or_else(|| RegridError::extent_mismatch("width is not a whole number of source columns"))?;

        if row_start + rows > self.rows || col_start + cols > self.cols {
            return Err(RegridError::extent_mismatch(format!(
                "window rows {}..{} cols {}..{} exceeds {}x{} grid",
                row_start,
                row_start + rows,
                col_start,
                col_start + cols,
                self.rows,
                self.cols
            )));
        }
        CellBlock::new(row_start, row_start + rows, col_start, col_start + cols)
    }

    /// The grid covering a block of this grid's cells.
    pub fn sub_grid(&self, block: &CellBlock) -> Result<Grid> {
        if block.row_end > self.rows || block.col_end > self.cols {
            return Err(RegridError::invalid_block(format!(
                "{block} exceeds {}x{} grid",
                self.rows, self.cols
            )));
        }
        Grid::new(
            self.origin_lat - block.row_start as f64 * self.res_lat,
            self.origin_lon + block.col_start as f64 * self.res_lon,
            self.res_lat,
            self.res_lon,
            block.rows(),
            block.cols(),
        )
    }
}

impl std::fmt::Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}°x{}° from ({}, {})",
            self.rows, self.cols, self.res_lat, self.res_lon, self.origin_lat, self.origin_lon
        )
    }
}

/// A rectangular, half-open range of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellBlock {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl CellBlock {
    /// Create a non-empty block.
    pub fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Result<Self> {
        if row_end <= row_start || col_end <= col_start {
            return Err(RegridError::invalid_block(format!(
                "empty block rows {row_start}..{row_end} cols {col_start}..{col_end}"
            )));
        }
        Ok(Self {
            row_start,
            row_end,
            col_start,
            col_end,
        })
    }

    /// The block covering an entire grid.
    pub fn full(grid: &Grid) -> Self {
        Self {
            row_start: 0,
            row_end: grid.rows,
            col_start: 0,
            col_end: grid.cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn cols(&self) -> usize {
        self.col_end - self.col_start
    }

    /// Number of cells in the block.
    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every bound falls on a multiple of the resolution factor.
    pub fn is_aligned(&self, k_lat: usize, k_lon: usize) -> bool {
        self.row_start % k_lat == 0
            && self.row_end % k_lat == 0
            && self.col_start % k_lon == 0
            && self.col_end % k_lon == 0
    }

    /// The block of target cells this source block reduces into.
    pub fn target_region(&self, k_lat: usize, k_lon: usize) -> CellBlock {
        debug_assert!(self.is_aligned(k_lat, k_lon));
        CellBlock {
            row_start: self.row_start / k_lat,
            row_end: self.row_end / k_lat,
            col_start: self.col_start / k_lon,
            col_end: self.col_end / k_lon,
        }
    }

    /// The same block shifted by a row and column offset.
    pub fn offset(&self, rows: usize, cols: usize) -> CellBlock {
        CellBlock {
            row_start: self.row_start + rows,
            row_end: self.row_end + rows,
            col_start: self.col_start + cols,
            col_end: self.col_end + cols,
        }
    }
}

impl std::fmt::Display for CellBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows {}..{} cols {}..{}",
            self.row_start, self.row_end, self.col_start, self.col_end
        )
    }
}

/// Statistics about the area cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Round `ratio` to a positive integer, or fail if it is not one.
fn integer_ratio(ratio: f64, axis: &'static str) -> Result<usize> {
    let rounded = ratio.round();
    if !ratio.is_finite() || rounded < 1.0 || (ratio - rounded).abs() > INDEX_EPSILON * rounded {
        return Err(RegridError::ResolutionMismatch { axis, ratio });
    }
    Ok(rounded as usize)
}

/// A non-negative whole number of cells, allowing for float noise.
fn cell_offset(value: f64) -> Option<usize> {
    let rounded = value.round();
    if !value.is_finite() || rounded < 0.0 || (value - rounded).abs() > INDEX_EPSILON {
        return None;
    }
    Some(rounded as usize)
}

/// A positive whole number, allowing for float noise.
fn whole_number(value: f64) -> Option<usize> {
    cell_offset(value).filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        let touching = BoundingBox::new(10.0, 0.0, 20.0, 10.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&touching));
    }

    #[test]
    fn test_global_grid() {
        let grid = Grid::global(1.0, 1.0).unwrap();
        assert_eq!(grid.rows, 180);
        assert_eq!(grid.cols, 360);
        assert_eq!(grid.bbox(), BoundingBox::default());

        let fine = Grid::global(0.1, 0.1).unwrap();
        assert_eq!(fine.rows, 1800);
        assert_eq!(fine.cols, 3600);

        assert!(Grid::global(0.7, 1.0).is_err());
    }

    #[test]
    fn test_grid_validation() {
        assert!(Grid::new(10.0, 0.0, 0.0, 1.0, 4, 4).is_err());
        assert!(Grid::new(10.0, 0.0, 1.0, -1.0, 4, 4).is_err());
        assert!(Grid::new(10.0, 0.0, 1.0, 1.0, 0, 4).is_err());
        assert!(Grid::new(95.0, 0.0, 1.0, 1.0, 4, 4).is_err());
        assert!(Grid::new(-85.0, 0.0, 1.0, 1.0, 10, 4).is_err());
        assert!(Grid::new(f64::NAN, 0.0, 1.0, 1.0, 4, 4).is_err());
        assert!(Grid::new(90.0, -180.0, 1.0, 1.0, 180, 360).is_ok());
    }

    #[test]
    fn test_grid_longitude_span_limited_to_one_turn() {
        assert!(matches!(
            Grid::new(90.0, -180.0, 1.0, 1.0, 180, 720),
            Err(RegridError::InvalidGrid(_))
        ));
        assert!(Grid::new(10.0, 0.0, 1.0, 1.0, 4, 361).is_err());
        assert!(Grid::global(0.01, 0.01).is_ok());
    }

    #[test]
    fn test_row_geometry() {
        let grid = Grid::new(10.0, 20.0, 0.5, 0.25, 4, 8).unwrap();
        assert_eq!(grid.row_center_lat(1), 9.25);
        assert_eq!(grid.len(), 32);
    }

    #[test]
    fn test_ratio_to() {
        let source = Grid::new(10.0, 0.0, 0.1, 0.1, 100, 100).unwrap();
        let target = Grid::new(10.0, 0.0, 0.4, 0.5, 25, 20).unwrap();
        assert_eq!(source.ratio_to(&target).unwrap(), (4, 5));

        let bad = Grid::new(10.0, 0.0, 0.25, 0.5, 40, 20).unwrap();
        assert!(matches!(
            source.ratio_to(&bad),
            Err(RegridError::ResolutionMismatch { axis: "lat", .. })
        ));

        let finer = Grid::new(10.0, 0.0, 0.05, 0.1, 200, 100).unwrap();
        assert!(source.ratio_to(&finer).is_err());
    }

    #[test]
    fn test_check_covers() {
        let source = Grid::new(10.0, 0.0, 0.1, 0.1, 8, 8).unwrap();
        let target = source.coarsen(4, 4).unwrap();
        assert_eq!(source.check_covers(&target).unwrap(), (4, 4));

        let wrong_extent = Grid::new(10.0, 0.0, 0.4, 0.4, 3, 2).unwrap();
        assert!(matches!(
            source.check_covers(&wrong_extent),
            Err(RegridError::ExtentMismatch(_))
        ));

        let shifted = Grid::new(9.6, 0.0, 0.4, 0.4, 2, 2).unwrap();
        assert!(matches!(
            source.check_covers(&shifted),
            Err(RegridError::ExtentMismatch(_))
        ));
    }

    #[test]
    fn test_coarsen_requires_divisible_extent() {
        let grid = Grid::new(10.0, 0.0, 0.1, 0.1, 10, 8).unwrap();
        assert!(grid.coarsen(4, 4).is_err());
        assert!(grid.coarsen(0, 1).is_err());
        let coarse = grid.coarsen(5, 4).unwrap();
        assert_eq!((coarse.rows, coarse.cols), (2, 2));
    }

    #[test]
    fn test_window() {
        let global = Grid::global(1.0, 1.0).unwrap();
        let europe = Grid::new(70.0, -10.0, 2.0, 2.0, 15, 25).unwrap();
        let window = global.window(&europe).unwrap();
        assert_eq!(window, CellBlock::new(20, 50, 170, 220).unwrap());

        let sub = global.sub_grid(&window).unwrap();
        assert_eq!(sub.origin_lat, 70.0);
        assert_eq!(sub.origin_lon, -10.0);
        assert_eq!((sub.rows, sub.cols), (30, 50));

        let misaligned = Grid::new(70.5, -10.0, 2.0, 2.0, 15, 25).unwrap();
        assert!(global.window(&misaligned).is_err());

        let outside = Grid::new(70.0, 170.0, 2.0, 2.0, 5, 10).unwrap();
        assert!(global.window(&outside).is_err());
    }

    #[test]
    fn test_cell_block() {
        assert!(CellBlock::new(4, 4, 0, 4).is_err());
        let block = CellBlock::new(4, 12, 8, 16).unwrap();
        assert_eq!(block.len(), 64);
        assert!(block.is_aligned(4, 4));
        assert!(!block.is_aligned(8, 4));
        assert_eq!(block.target_region(4, 4), CellBlock::new(1, 3, 2, 4).unwrap());
        assert_eq!(block.offset(1, 2), CellBlock::new(5, 13, 10, 18).unwrap());
    }

    #[test]
    fn test_grid_key_distinguishes_grids() {
        let a = Grid::global(1.0, 1.0).unwrap();
        let b = Grid::global(0.5, 1.0).unwrap();
        assert_eq!(a.key(), Grid::global(1.0, 1.0).unwrap().key());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let mut stats = CacheStats::default();
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);

        stats.hits = 80;
        stats.misses = 20;
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }
}
