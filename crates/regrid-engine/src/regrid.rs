//! Blockwise area-weighted regridding.
//!
//! # Architecture
//!
//! ```text
//! Regridder::run(source, target_grid, specs)
//!      │
//!      ├─► check_covers: integer factor k_lat x k_lon, matching footprint
//!      │
//!      ├─► AreaRaster (caller supplied, cached, or computed per row)
//!      │
//!      ├─► plan: CellBlocks aligned to target cells (Auto / Cells / Degrees)
//!      │
//!      └─► for each block (sequential, or one rayon task per block)
//!               │
//!               ├─► source.read_block(block)
//!               ├─► reduce every k_lat x k_lon sub-block, for every spec
//!               └─► write the block's disjoint target region
//! ```
//!
//! Only one block per worker is in memory at a time. A failing block read
//! aborts the run; no partially filled target is returned.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{AggregationSpec, CellAccumulator};
use crate::area::AreaRaster;
use crate::cache::AreaCache;
use crate::config::RegridConfig;
use crate::error::{RegridError, Result};
use crate::geometry::grid_cell_areas;
use crate::raster::{BlockSource, TargetRaster};
use crate::tiling::tile_blocks;
use crate::types::{CellBlock, Grid};

/// How the source grid is split into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockShape {
    /// Full-width strips bounded by [`RegridConfig::max_block_cells`].
    #[default]
    Auto,
    /// Fixed blocks of source cells; both sides must be multiples of the
    /// resolution factor. Edge blocks may be smaller.
    Cells { rows: usize, cols: usize },
    /// Tiles of the global lattice with the given size in degrees.
    Degrees(f64),
}

/// Validated geometry of a regridding run.
#[derive(Debug, Clone)]
pub struct RegridPlan {
    pub source: Grid,
    pub target: Grid,
    pub k_lat: usize,
    pub k_lon: usize,
    pub blocks: Vec<CellBlock>,
}

impl RegridPlan {
    /// Largest number of source cells held by any one block.
    pub fn max_block_cells(&self) -> usize {
        self.blocks.iter().map(CellBlock::len).max().unwrap_or(0)
    }
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegridStats {
    pub blocks: usize,
    pub source_cells: u64,
    /// Source cells that were no-data for the first variable.
    pub nodata_cells: u64,
    pub elapsed: Duration,
}

/// Targets plus run statistics.
#[derive(Debug, Clone)]
pub struct RegridOutput {
    pub targets: Vec<TargetRaster>,
    pub stats: RegridStats,
}

/// Reduced values of one block, one vector per variable.
struct BlockResult {
    region: CellBlock,
    values: Vec<Vec<f64>>,
    source_cells: u64,
    nodata_cells: u64,
}

/// Aggregates high-resolution sources onto coarser grids.
#[derive(Debug, Clone, Default)]
pub struct Regridder {
    config: RegridConfig,
}

impl Regridder {
    pub fn new(config: RegridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegridConfig {
        &self.config
    }

    /// Check the source/target pairing and split the source into blocks.
    pub fn plan(&self, source: &Grid, target: &Grid, shape: &BlockShape) -> Result<RegridPlan> {
        source.validate()?;
        target.validate()?;
        let (k_lat, k_lon) = source.check_covers(target)?;

        let blocks = match *shape {
            BlockShape::Auto => auto_blocks(source, k_lat, k_lon, self.config.max_block_cells),
            BlockShape::Cells { rows, cols } => fixed_blocks(source, k_lat, k_lon, rows, cols)?,
            BlockShape::Degrees(size) => tile_blocks(source, k_lat, k_lon, size)?,
        };

        Ok(RegridPlan {
            source: *source,
            target: *target,
            k_lat,
            k_lon,
            blocks,
        })
    }

    /// Regrid one variable.
    pub fn regrid<S: BlockSource + Sync>(
        &self,
        source: &S,
        target: &Grid,
        spec: &AggregationSpec,
        area_weights: Option<&AreaRaster>,
        shape: &BlockShape,
    ) -> Result<TargetRaster> {
        let mut output = self.run(source, target, std::slice::from_ref(spec), area_weights, shape)?;
        output
            .targets
            .pop()
            .ok_or_else(|| RegridError::ConfigError("no target produced".to_string()))
    }

    /// Regrid several variables from a single pass over the source.
    ///
    /// `area_weights` overrides the geometric cell areas, e.g. with area
    /// multiplied by a quality layer; it must have the source grid's shape.
    pub fn run<S: BlockSource + Sync>(
        &self,
        source: &S,
        target: &Grid,
        specs: &[AggregationSpec],
        area_weights: Option<&AreaRaster>,
        shape: &BlockShape,
    ) -> Result<RegridOutput> {
        match area_weights {
            Some(areas) => self.execute(source, target, specs, areas, shape),
            None => {
                self.config.earth_model.validate()?;
                let areas = grid_cell_areas(source.grid(), &self.config.earth_model)?;
                self.execute(source, target, specs, &areas, shape)
            }
        }
    }

    /// Like [`Regridder::run`] with geometric areas taken from `cache`.
    pub fn run_cached<S: BlockSource + Sync>(
        &self,
        source: &S,
        target: &Grid,
        specs: &[AggregationSpec],
        cache: &mut AreaCache,
        shape: &BlockShape,
    ) -> Result<RegridOutput> {
        let areas = cache.get_or_compute(source.grid(), &self.config.earth_model)?;
        self.execute(source, target, specs, &areas, shape)
    }

    fn execute<S: BlockSource + Sync>(
        &self,
        source: &S,
        target: &Grid,
        specs: &[AggregationSpec],
        areas: &AreaRaster,
        shape: &BlockShape,
    ) -> Result<RegridOutput> {
        let start = Instant::now();
        self.config.validate().map_err(RegridError::ConfigError)?;
        if specs.is_empty() {
            return Err(RegridError::ConfigError(
                "at least one aggregation spec is required".to_string(),
            ));
        }
        for spec in specs {
            spec.validate()?;
        }

        let source_grid = source.grid();
        if !areas.matches(source_grid) {
            return Err(RegridError::ShapeMismatch {
                expected: source_grid.len(),
                actual: areas.rows() * areas.cols(),
            });
        }

        let plan = self.plan(source_grid, target, shape)?;
        info!(
            source = %plan.source,
            target = %plan.target,
            k_lat = plan.k_lat,
            k_lon = plan.k_lon,
            blocks = plan.blocks.len(),
            variables = specs.len(),
            parallel = self.config.parallel,
            "Starting regrid"
        );

        let mut targets: Vec<TargetRaster> = specs
            .iter()
            .map(|spec| {
                TargetRaster::filled(
                    spec.name.clone(),
                    plan.target,
                    spec.mode,
                    spec.domain,
                    spec.target_nodata,
                )
            })
            .collect();

        let mut stats = RegridStats {
            blocks: plan.blocks.len(),
            ..Default::default()
        };
        let process = |block: &CellBlock| process_block(source, block, &plan, specs, areas);

        if self.config.parallel {
            let results = plan
                .blocks
                .par_iter()
                .map(process)
                .collect::<Result<Vec<BlockResult>>>()?;
            for result in results {
                write_result(&mut targets, &result, &mut stats);
            }
        } else {
            for block in &plan.blocks {
                let result = process(block)?;
                write_result(&mut targets, &result, &mut stats);
            }
        }

        stats.elapsed = start.elapsed();
        info!(
            blocks = stats.blocks,
            source_cells = stats.source_cells,
            nodata_cells = stats.nodata_cells,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Regrid complete"
        );
        Ok(RegridOutput { targets, stats })
    }
}

/// Regrid one variable with the default configuration.
///
/// `area_weights` defaults to spherical cell areas of the source grid and
/// `block_shape` to [`BlockShape::Auto`].
pub fn regrid<S: BlockSource + Sync>(
    source: &S,
    target_grid: &Grid,
    agg_spec: &AggregationSpec,
    area_weights: Option<&AreaRaster>,
    block_shape: Option<BlockShape>,
) -> Result<TargetRaster> {
    Regridder::default().regrid(
        source,
        target_grid,
        agg_spec,
        area_weights,
        &block_shape.unwrap_or_default(),
    )
}

/// Regrid several variables with the default configuration.
pub fn regrid_many<S: BlockSource + Sync>(
    source: &S,
    target_grid: &Grid,
    specs: &[AggregationSpec],
    area_weights: Option<&AreaRaster>,
    block_shape: Option<BlockShape>,
) -> Result<Vec<TargetRaster>> {
    Regridder::default()
        .run(
            source,
            target_grid,
            specs,
            area_weights,
            &block_shape.unwrap_or_default(),
        )
        .map(|output| output.targets)
}

/// Full-width strips of whole target rows, or narrower blocks one target row
/// high when a single strip would exceed `max_cells`.
fn auto_blocks(source: &Grid, k_lat: usize, k_lon: usize, max_cells: usize) -> Vec<CellBlock> {
    let strip_cells = k_lat * source.cols;
    let (rows, cols) = if strip_cells <= max_cells {
        ((max_cells / strip_cells).max(1) * k_lat, source.cols)
    } else {
        (k_lat, (max_cells / (k_lat * k_lon)).max(1) * k_lon)
    };
    split(source, rows, cols)
}

fn fixed_blocks(
    source: &Grid,
    k_lat: usize,
    k_lon: usize,
    rows: usize,
    cols: usize,
) -> Result<Vec<CellBlock>> {
    if rows == 0 || cols == 0 || rows % k_lat != 0 || cols % k_lon != 0 {
        return Err(RegridError::invalid_block(format!(
            "block shape {rows}x{cols} is not a positive multiple of {k_lat}x{k_lon}"
        )));
    }
    Ok(split(source, rows, cols))
}

/// Tile the grid with `rows x cols` blocks, clipping at the edges.
fn split(grid: &Grid, rows: usize, cols: usize) -> Vec<CellBlock> {
    let mut blocks = Vec::with_capacity(grid.rows.div_ceil(rows) * grid.cols.div_ceil(cols));
    for row_start in (0..grid.rows).step_by(rows) {
        for col_start in (0..grid.cols).step_by(cols) {
            blocks.push(CellBlock {
                row_start,
                row_end: (row_start + rows).min(grid.rows),
                col_start,
                col_end: (col_start + cols).min(grid.cols),
            });
        }
    }
    blocks
}

/// Read one block and reduce it for every spec.
fn process_block<S: BlockSource>(
    source: &S,
    block: &CellBlock,
    plan: &RegridPlan,
    specs: &[AggregationSpec],
    areas: &AreaRaster,
) -> Result<BlockResult> {
    let values = source.read_block(block)?;
    if values.len() != block.len() {
        return Err(RegridError::source_read(format!(
            "{block}: expected {} values, got {}",
            block.len(),
            values.len()
        )));
    }
    debug!(block = %block, "Reducing block");

    let (k_lat, k_lon) = (plan.k_lat, plan.k_lon);
    let region = block.target_region(k_lat, k_lon);
    let block_cols = block.cols();
    let mut acc = CellAccumulator::default();
    let mut nodata_cells = 0;
    let mut reduced = Vec::with_capacity(specs.len());

    for (i, spec) in specs.iter().enumerate() {
        let mut out = Vec::with_capacity(region.len());
        for tr in 0..region.rows() {
            for tc in 0..region.cols() {
                acc.reset();
                for sr in tr * k_lat..(tr + 1) * k_lat {
                    let row = block.row_start + sr;
                    let line = &values[sr * block_cols..(sr + 1) * block_cols];
                    for sc in tc * k_lon..(tc + 1) * k_lon {
                        let missing = acc.push(spec, line[sc], areas.get(row, block.col_start + sc))?;
                        if missing && i == 0 {
                            nodata_cells += 1;
                        }
                    }
                }
                out.push(acc.finish(spec)?);
            }
        }
        reduced.push(out);
    }

    Ok(BlockResult {
        region,
        values: reduced,
        source_cells: block.len() as u64,
        nodata_cells,
    })
}

fn write_result(targets: &mut [TargetRaster], result: &BlockResult, stats: &mut RegridStats) {
    for (target, values) in targets.iter_mut().zip(&result.values) {
        target.write_region(&result.region, values);
    }
    stats.source_cells += result.source_cells;
    stats.nodata_cells += result.nodata_cells;
}
