//! Area-weighted Regridding of High-resolution Rasters
//!
//! This crate aggregates fine lat/lon rasters (land cover, biomass, soil
//! carbon, ecozones) onto coarser grids whose cells are whole multiples of the
//! source cells. Every source cell contributes in proportion to its true
//! surface area on the Earth. It provides:
//!
//! - **Cell areas**: exact cell areas on a sphere or the WGS84 ellipsoid
//! - **Aggregation**: weighted sum, weighted mean, class fraction and majority class
//! - **Blockwise processing**: bounded memory, optional rayon parallelism
//! - **Area caching**: LRU cache of per-grid area rasters
//!
//! # Architecture
//!
//! ```text
//! BlockSource (in-memory, windowed, or file backed)
//!      │
//!      ▼
//! Regridder::run(source, target_grid, specs)
//!      │
//!      ├─► Check grids: integer factor, matching footprint
//!      │
//!      ├─► AreaCache / grid_cell_areas (one value per row)
//!      │
//!      ├─► Plan CellBlocks (strips, fixed shape, or degree tiles)
//!      │
//!      └─► Reduce each block per AggregationSpec
//!               │
//!               ▼
//!          TargetRaster per variable
//! ```
//!
//! # Example
//!
//! ```ignore
//! use regrid_engine::{regrid, AggregationSpec, Grid, SourceRaster};
//!
//! let fine = Grid::global(0.01, 0.01)?;
//! let source = SourceRaster::new(fine, values)?;
//!
//! // Total biomass per 1° cell from a t/ha density raster
//! let target = fine.coarsen(100, 100)?;
//! let totals = regrid(&source, &target, &AggregationSpec::weighted_sum("agb"), None, None)?;
//! ```

pub mod aggregate;
pub mod area;
pub mod cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod raster;
pub mod regrid;
pub mod tiling;
pub mod types;

// Re-export commonly used types at crate root
pub use aggregate::{
    reduce_cells, AggregationMode, AggregationSpec, NoDataPolicy, ValueDomain, TIE_TOLERANCE,
};
pub use area::{AreaRaster, AreaValues};
pub use cache::{AreaCache, AreaKey};
pub use config::{RegridConfig, DEFAULT_MAX_BLOCK_CELLS};
pub use error::{RegridError, Result};
pub use geometry::{cell_area, earth_surface_area, grid_cell_areas, EarthModel, MEAN_EARTH_RADIUS_M};
pub use raster::{BlockSource, SourceRaster, TargetMetadata, TargetRaster, WindowedSource};
pub use regrid::{regrid, regrid_many, BlockShape, RegridOutput, RegridPlan, RegridStats, Regridder};
pub use tiling::{global_tiles, tile_blocks, tiles_touching, TileCase};
pub use types::{BoundingBox, CacheStats, CellBlock, Grid, GridKey};
