//! Cache implementations for regridding.

mod area_cache;

pub use area_cache::{AreaCache, AreaKey};
