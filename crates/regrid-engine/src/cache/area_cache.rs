//! LRU cache of computed area rasters.

use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::area::AreaRaster;
use crate::error::Result;
use crate::geometry::{grid_cell_areas, EarthModel};
use crate::types::{CacheStats, Grid, GridKey};

/// Cache key: the grid identity plus the earth model the areas were computed on.
pub type AreaKey = (GridKey, (u8, u64, u64));

/// Memory-bounded LRU cache of [`AreaRaster`]s.
///
/// Area rasters are immutable once computed, so entries are handed out as
/// `Arc`s and may outlive their eviction. The cache is an explicit object
/// owned by the caller and passed to each regridding run that wants reuse.
pub struct AreaCache {
    cache: LruCache<AreaKey, Arc<AreaRaster>>,
    memory_limit: usize,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl AreaCache {
    /// Create a new cache with the given memory limit in bytes.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            memory_limit,
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn key(grid: &Grid, earth: &EarthModel) -> AreaKey {
        (grid.key(), earth.key())
    }

    /// Try to get a raster from the cache, updating LRU order and statistics.
    pub fn get(&mut self, key: &AreaKey) -> Option<Arc<AreaRaster>> {
        if let Some(raster) = self.cache.get(key) {
            self.hits += 1;
            Some(Arc::clone(raster))
        } else {
            self.misses += 1;
            None
        }
    }

    /// Check if a key exists in the cache without updating LRU order.
    pub fn contains(&self, key: &AreaKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a raster, evicting least recently used entries to make room.
    ///
    /// A raster larger than the whole budget is not stored.
    pub fn insert(&mut self, key: AreaKey, raster: Arc<AreaRaster>) {
        let size = raster.memory_bytes();

        while self.current_memory + size > self.memory_limit && !self.cache.is_empty() {
            if let Some((_, evicted)) = self.cache.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.memory_bytes());
                self.evictions += 1;
            }
        }

        if size <= self.memory_limit {
            if let Some(replaced) = self.cache.put(key, raster) {
                self.current_memory = self.current_memory.saturating_sub(replaced.memory_bytes());
            }
            self.current_memory += size;
        }
    }

    /// Return the cached areas for `grid`, computing and storing them on a miss.
    pub fn get_or_compute(&mut self, grid: &Grid, earth: &EarthModel) -> Result<Arc<AreaRaster>> {
        let key = Self::key(grid, earth);
        if let Some(raster) = self.get(&key) {
            return Ok(raster);
        }

        debug!(grid = %grid, "Computing cell areas");
        let raster = Arc::new(grid_cell_areas(grid, earth)?);
        self.insert(key, Arc::clone(&raster));
        Ok(raster)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            memory_bytes: self.current_memory as u64,
            evictions: self.evictions,
        }
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_memory = 0;
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_compute_reuses_rasters() {
        let mut cache = AreaCache::new(1024 * 1024);
        let grid = Grid::global(1.0, 1.0).unwrap();
        let earth = EarthModel::default();

        let first = cache.get_or_compute(&grid, &earth).unwrap();
        let second = cache.get_or_compute(&grid, &earth).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.memory_bytes, 180 * 8);
    }

    #[test]
    fn test_earth_model_is_part_of_key() {
        let mut cache = AreaCache::new(1024 * 1024);
        let grid = Grid::global(1.0, 1.0).unwrap();

        let sphere = cache.get_or_compute(&grid, &EarthModel::default()).unwrap();
        let wgs84 = cache.get_or_compute(&grid, &EarthModel::WGS84).unwrap();
        assert!(!Arc::ptr_eq(&sphere, &wgs84));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_eviction() {
        // Room for two 180-row rasters.
        let mut cache = AreaCache::new(2 * 180 * 8);
        let earth = EarthModel::default();
        let grids: Vec<Grid> = [1.0, 2.0, 4.0]
            .iter()
            .map(|&res_lon| Grid::global(1.0, res_lon).unwrap())
            .collect();

        for grid in &grids {
            cache.get_or_compute(grid, &earth).unwrap();
        }

        assert!(!cache.contains(&AreaCache::key(&grids[0], &earth)));
        assert!(cache.contains(&AreaCache::key(&grids[2], &earth)));
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.memory_usage() <= 2 * 180 * 8);
    }

    #[test]
    fn test_oversized_raster_not_stored() {
        let mut cache = AreaCache::new(16);
        let grid = Grid::global(1.0, 1.0).unwrap();
        let raster = cache.get_or_compute(&grid, &EarthModel::default()).unwrap();
        assert_eq!(raster.rows(), 180);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut cache = AreaCache::new(1024 * 1024);
        let grid = Grid::global(1.0, 1.0).unwrap();
        cache.get_or_compute(&grid, &EarthModel::default()).unwrap();
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }
}
