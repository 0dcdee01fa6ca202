//! Synthetic raster generators.
//!
//! Every generator returns row-major `Vec<f32>` data (row 0 is the northern
//! row) so the output can be wrapped directly in a source raster.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Creates a grid with predictable values: `col * 1000 + row`.
///
/// Makes it easy to check that blocks are read from the right place.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);  // col=1, row=0
/// assert_eq!(grid[10], 1.0);    // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a grid filled with one value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a categorical grid of vertical stripes `stripe_width` columns wide,
/// cycling through `classes`.
pub fn create_category_stripes(width: usize, height: usize, classes: &[i32], stripe_width: usize) -> Vec<f32> {
    assert!(!classes.is_empty() && stripe_width > 0);
    let mut data = Vec::with_capacity(width * height);
    for _ in 0..height {
        for col in 0..width {
            data.push(classes[(col / stripe_width) % classes.len()] as f32);
        }
    }
    data
}

/// Creates a reproducible random categorical grid drawn from `classes`.
pub fn create_random_categories(width: usize, height: usize, classes: &[i32], seed: u64) -> Vec<f32> {
    assert!(!classes.is_empty());
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width * height)
        .map(|_| classes[rng.gen_range(0..classes.len())] as f32)
        .collect()
}

/// Creates a reproducible random continuous grid with values in `[min, max)`.
pub fn create_random_field(width: usize, height: usize, min: f32, max: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width * height).map(|_| rng.gen_range(min..max)).collect()
}

/// Replaces the values at `positions` (col, row) with `nodata`.
///
/// Positions outside the grid are ignored.
pub fn with_nodata(mut data: Vec<f32>, width: usize, positions: &[(usize, usize)], nodata: f32) -> Vec<f32> {
    for &(col, row) in positions {
        if col < width {
            if let Some(value) = data.get_mut(row * width + col) {
                *value = nodata;
            }
        }
    }
    data
}

/// Encodes values as little-endian bytes, the layout of raw raster files.
pub fn to_le_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[9], 9000.0);
        assert_eq!(grid[49], 9004.0);
    }

    #[test]
    fn test_category_stripes() {
        let grid = create_category_stripes(6, 2, &[10, 20], 2);
        assert_eq!(&grid[0..6], &[10.0, 10.0, 20.0, 20.0, 10.0, 10.0]);
        assert_eq!(&grid[6..12], &grid[0..6]);
    }

    #[test]
    fn test_random_grids_are_reproducible() {
        let a = create_random_categories(16, 16, &[1, 2, 3], 42);
        let b = create_random_categories(16, 16, &[1, 2, 3], 42);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| [1.0, 2.0, 3.0].contains(v)));

        let field = create_random_field(8, 8, 0.0, 5.0, 7);
        assert!(field.iter().all(|v| (0.0..5.0).contains(v)));
    }

    #[test]
    fn test_with_nodata() {
        let grid = with_nodata(create_constant_grid(4, 4, 1.0), 4, &[(1, 2), (9, 9)], -9999.0);
        assert_eq!(grid[2 * 4 + 1], -9999.0);
        assert_eq!(grid.iter().filter(|v| **v == -9999.0).count(), 1);
    }

    #[test]
    fn test_to_le_bytes() {
        let bytes = to_le_bytes(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
    }
}
