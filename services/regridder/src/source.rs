//! Block source backed by a raw `f32` raster file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use regrid_engine::raster::check_block;
use regrid_engine::{BlockSource, CellBlock, Grid, RegridError, Result};

use crate::job::ByteOrder;

const VALUE_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Row-major raw raster on disk, read one block at a time.
///
/// The file is reopened for every block so concurrent reads from worker
/// threads never share a cursor.
#[derive(Debug, Clone)]
pub struct RawFileSource {
    path: PathBuf,
    grid: Grid,
    byte_order: ByteOrder,
}

impl RawFileSource {
    /// Open a raw file, checking its size against the grid.
    pub fn open(path: impl AsRef<Path>, grid: Grid, byte_order: ByteOrder) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        grid.validate()?;
        let len = std::fs::metadata(&path)
            .map_err(|e| RegridError::source_read(format!("{}: {e}", path.display())))?
            .len();
        let expected = grid.len() as u64 * VALUE_BYTES;
        if len != expected {
            return Err(RegridError::ShapeMismatch {
                expected: grid.len(),
                actual: (len / VALUE_BYTES) as usize,
            });
        }
        Ok(Self {
            path,
            grid,
            byte_order,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockSource for RawFileSource {
    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn read_block(&self, block: &CellBlock) -> Result<Vec<f32>> {
        check_block(&self.grid, block)?;
        let read_err = |e: std::io::Error| {
            RegridError::source_read(format!("{} {block}: {e}", self.path.display()))
        };

        let mut file = File::open(&self.path).map_err(read_err)?;
        let width = block.cols();
        let mut values = vec![0.0f32; block.len()];

        for (i, row) in (block.row_start..block.row_end).enumerate() {
            let offset = (row * self.grid.cols + block.col_start) as u64 * VALUE_BYTES;
            file.seek(SeekFrom::Start(offset)).map_err(read_err)?;
            let line = &mut values[i * width..(i + 1) * width];
            file.read_exact(bytemuck::cast_slice_mut(line)).map_err(read_err)?;
        }

        for value in &mut values {
            let bits = value.to_bits();
            *value = f32::from_bits(match self.byte_order {
                ByteOrder::Little => u32::from_le(bits),
                ByteOrder::Big => u32::from_be(bits),
            });
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{create_test_grid, to_le_bytes};

    fn write_raw(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("source.f32");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_read_block_reads_only_window() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::new(10.0, 0.0, 1.0, 1.0, 5, 8).unwrap();
        let path = write_raw(dir.path(), &to_le_bytes(&create_test_grid(8, 5)));

        let source = RawFileSource::open(&path, grid, ByteOrder::Little).unwrap();
        let block = CellBlock::new(1, 3, 2, 5).unwrap();
        assert_eq!(
            source.read_block(&block).unwrap(),
            vec![2001.0, 3001.0, 4001.0, 2002.0, 3002.0, 4002.0]
        );
        assert!(source.read_block(&CellBlock::new(4, 6, 0, 1).unwrap()).is_err());
    }

    #[test]
    fn test_big_endian_source() {
        let dir = tempfile::tempdir().unwrap();
        let values = [1.5f32, -2.0, 3.25, f32::NAN];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        let path = write_raw(dir.path(), &bytes);
        let grid = Grid::new(1.0, 0.0, 0.5, 0.5, 2, 2).unwrap();

        let source = RawFileSource::open(&path, grid, ByteOrder::Big).unwrap();
        let data = source.read_block(&CellBlock::full(&grid)).unwrap();
        assert_eq!(&data[..3], &values[..3]);
        assert!(data[3].is_nan());
    }

    #[test]
    fn test_open_checks_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_raw(dir.path(), &to_le_bytes(&[0.0; 15]));
        let grid = Grid::new(4.0, 0.0, 1.0, 1.0, 4, 4).unwrap();
        assert!(matches!(
            RawFileSource::open(&path, grid, ByteOrder::Little),
            Err(RegridError::ShapeMismatch {
                expected: 16,
                actual: 15
            })
        ));
        assert!(matches!(
            RawFileSource::open(dir.path().join("missing.f32"), grid, ByteOrder::Little),
            Err(RegridError::SourceRead(_))
        ));
    }
}
