//! Writing regridded variables as raw arrays with JSON sidecars.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use regrid_engine::{TargetMetadata, TargetRaster};

use crate::job::OutputDtype;

/// Contents of `<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(flatten)]
    pub metadata: TargetMetadata,
    pub dtype: OutputDtype,
    pub byte_order: String,
    #[serde(default)]
    pub units: Option<String>,
    /// Source raster the variable was derived from.
    pub source: String,
}

/// Paths written for one variable.
#[derive(Debug, Clone)]
pub struct WrittenFiles {
    pub data: PathBuf,
    pub sidecar: PathBuf,
}

/// Encode values as little-endian bytes of the requested element type.
pub fn encode(values: &[f64], dtype: OutputDtype) -> Vec<u8> {
    match dtype {
        OutputDtype::F32 => values.iter().flat_map(|v| (*v as f32).to_le_bytes()).collect(),
        OutputDtype::F64 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

/// Write `<dir>/<name>.<dtype>` and `<dir>/<name>.json`.
pub fn write_target(
    dir: &Path,
    target: &TargetRaster,
    dtype: OutputDtype,
    units: Option<&str>,
    source: &Path,
) -> Result<WrittenFiles> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let data = dir.join(format!("{}.{}", target.name, dtype.extension()));
    std::fs::write(&data, encode(&target.data, dtype))
        .with_context(|| format!("Failed to write {}", data.display()))?;

    let sidecar_path = dir.join(format!("{}.json", target.name));
    let sidecar = Sidecar {
        metadata: target.metadata(),
        dtype,
        byte_order: "little".to_string(),
        units: units.map(str::to_string),
        source: source.display().to_string(),
    };
    let json = serde_json::to_string_pretty(&sidecar)?;
    std::fs::write(&sidecar_path, json)
        .with_context(|| format!("Failed to write {}", sidecar_path.display()))?;

    info!(
        variable = %target.name,
        path = %data.display(),
        valid_cells = sidecar.metadata.valid_cells,
        "Wrote variable"
    );
    Ok(WrittenFiles {
        data,
        sidecar: sidecar_path,
    })
}
