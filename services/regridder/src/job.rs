//! Regridding job files.
//!
//! A job names one raw source raster, the target grid, and the variables to
//! derive from it:
//!
//! ```yaml
//! source:
//!   path: landcover_0p01.f32
//!   grid: { origin_lat: 90, origin_lon: -180, res_lat: 0.01, res_lon: 0.01, rows: 18000, cols: 36000 }
//!   nodata: 255
//! target:
//!   factor: [25, 25]
//! blocks:
//!   tile_size_deg: 10
//! output:
//!   dir: out
//!   dtype: f32
//! variables:
//!   - name: forest_fraction
//!     mode: fraction
//!     category: 50
//!     fill_value: -1
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use regrid_engine::{
    AggregationMode, AggregationSpec, BlockShape, EarthModel, Grid, NoDataPolicy, RegridConfig,
    ValueDomain,
};

/// Root of a job YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub blocks: BlockConfig,
    /// `sphere` or `wgs84`; the environment default applies when absent.
    #[serde(default)]
    pub earth_model: Option<String>,
    /// Radius for the spherical model in metres.
    #[serde(default)]
    pub earth_radius_m: Option<f64>,
    pub output: OutputConfig,
    pub variables: Vec<VariableConfig>,
}

/// Raw source raster on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub grid: Grid,
    /// Sentinel marking missing cells, in addition to NaN.
    #[serde(default)]
    pub nodata: Option<f32>,
    #[serde(default)]
    pub byte_order: ByteOrder,
}

/// Target grid, either explicit or as a coarsening factor of the source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub grid: Option<Grid>,
    /// `[k_lat, k_lon]`
    #[serde(default)]
    pub factor: Option<[usize; 2]>,
}

/// Block layout; automatic strips when nothing is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockConfig {
    #[serde(default)]
    pub tile_size_deg: Option<f64>,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub cols: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub dtype: OutputDtype,
}

/// Element type of the raw output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputDtype {
    #[default]
    F32,
    F64,
}

impl OutputDtype {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Whether `value` survives conversion to this type unchanged.
    pub fn represents(&self, value: f64) -> bool {
        match self {
            Self::F32 => value.is_nan() || (value as f32) as f64 == value,
            Self::F64 => true,
        }
    }
}

/// Byte order of the raw source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// One output variable.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    /// `sum`, `mean`, `fraction` or `mode`
    pub mode: String,
    /// Category counted by `fraction`.
    #[serde(default)]
    pub category: Option<i64>,
    /// Overrides the mode's natural domain; mismatches are rejected.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub policy: NoDataPolicy,
    /// Value written to cells without data; NaN when absent.
    #[serde(default)]
    pub fill_value: Option<f64>,
    #[serde(default)]
    pub units: Option<String>,
}

impl JobConfig {
    /// Load a job, resolving relative paths against the job file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;

        let mut job: JobConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse job file: {}", path.display()))?;

        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        job.validate()
            .with_context(|| format!("Invalid job file: {}", path.display()))?;

        debug!(path = %path.display(), variables = job.variables.len(), "Loaded job");
        Ok(job)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.source.path.is_relative() {
            self.source.path = base.join(&self.source.path);
        }
        if self.output.dir.is_relative() {
            self.output.dir = base.join(&self.output.dir);
        }
    }

    /// Check everything that can be checked without touching the source.
    pub fn validate(&self) -> Result<()> {
        self.source.grid.validate()?;
        if self.variables.is_empty() {
            bail!("at least one variable is required");
        }
        let mut names: Vec<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("duplicate variable name '{}'", pair[0]);
        }
        if let Some(bad) = self.variables.iter().find(|v| !is_file_stem(&v.name)) {
            bail!("variable name '{}' is not usable as a file name", bad.name);
        }
        self.target_grid()?;
        self.block_shape()?;
        self.specs()?;
        Ok(())
    }

    /// Target grid: the explicit one, or the source coarsened by the factor.
    pub fn target_grid(&self) -> Result<Grid> {
        match (&self.target.grid, &self.target.factor) {
            (Some(grid), None) => {
                grid.validate()?;
                Ok(*grid)
            }
            (None, Some([k_lat, k_lon])) => Ok(self.source.grid.coarsen(*k_lat, *k_lon)?),
            (Some(_), Some(_)) => bail!("target: give either grid or factor, not both"),
            (None, None) => bail!("target: one of grid or factor is required"),
        }
    }

    pub fn block_shape(&self) -> Result<BlockShape> {
        match (self.blocks.tile_size_deg, self.blocks.rows, self.blocks.cols) {
            (None, None, None) => Ok(BlockShape::Auto),
            (Some(size), None, None) => Ok(BlockShape::Degrees(size)),
            (None, Some(rows), Some(cols)) => Ok(BlockShape::Cells { rows, cols }),
            (None, _, _) => bail!("blocks: rows and cols must be given together"),
            (Some(_), _, _) => bail!("blocks: give either tile_size_deg or rows/cols"),
        }
    }

    /// Aggregation specs for every variable, in job order.
    pub fn specs(&self) -> Result<Vec<AggregationSpec>> {
        self.variables
            .iter()
            .map(|variable| {
                variable
                    .to_spec(self.source.nodata, self.output.dtype)
                    .with_context(|| format!("variable '{}'", variable.name))
            })
            .collect()
    }

    /// Apply the job's earth model on top of the environment configuration.
    pub fn apply(&self, config: &mut RegridConfig) -> Result<()> {
        if let Some(name) = &self.earth_model {
            config.earth_model = EarthModel::from_name(name)
                .with_context(|| format!("unknown earth model '{name}'"))?;
        }
        if let Some(radius_m) = self.earth_radius_m {
            if !matches!(config.earth_model, EarthModel::Sphere { .. }) {
                bail!("earth_radius_m only applies to the spherical model");
            }
            config.earth_model = EarthModel::Sphere { radius_m };
        }
        config.earth_model.validate()?;
        Ok(())
    }
}

impl VariableConfig {
    pub fn to_spec(&self, source_nodata: Option<f32>, dtype: OutputDtype) -> Result<AggregationSpec> {
        let mode = AggregationMode::from_parts(&self.mode, self.category)?;
        if let Some(category) = self.category {
            // Source values are f32, so larger codes can never match.
            if (category as f32) as i64 != category {
                bail!("category {category} is not exactly representable in an f32 source");
            }
        }
        let mut spec = AggregationSpec::new(self.name.clone(), mode).with_policy(self.policy);
        if let Some(domain) = &self.domain {
            let domain = ValueDomain::from_name(domain)
                .with_context(|| format!("unknown domain '{domain}'"))?;
            spec = spec.with_domain(domain);
        }
        if let Some(nodata) = source_nodata {
            spec = spec.with_source_nodata(nodata);
        }
        if let Some(fill) = self.fill_value {
            if !dtype.represents(fill) {
                bail!("fill value {fill} is not exactly representable as {}", dtype.extension());
            }
            spec = spec.with_target_nodata(fill);
        }
        spec.validate()?;
        Ok(spec)
    }
}

fn is_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
source:
  path: agb.f32
  grid: { origin_lat: 10.0, origin_lon: 10.0, res_lat: 0.01, res_lon: 0.01, rows: 1000, cols: 1000 }
  nodata: -9999
target:
  factor: [25, 25]
blocks:
  tile_size_deg: 5
earth_model: wgs84
output:
  dir: out
  dtype: f64
variables:
  - name: agb_total
    mode: sum
    units: t
  - name: forest_fraction
    mode: fraction
    category: 50
    fill_value: -1
  - name: landcover
    mode: mode
    policy: propagate
"#;

    fn parse(yaml: &str) -> JobConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_job() {
        let job = parse(JOB);
        job.validate().unwrap();

        assert_eq!(job.source.nodata, Some(-9999.0));
        assert_eq!(job.source.byte_order, ByteOrder::Little);
        assert_eq!(job.output.dtype, OutputDtype::F64);
        assert_eq!(job.block_shape().unwrap(), BlockShape::Degrees(5.0));

        let target = job.target_grid().unwrap();
        assert_eq!((target.rows, target.cols), (40, 40));

        let specs = job.specs().unwrap();
        assert_eq!(specs[0].mode, AggregationMode::WeightedSum);
        assert_eq!(specs[0].source_nodata, Some(-9999.0));
        assert_eq!(specs[1].mode, AggregationMode::Fraction { category: 50 });
        assert_eq!(specs[1].target_nodata, -1.0);
        assert_eq!(specs[2].nodata_policy, NoDataPolicy::Propagate);
        assert!(specs[2].target_nodata.is_nan());
    }

    #[test]
    fn test_apply_earth_model() {
        let job = parse(JOB);
        let mut config = RegridConfig::default();
        job.apply(&mut config).unwrap();
        assert_eq!(config.earth_model, EarthModel::WGS84);

        let mut job = parse(JOB);
        job.earth_model = None;
        job.earth_radius_m = Some(6_371_000.0);
        let mut config = RegridConfig::default();
        job.apply(&mut config).unwrap();
        assert_eq!(config.sphere_radius_m(), Some(6_371_000.0));

        job.earth_model = Some("mars".to_string());
        assert!(job.apply(&mut RegridConfig::default()).is_err());
    }

    #[test]
    fn test_target_needs_exactly_one_form() {
        let mut job = parse(JOB);
        job.target.grid = Some(job.source.grid);
        assert!(job.target_grid().is_err());

        job.target = TargetConfig::default();
        assert!(job.target_grid().is_err());

        job.target.grid = Some(Grid::new(10.0, 10.0, 0.5, 0.5, 20, 20).unwrap());
        assert_eq!(job.target_grid().unwrap().rows, 20);
    }

    #[test]
    fn test_block_shape_forms() {
        let mut job = parse(JOB);
        job.blocks = BlockConfig {
            tile_size_deg: None,
            rows: Some(100),
            cols: Some(1000),
        };
        assert_eq!(
            job.block_shape().unwrap(),
            BlockShape::Cells { rows: 100, cols: 1000 }
        );

        job.blocks.cols = None;
        assert!(job.block_shape().is_err());

        job.blocks = BlockConfig::default();
        assert_eq!(job.block_shape().unwrap(), BlockShape::Auto);
    }

    #[test]
    fn test_invalid_variables_rejected() {
        let mut job = parse(JOB);
        job.variables[1].fill_value = Some(0.0);
        assert!(job.validate().is_err());

        let mut job = parse(JOB);
        job.variables[0].domain = Some("categorical".to_string());
        assert!(job.validate().is_err());

        let mut job = parse(JOB);
        job.variables[1].name = "agb_total".to_string();
        assert!(job.validate().is_err());

        let mut job = parse(JOB);
        job.variables[0].name = "../escape".to_string();
        assert!(job.validate().is_err());

        let mut job = parse(JOB);
        job.variables[1].category = None;
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_fill_value_must_fit_output_dtype() {
        let mut job = parse(JOB);
        job.output.dtype = OutputDtype::F32;
        job.variables[0].fill_value = Some(1e40);
        assert!(job.validate().is_err());

        job.variables[0].fill_value = Some(16_777_217.0);
        assert!(job.validate().is_err());

        job.output.dtype = OutputDtype::F64;
        assert!(job.validate().is_ok());

        let mut job = parse(JOB);
        job.variables[1].category = Some(16_777_217);
        assert!(job.validate().is_err());

        assert!(OutputDtype::F32.represents(-9999.0));
        assert!(OutputDtype::F32.represents(f64::NAN));
        assert!(!OutputDtype::F32.represents(0.1));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(&path, JOB).unwrap();

        let job = JobConfig::load(&path).unwrap();
        assert_eq!(job.source.path, dir.path().join("agb.f32"));
        assert_eq!(job.output.dir, dir.path().join("out"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "source: [").unwrap();
        let err = JobConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse job file"));
    }
}
