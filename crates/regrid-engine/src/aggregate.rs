//! Aggregation modes and the reduction of one target cell.
//!
//! Each target cell collects the `k_lat x k_lon` source cells in its footprint
//! together with their areas and reduces them according to the
//! [`AggregationSpec`]:
//!
//! - **WeightedSum**: Σ(v·a), e.g. biomass density (t/ha) to total tonnes
//! - **WeightedMean**: Σ(v·a) / Σa, e.g. soil carbon density
//! - **Fraction**: Σa[v = c] / Σa, e.g. share of a land-cover class
//! - **Mode**: category with the largest total area, e.g. dominant ecozone
//!
//! No-data source cells never contribute to a numerator or a denominator.
//! A cell whose source cells are all no-data is no-data in every mode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegridError, Result};

/// Relative difference under which two category areas count as tied.
pub const TIE_TOLERANCE: f64 = 1e-12;

/// Reduction applied to the source cells of one target cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Σ(value × area).
    WeightedSum,
    /// Σ(value × area) / Σ(area).
    WeightedMean,
    /// Area share of cells equal to `category`, in [0, 1].
    Fraction { category: i64 },
    /// Category covering the largest area; ties go to the lowest code.
    Mode,
}

impl AggregationMode {
    /// Parse a mode name; `fraction` needs a category.
    pub fn from_parts(name: &str, category: Option<i64>) -> Result<Self> {
        match (name.to_lowercase().as_str(), category) {
            ("sum" | "weighted_sum", _) => Ok(Self::WeightedSum),
            ("mean" | "weighted_mean", _) => Ok(Self::WeightedMean),
            ("fraction" | "coverage", Some(category)) => Ok(Self::Fraction { category }),
            ("fraction" | "coverage", None) => Err(RegridError::ConfigError(
                "fraction mode requires a category".to_string(),
            )),
            ("mode" | "majority", _) => Ok(Self::Mode),
            (other, _) => Err(RegridError::ConfigError(format!(
                "unknown aggregation mode '{other}'"
            ))),
        }
    }

    /// The value domain this mode operates on.
    pub fn natural_domain(&self) -> ValueDomain {
        match self {
            Self::WeightedSum | Self::WeightedMean => ValueDomain::Continuous,
            Self::Fraction { .. } | Self::Mode => ValueDomain::Categorical,
        }
    }
}

impl std::fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeightedSum => write!(f, "weighted_sum"),
            Self::WeightedMean => write!(f, "weighted_mean"),
            Self::Fraction { category } => write!(f, "fraction({category})"),
            Self::Mode => write!(f, "mode"),
        }
    }
}

/// Kind of values held by a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueDomain {
    /// Physical quantities (densities, stocks, climate variables).
    #[default]
    Continuous,
    /// Integer class codes (land cover, ecozones, protected-area flags).
    Categorical,
}

impl ValueDomain {
    /// Parse from string (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "continuous" | "numeric" => Some(Self::Continuous),
            "categorical" | "category" | "class" => Some(Self::Categorical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// How a no-data cell inside a partially valid sub-block is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoDataPolicy {
    /// Drop it from numerator and denominator.
    #[default]
    Exclude,
    /// Make the whole target cell no-data.
    Propagate,
}

/// Declaration of one output variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub name: String,
    pub mode: AggregationMode,
    pub domain: ValueDomain,
    #[serde(default)]
    pub nodata_policy: NoDataPolicy,
    /// Source sentinel in addition to NaN, which is always no-data.
    #[serde(default)]
    pub source_nodata: Option<f32>,
    /// Value written to target cells without valid data.
    #[serde(default = "default_target_nodata")]
    pub target_nodata: f64,
}

fn default_target_nodata() -> f64 {
    f64::NAN
}

impl AggregationSpec {
    /// Spec with the mode's natural domain and default no-data handling.
    pub fn new(name: impl Into<String>, mode: AggregationMode) -> Self {
        Self {
            name: name.into(),
            mode,
            domain: mode.natural_domain(),
            nodata_policy: NoDataPolicy::Exclude,
            source_nodata: None,
            target_nodata: default_target_nodata(),
        }
    }

    pub fn weighted_sum(name: impl Into<String>) -> Self {
        Self::new(name, AggregationMode::WeightedSum)
    }

    pub fn weighted_mean(name: impl Into<String>) -> Self {
        Self::new(name, AggregationMode::WeightedMean)
    }

    pub fn fraction(name: impl Into<String>, category: i64) -> Self {
        Self::new(name, AggregationMode::Fraction { category })
    }

    pub fn mode(name: impl Into<String>) -> Self {
        Self::new(name, AggregationMode::Mode)
    }

    pub fn with_domain(mut self, domain: ValueDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_policy(mut self, policy: NoDataPolicy) -> Self {
        self.nodata_policy = policy;
        self
    }

    pub fn with_source_nodata(mut self, nodata: f32) -> Self {
        self.source_nodata = Some(nodata);
        self
    }

    pub fn with_target_nodata(mut self, nodata: f64) -> Self {
        self.target_nodata = nodata;
        self
    }

    /// Check the mode against the declared domain and the output sentinel
    /// against the values the mode can produce.
    pub fn validate(&self) -> Result<()> {
        if self.mode.natural_domain() != self.domain {
            return Err(RegridError::incompatible_domain(self.mode, self.domain));
        }
        if self.target_nodata == 0.0 {
            return Err(RegridError::ConfigError(format!(
                "{}: target no-data must not be zero",
                self.name
            )));
        }
        if matches!(self.mode, AggregationMode::Fraction { .. })
            && (0.0..=1.0).contains(&self.target_nodata)
        {
            return Err(RegridError::ConfigError(format!(
                "{}: target no-data {} collides with valid fractions",
                self.name, self.target_nodata
            )));
        }
        if self.target_nodata.is_infinite() {
            return Err(RegridError::ConfigError(format!(
                "{}: target no-data must be finite or NaN",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether a source value is no-data for this variable.
    #[inline]
    pub fn is_source_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.source_nodata == Some(value)
    }
}

/// Running totals for one target cell.
#[derive(Debug, Default)]
pub(crate) struct CellAccumulator {
    weighted: f64,
    area: f64,
    matched: f64,
    valid: usize,
    missing: usize,
    categories: BTreeMap<i64, f64>,
}

impl CellAccumulator {
    pub(crate) fn reset(&mut self) {
        self.weighted = 0.0;
        self.area = 0.0;
        self.matched = 0.0;
        self.valid = 0;
        self.missing = 0;
        self.categories.clear();
    }

    /// Add one source cell; returns whether it was no-data.
    #[inline]
    pub(crate) fn push(&mut self, spec: &AggregationSpec, value: f32, area: f64) -> Result<bool> {
        if spec.is_source_nodata(value) {
            self.missing += 1;
            return Ok(true);
        }
        self.valid += 1;
        self.area += area;
        match spec.mode {
            AggregationMode::WeightedSum | AggregationMode::WeightedMean => {
                self.weighted += value as f64 * area;
            }
            AggregationMode::Fraction { category } => {
                if category_code(value)? == category {
                    self.matched += area;
                }
            }
            AggregationMode::Mode => {
                *self.categories.entry(category_code(value)?).or_insert(0.0) += area;
            }
        }
        Ok(false)
    }

    /// Reduce the collected cells to the output value.
    ///
    /// A majority category equal to the target sentinel is an error, since
    /// the cell could not be told apart from a missing one.
    pub(crate) fn finish(&self, spec: &AggregationSpec) -> Result<f64> {
        if self.valid == 0 {
            return Ok(spec.target_nodata);
        }
        if self.missing > 0 && spec.nodata_policy == NoDataPolicy::Propagate {
            return Ok(spec.target_nodata);
        }
        let value = match spec.mode {
            AggregationMode::WeightedSum => self.weighted,
            // Valid cells with zero total weight carry no information.
            AggregationMode::WeightedMean if self.area > 0.0 => self.weighted / self.area,
            AggregationMode::Fraction { .. } if self.area > 0.0 => self.matched / self.area,
            AggregationMode::Mode if self.area > 0.0 => match majority_category(&self.categories) {
                Some(code) if code as f64 == spec.target_nodata => {
                    return Err(RegridError::ConfigError(format!(
                        "{}: category {code} collides with the target no-data value",
                        spec.name
                    )));
                }
                Some(code) => code as f64,
                None => spec.target_nodata,
            },
            _ => spec.target_nodata,
        };
        Ok(value)
    }
}

/// Category with the largest area; ties within [`TIE_TOLERANCE`] go to the
/// lowest code.
fn majority_category(categories: &BTreeMap<i64, f64>) -> Option<i64> {
    let mut best: Option<(i64, f64)> = None;
    // BTreeMap iterates in ascending code order, so only a strictly larger
    // area may replace the current best.
    for (&code, &area) in categories {
        match best {
            Some((_, best_area)) if area - best_area <= TIE_TOLERANCE * area.max(best_area) => {}
            _ => best = Some((code, area)),
        }
    }
    best.map(|(code, _)| code)
}

/// Integer category code of a categorical source value.
#[inline]
fn category_code(value: f32) -> Result<i64> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(RegridError::InvalidCategory(value));
    }
    Ok(value as i64)
}

/// Reduce a set of `(value, area)` source cells into one target value.
///
/// This is the per-cell kernel used by the regridder, exposed for callers
/// that aggregate irregular footprints.
pub fn reduce_cells<I>(spec: &AggregationSpec, cells: I) -> Result<f64>
where
    I: IntoIterator<Item = (f32, f64)>,
{
    spec.validate()?;
    let mut acc = CellAccumulator::default();
    for (value, area) in cells {
        acc.push(spec, value, area)?;
    }
    acc.finish(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_mean_excludes_nodata() {
        let spec = AggregationSpec::weighted_mean("soc").with_source_nodata(-9999.0);
        let cells = [(2.0, 1.0), (4.0, 3.0), (-9999.0, 10.0), (f32::NAN, 5.0)];
        let value = reduce_cells(&spec, cells).unwrap();
        assert!((value - 14.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_sum() {
        let spec = AggregationSpec::weighted_sum("agb");
        let value = reduce_cells(&spec, [(2.0, 1.5), (1.0, 2.0), (f32::NAN, 7.0)]).unwrap();
        assert!((value - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_fraction() {
        let spec = AggregationSpec::fraction("forest", 50);
        let value = reduce_cells(&spec, [(50.0, 1.0), (10.0, 2.0), (50.0, 1.0)]).unwrap();
        assert!((value - 0.5).abs() < 1e-12);

        let none = reduce_cells(&spec, [(10.0, 1.0)]).unwrap();
        assert_eq!(none, 0.0);
    }

    #[test]
    fn test_mode_majority_by_area_not_count() {
        let spec = AggregationSpec::mode("ecozone");
        // Three small cells of class 1 lose to one large cell of class 2.
        let value = reduce_cells(&spec, [(1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (2.0, 5.0)]).unwrap();
        assert_eq!(value, 2.0);
    }

    #[test]
    fn test_mode_tie_goes_to_lowest_code() {
        let spec = AggregationSpec::mode("ecozone");
        let cells = [(7.0, 2.0), (3.0, 1.0), (5.0, 2.0), (3.0, 1.0)];
        assert_eq!(reduce_cells(&spec, cells).unwrap(), 3.0);
        let reversed = [(3.0, 1.0), (5.0, 2.0), (3.0, 1.0), (7.0, 2.0)];
        assert_eq!(reduce_cells(&spec, reversed).unwrap(), 3.0);
    }

    #[test]
    fn test_all_nodata_is_nodata_in_every_mode() {
        let cells = [(f32::NAN, 1.0), (-1.0, 2.0)];
        for spec in [
            AggregationSpec::weighted_sum("a"),
            AggregationSpec::weighted_mean("b"),
            AggregationSpec::fraction("c", 1),
            AggregationSpec::mode("d"),
        ] {
            let spec = spec.with_source_nodata(-1.0).with_target_nodata(-9999.0);
            assert_eq!(reduce_cells(&spec, cells).unwrap(), -9999.0, "{}", spec.mode);
        }
    }

    #[test]
    fn test_propagate_policy() {
        let spec = AggregationSpec::weighted_mean("t").with_policy(NoDataPolicy::Propagate);
        assert!(reduce_cells(&spec, [(1.0, 1.0), (f32::NAN, 1.0)]).unwrap().is_nan());
        assert_eq!(reduce_cells(&spec, [(1.0, 1.0), (3.0, 1.0)]).unwrap(), 2.0);
    }

    #[test]
    fn test_zero_weight_mean_is_nodata() {
        let spec = AggregationSpec::weighted_mean("t");
        assert!(reduce_cells(&spec, [(1.0, 0.0)]).unwrap().is_nan());
        let sum = AggregationSpec::weighted_sum("s");
        assert_eq!(reduce_cells(&sum, [(1.0, 0.0)]).unwrap(), 0.0);
    }

    #[test]
    fn test_domain_validation() {
        let mean_on_classes =
            AggregationSpec::weighted_mean("lc").with_domain(ValueDomain::Categorical);
        assert!(matches!(
            mean_on_classes.validate(),
            Err(RegridError::IncompatibleDomain { .. })
        ));
        let mode_on_numbers = AggregationSpec::mode("x").with_domain(ValueDomain::Continuous);
        assert!(mode_on_numbers.validate().is_err());
        assert!(AggregationSpec::fraction("f", 1).validate().is_ok());
    }

    #[test]
    fn test_fraction_sentinel_must_not_collide() {
        let spec = AggregationSpec::fraction("f", 1).with_target_nodata(0.0);
        assert!(spec.validate().is_err());
        let spec = AggregationSpec::fraction("f", 1).with_target_nodata(-1.0);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_zero_sentinel_rejected_in_every_mode() {
        for spec in [
            AggregationSpec::weighted_sum("s"),
            AggregationSpec::weighted_mean("m"),
            AggregationSpec::fraction("f", 1),
            AggregationSpec::mode("lc"),
        ] {
            assert!(matches!(
                spec.with_target_nodata(0.0).validate(),
                Err(RegridError::ConfigError(_))
            ));
        }
        let sum = AggregationSpec::weighted_sum("s").with_target_nodata(-9999.0);
        assert_eq!(reduce_cells(&sum, [(0.0, 2.0)]).unwrap(), 0.0);
    }

    #[test]
    fn test_mode_category_equal_to_sentinel_rejected() {
        let spec = AggregationSpec::mode("lc").with_target_nodata(255.0);
        assert!(matches!(
            reduce_cells(&spec, [(255.0, 3.0), (10.0, 1.0)]),
            Err(RegridError::ConfigError(_))
        ));
        assert_eq!(reduce_cells(&spec, [(255.0, 1.0), (10.0, 3.0)]).unwrap(), 10.0);
    }

    #[test]
    fn test_non_integer_category_rejected() {
        let spec = AggregationSpec::mode("lc");
        assert!(matches!(
            reduce_cells(&spec, [(1.5, 1.0)]),
            Err(RegridError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_mode_from_parts() {
        assert_eq!(
            AggregationMode::from_parts("SUM", None).unwrap(),
            AggregationMode::WeightedSum
        );
        assert_eq!(
            AggregationMode::from_parts("fraction", Some(4)).unwrap(),
            AggregationMode::Fraction { category: 4 }
        );
        assert!(AggregationMode::from_parts("fraction", None).is_err());
        assert!(AggregationMode::from_parts("median", None).is_err());
        assert_eq!(ValueDomain::from_name("Categorical"), Some(ValueDomain::Categorical));
    }
}
