use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::Field;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub mode: AnalysisMode,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub review: ReviewConfig,
}

fn default_name() -> String {
    "pwa-recon".into()
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            mode: AnalysisMode::default(),
            quality: QualityConfig::default(),
            review: ReviewConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis mode
// ---------------------------------------------------------------------------

/// Which fields measure similarity between two scans of the same subject.
///
/// Fixed for a whole run and passed explicitly to the pair selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Peripheral systolic, diastolic and mean pressure.
    PeripheralTriplet,
    /// Peripheral systolic pressure only; ties broken on diastolic closeness.
    #[default]
    SystolicOnly,
}

impl AnalysisMode {
    pub fn fields(&self) -> &'static [Field] {
        match self {
            Self::PeripheralTriplet => &[
                Field::PeripheralSystolic,
                Field::PeripheralDiastolic,
                Field::PeripheralMean,
            ],
            Self::SystolicOnly => &[Field::PeripheralSystolic],
        }
    }

    /// One-dimensional distances tie often; only then is the diastolic
    /// difference consulted.
    pub fn breaks_ties_on_diastolic(&self) -> bool {
        matches!(self, Self::SystolicOnly)
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeripheralTriplet => write!(f, "peripheral_triplet"),
            Self::SystolicOnly => write!(f, "systolic_only"),
        }
    }
}

// ---------------------------------------------------------------------------
// Quality + Review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityConfig {
    /// Largest tolerated pressure difference inside a pair (exclusive).
    #[serde(default = "default_max_pressure_delta")]
    pub max_pressure_delta: f64,
    /// Text written into every field of a single-record placeholder row.
    #[serde(default = "default_unavailable_marker")]
    pub unavailable_marker: String,
}

fn default_max_pressure_delta() -> f64 {
    5.0
}

fn default_unavailable_marker() -> String {
    "N/A".into()
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_pressure_delta: default_max_pressure_delta(),
            unavailable_marker: default_unavailable_marker(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewConfig {
    /// Subjects with at least this many records are offered for manual review.
    #[serde(default = "default_min_records")]
    pub min_records: usize,
}

fn default_min_records() -> usize {
    3
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            min_records: default_min_records(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let delta = self.quality.max_pressure_delta;
        if !delta.is_finite() || delta < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "quality.max_pressure_delta must be a finite number >= 0, got {delta}"
            )));
        }

        if self.quality.unavailable_marker.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "quality.unavailable_marker must not be empty".into(),
            ));
        }

        // A pair needs two records, so fewer than two is never reviewable
        if self.review.min_records < 2 {
            return Err(ReconError::ConfigValidation(format!(
                "review.min_records must be at least 2, got {}",
                self.review.min_records
            )));
        }

        Ok(())
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
