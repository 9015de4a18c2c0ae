//! Pipeline configuration types.
//!
//! Every field has a built-in default, so an empty JSON object is a valid
//! configuration file and partial files only override what they name.

use crate::validate::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema_version: String,
    pub mixture: MixtureConfig,
    pub reduction: ReductionConfig,
    pub anomaly: AnomalyConfig,
    pub schema: SchemaConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            mixture: MixtureConfig::default(),
            reduction: ReductionConfig::default(),
            anomaly: AnomalyConfig::default(),
            schema: SchemaConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Apply command-line overrides on top of the resolved file.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(n) = overrides.n_components {
            self.mixture.n_components = n;
        }
        if let Some(n) = overrides.n_init {
            self.mixture.n_init = n;
        }
        if let Some(seed) = overrides.seed {
            self.mixture.seed = Some(seed);
        }
        if let Some(v) = overrides.variance_retained {
            self.reduction.variance_retained = v;
        }
        if let Some(p) = overrides.percentile {
            self.anomaly.percentile = p;
        }
        if let Some(space) = overrides.export_space {
            self.anomaly.export_space = space;
        }
        self
    }
}

/// Gaussian mixture fit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureConfig {
    /// Number of Gaussian components.
    pub n_components: usize,
    /// Independent restarts; the best lower bound wins.
    pub n_init: usize,
    /// EM iteration cap per restart.
    pub max_iter: usize,
    /// Convergence threshold on the change in mean log-likelihood.
    pub tol: f64,
    /// Non-negative regularisation added to each covariance diagonal.
    pub reg_covar: f64,
    /// Fixed seed for restarts. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            n_components: 5,
            n_init: 10,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Fraction of total variance the projection must retain.
    pub variance_retained: f64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            variance_retained: 0.95,
        }
    }
}

/// Which feature space the anomaly table is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportSpace {
    /// Projected components (`pc_0`, `pc_1`, ...).
    #[default]
    Reduced,
    /// Normalized numeric columns before scaling.
    Normalized,
}

impl std::fmt::Display for ExportSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportSpace::Reduced => write!(f, "reduced"),
            ExportSpace::Normalized => write!(f, "normalized"),
        }
    }
}

impl std::str::FromStr for ExportSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reduced" => Ok(ExportSpace::Reduced),
            "normalized" | "normalised" => Ok(ExportSpace::Normalized),
            other => Err(format!("unknown export space '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Lower-tail percentile of log-density used as the threshold.
    pub percentile: f64,
    pub export_space: ExportSpace,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            percentile: 1.0,
            export_space: ExportSpace::Reduced,
        }
    }
}

/// A derived feature computed as `end - start` over encoded dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDifference {
    pub name: String,
    pub end: String,
    pub start: String,
}

impl DateDifference {
    fn new(name: &str, end: &str, start: &str) -> Self {
        Self {
            name: name.to_string(),
            end: end.to_string(),
            start: start.to_string(),
        }
    }
}

/// Column-name markers and role lists for the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Substring marking date columns.
    pub date_marker: String,
    /// Columns treated as dates even without the marker.
    pub date_aliases: Vec<String>,
    /// Substrings marking diagnosis, procedure and service code columns.
    pub code_markers: Vec<String>,
    /// Substring marking present-on-admission columns.
    pub presence_marker: String,
    /// Fill value for missing presence flags.
    pub presence_missing: String,
    /// Identifier columns dropped before any transform.
    pub identifier_columns: Vec<String>,
    /// Enumerated administrative status columns.
    pub status_columns: Vec<String>,
    /// Fill value for missing status codes.
    pub status_missing: i64,
    pub date_differences: Vec<DateDifference>,
    /// Name of the summed categorical feature.
    pub code_burden_column: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            date_marker: "DT".to_string(),
            date_aliases: owned(&["NCH_ACTV_OR_CVRD_LVL_CARE_THRU"]),
            code_markers: owned(&["DGNS", "PRCDR", "HCPCS"]),
            presence_marker: "POA".to_string(),
            presence_missing: "U".to_string(),
            identifier_columns: owned(&[
                "BENE_ID",
                "CLM_ID",
                "NCH_NEAR_LINE_REC_IDENT_CD",
                "PRVDR_NUM",
                "FI_NUM",
                "PRVDR_STATE_CD",
                "ORG_NPI_NUM",
                "AT_PHYSN_UPIN",
                "AT_PHYSN_NPI",
                "OP_PHYSN_UPIN",
                "OP_PHYSN_NPI",
                "OT_PHYSN_UPIN",
                "OT_PHYSN_NPI",
                "CLM_LINE_NUM",
            ]),
            status_columns: owned(&[
                "NCH_CLM_TYPE_CD",
                "CLAIM_QUERY_CODE",
                "CLM_FAC_TYPE_CD",
                "CLM_SRVC_CLSFCTN_TYPE_CD",
                "CLM_FREQ_CD",
                "CLM_MDCR_NON_PMT_RSN_CD",
                "NCH_PRMRY_PYR_CD",
                "FI_CLM_ACTN_CD",
                "CLM_MCO_PD_SW",
                "PTNT_DSCHRG_STUS_CD",
                "CLM_IP_ADMSN_TYPE_CD",
                "CLM_SRC_IP_ADMSN_CD",
                "NCH_PTNT_STATUS_IND_CD",
                "CLM_DRG_CD",
                "CLM_DRG_OUTLIER_STAY_CD",
                "REV_CNTR",
                "REV_CNTR_DDCTBL_COINSRNC_CD",
                "CLM_PPS_IND_CD",
            ]),
            status_missing: -1,
            date_differences: vec![
                DateDifference::new("length_of_stay", "NCH_BENE_DSCHRG_DT", "CLM_ADMSN_DT"),
                DateDifference::new("statement_days", "CLM_THRU_DT", "CLM_FROM_DT"),
            ],
            code_burden_column: "code_burden".to_string(),
        }
    }
}

/// Command-line overrides layered over the resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub n_components: Option<usize>,
    pub n_init: Option<usize>,
    pub seed: Option<u64>,
    pub variance_retained: Option<f64>,
    pub percentile: Option<f64>,
    pub export_space: Option<ExportSpace>,
}
