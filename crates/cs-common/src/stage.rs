//! Pipeline stages.

use serde::{Deserialize, Serialize};

/// Processing stages of a claimscope run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Startup, configuration resolution.
    Init,
    /// Reading the record table from its source.
    Load,
    /// Assigning semantic roles to columns.
    Classify,
    /// Role-specific transforms into a numeric table.
    Normalize,
    /// Standardize, impute, project.
    Reduce,
    /// Mixture fit, log-density, anomaly partition.
    Score,
    /// Handing artifacts to the reporter.
    Export,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [PipelineStage; 7] = [
        PipelineStage::Init,
        PipelineStage::Load,
        PipelineStage::Classify,
        PipelineStage::Normalize,
        PipelineStage::Reduce,
        PipelineStage::Score,
        PipelineStage::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Init => "init",
            PipelineStage::Load => "load",
            PipelineStage::Classify => "classify",
            PipelineStage::Normalize => "normalize",
            PipelineStage::Reduce => "reduce",
            PipelineStage::Score => "score",
            PipelineStage::Export => "export",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
