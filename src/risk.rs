//! Risk scoring and labeling.
//!
//! Findings are folded into a bounded score (severity weights, saturating
//! at 100) and a label. The label honors a severity floor: a skill with a
//! HIGH finding is never labeled below "high" regardless of how small its
//! score is.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Severity};

/// Aggregate risk label for a skill, least severe first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    #[default]
    Clean,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLabel::Clean => write!(f, "clean"),
            RiskLabel::Low => write!(f, "low"),
            RiskLabel::Medium => write!(f, "medium"),
            RiskLabel::High => write!(f, "high"),
            RiskLabel::Critical => write!(f, "critical"),
        }
    }
}

/// Sum of severity weights, saturating at 100.
pub fn score(findings: &[Finding]) -> u32 {
    let total: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    total.min(100)
}

/// Label implied by the score alone.
pub fn score_label(score: u32) -> RiskLabel {
    match score {
        0 => RiskLabel::Clean,
        1..=25 => RiskLabel::Low,
        26..=50 => RiskLabel::Medium,
        51..=75 => RiskLabel::High,
        _ => RiskLabel::Critical,
    }
}

/// Label floor implied by the most severe finding present.
pub fn severity_floor(findings: &[Finding]) -> RiskLabel {
    match findings.iter().map(|f| f.severity).min() {
        Some(Severity::Critical) => RiskLabel::Critical,
        Some(Severity::High) => RiskLabel::High,
        Some(Severity::Medium) => RiskLabel::Medium,
        Some(Severity::Low) => RiskLabel::Low,
        _ => RiskLabel::Clean,
    }
}

/// Final label: the more severe of the score label and the severity floor.
pub fn label(findings: &[Finding]) -> RiskLabel {
    score_label(score(findings)).max(severity_floor(findings))
}

/// True when any finding is at or above the given severity threshold.
pub fn has_severity_at_or_above(findings: &[Finding], threshold: Severity) -> bool {
    findings.iter().any(|f| f.severity.rank() <= threshold.rank())
}
