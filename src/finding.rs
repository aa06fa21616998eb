//! Core value types for audit findings.
//!
//! A [`Finding`] is a plain value with its location encoded as a
//! skill-relative path string and a 1-based line number; skill-wide
//! findings use `"."` and line 0. Findings never hold references back
//! into the report that owns them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a finding, most severe first.
///
/// Declaration order doubles as the rank: `Critical` compares lowest, so
/// `findings.iter().map(|f| f.severity).min()` yields the most severe
/// severity present.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Numeric rank: 0 for `Critical` through 4 for `Info`.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Weight contributed to the risk score.
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 15,
            Severity::Medium => 8,
            Severity::Low => 3,
            Severity::Info => 1,
        }
    }

    /// All severities, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Parse one of the five canonical severity strings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MEDIUM" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            "INFO" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A single security observation produced by the audit engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Pattern family name (e.g. "credential-access"). Findings from the
    /// same family share this name even when produced by different rules.
    pub pattern: String,
    /// Human-readable description.
    pub message: String,
    /// Path relative to the skill root, or "." for skill-wide findings.
    pub file: String,
    /// 1-based line number, or 0 for skill-wide findings.
    pub line: usize,
    /// Trimmed, truncated copy of the matched line.
    pub snippet: String,
}

impl Finding {
    /// A finding anchored to a specific line of a file.
    pub fn at_line(
        severity: Severity,
        pattern: &str,
        message: impl Into<String>,
        file: &str,
        line: usize,
        raw_line: &str,
    ) -> Self {
        Finding {
            severity,
            pattern: pattern.to_string(),
            message: message.into(),
            file: file.to_string(),
            line,
            snippet: snippet_of(raw_line),
        }
    }

    /// A finding that applies to the whole skill (file ".", line 0).
    pub fn skill_wide(severity: Severity, pattern: &str, message: impl Into<String>) -> Self {
        Finding {
            severity,
            pattern: pattern.to_string(),
            message: message.into(),
            file: ".".to_string(),
            line: 0,
            snippet: String::new(),
        }
    }
}

/// Maximum snippet length in bytes before truncation.
const SNIPPET_MAX: usize = 120;

/// Trim a matched line and truncate it for display.
pub fn snippet_of(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.len() <= SNIPPET_MAX {
        return trimmed.to_string();
    }
    // Cut on a char boundary at or below the limit.
    let mut end = SNIPPET_MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_order() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Medium < Severity::Low);
        assert!(Severity::Low < Severity::Info);
        assert_eq!(Severity::Critical.rank(), 0);
        assert_eq!(Severity::Info.rank(), 4);
    }

    #[test]
    fn test_severity_weights() {
        let weights: Vec<u32> = Severity::ALL.iter().map(|s| s.weight()).collect();
        assert_eq!(weights, vec![25, 15, 8, 3, 1]);
    }

    #[test]
    fn test_severity_parse_case_insensitive() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("Medium".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_snippet_trims_and_truncates() {
        assert_eq!(snippet_of("  echo hi  "), "echo hi");

        let long = "x".repeat(200);
        let s = snippet_of(&long);
        assert!(s.len() <= SNIPPET_MAX + 3);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let s = snippet_of(&long);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn test_skill_wide_finding_shape() {
        let f = Finding::skill_wide(Severity::Critical, "tier-stealth", "stealth commands");
        assert_eq!(f.file, ".");
        assert_eq!(f.line, 0);
        assert!(f.snippet.is_empty());
    }
}
