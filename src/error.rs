//! Consolidated error types for the skillshare-audit library.
//!
//! All library modules use `crate::error::{Error, Result}`. The binary
//! crate (`main.rs`) uses `anyhow` where appropriate. Per-file read
//! failures during a scan are deliberately NOT represented here: they are
//! swallowed by the orchestrator and degrade analyzability instead of
//! failing the scan.

use std::path::PathBuf;

use crate::finding::Severity;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for skillshare-audit library operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- Scan input --
    #[error("skill path does not exist or is not a directory: {path}")]
    SkillPath { path: PathBuf },

    // -- Rule loading --
    #[error("failed to read rule file at {path}: {source}")]
    RulesRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse rule file at {path}: {source}")]
    RulesParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("rule '{id}': invalid regex: {source}")]
    RuleRegex { id: String, source: regex::Error },
    #[error("rule '{id}': unknown severity '{value}'")]
    RuleSeverity { id: String, value: String },
    #[error("rule '{id}': missing required field '{field}'")]
    RuleField { id: String, field: &'static str },

    // -- Config --
    #[error("failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // -- Policy sentinel --
    // Not produced by the engine itself; callers that want blocked-skill
    // enforcement can surface it and test for it downstream.
    #[error("skill '{name}' has findings at or above {threshold}")]
    Blocked { name: String, threshold: Severity },

    // -- Generic --
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Allow converting `std::io::Error` into `Error` for `?` in simple cases.
impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            context: "I/O error".to_string(),
            source,
        }
    }
}
