//! Audit configuration: scan limits, threshold, and config file loading.
//!
//! The config file lives at `~/.config/skillshare/config.toml`. An absent
//! file yields defaults; a present but malformed file is a loud error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::finding::Severity;

/// Resource bounds applied while walking a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Files larger than this are excluded from the scan entirely.
    pub max_file_bytes: u64,
    /// Directory depth below the skill root.
    pub max_depth: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 1_000_000,
            max_depth: 6,
        }
    }
}

/// Effective engine configuration for one scan run.
#[derive(Debug, Clone, Copy)]
pub struct AuditConfig {
    pub limits: ScanLimits,
    /// Severity at or above which a skill is recorded as blocked.
    pub threshold: Severity,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            limits: ScanLimits::default(),
            threshold: Severity::Critical,
        }
    }
}

/// On-disk configuration file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub audit: AuditSection,
    pub rules: RulesSection,
}

/// `[audit]` section: threshold and scan limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    pub threshold: Option<String>,
    pub max_file_bytes: Option<u64>,
    pub max_depth: Option<usize>,
}

/// `[rules]` section: extra rule overlay files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSection {
    pub paths: Vec<PathBuf>,
}

impl FileConfig {
    /// Resolve into an [`AuditConfig`], validating the threshold string.
    pub fn to_audit_config(&self) -> Result<AuditConfig> {
        let mut config = AuditConfig::default();
        if let Some(ref raw) = self.audit.threshold {
            config.threshold = raw
                .parse()
                .map_err(|e: String| Error::Other(format!("invalid threshold: {e}")))?;
        }
        if let Some(bytes) = self.audit.max_file_bytes {
            config.limits.max_file_bytes = bytes;
        }
        if let Some(depth) = self.audit.max_depth {
            config.limits.max_depth = depth;
        }
        Ok(config)
    }
}

/// Configuration directory: `~/.config/skillshare`.
pub fn config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".config").join("skillshare")
}

/// Load configuration from the default location, or defaults if absent.
pub fn load_config() -> Result<FileConfig> {
    let path = config_dir().join("config.toml");
    if !path.is_file() {
        return Ok(FileConfig::default());
    }
    load_config_from(&path)
}

/// Load configuration from a specific path (for testing).
pub fn load_config_from(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: FileConfig = toml::from_str(&raw).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(config)
}
