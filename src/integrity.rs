//! Content integrity verification against a pinned manifest.
//!
//! A skill may ship a `.skillshare-meta.json` manifest mapping
//! skill-relative paths to `"sha256:<hex>"` content hashes. Verification
//! compares on-disk content against the pins and reports tampered,
//! missing, oversize, and unpinned files as findings. A skill without a
//! manifest is simply not verified; absence is not an integrity failure.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::finding::{Finding, Severity};

/// Manifest file name at the skill root. Never itself scanned or pinned.
pub const META_FILE: &str = ".skillshare-meta.json";

/// The parts of `.skillshare-meta.json` integrity cares about.
#[derive(Debug, Default, Deserialize)]
struct MetaManifest {
    #[serde(default)]
    file_hashes: Option<BTreeMap<String, String>>,
}

/// Compute SHA256 of a byte buffer, returned as `"sha256:<hex>"`.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Verify a skill directory against its pinned manifest.
///
/// `walked` is the full relative file list from the orchestrator's walk
/// (used for the unexpected-file check), and `cache` holds byte buffers
/// already read during the walk so pinned files are not re-read.
///
/// Absent manifest, manifest without `file_hashes`, and manifest keys
/// that are absolute or escape the skill root are all skipped silently.
pub fn verify(
    root: &Path,
    walked: &[String],
    cache: &HashMap<String, Vec<u8>>,
    max_file_bytes: u64,
) -> Vec<Finding> {
    let meta_path = root.join(META_FILE);
    let Ok(raw) = std::fs::read(&meta_path) else {
        return Vec::new();
    };
    let manifest: MetaManifest = match serde_json::from_slice(&raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(path = %meta_path.display(), error = %e, "Unparseable manifest, skipping integrity check");
            return Vec::new();
        }
    };
    let Some(hashes) = manifest.file_hashes else {
        return Vec::new();
    };

    let mut findings = Vec::new();

    for (key, expected) in &hashes {
        let Some(rel) = sanitize_key(key) else {
            tracing::debug!(key, "Ignoring unsafe manifest key");
            continue;
        };
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let path = root.join(&rel);

        let Ok(meta) = std::fs::metadata(&path) else {
            findings.push(Finding {
                severity: Severity::Low,
                pattern: "content-missing".to_string(),
                message: format!("pinned file is missing: {rel_str}"),
                file: rel_str,
                line: 0,
                snippet: String::new(),
            });
            continue;
        };

        if meta.len() > max_file_bytes {
            findings.push(Finding {
                severity: Severity::Medium,
                pattern: "content-oversize".to_string(),
                message: format!("pinned file exceeds the scan size limit: {rel_str}"),
                file: rel_str,
                line: 0,
                snippet: String::new(),
            });
            continue;
        }

        let computed = match cache.get(&rel_str) {
            Some(bytes) => sha256_hex(bytes),
            None => match std::fs::read(&path) {
                Ok(bytes) => sha256_hex(&bytes),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read pinned file");
                    findings.push(Finding {
                        severity: Severity::Low,
                        pattern: "content-missing".to_string(),
                        message: format!("pinned file could not be read: {rel_str}"),
                        file: rel_str,
                        line: 0,
                        snippet: String::new(),
                    });
                    continue;
                }
            },
        };

        if computed != *expected {
            findings.push(Finding {
                severity: Severity::Medium,
                pattern: "content-tampered".to_string(),
                message: format!("content hash mismatch for pinned file: {rel_str}"),
                file: rel_str,
                line: 0,
                snippet: String::new(),
            });
        }
    }

    // Unpinned files: everything the walk saw that the manifest does not
    // pin, the manifest itself and hidden files excluded.
    for rel in walked {
        if rel == META_FILE || is_hidden(rel) {
            continue;
        }
        if !hashes.contains_key(rel) {
            findings.push(Finding {
                severity: Severity::Low,
                pattern: "content-unexpected".to_string(),
                message: format!("file is not pinned by the manifest: {rel}"),
                file: rel.clone(),
                line: 0,
                snippet: String::new(),
            });
        }
    }

    findings
}

/// Normalize a manifest key, rejecting absolute paths and keys that
/// escape the skill root.
fn sanitize_key(key: &str) -> Option<PathBuf> {
    let path = Path::new(key);
    if path.is_absolute() || key.starts_with('/') {
        return None;
    }
    let mut out = PathBuf::new();
    let mut depth = 0i32;
    for comp in path.components() {
        match comp {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
                out.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() { None } else { Some(out) }
}

/// Any path segment starting with '.' counts as hidden.
fn is_hidden(rel: &str) -> bool {
    rel.split('/').any(|seg| seg.starts_with('.'))
}
