//! Scan orchestration: walking a skill directory, dispatching file
//! contents to the scanners, and assembling the final [`AuditReport`].
//!
//! A report is created at scan start, mutated only here, finalized by
//! risk aggregation, and immutable afterwards. Per-file read failures are
//! swallowed (the file is skipped and degrades analyzability); input
//! errors on the skill root itself propagate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AuditConfig;
use crate::dataflow;
use crate::error::{Error, Result};
use crate::finding::{Finding, Severity};
use crate::integrity::{self, META_FILE};
use crate::links;
use crate::risk::{self, RiskLabel};
use crate::rules::RuleSet;
use crate::scanner;
use crate::tiers::{self, TierProfile};

/// File extensions whose content is scanned. Extensionless files (often
/// shell) are scanned too; everything else only contributes to size
/// accounting.
const SCANNABLE_EXTENSIONS: &[&str] = &[
    "md", "txt", "yaml", "yml", "json", "toml", "sh", "bash", "zsh", "fish", "py", "js", "ts",
    "rb", "go", "rs",
];

/// Analyzability below this ratio earns an informational finding.
const LOW_ANALYZABILITY: f64 = 0.70;

/// The audit result for one skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub skill_name: String,
    pub scan_target: String,
    pub findings: Vec<Finding>,
    pub total_bytes: u64,
    pub auditable_bytes: u64,
    /// auditable / total, or 1.0 for an empty skill.
    pub analyzability: f64,
    pub tier_profile: TierProfile,
    pub risk_score: u32,
    pub risk_label: RiskLabel,
    pub threshold: Severity,
    pub is_blocked: bool,
}

impl AuditReport {
    fn new(name: String, target: String, threshold: Severity) -> Self {
        AuditReport {
            skill_name: name,
            scan_target: target,
            findings: Vec::new(),
            total_bytes: 0,
            auditable_bytes: 0,
            analyzability: 1.0,
            tier_profile: TierProfile::default(),
            risk_score: 0,
            risk_label: RiskLabel::Clean,
            threshold,
            is_blocked: false,
        }
    }

    /// True if any finding is at or above `threshold`.
    pub fn has_severity_at_or_above(&self, threshold: Severity) -> bool {
        risk::has_severity_at_or_above(&self.findings, threshold)
    }

    pub fn has_critical(&self) -> bool {
        self.has_severity_at_or_above(Severity::Critical)
    }

    /// Compute score, label, and blocked flag. The report is final after
    /// this call.
    fn finalize(&mut self) {
        self.risk_score = risk::score(&self.findings);
        self.risk_label = risk::label(&self.findings);
        self.is_blocked = self.has_severity_at_or_above(self.threshold);
    }
}

/// Audit one skill directory.
pub fn scan_skill(root: &Path, rules: &RuleSet, config: &AuditConfig) -> Result<AuditReport> {
    let meta = std::fs::metadata(root).map_err(|_| Error::SkillPath {
        path: root.to_path_buf(),
    })?;
    if !meta.is_dir() {
        return Err(Error::SkillPath {
            path: root.to_path_buf(),
        });
    }

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());
    let mut report = AuditReport::new(name, root.display().to_string(), config.threshold);

    let files = walk_files(root, config.limits.max_depth);
    let mut walked_rels: Vec<String> = Vec::with_capacity(files.len());
    let mut content_cache: HashMap<String, Vec<u8>> = HashMap::new();
    let mut markdown_files: Vec<(String, String)> = Vec::new();

    for path in &files {
        let rel = relative_name(root, path);
        walked_rels.push(rel.clone());

        if rel == META_FILE {
            continue;
        }

        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat file, skipping");
                continue;
            }
        };
        if size > config.limits.max_file_bytes {
            tracing::debug!(path = %path.display(), size, "File exceeds scan size limit, skipping");
            continue;
        }
        report.total_bytes += size;

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        let scannable = match ext.as_deref() {
            Some(ext) => SCANNABLE_EXTENSIONS.contains(&ext),
            None => true,
        };
        if !scannable {
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read file, skipping");
                continue;
            }
        };
        if is_binary(&bytes) {
            tracing::debug!(path = %path.display(), "Binary content, skipping");
            continue;
        }

        let content = String::from_utf8_lossy(&bytes).into_owned();
        report.auditable_bytes += content.len() as u64;

        let is_markdown = ext.as_deref() == Some("md");
        let pattern_findings = if is_markdown {
            scanner::scan_markdown(&content, &rel, rules)
        } else {
            scanner::scan_content(&content, &rel, rules)
        };
        report.findings.extend(pattern_findings);

        let profile = if is_markdown {
            tiers::detect_tiers_in_markdown(&content)
        } else {
            tiers::detect_tiers(&content)
        };
        report.tier_profile.merge(&profile);

        let taint_findings = match ext.as_deref() {
            Some("sh" | "bash" | "zsh") => dataflow::track_shell(&content, &rel),
            Some("md") => dataflow::track_markdown(&content, &rel),
            _ => Vec::new(),
        };
        let deduped = dataflow::dedup_against(taint_findings, &report.findings);
        report.findings.extend(deduped);

        if is_markdown {
            markdown_files.push((rel.clone(), content));
        }
        content_cache.insert(rel, bytes);
    }

    // Post-walk phases, in fixed order: link rules, dangling links,
    // integrity, tier combinations, analyzability.
    let mut extracted: Vec<(String, Vec<links::MarkdownLink>)> = Vec::new();
    for (rel, content) in &markdown_files {
        extracted.push((rel.clone(), links::extract_links(content)));
    }
    for (rel, file_links) in &extracted {
        let link_findings = links::evaluate_link_rules(file_links, rel, rules);
        report.findings.extend(link_findings);
    }
    for (rel, file_links) in &extracted {
        let dangling = links::check_dangling(root, rel, file_links);
        report.findings.extend(dangling);
    }

    report.findings.extend(integrity::verify(
        root,
        &walked_rels,
        &content_cache,
        config.limits.max_file_bytes,
    ));

    report
        .findings
        .extend(tiers::combination_findings(&report.tier_profile));

    report.analyzability = if report.total_bytes == 0 {
        1.0
    } else {
        report.auditable_bytes as f64 / report.total_bytes as f64
    };
    if report.total_bytes > 0 && report.analyzability < LOW_ANALYZABILITY {
        report.findings.push(Finding::skill_wide(
            Severity::Info,
            "low-analyzability",
            format!(
                "only {:.0}% of skill content could be analyzed",
                report.analyzability * 100.0
            ),
        ));
    }

    report.finalize();
    tracing::debug!(
        skill = %report.skill_name,
        findings = report.findings.len(),
        score = report.risk_score,
        label = %report.risk_label,
        "Scan complete"
    );
    Ok(report)
}

/// Walk a skill directory in sorted order, bounded depth, pruning hidden
/// directories (but not the root itself). Walk errors on a subtree are
/// swallowed with a warning.
pub fn walk_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_into(root, 0, max_depth, &mut out);
    out
}

fn walk_into(dir: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to read directory, skipping subtree");
            return;
        }
    };
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if name.starts_with('.') {
                continue;
            }
            walk_into(&path, depth + 1, max_depth, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

/// Skill-relative path with forward slashes.
fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// NUL byte in the first 512 bytes marks a file as binary.
fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(512).any(|&b| b == 0)
}
