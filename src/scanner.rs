//! Line-oriented pattern scanning over file contents.
//!
//! Two modes: raw content scanning, and Markdown scanning which adds
//! fence tracking plus tutorial-context suppression. Documentation that
//! demonstrates dangerous commands inside code blocks, example-named
//! paths, or marker phrases would otherwise drown real findings in noise;
//! only a fixed set of pattern families participates in suppression, so
//! prompt injection and credential access always fire.

use crate::finding::Finding;
use crate::markdown::FenceTracker;
use crate::rules::RuleSet;

/// Pattern families eligible for tutorial-context suppression.
const SUPPRESSIBLE: &[&str] = &[
    "dynamic-code-exec",
    "shell-execution",
    "destructive-commands",
    "suspicious-fetch",
    "system-writes",
    "insecure-http",
    "escape-obfuscation",
    "hidden-unicode",
    "fetch-with-pipe",
];

/// Path segments that indicate documentation/example material.
const TUTORIAL_SEGMENTS: &[&str] =
    &["reference", "references", "examples", "templates", "resources"];

/// Phrases that mark a line as illustrative rather than operational.
const TUTORIAL_MARKERS: &[&str] = &[
    "for example",
    "e.g.",
    "example:",
    "attacker:",
    "vulnerable:",
    "ok:",
    "sink:",
    "message:",
    "ruleid:",
];

/// Scan raw (non-Markdown) content against all line rules.
pub fn scan_content(content: &str, file: &str, rules: &RuleSet) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for rule in rules.line_rules() {
            if rule.matches(line) {
                findings.push(Finding::at_line(
                    rule.severity,
                    &rule.pattern,
                    rule.message.clone(),
                    file,
                    idx + 1,
                    line,
                ));
            }
        }
    }
    findings
}

/// Scan Markdown content: fence-aware, with tutorial suppression.
pub fn scan_markdown(content: &str, file: &str, rules: &RuleSet) -> Vec<Finding> {
    let tutorial_path = path_is_tutorial(file);
    let mut tracker = FenceTracker::new();
    let mut findings = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        tracker.observe(line);
        let in_block = tracker.in_block();
        let mut tutorial_line = None;

        for rule in rules.line_rules() {
            if !rule.matches(line) {
                continue;
            }
            if SUPPRESSIBLE.contains(&rule.pattern.as_str()) {
                let tutorial =
                    *tutorial_line.get_or_insert_with(|| line_is_tutorial(line));
                if in_block || tutorial_path || tutorial {
                    continue;
                }
            }
            findings.push(Finding::at_line(
                rule.severity,
                &rule.pattern,
                rule.message.clone(),
                file,
                idx + 1,
                line,
            ));
        }
    }
    findings
}

/// True when any path segment names documentation/example material.
fn path_is_tutorial(file: &str) -> bool {
    file.split(['/', '\\'])
        .any(|seg| TUTORIAL_SEGMENTS.contains(&seg.to_ascii_lowercase().as_str()))
}

/// True when the line carries a tutorial marker phrase.
fn line_is_tutorial(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    TUTORIAL_MARKERS.iter().any(|m| lower.contains(m))
}
