//! Report sinks: JSON, SARIF 2.1.0, and Markdown.
//!
//! The engine's `AuditReport` is the single source of truth; sinks only
//! reshape it. SARIF deduplicates rules by pattern name and maps
//! severities onto SARIF levels and GitHub's `security-severity` scale.

use serde_json::{Value, json};

use crate::audit::AuditReport;
use crate::finding::Severity;
use crate::risk::RiskLabel;

/// Pretty JSON for a batch of reports.
pub fn to_json(reports: &[AuditReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Info => "note",
    }
}

fn security_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "9.0",
        Severity::High => "7.0",
        Severity::Medium => "4.0",
        Severity::Low => "2.0",
        Severity::Info => "0.5",
    }
}

/// SARIF 2.1.0 document covering all reports in one run.
pub fn to_sarif(reports: &[AuditReport]) -> Value {
    // One SARIF rule per pattern family, first occurrence wins.
    let mut rule_ids: Vec<&str> = Vec::new();
    let mut rules: Vec<Value> = Vec::new();
    let mut results: Vec<Value> = Vec::new();

    for report in reports {
        for finding in &report.findings {
            if !rule_ids.contains(&finding.pattern.as_str()) {
                rule_ids.push(&finding.pattern);
                rules.push(json!({
                    "id": finding.pattern,
                    "shortDescription": { "text": finding.message },
                    "properties": {
                        "security-severity": security_severity(finding.severity),
                    },
                }));
            }

            let uri = if finding.file == "." {
                report.skill_name.clone()
            } else {
                format!("{}/{}", report.skill_name, finding.file)
            };
            results.push(json!({
                "ruleId": finding.pattern,
                "level": sarif_level(finding.severity),
                "message": { "text": finding.message },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": uri },
                        "region": { "startLine": finding.line.max(1) },
                    },
                }],
            }));
        }
    }

    json!({
        "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "skillshare-audit",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/runkids/skillshare",
                    "rules": rules,
                },
            },
            "results": results,
        }],
    })
}

/// Markdown summary partitioning skills into failed, warned, and clean.
pub fn to_markdown(reports: &[AuditReport]) -> String {
    let failed: Vec<&AuditReport> = reports.iter().filter(|r| is_failed(r)).collect();
    let warned: Vec<&AuditReport> = reports
        .iter()
        .filter(|r| !is_failed(r) && !r.findings.is_empty())
        .collect();
    let clean: Vec<&AuditReport> = reports
        .iter()
        .filter(|r| !is_failed(r) && r.findings.is_empty())
        .collect();

    let mut out = String::new();
    out.push_str("# Skill Audit Report\n\n");
    out.push_str(&format!(
        "{} skill(s) scanned: {} failed, {} with warnings, {} clean.\n",
        reports.len(),
        failed.len(),
        warned.len(),
        clean.len()
    ));

    if !failed.is_empty() {
        out.push_str("\n## Failed\n");
        for report in &failed {
            push_skill_section(&mut out, report);
        }
    }
    if !warned.is_empty() {
        out.push_str("\n## Warnings\n");
        for report in &warned {
            push_skill_section(&mut out, report);
        }
    }
    if !clean.is_empty() {
        out.push_str("\n## Clean\n");
        for report in &clean {
            out.push_str(&format!("- `{}`\n", report.skill_name));
        }
    }
    out
}

fn is_failed(report: &AuditReport) -> bool {
    report.is_blocked || report.risk_label >= RiskLabel::High
}

fn push_skill_section(out: &mut String, report: &AuditReport) {
    out.push_str(&format!(
        "\n### `{}` -- {} (score {}/100)\n\n",
        report.skill_name, report.risk_label, report.risk_score
    ));
    for finding in &report.findings {
        let location = if finding.line > 0 {
            format!("{}:{}", finding.file, finding.line)
        } else {
            finding.file.clone()
        };
        out.push_str(&format!(
            "- **{}** `{}` at `{}`: {}\n",
            finding.severity, finding.pattern, location, finding.message
        ));
    }
}
