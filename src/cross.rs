//! Cross-skill capability analysis.
//!
//! A single skill can look harmless while a pair of installed skills
//! forms an attack: one reads credentials, another talks to the network.
//! This pass derives a capability vector from each per-skill report and
//! flags dangerous pairings across the whole batch in a synthetic
//! `_cross-skill` report.

use crate::audit::AuditReport;
use crate::config::AuditConfig;
use crate::finding::{Finding, Severity};
use crate::risk;
use crate::tiers::CommandTier;

/// Name of the synthetic report carrying cross-skill findings.
pub const CROSS_SKILL_NAME: &str = "_cross-skill";

/// Security-relevant booleans derived from one skill's report.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub name: String,
    pub reads_credentials: bool,
    pub sends_over_network: bool,
    pub uses_privilege: bool,
    pub uses_stealth: bool,
    /// Any finding at HIGH or above.
    pub high_risk: bool,
}

/// Derive the capability vector for one skill.
pub fn capabilities(report: &AuditReport) -> Capabilities {
    let reads_credentials = report
        .findings
        .iter()
        .any(|f| f.pattern == "credential-access" || f.pattern == "dataflow-taint");
    Capabilities {
        name: report.skill_name.clone(),
        reads_credentials,
        sends_over_network: report.tier_profile.count(CommandTier::Network) > 0,
        uses_privilege: report.tier_profile.count(CommandTier::Privilege) > 0,
        uses_stealth: report.tier_profile.count(CommandTier::Stealth) > 0,
        high_risk: risk::has_severity_at_or_above(&report.findings, Severity::High),
    }
}

/// Analyze a batch of reports for dangerous capability pairings.
///
/// Returns a synthetic report (name `_cross-skill`, analyzability 1.0,
/// risk computed normally) when any pairing fires, `None` otherwise.
pub fn analyze(reports: &[AuditReport], config: &AuditConfig) -> Option<AuditReport> {
    let vectors: Vec<Capabilities> = reports.iter().map(capabilities).collect();
    let mut findings = Vec::new();

    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            pair_findings(&vectors[i], &vectors[j], &mut findings);
            pair_findings(&vectors[j], &vectors[i], &mut findings);
        }
    }

    if findings.is_empty() {
        return None;
    }

    let mut report = AuditReport {
        skill_name: CROSS_SKILL_NAME.to_string(),
        scan_target: String::new(),
        findings,
        total_bytes: 0,
        auditable_bytes: 0,
        analyzability: 1.0,
        tier_profile: Default::default(),
        risk_score: 0,
        risk_label: Default::default(),
        threshold: config.threshold,
        is_blocked: false,
    };
    report.risk_score = risk::score(&report.findings);
    report.risk_label = risk::label(&report.findings);
    report.is_blocked = risk::has_severity_at_or_above(&report.findings, report.threshold);
    Some(report)
}

/// Directional pairing rules: `a` is the reader/privileged/stealthy side,
/// `b` the sender/risky side.
fn pair_findings(a: &Capabilities, b: &Capabilities, findings: &mut Vec<Finding>) {
    // Credential reader paired with a network sender that reads nothing
    // itself: classic split exfiltration.
    if a.reads_credentials && !a.sends_over_network && b.sends_over_network && !b.reads_credentials
    {
        findings.push(Finding::skill_wide(
            Severity::High,
            "cross-skill-exfiltration",
            format!(
                "skill '{}' reads credentials while skill '{}' sends over the network",
                a.name, b.name
            ),
        ));
    }

    if a.uses_privilege && !a.sends_over_network && b.sends_over_network && !b.uses_privilege {
        findings.push(Finding::skill_wide(
            Severity::Medium,
            "cross-skill-privilege-network",
            format!(
                "skill '{}' uses privileged commands while skill '{}' sends over the network",
                a.name, b.name
            ),
        ));
    }

    if a.uses_stealth && b.high_risk {
        findings.push(Finding::skill_wide(
            Severity::High,
            "cross-skill-stealth",
            format!(
                "skill '{}' hides traces while skill '{}' carries high-severity findings",
                a.name, b.name
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLabel;
    use crate::tiers::TierProfile;

    fn report(name: &str) -> AuditReport {
        AuditReport {
            skill_name: name.to_string(),
            scan_target: format!("/skills/{name}"),
            findings: Vec::new(),
            total_bytes: 100,
            auditable_bytes: 100,
            analyzability: 1.0,
            tier_profile: TierProfile::default(),
            risk_score: 0,
            risk_label: RiskLabel::Clean,
            threshold: Severity::Critical,
            is_blocked: false,
        }
    }

    fn reader() -> AuditReport {
        let mut r = report("reader");
        r.findings.push(Finding::at_line(
            Severity::High,
            "credential-access",
            "reads ssh keys",
            "run.sh",
            1,
            "cat ~/.ssh/id_rsa",
        ));
        r
    }

    fn sender() -> AuditReport {
        let mut r = report("sender");
        r.tier_profile.record(CommandTier::Network);
        r
    }

    #[test]
    fn test_exfiltration_pair() {
        let out = analyze(&[reader(), sender()], &AuditConfig::default())
            .expect("pairing should fire");
        assert_eq!(out.skill_name, CROSS_SKILL_NAME);
        assert_eq!(out.analyzability, 1.0);

        let exfil: Vec<_> = out
            .findings
            .iter()
            .filter(|f| f.pattern == "cross-skill-exfiltration")
            .collect();
        assert_eq!(exfil.len(), 1, "got: {:?}", out.findings);
        assert_eq!(exfil[0].severity, Severity::High);
        assert!(exfil[0].message.contains("reader"));
        assert!(exfil[0].message.contains("sender"));
        assert_eq!(exfil[0].file, ".");
        assert_eq!(exfil[0].line, 0);
    }

    #[test]
    fn test_exfiltration_pair_needs_asymmetry() {
        // A skill that both reads and sends is self-contained; the pair
        // rule only fires on the split shape.
        let mut both = reader();
        both.tier_profile.record(CommandTier::Network);

        let out = analyze(&[both, sender()], &AuditConfig::default());
        assert!(
            out.as_ref()
                .map(|r| !r
                    .findings
                    .iter()
                    .any(|f| f.pattern == "cross-skill-exfiltration"))
                .unwrap_or(true),
            "got: {out:?}"
        );
    }

    #[test]
    fn test_privilege_network_pair() {
        let mut privileged = report("admin");
        privileged.tier_profile.record(CommandTier::Privilege);

        let out = analyze(&[privileged, sender()], &AuditConfig::default()).unwrap();
        let hits: Vec<_> = out
            .findings
            .iter()
            .filter(|f| f.pattern == "cross-skill-privilege-network")
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].severity, Severity::Medium);
    }

    #[test]
    fn test_stealth_pair_fires_both_directions() {
        let mut stealthy_risky = report("a");
        stealthy_risky.tier_profile.record(CommandTier::Stealth);
        stealthy_risky.findings.push(Finding::at_line(
            Severity::High,
            "data-exfiltration",
            "x",
            "f",
            1,
            "s",
        ));

        let mut other = report("b");
        other.tier_profile.record(CommandTier::Stealth);
        other.findings.push(Finding::at_line(
            Severity::Critical,
            "prompt-injection",
            "x",
            "f",
            1,
            "s",
        ));

        let out = analyze(&[stealthy_risky, other], &AuditConfig::default()).unwrap();
        let stealth: Vec<_> = out
            .findings
            .iter()
            .filter(|f| f.pattern == "cross-skill-stealth")
            .collect();
        assert_eq!(stealth.len(), 2, "both directions hold: {stealth:?}");
    }

    #[test]
    fn test_clean_batch_returns_none() {
        let out = analyze(&[report("a"), report("b")], &AuditConfig::default());
        assert!(out.is_none());
    }

    #[test]
    fn test_single_skill_never_pairs() {
        let out = analyze(&[reader()], &AuditConfig::default());
        assert!(out.is_none());
    }

    #[test]
    fn test_synthetic_report_risk_computed() {
        let out = analyze(&[reader(), sender()], &AuditConfig::default()).unwrap();
        assert!(out.risk_score > 0);
        assert!(out.risk_label >= RiskLabel::High);
    }
}
