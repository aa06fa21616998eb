//! Rule store: loading, overlay merging, and one-shot compilation.
//!
//! Rules come from three tiers, merged in order: built-in (embedded YAML),
//! the global user overlay at `~/.config/skillshare/rules.yaml`, and the
//! project overlay at `./.skillshare-rules.yaml`. Overlays replace fields
//! of a base rule by id; an overlay with `enabled: false` drops the rule
//! after the merge. Compilation happens once per load and fails loudly,
//! naming the offending rule id.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::finding::Severity;

/// Built-in rules, embedded at compile time.
const BUILTIN_RULES: &str = include_str!("builtin_rules.yaml");

/// What a rule's regex is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleScope {
    /// Raw lines of file content.
    #[default]
    Line,
    /// Canonicalized `[label](target)` strings from the link extractor.
    Link,
}

/// A compiled scanning rule.
#[derive(Debug)]
pub struct Rule {
    /// Stable identifier (e.g. "exfil-upload"), unique within the set.
    pub id: String,
    pub severity: Severity,
    /// Pattern family name shared by related rules (e.g. "data-exfiltration").
    pub pattern: String,
    /// Human-readable description.
    pub message: String,
    /// Primary regex; a line matches the rule when this matches.
    pub regex: Regex,
    /// Optional exclusion; a primary match is discarded when this also matches.
    pub exclude: Option<Regex>,
    pub scope: RuleScope,
}

impl Rule {
    /// True when the rule matches `text` (primary hit, no exclusion hit).
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text) && !self.exclude.as_ref().is_some_and(|e| e.is_match(text))
    }
}

/// One `rules:` file on disk (or embedded).
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

/// An uncompiled rule as written in YAML. Overlay entries may be partial;
/// only `id` is always required.
#[derive(Debug, Clone, Deserialize)]
struct RuleSpec {
    id: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    exclude: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    scope: Option<String>,
}

impl RuleSpec {
    /// Overlay `other` onto self: present fields replace, absent fields keep.
    fn apply(&mut self, other: RuleSpec) {
        if other.severity.is_some() {
            self.severity = other.severity;
        }
        if other.pattern.is_some() {
            self.pattern = other.pattern;
        }
        if other.message.is_some() {
            self.message = other.message;
        }
        if other.regex.is_some() {
            self.regex = other.regex;
        }
        if other.exclude.is_some() {
            self.exclude = other.exclude;
        }
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.scope.is_some() {
            self.scope = other.scope;
        }
    }
}

/// An immutable, compiled rule set.
///
/// Compiled once per load and shared read-only across scan workers.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile the built-in rules only.
    pub fn builtin() -> Result<Self> {
        Self::from_specs(parse_specs(BUILTIN_RULES, Path::new("<builtin>"))?)
    }

    /// Load the full three-tier merge: built-in, then the global and
    /// project overlays when present, then any extra overlay files.
    ///
    /// Absent overlay files are skipped; present but malformed ones are
    /// fatal.
    pub fn load(extra: &[PathBuf]) -> Result<Self> {
        let mut overlays: Vec<PathBuf> = vec![global_rules_path(), project_rules_path()];
        overlays.extend(extra.iter().cloned());
        Self::load_with_overlays(&overlays)
    }

    /// Load built-in rules plus a specific overlay list (for testing).
    pub fn load_with_overlays(overlays: &[PathBuf]) -> Result<Self> {
        let mut specs = parse_specs(BUILTIN_RULES, Path::new("<builtin>"))?;
        for path in overlays {
            if !path.is_file() {
                continue;
            }
            let raw = std::fs::read_to_string(path).map_err(|e| Error::RulesRead {
                path: path.clone(),
                source: e,
            })?;
            let overlay = parse_specs(&raw, path)?;
            tracing::debug!(path = %path.display(), rules = overlay.len(), "Merging rule overlay");
            merge_specs(&mut specs, overlay);
        }
        Self::from_specs(specs)
    }

    /// Compile a rule set from a single YAML document (for testing).
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Self::from_specs(parse_specs(raw, Path::new("<inline>"))?)
    }

    fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.enabled == Some(false) {
                continue;
            }
            rules.push(compile(spec)?);
        }
        tracing::debug!(rules = rules.len(), "Compiled rule set");
        Ok(RuleSet { rules })
    }

    /// Rules matched against raw lines.
    pub fn line_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.scope == RuleScope::Line)
    }

    /// Rules matched against canonicalized links.
    pub fn link_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.scope == RuleScope::Link)
    }

    /// Look up a rule by id.
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Global overlay path: `~/.config/skillshare/rules.yaml`.
pub fn global_rules_path() -> PathBuf {
    crate::config::config_dir().join("rules.yaml")
}

/// Project overlay path: `./.skillshare-rules.yaml`.
pub fn project_rules_path() -> PathBuf {
    PathBuf::from(".skillshare-rules.yaml")
}

fn parse_specs(raw: &str, path: &Path) -> Result<Vec<RuleSpec>> {
    let file: RuleFile = serde_yaml::from_str(raw).map_err(|e| Error::RulesParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(file.rules)
}

/// Merge overlay specs into the base list by id, preserving base order.
/// New ids append at the end.
fn merge_specs(base: &mut Vec<RuleSpec>, overlay: Vec<RuleSpec>) {
    for spec in overlay {
        match base.iter_mut().find(|r| r.id == spec.id) {
            Some(existing) => existing.apply(spec),
            None => base.push(spec),
        }
    }
}

fn compile(spec: RuleSpec) -> Result<Rule> {
    let id = spec.id;

    let severity_raw = spec.severity.ok_or_else(|| Error::RuleField {
        id: id.clone(),
        field: "severity",
    })?;
    let severity: Severity = severity_raw.parse().map_err(|_| Error::RuleSeverity {
        id: id.clone(),
        value: severity_raw.clone(),
    })?;

    let regex_raw = spec.regex.ok_or_else(|| Error::RuleField {
        id: id.clone(),
        field: "regex",
    })?;
    let regex = Regex::new(&regex_raw).map_err(|e| Error::RuleRegex {
        id: id.clone(),
        source: e,
    })?;

    let exclude = match spec.exclude {
        Some(raw) => Some(Regex::new(&raw).map_err(|e| Error::RuleRegex {
            id: id.clone(),
            source: e,
        })?),
        None => None,
    };

    let scope = match spec.scope.as_deref() {
        None | Some("line") => RuleScope::Line,
        Some("link") => RuleScope::Link,
        Some(_) => RuleScope::Line,
    };

    Ok(Rule {
        pattern: spec.pattern.clone().unwrap_or_else(|| id.clone()),
        message: spec.message.unwrap_or_else(|| {
            spec.pattern.clone().unwrap_or_else(|| id.clone())
        }),
        id,
        severity,
        regex,
        exclude,
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_compiles() {
        let rules = RuleSet::builtin().expect("built-in rules should compile");
        assert!(!rules.is_empty());
        assert!(rules.get("injection-ignore-instructions").is_some());
    }

    #[test]
    fn test_builtin_has_link_rules() {
        let rules = RuleSet::builtin().unwrap();
        assert!(rules.link_rules().count() >= 2);
        assert!(rules.line_rules().count() > rules.link_rules().count());
    }

    #[test]
    fn test_rule_exclude_suppresses_match() {
        let rules = RuleSet::builtin().unwrap();
        let rule = rules.get("insecure-http-fetch").unwrap();
        assert!(rule.matches("curl http://evil.example.net/x"));
        assert!(!rule.matches("curl http://localhost:8080/x"));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let yaml = r#"
rules:
  - id: broken
    severity: HIGH
    regex: '([unclosed'
"#;
        let err = RuleSet::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("broken"), "error should name the rule: {err}");
    }

    #[test]
    fn test_unknown_severity_is_fatal() {
        let yaml = r#"
rules:
  - id: odd
    severity: FATAL
    regex: 'x'
"#;
        let err = RuleSet::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("FATAL"));
        assert!(err.to_string().contains("odd"));
    }

    #[test]
    fn test_overlay_disables_rule() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("rules.yaml");
        std::fs::write(
            &overlay,
            "rules:\n  - id: insecure-http-fetch\n    enabled: false\n",
        )
        .unwrap();

        let rules = RuleSet::load_with_overlays(&[overlay]).unwrap();
        assert!(rules.get("insecure-http-fetch").is_none());
        assert!(rules.get("exfil-upload").is_some());
    }

    #[test]
    fn test_overlay_replaces_fields() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("rules.yaml");
        std::fs::write(
            &overlay,
            "rules:\n  - id: insecure-http-fetch\n    severity: HIGH\n",
        )
        .unwrap();

        let rules = RuleSet::load_with_overlays(&[overlay]).unwrap();
        let rule = rules.get("insecure-http-fetch").unwrap();
        assert_eq!(rule.severity, Severity::High);
        // Untouched fields survive the overlay.
        assert_eq!(rule.pattern, "insecure-http");
    }

    #[test]
    fn test_overlay_adds_new_rule() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("rules.yaml");
        std::fs::write(
            &overlay,
            concat!(
                "rules:\n",
                "  - id: project-banned-host\n",
                "    severity: MEDIUM\n",
                "    pattern: banned-host\n",
                "    message: Contacts a banned host\n",
                "    regex: 'internal\\.corp\\.example'\n",
            ),
        )
        .unwrap();

        let rules = RuleSet::load_with_overlays(&[overlay]).unwrap();
        let rule = rules.get("project-banned-host").unwrap();
        assert!(rule.matches("curl https://internal.corp.example/x"));
    }

    #[test]
    fn test_overlay_new_rule_without_regex_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("rules.yaml");
        std::fs::write(&overlay, "rules:\n  - id: half-baked\n    severity: LOW\n").unwrap();

        let err = RuleSet::load_with_overlays(&[overlay]).unwrap_err();
        assert!(err.to_string().contains("half-baked"));
        assert!(err.to_string().contains("regex"));
    }

    #[test]
    fn test_absent_overlay_is_skipped() {
        let rules =
            RuleSet::load_with_overlays(&[PathBuf::from("/nonexistent/rules.yaml")]).unwrap();
        assert_eq!(rules.len(), RuleSet::builtin().unwrap().len());
    }
}
