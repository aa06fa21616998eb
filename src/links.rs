//! Markdown link extraction and link checking.
//!
//! Recovers inline links, autolinks, reference-style links, HTML anchors,
//! and the two-line `[label]` / `(target)` form from Markdown, skipping
//! fenced code blocks and inline code spans. Extracted links feed two
//! checks: link-scope rules from the rule store (matched against the
//! canonical `[label](target)` string) and the dangling-link check for
//! local targets that do not exist on disk.
//!
//! Reference definitions are resolved from a line-based pre-parse;
//! CommonMark-exact semantics inside nested constructs are not attempted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::finding::{Finding, Severity};
use crate::markdown::{FenceTracker, LineKind, code_span_ranges, in_code_span};
use crate::rules::RuleSet;

/// A link recovered from Markdown content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub label: String,
    pub target: String,
    /// 1-based line of the label.
    pub line: usize,
}

impl MarkdownLink {
    /// Canonical form matched by link-scope rules.
    pub fn canonical(&self) -> String {
        format!("[{}]({})", self.label, self.target)
    }
}

/// `[ref]: target` definition line.
static REF_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]:\s*(\S+)").unwrap());

/// `<https://...>` autolink.
static AUTOLINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^>\s]+)>").unwrap());

/// `<a href="...">label</a>` anchor, either quote style.
static HTML_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a>"#).unwrap()
});

/// Any HTML tag, for stripping anchor labels.
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Extract all links from a Markdown document.
pub fn extract_links(content: &str) -> Vec<MarkdownLink> {
    let lines: Vec<&str> = content.lines().collect();

    let mut tracker = FenceTracker::new();
    let prose: Vec<bool> = lines
        .iter()
        .map(|l| matches!(tracker.observe(l), LineKind::Text))
        .collect();

    // Pre-parse reference definitions so forward references resolve.
    let mut defs: HashMap<String, String> = HashMap::new();
    for (i, line) in lines.iter().enumerate() {
        if prose[i]
            && let Some(caps) = REF_DEF.captures(line)
        {
            defs.insert(normalize_label(&caps[1]), caps[2].to_string());
        }
    }

    let mut links = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !prose[i] || REF_DEF.is_match(line) {
            continue;
        }
        let lineno = i + 1;
        let spans = code_span_ranges(line);

        collect_bracketed(line, lineno, &spans, &defs, &mut links);
        collect_autolinks(line, lineno, &spans, &mut links);
        collect_html_anchors(line, lineno, &spans, &mut links);

        // Two-line form: a line holding only "[label]", target parens on
        // the next non-fence line.
        if let Some(label) = lone_bracket_label(line)
            && let Some(j) = (i + 1..lines.len()).find(|&j| prose[j])
            && let Some(target) = leading_paren_target(lines[j])
        {
            links.push(MarkdownLink {
                label: label.to_string(),
                target,
                line: lineno,
            });
        }
    }
    links
}

/// Evaluate link-scope rules against each link's canonical form.
pub fn evaluate_link_rules(links: &[MarkdownLink], file: &str, rules: &RuleSet) -> Vec<Finding> {
    let mut findings = Vec::new();
    for link in links {
        let canon = link.canonical();
        for rule in rules.link_rules() {
            if rule.matches(&canon) {
                findings.push(Finding::at_line(
                    rule.severity,
                    &rule.pattern,
                    rule.message.clone(),
                    file,
                    link.line,
                    &canon,
                ));
            }
        }
    }
    findings
}

/// URL schemes and forms that are never checked against the filesystem.
const EXTERNAL_PREFIXES: &[&str] =
    &["http://", "https://", "mailto:", "tel:", "data:", "ftp:", "//"];

/// Flag local link targets that do not resolve to a file on disk.
pub fn check_dangling(root: &Path, file: &str, links: &[MarkdownLink]) -> Vec<Finding> {
    let dir = Path::new(file).parent().unwrap_or_else(|| Path::new(""));
    let mut findings = Vec::new();

    for link in links {
        let target = link.target.trim();
        if target.is_empty() || target.starts_with('#') {
            continue;
        }
        let lower = target.to_ascii_lowercase();
        if EXTERNAL_PREFIXES.iter().any(|p| lower.starts_with(p)) || lower.contains("://") {
            continue;
        }

        let path_part = target.split(['#', '?']).next().unwrap_or("");
        if path_part.is_empty() {
            continue;
        }
        let resolved = if let Some(rooted) = path_part.strip_prefix('/') {
            root.join(rooted)
        } else {
            root.join(dir).join(path_part)
        };
        if !resolved.exists() {
            findings.push(Finding::at_line(
                Severity::Low,
                "dangling-link",
                format!("link target does not exist: {target}"),
                file,
                link.line,
                &link.canonical(),
            ));
        }
    }
    findings
}

// -- Structural parsing helpers --

/// Collect inline `[label](target)` and reference `[label][ref]` links.
fn collect_bracketed(
    line: &str,
    lineno: usize,
    spans: &[(usize, usize)],
    defs: &HashMap<String, String>,
    out: &mut Vec<MarkdownLink>,
) {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'[' || in_code_span(spans, i) || is_escaped(bytes, i) {
            i += 1;
            continue;
        }

        // Image: skip "![label](target)" wholesale.
        if i > 0 && bytes[i - 1] == b'!' && !is_escaped(bytes, i - 1) {
            match matching_bracket(bytes, i) {
                Some(close) => {
                    i = close + 1;
                    if i < bytes.len()
                        && bytes[i] == b'('
                        && let Some(p) = matching_paren(bytes, i)
                    {
                        i = p + 1;
                    }
                }
                None => i += 1,
            }
            continue;
        }

        let Some(close) = matching_bracket(bytes, i) else {
            i += 1;
            continue;
        };
        let label = &line[i + 1..close];
        let after = close + 1;

        if after < bytes.len() && bytes[after] == b'(' {
            if let Some(p) = matching_paren(bytes, after) {
                let raw = line[after + 1..p].trim();
                out.push(MarkdownLink {
                    label: label.to_string(),
                    target: strip_angle(raw).to_string(),
                    line: lineno,
                });
                i = p + 1;
                continue;
            }
        } else if after < bytes.len() && bytes[after] == b'[' {
            if let Some(rclose) = matching_bracket(bytes, after) {
                let refname = &line[after + 1..rclose];
                let key = if refname.trim().is_empty() {
                    normalize_label(label)
                } else {
                    normalize_label(refname)
                };
                if let Some(target) = defs.get(&key) {
                    out.push(MarkdownLink {
                        label: label.to_string(),
                        target: target.clone(),
                        line: lineno,
                    });
                }
                i = rclose + 1;
                continue;
            }
        }
        i = close + 1;
    }
}

fn collect_autolinks(
    line: &str,
    lineno: usize,
    spans: &[(usize, usize)],
    out: &mut Vec<MarkdownLink>,
) {
    for caps in AUTOLINK.captures_iter(line) {
        let m = caps.get(0).unwrap();
        if in_code_span(spans, m.start()) {
            continue;
        }
        let url = caps[1].to_string();
        out.push(MarkdownLink {
            label: url.clone(),
            target: url,
            line: lineno,
        });
    }
}

fn collect_html_anchors(
    line: &str,
    lineno: usize,
    spans: &[(usize, usize)],
    out: &mut Vec<MarkdownLink>,
) {
    for caps in HTML_ANCHOR.captures_iter(line) {
        let m = caps.get(0).unwrap();
        if in_code_span(spans, m.start()) {
            continue;
        }
        let target = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let label = HTML_TAG.replace_all(&caps[3], "").trim().to_string();
        out.push(MarkdownLink {
            label,
            target,
            line: lineno,
        });
    }
}

/// The line consists of nothing but one bracketed label.
fn lone_bracket_label(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let bytes = trimmed.as_bytes();
    if bytes.first() != Some(&b'[') || bytes.last() != Some(&b']') {
        return None;
    }
    match matching_bracket(bytes, 0) {
        Some(close) if close == bytes.len() - 1 => Some(&trimmed[1..close]),
        _ => None,
    }
}

/// The line starts with a balanced `(target)` group.
fn leading_paren_target(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('(') {
        return None;
    }
    let close = matching_paren(trimmed.as_bytes(), 0)?;
    Some(strip_angle(trimmed[1..close].trim()).to_string())
}

/// Position of the `]` matching the `[` at `open`, honoring nesting and
/// backslash escapes.
fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        if !is_escaped(bytes, i) {
            match bytes[i] {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Position of the `)` matching the `(` at `open`.
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        if !is_escaped(bytes, i) {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// True when the byte at `pos` is preceded by an odd number of backslashes.
fn is_escaped(bytes: &[u8], pos: usize) -> bool {
    let mut count = 0;
    let mut i = pos;
    while i > 0 && bytes[i - 1] == b'\\' {
        count += 1;
        i -= 1;
    }
    count % 2 == 1
}

/// Strip one layer of `<...>` around a link target.
fn strip_angle(target: &str) -> &str {
    target
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(target)
}

/// Reference label normalization: lowercase, whitespace collapsed.
fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
