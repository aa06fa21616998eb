//! Line-oriented Markdown structure tracking.
//!
//! The audit engine is deliberately not a CommonMark parser; it tracks
//! just enough structure for correct scanning: fenced code blocks
//! (``` and ~~~, with matched closing markers) and inline backtick code
//! spans. Everything else is treated as prose.

/// Fence marker kind. A block opened with one kind is only closed by the
/// same kind; a mismatched marker is literal content inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceKind {
    Backtick,
    Tilde,
}

/// Classification of one line fed through [`FenceTracker::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Ordinary prose outside any fenced block.
    Text,
    /// An opening or closing fence marker line.
    Marker,
    /// A line inside a fenced block; carries the block's info string
    /// (language tag), lowercased.
    Code(String),
}

/// Tracks fenced-code-block state across the lines of one file.
#[derive(Debug, Default)]
pub struct FenceTracker {
    open: Option<OpenFence>,
}

#[derive(Debug)]
struct OpenFence {
    kind: FenceKind,
    len: usize,
    lang: String,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while inside a fenced block (marker lines excluded).
    pub fn in_block(&self) -> bool {
        self.open.is_some()
    }

    /// Feed the next line and classify it.
    pub fn observe(&mut self, line: &str) -> LineKind {
        let trimmed = line.trim_start();
        match &self.open {
            Some(fence) => {
                let (open_kind, open_len) = (fence.kind, fence.len);
                let lang = fence.lang.clone();
                if let Some((kind, len, rest)) = parse_marker(trimmed)
                    && kind == open_kind
                    && len >= open_len
                    && rest.trim().is_empty()
                {
                    self.open = None;
                    return LineKind::Marker;
                }
                LineKind::Code(lang)
            }
            None => {
                if let Some((kind, len, rest)) = parse_marker(trimmed) {
                    self.open = Some(OpenFence {
                        kind,
                        len,
                        lang: rest.trim().to_ascii_lowercase(),
                    });
                    return LineKind::Marker;
                }
                LineKind::Text
            }
        }
    }
}

/// Parse a fence marker at the start of a trimmed line: a run of at least
/// three backticks or tildes. Returns (kind, run length, info string).
fn parse_marker(trimmed: &str) -> Option<(FenceKind, usize, &str)> {
    let (kind, ch) = if trimmed.starts_with("```") {
        (FenceKind::Backtick, '`')
    } else if trimmed.starts_with("~~~") {
        (FenceKind::Tilde, '~')
    } else {
        return None;
    };
    let len = trimmed.chars().take_while(|&c| c == ch).count();
    Some((kind, len, &trimmed[len..]))
}

/// Byte ranges of inline code spans in a line, delimiters included.
///
/// A span opens with a run of N backticks and closes at the next run of
/// exactly N backticks, per Markdown's tick-count matching. Unclosed
/// openers produce no span.
pub fn code_span_ranges(line: &str) -> Vec<(usize, usize)> {
    let runs = backtick_runs(line);
    let mut spans = Vec::new();
    let mut i = 0;
    while i < runs.len() {
        let (start, len) = runs[i];
        let mut closed = false;
        for (j, &(close_start, close_len)) in runs.iter().enumerate().skip(i + 1) {
            if close_len == len {
                spans.push((start, close_start + close_len));
                i = j + 1;
                closed = true;
                break;
            }
        }
        if !closed {
            i += 1;
        }
    }
    spans
}

/// True when byte position `pos` lies inside an inline code span.
pub fn in_code_span(spans: &[(usize, usize)], pos: usize) -> bool {
    spans.iter().any(|&(s, e)| pos >= s && pos < e)
}

fn backtick_runs(line: &str) -> Vec<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'`' {
                i += 1;
            }
            runs.push((start, i - start));
        } else {
            i += 1;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(content: &str) -> Vec<LineKind> {
        let mut tracker = FenceTracker::new();
        content.lines().map(|l| tracker.observe(l)).collect()
    }

    #[test]
    fn test_backtick_fence_opens_and_closes() {
        let kinds = kinds("text\n```sh\necho hi\n```\nafter");
        assert_eq!(
            kinds,
            vec![
                LineKind::Text,
                LineKind::Marker,
                LineKind::Code("sh".to_string()),
                LineKind::Marker,
                LineKind::Text,
            ]
        );
    }

    #[test]
    fn test_mismatched_marker_does_not_close() {
        let kinds = kinds("```\ncode\n~~~\nstill code\n```");
        assert_eq!(kinds[2], LineKind::Code(String::new()));
        assert_eq!(kinds[3], LineKind::Code(String::new()));
        assert_eq!(kinds[4], LineKind::Marker);
    }

    #[test]
    fn test_shorter_run_does_not_close() {
        let kinds = kinds("````\ncode\n```\nstill\n````");
        assert_eq!(kinds[2], LineKind::Code(String::new()));
        assert_eq!(kinds[4], LineKind::Marker);
    }

    #[test]
    fn test_tilde_fence_with_language() {
        let kinds = kinds("~~~bash\nrm -rf /\n~~~");
        assert_eq!(kinds[1], LineKind::Code("bash".to_string()));
    }

    #[test]
    fn test_indented_fence_marker() {
        let kinds = kinds("  ```\ncode\n  ```");
        assert_eq!(kinds[0], LineKind::Marker);
        assert_eq!(kinds[2], LineKind::Marker);
    }

    #[test]
    fn test_code_span_single_ticks() {
        let spans = code_span_ranges("use `curl` here");
        assert_eq!(spans.len(), 1);
        assert!(in_code_span(&spans, 5));
        assert!(!in_code_span(&spans, 0));
    }

    #[test]
    fn test_code_span_tick_count_matching() {
        // ``a ` b`` is one span delimited by double ticks.
        let line = "x ``a ` b`` y";
        let spans = code_span_ranges(line);
        assert_eq!(spans.len(), 1);
        let (s, e) = spans[0];
        assert_eq!(&line[s..e], "``a ` b``");
    }

    #[test]
    fn test_unclosed_span_is_ignored() {
        let spans = code_span_ranges("a ` b");
        assert!(spans.is_empty());
    }
}
