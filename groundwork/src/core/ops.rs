//! Pure text edits applied to a single [`TextBuffer`].
//!
//! These functions perform no I/O. `path` is only used to label failures.

use std::path::Path;

use serde::Serialize;

use crate::core::anchor::Anchor;
use crate::core::buffer::{TextBuffer, text_lines};
use crate::error::StepError;

/// Default comment marker for Ruby, YAML and shell dialects.
pub const DEFAULT_COMMENT_MARKER: &str = "#";

/// Where injected text lands relative to the anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Before,
    After,
}

/// Insert `text` as whole lines before or after the first line matching `anchor`.
///
/// Returns the index of the anchor line as it was before insertion.
pub fn inject_anchored(
    buffer: &mut TextBuffer,
    path: &Path,
    anchor: &Anchor,
    position: Position,
    text: &str,
) -> Result<usize, StepError> {
    let index = anchor
        .find_line(&buffer.lines)?
        .ok_or_else(|| anchor_not_found(path, anchor))?;
    let at = match position {
        Position::Before => index,
        Position::After => index + 1,
    };
    let inserted = text_lines(text);
    buffer.lines.splice(at..at, inserted);
    Ok(index)
}

/// Replace the first match of `pattern` with `replacement` (taken literally).
///
/// Returns `false` and leaves the buffer untouched when the pattern is absent.
pub fn replace_first(
    buffer: &mut TextBuffer,
    pattern: &Anchor,
    replacement: &str,
) -> Result<bool, StepError> {
    let text = buffer.to_text();
    let Some(span) = pattern.find_span(&text, 0)? else {
        return Ok(false);
    };
    let mut updated = String::with_capacity(text.len() + replacement.len());
    updated.push_str(&text[..span.start]);
    updated.push_str(replacement);
    updated.push_str(&text[span.end..]);
    buffer.set_text(&updated);
    Ok(true)
}

/// Replace the span from the first `start` match through the first `end`
/// match that follows it.
pub fn replace_range(
    buffer: &mut TextBuffer,
    path: &Path,
    start: &Anchor,
    end: &Anchor,
    replacement: &str,
) -> Result<(), StepError> {
    let text = buffer.to_text();
    let start_span = start
        .find_span(&text, 0)?
        .ok_or_else(|| anchor_not_found(path, start))?;
    let end_span = end
        .find_span(&text, start_span.end)?
        .ok_or_else(|| anchor_not_found(path, end))?;
    let mut updated = String::with_capacity(text.len());
    updated.push_str(&text[..start_span.start]);
    updated.push_str(replacement);
    updated.push_str(&text[end_span.end..]);
    buffer.set_text(&updated);
    Ok(())
}

pub fn append(buffer: &mut TextBuffer, text: &str) {
    let mut updated = buffer.to_text();
    updated.push_str(text);
    buffer.set_text(&updated);
}

pub fn prepend(buffer: &mut TextBuffer, text: &str) {
    let mut updated = text.to_string();
    updated.push_str(&buffer.to_text());
    buffer.set_text(&updated);
}

/// Remove the comment marker from every line that is a commented-out `target`.
///
/// Indentation before the marker is kept. Returns the number of lines changed.
pub fn uncomment_line(
    buffer: &mut TextBuffer,
    path: &Path,
    target: &str,
    marker: &str,
) -> Result<usize, StepError> {
    let target = target.trim();
    let mut changed = 0;
    for line in &mut buffer.lines {
        let body = line.trim_start();
        let indent_len = line.len() - body.len();
        let Some(rest) = body.strip_prefix(marker) else {
            continue;
        };
        let rest = rest.trim_start();
        if rest.trim_end() != target {
            continue;
        }
        let uncommented = format!("{}{}", &line[..indent_len], rest.trim_end());
        *line = uncommented;
        changed += 1;
    }
    if changed == 0 {
        return Err(StepError::AnchorNotFound {
            path: path.to_path_buf(),
            anchor: format!("commented line {:?}", format!("{marker} {target}")),
        });
    }
    Ok(changed)
}

/// Drop every line containing `marker` and every whitespace-only line.
pub fn strip_comments_and_blank_lines(buffer: &mut TextBuffer, marker: &str) {
    buffer
        .lines
        .retain(|line| !line.contains(marker) && !line.trim().is_empty());
    buffer.trailing_newline = !buffer.lines.is_empty();
}

fn anchor_not_found(path: &Path, anchor: &Anchor) -> StepError {
    StepError::AnchorNotFound {
        path: path.to_path_buf(),
        anchor: anchor.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(text: &str) -> TextBuffer {
        TextBuffer::from_text(text)
    }

    fn path() -> &'static Path {
        Path::new("config/application.rb")
    }

    #[test]
    fn inject_after_places_lines_directly_below_first_match() {
        let mut buf = buffer("a\nanchor\nb\nanchor\n");
        inject_anchored(
            &mut buf,
            path(),
            &Anchor::literal("anchor"),
            Position::After,
            "x\ny\n",
        )
        .expect("inject");
        assert_eq!(buf.to_text(), "a\nanchor\nx\ny\nb\nanchor\n");
    }

    #[test]
    fn inject_before_keeps_prefix_identical() {
        let original = "head\nclass App\nend\n";
        let mut buf = buffer(original);
        inject_anchored(
            &mut buf,
            path(),
            &Anchor::pattern("^end$"),
            Position::Before,
            "  body",
        )
        .expect("inject");
        assert_eq!(buf.to_text(), "head\nclass App\n  body\nend\n");
        assert_eq!(&buf.lines[..2], &buffer(original).lines[..2]);
    }

    #[test]
    fn inject_missing_anchor_fails_and_leaves_buffer() {
        let mut buf = buffer("a\nb\n");
        let err = inject_anchored(
            &mut buf,
            path(),
            &Anchor::literal("nope"),
            Position::After,
            "x",
        )
        .unwrap_err();
        assert!(matches!(err, StepError::AnchorNotFound { .. }));
        assert_eq!(buf.to_text(), "a\nb\n");
    }

    #[test]
    fn replace_first_only_touches_first_match() {
        let mut buf = buffer("x = false\ny = false\n");
        let replaced = replace_first(&mut buf, &Anchor::literal("false"), "true").expect("replace");
        assert!(replaced);
        assert_eq!(buf.to_text(), "x = true\ny = false\n");
    }

    #[test]
    fn replace_first_absent_pattern_is_noop() {
        let mut buf = buffer("x = 1\n");
        let replaced = replace_first(&mut buf, &Anchor::pattern("y = \\d"), "z").expect("replace");
        assert!(!replaced);
        assert_eq!(buf.to_text(), "x = 1\n");
    }

    #[test]
    fn replace_first_can_delete_a_line() {
        let mut buf = buffer("<head>\n<!-- note -->\n<title>\n");
        replace_first(&mut buf, &Anchor::pattern("<!--.+-->\n"), "").expect("replace");
        assert_eq!(buf.to_text(), "<head>\n<title>\n");
    }

    #[test]
    fn replace_range_collapses_region() {
        let mut buf = buffer("a\nBEGIN\nb\nEND\nc");
        replace_range(
            &mut buf,
            path(),
            &Anchor::literal("BEGIN"),
            &Anchor::literal("END"),
            "X",
        )
        .expect("replace range");
        assert_eq!(buf.to_text(), "a\nX\nc");
    }

    #[test]
    fn replace_range_pairs_end_after_start() {
        let mut buf = buffer("END\nBEGIN\nEND\ntail\n");
        replace_range(
            &mut buf,
            path(),
            &Anchor::literal("BEGIN"),
            &Anchor::literal("END"),
            "X",
        )
        .expect("replace range");
        assert_eq!(buf.to_text(), "END\nX\ntail\n");
    }

    #[test]
    fn replace_range_line_start_end_skips_rest_of_start_line() {
        let mut buf = buffer("x = 1\n2\n");
        replace_range(
            &mut buf,
            path(),
            &Anchor::literal("x = "),
            &Anchor::pattern(r"(?m)^\d"),
            "X",
        )
        .expect("replace range");
        assert_eq!(buf.to_text(), "X\n");
    }

    #[test]
    fn replace_range_requires_both_ends() {
        let mut buf = buffer("a\nBEGIN\nb\n");
        let err = replace_range(
            &mut buf,
            path(),
            &Anchor::literal("BEGIN"),
            &Anchor::literal("END"),
            "X",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StepError::AnchorNotFound { ref anchor, .. } if anchor.contains("END")
        ));

        let err = replace_range(
            &mut buffer("a\n"),
            path(),
            &Anchor::literal("BEGIN"),
            &Anchor::literal("END"),
            "X",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StepError::AnchorNotFound { ref anchor, .. } if anchor.contains("BEGIN")
        ));
    }

    #[test]
    fn append_and_prepend_work_on_raw_text() {
        let mut buf = buffer("body\n");
        prepend(&mut buf, "require \"smtp\"\n");
        append(&mut buf, "tail\n");
        assert_eq!(buf.to_text(), "require \"smtp\"\nbody\ntail\n");
    }

    #[test]
    fn uncomment_keeps_indentation() {
        let mut buf = buffer("  # config.raise = true\n  # other\n");
        let changed =
            uncomment_line(&mut buf, path(), "config.raise = true", "#").expect("uncomment");
        assert_eq!(changed, 1);
        assert_eq!(buf.to_text(), "  config.raise = true\n  # other\n");
    }

    #[test]
    fn uncomment_without_commented_target_fails() {
        let mut buf = buffer("  config.raise = true\n");
        let err = uncomment_line(&mut buf, path(), "config.raise = true", "#").unwrap_err();
        assert!(matches!(err, StepError::AnchorNotFound { .. }));
    }

    #[test]
    fn strip_removes_comments_and_blank_lines() {
        let mut buf = buffer("# header\nmodule App\n\n  x = 1 # note\n   \n  y = 2\nend\n");
        strip_comments_and_blank_lines(&mut buf, "#");
        assert_eq!(buf.to_text(), "module App\n  y = 2\nend\n");
    }

    #[test]
    fn strip_is_idempotent() {
        let mut once = buffer("a\n\n# c\nb  \n#\n");
        strip_comments_and_blank_lines(&mut once, "#");
        let mut twice = once.clone();
        strip_comments_and_blank_lines(&mut twice, "#");
        assert_eq!(once, twice);
        assert!(twice.lines.iter().all(|l| !l.contains('#') && !l.trim().is_empty()));
    }
}
