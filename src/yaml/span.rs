//! Format-preserving item spans in block-style YAML documents.
//!
//! Restoring one automation or script must not reformat the rest of the
//! live file, so this module never re-serializes an AST. It finds the exact
//! textual span of a top-level item — list entry (`automations.yaml`) or map
//! entry (`scripts.yaml`) — and splices a replacement span from another
//! document into it. Span boundaries:
//!
//! * start is the item's own delimiter (the `-` line or the `key:` line),
//!   extended backward over contiguous preceding blank and comment lines so
//!   an item's documentation travels with it;
//! * end is the last content byte of the item; trailing comments are not
//!   absorbed.
//!
//! Lexical enumeration of top-level anchors is index-aligned with the
//! `serde_yaml` parse of the same text: the i-th anchor is the i-th parsed
//! sequence element or mapping entry.

use crate::error::{Result, TimeMachineError};
use crate::yaml::{item_matches, scalar_to_string};
use serde_yaml::Value;

/// Byte range `[start, end)` of one item's full textual representation.
/// Transient; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSpan {
    pub start: usize,
    pub end: usize,
}

/// Splice the item identified by `identifier` from `backup_text` into
/// `live_text`: replace the live item's span when present, append otherwise.
/// Everything outside the affected span is preserved byte for byte.
pub fn restore_item(
    live_text: &str,
    backup_text: &str,
    identifier: &str,
    is_list: bool,
) -> Result<String> {
    // An empty or missing live file starts from an empty-collection seed.
    let live: &str = if live_text.is_empty() {
        if is_list {
            "[]"
        } else {
            "{}"
        }
    } else {
        live_text
    };

    let backup_span = locate_item(backup_text, identifier, is_list)
        .ok_or_else(|| TimeMachineError::ItemNotFoundInBackup(identifier.to_string()))?;
    let snippet = &backup_text[backup_span.start..backup_span.end];

    match locate_item(live, identifier, is_list) {
        Some(span) => Ok(format!(
            "{}{}{}",
            &live[..span.start],
            snippet,
            &live[span.end..]
        )),
        None => {
            let separator = if !live.is_empty() && !live.ends_with('\n') {
                "\n"
            } else {
                ""
            };
            Ok(format!("{live}{separator}{snippet}"))
        }
    }
}

/// Find the full span of the item matching `identifier` (by `id` then
/// `alias` for list items, by key for map items). `None` when the document
/// does not parse, is not the expected shape, or holds no such item.
pub fn locate_item(text: &str, identifier: &str, is_list: bool) -> Option<ItemSpan> {
    let parsed: Value = serde_yaml::from_str(text).ok()?;
    let index = if is_list {
        parsed
            .as_sequence()?
            .iter()
            .position(|item| item_matches(item, identifier))?
    } else {
        parsed
            .as_mapping()?
            .iter()
            .position(|(key, _)| scalar_to_string(key).is_some_and(|k| k == identifier))?
    };

    let (anchor, end) = *top_level_spans(text, is_list).get(index)?;
    Some(ItemSpan {
        start: absorb_leading(text, anchor),
        end,
    })
}

/// Byte ranges of each top-level item in document order: (anchor line start,
/// end of last content line). Blank and comment lines never open or close an
/// item on their own.
fn top_level_spans(text: &str, is_list: bool) -> Vec<(usize, usize)> {
    let lines = line_offsets(text);
    let mut spans = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let (start, end) = lines[i];
        if !is_anchor(&text[start..end], is_list) {
            i += 1;
            continue;
        }

        let mut last_content_end = end;
        let mut j = i + 1;
        while j < lines.len() {
            let (ls, le) = lines[j];
            let line = &text[ls..le];
            if is_anchor(line, is_list) {
                break;
            }
            let trimmed = line.trim();
            let blank = trimmed.is_empty();
            let comment = trimmed.starts_with('#');
            let indented = line.starts_with(' ') || line.starts_with('\t');
            if !blank && !comment && !indented {
                // Column-zero content that is not an anchor (e.g. a document
                // marker) closes the item as well.
                break;
            }
            if !blank && !comment {
                last_content_end = le;
            }
            j += 1;
        }

        spans.push((start, last_content_end));
        i = j;
    }
    spans
}

/// Does this line open a top-level item?
fn is_anchor(line: &str, is_list: bool) -> bool {
    let bytes = line.as_bytes();
    if bytes.is_empty() || bytes[0] == b' ' || bytes[0] == b'\t' {
        return false;
    }
    if is_list {
        // The item delimiter: a column-zero dash followed by whitespace or
        // end of line. Excludes the `---` document marker.
        bytes[0] == b'-' && (bytes.len() == 1 || bytes[1] == b' ' || bytes[1] == b'\t')
    } else {
        // A column-zero key line. Excludes comments, dashes/document
        // markers, the `...` document end and `%` directives.
        bytes[0] != b'#' && bytes[0] != b'-' && bytes[0] != b'%' && line != "..."
    }
}

/// Extend `start` (a line start) backward over contiguous preceding blank
/// and comment lines. The first other line halts the scan.
fn absorb_leading(text: &str, mut start: usize) -> usize {
    let bytes = text.as_bytes();
    while start > 0 {
        debug_assert_eq!(bytes[start - 1], b'\n');
        let line_end = start - 1;
        let mut line_start = line_end;
        while line_start > 0 && bytes[line_start - 1] != b'\n' {
            line_start -= 1;
        }
        let line = text[line_start..line_end].trim();
        if line.is_empty() || line.starts_with('#') {
            start = line_start;
        } else {
            break;
        }
    }
    start
}

/// (start, end) byte offsets of each line, end excluding the newline.
fn line_offsets(text: &str) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            lines.push((start, i));
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push((start, text.len()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = "\
# Morning routines
- id: a
  alias: Wake up
  trigger: 2
- id: b
  alias: Bedtime
  trigger: 3

# unrelated trailing comment
- id: c
  trigger: 4
";

    const BACKUP: &str = "\
- id: a
  alias: Wake up
  trigger: 1
- id: b
  alias: Bedtime (old)
  trigger: 9
";

    #[test]
    fn test_replace_preserves_everything_outside_span() {
        let restored = restore_item(LIVE, BACKUP, "b", true).unwrap();
        let expected = "\
# Morning routines
- id: a
  alias: Wake up
  trigger: 2
- id: b
  alias: Bedtime (old)
  trigger: 9

# unrelated trailing comment
- id: c
  trigger: 4
";
        assert_eq!(restored, expected);
    }

    #[test]
    fn test_replace_first_item_keeps_its_comment_ownership() {
        // `# Morning routines` belongs to item a's span on both sides; the
        // backup has no comment, so the restored file loses the live one
        // inside the replaced span and nothing else.
        let restored = restore_item(LIVE, BACKUP, "a", true).unwrap();
        assert!(restored.starts_with("- id: a\n  alias: Wake up\n  trigger: 1\n- id: b"));
        assert!(restored.contains("# unrelated trailing comment"));
    }

    #[test]
    fn test_comment_absorption_carries_leading_lines() {
        let backup = "\
- id: a
  trigger: 1
# waters the garden
# every morning

- id: sprinkler
  trigger: 5
";
        let live = "- id: sprinkler\n  trigger: 6\n";
        let restored = restore_item(live, backup, "sprinkler", true).unwrap();
        assert_eq!(
            restored,
            "# waters the garden\n# every morning\n\n- id: sprinkler\n  trigger: 5\n"
        );
    }

    #[test]
    fn test_trailing_comments_not_absorbed() {
        let span = locate_item(LIVE, "b", true).unwrap();
        let snippet = &LIVE[span.start..span.end];
        assert_eq!(snippet, "- id: b\n  alias: Bedtime\n  trigger: 3");
    }

    #[test]
    fn test_append_without_trailing_newline() {
        let live = "- id: x\n  trigger: 0";
        let restored = restore_item(live, BACKUP, "a", true).unwrap();
        assert_eq!(
            restored,
            "- id: x\n  trigger: 0\n- id: a\n  alias: Wake up\n  trigger: 1"
        );
    }

    #[test]
    fn test_append_with_trailing_newline() {
        let live = "- id: x\n  trigger: 0\n";
        let restored = restore_item(live, BACKUP, "a", true).unwrap();
        assert_eq!(
            restored,
            "- id: x\n  trigger: 0\n- id: a\n  alias: Wake up\n  trigger: 1"
        );
    }

    #[test]
    fn test_empty_live_is_seeded() {
        let restored = restore_item("", BACKUP, "a", true).unwrap();
        assert_eq!(restored, "[]\n- id: a\n  alias: Wake up\n  trigger: 1");
    }

    #[test]
    fn test_map_item_replace() {
        let live = "\
wake_up:
  alias: Wake up
  sequence: []
bedtime:
  alias: Bedtime
  sequence: []
";
        let backup = "\
bedtime:
  alias: Bedtime (backup)
  sequence:
    - delay: 5
";
        let restored = restore_item(live, backup, "bedtime", false).unwrap();
        assert_eq!(
            restored,
            "\
wake_up:
  alias: Wake up
  sequence: []
bedtime:
  alias: Bedtime (backup)
  sequence:
    - delay: 5
"
        );
    }

    #[test]
    fn test_map_item_append() {
        let live = "wake_up:\n  sequence: []\n";
        let backup = "night_mode:\n  sequence:\n    - delay: 1\n";
        let restored = restore_item(live, backup, "night_mode", false).unwrap();
        assert_eq!(
            restored,
            "wake_up:\n  sequence: []\nnight_mode:\n  sequence:\n    - delay: 1"
        );
    }

    #[test]
    fn test_item_missing_from_backup_errors() {
        let err = restore_item(LIVE, BACKUP, "nope", true).unwrap_err();
        assert!(matches!(err, TimeMachineError::ItemNotFoundInBackup(_)));
    }

    #[test]
    fn test_alias_fallback_lookup() {
        let backup = "- alias: Only Alias\n  trigger: 7\n";
        let span = locate_item(backup, "Only Alias", true).unwrap();
        assert_eq!(&backup[span.start..span.end], "- alias: Only Alias\n  trigger: 7");
    }

    #[test]
    fn test_block_scalar_body_stays_inside_span() {
        let text = "\
- id: a
  message: |
    line one

    line two
- id: b
  trigger: 1
";
        let span = locate_item(text, "a", true).unwrap();
        let snippet = &text[span.start..span.end];
        assert!(snippet.ends_with("line two"));
        assert!(!snippet.contains("id: b"));
    }
}
