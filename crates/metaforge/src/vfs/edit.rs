//! Line-indexed edit modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::store::FsError;

/// How [`VirtualFs::edit_lines`](super::VirtualFs::edit_lines) changes a file.
///
/// Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Replace lines `start..=end` with the new text.
    Replace,
    /// Insert the new text after line `end`; `start` is ignored.
    InsertAfter,
    /// Remove lines `start..=end`.
    Delete,
}

impl EditMode {
    /// The mode's name as written in `edit_file` tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            EditMode::Replace => "replace",
            EditMode::InsertAfter => "insert_after",
            EditMode::Delete => "delete",
        }
    }

    /// Apply this edit to `lines` in place.
    ///
    /// Out-of-range positions pad the file with blank lines for `replace` and
    /// `insert_after`, up to [`MAX_PADDING`] lines past the end; further out
    /// is [`FsError::LineOutOfRange`] and `lines` is left untouched. `delete`
    /// clamps to the end of the file instead.
    pub(crate) fn apply(
        self,
        lines: &mut Vec<String>,
        start: usize,
        end: usize,
        new_lines: Vec<String>,
    ) -> Result<(), FsError> {
        let start_idx = start.saturating_sub(1);
        let count = end.saturating_add(1).saturating_sub(start);
        let stop = start_idx.saturating_add(count);

        match self {
            EditMode::Replace => {
                within_reach(lines.len(), start)?;
                within_reach(lines.len(), end)?;
                pad(lines, start_idx);
                let stop = stop.min(lines.len());
                lines.splice(start_idx..stop, new_lines);
            }
            EditMode::InsertAfter => {
                within_reach(lines.len(), end)?;
                pad(lines, end);
                lines.splice(end..end, new_lines);
            }
            EditMode::Delete => {
                if start_idx < lines.len() {
                    lines.drain(start_idx..stop.min(lines.len()));
                }
            }
        }
        Ok(())
    }
}

/// How many blank lines an edit may add past the end of a file.
pub const MAX_PADDING: usize = 10_000;

fn within_reach(len: usize, line: usize) -> Result<(), FsError> {
    if line > len.saturating_add(MAX_PADDING) {
        return Err(FsError::LineOutOfRange { line, len });
    }
    Ok(())
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(EditMode::Replace),
            "insert_after" => Ok(EditMode::InsertAfter),
            "delete" => Ok(EditMode::Delete),
            other => Err(FsError::UnknownEditMode(other.to_string())),
        }
    }
}

fn pad(lines: &mut Vec<String>, len: usize) {
    if lines.len() < len {
        lines.resize(len, String::new());
    }
}

/// Split on `\n` and `\r\n`.
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    fn strs(v: &[String]) -> Vec<&str> {
        v.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("replace".parse::<EditMode>().unwrap(), EditMode::Replace);
        assert_eq!(
            "insert_after".parse::<EditMode>().unwrap(),
            EditMode::InsertAfter
        );
        assert_eq!("delete".parse::<EditMode>().unwrap(), EditMode::Delete);
    }

    #[test]
    fn test_unknown_mode() {
        let err = "append".parse::<EditMode>().unwrap_err();
        assert!(matches!(err, FsError::UnknownEditMode(ref m) if m == "append"));
    }

    #[test]
    fn test_split_universal_newlines() {
        assert_eq!(split_lines("a\r\nb\nc"), vec!["a", "b", "c"]);
        assert_eq!(split_lines(""), vec![""]);
        assert_eq!(split_lines("a\n"), vec!["a", ""]);
    }

    #[test]
    fn test_replace_shrinks_range() {
        let mut l = lines(10);
        EditMode::Replace
            .apply(&mut l, 3, 5, vec!["X".into(), "Y".into()])
            .unwrap();

        assert_eq!(l.len(), 9);
        assert_eq!(strs(&l[..5]), vec!["1", "2", "X", "Y", "6"]);
    }

    #[test]
    fn test_replace_past_end_pads() {
        let mut l = lines(2);
        EditMode::Replace.apply(&mut l, 5, 5, vec!["E".into()]).unwrap();

        assert_eq!(strs(&l), vec!["1", "2", "", "", "E"]);
    }

    #[test]
    fn test_replace_with_inverted_range_inserts() {
        let mut l = lines(3);
        EditMode::Replace.apply(&mut l, 2, 1, vec!["N".into()]).unwrap();

        assert_eq!(strs(&l), vec!["1", "N", "2", "3"]);
    }

    #[test]
    fn test_insert_after() {
        let mut l = lines(3);
        EditMode::InsertAfter
            .apply(&mut l, 99, 1, vec!["A".into(), "B".into()])
            .unwrap();

        assert_eq!(strs(&l), vec!["1", "A", "B", "2", "3"]);
    }

    #[test]
    fn test_insert_after_zero_prepends() {
        let mut l = lines(2);
        EditMode::InsertAfter.apply(&mut l, 0, 0, vec!["top".into()]).unwrap();

        assert_eq!(strs(&l), vec!["top", "1", "2"]);
    }

    #[test]
    fn test_insert_after_past_end_pads() {
        let mut l = lines(1);
        EditMode::InsertAfter.apply(&mut l, 0, 3, vec!["Z".into()]).unwrap();

        assert_eq!(strs(&l), vec!["1", "", "", "Z"]);
    }

    #[test]
    fn test_delete_clamps() {
        let mut l = lines(5);
        EditMode::Delete.apply(&mut l, 4, 100, Vec::new()).unwrap();

        assert_eq!(strs(&l), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_delete_past_end_is_noop() {
        let mut l = lines(2);
        EditMode::Delete.apply(&mut l, 7, 9, Vec::new()).unwrap();

        assert_eq!(l, lines(2));
    }

    #[test]
    fn test_huge_end_does_not_overflow() {
        let mut l = lines(3);
        EditMode::Delete.apply(&mut l, 2, usize::MAX, Vec::new()).unwrap();

        assert_eq!(strs(&l), vec!["1"]);
    }

    #[test]
    fn test_far_past_end_is_rejected() {
        let mut l = lines(3);

        let err = EditMode::InsertAfter
            .apply(&mut l, usize::MAX, usize::MAX, vec!["x".into()])
            .unwrap_err();
        assert_eq!(
            err,
            FsError::LineOutOfRange {
                line: usize::MAX,
                len: 3
            }
        );

        let err = EditMode::Replace
            .apply(&mut l, usize::MAX / 2, usize::MAX / 2, vec!["x".into()])
            .unwrap_err();
        assert!(matches!(err, FsError::LineOutOfRange { .. }));

        let err = EditMode::Replace
            .apply(&mut l, 1, usize::MAX, vec!["x".into()])
            .unwrap_err();
        assert!(matches!(err, FsError::LineOutOfRange { .. }));
        assert_eq!(l, lines(3));
    }

    #[test]
    fn test_padding_limit_is_inclusive() {
        let mut l = lines(1);
        EditMode::InsertAfter
            .apply(&mut l, 0, 1 + MAX_PADDING, vec!["z".into()])
            .unwrap();

        assert_eq!(l.len(), 2 + MAX_PADDING);
        assert_eq!(l.last().unwrap(), "z");
    }
}
