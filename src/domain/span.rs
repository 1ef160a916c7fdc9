//! Immutable source location descriptors
//!
//! A [`Span`] ties a byte range to its file together with the line/column
//! range derived from the file content at construction time. Spans never
//! change after construction; composing spans produces a [`SpanGroup`] that
//! remembers the originating file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Error, Result};

/// Immutable location descriptor: file path, byte range, line/column range.
///
/// Line and column numbers are 1-based and frozen at construction; they are
/// derived from the file content handed to [`Span::new`], never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Path of the file this span points into
    pub file_path: PathBuf,
    /// Inclusive start of the byte range
    pub byte_start: usize,
    /// Exclusive end of the byte range
    pub byte_end: usize,
    /// 1-based line of the first byte
    pub line_start: u32,
    /// 1-based column of the first byte
    pub col_start: u32,
    /// 1-based line of the last byte
    pub line_end: u32,
    /// 1-based column one past the last byte
    pub col_end: u32,
}

impl Span {
    /// Create a span over `content[byte_start..byte_end]`, deriving the
    /// line/column range from `content`.
    ///
    /// Fails with [`Error::Validation`] when the range is inverted or runs
    /// past the end of the content.
    pub fn new(
        file_path: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        content: &str,
    ) -> Result<Self> {
        if byte_end < byte_start {
            return Err(Error::validation(format!(
                "invalid span: byte_end {byte_end} < byte_start {byte_start}"
            )));
        }
        if byte_end > content.len() {
            return Err(Error::validation(format!(
                "invalid span: byte_end {byte_end} exceeds content length {}",
                content.len()
            )));
        }

        let (line_start, col_start) = line_col_at(content, byte_start);
        let (line_end, col_end) = line_col_at(content, byte_end);

        Ok(Self {
            file_path: file_path.into(),
            byte_start,
            byte_end,
            line_start,
            col_start,
            line_end,
            col_end,
        })
    }

    /// Number of bytes covered by the span
    pub fn len(&self) -> usize {
        self.byte_end - self.byte_start
    }

    /// Whether the span covers zero bytes
    pub fn is_empty(&self) -> bool {
        self.byte_start == self.byte_end
    }

    /// Whether two spans overlap. Spans in different files never intersect.
    pub fn intersects(&self, other: &Span) -> bool {
        self.file_path == other.file_path
            && self.byte_start < other.byte_end
            && other.byte_start < self.byte_end
    }

    /// Whether this span fully contains `other`
    pub fn contains(&self, other: &Span) -> bool {
        self.file_path == other.file_path
            && self.byte_start <= other.byte_start
            && other.byte_end <= self.byte_end
    }

    /// Whether the spans touch end-to-start without overlapping
    pub fn adjacent(&self, other: &Span) -> bool {
        self.file_path == other.file_path
            && (self.byte_end == other.byte_start || other.byte_end == self.byte_start)
    }

    /// Compose two spans of the same file into a group
    pub fn merge(&self, other: &Span) -> Result<SpanGroup> {
        let mut group = SpanGroup::new(&self.file_path);
        group.push(self.clone())?;
        group.push(other.clone())?;
        Ok(group)
    }
}

/// An ordered set of spans from a single file.
///
/// Overlapping or adjacent members are coalesced on insertion, so the group
/// always holds disjoint spans sorted by byte range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanGroup {
    /// File all member spans point into
    pub file_path: PathBuf,
    spans: Vec<Span>,
}

impl SpanGroup {
    /// Create an empty group for a file
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            spans: Vec::new(),
        }
    }

    /// Add a span, coalescing with members it intersects or touches.
    ///
    /// Fails with [`Error::Validation`] when the span belongs to a different
    /// file than the group.
    pub fn push(&mut self, span: Span) -> Result<()> {
        if span.file_path != self.file_path {
            return Err(Error::validation(format!(
                "span file {} does not match group file {}",
                span.file_path.display(),
                self.file_path.display()
            )));
        }

        let mut merged = span;
        let mut kept = Vec::with_capacity(self.spans.len() + 1);
        for existing in self.spans.drain(..) {
            if existing.intersects(&merged) || existing.adjacent(&merged) {
                merged = coalesce(existing, merged);
            } else {
                kept.push(existing);
            }
        }
        kept.push(merged);
        kept.sort_by_key(|s| (s.byte_start, s.byte_end));
        self.spans = kept;
        Ok(())
    }

    /// Member spans, sorted by byte range
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Total bytes covered across all members
    pub fn total_bytes(&self) -> usize {
        self.spans.iter().map(Span::len).sum()
    }

    /// Whether any member contains the given span
    pub fn contains(&self, span: &Span) -> bool {
        self.spans.iter().any(|s| s.contains(span))
    }

    /// Number of disjoint members
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the group has no members
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// The file the group points into
    pub fn file(&self) -> &Path {
        &self.file_path
    }
}

fn coalesce(a: Span, b: Span) -> Span {
    let (start, end) = if a.byte_start <= b.byte_start {
        (&a, &b)
    } else {
        (&b, &a)
    };
    Span {
        file_path: a.file_path.clone(),
        byte_start: start.byte_start,
        byte_end: start.byte_end.max(end.byte_end),
        line_start: start.line_start,
        col_start: start.col_start,
        line_end: if start.byte_end >= end.byte_end {
            start.line_end
        } else {
            end.line_end
        },
        col_end: if start.byte_end >= end.byte_end {
            start.col_end
        } else {
            end.col_end
        },
    }
}

/// 1-based (line, column) of a byte offset within `content`
fn line_col_at(content: &str, offset: usize) -> (u32, u32) {
    let prefix = &content.as_bytes()[..offset.min(content.len())];
    let line = prefix.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
    let col = match prefix.iter().rposition(|&b| b == b'\n') {
        Some(pos) => (offset - pos) as u32,
        None => offset as u32 + 1,
    };
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = "fn main() {\n    println!(\"hi\");\n}\n";

    #[test]
    fn new_derives_line_and_column() {
        let span = Span::new("src/main.rs", 0, CONTENT.len(), CONTENT).unwrap();
        assert_eq!(span.line_start, 1);
        assert_eq!(span.col_start, 1);
        assert_eq!(span.line_end, 4);
        assert_eq!(span.col_end, 1);
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let err = Span::new("a.rs", 10, 2, CONTENT).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn out_of_bounds_range_is_rejected() {
        assert!(Span::new("a.rs", 0, CONTENT.len() + 1, CONTENT).is_err());
    }

    #[test]
    fn equality_is_structural() {
        let a = Span::new("a.rs", 0, 5, CONTENT).unwrap();
        let b = Span::new("a.rs", 0, 5, CONTENT).unwrap();
        let c = Span::new("b.rs", 0, 5, CONTENT).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn intersects_and_contains() {
        let outer = Span::new("a.rs", 0, 30, CONTENT).unwrap();
        let inner = Span::new("a.rs", 5, 12, CONTENT).unwrap();
        let after = Span::new("a.rs", 30, 33, CONTENT).unwrap();
        assert!(outer.intersects(&inner));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.intersects(&after));
        assert!(outer.adjacent(&after));
    }

    #[test]
    fn cross_file_spans_never_intersect() {
        let a = Span::new("a.rs", 0, 10, CONTENT).unwrap();
        let b = Span::new("b.rs", 0, 10, CONTENT).unwrap();
        assert!(!a.intersects(&b));
        assert!(!a.contains(&b));
        assert!(!a.adjacent(&b));
    }

    #[test]
    fn merge_produces_a_group_preserving_the_file() {
        let a = Span::new("a.rs", 0, 10, CONTENT).unwrap();
        let b = Span::new("a.rs", 20, 30, CONTENT).unwrap();
        let group = a.merge(&b).unwrap();
        assert_eq!(group.file(), Path::new("a.rs"));
        assert_eq!(group.len(), 2);
        assert_eq!(group.total_bytes(), 20);
    }

    #[test]
    fn group_coalesces_overlapping_members() {
        let mut group = SpanGroup::new("a.rs");
        group.push(Span::new("a.rs", 0, 12, CONTENT).unwrap()).unwrap();
        group.push(Span::new("a.rs", 8, 20, CONTENT).unwrap()).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group.spans()[0].byte_start, 0);
        assert_eq!(group.spans()[0].byte_end, 20);
    }

    #[test]
    fn group_rejects_foreign_files() {
        let mut group = SpanGroup::new("a.rs");
        let err = group
            .push(Span::new("b.rs", 0, 5, CONTENT).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
