//! Chunk size governor
//!
//! Enforces the per-chunk size envelope before chunks are materialized:
//! oversized drafts are split at the highest-ranked seam inside the range,
//! undersized drafts are coalesced with an adjacent draft of the same kind
//! when possible and otherwise kept only when they carry high-importance
//! semantics.
//!
//! The governor is a pure function of `(drafts, content, settings)`, which
//! keeps chunk ids deterministic.

use crate::domain::chunking::DraftChunk;
use crate::domain::types::estimate_tokens;

/// Seam quality, best first: blank line, statement/member boundary, any
/// line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SeamRank {
    LineBreak,
    StatementEnd,
    BlankLine,
}

pub struct ChunkGovernor {
    min_lines: u32,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl ChunkGovernor {
    pub fn new(min_lines: u32, max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            min_lines,
            max_tokens,
            overlap_tokens,
        }
    }

    /// Apply the envelope: coalesce undersized drafts, then split anything
    /// over the token cap. Splitting runs last because the cap is the hard
    /// invariant; a merged pair may split again, an overlapping split pair
    /// must never merge back over the cap.
    pub fn enforce(&self, mut drafts: Vec<DraftChunk>, content: &str) -> Vec<DraftChunk> {
        drafts.sort_by_key(|d| (d.byte_start, d.byte_end));
        let coalesced = self.coalesce_undersized(drafts, content);
        let mut result = Vec::with_capacity(coalesced.len());
        for draft in coalesced {
            self.split_oversized(draft, content, &mut result);
        }
        result.sort_by_key(|d| (d.byte_start, d.byte_end));
        result
    }

    fn split_oversized(&self, draft: DraftChunk, content: &str, out: &mut Vec<DraftChunk>) {
        let slice = &content[draft.byte_start..draft.byte_end];
        if estimate_tokens(slice) <= self.max_tokens {
            out.push(draft);
            return;
        }

        // Token estimate is bytes/4, so the byte budget for one chunk
        let byte_budget = self.max_tokens * 4;
        let overlap_bytes = self.overlap_tokens * 4;
        let mut piece_start = draft.byte_start;

        while estimate_tokens(&content[piece_start..draft.byte_end]) > self.max_tokens {
            let window_end = (piece_start + byte_budget).min(draft.byte_end);
            let window_start = piece_start + byte_budget / 2;
            let seam = best_seam(content, window_start, window_end).unwrap_or(window_end);
            if seam <= piece_start {
                break;
            }
            out.push(DraftChunk {
                byte_start: piece_start,
                byte_end: seam,
                kind: draft.kind,
                semantic: draft.semantic.clone(),
            });
            // Carry a small overlap back across the seam
            piece_start = seam.saturating_sub(overlap_bytes).max(piece_start + 1);
            piece_start = ceil_char_boundary(content, piece_start);
        }

        if piece_start < draft.byte_end {
            out.push(DraftChunk {
                byte_start: piece_start,
                byte_end: draft.byte_end,
                kind: draft.kind,
                semantic: draft.semantic,
            });
        }
    }

    fn coalesce_undersized(&self, drafts: Vec<DraftChunk>, content: &str) -> Vec<DraftChunk> {
        let mut result: Vec<DraftChunk> = Vec::with_capacity(drafts.len());
        // A small draft waiting for a chance to merge into its successor
        let mut pending_small: Option<DraftChunk> = None;

        for mut draft in drafts {
            if let Some(small) = pending_small.take() {
                let gap = &content[small.byte_end.min(draft.byte_start)..draft.byte_start];
                if small.kind == draft.kind && gap.trim().is_empty() {
                    draft.byte_start = small.byte_start;
                } else if small.is_high_importance() {
                    result.push(small);
                }
            }

            if draft.line_count(content) >= self.min_lines as usize {
                result.push(draft);
                continue;
            }

            // Merge into the previous draft when kinds match and the gap is
            // only whitespace
            if let Some(previous) = result.last_mut() {
                let gap = &content[previous.byte_end.min(draft.byte_start)..draft.byte_start];
                if previous.kind == draft.kind && gap.trim().is_empty() {
                    previous.byte_end = previous.byte_end.max(draft.byte_end);
                    continue;
                }
            }

            pending_small = Some(draft);
        }

        if let Some(small) = pending_small {
            if small.is_high_importance() {
                result.push(small);
            }
            // Low-importance fragments below the minimum are dropped
        }
        result
    }
}

/// Best seam in `content[from..to]`: byte offset just after the chosen
/// newline, preferring blank lines, then statement ends, then any newline,
/// and among equals the one closest to `to`.
fn best_seam(content: &str, from: usize, to: usize) -> Option<usize> {
    let from = ceil_char_boundary(content, from.min(content.len()));
    let to = to.min(content.len());
    if from >= to {
        return None;
    }

    let mut best: Option<(SeamRank, usize)> = None;
    let bytes = content.as_bytes();
    let mut line_start = from;
    for i in from..to {
        if bytes[i] != b'\n' {
            continue;
        }
        let line = content[line_start..i].trim_end();
        let rank = if line.trim().is_empty() {
            SeamRank::BlankLine
        } else if line.ends_with(';') || line.ends_with('}') || line.ends_with(',') {
            SeamRank::StatementEnd
        } else {
            SeamRank::LineBreak
        };
        let candidate = (rank, i + 1);
        if best.is_none_or(|current| candidate >= current) {
            best = Some(candidate);
        }
        line_start = i + 1;
    }
    best.map(|(_, offset)| offset)
}

/// Smallest char boundary at or above `offset`
fn ceil_char_boundary(content: &str, mut offset: usize) -> usize {
    while offset < content.len() && !content.is_char_boundary(offset) {
        offset += 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ChunkKind;

    fn governor() -> ChunkGovernor {
        ChunkGovernor::new(3, 16, 2)
    }

    fn draft(start: usize, end: usize, kind: ChunkKind) -> DraftChunk {
        DraftChunk {
            byte_start: start,
            byte_end: end,
            kind,
            semantic: None,
        }
    }

    #[test]
    fn oversized_drafts_are_split_under_the_token_cap() {
        // 16 tokens * 4 bytes = 64-byte budget; build ~200 bytes of lines
        let content: String = (0..20).map(|i| format!("let v{i} = {i};\n")).collect();
        let drafts = governor().enforce(
            vec![draft(0, content.len(), ChunkKind::Function)],
            &content,
        );
        assert!(drafts.len() > 1);
        for piece in &drafts {
            assert!(estimate_tokens(&content[piece.byte_start..piece.byte_end]) <= 16);
        }
        // Full coverage: last piece ends at the original end
        assert_eq!(drafts.last().unwrap().byte_end, content.len());
    }

    #[test]
    fn splits_land_on_line_boundaries() {
        let content: String = (0..20).map(|i| format!("let v{i} = {i};\n")).collect();
        let drafts = governor().enforce(
            vec![draft(0, content.len(), ChunkKind::Function)],
            &content,
        );
        assert!(drafts.len() > 1);
        for piece in drafts.iter().take(drafts.len() - 1) {
            assert!(content[..piece.byte_end].ends_with('\n'));
        }
    }

    #[test]
    fn blank_lines_outrank_statement_ends() {
        let content = "let a = 1;\nlet b = 2;\n\nlet c = 3;\n";
        let seam = best_seam(content, 0, content.len()).unwrap();
        // Chosen seam is just after the blank line
        assert_eq!(&content[..seam], "let a = 1;\nlet b = 2;\n\n");
    }

    #[test]
    fn small_same_kind_neighbors_coalesce() {
        let content = "x = 1\ny = 2\n\nz = 3\n";
        let drafts = governor().enforce(
            vec![
                draft(0, 12, ChunkKind::Block),
                draft(13, content.len(), ChunkKind::Block),
            ],
            content,
        );
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].byte_start, 0);
        assert_eq!(drafts[0].byte_end, content.len());
    }

    #[test]
    fn tiny_high_importance_chunks_survive() {
        let content = "fn one_liner() {}\n";
        let drafts = governor().enforce(
            vec![draft(0, content.len(), ChunkKind::Function)],
            content,
        );
        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn tiny_low_importance_chunks_are_dropped() {
        let content = "x = 1\n";
        let drafts = governor().enforce(
            vec![draft(0, content.len(), ChunkKind::Block)],
            content,
        );
        assert!(drafts.is_empty());
    }
}
