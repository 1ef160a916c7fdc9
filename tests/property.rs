//! Property-based tests for the core invariants
//!
//! Spans, chunk identity, token estimation, and score fusion hold across
//! generated inputs, not just the hand-picked cases.

use std::path::PathBuf;

use proptest::prelude::*;

use codescout::domain::chunking::Chunker;
use codescout::domain::span::Span;
use codescout::domain::types::{estimate_tokens, Language};

proptest! {
    // Line/column derivation stays consistent with the byte range
    #[test]
    fn span_line_ranges_are_ordered(
        content in "[ -~\n]{0,400}",
        a in 0usize..400,
        b in 0usize..400,
    ) {
        let len = content.len();
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let (start, end) = (start.min(len), end.min(len));
        let span = Span::new("f.txt", start, end, &content).unwrap();
        prop_assert!(span.line_start <= span.line_end);
        prop_assert!(span.line_start >= 1);
        prop_assert!(span.col_start >= 1);
        if span.line_start == span.line_end {
            prop_assert!(span.col_start <= span.col_end);
        }
        prop_assert_eq!(span.len(), end - start);
    }

    // Inverted byte ranges always fail validation
    #[test]
    fn inverted_spans_are_rejected(
        content in "[ -~\n]{1,100}",
        start in 1usize..100,
    ) {
        let start = start.min(content.len());
        if start > 0 {
            prop_assert!(Span::new("f.txt", start, start - 1, &content).is_err());
        }
    }

    // Token estimation is monotone in content length
    #[test]
    fn token_estimate_is_monotone(base in "[ -~\n]{0,200}", extra in "[ -~\n]{0,200}") {
        let longer = format!("{base}{extra}");
        prop_assert!(estimate_tokens(&base) <= estimate_tokens(&longer));
    }

    // Chunking generated Python-like sources: deterministic, and every
    // chunk is an exact substring of the input
    #[test]
    fn chunks_are_substrings_and_deterministic(
        names in prop::collection::vec("[a-z]{2,8}", 1..5),
    ) {
        let content: String = names
            .iter()
            .map(|name| format!("def {name}(value):\n    total = value + 1\n    return total\n\n"))
            .collect();
        let chunker = Chunker::with_defaults();
        let first = chunker
            .chunk(&PathBuf::from("gen.py"), &content, Language::Python)
            .unwrap();
        let second = chunker
            .chunk(&PathBuf::from("gen.py"), &content, Language::Python)
            .unwrap();
        prop_assert_eq!(&first, &second);
        for chunk in &first {
            prop_assert_eq!(
                chunk.content.as_str(),
                &content[chunk.span.byte_start..chunk.span.byte_end]
            );
        }
        // Identical content at the same location keeps identical ids
        let ids_a: Vec<_> = first.iter().map(|c| c.id).collect();
        let ids_b: Vec<_> = second.iter().map(|c| c.id).collect();
        prop_assert_eq!(ids_a, ids_b);
    }
}

mod fusion_properties {
    use super::*;
    use codescout::application::search::fusion;
    use codescout::domain::ports::ScoredPoint;
    use serde_json::Map;
    use uuid::Uuid;

    fn points(scores: &[f32]) -> Vec<ScoredPoint> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| ScoredPoint {
                id: Uuid::new_v8([i as u8 + 1; 16]),
                score: *score,
                payload: Map::new(),
            })
            .collect()
    }

    proptest! {
        // Combined scores stay in [0, 1] and come out sorted
        #[test]
        fn combined_scores_are_normalized_and_sorted(
            dense in prop::collection::vec(-1.0f32..1.0, 0..8),
            sparse in prop::collection::vec(0.0f32..50.0, 0..8),
            alpha in 0.0f32..1.0,
        ) {
            let merged = fusion::merge(points(&dense), points(&sparse), alpha);
            for candidate in &merged {
                prop_assert!(candidate.combined >= 0.0);
                prop_assert!(candidate.combined <= 1.0 + f32::EPSILON);
            }
            for pair in merged.windows(2) {
                prop_assert!(pair[0].combined >= pair[1].combined);
            }
        }

        // A candidate in only one set contributes only that component
        #[test]
        fn single_set_candidates_have_one_component(
            dense in prop::collection::vec(-1.0f32..1.0, 1..6),
        ) {
            let merged = fusion::merge(points(&dense), Vec::new(), 0.7);
            for candidate in &merged {
                prop_assert!(candidate.dense.is_some());
                prop_assert!(candidate.sparse.is_none());
            }
        }
    }
}
