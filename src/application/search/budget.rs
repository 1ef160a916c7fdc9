//! Token budgeting
//!
//! Assembles the final match list by descending score, including matches
//! until the cumulative token estimate reaches the budget. The match that
//! crosses the budget line is included, then assembly stops.

use crate::domain::types::{estimate_tokens, CodeMatch};

/// Truncate `matches` (already sorted best-first) to the token budget
pub fn apply_budget(matches: Vec<CodeMatch>, token_budget: usize) -> Vec<CodeMatch> {
    let mut result = Vec::with_capacity(matches.len());
    let mut spent = 0usize;
    for code_match in matches {
        if spent >= token_budget {
            break;
        }
        spent += estimate_tokens(&code_match.content);
        result.push(code_match);
    }
    result
}
