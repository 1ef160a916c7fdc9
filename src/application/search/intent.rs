//! Intent weighting
//!
//! A light post-multiplier applied after rerank: the caller's intent
//! scales scores per semantic category without re-sorting from scratch.
//! Intent never changes the search space, only ranking weights.

use crate::domain::types::{QueryIntent, SemanticCategory};

/// Multiplier for a chunk's category under the caller's intent.
///
/// Neutral (1.0) without an intent or for category-intent pairs with no
/// opinion.
pub fn multiplier(intent: Option<QueryIntent>, category: Option<SemanticCategory>) -> f32 {
    let (Some(intent), Some(category)) = (intent, category) else {
        return 1.0;
    };
    use QueryIntent::*;
    use SemanticCategory::*;
    match (intent, category) {
        // Hunting for bugs: control flow and error paths matter most
        (Debugging, ControlFlow) => 1.3,
        (Debugging, Invocation) => 1.15,
        (Debugging, Comment) => 0.9,

        // Finding entry points: definitions over plumbing
        (Discovery, Definition) => 1.2,
        (Discovery, Module) => 1.1,
        (Discovery, Literal) => 0.8,

        // Planning an edit: definitions and the flow around them
        (Modification, Definition) => 1.2,
        (Modification, ControlFlow) => 1.1,
        (Modification, Import) => 0.85,

        // Reading the docs: comments and module structure first
        (Documentation, Comment) => 1.4,
        (Documentation, Module) => 1.15,
        (Documentation, Invocation) => 0.85,

        // Building a mental model: structure over details
        (Comprehension, Module) => 1.2,
        (Comprehension, Definition) => 1.1,
        (Comprehension, Comment) => 1.1,

        _ => 1.0,
    }
}
