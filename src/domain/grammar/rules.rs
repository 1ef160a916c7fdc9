//! Configurable classification rules
//!
//! Rules let deployments reclassify AST node types per language without
//! code changes. Four rule kinds are supported: direct mapping, regex
//! pattern, refinement (classify one node type as another), and contextual
//! weight adjustment.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::grammar::{NodeClassification, NodeContext};
use crate::domain::types::{Language, SemanticCategory};

/// One classification override, as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum ClassificationRule {
    /// Map a node type straight to a category and weight
    Direct {
        node_type: String,
        category: SemanticCategory,
        weight: f32,
    },
    /// Map every node type matching a regex to a category and weight
    Pattern {
        pattern: String,
        category: SemanticCategory,
        weight: f32,
    },
    /// Classify `from` the same way `onto` is classified.
    ///
    /// Chains may be configured cyclically; the registry's recursion guard
    /// terminates resolution at the unknown fallback in that case.
    Refine { from: String, onto: String },
    /// Adjust the contextual weight for a category
    Contextual {
        category: SemanticCategory,
        /// Multiplier applied when the node is public
        public_boost: f32,
        /// Multiplier applied per nesting level
        nested_penalty: f32,
    },
}

/// Rules for one language, as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageRules {
    pub language: Language,
    pub rules: Vec<ClassificationRule>,
}

/// Result of applying a rule set to a node type
pub enum RuleOutcome {
    /// A direct or pattern rule produced a classification
    Classified(NodeClassification),
    /// A refinement rule redirects to another node type
    RefineTo(String),
}

/// Compiled rule set: regexes compiled once, invalid patterns dropped
pub struct RuleSet {
    direct: Vec<(String, NodeClassification)>,
    patterns: Vec<(Regex, NodeClassification)>,
    refinements: Vec<(String, String)>,
    contextual: Vec<(SemanticCategory, f32, f32)>,
}

impl RuleSet {
    pub fn compile(rules: Vec<ClassificationRule>) -> Self {
        let mut compiled = Self {
            direct: Vec::new(),
            patterns: Vec::new(),
            refinements: Vec::new(),
            contextual: Vec::new(),
        };
        for rule in rules {
            match rule {
                ClassificationRule::Direct {
                    node_type,
                    category,
                    weight,
                } => compiled
                    .direct
                    .push((node_type, NodeClassification { category, weight })),
                ClassificationRule::Pattern {
                    pattern,
                    category,
                    weight,
                } => match Regex::new(&pattern) {
                    Ok(regex) => compiled
                        .patterns
                        .push((regex, NodeClassification { category, weight })),
                    Err(err) => {
                        tracing::warn!(pattern, %err, "skipping invalid classification pattern")
                    }
                },
                ClassificationRule::Refine { from, onto } => {
                    compiled.refinements.push((from, onto))
                }
                ClassificationRule::Contextual {
                    category,
                    public_boost,
                    nested_penalty,
                } => compiled
                    .contextual
                    .push((category, public_boost, nested_penalty)),
            }
        }
        compiled
    }

    /// Apply the set to a node type. Direct rules win over patterns, which
    /// win over refinements.
    pub fn apply(&self, node_type: &str) -> Option<RuleOutcome> {
        if let Some((_, classification)) =
            self.direct.iter().find(|(name, _)| name == node_type)
        {
            return Some(RuleOutcome::Classified(*classification));
        }
        if let Some((_, classification)) = self
            .patterns
            .iter()
            .find(|(regex, _)| regex.is_match(node_type))
        {
            return Some(RuleOutcome::Classified(*classification));
        }
        if let Some((_, onto)) = self.refinements.iter().find(|(from, _)| from == node_type) {
            return Some(RuleOutcome::RefineTo(onto.clone()));
        }
        None
    }

    /// Apply any contextual rule for the category to the default contextual
    /// weight
    pub fn adjust_context(
        &self,
        category: SemanticCategory,
        context: NodeContext,
        default_weight: f32,
    ) -> f32 {
        match self.contextual.iter().find(|(c, _, _)| *c == category) {
            Some((_, public_boost, nested_penalty)) => {
                let visibility = if context.is_public { *public_boost } else { 1.0 };
                let nesting = nested_penalty.powi(context.nesting_depth as i32);
                (visibility * nesting).clamp(0.0, 2.0)
            }
            None => default_weight,
        }
    }
}
