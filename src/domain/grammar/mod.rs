//! Grammar registry: AST node classification and importance weighting
//!
//! Maps `(language, node_type)` to a semantic category and a base weight.
//! The per-language category graph is flattened into a plain table at build
//! time, so lookups are pure map reads; refinement rules that could form
//! cycles are resolved through an explicit recursion guard keyed by
//! `(language, node_type)`.
//!
//! Importance combines three independent dimensions:
//!
//! 1. the node's category weight from the table,
//! 2. a caller-provided task weight (derived from query intent),
//! 3. an in-file contextual weight (visibility, nesting).

pub mod rules;

use std::collections::{HashMap, HashSet};

use crate::domain::types::{Language, SemanticCategory};

pub use rules::{ClassificationRule, LanguageRules};

/// Category and base weight for one node type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeClassification {
    pub category: SemanticCategory,
    pub weight: f32,
}

/// Weight assigned to node types absent from every table and rule
pub const UNKNOWN_WEIGHT: f32 = 0.1;

/// In-file context of a node, used for the contextual weight dimension
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeContext {
    /// Whether the node is exported/public
    pub is_public: bool,
    /// Nesting depth below the file root (0 = top level)
    pub nesting_depth: u32,
}

impl NodeContext {
    pub fn top_level(is_public: bool) -> Self {
        Self {
            is_public,
            nesting_depth: 0,
        }
    }

    /// Contextual weight: public and top-level code ranks above private
    /// deeply nested code.
    pub fn weight(&self) -> f32 {
        let visibility = if self.is_public { 1.0 } else { 0.8 };
        let nesting = 1.0 / (1.0 + self.nesting_depth as f32 * 0.25);
        visibility * nesting
    }
}

/// Per-language classification tables with configurable rule overrides
pub struct GrammarRegistry {
    tables: HashMap<Language, HashMap<&'static str, NodeClassification>>,
    rules: HashMap<Language, rules::RuleSet>,
}

impl GrammarRegistry {
    /// Registry with the built-in tables and no extra rules
    pub fn builtin() -> Self {
        let mut tables = HashMap::new();
        for (language, entries) in BUILTIN_TABLES {
            let table = entries
                .iter()
                .map(|(node, category, weight)| {
                    (
                        *node,
                        NodeClassification {
                            category: *category,
                            weight: *weight,
                        },
                    )
                })
                .collect();
            tables.insert(*language, table);
        }
        Self {
            tables,
            rules: HashMap::new(),
        }
    }

    /// Registry with configured per-language rule overrides applied on top
    /// of the built-in tables
    pub fn with_rules(rule_sets: Vec<LanguageRules>) -> Self {
        let mut registry = Self::builtin();
        for set in rule_sets {
            registry
                .rules
                .insert(set.language, rules::RuleSet::compile(set.rules));
        }
        registry
    }

    /// Classify a node type.
    ///
    /// Resolution order: configured rules, then the built-in table, then the
    /// `Unknown` fallback. Refinement chains are followed with a guard so a
    /// cyclic rule configuration terminates instead of recursing.
    pub fn classify(&self, language: Language, node_type: &str) -> NodeClassification {
        let mut visited: HashSet<(Language, String)> = HashSet::new();
        self.classify_guarded(language, node_type, &mut visited)
    }

    fn classify_guarded(
        &self,
        language: Language,
        node_type: &str,
        visited: &mut HashSet<(Language, String)>,
    ) -> NodeClassification {
        if !visited.insert((language, node_type.to_string())) {
            // Cycle in refinement rules; terminate at the fallback
            return NodeClassification {
                category: SemanticCategory::Unknown,
                weight: UNKNOWN_WEIGHT,
            };
        }

        if let Some(rule_set) = self.rules.get(&language) {
            match rule_set.apply(node_type) {
                Some(rules::RuleOutcome::Classified(classification)) => return classification,
                Some(rules::RuleOutcome::RefineTo(target)) => {
                    return self.classify_guarded(language, &target, visited);
                }
                None => {}
            }
        }

        self.tables
            .get(&language)
            .and_then(|table| table.get(node_type))
            .copied()
            .unwrap_or(NodeClassification {
                category: SemanticCategory::Unknown,
                weight: UNKNOWN_WEIGHT,
            })
    }

    /// Combined importance in `[0, 1]`: category weight × task weight ×
    /// contextual weight, with any configured contextual rule applied.
    pub fn importance(
        &self,
        language: Language,
        node_type: &str,
        task_weight: f32,
        context: NodeContext,
    ) -> f32 {
        let classification = self.classify(language, node_type);
        let mut contextual = context.weight();
        if let Some(rule_set) = self.rules.get(&language) {
            contextual = rule_set.adjust_context(classification.category, context, contextual);
        }
        (classification.weight * task_weight * contextual).clamp(0.0, 1.0)
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

type TableEntry = (&'static str, SemanticCategory, f32);

use SemanticCategory::*;

const RUST_TABLE: &[TableEntry] = &[
    ("function_item", Definition, 1.0),
    ("impl_item", Definition, 0.9),
    ("struct_item", Definition, 0.9),
    ("enum_item", Definition, 0.9),
    ("trait_item", Definition, 0.9),
    ("union_item", Definition, 0.8),
    ("type_item", Definition, 0.8),
    ("macro_definition", Definition, 0.8),
    ("mod_item", Module, 0.7),
    ("const_item", Declaration, 0.5),
    ("static_item", Declaration, 0.5),
    ("use_declaration", Import, 0.3),
    ("extern_crate_declaration", Import, 0.3),
    ("call_expression", Invocation, 0.4),
    ("macro_invocation", Invocation, 0.4),
    ("if_expression", ControlFlow, 0.4),
    ("match_expression", ControlFlow, 0.45),
    ("while_expression", ControlFlow, 0.4),
    ("loop_expression", ControlFlow, 0.4),
    ("for_expression", ControlFlow, 0.4),
    ("line_comment", Comment, 0.2),
    ("block_comment", Comment, 0.2),
    ("string_literal", Literal, 0.1),
    ("integer_literal", Literal, 0.1),
];

const PYTHON_TABLE: &[TableEntry] = &[
    ("function_definition", Definition, 1.0),
    ("class_definition", Definition, 0.9),
    ("decorated_definition", Definition, 1.0),
    ("import_statement", Import, 0.3),
    ("import_from_statement", Import, 0.3),
    ("call", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("while_statement", ControlFlow, 0.4),
    ("try_statement", ControlFlow, 0.45),
    ("with_statement", ControlFlow, 0.4),
    ("assignment", Declaration, 0.3),
    ("comment", Comment, 0.2),
    ("string", Literal, 0.1),
];

const JAVASCRIPT_TABLE: &[TableEntry] = &[
    ("function_declaration", Definition, 1.0),
    ("generator_function_declaration", Definition, 1.0),
    ("arrow_function", Definition, 0.7),
    ("method_definition", Definition, 0.9),
    ("class_declaration", Definition, 0.9),
    ("lexical_declaration", Declaration, 0.4),
    ("variable_declaration", Declaration, 0.4),
    ("import_statement", Import, 0.3),
    ("export_statement", Definition, 0.6),
    ("call_expression", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("while_statement", ControlFlow, 0.4),
    ("switch_statement", ControlFlow, 0.45),
    ("try_statement", ControlFlow, 0.45),
    ("comment", Comment, 0.2),
    ("string", Literal, 0.1),
];

const TYPESCRIPT_TABLE: &[TableEntry] = &[
    ("function_declaration", Definition, 1.0),
    ("generator_function_declaration", Definition, 1.0),
    ("arrow_function", Definition, 0.7),
    ("method_definition", Definition, 0.9),
    ("class_declaration", Definition, 0.9),
    ("abstract_class_declaration", Definition, 0.9),
    ("interface_declaration", Definition, 0.9),
    ("type_alias_declaration", Definition, 0.8),
    ("enum_declaration", Definition, 0.8),
    ("module", Module, 0.7),
    ("lexical_declaration", Declaration, 0.4),
    ("import_statement", Import, 0.3),
    ("export_statement", Definition, 0.6),
    ("call_expression", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("while_statement", ControlFlow, 0.4),
    ("switch_statement", ControlFlow, 0.45),
    ("try_statement", ControlFlow, 0.45),
    ("comment", Comment, 0.2),
];

const GO_TABLE: &[TableEntry] = &[
    ("function_declaration", Definition, 1.0),
    ("method_declaration", Definition, 1.0),
    ("type_declaration", Definition, 0.9),
    ("const_declaration", Declaration, 0.5),
    ("var_declaration", Declaration, 0.4),
    ("import_declaration", Import, 0.3),
    ("call_expression", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("select_statement", ControlFlow, 0.45),
    ("expression_switch_statement", ControlFlow, 0.45),
    ("type_switch_statement", ControlFlow, 0.45),
    ("comment", Comment, 0.2),
];

const JAVA_TABLE: &[TableEntry] = &[
    ("method_declaration", Definition, 1.0),
    ("constructor_declaration", Definition, 0.9),
    ("class_declaration", Definition, 0.9),
    ("interface_declaration", Definition, 0.9),
    ("enum_declaration", Definition, 0.8),
    ("record_declaration", Definition, 0.8),
    ("field_declaration", Declaration, 0.4),
    ("import_declaration", Import, 0.3),
    ("method_invocation", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("while_statement", ControlFlow, 0.4),
    ("switch_expression", ControlFlow, 0.45),
    ("try_statement", ControlFlow, 0.45),
    ("line_comment", Comment, 0.2),
    ("block_comment", Comment, 0.2),
];

const C_TABLE: &[TableEntry] = &[
    ("function_definition", Definition, 1.0),
    ("struct_specifier", Definition, 0.9),
    ("enum_specifier", Definition, 0.8),
    ("union_specifier", Definition, 0.8),
    ("type_definition", Definition, 0.8),
    ("declaration", Declaration, 0.4),
    ("preproc_include", Import, 0.3),
    ("preproc_function_def", Definition, 0.7),
    ("call_expression", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("while_statement", ControlFlow, 0.4),
    ("switch_statement", ControlFlow, 0.45),
    ("comment", Comment, 0.2),
];

const CPP_TABLE: &[TableEntry] = &[
    ("function_definition", Definition, 1.0),
    ("class_specifier", Definition, 0.9),
    ("struct_specifier", Definition, 0.9),
    ("enum_specifier", Definition, 0.8),
    ("union_specifier", Definition, 0.8),
    ("type_definition", Definition, 0.8),
    ("template_declaration", Definition, 0.9),
    ("namespace_definition", Module, 0.7),
    ("declaration", Declaration, 0.4),
    ("preproc_include", Import, 0.3),
    ("call_expression", Invocation, 0.4),
    ("if_statement", ControlFlow, 0.4),
    ("for_statement", ControlFlow, 0.4),
    ("while_statement", ControlFlow, 0.4),
    ("switch_statement", ControlFlow, 0.45),
    ("try_statement", ControlFlow, 0.45),
    ("comment", Comment, 0.2),
];

const RUBY_TABLE: &[TableEntry] = &[
    ("method", Definition, 1.0),
    ("singleton_method", Definition, 1.0),
    ("class", Definition, 0.9),
    ("module", Module, 0.7),
    ("call", Invocation, 0.4),
    ("if", ControlFlow, 0.4),
    ("while", ControlFlow, 0.4),
    ("until", ControlFlow, 0.4),
    ("case", ControlFlow, 0.45),
    ("begin", ControlFlow, 0.45),
    ("comment", Comment, 0.2),
];

const BUILTIN_TABLES: &[(Language, &[TableEntry])] = &[
    (Language::Rust, RUST_TABLE),
    (Language::Python, PYTHON_TABLE),
    (Language::JavaScript, JAVASCRIPT_TABLE),
    (Language::TypeScript, TYPESCRIPT_TABLE),
    (Language::Go, GO_TABLE),
    (Language::Java, JAVA_TABLE),
    (Language::C, C_TABLE),
    (Language::Cpp, CPP_TABLE),
    (Language::Ruby, RUBY_TABLE),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup_classifies_definitions() {
        let registry = GrammarRegistry::builtin();
        let c = registry.classify(Language::Rust, "function_item");
        assert_eq!(c.category, SemanticCategory::Definition);
        assert_eq!(c.weight, 1.0);
    }

    #[test]
    fn unknown_node_types_fall_back_with_low_weight() {
        let registry = GrammarRegistry::builtin();
        let c = registry.classify(Language::Python, "quantum_statement");
        assert_eq!(c.category, SemanticCategory::Unknown);
        assert_eq!(c.weight, UNKNOWN_WEIGHT);
    }

    #[test]
    fn importance_combines_three_dimensions() {
        let registry = GrammarRegistry::builtin();
        let public_top = registry.importance(
            Language::Rust,
            "function_item",
            1.0,
            NodeContext::top_level(true),
        );
        let private_nested = registry.importance(
            Language::Rust,
            "function_item",
            1.0,
            NodeContext {
                is_public: false,
                nesting_depth: 3,
            },
        );
        assert!(public_top > private_nested);
        let low_task = registry.importance(
            Language::Rust,
            "function_item",
            0.5,
            NodeContext::top_level(true),
        );
        assert!(low_task < public_top);
    }

    #[test]
    fn cyclic_refinement_rules_terminate() {
        let registry = GrammarRegistry::with_rules(vec![LanguageRules {
            language: Language::Rust,
            rules: vec![
                ClassificationRule::Refine {
                    from: "alpha".into(),
                    onto: "beta".into(),
                },
                ClassificationRule::Refine {
                    from: "beta".into(),
                    onto: "alpha".into(),
                },
            ],
        }]);
        let c = registry.classify(Language::Rust, "alpha");
        assert_eq!(c.category, SemanticCategory::Unknown);
    }

    #[test]
    fn direct_rules_override_the_builtin_table() {
        let registry = GrammarRegistry::with_rules(vec![LanguageRules {
            language: Language::Rust,
            rules: vec![ClassificationRule::Direct {
                node_type: "line_comment".into(),
                category: SemanticCategory::Comment,
                weight: 0.6,
            }],
        }]);
        let c = registry.classify(Language::Rust, "line_comment");
        assert_eq!(c.category, SemanticCategory::Comment);
        assert_eq!(c.weight, 0.6);
    }
}
