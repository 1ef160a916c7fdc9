//! AST-semantic chunking strategy
//!
//! Parses a file with the tree-sitter grammar for its language and emits
//! one draft chunk per definition-category node. Nested definitions become
//! independent chunks; container nodes (classes, impls, modules) contribute
//! a header-only chunk clipped at the first nested definition so member
//! bodies are not duplicated into their parent.
//!
//! AST handles never leave this module: every emitted draft carries plain
//! [`SemanticMetadata`] only.

use tree_sitter::{Node, Parser};

use crate::domain::chunking::DraftChunk;
use crate::domain::error::{Error, Result};
use crate::domain::grammar::{GrammarRegistry, NodeContext};
use crate::domain::types::{ChunkKind, Language, SemanticCategory, SemanticMetadata};

/// Upper bound on the related-symbols list per chunk
const MAX_REFERENCES: usize = 8;

/// Chunk `content` using the language's grammar.
///
/// Fails when the language has no compiled grammar or the parser produces
/// no tree; the caller falls back to the delimiter strategy.
pub fn chunk_ast(
    content: &str,
    language: Language,
    registry: &GrammarRegistry,
) -> Result<Vec<DraftChunk>> {
    let grammar = grammar_for(language)
        .ok_or_else(|| Error::validation(format!("no grammar compiled for '{language}'")))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|err| Error::validation(format!("grammar rejected by parser: {err}")))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| Error::validation("parser produced no tree"))?;

    let mut walker = AstWalker {
        content,
        language,
        registry,
        drafts: Vec::new(),
        prelude: Vec::new(),
        saw_definition: false,
    };
    walker.walk(tree.root_node(), 0, false);
    walker.emit_prelude();

    let mut drafts = walker.drafts;
    drafts.sort_by_key(|d| (d.byte_start, d.byte_end));
    Ok(drafts)
}

/// Resolve the compiled tree-sitter grammar for a language
fn grammar_for(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::C => Some(tree_sitter_c::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
        _ => None,
    }
}

struct AstWalker<'a> {
    content: &'a str,
    language: Language,
    registry: &'a GrammarRegistry,
    drafts: Vec<DraftChunk>,
    /// Top-level import/comment byte ranges seen before the first definition
    prelude: Vec<(usize, usize)>,
    saw_definition: bool,
}

impl<'a> AstWalker<'a> {
    fn walk(&mut self, node: Node<'a>, depth: u32, in_container: bool) {
        let mut cursor = node.walk();
        let children: Vec<Node<'a>> = node.named_children(&mut cursor).collect();
        drop(cursor);

        for child in children {
            let node_type = child.kind();
            let classification = self.registry.classify(self.language, node_type);

            match classification.category {
                SemanticCategory::Definition | SemanticCategory::Module => {
                    self.saw_definition = true;
                    if is_container(self.language, node_type) {
                        self.emit_container_header(child, depth);
                        self.walk(child, depth + 1, true);
                    } else {
                        self.emit_definition(child, depth, in_container);
                        // Nested definitions become independent chunks too
                        self.walk(child, depth + 1, in_container);
                    }
                }
                SemanticCategory::Import | SemanticCategory::Comment
                    if depth == 0 && !self.saw_definition =>
                {
                    self.prelude.push((child.start_byte(), child.end_byte()));
                }
                _ => self.walk(child, depth, in_container),
            }
        }
    }

    fn emit_definition(&mut self, node: Node<'a>, depth: u32, in_container: bool) {
        let kind = kind_for(node.kind(), in_container);
        let semantic = self.semantic_for(node, depth, node.start_byte(), node.end_byte());
        self.drafts.push(DraftChunk {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            kind,
            semantic: Some(semantic),
        });
    }

    /// Emit a container's header clipped at its first nested definition, so
    /// member bodies live only in their own chunks.
    fn emit_container_header(&mut self, node: Node<'a>, depth: u32) {
        let byte_start = node.start_byte();
        let mut byte_end = first_nested_definition_start(node, self.language, self.registry)
            .unwrap_or_else(|| node.end_byte());
        while byte_end > byte_start
            && self.content.as_bytes()[byte_end - 1].is_ascii_whitespace()
        {
            byte_end -= 1;
        }
        if byte_end <= byte_start {
            return;
        }
        let kind = kind_for(node.kind(), false);
        let semantic = self.semantic_for(node, depth, byte_start, byte_end);
        self.drafts.push(DraftChunk {
            byte_start,
            byte_end,
            kind,
            semantic: Some(semantic),
        });
    }

    fn emit_prelude(&mut self) {
        let Some(&(first_start, _)) = self.prelude.first() else {
            return;
        };
        let last_end = self.prelude.iter().map(|&(_, end)| end).max().unwrap_or(0);
        if last_end <= first_start {
            return;
        }
        self.drafts.push(DraftChunk {
            byte_start: first_start,
            byte_end: last_end,
            kind: ChunkKind::ModulePrelude,
            semantic: Some(SemanticMetadata {
                node_type: "module_prelude".to_string(),
                category: SemanticCategory::Import,
                importance: 0.3,
                references: Vec::new(),
            }),
        });
    }

    /// Collapse an AST node to plain metadata. The `byte_end` bound limits
    /// reference collection to the emitted region for clipped containers.
    fn semantic_for(
        &self,
        node: Node<'a>,
        depth: u32,
        byte_start: usize,
        byte_end: usize,
    ) -> SemanticMetadata {
        let node_type = node.kind().to_string();
        let classification = self.registry.classify(self.language, &node_type);
        let name = node_name(node, self.content);
        let context = NodeContext {
            is_public: is_public(self.language, node, self.content, name.as_deref()),
            nesting_depth: depth,
        };
        let importance = self
            .registry
            .importance(self.language, &node_type, 1.0, context);
        SemanticMetadata {
            node_type,
            category: classification.category,
            importance,
            references: collect_references(node, self.content, name.as_deref(), byte_start, byte_end),
        }
    }
}

/// Node types whose member definitions should not be duplicated into the
/// parent chunk
fn is_container(language: Language, node_type: &str) -> bool {
    match language {
        Language::Rust => matches!(node_type, "impl_item" | "trait_item" | "mod_item"),
        Language::Python => node_type == "class_definition",
        Language::JavaScript | Language::TypeScript => matches!(
            node_type,
            "class_declaration" | "abstract_class_declaration" | "module"
        ),
        Language::Java => matches!(
            node_type,
            "class_declaration" | "interface_declaration" | "enum_declaration"
        ),
        Language::Cpp => matches!(
            node_type,
            "class_specifier" | "namespace_definition"
        ),
        Language::Ruby => matches!(node_type, "class" | "module"),
        _ => false,
    }
}

/// Byte offset of the first definition-category node strictly inside `node`
fn first_nested_definition_start(
    node: Node<'_>,
    language: Language,
    registry: &GrammarRegistry,
) -> Option<usize> {
    let mut stack = vec![node];
    let mut earliest: Option<usize> = None;
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        for child in current.named_children(&mut cursor) {
            let classification = registry.classify(language, child.kind());
            if classification.category == SemanticCategory::Definition {
                earliest = Some(match earliest {
                    Some(found) => found.min(child.start_byte()),
                    None => child.start_byte(),
                });
            } else {
                stack.push(child);
            }
        }
    }
    earliest
}

fn kind_for(node_type: &str, in_container: bool) -> ChunkKind {
    const FUNCTION_LIKE: &[&str] = &[
        "function_item",
        "function_definition",
        "function_declaration",
        "generator_function_declaration",
        "arrow_function",
        "decorated_definition",
        "macro_definition",
        "preproc_function_def",
        "method",
        "singleton_method",
    ];
    const METHOD_LIKE: &[&str] = &[
        "method_definition",
        "method_declaration",
        "constructor_declaration",
    ];
    const TYPE_LIKE: &[&str] = &[
        "struct_item",
        "enum_item",
        "trait_item",
        "union_item",
        "type_item",
        "impl_item",
        "class_definition",
        "class_declaration",
        "abstract_class_declaration",
        "interface_declaration",
        "type_alias_declaration",
        "enum_declaration",
        "record_declaration",
        "type_declaration",
        "struct_specifier",
        "class_specifier",
        "enum_specifier",
        "union_specifier",
        "type_definition",
        "template_declaration",
        "class",
    ];
    const MODULE_LIKE: &[&str] = &["mod_item", "namespace_definition", "module"];
    const IMPORT_LIKE: &[&str] = &[
        "use_declaration",
        "import_statement",
        "import_from_statement",
        "import_declaration",
        "preproc_include",
        "extern_crate_declaration",
    ];

    if METHOD_LIKE.contains(&node_type) {
        ChunkKind::Method
    } else if FUNCTION_LIKE.contains(&node_type) {
        if in_container {
            ChunkKind::Method
        } else {
            ChunkKind::Function
        }
    } else if TYPE_LIKE.contains(&node_type) {
        ChunkKind::Type
    } else if MODULE_LIKE.contains(&node_type) {
        ChunkKind::Block
    } else if IMPORT_LIKE.contains(&node_type) {
        ChunkKind::Import
    } else if node_type.contains("comment") {
        ChunkKind::Comment
    } else {
        ChunkKind::Unknown
    }
}

/// Text of the node's `name` field, unwrapping decorator wrappers
fn node_name(node: Node<'_>, content: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return name.utf8_text(content.as_bytes()).ok().map(str::to_string);
    }
    if node.kind() == "decorated_definition" {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if let Some(name) = node_name(child, content) {
                return Some(name);
            }
        }
    }
    None
}

/// Language-specific visibility heuristic
fn is_public(language: Language, node: Node<'_>, content: &str, name: Option<&str>) -> bool {
    match language {
        Language::Rust => {
            let mut cursor = node.walk();
            let has_vis = node
                .children(&mut cursor)
                .any(|c| c.kind() == "visibility_modifier");
            has_vis
        }
        Language::Python => name.is_none_or(|n| !n.starts_with('_')),
        Language::Go => name.is_none_or(|n| n.chars().next().is_some_and(char::is_uppercase)),
        Language::Java => {
            let text = &content[node.start_byte()..node.end_byte().min(content.len())];
            text.lines().next().is_some_and(|l| l.contains("public"))
        }
        Language::JavaScript | Language::TypeScript => node
            .parent()
            .is_some_and(|p| p.kind() == "export_statement"),
        _ => true,
    }
}

/// Distinct identifiers referenced inside the emitted byte region
fn collect_references(
    node: Node<'_>,
    content: &str,
    own_name: Option<&str>,
    byte_start: usize,
    byte_end: usize,
) -> Vec<String> {
    const IDENTIFIER_KINDS: &[&str] = &[
        "identifier",
        "type_identifier",
        "field_identifier",
        "property_identifier",
        "constant",
    ];

    let mut references = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current.named_children(&mut cursor).collect();
        drop(cursor);
        // Reverse push so pop order follows source order
        for child in children.into_iter().rev() {
            if child.start_byte() >= byte_end || child.end_byte() <= byte_start {
                continue;
            }
            if IDENTIFIER_KINDS.contains(&child.kind()) {
                if let Ok(text) = child.utf8_text(content.as_bytes()) {
                    if own_name != Some(text) && !references.iter().any(|r| r == text) {
                        references.push(text.to_string());
                        if references.len() >= MAX_REFERENCES {
                            return references;
                        }
                    }
                }
            } else {
                stack.push(child);
            }
        }
    }
    references
}
