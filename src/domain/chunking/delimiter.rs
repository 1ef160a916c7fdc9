//! Delimiter-heuristic chunking strategy
//!
//! Serves the long tail of languages without a compiled grammar. Each
//! language maps to a delimiter family that knows how blocks start (keyword
//! patterns) and how they end (brace balance, dedent, `end` keyword, or the
//! next block start). Blocks are classified coarsely into definitions,
//! comments, and statements.
//!
//! A file in which no blocks can be identified is an error, never a silent
//! line-window fallback.

use regex::Regex;

use crate::domain::chunking::DraftChunk;
use crate::domain::error::{Error, Result};
use crate::domain::types::{ChunkKind, Language};

/// Families of block-delimiting conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelimiterFamily {
    /// Braces delimit blocks: C#, PHP, Swift, Kotlin, Scala
    CStyle,
    /// Indentation delimits blocks
    PythonStyle,
    /// Balanced parentheses delimit top-level forms
    LispStyle,
    /// `name() {` functions with brace balance
    ShellStyle,
    /// Headings/tags segment the document: Markdown, HTML
    Markup,
    /// `let`/`module`/`type` segments: OCaml
    MlStyle,
    /// `def … end` keyword blocks: Elixir, Lua
    RubyStyle,
    /// `function … end` blocks: MATLAB
    MatlabStyle,
    /// `\section`/`\begin` segments
    LatexStyle,
    /// Top-level bindings segment the file: Haskell
    Functional,
}

impl DelimiterFamily {
    /// Family mapping for languages without a compiled grammar.
    ///
    /// Grammar-backed languages also resolve here so AST parse failures can
    /// fall back within the same file.
    pub fn for_language(language: Language) -> Option<Self> {
        match language {
            Language::Rust
            | Language::Go
            | Language::Java
            | Language::C
            | Language::Cpp
            | Language::JavaScript
            | Language::TypeScript
            | Language::CSharp
            | Language::Php
            | Language::Swift
            | Language::Kotlin
            | Language::Scala => Some(DelimiterFamily::CStyle),
            Language::Python => Some(DelimiterFamily::PythonStyle),
            Language::Shell => Some(DelimiterFamily::ShellStyle),
            Language::Ruby | Language::Elixir | Language::Lua => Some(DelimiterFamily::RubyStyle),
            Language::Matlab => Some(DelimiterFamily::MatlabStyle),
            Language::Haskell => Some(DelimiterFamily::Functional),
            Language::OCaml => Some(DelimiterFamily::MlStyle),
            Language::Latex => Some(DelimiterFamily::LatexStyle),
            Language::Markdown | Language::Html => Some(DelimiterFamily::Markup),
            Language::PlainText | Language::Unknown => None,
        }
    }

    fn spec(&self) -> FamilySpec {
        match self {
            DelimiterFamily::CStyle => FamilySpec {
                starts: &[
                    r"^(pub(\([a-z]+\))?\s+)?(static\s+|final\s+|abstract\s+|override\s+|open\s+|public\s+|private\s+|protected\s+|internal\s+)*(func|fn|function|def|class|struct|interface|enum|impl|trait|object|record|namespace)\b",
                    r"^[A-Za-z_][A-Za-z0-9_:<>,\s\*&]*\s+[A-Za-z_][A-Za-z0-9_]*\s*\([^;]*$",
                    r"^[A-Za-z_][A-Za-z0-9_:<>,\s\*&]*\s+[A-Za-z_][A-Za-z0-9_]*\s*\([^;]*\)\s*\{",
                ],
                end: BlockEnd::BraceBalance,
                comment_prefixes: &["//", "/*", "*"],
                type_keywords: &["class", "struct", "interface", "enum", "trait", "record", "object"],
            },
            DelimiterFamily::PythonStyle => FamilySpec {
                starts: &[r"^(async\s+)?(def|class)\b", r"^@[A-Za-z_]"],
                end: BlockEnd::Dedent,
                comment_prefixes: &["#"],
                type_keywords: &["class"],
            },
            DelimiterFamily::LispStyle => FamilySpec {
                starts: &[r"^\("],
                end: BlockEnd::ParenBalance,
                comment_prefixes: &[";"],
                type_keywords: &["defstruct", "defclass", "defrecord"],
            },
            DelimiterFamily::ShellStyle => FamilySpec {
                starts: &[
                    r"^(function\s+)?[A-Za-z_][A-Za-z0-9_]*\s*\(\)\s*\{?",
                    r"^function\s+[A-Za-z_]",
                ],
                end: BlockEnd::BraceBalance,
                comment_prefixes: &["#"],
                type_keywords: &[],
            },
            DelimiterFamily::Markup => FamilySpec {
                starts: &[r"^#{1,6}\s", r"^<(h[1-6]|section|article|div id)"],
                end: BlockEnd::NextStart,
                comment_prefixes: &["<!--"],
                type_keywords: &[],
            },
            DelimiterFamily::MlStyle => FamilySpec {
                starts: &[r"^(let|module|type|and)\b"],
                end: BlockEnd::NextStart,
                comment_prefixes: &["(*"],
                type_keywords: &["module", "type"],
            },
            DelimiterFamily::RubyStyle => FamilySpec {
                starts: &[
                    r"^(def|defp|defmodule|defmacro|class|module|local\s+function|function)\b",
                ],
                end: BlockEnd::KeywordEnd("end"),
                comment_prefixes: &["#", "--"],
                type_keywords: &["class", "module", "defmodule"],
            },
            DelimiterFamily::MatlabStyle => FamilySpec {
                starts: &[r"^(function|classdef)\b"],
                end: BlockEnd::KeywordEnd("end"),
                comment_prefixes: &["%"],
                type_keywords: &["classdef"],
            },
            DelimiterFamily::LatexStyle => FamilySpec {
                starts: &[r"^\\(sub)*section\b", r"^\\(begin\{|chapter\b)"],
                end: BlockEnd::NextStart,
                comment_prefixes: &["%"],
                type_keywords: &[],
            },
            DelimiterFamily::Functional => FamilySpec {
                starts: &[
                    r"^(data|newtype|type|instance|class|module)\b",
                    r"^[a-z_][A-Za-z0-9_']*\s*(::|.*=\s*$|.*=\s)",
                ],
                end: BlockEnd::NextStart,
                comment_prefixes: &["--", "{-"],
                type_keywords: &["data", "newtype", "type", "class"],
            },
        }
    }
}

/// How a family recognizes the end of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    /// `{`/`}` balance returns to zero
    BraceBalance,
    /// `(`/`)` balance returns to zero
    ParenBalance,
    /// Indentation returns to at most the start line's level
    Dedent,
    /// A line that is exactly the keyword at the start indentation
    KeywordEnd(&'static str),
    /// The next block start (or end of file) closes the block
    NextStart,
}

struct FamilySpec {
    starts: &'static [&'static str],
    end: BlockEnd,
    comment_prefixes: &'static [&'static str],
    type_keywords: &'static [&'static str],
}

/// Chunk `content` with the family's delimiter table.
///
/// Fails with [`Error::Validation`] when no blocks can be identified in a
/// non-empty file.
pub fn chunk_with_family(content: &str, family: DelimiterFamily) -> Result<Vec<DraftChunk>> {
    let spec = family.spec();
    let patterns: Vec<Regex> = spec
        .starts
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect();

    let lines = line_offsets(content);
    let mut drafts = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let (offset, line) = &lines[i];
        let trimmed = line.trim_start();
        if patterns.iter().any(|regex| regex.is_match(trimmed)) {
            let end_line = find_block_end(&lines, i, &spec, &patterns);
            let byte_start = *offset;
            let byte_end = lines[end_line].0 + lines[end_line].1.len();
            let kind = classify_block(trimmed, &spec);
            drafts.push(DraftChunk {
                byte_start,
                byte_end,
                kind,
                semantic: None,
            });
            i = end_line + 1;
        } else {
            i += 1;
        }
    }

    if drafts.is_empty() {
        return Err(Error::validation(format!(
            "delimiter chunking found no blocks ({family:?} family)"
        )));
    }
    Ok(drafts)
}

/// Byte offset and text of each line, excluding the line terminator
fn line_offsets(content: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for line in content.split_inclusive('\n') {
        let text = line.strip_suffix('\n').unwrap_or(line);
        let text = text.strip_suffix('\r').unwrap_or(text);
        lines.push((offset, text));
        offset += line.len();
    }
    lines
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn find_block_end(
    lines: &[(usize, &str)],
    start: usize,
    spec: &FamilySpec,
    patterns: &[Regex],
) -> usize {
    match spec.end {
        BlockEnd::BraceBalance => balance_end(lines, start, '{', '}'),
        BlockEnd::ParenBalance => balance_end(lines, start, '(', ')'),
        BlockEnd::Dedent => {
            let start_indent = indent_of(lines[start].1);
            let mut last_content = start;
            for (i, (_, line)) in lines.iter().enumerate().skip(start + 1) {
                if line.trim().is_empty() {
                    continue;
                }
                if indent_of(line) <= start_indent {
                    return last_content;
                }
                last_content = i;
            }
            last_content
        }
        BlockEnd::KeywordEnd(keyword) => {
            let start_indent = indent_of(lines[start].1);
            let mut depth = 1usize;
            for (i, (_, line)) in lines.iter().enumerate().skip(start + 1) {
                let trimmed = line.trim();
                if patterns.iter().any(|regex| regex.is_match(trimmed)) {
                    depth += 1;
                } else if trimmed == keyword && indent_of(line) <= start_indent {
                    return i;
                } else if trimmed == keyword {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return i;
                    }
                }
            }
            lines.len() - 1
        }
        BlockEnd::NextStart => {
            for (i, (_, line)) in lines.iter().enumerate().skip(start + 1) {
                if patterns.iter().any(|regex| regex.is_match(line.trim_start())) {
                    return i - 1;
                }
            }
            lines.len() - 1
        }
    }
}

/// Scan forward until delimiter balance opened on or after `start` returns
/// to zero. Unbalanced blocks run to end of file.
fn balance_end(lines: &[(usize, &str)], start: usize, open: char, close: char) -> usize {
    let mut depth = 0i64;
    let mut opened = false;
    for (i, (_, line)) in lines.iter().enumerate().skip(start) {
        for c in line.chars() {
            if c == open {
                depth += 1;
                opened = true;
            } else if c == close {
                depth -= 1;
            }
        }
        if opened && depth <= 0 {
            return i;
        }
        // Header-only match with no opening delimiter within two lines
        if !opened && i > start + 1 {
            return start;
        }
    }
    lines.len() - 1
}

/// Coarse classification: definition, comment, or statement block
fn classify_block(start_line: &str, spec: &FamilySpec) -> ChunkKind {
    if spec
        .comment_prefixes
        .iter()
        .any(|prefix| start_line.starts_with(prefix))
    {
        return ChunkKind::Comment;
    }
    let first_word = start_line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches("pub")
        .trim_start_matches("public")
        .trim();
    if spec
        .type_keywords
        .iter()
        .any(|keyword| start_line.starts_with(keyword) || first_word == *keyword)
    {
        ChunkKind::Type
    } else {
        ChunkKind::Function
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstyle_blocks_close_on_brace_balance() {
        let content = "class Point {\n    int x;\n    int y;\n}\n\nint length(Point p) {\n    return p.x + p.y;\n}\n";
        let drafts = chunk_with_family(content, DelimiterFamily::CStyle).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].kind, ChunkKind::Type);
        assert_eq!(drafts[1].kind, ChunkKind::Function);
        assert!(content[drafts[1].byte_start..drafts[1].byte_end].ends_with('}'));
    }

    #[test]
    fn ruby_style_blocks_close_on_end_keyword() {
        let content = "def greet(name)\n  \"hi #{name}\"\nend\n\ndef bye\n  \"bye\"\nend\n";
        let drafts = chunk_with_family(content, DelimiterFamily::RubyStyle).unwrap();
        assert_eq!(drafts.len(), 2);
        for draft in &drafts {
            assert!(content[draft.byte_start..draft.byte_end].trim_end().ends_with("end"));
        }
    }

    #[test]
    fn python_style_blocks_close_on_dedent() {
        let content = "def first():\n    a = 1\n    return a\n\ndef second():\n    return 2\n";
        let drafts = chunk_with_family(content, DelimiterFamily::PythonStyle).unwrap();
        assert_eq!(drafts.len(), 2);
        let first = &content[drafts[0].byte_start..drafts[0].byte_end];
        assert!(first.contains("return a"));
        assert!(!first.contains("second"));
    }

    #[test]
    fn markup_segments_at_headings() {
        let content = "# Title\n\nIntro text.\n\n## Usage\n\nRun the tool.\n";
        let drafts = chunk_with_family(content, DelimiterFamily::Markup).unwrap();
        assert_eq!(drafts.len(), 2);
        assert!(content[drafts[0].byte_start..drafts[0].byte_end].contains("Intro"));
        assert!(content[drafts[1].byte_start..drafts[1].byte_end].contains("Run the tool"));
    }

    #[test]
    fn no_identifiable_blocks_is_an_error_not_a_fallback() {
        let err = chunk_with_family("just some prose\nwithout structure\n", DelimiterFamily::CStyle)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn families_cover_the_documented_languages() {
        assert_eq!(
            DelimiterFamily::for_language(Language::Swift),
            Some(DelimiterFamily::CStyle)
        );
        assert_eq!(
            DelimiterFamily::for_language(Language::Haskell),
            Some(DelimiterFamily::Functional)
        );
        assert_eq!(DelimiterFamily::for_language(Language::PlainText), None);
        assert_eq!(DelimiterFamily::for_language(Language::Unknown), None);
    }
}
