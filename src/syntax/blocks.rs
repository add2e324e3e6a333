//! Top-level block scanning.
//!
//! Macro definitions live in a small set of top-level block forms
//! (`{% macro %}`, `{% materialization %}`, `{% test %}`, `{% data_test %}`).
//! This pass slices a whole template file into those blocks without parsing
//! anything else: once a block of an allowed kind is open, only start and
//! end tags of that same kind are tracked (nesting counts), every other tag
//! is treated as opaque body text. Tags of other kinds at top level are
//! ignored entirely, so a macro wrapped in `{% if %}...{% endif %}` is still
//! sliced out as a block.
//!
//! The scanner works on the lossless token stream from
//! [`tokenize`](super::lexer::tokenize), so comments, `{% raw %}` regions,
//! and string literals inside tags never produce false tag sightings.

use smol_str::SmolStr;
use text_size::{TextRange, TextSize};
use thiserror::Error;

use super::kind::SyntaxKind;
use super::lexer::{Token, tokenize};

// ============================================================================
// BLOCK KINDS
// ============================================================================

/// The block forms that may contain a macro definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Macro,
    Materialization,
    Test,
    DataTest,
}

impl BlockKind {
    /// Recognize an allowed block kind from a tag name.
    pub fn from_tag(name: &str) -> Option<Self> {
        match name {
            "macro" => Some(BlockKind::Macro),
            "materialization" => Some(BlockKind::Materialization),
            "test" => Some(BlockKind::Test),
            "data_test" => Some(BlockKind::DataTest),
            _ => None,
        }
    }

    /// The tag name opening this block kind.
    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Macro => "macro",
            BlockKind::Materialization => "materialization",
            BlockKind::Test => "test",
            BlockKind::DataTest => "data_test",
        }
    }

    /// The tag name closing this block kind.
    pub fn end_tag(self) -> &'static str {
        match self {
            BlockKind::Macro => "endmacro",
            BlockKind::Materialization => "endmaterialization",
            BlockKind::Test => "endtest",
            BlockKind::DataTest => "enddata_test",
        }
    }
}

/// One top-level block sliced out of a template file, start tag through end
/// tag inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MacroBlock<'s> {
    pub kind: BlockKind,
    /// Declared name from the start tag (`foo` in `{% macro foo() %}`), if
    /// the tag carries one.
    pub name: Option<&'s str>,
    /// Full block text, delimiters included.
    pub text: &'s str,
    /// Byte range of `text` within the scanned file.
    pub range: TextRange,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Structural errors raised while slicing a file into blocks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("reached end of input without finding `{{% end{tag} %}}` for the {tag} block `{name}` opened at offset {offset}")]
    UnclosedBlock {
        tag: &'static str,
        name: SmolStr,
        offset: u32,
    },

    #[error("unexpected `{{% {tag} %}}` at offset {offset} with no open block")]
    UnexpectedEndTag { tag: SmolStr, offset: u32 },

    #[error("unterminated tag starting at offset {offset}")]
    UnterminatedTag { offset: u32 },

    #[error("unterminated comment starting at offset {offset}")]
    UnterminatedComment { offset: u32 },
}

impl BlockError {
    /// Byte offset the error points at.
    pub fn offset(&self) -> u32 {
        match self {
            BlockError::UnclosedBlock { offset, .. }
            | BlockError::UnexpectedEndTag { offset, .. }
            | BlockError::UnterminatedTag { offset }
            | BlockError::UnterminatedComment { offset } => *offset,
        }
    }
}

// ============================================================================
// SCANNER
// ============================================================================

/// A `{% ... %}` tag reduced to what the scanner needs.
struct RawTag<'s> {
    /// Tag name (`macro`, `endmacro`, `if`, ...).
    name: &'s str,
    /// Second name in the tag, the declared block name if there is one.
    declared: Option<&'s str>,
    start: usize,
    end: usize,
}

struct OpenBlock<'s> {
    kind: BlockKind,
    declared: Option<&'s str>,
    start: usize,
}

/// Slice a template file into its top-level macro-definition blocks.
///
/// Returns blocks in source order. Content between blocks, and any tags of
/// kinds outside the allow-list, are skipped without error.
pub fn toplevel_blocks(text: &str) -> Result<Vec<MacroBlock<'_>>, BlockError> {
    let tokens = tokenize(text);
    let tags = collect_tags(&tokens)?;

    let mut blocks = Vec::new();
    let mut current: Option<OpenBlock<'_>> = None;
    let mut depth = 0u32;

    for tag in tags {
        if let Some(open) = current.as_ref() {
            if tag.name == open.kind.tag() {
                depth += 1;
            } else if tag.name == open.kind.end_tag() {
                if depth > 0 {
                    depth -= 1;
                } else if let Some(open) = current.take() {
                    blocks.push(MacroBlock {
                        kind: open.kind,
                        name: open.declared,
                        text: &text[open.start..tag.end],
                        range: TextRange::new(
                            TextSize::new(open.start as u32),
                            TextSize::new(tag.end as u32),
                        ),
                    });
                }
            }
        } else if let Some(kind) = BlockKind::from_tag(tag.name) {
            current = Some(OpenBlock {
                kind,
                declared: tag.declared,
                start: tag.start,
            });
            depth = 0;
        } else if let Some(inner) = tag.name.strip_prefix("end") {
            if BlockKind::from_tag(inner).is_some() {
                return Err(BlockError::UnexpectedEndTag {
                    tag: tag.name.into(),
                    offset: tag.start as u32,
                });
            }
        }
    }

    if let Some(open) = current {
        return Err(BlockError::UnclosedBlock {
            tag: open.kind.tag(),
            name: open.declared.unwrap_or_default().into(),
            offset: open.start as u32,
        });
    }

    Ok(blocks)
}

/// Walk the token stream and pull out every `{% ... %}` tag.
fn collect_tags<'s>(tokens: &[Token<'s>]) -> Result<Vec<RawTag<'s>>, BlockError> {
    let mut tags = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];
        match tok.kind {
            SyntaxKind::Comment => {
                if tok.text.len() < 4 || !tok.text.ends_with("#}") {
                    return Err(BlockError::UnterminatedComment {
                        offset: u32::from(tok.range.start()),
                    });
                }
            }
            SyntaxKind::BlockBegin => {
                let start = usize::from(tok.range.start());
                let mut name = None;
                let mut declared = None;
                let mut end = None;
                let mut j = i + 1;
                while j < tokens.len() {
                    match tokens[j].kind {
                        SyntaxKind::BlockEnd => {
                            end = Some(usize::from(tokens[j].range.end()));
                            break;
                        }
                        SyntaxKind::Name if name.is_none() => name = Some(tokens[j].text),
                        SyntaxKind::Name if declared.is_none() => declared = Some(tokens[j].text),
                        _ => {}
                    }
                    j += 1;
                }
                let Some(end) = end else {
                    return Err(BlockError::UnterminatedTag {
                        offset: start as u32,
                    });
                };
                if let Some(name) = name {
                    tags.push(RawTag {
                        name,
                        declared,
                        start,
                        end,
                    });
                }
                i = j + 1;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    Ok(tags)
}
