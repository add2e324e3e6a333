//! Extraction of macro definitions from template source.
//!
//! Extraction runs in two stages. The block scanner
//! ([`toplevel_blocks`]) slices the file into definition-style blocks
//! without parsing their bodies; each block is then parsed on its own and
//! searched for the macro node it defines. The common shape, where the block
//! *is* the definition, is recognized structurally (a single definition node
//! at the root, nothing else but comments); anything less tidy falls back to
//! a document-order walk that takes the first definition node found.
//!
//! Found nodes register under decorated names ([`MACRO_PREFIX`] and the
//! `materialization_<name>_<adapter>` convention). [`strip_node_name`]
//! recovers the bare lookup name; nodes carrying neither decoration are
//! discarded rather than reported.

use std::path::{Path, PathBuf};

use smol_str::SmolStr;
use thiserror::Error;
use tracing::trace;

use crate::syntax::ast::{MACRO_PREFIX, MATERIALIZATION_PREFIX, MacroDef};
use crate::syntax::blocks::{BlockError, MacroBlock, toplevel_blocks};
use crate::syntax::kind::{SyntaxKind, SyntaxNode};
use crate::syntax::parser::parse;

use super::definition::{MacroDefinition, MacroOrigin};

// ============================================================================
// ERRORS
// ============================================================================

/// Why a file's macros could not be extracted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("{message} at offset {offset}")]
    Syntax { message: String, offset: u32 },

    #[error("block `{{% {tag} %}}` at offset {offset} does not define a macro")]
    MalformedMacro { tag: &'static str, offset: u32 },
}

impl ExtractError {
    /// Byte offset of the problem within the scanned file.
    pub fn offset(&self) -> u32 {
        match self {
            Self::Block(err) => err.offset(),
            Self::Syntax { offset, .. } => *offset,
            Self::MalformedMacro { offset, .. } => *offset,
        }
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Extracts macro definitions for one package.
///
/// The extractor itself is cheap and reusable across files; per-file state
/// lives in the [`Macros`] iterator returned by [`extract`](Self::extract).
#[derive(Clone, Debug)]
pub struct MacroExtractor {
    package: SmolStr,
}

impl MacroExtractor {
    pub fn new(package: impl Into<SmolStr>) -> Self {
        Self {
            package: package.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Scan `text` for definition blocks and return a lazy iterator over the
    /// definitions they contain. Scanner-level errors (unclosed blocks,
    /// unterminated tags) surface here; per-block parse errors surface as
    /// `Err` items of the iterator.
    pub fn extract<'s>(
        &self,
        path: &Path,
        text: &'s str,
    ) -> Result<Macros<'s>, ExtractError> {
        let blocks = toplevel_blocks(text)?;
        trace!(path = %path.display(), blocks = blocks.len(), "scanned definition blocks");
        Ok(Macros {
            package: self.package.clone(),
            path: path.to_path_buf(),
            blocks: blocks.into_iter(),
        })
    }
}

/// Lazy stream of definitions from one file.
#[derive(Debug)]
pub struct Macros<'s> {
    package: SmolStr,
    path: PathBuf,
    blocks: std::vec::IntoIter<MacroBlock<'s>>,
}

impl<'s> Macros<'s> {
    fn definition_of(
        &self,
        block: &MacroBlock<'s>,
    ) -> Result<Option<MacroDefinition>, ExtractError> {
        let parse = parse(block.text);
        if let Some(err) = parse.errors().first() {
            return Err(ExtractError::Syntax {
                message: err.message().to_string(),
                offset: (block.range.start() + err.range().start()).into(),
            });
        }

        let root = parse.syntax();
        let Some(def) = find_macro_def(&root) else {
            return Err(ExtractError::MalformedMacro {
                tag: block.kind.tag(),
                offset: block.range.start().into(),
            });
        };
        let Some(node_name) = def.node_name() else {
            return Err(ExtractError::MalformedMacro {
                tag: block.kind.tag(),
                offset: block.range.start().into(),
            });
        };
        let Some(bare) = strip_node_name(&node_name) else {
            return Ok(None);
        };

        Ok(Some(MacroDefinition::new(
            self.package.clone(),
            bare,
            block.text,
            MacroOrigin::new(&self.path, block.range),
        )))
    }
}

impl<'s> Iterator for Macros<'s> {
    type Item = Result<MacroDefinition, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let block = self.blocks.next()?;
            match self.definition_of(&block) {
                Ok(Some(def)) => return Some(Ok(def)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Locate the definition node of a parsed block.
///
/// Fast path: the template body is exactly one definition node (comments
/// aside). Otherwise walk the tree in document order and take the first
/// definition node, wherever it is nested. The first-match contract is
/// deliberate; a block with several candidates yields its earliest one.
fn find_macro_def(root: &SyntaxNode) -> Option<MacroDef> {
    let mut children = root.children();
    if let (Some(only), None) = (children.next(), children.next()) {
        let clean = root
            .children_with_tokens()
            .filter_map(|element| element.into_token())
            .all(|token| token.kind() == SyntaxKind::Comment);
        if clean {
            if let Some(def) = MacroDef::cast(only) {
                return Some(def);
            }
        }
    }
    root.descendants().find_map(MacroDef::cast)
}

/// Recover the bare lookup name from a decorated node name, or `None` if the
/// name carries no known decoration.
fn strip_node_name(name: &str) -> Option<&str> {
    if let Some(bare) = name.strip_prefix(MACRO_PREFIX) {
        return Some(bare);
    }
    if let Some(rest) = name.strip_prefix(MATERIALIZATION_PREFIX) {
        // materialization_<name>_<adapter>; adapters are single identifiers.
        if let Some((bare, _adapter)) = rest.rsplit_once('_') {
            return Some(bare);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_all(text: &str) -> Vec<MacroDefinition> {
        let extractor = MacroExtractor::new("my_pkg");
        extractor
            .extract(Path::new("macros/x.sql"), text)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_single_macro() {
        let text = "{% macro pluck(items, key) %}{{ items }}{% endmacro %}";
        let defs = extract_all(text);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].package(), "my_pkg");
        assert_eq!(defs[0].name(), "pluck");
        assert_eq!(defs[0].body(), text);
        assert_eq!(defs[0].origin().path(), Path::new("macros/x.sql"));
    }

    #[test]
    fn test_data_between_blocks_is_ignored() {
        let text = "-- header\n{% macro a() %}1{% endmacro %}\n\n{% macro b() %}2{% endmacro %}\n";
        let defs = extract_all(text);
        let names: Vec<_> = defs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(defs[0].body(), "{% macro a() %}1{% endmacro %}");
    }

    #[test]
    fn test_test_blocks_store_decorated_bare_name() {
        let defs = extract_all("{% test is_even(model, col) %}select 1{% endtest %}");
        assert_eq!(defs[0].name(), "test_is_even");

        let defs = extract_all("{% data_test also_even(model) %}select 2{% enddata_test %}");
        assert_eq!(defs[0].name(), "test_also_even");
    }

    #[test]
    fn test_materialization_strips_to_bare_name() {
        let defs = extract_all(
            "{% materialization my_mat, adapter='postgres' %}x{% endmaterialization %}",
        );
        assert_eq!(defs[0].name(), "my_mat");

        let defs = extract_all("{% materialization my_mat, default %}x{% endmaterialization %}");
        assert_eq!(defs[0].name(), "my_mat");
    }

    #[test]
    fn test_origin_spans_the_block() {
        let text = "junk {% macro m() %}x{% endmacro %} tail";
        let defs = extract_all(text);
        let range = defs[0].origin().range();
        assert_eq!(&text[range], "{% macro m() %}x{% endmacro %}");
    }

    #[test]
    fn test_scanner_error_is_returned_upfront() {
        let extractor = MacroExtractor::new("pkg");
        let err = extractor
            .extract(Path::new("f.sql"), "{% macro broken() %}never closed")
            .unwrap_err();
        assert!(matches!(err, ExtractError::Block(_)));
    }

    #[test]
    fn test_parse_error_offset_is_file_relative() {
        // The broken block starts after a valid one; its error offset must
        // point into the file, not into the block.
        let good = "{% macro a() %}1{% endmacro %}\n";
        let bad = "{% macro b() %}{{ }}{% endmacro %}";
        let text = format!("{good}{bad}");

        let extractor = MacroExtractor::new("pkg");
        let results: Vec<_> = extractor
            .extract(Path::new("f.sql"), &text)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(err, ExtractError::Syntax { .. }));
        assert!(err.offset() >= good.len() as u32);
    }

    #[test]
    fn test_definitions_yield_lazily_per_block() {
        // The nameless second block scans fine but fails to parse.
        let text = "{% macro ok() %}1{% endmacro %}{% macro %}2{% endmacro %}";
        let extractor = MacroExtractor::new("pkg");
        let mut iter = extractor.extract(Path::new("f.sql"), text).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_find_macro_def_fast_path() {
        let parse = parse("{% macro m() %}x{% endmacro %}");
        let root = parse.syntax();
        let def = find_macro_def(&root).unwrap();
        assert_eq!(def.declared_name().unwrap(), "m");
    }

    #[test]
    fn test_find_macro_def_walks_into_wrappers() {
        // A definition nested under a conditional is still found, first in
        // document order.
        let parse = parse(
            "{% if flag %}{% macro hidden() %}x{% endmacro %}{% macro second() %}y{% endmacro %}{% endif %}",
        );
        let root = parse.syntax();
        let def = find_macro_def(&root).unwrap();
        assert_eq!(def.declared_name().unwrap(), "hidden");
    }

    #[test]
    fn test_find_macro_def_none_without_definitions() {
        let parse = parse("{% if x %}plain{% endif %}");
        assert!(find_macro_def(&parse.syntax()).is_none());
    }

    #[test]
    fn test_strip_node_name() {
        assert_eq!(strip_node_name("templar_macro__foo"), Some("foo"));
        assert_eq!(strip_node_name("templar_macro__test_foo"), Some("test_foo"));
        assert_eq!(strip_node_name("materialization_my_mat_default"), Some("my_mat"));
        assert_eq!(strip_node_name("materialization_x_postgres"), Some("x"));
        assert_eq!(strip_node_name("plain_name"), None);
    }
}
