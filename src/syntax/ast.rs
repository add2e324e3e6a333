//! Typed views over the raw syntax tree.
//!
//! The parser produces untyped [`SyntaxNode`]s; this module wraps the node
//! kinds that matter to macro indexing in thin typed accessors, following
//! the usual cast-based pattern: `cast` returns `Some` only for nodes of the
//! right kind, and every accessor walks the underlying tree on demand.
//!
//! Definition-style blocks (`macro`, `test`, `data_test`, `materialization`)
//! all share the [`MacroDef`] view. Each carries a *declared name* (what the
//! author wrote) and a *node name* (the internal, decorated form used for
//! registration): plain macros get [`MACRO_PREFIX`] prepended, test blocks
//! additionally get a `test_` head, and materializations use the
//! `materialization_<name>_<adapter>` convention instead.

use smol_str::SmolStr;
use text_size::TextRange;

use super::kind::{SyntaxKind, SyntaxNode};

/// Prefix that marks a registered macro node name.
pub const MACRO_PREFIX: &str = "templar_macro__";

/// Prefix that marks a registered materialization node name.
pub const MATERIALIZATION_PREFIX: &str = "materialization_";

// ============================================================================
// MACRO DEFINITIONS
// ============================================================================

/// A macro-style definition block: `macro`, `test`, `data_test`, or
/// `materialization`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroDef {
    syntax: SyntaxNode,
}

impl MacroDef {
    pub fn cast(syntax: SyntaxNode) -> Option<Self> {
        if syntax.kind().is_macro_def() {
            Some(Self { syntax })
        } else {
            None
        }
    }

    pub fn syntax(&self) -> &SyntaxNode {
        &self.syntax
    }

    pub fn kind(&self) -> SyntaxKind {
        self.syntax.kind()
    }

    pub fn range(&self) -> TextRange {
        self.syntax.text_range()
    }

    fn block_start(&self) -> Option<SyntaxNode> {
        self.syntax
            .children()
            .find(|n| n.kind() == SyntaxKind::MacroBlockStart)
    }

    /// The name as written in the opening tag.
    pub fn declared_name(&self) -> Option<SmolStr> {
        let start = self.block_start()?;
        let name = start
            .children()
            .find(|n| n.kind() == SyntaxKind::ExprName)?;
        Some(SmolStr::new(name.text().to_string()))
    }

    /// The adapter a materialization is declared for. The keyword form
    /// (`adapter='postgres'`) wins over the bare form (`, default`); absent
    /// both, the adapter is `default`.
    pub fn adapter_name(&self) -> SmolStr {
        let Some(start) = self.block_start() else {
            return SmolStr::new_static("default");
        };
        for kw in start
            .children()
            .filter(|n| n.kind() == SyntaxKind::KeywordArg)
        {
            let mut parts = kw.children();
            let key = parts.next();
            let value = parts.next();
            if let (Some(key), Some(value)) = (key, value) {
                if key.text() == "adapter" {
                    let text = value.text().to_string();
                    return SmolStr::new(text.trim_matches(|c| c == '\'' || c == '"'));
                }
            }
        }
        // Bare form: the second name in the tag, after the materialization
        // name itself.
        if let Some(adapter) = start
            .children()
            .filter(|n| n.kind() == SyntaxKind::ExprName)
            .nth(1)
        {
            return SmolStr::new(adapter.text().to_string());
        }
        SmolStr::new_static("default")
    }

    /// The decorated node name under which this definition registers.
    pub fn node_name(&self) -> Option<SmolStr> {
        let declared = self.declared_name()?;
        let name = match self.syntax.kind() {
            SyntaxKind::StmtMacro => format!("{MACRO_PREFIX}{declared}"),
            SyntaxKind::StmtTest => format!("{MACRO_PREFIX}test_{declared}"),
            SyntaxKind::StmtMaterialization => {
                let adapter = self.adapter_name();
                format!("{MATERIALIZATION_PREFIX}{declared}_{adapter}")
            }
            _ => return None,
        };
        Some(SmolStr::from(name))
    }

    pub fn signature(&self) -> Option<Signature> {
        self.block_start()?
            .children()
            .find_map(Signature::cast)
    }
}

// ============================================================================
// SIGNATURES
// ============================================================================

/// The parenthesized parameter list of a macro or test definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    syntax: SyntaxNode,
}

impl Signature {
    pub fn cast(syntax: SyntaxNode) -> Option<Self> {
        if syntax.kind() == SyntaxKind::Signature {
            Some(Self { syntax })
        } else {
            None
        }
    }

    pub fn syntax(&self) -> &SyntaxNode {
        &self.syntax
    }

    pub fn params(&self) -> impl Iterator<Item = SignatureParam> + '_ {
        self.syntax.children().filter_map(SignatureParam::cast)
    }
}

/// One parameter of a signature, defaulted or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureParam {
    syntax: SyntaxNode,
}

impl SignatureParam {
    pub fn cast(syntax: SyntaxNode) -> Option<Self> {
        match syntax.kind() {
            SyntaxKind::SignatureArg | SyntaxKind::SignatureDefaultArg => Some(Self { syntax }),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<SmolStr> {
        let name = self
            .syntax
            .children()
            .find(|n| n.kind() == SyntaxKind::ExprName)?;
        Some(SmolStr::new(name.text().to_string()))
    }

    pub fn has_default(&self) -> bool {
        self.syntax.kind() == SyntaxKind::SignatureDefaultArg
    }
}
