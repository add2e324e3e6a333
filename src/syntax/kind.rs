//! Syntax kinds for the template language.
//!
//! One flat [`SyntaxKind`] enum covers both token kinds (leaves) and node
//! kinds (interior), as rowan expects. The parser builds a lossless green
//! tree over these kinds; every byte of source text lands in some token.

// ============================================================================
// SYNTAX KIND
// ============================================================================

/// All token and node kinds of the template syntax tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum SyntaxKind {
    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------
    /// Raw template text outside any delimiter.
    Data,
    /// `{%`, with optional whitespace-control marker (`{%-`, `{%+`).
    BlockBegin,
    /// `%}`, with optional whitespace-control marker (`-%}`, `+%}`).
    BlockEnd,
    /// `{{` opening an output expression.
    VariableBegin,
    /// `}}` closing an output expression.
    VariableEnd,
    /// A whole `{# ... #}` comment, delimiters included.
    Comment,
    /// Whitespace inside a tag or output expression.
    Whitespace,
    /// Identifier or keyword (`macro`, `if`, `and`, ...). Keywords are not
    /// split into their own kinds; the parser matches on token text.
    Name,
    Integer,
    Float,
    /// Single- or double-quoted string literal, quotes included.
    String,

    // Operators and punctuation, named as in the expression lexer.
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Assign,
    Colon,
    Comma,
    Dot,
    Pipe,
    Semicolon,
    Tilde,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    /// Unrecognized input. Used both as a token kind (bad character) and as
    /// a node kind (parser recovery wrapper).
    Error,

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------
    /// Root node of a parsed template or block.
    Template,
    /// `{{ expr }}` output statement.
    Output,

    /// `{% macro name(args) %} ... {% endmacro %}`.
    StmtMacro,
    /// `{% materialization name, adapter %} ... {% endmaterialization %}`.
    StmtMaterialization,
    /// `{% test name(args) %}` or `{% data_test name(args) %}` block.
    StmtTest,
    StmtIf,
    StmtFor,
    StmtSet,
    StmtCall,
    StmtFilter,
    StmtBlock,
    StmtRaw,
    /// Statement tag the parser has no structural rule for; consumed as a
    /// standalone tag without body pairing.
    StmtUnknown,

    /// Start tag of a macro-defining statement (macro, materialization,
    /// test, data_test): delimiters, keyword, name, and header clauses.
    MacroBlockStart,
    /// Matching `{% end... %}` tag of a macro-defining statement.
    MacroBlockEnd,
    /// Start tag of any other statement.
    StmtStart,
    /// End tag of any other statement.
    StmtEnd,

    /// Parenthesized parameter list of a macro or test definition.
    Signature,
    /// Plain parameter inside a [`SyntaxKind::Signature`].
    SignatureArg,
    /// Parameter with a default value (`name=expr`).
    SignatureDefaultArg,
    /// Keyword argument at a call site (`name=expr`).
    KeywordArg,

    ExprName,
    ExprLiteral,
    ExprList,
    ExprTuple,
    ExprDict,
    ExprParen,
    ExprUnary,
    ExprBinary,
    /// Conditional expression `a if b else c`.
    ExprCond,
    ExprCall,
    /// Attribute access `expr.name`.
    ExprAttr,
    /// Subscript `expr[...]`.
    ExprIndex,
    /// Filter application `expr | name(...)`.
    ExprFilter,

    #[doc(hidden)]
    __Last,
}

impl SyntaxKind {
    /// Whitespace and comments: present in the tree, ignored by structure.
    pub fn is_trivia(self) -> bool {
        matches!(self, SyntaxKind::Whitespace | SyntaxKind::Comment)
    }

    /// Node kinds that define a macro: plain macros, materializations, and
    /// test-style blocks.
    pub fn is_macro_def(self) -> bool {
        matches!(
            self,
            SyntaxKind::StmtMacro | SyntaxKind::StmtMaterialization | SyntaxKind::StmtTest
        )
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

// ============================================================================
// ROWAN LANGUAGE
// ============================================================================

/// The template language, as rowan sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateLanguage {}

impl rowan::Language for TemplateLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        assert!(raw.0 < SyntaxKind::__Last as u16);
        // Safe by the assert: SyntaxKind is repr(u16) and dense.
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

/// Syntax node specialized to the template language.
pub type SyntaxNode = rowan::SyntaxNode<TemplateLanguage>;
/// Syntax token specialized to the template language.
pub type SyntaxToken = rowan::SyntaxToken<TemplateLanguage>;
/// Node-or-token element specialized to the template language.
pub type SyntaxElement = rowan::SyntaxElement<TemplateLanguage>;

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::Language;

    #[test]
    fn test_kind_raw_round_trip() {
        for kind in [
            SyntaxKind::Data,
            SyntaxKind::BlockBegin,
            SyntaxKind::Name,
            SyntaxKind::Template,
            SyntaxKind::StmtMacro,
            SyntaxKind::ExprFilter,
        ] {
            let raw = TemplateLanguage::kind_to_raw(kind);
            assert_eq!(TemplateLanguage::kind_from_raw(raw), kind);
        }
    }

    #[test]
    fn test_macro_def_kinds() {
        assert!(SyntaxKind::StmtMacro.is_macro_def());
        assert!(SyntaxKind::StmtMaterialization.is_macro_def());
        assert!(SyntaxKind::StmtTest.is_macro_def());
        assert!(!SyntaxKind::StmtIf.is_macro_def());
        assert!(!SyntaxKind::MacroBlockStart.is_macro_def());
    }

    #[test]
    fn test_trivia_kinds() {
        assert!(SyntaxKind::Whitespace.is_trivia());
        assert!(SyntaxKind::Comment.is_trivia());
        assert!(!SyntaxKind::Data.is_trivia());
    }
}
