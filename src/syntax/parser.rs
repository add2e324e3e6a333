//! Recursive-descent parser producing a lossless rowan tree.
//!
//! The parser consumes the token stream from [`tokenize`] and builds a green
//! tree in which every token of the input appears exactly once, so
//! `parse(text).syntax().text() == text` always holds. Errors never abort
//! the parse; they are collected on the side ([`Parse::errors`]) while the
//! tree is completed with best-effort recovery.
//!
//! Statement structure is fully nested (a macro inside an `{% if %}` body
//! sits inside the `StmtIf` node), which is what document-order searches
//! for macro-definition nodes rely on. Expression grammar is the usual
//! template-language core: literals, names, collections, unary/binary
//! operators, comparisons with `in` / `not in` / `is`, conditional
//! expressions, calls with keyword arguments, attribute and subscript
//! access, and `|` filter pipelines.

use rowan::{GreenNode, GreenNodeBuilder};
use text_size::{TextRange, TextSize};

use super::kind::{SyntaxKind, SyntaxNode};
use super::lexer::{Token, tokenize};

// ============================================================================
// PARSE RESULT
// ============================================================================

/// A syntax error recorded during parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    message: String,
    range: TextRange,
}

impl SyntaxError {
    /// Human-readable description of the problem.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte range of the offending input.
    pub fn range(&self) -> TextRange {
        self.range
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, u32::from(self.range.start()))
    }
}

/// The result of parsing: a green tree plus collected errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parse {
    green: GreenNode,
    errors: Vec<SyntaxError>,
}

impl Parse {
    /// The underlying green node.
    pub fn green(&self) -> GreenNode {
        self.green.clone()
    }

    /// A fresh syntax-node view over the tree.
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// Errors collected during parsing, in source order.
    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }

    /// True if the input parsed without errors.
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a template (or a single block sliced from one) into a tree.
pub fn parse(text: &str) -> Parse {
    Parser::new(tokenize(text)).run()
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser<'s> {
    tokens: Vec<Token<'s>>,
    pos: usize,
    builder: GreenNodeBuilder<'static>,
    errors: Vec<SyntaxError>,
}

impl<'s> Parser<'s> {
    fn new(tokens: Vec<Token<'s>>) -> Self {
        Self {
            tokens,
            pos: 0,
            builder: GreenNodeBuilder::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Parse {
        self.builder.start_node(SyntaxKind::Template.into());
        while self.peek_kind().is_some() {
            self.parse_item();
        }
        self.builder.finish_node();
        Parse {
            green: self.builder.finish(),
            errors: self.errors,
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<SyntaxKind> {
        self.peek().map(|t| t.kind)
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// First non-whitespace token at or after the cursor.
    fn sig(&self) -> Option<&Token<'s>> {
        self.tokens[self.pos..]
            .iter()
            .find(|t| t.kind != SyntaxKind::Whitespace)
    }

    /// Second non-whitespace token at or after the cursor.
    fn sig2(&self) -> Option<&Token<'s>> {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| t.kind != SyntaxKind::Whitespace)
            .nth(1)
    }

    fn sig_kind(&self) -> Option<SyntaxKind> {
        self.sig().map(|t| t.kind)
    }

    fn sig_is_name(&self, text: &str) -> bool {
        self.sig()
            .is_some_and(|t| t.kind == SyntaxKind::Name && t.text == text)
    }

    /// Advance one token into the current node.
    fn bump(&mut self) {
        if let Some(tok) = self.tokens.get(self.pos).copied() {
            self.builder.token(tok.kind.into(), tok.text);
            self.pos += 1;
        }
    }

    /// Consume any whitespace tokens.
    fn ws(&mut self) {
        while self.at(SyntaxKind::Whitespace) {
            self.bump();
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let range = match self.peek() {
            Some(tok) => tok.range,
            None => {
                let end = self
                    .tokens
                    .last()
                    .map(|t| t.range.end())
                    .unwrap_or_else(|| TextSize::new(0));
                TextRange::empty(end)
            }
        };
        self.errors.push(SyntaxError {
            message: message.into(),
            range,
        });
    }

    /// Tag name of the `{% ... %}` starting at the cursor, without consuming.
    fn peek_tag_name(&self) -> Option<&'s str> {
        debug_assert!(self.at(SyntaxKind::BlockBegin));
        self.tokens[self.pos + 1..]
            .iter()
            .take_while(|t| t.kind != SyntaxKind::BlockEnd)
            .find(|t| t.kind == SyntaxKind::Name)
            .map(|t| t.text)
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    fn parse_item(&mut self) {
        match self.peek_kind() {
            Some(SyntaxKind::Data | SyntaxKind::Comment | SyntaxKind::Error) => self.bump(),
            Some(SyntaxKind::VariableBegin) => self.parse_output(),
            Some(SyntaxKind::BlockBegin) => self.parse_statement(),
            Some(_) => {
                // Stray token at template level, e.g. from malformed input.
                self.error_here("unexpected token");
                self.bump();
            }
            None => {}
        }
    }

    fn parse_output(&mut self) {
        self.builder.start_node(SyntaxKind::Output.into());
        self.bump(); // {{
        self.ws();
        if self.at(SyntaxKind::VariableEnd) {
            self.error_here("expected an expression inside `{{ ... }}`");
        } else if self.peek_kind().is_some() {
            self.parse_expr();
        }
        loop {
            self.ws();
            match self.peek_kind() {
                Some(SyntaxKind::VariableEnd) => {
                    self.bump();
                    break;
                }
                Some(SyntaxKind::Data | SyntaxKind::BlockBegin) | None => {
                    self.error_here("missing `}}`");
                    break;
                }
                Some(_) => {
                    self.error_here("unexpected token in output expression");
                    self.bump();
                }
            }
        }
        self.builder.finish_node();
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) {
        match self.peek_tag_name() {
            Some("macro") => self.parse_macro_like(SyntaxKind::StmtMacro, "endmacro"),
            Some("test") => self.parse_macro_like(SyntaxKind::StmtTest, "endtest"),
            Some("data_test") => self.parse_macro_like(SyntaxKind::StmtTest, "enddata_test"),
            Some("materialization") => self.parse_materialization(),
            Some("if") => self.parse_if(),
            Some("for") => self.parse_for(),
            Some("set") => self.parse_set(),
            Some("call") => self.parse_paired(SyntaxKind::StmtCall, "endcall"),
            Some("filter") => self.parse_paired(SyntaxKind::StmtFilter, "endfilter"),
            Some("block") => self.parse_paired(SyntaxKind::StmtBlock, "endblock"),
            Some("raw") => self.parse_raw(),
            Some(name) if name.starts_with("end") => {
                self.error_here(format!("unexpected closing tag `{{% {name} %}}`"));
                self.parse_unknown();
            }
            Some(_) => self.parse_unknown(),
            None => {
                self.error_here("expected a tag name after `{%`");
                self.parse_unknown();
            }
        }
    }

    /// `{% macro name(sig) %} body {% endmacro %}` and the test-style twins.
    fn parse_macro_like(&mut self, kind: SyntaxKind, end_tag: &str) {
        self.builder.start_node(kind.into());

        self.builder.start_node(SyntaxKind::MacroBlockStart.into());
        self.bump(); // {%
        self.ws();
        self.bump(); // keyword
        self.ws();
        if self.at(SyntaxKind::Name) {
            self.builder.start_node(SyntaxKind::ExprName.into());
            self.bump();
            self.builder.finish_node();
        } else {
            self.error_here("expected a macro name");
        }
        self.ws();
        if self.at(SyntaxKind::LeftParen) {
            self.parse_signature();
        }
        self.ws();
        if !self.at(SyntaxKind::BlockEnd) && self.peek_kind().is_some() {
            self.error_here("unexpected tokens in macro tag");
        }
        self.consume_tag_rest();
        self.builder.finish_node(); // MacroBlockStart

        match self.parse_body_until(&[end_tag]) {
            Some(_) => self.parse_end_tag(SyntaxKind::MacroBlockEnd),
            None => self.error_here(format!("missing `{{% {end_tag} %}}`")),
        }

        self.builder.finish_node();
    }

    /// `{% materialization name, adapter='x' %}` has a header clause instead
    /// of a signature.
    fn parse_materialization(&mut self) {
        self.builder.start_node(SyntaxKind::StmtMaterialization.into());

        self.builder.start_node(SyntaxKind::MacroBlockStart.into());
        self.bump(); // {%
        self.ws();
        self.bump(); // keyword
        self.ws();
        if self.at(SyntaxKind::Name) {
            self.builder.start_node(SyntaxKind::ExprName.into());
            self.bump();
            self.builder.finish_node();
        } else {
            self.error_here("expected a materialization name");
        }
        let mut saw_clause = false;
        loop {
            self.ws();
            match self.peek_kind() {
                Some(SyntaxKind::BlockEnd) => {
                    self.bump();
                    break;
                }
                None => {
                    self.error_here("unterminated materialization tag");
                    break;
                }
                Some(SyntaxKind::Comma) => {
                    saw_clause = true;
                    self.bump();
                }
                Some(SyntaxKind::Name) if self.sig2().is_some_and(|t| t.kind == SyntaxKind::Assign) => {
                    self.parse_keyword_arg();
                }
                Some(SyntaxKind::Name) => {
                    self.builder.start_node(SyntaxKind::ExprName.into());
                    self.bump();
                    self.builder.finish_node();
                }
                Some(_) => {
                    self.error_here("unexpected token in materialization tag");
                    self.bump();
                }
            }
        }
        if !saw_clause {
            self.error_here("materialization requires `, default` or `, adapter=...`");
        }
        self.builder.finish_node(); // MacroBlockStart

        match self.parse_body_until(&["endmaterialization"]) {
            Some(_) => self.parse_end_tag(SyntaxKind::MacroBlockEnd),
            None => self.error_here("missing `{% endmaterialization %}`"),
        }

        self.builder.finish_node();
    }

    /// `( name, name=default, ... )`.
    fn parse_signature(&mut self) {
        self.builder.start_node(SyntaxKind::Signature.into());
        self.bump(); // (
        loop {
            self.ws();
            match self.peek_kind() {
                Some(SyntaxKind::RightParen) => {
                    self.bump();
                    break;
                }
                Some(SyntaxKind::Comma) => self.bump(),
                Some(SyntaxKind::Name) => {
                    let default = self.sig2().is_some_and(|t| t.kind == SyntaxKind::Assign);
                    let kind = if default {
                        SyntaxKind::SignatureDefaultArg
                    } else {
                        SyntaxKind::SignatureArg
                    };
                    self.builder.start_node(kind.into());
                    self.builder.start_node(SyntaxKind::ExprName.into());
                    self.bump();
                    self.builder.finish_node();
                    if default {
                        self.ws();
                        self.bump(); // =
                        self.ws();
                        self.parse_expr();
                    }
                    self.builder.finish_node();
                }
                Some(SyntaxKind::BlockEnd) | None => {
                    self.error_here("unclosed parameter list");
                    break;
                }
                Some(_) => {
                    self.error_here("unexpected token in parameter list");
                    self.bump();
                }
            }
        }
        self.builder.finish_node();
    }

    fn parse_if(&mut self) {
        self.builder.start_node(SyntaxKind::StmtIf.into());
        self.parse_tag(SyntaxKind::StmtStart);
        loop {
            match self.parse_body_until(&["elif", "else", "endif"]) {
                Some("elif") | Some("else") => {
                    self.parse_tag(SyntaxKind::StmtStart);
                }
                Some(_) => {
                    self.parse_end_tag(SyntaxKind::StmtEnd);
                    break;
                }
                None => {
                    self.error_here("missing `{% endif %}`");
                    break;
                }
            }
        }
        self.builder.finish_node();
    }

    fn parse_for(&mut self) {
        self.builder.start_node(SyntaxKind::StmtFor.into());
        self.parse_tag(SyntaxKind::StmtStart);
        loop {
            match self.parse_body_until(&["else", "endfor"]) {
                Some("else") => {
                    self.parse_tag(SyntaxKind::StmtStart);
                }
                Some(_) => {
                    self.parse_end_tag(SyntaxKind::StmtEnd);
                    break;
                }
                None => {
                    self.error_here("missing `{% endfor %}`");
                    break;
                }
            }
        }
        self.builder.finish_node();
    }

    /// `{% set x = expr %}` stands alone; `{% set x %} ... {% endset %}`
    /// opens a body. The assignment form is told apart by the `=` in the tag.
    fn parse_set(&mut self) {
        self.builder.start_node(SyntaxKind::StmtSet.into());
        let saw_assign = self.parse_tag(SyntaxKind::StmtStart);
        if !saw_assign {
            match self.parse_body_until(&["endset"]) {
                Some(_) => self.parse_end_tag(SyntaxKind::StmtEnd),
                None => self.error_here("missing `{% endset %}`"),
            }
        }
        self.builder.finish_node();
    }

    fn parse_paired(&mut self, kind: SyntaxKind, end_tag: &str) {
        self.builder.start_node(kind.into());
        self.parse_tag(SyntaxKind::StmtStart);
        match self.parse_body_until(&[end_tag]) {
            Some(_) => self.parse_end_tag(SyntaxKind::StmtEnd),
            None => self.error_here(format!("missing `{{% {end_tag} %}}`")),
        }
        self.builder.finish_node();
    }

    /// `{% raw %}` bodies arrive from the lexer as one data token.
    fn parse_raw(&mut self) {
        self.builder.start_node(SyntaxKind::StmtRaw.into());
        self.parse_tag(SyntaxKind::StmtStart);
        if self.at(SyntaxKind::Data) {
            self.bump();
        }
        if self.at(SyntaxKind::BlockBegin) && self.peek_tag_name() == Some("endraw") {
            self.parse_end_tag(SyntaxKind::StmtEnd);
        } else {
            self.error_here("missing `{% endraw %}`");
        }
        self.builder.finish_node();
    }

    fn parse_unknown(&mut self) {
        self.builder.start_node(SyntaxKind::StmtUnknown.into());
        self.parse_tag(SyntaxKind::StmtStart);
        self.builder.finish_node();
    }

    /// Parse one whole `{% ... %}` tag as `kind`, contents as a loose
    /// expression sequence. Returns whether a top-level `=` was seen.
    fn parse_tag(&mut self, kind: SyntaxKind) -> bool {
        self.builder.start_node(kind.into());
        self.bump(); // {%
        self.ws();
        if self.at(SyntaxKind::Name) {
            self.bump(); // tag keyword
        }
        let saw_assign = self.consume_tag_rest();
        self.builder.finish_node();
        saw_assign
    }

    fn parse_end_tag(&mut self, kind: SyntaxKind) {
        self.builder.start_node(kind.into());
        self.bump(); // {%
        self.ws();
        if self.at(SyntaxKind::Name) {
            self.bump(); // end keyword
        }
        self.consume_tag_rest();
        self.builder.finish_node();
    }

    /// Consume tag contents through the closing `%}`. Expressions are parsed
    /// where they start; everything else is taken as-is. Returns whether a
    /// top-level `=` was consumed.
    fn consume_tag_rest(&mut self) -> bool {
        let mut saw_assign = false;
        loop {
            self.ws();
            match self.peek_kind() {
                None => {
                    self.error_here("unterminated tag");
                    break;
                }
                Some(SyntaxKind::BlockEnd) => {
                    self.bump();
                    break;
                }
                Some(SyntaxKind::Assign) => {
                    saw_assign = true;
                    self.bump();
                }
                Some(kind) if self.expr_startable(kind) => {
                    let before = self.pos;
                    self.parse_expr();
                    if self.pos == before {
                        self.bump();
                    }
                }
                Some(_) => self.bump(),
            }
        }
        saw_assign
    }

    /// Parse statements and data until a stop tag is seen at this nesting
    /// level. Returns the stop tag name hit, or None at end of input.
    fn parse_body_until(&mut self, stop: &[&str]) -> Option<&'s str> {
        loop {
            match self.peek_kind() {
                None => return None,
                Some(SyntaxKind::BlockBegin) => {
                    if let Some(name) = self.peek_tag_name() {
                        if stop.contains(&name) {
                            return Some(name);
                        }
                    }
                    self.parse_statement();
                }
                _ => self.parse_item(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr_startable(&self, kind: SyntaxKind) -> bool {
        matches!(
            kind,
            SyntaxKind::Name
                | SyntaxKind::Integer
                | SyntaxKind::Float
                | SyntaxKind::String
                | SyntaxKind::LeftParen
                | SyntaxKind::LeftBracket
                | SyntaxKind::LeftBrace
                | SyntaxKind::Sub
                | SyntaxKind::Add
        )
    }

    fn parse_expr(&mut self) {
        self.parse_ternary();
    }

    /// `a if cond else b`.
    fn parse_ternary(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_or();
        if self.sig_is_name("if") {
            self.builder.start_node_at(cp, SyntaxKind::ExprCond.into());
            self.ws();
            self.bump(); // if
            self.ws();
            self.parse_or();
            if self.sig_is_name("else") {
                self.ws();
                self.bump(); // else
                self.ws();
                self.parse_ternary();
            }
            self.builder.finish_node();
        }
    }

    fn parse_or(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_and();
        while self.sig_is_name("or") {
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_and();
            self.builder.finish_node();
        }
    }

    fn parse_and(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_not();
        while self.sig_is_name("and") {
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_not();
            self.builder.finish_node();
        }
    }

    fn parse_not(&mut self) {
        if self.sig_is_name("not") {
            self.builder.start_node(SyntaxKind::ExprUnary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_not();
            self.builder.finish_node();
        } else {
            self.parse_comparison();
        }
    }

    fn parse_comparison(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_concat();
        loop {
            let op_tokens = match self.sig_kind() {
                Some(
                    SyntaxKind::Eq
                    | SyntaxKind::Ne
                    | SyntaxKind::Lt
                    | SyntaxKind::LtEq
                    | SyntaxKind::Gt
                    | SyntaxKind::GtEq,
                ) => 1,
                Some(SyntaxKind::Name) => {
                    let tok = self.sig().map(|t| t.text);
                    match tok {
                        Some("in") => 1,
                        Some("is") => {
                            if self.sig2().is_some_and(|t| t.kind == SyntaxKind::Name && t.text == "not") {
                                2
                            } else {
                                1
                            }
                        }
                        Some("not")
                            if self.sig2().is_some_and(|t| {
                                t.kind == SyntaxKind::Name && t.text == "in"
                            }) =>
                        {
                            2
                        }
                        _ => break,
                    }
                }
                _ => break,
            };
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            for _ in 0..op_tokens {
                self.ws();
                self.bump();
            }
            self.ws();
            self.parse_concat();
            self.builder.finish_node();
        }
    }

    fn parse_concat(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_additive();
        while self.sig_kind() == Some(SyntaxKind::Tilde) {
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_additive();
            self.builder.finish_node();
        }
    }

    fn parse_additive(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_multiplicative();
        while matches!(self.sig_kind(), Some(SyntaxKind::Add | SyntaxKind::Sub)) {
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_multiplicative();
            self.builder.finish_node();
        }
    }

    fn parse_multiplicative(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_unary();
        while matches!(
            self.sig_kind(),
            Some(SyntaxKind::Mul | SyntaxKind::Div | SyntaxKind::FloorDiv | SyntaxKind::Mod)
        ) {
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_unary();
            self.builder.finish_node();
        }
    }

    fn parse_unary(&mut self) {
        if matches!(self.sig_kind(), Some(SyntaxKind::Sub | SyntaxKind::Add)) {
            self.builder.start_node(SyntaxKind::ExprUnary.into());
            self.ws();
            self.bump();
            self.parse_unary();
            self.builder.finish_node();
        } else {
            self.parse_power();
        }
    }

    fn parse_power(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_postfix();
        if self.sig_kind() == Some(SyntaxKind::Pow) {
            self.builder.start_node_at(cp, SyntaxKind::ExprBinary.into());
            self.ws();
            self.bump();
            self.ws();
            self.parse_unary();
            self.builder.finish_node();
        }
    }

    fn parse_postfix(&mut self) {
        let cp = self.builder.checkpoint();
        self.parse_primary();
        loop {
            match self.sig_kind() {
                Some(SyntaxKind::Dot) => {
                    self.builder.start_node_at(cp, SyntaxKind::ExprAttr.into());
                    self.ws();
                    self.bump();
                    self.ws();
                    if self.at(SyntaxKind::Name) {
                        self.bump();
                    } else {
                        self.error_here("expected an attribute name after `.`");
                    }
                    self.builder.finish_node();
                }
                Some(SyntaxKind::LeftParen) => {
                    self.builder.start_node_at(cp, SyntaxKind::ExprCall.into());
                    self.ws();
                    self.parse_call_args();
                    self.builder.finish_node();
                }
                Some(SyntaxKind::LeftBracket) => {
                    self.builder.start_node_at(cp, SyntaxKind::ExprIndex.into());
                    self.ws();
                    self.bump(); // [
                    self.ws();
                    if !self.at(SyntaxKind::RightBracket) {
                        self.parse_expr();
                        self.ws();
                        if self.at(SyntaxKind::Colon) {
                            self.bump();
                            self.ws();
                            if !self.at(SyntaxKind::RightBracket) {
                                self.parse_expr();
                                self.ws();
                            }
                        }
                    }
                    if self.at(SyntaxKind::RightBracket) {
                        self.bump();
                    } else {
                        self.error_here("missing `]`");
                    }
                    self.builder.finish_node();
                }
                Some(SyntaxKind::Pipe) => {
                    self.builder.start_node_at(cp, SyntaxKind::ExprFilter.into());
                    self.ws();
                    self.bump(); // |
                    self.ws();
                    if self.at(SyntaxKind::Name) {
                        self.bump();
                    } else {
                        self.error_here("expected a filter name after `|`");
                    }
                    if self.sig_kind() == Some(SyntaxKind::LeftParen) {
                        self.ws();
                        self.parse_call_args();
                    }
                    self.builder.finish_node();
                }
                _ => break,
            }
        }
    }

    /// `( expr, name=expr, ... )` with the parens included.
    fn parse_call_args(&mut self) {
        self.bump(); // (
        loop {
            self.ws();
            match self.peek_kind() {
                Some(SyntaxKind::RightParen) => {
                    self.bump();
                    break;
                }
                Some(SyntaxKind::Comma) => self.bump(),
                Some(SyntaxKind::Mul | SyntaxKind::Pow) => {
                    // Splatted arguments: keep the star tokens loose.
                    self.bump();
                    self.ws();
                    if self.peek_kind().is_some_and(|k| self.expr_startable(k)) {
                        self.parse_expr();
                    }
                }
                Some(SyntaxKind::Name)
                    if self.sig2().is_some_and(|t| t.kind == SyntaxKind::Assign) =>
                {
                    self.parse_keyword_arg();
                }
                Some(kind) if self.expr_startable(kind) => self.parse_expr(),
                Some(SyntaxKind::BlockEnd | SyntaxKind::VariableEnd) | None => {
                    self.error_here("unclosed argument list");
                    break;
                }
                Some(_) => {
                    self.error_here("unexpected token in argument list");
                    self.bump();
                }
            }
        }
    }

    /// `name=expr` at a call site or in a materialization header.
    fn parse_keyword_arg(&mut self) {
        self.builder.start_node(SyntaxKind::KeywordArg.into());
        self.builder.start_node(SyntaxKind::ExprName.into());
        self.bump(); // name
        self.builder.finish_node();
        self.ws();
        self.bump(); // =
        self.ws();
        if self.peek_kind().is_some_and(|k| self.expr_startable(k)) {
            self.parse_expr();
        } else {
            self.error_here("expected a value after `=`");
        }
        self.builder.finish_node();
    }

    fn parse_primary(&mut self) {
        self.ws();
        match self.peek_kind() {
            Some(SyntaxKind::Name) => {
                let literal = matches!(
                    self.peek().map(|t| t.text),
                    Some("true" | "false" | "none" | "True" | "False" | "None")
                );
                let kind = if literal {
                    SyntaxKind::ExprLiteral
                } else {
                    SyntaxKind::ExprName
                };
                self.builder.start_node(kind.into());
                self.bump();
                self.builder.finish_node();
            }
            Some(SyntaxKind::Integer | SyntaxKind::Float | SyntaxKind::String) => {
                self.builder.start_node(SyntaxKind::ExprLiteral.into());
                self.bump();
                self.builder.finish_node();
            }
            Some(SyntaxKind::LeftParen) => self.parse_paren_or_tuple(),
            Some(SyntaxKind::LeftBracket) => self.parse_list(),
            Some(SyntaxKind::LeftBrace) => self.parse_dict(),
            _ => {
                self.error_here("expected an expression");
                // Recover without touching structural tokens.
                if !matches!(
                    self.peek_kind(),
                    None | Some(SyntaxKind::BlockEnd | SyntaxKind::VariableEnd)
                ) {
                    self.builder.start_node(SyntaxKind::Error.into());
                    self.bump();
                    self.builder.finish_node();
                }
            }
        }
    }

    fn parse_paren_or_tuple(&mut self) {
        let cp = self.builder.checkpoint();
        self.bump(); // (
        self.ws();
        let mut is_tuple = false;
        if self.at(SyntaxKind::RightParen) {
            is_tuple = true; // ()
        } else {
            self.parse_expr();
            self.ws();
            while self.at(SyntaxKind::Comma) {
                is_tuple = true;
                self.bump();
                self.ws();
                if self.at(SyntaxKind::RightParen) {
                    break;
                }
                self.parse_expr();
                self.ws();
            }
        }
        let kind = if is_tuple {
            SyntaxKind::ExprTuple
        } else {
            SyntaxKind::ExprParen
        };
        self.builder.start_node_at(cp, kind.into());
        if self.at(SyntaxKind::RightParen) {
            self.bump();
        } else {
            self.error_here("missing `)`");
        }
        self.builder.finish_node();
    }

    fn parse_list(&mut self) {
        self.builder.start_node(SyntaxKind::ExprList.into());
        self.bump(); // [
        loop {
            self.ws();
            match self.peek_kind() {
                Some(SyntaxKind::RightBracket) => {
                    self.bump();
                    break;
                }
                Some(SyntaxKind::Comma) => self.bump(),
                Some(kind) if self.expr_startable(kind) => self.parse_expr(),
                _ => {
                    self.error_here("missing `]`");
                    break;
                }
            }
        }
        self.builder.finish_node();
    }

    fn parse_dict(&mut self) {
        self.builder.start_node(SyntaxKind::ExprDict.into());
        self.bump(); // {
        loop {
            self.ws();
            match self.peek_kind() {
                Some(SyntaxKind::RightBrace) => {
                    self.bump();
                    break;
                }
                Some(SyntaxKind::Comma) => self.bump(),
                Some(kind) if self.expr_startable(kind) => {
                    self.parse_expr();
                    self.ws();
                    if self.at(SyntaxKind::Colon) {
                        self.bump();
                        self.ws();
                        if self.peek_kind().is_some_and(|k| self.expr_startable(k)) {
                            self.parse_expr();
                        } else {
                            self.error_here("expected a value after `:`");
                        }
                    }
                }
                _ => {
                    self.error_here("missing `}`");
                    break;
                }
            }
        }
        self.builder.finish_node();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_child_of(parse: &Parse, kind: SyntaxKind) -> Option<SyntaxNode> {
        parse.syntax().descendants().find(|n| n.kind() == kind)
    }

    #[test]
    fn test_lossless_round_trip() {
        let text = "a {{ x.y | trim }} {% macro m(a, b=1) %}{% if a %}hi{% endif %}{% endmacro %}";
        let parse = parse(text);
        assert_eq!(parse.syntax().text().to_string(), text);
    }

    #[test]
    fn test_simple_macro_structure() {
        let parse = parse("{% macro greet(name) %}hello {{ name }}{% endmacro %}");
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());

        let root = parse.syntax();
        let children: Vec<_> = root.children().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind(), SyntaxKind::StmtMacro);

        let start = first_child_of(&parse, SyntaxKind::MacroBlockStart).unwrap();
        let name = start
            .children()
            .find(|n| n.kind() == SyntaxKind::ExprName)
            .unwrap();
        assert_eq!(name.text().to_string(), "greet");
    }

    #[test]
    fn test_signature_default_args() {
        let parse = parse("{% macro m(a, b='x', c=1) %}{% endmacro %}");
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
        let sig = first_child_of(&parse, SyntaxKind::Signature).unwrap();
        let plain = sig
            .children()
            .filter(|n| n.kind() == SyntaxKind::SignatureArg)
            .count();
        let defaulted = sig
            .children()
            .filter(|n| n.kind() == SyntaxKind::SignatureDefaultArg)
            .count();
        assert_eq!((plain, defaulted), (1, 2));
    }

    #[test]
    fn test_materialization_header() {
        let parse = parse("{% materialization tbl, adapter='postgres' %}body{% endmaterialization %}");
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
        let node = first_child_of(&parse, SyntaxKind::StmtMaterialization).unwrap();
        assert!(
            node.descendants()
                .any(|n| n.kind() == SyntaxKind::KeywordArg)
        );
    }

    #[test]
    fn test_materialization_without_adapter_errors() {
        let parse = parse("{% materialization tbl %}{% endmaterialization %}");
        assert!(!parse.ok());
    }

    #[test]
    fn test_test_blocks_share_a_kind() {
        for text in [
            "{% test is_even(model) %}x{% endtest %}",
            "{% data_test is_even(model) %}x{% enddata_test %}",
        ] {
            let parse = parse(text);
            assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
            assert!(first_child_of(&parse, SyntaxKind::StmtTest).is_some());
        }
    }

    #[test]
    fn test_macro_nested_in_conditional() {
        let parse = parse("{% if flag %}{% macro m() %}x{% endmacro %}{% endif %}");
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
        let root = parse.syntax();
        assert_eq!(
            root.children().next().map(|n| n.kind()),
            Some(SyntaxKind::StmtIf)
        );
        // The macro node is nested, reachable in document order.
        assert!(
            root.descendants()
                .any(|n| n.kind() == SyntaxKind::StmtMacro)
        );
    }

    #[test]
    fn test_set_forms() {
        let assign = parse("{% set x = 1 %}");
        assert!(assign.ok(), "unexpected errors: {:?}", assign.errors());
        let node = first_child_of(&assign, SyntaxKind::StmtSet).unwrap();
        assert!(node.children().all(|n| n.kind() != SyntaxKind::StmtEnd));

        let block = parse("{% set x %}value{% endset %}");
        assert!(block.ok(), "unexpected errors: {:?}", block.errors());
        let node = first_child_of(&block, SyntaxKind::StmtSet).unwrap();
        assert!(node.children().any(|n| n.kind() == SyntaxKind::StmtEnd));
    }

    #[test]
    fn test_filter_pipeline_and_calls() {
        let parse = parse("{{ adapter.dispatch('x', 'pkg')(a, k=1) | default('y', true) }}");
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
        assert!(first_child_of(&parse, SyntaxKind::ExprFilter).is_some());
        assert!(first_child_of(&parse, SyntaxKind::KeywordArg).is_some());
    }

    #[test]
    fn test_raw_statement() {
        let parse = parse("{% raw %}{{ untouched }}{% endraw %}");
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
        let node = first_child_of(&parse, SyntaxKind::StmtRaw).unwrap();
        assert!(
            node.children_with_tokens()
                .any(|e| e.kind() == SyntaxKind::Data)
        );
    }

    #[test]
    fn test_missing_endmacro_is_an_error() {
        let parse = parse("{% macro m() %}body only");
        assert!(!parse.ok());
        assert!(parse.errors().iter().any(|e| e.message().contains("endmacro")));
        // Tree stays lossless even under errors.
        assert_eq!(parse.syntax().text().to_string(), "{% macro m() %}body only");
    }

    #[test]
    fn test_missing_macro_name_is_an_error() {
        let parse = parse("{% macro () %}x{% endmacro %}");
        assert!(!parse.ok());
    }

    #[test]
    fn test_unterminated_output_is_an_error() {
        let parse = parse("{{ a.b ");
        assert!(!parse.ok());
        assert_eq!(parse.syntax().text().to_string(), "{{ a.b ");
    }

    #[test]
    fn test_unknown_tags_are_tolerated() {
        let parse = parse("{% do run_query(q) %}{% from x import y %}");
        // Unknown tags parse as standalone statements without body pairing.
        assert!(parse.ok(), "unexpected errors: {:?}", parse.errors());
        let kinds: Vec<_> = parse.syntax().children().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![SyntaxKind::StmtUnknown, SyntaxKind::StmtUnknown]);
    }
}
