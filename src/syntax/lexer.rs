//! Lexer for the template language.
//!
//! Lexing runs in two modes, each a separate [`logos`] token enum:
//!
//! - **outer mode** splits raw template data from `{{ ... }}`, `{% ... %}`,
//!   and `{# ... #}` regions;
//! - **tag mode** tokenizes expressions and tag contents up to the matching
//!   end delimiter.
//!
//! [`tokenize`] drives both modes and flattens the result into one token
//! stream over [`SyntaxKind`]. Two template-language quirks are handled
//! here so no later stage has to think about them:
//!
//! - `{% raw %} ... {% endraw %}` content is emitted as a single data token
//!   without tag lexing;
//! - end delimiters are bracket-balanced: `}}` or `%}` inside an open `(`,
//!   `[`, or `{` construct does not terminate the tag, its first character
//!   lexes as an ordinary operator instead (so `{{ {'a': 1}}}` closes the
//!   dict before the output expression).
//!
//! The stream is lossless: concatenating all token texts reproduces the
//! input exactly, which the tree builder relies on.

use logos::Logos;
use text_size::{TextRange, TextSize};

use super::kind::SyntaxKind;

// ============================================================================
// TOKEN
// ============================================================================

/// A single lexed token: kind, source slice, and absolute range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'s> {
    pub kind: SyntaxKind,
    pub text: &'s str,
    pub range: TextRange,
}

impl<'s> Token<'s> {
    fn new(kind: SyntaxKind, text: &'s str, start: usize) -> Self {
        let start = TextSize::new(start as u32);
        Self {
            kind,
            text,
            range: TextRange::at(start, TextSize::of(text)),
        }
    }
}

// ============================================================================
// OUTER MODE
// ============================================================================

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
enum OuterToken {
    /// `{{`, with optional whitespace-control marker.
    #[regex(r"\{\{[-+]?")]
    VariableBegin,

    /// `{%`, with optional whitespace-control marker.
    #[regex(r"\{%[-+]?")]
    BlockBegin,

    /// Whole `{# ... #}` comment; unterminated comments run to end of input.
    #[token("{#", lex_comment)]
    Comment,

    /// Raw template data between delimiters.
    #[regex(r"[^{]+")]
    Data,

    /// A `{` that does not open a delimiter.
    #[token("{")]
    LoneBrace,
}

fn lex_comment(lex: &mut logos::Lexer<OuterToken>) {
    match lex.remainder().find("#}") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(lex.remainder().len()),
    }
}

impl OuterToken {
    fn kind(self) -> SyntaxKind {
        match self {
            OuterToken::VariableBegin => SyntaxKind::VariableBegin,
            OuterToken::BlockBegin => SyntaxKind::BlockBegin,
            OuterToken::Comment => SyntaxKind::Comment,
            OuterToken::Data | OuterToken::LoneBrace => SyntaxKind::Data,
        }
    }
}

// ============================================================================
// TAG MODE
// ============================================================================

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
enum TagToken {
    #[regex(r"[-+]?%\}")]
    BlockEnd,

    #[regex(r"[-+]?\}\}")]
    VariableEnd,

    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// Identifier or keyword; keywords are told apart by text later.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,

    #[regex(r"[0-9][0-9_]*")]
    Integer,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*")]
    Float,

    /// String literal; embedded delimiters like `%}` stay inside the token.
    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r"'([^'\\]|\\.)*'")]
    String,

    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("**")]
    Pow,
    #[token("*")]
    Mul,
    #[token("//")]
    FloorDiv,
    #[token("/")]
    Div,
    #[token("%")]
    Mod,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    LtEq,
    #[token("<")]
    Lt,
    #[token(">=")]
    GtEq,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,
    #[token(";")]
    Semicolon,
    #[token("~")]
    Tilde,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
}

impl TagToken {
    fn kind(self) -> SyntaxKind {
        match self {
            TagToken::BlockEnd => SyntaxKind::BlockEnd,
            TagToken::VariableEnd => SyntaxKind::VariableEnd,
            TagToken::Whitespace => SyntaxKind::Whitespace,
            TagToken::Name => SyntaxKind::Name,
            TagToken::Integer => SyntaxKind::Integer,
            TagToken::Float => SyntaxKind::Float,
            TagToken::String => SyntaxKind::String,
            TagToken::Add => SyntaxKind::Add,
            TagToken::Sub => SyntaxKind::Sub,
            TagToken::Pow => SyntaxKind::Pow,
            TagToken::Mul => SyntaxKind::Mul,
            TagToken::FloorDiv => SyntaxKind::FloorDiv,
            TagToken::Div => SyntaxKind::Div,
            TagToken::Mod => SyntaxKind::Mod,
            TagToken::Eq => SyntaxKind::Eq,
            TagToken::Ne => SyntaxKind::Ne,
            TagToken::LtEq => SyntaxKind::LtEq,
            TagToken::Lt => SyntaxKind::Lt,
            TagToken::GtEq => SyntaxKind::GtEq,
            TagToken::Gt => SyntaxKind::Gt,
            TagToken::Assign => SyntaxKind::Assign,
            TagToken::Colon => SyntaxKind::Colon,
            TagToken::Comma => SyntaxKind::Comma,
            TagToken::Dot => SyntaxKind::Dot,
            TagToken::Pipe => SyntaxKind::Pipe,
            TagToken::Semicolon => SyntaxKind::Semicolon,
            TagToken::Tilde => SyntaxKind::Tilde,
            TagToken::LeftParen => SyntaxKind::LeftParen,
            TagToken::RightParen => SyntaxKind::RightParen,
            TagToken::LeftBracket => SyntaxKind::LeftBracket,
            TagToken::RightBracket => SyntaxKind::RightBracket,
            TagToken::LeftBrace => SyntaxKind::LeftBrace,
            TagToken::RightBrace => SyntaxKind::RightBrace,
        }
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Tokenize a whole template into a lossless stream.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let mut resume_at = None;
        let mut outer = OuterToken::lexer(&text[pos..]);

        while let Some(item) = outer.next() {
            let start = pos + outer.span().start;
            let slice = outer.slice();
            match item {
                Ok(tok @ (OuterToken::VariableBegin | OuterToken::BlockBegin)) => {
                    tokens.push(Token::new(tok.kind(), slice, start));
                    let terminator = match tok {
                        OuterToken::VariableBegin => SyntaxKind::VariableEnd,
                        _ => SyntaxKind::BlockEnd,
                    };
                    let tag = lex_tag(text, pos + outer.span().end, terminator, &mut tokens);

                    let mut next = tag.end;
                    if terminator == SyntaxKind::BlockEnd && tag.first_name == Some("raw") {
                        next = emit_raw_data(text, tag.end, &mut tokens);
                    }
                    resume_at = Some(next);
                    break;
                }
                Ok(tok) => tokens.push(Token::new(tok.kind(), slice, start)),
                Err(()) => tokens.push(Token::new(SyntaxKind::Error, slice, start)),
            }
        }

        match resume_at {
            Some(next) => pos = next,
            None => break,
        }
    }

    tokens
}

struct TagLex<'s> {
    /// Position just past the end delimiter (or end of input).
    end: usize,
    /// First name token of the tag, used to recognize `raw`.
    first_name: Option<&'s str>,
}

/// Lex the inside of a tag until `terminator` at bracket depth zero.
fn lex_tag<'s>(
    text: &'s str,
    mut pos: usize,
    terminator: SyntaxKind,
    tokens: &mut Vec<Token<'s>>,
) -> TagLex<'s> {
    let mut first_name = None;
    let mut depth = 0u32;

    'relex: loop {
        let mut lex = TagToken::lexer(&text[pos..]);
        while let Some(item) = lex.next() {
            let start = pos + lex.span().start;
            let slice = lex.slice();
            match item {
                Ok(tok @ (TagToken::VariableEnd | TagToken::BlockEnd)) => {
                    if depth == 0 {
                        if tok.kind() == terminator {
                            tokens.push(Token::new(tok.kind(), slice, start));
                            return TagLex {
                                end: start + slice.len(),
                                first_name,
                            };
                        }
                        // End delimiter of the other tag form; not valid here.
                        tokens.push(Token::new(SyntaxKind::Error, slice, start));
                    } else {
                        // Balanced brackets are still open, so this is not the
                        // end of the tag. Split off the first character as an
                        // operator and re-lex the rest.
                        let (kind, split) = match &slice[..1] {
                            "}" => {
                                depth -= 1;
                                (SyntaxKind::RightBrace, &slice[..1])
                            }
                            "%" => (SyntaxKind::Mod, &slice[..1]),
                            "-" => (SyntaxKind::Sub, &slice[..1]),
                            _ => (SyntaxKind::Add, &slice[..1]),
                        };
                        tokens.push(Token::new(kind, split, start));
                        pos = start + 1;
                        continue 'relex;
                    }
                }
                Ok(tok) => {
                    match tok {
                        TagToken::LeftParen | TagToken::LeftBracket | TagToken::LeftBrace => {
                            depth += 1;
                        }
                        TagToken::RightParen | TagToken::RightBracket | TagToken::RightBrace => {
                            depth = depth.saturating_sub(1);
                        }
                        TagToken::Name if first_name.is_none() => first_name = Some(slice),
                        _ => {}
                    }
                    tokens.push(Token::new(tok.kind(), slice, start));
                }
                Err(()) => tokens.push(Token::new(SyntaxKind::Error, slice, start)),
            }
        }
        // End of input inside the tag; callers detect the missing terminator.
        return TagLex {
            end: text.len(),
            first_name,
        };
    }
}

/// Emit everything between a `{% raw %}` tag and the next `{% endraw %}` as
/// one data token. Returns the position where normal lexing resumes (the
/// start of the `endraw` tag, or end of input if it never comes).
fn emit_raw_data<'s>(text: &'s str, pos: usize, tokens: &mut Vec<Token<'s>>) -> usize {
    let resume = find_endraw(text, pos).unwrap_or(text.len());
    if resume > pos {
        tokens.push(Token::new(SyntaxKind::Data, &text[pos..resume], pos));
    }
    resume
}

/// Find the start of the next `{% endraw %}` tag at or after `from`.
fn find_endraw(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut search = from;
    while let Some(found) = text[search..].find("{%") {
        let start = search + found;
        let mut i = start + 2;
        if matches!(bytes.get(i), Some(b'-' | b'+')) {
            i += 1;
        }
        while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            i += 1;
        }
        if text[i..].starts_with("endraw") {
            i += "endraw".len();
            while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                i += 1;
            }
            if matches!(bytes.get(i), Some(b'-' | b'+')) {
                i += 1;
            }
            if text[i..].starts_with("%}") {
                return Some(start);
            }
        }
        search = start + 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<SyntaxKind> {
        tokenize(text).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_plain_data() {
        assert_eq!(kinds("select 1 from t"), vec![SyntaxKind::Data]);
    }

    #[test]
    fn test_output_expression() {
        assert_eq!(
            kinds("a {{ x }} b"),
            vec![
                SyntaxKind::Data,
                SyntaxKind::VariableBegin,
                SyntaxKind::Whitespace,
                SyntaxKind::Name,
                SyntaxKind::Whitespace,
                SyntaxKind::VariableEnd,
                SyntaxKind::Data,
            ]
        );
    }

    #[test]
    fn test_block_tag_with_trim_markers() {
        let tokens = tokenize("{%- if x -%}");
        assert_eq!(tokens[0].kind, SyntaxKind::BlockBegin);
        assert_eq!(tokens[0].text, "{%-");
        assert_eq!(tokens.last().map(|t| t.kind), Some(SyntaxKind::BlockEnd));
        assert_eq!(tokens.last().map(|t| t.text), Some("-%}"));
    }

    #[test]
    fn test_comment_is_one_token() {
        let tokens = tokenize("a {# note {{ x }} #} b");
        assert_eq!(tokens[1].kind, SyntaxKind::Comment);
        assert_eq!(tokens[1].text, "{# note {{ x }} #}");
    }

    #[test]
    fn test_unterminated_comment_runs_to_end() {
        let tokens = tokenize("{# open forever");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, SyntaxKind::Comment);
        assert_eq!(tokens[0].text, "{# open forever");
    }

    #[test]
    fn test_string_hides_end_delimiter() {
        let tokens = tokenize("{{ \"%}\" }}");
        let string = tokens.iter().find(|t| t.kind == SyntaxKind::String);
        assert_eq!(string.map(|t| t.text), Some("\"%}\""));
        assert_eq!(tokens.last().map(|t| t.kind), Some(SyntaxKind::VariableEnd));
    }

    #[test]
    fn test_raw_region_is_data() {
        let tokens = tokenize("{% raw %}{{ not lexed }}{% endraw %}");
        let data: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == SyntaxKind::Data)
            .collect();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].text, "{{ not lexed }}");
        // The endraw tag itself lexes normally.
        assert_eq!(tokens.last().map(|t| t.kind), Some(SyntaxKind::BlockEnd));
    }

    #[test]
    fn test_unterminated_raw_swallows_rest() {
        let tokens = tokenize("{% raw %}never closed {{ x }}");
        assert_eq!(tokens.last().map(|t| t.kind), Some(SyntaxKind::Data));
        assert_eq!(tokens.last().map(|t| t.text), Some("never closed {{ x }}"));
    }

    #[test]
    fn test_dict_flush_against_output_end() {
        let tokens = tokenize("{{ {'a': 1}}}");
        let tail: Vec<_> = tokens.iter().rev().take(2).map(|t| t.kind).collect();
        assert_eq!(tail, vec![SyntaxKind::VariableEnd, SyntaxKind::RightBrace]);
    }

    #[test]
    fn test_operators_in_set_tag() {
        let k = kinds("{% set x = a ~ 'b' | upper %}");
        assert!(k.contains(&SyntaxKind::Assign));
        assert!(k.contains(&SyntaxKind::Tilde));
        assert!(k.contains(&SyntaxKind::Pipe));
        assert!(k.contains(&SyntaxKind::String));
    }

    #[test]
    fn test_lossless_concatenation() {
        let text = "x {{ a.b(1, c='d') }} {%- macro m() %}{# hi #}{% endmacro %} { y";
        let rebuilt: String = tokenize(text).iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_unterminated_tag_runs_to_end() {
        let tokens = tokenize("{% macro oops(");
        assert!(tokens.iter().all(|t| t.kind != SyntaxKind::BlockEnd));
        let rebuilt: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, "{% macro oops(");
    }
}
