// Template syntax: lexing, block scanning, parsing, and typed views
pub mod ast;
pub mod blocks;
pub mod kind;
pub mod lexer;
pub mod line_index;
pub mod parser;

pub use ast::{MACRO_PREFIX, MATERIALIZATION_PREFIX, MacroDef, Signature, SignatureParam};
pub use blocks::{BlockError, BlockKind, MacroBlock, toplevel_blocks};
pub use kind::{SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken, TemplateLanguage};
pub use lexer::{Token, tokenize};
pub use line_index::{LineCol, LineIndex};
pub use parser::{Parse, SyntaxError, parse};
