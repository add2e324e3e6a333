//! # templar-base
//!
//! Core library for macro indexing and name resolution over Jinja-style
//! template projects.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! project → configuration, source discovery, workspace loading
//!   ↓
//! macros  → block extraction, the macro index, name resolution
//!   ↓
//! syntax  → lexer, block scanner, parser, typed tree views
//! ```
//!
//! A load walks the root project, the registered internal packages, and the
//! installed dependencies, extracts every macro definition into one
//! [`MacroIndex`], and hands back a [`LoadedWorkspace`]. Resolution then
//! ranks same-named candidates by locality (root project first, internal
//! packages next, dependencies last) with a deterministic tie-break.
//!
//! ```no_run
//! use templar::WorkspaceLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workspace = WorkspaceLoader::new()
//!     .with_internal_package("/opt/templar/core")
//!     .load(std::path::Path::new("/work/analytics"))?;
//!
//! if let Some(def) = workspace.resolve("generate_schema_name")? {
//!     println!("{} is defined in {}", def.name(), def.origin());
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// MODULES
// ============================================================================

/// Macro definitions, extraction, indexing, and resolution
pub mod macros;

/// Project files, configuration, and workspace loading
pub mod project;

/// Template syntax: tokens, blocks, trees
pub mod syntax;

// Re-export the working surface
pub use macros::{
    ExtractError, LocalityClass, MacroDefinition, MacroExtractor, MacroIndex, MacroLookup,
    MacroOrigin, MacroResolver, ResolveError,
};
pub use project::{
    ConfigError, LoadError, LoadedWorkspace, PROJECT_FILE_NAME, ProjectConfig, SourceFile,
    WorkspaceLoader, find_source_files,
};
pub use syntax::{LineCol, LineIndex, SyntaxKind, SyntaxNode};
