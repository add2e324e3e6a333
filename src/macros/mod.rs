// Macro extraction, indexing, and name resolution
pub mod definition;
pub mod extract;
pub mod index;
pub mod resolve;

pub use definition::{MacroDefinition, MacroOrigin};
pub use extract::{ExtractError, MacroExtractor, Macros};
pub use index::MacroIndex;
pub use resolve::{LocalityClass, MacroLookup, MacroResolver, ResolveError};
