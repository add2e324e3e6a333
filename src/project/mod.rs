// Project configuration, source discovery, and workspace loading
pub mod config;
pub mod loader;
pub mod source;

pub use config::{ConfigError, PROJECT_FILE_NAME, ProjectConfig};
pub use loader::{LoadError, LoadedWorkspace, WorkspaceLoader};
pub use source::{SourceFile, find_source_files};
