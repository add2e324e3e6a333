//! Workspace loading: one pass from project files on disk to a completed,
//! queryable [`MacroIndex`].
//!
//! The loader reads the root project's configuration, then gathers macros
//! from three places in a fixed order: the root project, the configured
//! internal package roots (platform-shipped macro packages), and every
//! dependency installed under the root's packages directory. Internal roots
//! that are absent are skipped with a warning so a stripped-down install
//! still loads; everything else fails fast on the first broken file, and the
//! caller gets either a fully built workspace or an error naming the file.

use std::io;
use std::path::{Path, PathBuf};

use smol_str::SmolStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::macros::definition::MacroDefinition;
use crate::macros::extract::{ExtractError, MacroExtractor};
use crate::macros::index::MacroIndex;
use crate::macros::resolve::{MacroLookup, MacroResolver, ResolveError};
use crate::syntax::line_index::LineIndex;
use text_size::TextSize;

use super::config::{ConfigError, PROJECT_FILE_NAME, ProjectConfig};
use super::source::find_source_files;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot extract macros from {} (line {line}, column {column})", .path.display())]
    Extract {
        path: PathBuf,
        line: u32,
        column: u32,
        #[source]
        source: ExtractError,
    },
}

impl LoadError {
    fn extract(path: PathBuf, text: &str, source: ExtractError) -> Self {
        let position = LineIndex::new(text).line_col(TextSize::new(source.offset()));
        Self::Extract {
            path,
            line: position.line + 1,
            column: position.col + 1,
            source,
        }
    }
}

// ============================================================================
// LOADER
// ============================================================================

/// Builds a [`LoadedWorkspace`] from a project directory.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceLoader {
    internal_roots: Vec<PathBuf>,
}

impl WorkspaceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a platform-shipped package root. Macros from these packages
    /// rank between the root project and ordinary dependencies.
    pub fn with_internal_package(mut self, root: impl Into<PathBuf>) -> Self {
        self.internal_roots.push(root.into());
        self
    }

    /// Load the project rooted at `root` and everything it pulls in.
    pub fn load(&self, root: &Path) -> Result<LoadedWorkspace, LoadError> {
        let root_config = ProjectConfig::load(root)?;
        info!(root = %root.display(), project = %root_config.name, "loading workspace");

        let internals = self.internal_projects()?;
        let packages_dir = root.join(&root_config.packages_install_path);
        let dependencies = discover_dependencies(&packages_dir)?;

        let mut index = MacroIndex::new(
            internals
                .iter()
                .map(|(_, config)| SmolStr::new(&config.name)),
        );

        scan_project(&mut index, root, &root_config)?;
        for (project_root, config) in &internals {
            scan_project(&mut index, project_root, config)?;
        }
        for (project_root, config) in &dependencies {
            scan_project(&mut index, project_root, config)?;
        }

        info!(
            project = %root_config.name,
            internals = internals.len(),
            dependencies = dependencies.len(),
            macros = index.len(),
            "workspace loaded"
        );
        Ok(LoadedWorkspace {
            root_project: SmolStr::new(root_config.name),
            index,
        })
    }

    /// Configs of the registered internal roots. A root without a project
    /// file is skipped; a root with a broken project file is an error.
    fn internal_projects(&self) -> Result<Vec<(PathBuf, ProjectConfig)>, LoadError> {
        let mut internals = Vec::new();
        for root in &self.internal_roots {
            if !root.join(PROJECT_FILE_NAME).is_file() {
                warn!(path = %root.display(), "internal package has no project file, skipping");
                continue;
            }
            let config = ProjectConfig::load(root)?;
            internals.push((root.clone(), config));
        }
        Ok(internals)
    }
}

/// Installed dependencies: subdirectories of the packages directory that
/// carry a project file, in name order.
fn discover_dependencies(packages_dir: &Path) -> Result<Vec<(PathBuf, ProjectConfig)>, LoadError> {
    if !packages_dir.is_dir() {
        debug!(path = %packages_dir.display(), "no packages directory");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(packages_dir).map_err(|source| LoadError::Io {
        path: packages_dir.to_path_buf(),
        source,
    })?;
    let mut roots = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Io {
            path: packages_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() && path.join(PROJECT_FILE_NAME).is_file() {
            roots.push(path);
        }
    }
    roots.sort();

    let mut dependencies = Vec::new();
    for root in roots {
        let config = ProjectConfig::load(&root)?;
        dependencies.push((root, config));
    }
    Ok(dependencies)
}

/// Extract every macro of one project into the index.
fn scan_project(
    index: &mut MacroIndex,
    project_root: &Path,
    config: &ProjectConfig,
) -> Result<(), LoadError> {
    let extractor = MacroExtractor::new(config.name.as_str());
    let files = find_source_files(project_root, &config.name, &config.macro_paths);
    debug!(project = %config.name, files = files.len(), "scanning macro files");

    for file in files {
        let full_path = file.full_path();
        let text = std::fs::read_to_string(&full_path).map_err(|source| LoadError::Io {
            path: full_path.clone(),
            source,
        })?;
        let origin_path = file.original_file_path();

        let macros = extractor
            .extract(&origin_path, &text)
            .map_err(|source| LoadError::extract(origin_path.clone(), &text, source))?;
        for result in macros {
            let definition =
                result.map_err(|source| LoadError::extract(origin_path.clone(), &text, source))?;
            debug!(def = %definition, "indexed");
            index.add(definition);
        }
    }
    Ok(())
}

// ============================================================================
// LOADED WORKSPACE
// ============================================================================

/// The outcome of a load: the root project's name plus the completed index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedWorkspace {
    root_project: SmolStr,
    index: MacroIndex,
}

impl LoadedWorkspace {
    pub fn root_project(&self) -> &str {
        &self.root_project
    }

    pub fn index(&self) -> &MacroIndex {
        &self.index
    }

    pub fn into_index(self) -> MacroIndex {
        self.index
    }

    pub fn resolver(&self) -> MacroResolver<'_> {
        MacroResolver::new(&self.index)
    }

    /// Resolve a macro name from the root project's point of view.
    pub fn resolve(&self, name: &str) -> Result<Option<&MacroDefinition>, ResolveError> {
        self.resolver()
            .resolve(&MacroLookup::new(name, &self.root_project))
    }

    /// Resolve restricted to one package.
    pub fn resolve_in(
        &self,
        name: &str,
        package: &str,
    ) -> Result<Option<&MacroDefinition>, ResolveError> {
        self.resolver()
            .resolve(&MacroLookup::new(name, &self.root_project).in_package(package))
    }
}
