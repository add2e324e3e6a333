//! Project configuration, read from `templar_project.yml`.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File that marks a directory as a project root.
pub const PROJECT_FILE_NAME: &str = "templar_project.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project directory does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("could not read {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid project file {}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("project file {} has no name", .path.display())]
    MissingName { path: PathBuf },
}

/// The subset of project configuration the macro pipeline needs.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Package name macros from this project are attributed to.
    pub name: String,

    /// Directories scanned for macro files, relative to the project root.
    #[serde(rename = "macro-paths", default = "default_macro_paths")]
    pub macro_paths: Vec<String>,

    /// Where installed dependency packages live, relative to the root.
    #[serde(
        rename = "packages-install-path",
        default = "default_packages_install_path"
    )]
    pub packages_install_path: String,
}

fn default_macro_paths() -> Vec<String> {
    vec!["macros".to_owned()]
}

fn default_packages_install_path() -> String {
    "templar_packages".to_owned()
}

impl ProjectConfig {
    /// Read and validate the project file of the project rooted at `root`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root.to_path_buf()));
        }
        let path = root.join(PROJECT_FILE_NAME);
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Invalid {
            path: path.clone(),
            source,
        })?;
        if config.name.is_empty() {
            return Err(ConfigError::MissingName { path });
        }
        Ok(config)
    }
}
