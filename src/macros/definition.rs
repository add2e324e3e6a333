//! The indexed record for one macro definition.

use std::fmt;
use std::path::{Path, PathBuf};

use smol_str::SmolStr;
use text_size::TextRange;

/// Where a definition came from: the file it was read from and the byte
/// range of its block within that file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacroOrigin {
    path: PathBuf,
    range: TextRange,
}

impl MacroOrigin {
    pub fn new(path: impl Into<PathBuf>, range: TextRange) -> Self {
        Self {
            path: path.into(),
            range,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn range(&self) -> TextRange {
        self.range
    }
}

impl fmt::Display for MacroOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.path.display(),
            u32::from(self.range.start())
        )
    }
}

/// One extracted macro definition, as stored in the index.
///
/// `name` is the undecorated name the definition is looked up under, with
/// the registration prefix already stripped (a `test` block is therefore
/// stored as `test_<declared name>`). `body` is the raw text of the whole
/// block, opening and closing tags included.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MacroDefinition {
    package: SmolStr,
    name: SmolStr,
    body: Box<str>,
    origin: MacroOrigin,
}

impl MacroDefinition {
    pub fn new(
        package: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        body: impl Into<Box<str>>,
        origin: MacroOrigin,
    ) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            body: body.into(),
            origin,
        }
    }

    /// The package the definition belongs to.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The lookup name, prefix stripped.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw text of the defining block.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn origin(&self) -> &MacroOrigin {
        &self.origin
    }
}

impl fmt::Display for MacroDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.package, self.name, self.origin)
    }
}
