//! Name resolution: choosing one definition among same-named candidates.
//!
//! Candidates for a bare name are ranked by [`LocalityClass`]: definitions
//! from the root project shadow everything, definitions from internal
//! packages shadow ordinary imports. Within a class the winner is the
//! smallest `(package, origin path, span start)` triple, so resolution is a
//! pure function of the candidate set; insertion order never shows through.
//!
//! A lookup may carry a package filter, which is exclusive: when set, only
//! definitions from that package are considered at all, and the locality
//! ranking applies within the filtered set.

use thiserror::Error;
use tracing::debug;

use super::definition::MacroDefinition;
use super::index::MacroIndex;

// ============================================================================
// LOOKUPS
// ============================================================================

/// How close a definition is to the project asking for it. Order matters:
/// earlier variants win resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalityClass {
    /// Defined by the root project itself.
    Root,
    /// Defined by an internal (platform-shipped) package.
    Internal,
    /// Defined by an installed dependency.
    Imported,
}

/// One resolution request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MacroLookup<'a> {
    name: &'a str,
    root_project: &'a str,
    package: Option<&'a str>,
}

impl<'a> MacroLookup<'a> {
    pub fn new(name: &'a str, root_project: &'a str) -> Self {
        Self {
            name,
            root_project,
            package: None,
        }
    }

    /// Restrict the lookup to one package.
    pub fn in_package(mut self, package: &'a str) -> Self {
        self.package = Some(package);
        self
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn root_project(&self) -> &'a str {
        self.root_project
    }

    pub fn package(&self) -> Option<&'a str> {
        self.package
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("macro lookup name is empty")]
    EmptyName,
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Read-only resolution over a completed [`MacroIndex`].
#[derive(Clone, Copy, Debug)]
pub struct MacroResolver<'a> {
    index: &'a MacroIndex,
}

impl<'a> MacroResolver<'a> {
    pub fn new(index: &'a MacroIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &'a MacroIndex {
        self.index
    }

    /// Which locality class a definition falls in, seen from `root_project`.
    pub fn classify(&self, definition: &MacroDefinition, root_project: &str) -> LocalityClass {
        if definition.package() == root_project {
            LocalityClass::Root
        } else if self.index.is_internal(definition.package()) {
            LocalityClass::Internal
        } else {
            LocalityClass::Imported
        }
    }

    /// Resolve a lookup to at most one definition.
    ///
    /// Not finding a macro is an ordinary outcome (`Ok(None)`); only a
    /// malformed lookup is an error.
    pub fn resolve(
        &self,
        lookup: &MacroLookup<'_>,
    ) -> Result<Option<&'a MacroDefinition>, ResolveError> {
        if lookup.name.is_empty() {
            return Err(ResolveError::EmptyName);
        }

        let mut candidates = self.index.definitions_named(lookup.name);
        if let Some(package) = lookup.package {
            candidates.retain(|definition| definition.package() == package);
        }

        let winner = candidates.into_iter().min_by_key(|definition| {
            (
                self.classify(definition, lookup.root_project),
                definition.package(),
                definition.origin().path(),
                u32::from(definition.origin().range().start()),
            )
        });

        match winner {
            Some(definition) => {
                debug!(name = lookup.name, winner = %definition, "resolved macro");
            }
            None => {
                debug!(name = lookup.name, package = ?lookup.package, "macro not found");
            }
        }
        Ok(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::definition::MacroOrigin;
    use text_size::{TextRange, TextSize};

    fn make_def(package: &str, name: &str, path: &str, start: u32) -> MacroDefinition {
        let origin = MacroOrigin::new(path, TextRange::at(TextSize::new(start), TextSize::new(20)));
        MacroDefinition::new(package, name, "body", origin)
    }

    fn make_index(defs: Vec<MacroDefinition>, internal: &[&str]) -> MacroIndex {
        let mut index = MacroIndex::new(internal.iter().copied());
        for def in defs {
            index.add(def);
        }
        index
    }

    #[test]
    fn test_root_definition_shadows_all() {
        let index = make_index(
            vec![
                make_def("dep", "m", "dep/m.sql", 0),
                make_def("templar_core", "m", "core/m.sql", 0),
                make_def("root", "m", "root/m.sql", 0),
            ],
            &["templar_core"],
        );
        let resolver = MacroResolver::new(&index);
        let found = resolver
            .resolve(&MacroLookup::new("m", "root"))
            .unwrap()
            .unwrap();
        assert_eq!(found.package(), "root");
    }

    #[test]
    fn test_internal_shadows_imported() {
        let index = make_index(
            vec![
                make_def("dep", "m", "dep/m.sql", 0),
                make_def("templar_core", "m", "core/m.sql", 0),
            ],
            &["templar_core"],
        );
        let resolver = MacroResolver::new(&index);
        let found = resolver
            .resolve(&MacroLookup::new("m", "root"))
            .unwrap()
            .unwrap();
        assert_eq!(found.package(), "templar_core");
    }

    #[test]
    fn test_imported_definition_found_without_better() {
        let index = make_index(vec![make_def("dep", "m", "dep/m.sql", 0)], &[]);
        let resolver = MacroResolver::new(&index);
        let found = resolver
            .resolve(&MacroLookup::new("m", "root"))
            .unwrap()
            .unwrap();
        assert_eq!(found.package(), "dep");
    }

    #[test]
    fn test_not_found_is_ok_none() {
        let index = make_index(vec![make_def("dep", "m", "dep/m.sql", 0)], &[]);
        let resolver = MacroResolver::new(&index);
        assert_eq!(resolver.resolve(&MacroLookup::new("other", "root")).unwrap(), None);
    }

    #[test]
    fn test_package_filter_is_exclusive() {
        let index = make_index(
            vec![
                make_def("a", "shared", "a/s.sql", 0),
                make_def("b", "shared", "b/s.sql", 0),
            ],
            &[],
        );
        let resolver = MacroResolver::new(&index);

        let found = resolver
            .resolve(&MacroLookup::new("shared", "root").in_package("b"))
            .unwrap()
            .unwrap();
        assert_eq!(found.package(), "b");

        // A filter to a package without the macro finds nothing, even though
        // other packages define it.
        let missed = resolver
            .resolve(&MacroLookup::new("shared", "root").in_package("c"))
            .unwrap();
        assert_eq!(missed, None);
    }

    #[test]
    fn test_same_class_tie_breaks_on_origin_path() {
        let index = make_index(
            vec![
                make_def("root", "m", "root/m.sql", 0),
                make_def("root", "m", "root/a.sql", 0),
            ],
            &[],
        );
        let resolver = MacroResolver::new(&index);
        let found = resolver
            .resolve(&MacroLookup::new("m", "root").in_package("root"))
            .unwrap()
            .unwrap();
        // Within the same package and class, the smaller origin path wins.
        assert_eq!(found.origin().path(), std::path::Path::new("root/a.sql"));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let index = make_index(vec![], &[]);
        let resolver = MacroResolver::new(&index);
        assert_eq!(
            resolver.resolve(&MacroLookup::new("", "root")).unwrap_err(),
            ResolveError::EmptyName
        );
    }

    #[test]
    fn test_tie_break_ignores_insertion_order() {
        let forward = make_index(
            vec![
                make_def("alpha", "m", "alpha/m.sql", 0),
                make_def("beta", "m", "beta/m.sql", 0),
            ],
            &[],
        );
        let backward = make_index(
            vec![
                make_def("beta", "m", "beta/m.sql", 0),
                make_def("alpha", "m", "alpha/m.sql", 0),
            ],
            &[],
        );

        let lookup = MacroLookup::new("m", "root");
        let from_forward = MacroResolver::new(&forward).resolve(&lookup).unwrap().unwrap();
        let from_backward = MacroResolver::new(&backward).resolve(&lookup).unwrap().unwrap();
        assert_eq!(from_forward, from_backward);
        assert_eq!(from_forward.package(), "alpha");
    }

    #[test]
    fn test_classify() {
        let index = make_index(vec![], &["templar_core"]);
        let resolver = MacroResolver::new(&index);

        let root = make_def("root", "m", "r.sql", 0);
        let internal = make_def("templar_core", "m", "c.sql", 0);
        let imported = make_def("dep", "m", "d.sql", 0);

        assert_eq!(resolver.classify(&root, "root"), LocalityClass::Root);
        assert_eq!(resolver.classify(&internal, "root"), LocalityClass::Internal);
        assert_eq!(resolver.classify(&imported, "root"), LocalityClass::Imported);
        // Locality is relative to the asking project.
        assert_eq!(resolver.classify(&imported, "dep"), LocalityClass::Root);
    }

    #[test]
    fn test_locality_class_order() {
        assert!(LocalityClass::Root < LocalityClass::Internal);
        assert!(LocalityClass::Internal < LocalityClass::Imported);
    }
}
