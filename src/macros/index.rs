//! The macro index: every definition of a loaded workspace, queryable by
//! bare name.
//!
//! The index is append-only. Definitions are stored in insertion order and a
//! name → candidate mapping is maintained on every [`add`](MacroIndex::add),
//! so lookups never trigger a rebuild and never observe a stale view. The
//! set of *internal* package names (adapter-support packages shipped with
//! the platform rather than installed by the user) is supplied by the
//! caller at construction; the index merely records membership, which the
//! resolver turns into ranking.

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::definition::MacroDefinition;

/// All macro definitions of a workspace, with name-based candidate lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MacroIndex {
    macros: Vec<MacroDefinition>,
    by_name: FxHashMap<SmolStr, Vec<usize>>,
    internal_packages: IndexSet<SmolStr>,
}

impl MacroIndex {
    /// An empty index that treats `internal_packages` as internal.
    pub fn new<I, S>(internal_packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            macros: Vec::new(),
            by_name: FxHashMap::default(),
            internal_packages: internal_packages.into_iter().map(Into::into).collect(),
        }
    }

    /// Add one definition. Duplicate names are expected and kept; the
    /// resolver disambiguates at lookup time.
    pub fn add(&mut self, definition: MacroDefinition) {
        let idx = self.macros.len();
        self.by_name
            .entry(SmolStr::new(definition.name()))
            .or_default()
            .push(idx);
        self.macros.push(definition);
    }

    /// Every candidate sharing `name`, in insertion order. Empty if none.
    pub fn definitions_named(&self, name: &str) -> Vec<&MacroDefinition> {
        match self.by_name.get(name) {
            Some(indices) => indices.iter().map(|&i| &self.macros[i]).collect(),
            None => Vec::new(),
        }
    }

    /// All definitions, in insertion order.
    pub fn definitions(&self) -> impl Iterator<Item = &MacroDefinition> {
        self.macros.iter()
    }

    /// The internal package names, in the order they were supplied.
    pub fn internal_package_names(&self) -> &IndexSet<SmolStr> {
        &self.internal_packages
    }

    pub fn is_internal(&self, package: &str) -> bool {
        self.internal_packages.contains(package)
    }

    /// Fold another index into this one. Definitions append in the other
    /// index's order; internal package names union, keeping first-seen
    /// positions.
    pub fn merge(&mut self, other: MacroIndex) {
        for definition in other.macros {
            self.add(definition);
        }
        for package in other.internal_packages {
            self.internal_packages.insert(package);
        }
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::definition::MacroOrigin;
    use text_size::{TextRange, TextSize};

    fn make_def(package: &str, name: &str) -> MacroDefinition {
        let origin = MacroOrigin::new(
            format!("{package}/macros/{name}.sql"),
            TextRange::new(TextSize::new(0), TextSize::new(10)),
        );
        MacroDefinition::new(package, name, format!("{{% macro {name}() %}}"), origin)
    }

    #[test]
    fn test_lookup_by_name() {
        let mut index = MacroIndex::new(["templar_postgres"]);
        index.add(make_def("root", "a"));
        index.add(make_def("dep", "a"));
        index.add(make_def("dep", "b"));

        let found = index.definitions_named("a");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].package(), "root");
        assert_eq!(found[1].package(), "dep");

        assert_eq!(index.definitions_named("b").len(), 1);
        assert!(index.definitions_named("missing").is_empty());
    }

    #[test]
    fn test_lookup_is_exact_after_every_add() {
        let mut index = MacroIndex::new(Vec::<SmolStr>::new());
        assert!(index.definitions_named("m").is_empty());
        index.add(make_def("p", "m"));
        assert_eq!(index.definitions_named("m").len(), 1);
        index.add(make_def("q", "m"));
        assert_eq!(index.definitions_named("m").len(), 2);
    }

    #[test]
    fn test_internal_membership() {
        let index = MacroIndex::new(["templar", "templar_postgres"]);
        assert!(index.is_internal("templar"));
        assert!(index.is_internal("templar_postgres"));
        assert!(!index.is_internal("some_dep"));
        assert_eq!(
            index
                .internal_package_names()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            vec!["templar", "templar_postgres"]
        );
    }

    #[test]
    fn test_merge_appends_and_unions() {
        let mut left = MacroIndex::new(["core"]);
        left.add(make_def("root", "m"));

        let mut right = MacroIndex::new(["core", "extra"]);
        right.add(make_def("dep", "m"));
        right.add(make_def("dep", "n"));

        left.merge(right);
        assert_eq!(left.len(), 3);
        assert_eq!(left.definitions_named("m").len(), 2);
        assert!(left.is_internal("extra"));
        assert_eq!(left.internal_package_names().len(), 2);
    }

    #[test]
    fn test_equality_covers_contents() {
        let mut a = MacroIndex::new(["core"]);
        a.add(make_def("root", "m"));
        let mut b = MacroIndex::new(["core"]);
        b.add(make_def("root", "m"));
        assert_eq!(a, b);

        b.add(make_def("root", "n"));
        assert_ne!(a, b);
    }
}
