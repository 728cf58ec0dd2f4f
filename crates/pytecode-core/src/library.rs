//! Python library selection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A library the playground offers in its settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryInfo {
    /// Identifier stored in the selection (package name).
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    pub description: &'static str,
    /// Module name used to import the package.
    pub import_name: &'static str,
}

/// Libraries offered by the settings dialog.
pub const AVAILABLE_LIBRARIES: &[LibraryInfo] = &[
    LibraryInfo {
        id: "numpy",
        name: "NumPy",
        description: "Numerical computing",
        import_name: "numpy",
    },
    LibraryInfo {
        id: "pandas",
        name: "Pandas",
        description: "Data manipulation and analysis",
        import_name: "pandas",
    },
    LibraryInfo {
        id: "matplotlib",
        name: "Matplotlib",
        description: "Data visualization",
        import_name: "matplotlib",
    },
    LibraryInfo {
        id: "scipy",
        name: "SciPy",
        description: "Scientific computing",
        import_name: "scipy",
    },
    LibraryInfo {
        id: "scikit-learn",
        name: "Scikit-learn",
        description: "Machine learning",
        import_name: "sklearn",
    },
];

impl LibraryInfo {
    /// Look up a catalog entry by identifier.
    #[must_use]
    pub fn lookup(id: &str) -> Option<&'static Self> {
        AVAILABLE_LIBRARIES.iter().find(|lib| lib.id == id)
    }
}

/// Module name to import for a library identifier.
///
/// Identifiers outside the catalog fall back to the identifier with
/// dashes turned into underscores.
#[must_use]
pub fn import_name(id: &str) -> String {
    LibraryInfo::lookup(id).map_or_else(|| id.replace('-', "_"), |lib| lib.import_name.to_string())
}

/// Unordered set of library identifiers.
///
/// Serializes as a JSON array, which is also the persisted format.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibrarySet(BTreeSet<String>);

impl LibrarySet {
    /// An empty selection.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Every library in the catalog ("Select All").
    #[must_use]
    pub fn all_available() -> Self {
        AVAILABLE_LIBRARIES.iter().map(|lib| lib.id).collect()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Add an identifier. Blank identifiers are ignored.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.0.insert(id.to_string())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    /// Flip membership of an identifier, as the settings checkboxes do.
    pub fn toggle(&mut self, id: &str) {
        if !self.remove(id) {
            self.insert(id);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma separated identifiers, sorted.
    #[must_use]
    pub fn describe(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}

impl<S: Into<String>> FromIterator<S> for LibrarySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl<'a> IntoIterator for &'a LibrarySet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_unordered_and_unique() {
        let a: LibrarySet = ["pandas", "numpy", "numpy"].into_iter().collect();
        let b: LibrarySet = ["numpy", "pandas"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.describe(), "numpy, pandas");
    }

    #[test]
    fn test_blank_ids_ignored() {
        let mut set = LibrarySet::new();
        assert!(!set.insert("  "));
        assert!(set.insert(" scipy "));
        assert!(set.contains("scipy"));
    }

    #[test]
    fn test_toggle() {
        let mut set = LibrarySet::new();
        set.toggle("matplotlib");
        assert!(set.contains("matplotlib"));
        set.toggle("matplotlib");
        assert!(set.is_empty());
    }

    #[test]
    fn test_json_array_format() {
        let set: LibrarySet = ["scipy", "numpy"].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["numpy","scipy"]"#);

        let parsed: LibrarySet = serde_json::from_str(r#"["numpy","scipy","numpy"]"#).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn test_import_names() {
        assert_eq!(import_name("scikit-learn"), "sklearn");
        assert_eq!(import_name("numpy"), "numpy");
        assert_eq!(import_name("python-dateutil"), "python_dateutil");
    }

    #[test]
    fn test_all_available() {
        let all = LibrarySet::all_available();
        assert_eq!(all.len(), AVAILABLE_LIBRARIES.len());
        assert!(all.contains("scikit-learn"));
    }
}
