//! Scenario catalog
//!
//! Static, server-owned scenarios a participant can pick from. Loaded once
//! at startup, read-only afterwards.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One selectable scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Stable identifier bound into tokens
    pub id: String,
    /// Short display title
    pub title: String,
    /// Descriptive text, also used as model background
    pub text: String,
}

impl Scenario {
    /// Convenience constructor
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    scenario: Vec<Scenario>,
}

/// Ordered, validated set of scenarios
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    /// Build a catalog, validating ids and fields
    ///
    /// # Errors
    /// Returns [`CatalogError`] if the list is empty, an id repeats, or a
    /// field is blank
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, CatalogError> {
        if scenarios.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for (index, scenario) in scenarios.iter().enumerate() {
            for (field, value) in [
                ("id", &scenario.id),
                ("title", &scenario.title),
                ("text", &scenario.text),
            ] {
                if value.trim().is_empty() {
                    return Err(CatalogError::BlankField { index, field });
                }
            }
            if !seen.insert(scenario.id.as_str()) {
                return Err(CatalogError::DuplicateId(scenario.id.clone()));
            }
        }
        Ok(Self { scenarios })
    }

    /// The four scenarios shipped with the tool
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            scenarios: vec![
                Scenario::new(
                    "T1",
                    "Academic Pressure",
                    "Struggling with academic performance.",
                ),
                Scenario::new(
                    "T2",
                    "Relationship Anxiety",
                    "Emotional strain in a romantic relationship.",
                ),
                Scenario::new(
                    "T3",
                    "Family Pressure",
                    "Family expectations and personal boundaries.",
                ),
                Scenario::new("T4", "Self-Esteem", "Feeling inadequate."),
            ],
        }
    }

    /// Parse a catalog from TOML (`[[scenario]]` tables)
    ///
    /// # Errors
    /// Returns [`CatalogError`] on parse or validation failure
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;
        Self::new(file.scenario)
    }

    /// Load a TOML catalog from disk
    ///
    /// # Errors
    /// Returns [`CatalogError`] on I/O, parse or validation failure
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Look up a scenario by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Whether `id` is in the catalog
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// All scenarios in catalog order
    #[inline]
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Number of scenarios
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Always false for a constructed catalog
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = ScenarioCatalog::builtin();
        let revalidated = ScenarioCatalog::new(builtin.scenarios().to_vec()).unwrap();
        assert_eq!(revalidated.len(), 4);
        assert_eq!(builtin.get("T2").unwrap().title, "Relationship Anxiety");
        assert!(!builtin.contains("T9"));
    }

    #[test]
    fn test_from_toml() {
        let catalog = ScenarioCatalog::from_toml_str(
            r#"
            [[scenario]]
            id = "exam"
            title = "Exam Stress"
            text = "An upcoming exam."

            [[scenario]]
            id = "move"
            title = "Moving Away"
            text = "Leaving home for the first time."
            "#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.scenarios()[1].id, "move");
    }

    #[test]
    fn test_rejects_duplicates_and_blanks() {
        let dup = ScenarioCatalog::new(vec![
            Scenario::new("a", "A", "a"),
            Scenario::new("a", "B", "b"),
        ]);
        assert!(matches!(dup, Err(CatalogError::DuplicateId(id)) if id == "a"));

        let blank = ScenarioCatalog::new(vec![Scenario::new("a", " ", "a")]);
        assert!(matches!(
            blank,
            Err(CatalogError::BlankField { index: 0, field: "title" })
        ));

        assert!(matches!(ScenarioCatalog::new(vec![]), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            "[[scenario]]\nid = \"T1\"\ntitle = \"Exam Stress\"\ntext = \"An upcoming exam.\"\n",
        )
        .unwrap();
        let catalog = ScenarioCatalog::load(&path).unwrap();
        assert_eq!(catalog.get("T1").unwrap().title, "Exam Stress");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScenarioCatalog::load(Path::new("/nonexistent/catalog.toml")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
