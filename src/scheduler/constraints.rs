use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::model::normalize;

/// A selected resource and the other selected resources it may not share an event with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionConflict {
    pub resource: String,
    /// Sorted, unique display names.
    pub conflicts_with: Vec<String>,
}

/// Structured co-requisite / exclusion failure, keyed by display names so a
/// front end can render per-resource detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintViolation {
    pub missing_requires: BTreeMap<String, Vec<String>>,
    pub mutual_exclusion: Vec<ExclusionConflict>,
}

impl ConstraintViolation {
    pub fn is_empty(&self) -> bool {
        self.missing_requires.is_empty() && self.mutual_exclusion.is_empty()
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (resource, missing) in &self.missing_requires {
            parts.push(format!("'{resource}' requires [{}]", missing.join(", ")));
        }
        for conflict in &self.mutual_exclusion {
            parts.push(format!(
                "'{}' cannot be combined with [{}]",
                conflict.resource,
                conflict.conflicts_with.join(", ")
            ));
        }
        f.write_str(&parts.join("; "))
    }
}

/// Check a set of requested resource names against the catalog's requires /
/// excludes / excludes_categories rules.
///
/// Names that are not in the catalog are skipped here; the admission check
/// reports them as unknown resources.
pub fn validate<'a, I>(selected: I, catalog: &Catalog) -> Result<(), ConstraintViolation>
where
    I: IntoIterator<Item = &'a str>,
{
    let selected: BTreeSet<String> = selected
        .into_iter()
        .map(normalize)
        .filter(|n| !n.is_empty())
        .collect();

    let mut violation = ConstraintViolation::default();

    for key in &selected {
        let Some(resource) = catalog.find_by_name(key) else {
            continue;
        };

        // Co-requisites
        let missing: Vec<String> = resource
            .requires
            .iter()
            .map(|r| normalize(r))
            .filter(|r| !selected.contains(r))
            .collect();
        if !missing.is_empty() {
            violation
                .missing_requires
                .entry(resource.name.clone())
                .or_default()
                .extend(missing);
        }

        // Exclusions by name, then by category
        let mut conflicts = BTreeSet::new();
        for excluded in &resource.excludes {
            let excluded = normalize(excluded);
            if excluded != *key && selected.contains(&excluded) {
                let display = catalog
                    .find_by_name(&excluded)
                    .map_or_else(|| excluded.clone(), |r| r.name.clone());
                conflicts.insert(display);
            }
        }
        if !resource.excludes_categories.is_empty() {
            for other in selected.iter().filter(|o| *o != key) {
                if let Some(other) = catalog.find_by_name(other)
                    && resource.excludes_categories.contains(&other.category())
                {
                    conflicts.insert(other.name.clone());
                }
            }
        }
        if !conflicts.is_empty() {
            violation.mutual_exclusion.push(ExclusionConflict {
                resource: resource.name.clone(),
                conflicts_with: conflicts.into_iter().collect(),
            });
        }
    }

    if violation.is_empty() {
        Ok(())
    } else {
        Err(violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Resource, ResourceKind};

    fn catalog(resources: Vec<Resource>) -> Catalog {
        let mut c = Catalog::new();
        for r in resources {
            c.add_resource(r);
        }
        c
    }

    #[test]
    fn corequisite_present_passes() {
        let c = catalog(vec![
            Resource::item("Cámara RED", 1)
                .unwrap()
                .with_requires(["Técnico de Cámara Certificado"]),
            Resource::employee("Técnico de Cámara Certificado", "camera").unwrap(),
        ]);
        assert!(validate(["Cámara RED", "técnico de cámara certificado"], &c).is_ok());
    }

    #[test]
    fn corequisite_missing_is_reported_under_display_name() {
        let c = catalog(vec![
            Resource::item("Cámara RED", 1)
                .unwrap()
                .with_requires(["Técnico de Cámara Certificado"]),
        ]);
        let err = validate(["cámara red"], &c).unwrap_err();
        assert_eq!(
            err.missing_requires.get("Cámara RED"),
            Some(&vec!["técnico de cámara certificado".to_string()])
        );
        assert!(err.mutual_exclusion.is_empty());
    }

    #[test]
    fn multiple_requires_all_listed() {
        let c = catalog(vec![
            Resource::item("Cirugía Robótica", 1)
                .unwrap()
                .with_requires(["Consola Da Vinci", "Cirujano Certificado"]),
            Resource::item("Consola Da Vinci", 1).unwrap(),
        ]);
        let err = validate(["Cirugía Robótica"], &c).unwrap_err();
        assert_eq!(
            err.missing_requires["Cirugía Robótica"],
            vec!["cirujano certificado", "consola da vinci"]
        );
        assert!(validate(["Cirugía Robótica", "Consola Da Vinci", "Cirujano Certificado"], &c).is_ok());
    }

    #[test]
    fn exclusion_by_name_reported_from_both_sides() {
        let c = catalog(vec![
            Resource::item("Mechero Bunsen", 1)
                .unwrap()
                .with_excludes(["Contenedor de Éter"]),
            Resource::item("Contenedor de Éter", 1)
                .unwrap()
                .with_excludes(["Mechero Bunsen"]),
        ]);
        let err = validate(["Mechero Bunsen", "Contenedor de Éter"], &c).unwrap_err();
        assert_eq!(err.mutual_exclusion.len(), 2);
        let bunsen = err
            .mutual_exclusion
            .iter()
            .find(|c| c.resource == "Mechero Bunsen")
            .unwrap();
        assert_eq!(bunsen.conflicts_with, vec!["Contenedor de Éter"]);
    }

    #[test]
    fn exclusion_declared_on_one_side_still_fails() {
        let c = catalog(vec![
            Resource::item("Generator", 1).unwrap().with_excludes(["Quiet Room"]),
            Resource::room("Quiet Room", 10).unwrap(),
        ]);
        assert!(validate(["Generator", "Quiet Room"], &c).is_err());
        assert!(validate(["Quiet Room", "Generator"], &c).is_err());
        assert!(validate(["Quiet Room"], &c).is_ok());
    }

    #[test]
    fn exclusion_by_category() {
        let c = catalog(vec![
            Resource::new("Sala de Grabación A", ResourceKind::Generic(Category::Room), 1)
                .unwrap()
                .with_excludes_categories(["item"]),
            Resource::item("Batería Acústica", 1).unwrap(),
            Resource::item("Micrófono", 2).unwrap(),
        ]);
        let err = validate(["Sala de Grabación A", "Batería Acústica", "Micrófono"], &c).unwrap_err();
        assert_eq!(err.mutual_exclusion.len(), 1);
        assert_eq!(err.mutual_exclusion[0].resource, "Sala de Grabación A");
        assert_eq!(
            err.mutual_exclusion[0].conflicts_with,
            vec!["Batería Acústica", "Micrófono"]
        );
    }

    #[test]
    fn category_exclusion_does_not_hit_self() {
        let c = catalog(vec![
            Resource::item("Lamp", 1).unwrap().with_excludes_categories(["item"]),
        ]);
        assert!(validate(["Lamp"], &c).is_ok());
    }

    #[test]
    fn unknown_names_are_ignored() {
        let c = catalog(vec![Resource::item("Cable", 1).unwrap()]);
        assert!(validate(["Cable", "Ghost"], &c).is_ok());
    }

    #[test]
    fn display_lists_both_kinds() {
        let c = catalog(vec![
            Resource::item("A", 1).unwrap().with_requires(["B"]).with_excludes(["C"]),
            Resource::item("C", 1).unwrap(),
        ]);
        let msg = validate(["A", "C"], &c).unwrap_err().to_string();
        assert!(msg.contains("'A' requires [b]"));
        assert!(msg.contains("'A' cannot be combined with [C]"));
    }
}
