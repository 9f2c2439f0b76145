use std::collections::HashMap;

use tracing::debug;

use crate::model::{Category, Resource, normalize};

/// Authoritative resource list, keyed case-insensitively.
///
/// Inserting a name that already exists merges into the existing entry:
/// quantities are summed and constraint sets are unioned.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Insertion order.
    resources: Vec<Resource>,
    /// Normalized name → position in `resources`.
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Resource> {
        self.index
            .get(&normalize(name))
            .map(|&pos| &self.resources[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&normalize(name))
    }

    /// Insert, or merge into the entry with the same normalized name.
    /// Returns the resulting catalog entry.
    pub fn add_resource(&mut self, resource: Resource) -> &Resource {
        let key = resource.normalized_name();
        if let Some(&pos) = self.index.get(&key) {
            let existing = &mut self.resources[pos];
            existing.quantity = existing.quantity.saturating_add(resource.quantity);
            existing.requires.extend(resource.requires);
            existing.excludes.extend(resource.excludes);
            existing.excludes_categories.extend(resource.excludes_categories);
            debug!(resource = %existing.name, quantity = existing.quantity, "merged resource");
            return &self.resources[pos];
        }
        let pos = self.resources.len();
        self.resources.push(resource);
        self.index.insert(key, pos);
        &self.resources[pos]
    }

    /// Delete a catalog entry. Events that reference it are untouched.
    pub fn remove_resource(&mut self, name: &str) -> Option<Resource> {
        let pos = self.index.remove(&normalize(name))?;
        let removed = self.resources.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Take `amount` units out of service. No-op returning false if the
    /// resource is absent or has fewer than `amount` units.
    pub fn mark_unavailable(&mut self, name: &str, amount: u32) -> bool {
        let Some(resource) = self.find_mut(name) else {
            return false;
        };
        match resource.quantity.checked_sub(amount) {
            Some(q) => {
                resource.quantity = q;
                true
            }
            None => false,
        }
    }

    /// Return `amount` units to service.
    pub fn mark_available(&mut self, name: &str, amount: u32) -> bool {
        let Some(resource) = self.find_mut(name) else {
            return false;
        };
        match resource.quantity.checked_add(amount) {
            Some(q) => {
                resource.quantity = q;
                true
            }
            None => false,
        }
    }

    pub fn by_category<'a>(&'a self, category: &'a Category) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .iter()
            .filter(move |r| r.category() == *category)
    }

    pub fn available_by_category<'a>(
        &'a self,
        category: &'a Category,
    ) -> impl Iterator<Item = &'a Resource> {
        self.by_category(category).filter(|r| r.available())
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Resource> {
        let pos = *self.index.get(&normalize(name))?;
        Some(&mut self.resources[pos])
    }
}

impl FromIterator<Resource> for Catalog {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for r in iter {
            catalog.add_resource(r);
        }
        catalog
    }
}
