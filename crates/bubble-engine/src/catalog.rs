//! Immutable content catalog with load-time validation.

use bubble_schema::{split_category, CategoryGroup, ContentItem, GROUP_COUNT};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("duplicate content id: {0}")]
    DuplicateId(String),
    #[error("content {id}: category {category:?} is not of the form <group>_<variant>")]
    MalformedCategory { id: String, category: String },
    #[error("content {id}: unknown category group {group:?}")]
    UnknownGroup { id: String, group: String },
    #[error("catalog is missing category groups: {0:?}")]
    MissingGroups(Vec<CategoryGroup>),
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ContentCatalog {
    items: Vec<ContentItem>,
    groups: Vec<CategoryGroup>,
    index: HashMap<String, usize>,
}

impl ContentCatalog {
    /// Strict loader: every one of the eight groups must be present.
    pub fn load(items: Vec<ContentItem>) -> Result<Self, CatalogError> {
        let catalog = Self::partial(items)?;
        let missing = catalog.missing_groups();
        if !missing.is_empty() { return Err(CatalogError::MissingGroups(missing)); }
        Ok(catalog)
    }

    /// Same checks as [`ContentCatalog::load`] except that absent groups are tolerated.
    pub fn partial(items: Vec<ContentItem>) -> Result<Self, CatalogError> {
        if items.is_empty() { return Err(CatalogError::Empty); }
        let mut index = HashMap::with_capacity(items.len());
        let mut groups = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let (prefix, _) = split_category(&item.category).ok_or_else(|| CatalogError::MalformedCategory { id: item.id.clone(), category: item.category.clone() })?;
            let group = CategoryGroup::parse(prefix).ok_or_else(|| CatalogError::UnknownGroup { id: item.id.clone(), group: prefix.to_string() })?;
            if index.insert(item.id.clone(), i).is_some() { return Err(CatalogError::DuplicateId(item.id.clone())); }
            groups.push(group);
        }
        let catalog = Self { items, groups, index };
        let missing = catalog.missing_groups();
        if !missing.is_empty() {
            tracing::warn!(?missing, items = catalog.len(), "catalog accepted without every category group");
        }
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> { Self::load(serde_json::from_str(json)?) }

    /// The 44-item classroom catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> { Self::from_json(BUILTIN_CATALOG) }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn items(&self) -> &[ContentItem] { &self.items }
    pub fn iter(&self) -> impl Iterator<Item = (&ContentItem, CategoryGroup)> { self.items.iter().zip(self.groups.iter().copied()) }
    pub fn index_of(&self, id: &str) -> Option<usize> { self.index.get(id).copied() }
    pub fn get(&self, id: &str) -> Option<&ContentItem> { self.index_of(id).map(|i| &self.items[i]) }
    pub fn group_of(&self, id: &str) -> Option<CategoryGroup> { self.index_of(id).map(|i| self.groups[i]) }
    pub fn group_at(&self, idx: usize) -> CategoryGroup { self.groups[idx] }
    pub fn ids(&self) -> impl Iterator<Item = &str> { self.items.iter().map(|c| c.id.as_str()) }

    pub fn present_groups(&self) -> HashSet<CategoryGroup> { self.groups.iter().copied().collect() }

    pub fn missing_groups(&self) -> Vec<CategoryGroup> {
        let present = self.present_groups();
        if present.len() == GROUP_COUNT { return vec![]; }
        CategoryGroup::ALL.into_iter().filter(|g| !present.contains(g)).collect()
    }

    /// Distinct subcategories in first-seen order.
    pub fn subcategories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.items.iter().map(|c| c.category.as_str()).filter(|c| seen.insert(*c)).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `per_group` items per group, all in the `<group>_a` subcategory, ids `<group>_<n>`.
    pub(crate) fn synthetic(per_group: usize) -> ContentCatalog {
        let items = CategoryGroup::ALL.iter().flat_map(|g| (0..per_group).map(move |n| ContentItem::new(format!("{}_{}", g, n), format!("{}_a", g)))).collect();
        ContentCatalog::load(items).unwrap()
    }

    #[test]
    fn builtin_catalog_is_complete() {
        let catalog = ContentCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), 44);
        assert!(catalog.missing_groups().is_empty());
        assert_eq!(catalog.subcategories().len(), 20);
        assert_eq!(catalog.group_of("tech_o_1"), Some(CategoryGroup::Tech));
        assert!(catalog.get("tech_o_1").and_then(|c| c.headline.as_ref()).is_some());
    }

    #[test]
    fn strict_load_rejects_missing_groups() {
        let items = vec![ContentItem::new("a", "tech_optimist"), ContentItem::new("b", "finance_crypto")];
        match ContentCatalog::load(items.clone()) {
            Err(CatalogError::MissingGroups(missing)) => { assert_eq!(missing.len(), 6); assert!(!missing.contains(&CategoryGroup::Tech)); }
            other => panic!("expected MissingGroups, got {:?}", other),
        }
        let partial = ContentCatalog::partial(items).unwrap();
        assert_eq!(partial.len(), 2);
    }

    #[test]
    fn rejects_duplicates_and_bad_categories() {
        let dup = vec![ContentItem::new("a", "tech_optimist"), ContentItem::new("a", "tech_pessimist")];
        assert!(matches!(ContentCatalog::partial(dup), Err(CatalogError::DuplicateId(id)) if id == "a"));
        assert!(matches!(ContentCatalog::partial(vec![ContentItem::new("a", "tech")]), Err(CatalogError::MalformedCategory { .. })));
        assert!(matches!(ContentCatalog::partial(vec![ContentItem::new("a", "weather_rain")]), Err(CatalogError::UnknownGroup { group, .. }) if group == "weather"));
        assert!(matches!(ContentCatalog::partial(vec![]), Err(CatalogError::Empty)));
        assert!(matches!(ContentCatalog::from_json("{not json"), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn index_follows_catalog_order() {
        let catalog = synthetic(2);
        assert_eq!(catalog.len(), 16);
        assert_eq!(catalog.index_of("politics_0"), Some(0));
        assert_eq!(catalog.index_of("animals_1"), Some(15));
        assert_eq!(catalog.group_at(2), CategoryGroup::Tech);
        assert_eq!(catalog.index_of("nope"), None);
    }
}
