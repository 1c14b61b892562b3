//! Derived preference vectors. Both are pure functions of a history and the catalog.

use crate::catalog::ContentCatalog;
use bubble_schema::{CategoryGroup, ChoiceAction, ChoiceRecord, GROUP_COUNT};

pub const LIKE_WEIGHT: f64 = 1.0;
pub const SKIP_WEIGHT: f64 = -0.5;

/// Per-group like proportions, indexed by `CategoryGroup::index`.
pub type CategoryVector = [f64; GROUP_COUNT];

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceVectors {
    pub content: Vec<f64>,
    pub category: CategoryVector,
}

impl PreferenceVectors {
    pub fn build(history: &[ChoiceRecord], catalog: &ContentCatalog) -> Self {
        Self { content: content_vector(history, catalog), category: category_vector(history, catalog) }
    }
}

/// One slot per catalog item: `+1` liked, `-0.5` skipped, `0` unseen. Later records win.
pub fn content_vector(history: &[ChoiceRecord], catalog: &ContentCatalog) -> Vec<f64> {
    let mut v = vec![0.0; catalog.len()];
    let mut orphaned = 0usize;
    for choice in history {
        match catalog.index_of(&choice.content_id) {
            Some(idx) => v[idx] = match choice.action { ChoiceAction::Like => LIKE_WEIGHT, ChoiceAction::Skip => SKIP_WEIGHT },
            None => orphaned += 1,
        }
    }
    if orphaned > 0 { tracing::debug!(orphaned, "content vector skipped records with unknown content ids"); }
    v
}

/// Likes per category group, L1-normalised. All zeros when there are no (known) likes.
pub fn category_vector(history: &[ChoiceRecord], catalog: &ContentCatalog) -> CategoryVector {
    let mut v = [0.0; GROUP_COUNT];
    let mut orphaned = 0usize;
    for choice in history.iter().filter(|c| c.is_like()) {
        match catalog.group_of(&choice.content_id) {
            Some(g) => v[g.index()] += 1.0,
            None => orphaned += 1,
        }
    }
    if orphaned > 0 { tracing::debug!(orphaned, "category vector skipped likes with unknown content ids"); }
    let total: f64 = v.iter().sum();
    if total > 0.0 { for x in &mut v { *x /= total; } }
    v
}

/// Raw like counts per group; unknown ids are ignored.
pub fn group_likes<'h>(likes: impl IntoIterator<Item = &'h ChoiceRecord>, catalog: &ContentCatalog) -> [u32; GROUP_COUNT] {
    let mut counts = [0u32; GROUP_COUNT];
    for choice in likes.into_iter().filter(|c| c.is_like()) {
        if let Some(g) = catalog.group_of(&choice.content_id) { counts[g.index()] += 1; }
    }
    counts
}

/// Liked groups, most liked first. Ties keep group order.
pub fn ranked_groups(history: &[ChoiceRecord], catalog: &ContentCatalog) -> Vec<(CategoryGroup, u32)> {
    let counts = group_likes(history, catalog);
    let mut ranked: Vec<(CategoryGroup, u32)> = CategoryGroup::ALL.into_iter().map(|g| (g, counts[g.index()])).filter(|(_, n)| *n > 0).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

pub fn top_groups(history: &[ChoiceRecord], catalog: &ContentCatalog, n: usize) -> Vec<CategoryGroup> {
    ranked_groups(history, catalog).into_iter().take(n).map(|(g, _)| g).collect()
}
