//! Maps liked subcategories to a point on the 100x100 visualization canvas.

use crate::catalog::ContentCatalog;
use crate::config::{AnchorTable, PositionConfig};
use bubble_schema::{ChoiceRecord, ParticipantProfile, Position};
use rand::Rng;
use std::collections::BTreeMap;

/// Likes per exact subcategory, most liked first. Ties fall back to subcategory name.
pub fn subcategory_ranking<'c>(history: &[ChoiceRecord], catalog: &'c ContentCatalog) -> Vec<(&'c str, u32)> {
    let mut counts: BTreeMap<&'c str, u32> = BTreeMap::new();
    for choice in history.iter().filter(|c| c.is_like()) {
        if let Some(item) = catalog.get(&choice.content_id) { *counts.entry(item.category.as_str()).or_default() += 1; }
    }
    let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[derive(Debug, Clone, Copy)]
pub struct PositionMapper<'a> {
    catalog: &'a ContentCatalog,
    config: &'a PositionConfig,
    anchors: &'a AnchorTable,
}

impl<'a> PositionMapper<'a> {
    pub fn new(catalog: &'a ContentCatalog, config: &'a PositionConfig, anchors: &'a AnchorTable) -> Self { Self { catalog, config, anchors } }

    pub fn map_position<R: Rng + ?Sized>(&self, profile: &ParticipantProfile, rng: &mut R) -> Position {
        let c = self.config;
        let Some(avg) = self.weighted_anchor(&profile.history) else {
            let span = c.idle_max - c.idle_min;
            return Position::new(c.idle_min + rng.gen::<f64>() * span, c.idle_min + rng.gen::<f64>() * span);
        };
        let (dx, dy) = self.id_offset(profile);
        clamp(Position::new(self.project(avg.x) + dx, self.project(avg.y) + dy), c.min, c.max)
    }

    /// Rank-weighted mean of liked subcategory anchors, before amplification. `None` without likes.
    pub fn weighted_anchor(&self, history: &[ChoiceRecord]) -> Option<Position> {
        let ranked = subcategory_ranking(history, self.catalog);
        if ranked.is_empty() { return None; }
        let center = Position::new(self.config.center, self.config.center);
        let (mut x, mut y, mut total) = (0.0, 0.0, 0.0);
        for (rank, (sub, count)) in ranked.iter().enumerate() {
            let anchor = self.anchors.get(sub).unwrap_or(center);
            let weight = *count as f64 * self.config.rank_multiplier(rank);
            x += anchor.x * weight; y += anchor.y * weight; total += weight;
        }
        if total <= 0.0 { return Some(center); }
        Some(Position::new(x / total, y / total))
    }

    /// Where a participant who only liked `subcategory` would land, ignoring the id offset.
    pub fn projected_anchor(&self, subcategory: &str) -> Option<Position> {
        let a = self.anchors.get(subcategory)?;
        Some(clamp(Position::new(self.project(a.x), self.project(a.y)), self.config.min, self.config.max))
    }

    fn project(&self, v: f64) -> f64 { self.config.center + (v - self.config.center) * self.config.amplification }

    fn id_offset(&self, profile: &ParticipantProfile) -> (f64, f64) {
        if self.config.id_offset == 0.0 { return (0.0, 0.0); }
        let d = profile.digest();
        let unit = |b: u8| (b as f64 / 255.0) * 2.0 - 1.0;
        (unit(d[0]) * self.config.id_offset, unit(d[1]) * self.config.id_offset)
    }
}

fn clamp(p: Position, min: f64, max: f64) -> Position { Position::new(p.x.max(min).min(max), p.y.max(min).min(max)) }
