//! Engine tunables and the injected read-only tables (anchors, cluster labels).

use bubble_schema::{CategoryGroup, Position};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Full engine configuration. Every field has a default so partial JSON documents load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recommend: RecommendConfig,
    pub similarity: SimilarityConfig,
    pub clusters: ClusterConfig,
    pub position: PositionConfig,
    pub session: SessionConfig,
    pub insights: InsightConfig,
    pub anchors: AnchorTable,
    pub labels: ClusterLabels,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> { Ok(serde_json::from_str(json)?) }
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> { Self::from_json(&std::fs::read_to_string(path)?) }
    pub fn to_json(&self) -> Result<String, ConfigError> { Ok(serde_json::to_string_pretty(self)?) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Histories shorter than this are in the exploration phase.
    pub exploration_len: usize,
    pub amplification_base: f64,
    pub amplification_gain: f64,
    /// History length at which amplification reaches `base + gain`.
    pub amplification_horizon: f64,
    pub untouched_group_weight: f64,
    pub rejected_group_weight: f64,
    pub min_group_weight: f64,
    pub skip_penalty: f64,
    pub subcategory_bonus: f64,
    pub jitter_max: f64,
    pub top_k: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            exploration_len: 8,
            amplification_base: 2.0,
            amplification_gain: 3.0,
            amplification_horizon: 40.0,
            untouched_group_weight: 0.5,
            rejected_group_weight: 0.05,
            min_group_weight: 0.1,
            skip_penalty: 0.5,
            subcategory_bonus: 0.5,
            jitter_max: 1.5,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Average choices per participant at which divergence counts in full.
    pub onset_choices: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self { Self { onset_choices: 10.0 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub threshold: f64,
    pub max_dominant: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self { Self { threshold: 0.4, max_dominant: 3 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub center: f64,
    pub amplification: f64,
    pub min: f64,
    pub max: f64,
    /// Participants without likes land uniformly in `[idle_min, idle_max]` on both axes.
    pub idle_min: f64,
    pub idle_max: f64,
    /// Multipliers by rank of liked subcategory; ranks past the end use the last entry.
    pub rank_multipliers: Vec<f64>,
    /// Half-width of the per-participant offset derived from the id digest. 0 disables it.
    pub id_offset: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self { center: 50.0, amplification: 1.8, min: 5.0, max: 95.0, idle_min: 45.0, idle_max: 55.0, rank_multipliers: vec![4.0, 2.0, 1.0], id_offset: 1.0 }
    }
}

impl PositionConfig {
    pub fn rank_multiplier(&self, rank: usize) -> f64 {
        self.rank_multipliers.get(rank).or_else(|| self.rank_multipliers.last()).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cards_per_participant: usize,
}

impl Default for SessionConfig {
    fn default() -> Self { Self { cards_per_participant: 40 } }
}

/// Thresholds for the end-of-session reveal. Concentrations are percentages of a participant's likes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Groups listed in a participant summary.
    pub top_groups: usize,
    /// "Most free" only considers participants with more likes than this.
    pub free_min_likes: usize,
    pub narrowing_min_choices: usize,
    pub rabbit_hole_min_choices: usize,
    pub rabbit_hole_window: usize,
    /// Echo chamber: concentration strictly above this, with at least `echo_min_likes` likes.
    pub echo_concentration_pct: u32,
    pub echo_min_likes: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self { top_groups: 3, free_min_likes: 3, narrowing_min_choices: 10, rabbit_hole_min_choices: 15, rabbit_hole_window: 10, echo_concentration_pct: 50, echo_min_likes: 5 }
    }
}

/// Visualization anchor for every subcategory. Sibling subcategories sit next to each other;
/// the eight groups ring the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorTable(HashMap<String, Position>);

impl AnchorTable {
    pub fn new(entries: impl IntoIterator<Item = (String, Position)>) -> Self { Self(entries.into_iter().collect()) }
    pub fn get(&self, subcategory: &str) -> Option<Position> { self.0.get(subcategory).copied() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl Default for AnchorTable {
    fn default() -> Self {
        const ANCHORS: [(&str, f64, f64); 20] = [
            ("politics_left", 8.0, 15.0),
            ("politics_right", 18.0, 25.0),
            ("politics_center", 13.0, 35.0),
            ("tech_optimist", 40.0, 8.0),
            ("tech_pessimist", 50.0, 18.0),
            ("science_climate", 72.0, 8.0),
            ("science_space", 82.0, 15.0),
            ("science_health", 67.0, 20.0),
            ("finance_crypto", 92.0, 38.0),
            ("finance_traditional", 88.0, 52.0),
            ("sports_mainstream", 85.0, 72.0),
            ("sports_niche", 78.0, 85.0),
            ("entertainment_celebrity", 55.0, 92.0),
            ("entertainment_movies", 45.0, 85.0),
            ("entertainment_gaming", 62.0, 82.0),
            ("lifestyle_fitness", 25.0, 82.0),
            ("lifestyle_food", 18.0, 72.0),
            ("lifestyle_travel", 32.0, 90.0),
            ("animals_cute", 8.0, 55.0),
            ("animals_wild", 15.0, 65.0),
        ];
        Self::new(ANCHORS.iter().map(|(k, x, y)| (k.to_string(), Position::new(*x, *y))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterLabels {
    pub by_group: HashMap<CategoryGroup, String>,
    pub fallback: String,
}

impl ClusterLabels {
    pub fn label_for(&self, group: Option<CategoryGroup>) -> &str {
        group.and_then(|g| self.by_group.get(&g)).map(String::as_str).unwrap_or(&self.fallback)
    }
}

impl Default for ClusterLabels {
    fn default() -> Self {
        let by_group = [
            (CategoryGroup::Politics, "The News Junkies"),
            (CategoryGroup::Tech, "The Tech Prophets"),
            (CategoryGroup::Entertainment, "The Entertainers"),
            (CategoryGroup::Science, "The Curious Minds"),
            (CategoryGroup::Sports, "The Sports Fans"),
            (CategoryGroup::Lifestyle, "The Life Optimizers"),
            (CategoryGroup::Finance, "The Money Minds"),
            (CategoryGroup::Animals, "The Animal Lovers"),
        ]
        .into_iter()
        .map(|(g, l)| (g, l.to_string()))
        .collect();
        Self { by_group, fallback: "The Eclectics".to_string() }
    }
}
