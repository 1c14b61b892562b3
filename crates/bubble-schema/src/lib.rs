use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Number of top-level category groups every catalog is measured against.
pub const GROUP_COUNT: usize = 8;

/// Top-level topic bucket. The discriminant order is the index order of category vectors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CategoryGroup { Politics, Tech, Entertainment, Science, Sports, Lifestyle, Finance, Animals }

impl CategoryGroup {
    pub const ALL: [CategoryGroup; GROUP_COUNT] = [
        CategoryGroup::Politics, CategoryGroup::Tech, CategoryGroup::Entertainment, CategoryGroup::Science,
        CategoryGroup::Sports, CategoryGroup::Lifestyle, CategoryGroup::Finance, CategoryGroup::Animals,
    ];
    pub fn index(self) -> usize { self as usize }
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryGroup::Politics => "politics",
            CategoryGroup::Tech => "tech",
            CategoryGroup::Entertainment => "entertainment",
            CategoryGroup::Science => "science",
            CategoryGroup::Sports => "sports",
            CategoryGroup::Lifestyle => "lifestyle",
            CategoryGroup::Finance => "finance",
            CategoryGroup::Animals => "animals",
        }
    }
    pub fn parse(s: &str) -> Option<Self> { CategoryGroup::ALL.into_iter().find(|g| g.as_str() == s) }
    /// Group of a `<group>_<variant>` category, if the prefix is one of the eight.
    pub fn from_category(category: &str) -> Option<Self> { split_category(category).and_then(|(g, _)| Self::parse(g)) }
    pub fn display_name(self) -> &'static str {
        match self {
            CategoryGroup::Politics => "Politics",
            CategoryGroup::Tech => "Technology",
            CategoryGroup::Entertainment => "Entertainment",
            CategoryGroup::Science => "Science",
            CategoryGroup::Sports => "Sports",
            CategoryGroup::Lifestyle => "Lifestyle",
            CategoryGroup::Finance => "Finance",
            CategoryGroup::Animals => "Animals",
        }
    }
}

impl fmt::Display for CategoryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Splits `tech_optimist` into `("tech", "optimist")`. Both halves must be non-empty.
pub fn split_category(category: &str) -> Option<(&str, &str)> {
    let (group, variant) = category.split_once('_')?;
    if group.is_empty() || variant.is_empty() { return None; }
    Some((group, variant))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}
impl ContentItem {
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self { id: id.into(), category: category.into(), tags: vec![], headline: None }
    }
    pub fn group(&self) -> Option<CategoryGroup> { CategoryGroup::from_category(&self.category) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceAction { Like, Skip }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceRecord {
    pub content_id: String,
    pub action: ChoiceAction,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_time_ms: Option<u64>,
}
impl ChoiceRecord {
    pub fn like(content_id: impl Into<String>, timestamp: u64) -> Self {
        Self { content_id: content_id.into(), action: ChoiceAction::Like, timestamp, dwell_time_ms: None }
    }
    pub fn skip(content_id: impl Into<String>, timestamp: u64) -> Self {
        Self { content_id: content_id.into(), action: ChoiceAction::Skip, timestamp, dwell_time_ms: None }
    }
    pub fn is_like(&self) -> bool { self.action == ChoiceAction::Like }
}

fn default_active() -> bool { true }

/// A participant and their append-only choice history. Vectors are always derived from `history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub history: Vec<ChoiceRecord>,
    #[serde(default = "default_active")]
    pub active: bool,
}
impl ParticipantProfile {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self { name: id.clone(), id, history: vec![], active: true }
    }
    pub fn with_history(id: impl Into<String>, history: Vec<ChoiceRecord>) -> Self {
        Self { history, ..Self::new(id) }
    }
    pub fn record(&mut self, choice: ChoiceRecord) { self.history.push(choice); }
    pub fn likes(&self) -> impl Iterator<Item = &ChoiceRecord> { self.history.iter().filter(|c| c.is_like()) }
    /// SHA-256 over the id; stable across processes.
    pub fn digest(&self) -> [u8; 32] { participant_digest(&self.id) }
}

pub fn participant_digest(id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new(); hasher.update(id.as_bytes());
    let mut out = [0u8; 32]; out.copy_from_slice(&hasher.finalize()); out
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position { pub x: f64, pub y: f64 }
impl Position {
    pub const fn new(x: f64, y: f64) -> Self { Self { x, y } }
    pub fn distance(&self, other: &Position) -> f64 { ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt() }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub id: String,
    pub label: String,
    pub member_ids: Vec<String>,
    pub centroid: Position,
    pub dominant_subcategories: Vec<String>,
}

/// Whole-session snapshot, regenerated on every tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionAggregate {
    pub shared_reality_pct: u8,
    pub clusters: Vec<ClusterInfo>,
    pub most_unique_id: Option<String>,
    pub most_mainstream_id: Option<String>,
    pub total_choices: usize,
    pub average_progress_pct: u32,
    pub positions: BTreeMap<String, Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Default for SessionAggregate {
    fn default() -> Self {
        Self { shared_reality_pct: 100, clusters: vec![], most_unique_id: None, most_mainstream_id: None, total_choices: 0, average_progress_pct: 0, positions: BTreeMap::new(), checksum: None }
    }
}

impl SessionAggregate {
    pub fn compute_checksum(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() { obj.remove("checksum"); }
        let canonical = serde_json::to_vec(&value)?;
        let mut hasher = Sha256::new(); hasher.update(canonical); Ok(format!("{:x}", hasher.finalize()))
    }
    pub fn with_computed_checksum(mut self) -> Result<Self, serde_json::Error> { let c = self.compute_checksum()?; self.checksum = Some(c); Ok(self) }
    pub fn verify_checksum(&self) -> bool { match (self.checksum.as_ref(), self.compute_checksum()) { (Some(existing), Ok(recalc)) => existing == &recalc, _ => false } }
}

/// Answer to "what should this participant see next".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NextCardDecision {
    Card { #[serde(rename = "contentId")] content_id: String },
    Exhausted,
}
impl NextCardDecision {
    pub fn content_id(&self) -> Option<&str> { match self { NextCardDecision::Card { content_id } => Some(content_id), NextCardDecision::Exhausted => None } }
    pub fn is_exhausted(&self) -> bool { matches!(self, NextCardDecision::Exhausted) }
}

/// A category group with a count attached, carrying the group's display name for the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupShare { pub group: CategoryGroup, pub name: String, pub count: u32 }
impl GroupShare {
    pub fn new(group: CategoryGroup, count: u32) -> Self { Self { group, name: group.display_name().to_string(), count } }
}

/// What a participant sees on the completion screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub participant_id: String,
    pub total_choices: usize,
    pub total_likes: usize,
    /// Most-liked groups, highest count first.
    pub top_groups: Vec<GroupShare>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConcentrationInsight { pub participant_id: String, pub group: Option<CategoryGroup>, pub concentration_pct: u32 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorldsApart { pub first_id: String, pub second_id: String, pub overlap_pct: u32 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BiggestBubble { pub group: GroupShare, pub pct: u32 }

/// Distinct liked groups in the first vs. second half of likes, averaged to one decimal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Narrowing { pub first_half_groups: f64, pub second_half_groups: f64, pub narrowed: bool }

/// End-of-session divergence summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevealInsights {
    pub most_trapped: Option<ConcentrationInsight>,
    pub most_free: Option<ConcentrationInsight>,
    pub worlds_apart: Option<WorldsApart>,
    /// Groups the average participant never liked anything from.
    pub groups_missed: u32,
    pub biggest_bubble: Option<BiggestBubble>,
    pub narrowing: Narrowing,
    pub zero_in_common_pct: u32,
    pub rabbit_hole_pct: u32,
    pub echo_chamber_pct: u32,
}
