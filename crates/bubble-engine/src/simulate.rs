//! Simulated participants for demos: each bot has a two-group personality and swipes through
//! whatever the recommendation policy serves it.

use crate::recommend::RecommendationPolicy;
use bubble_schema::{CategoryGroup, ChoiceAction, ChoiceRecord, ContentItem, NextCardDecision, ParticipantProfile};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

pub const MATCH_LIKE_CHANCE: f64 = 0.85;
pub const MISMATCH_LIKE_CHANCE: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct SimulatedParticipant {
    pub profile: ParticipantProfile,
    pub personality: [CategoryGroup; 2],
    pub seen: HashSet<String>,
    pub match_like_chance: f64,
    pub mismatch_like_chance: f64,
}

impl SimulatedParticipant {
    pub fn new<R: Rng + ?Sized>(id: impl Into<String>, rng: &mut R) -> Self {
        let mut groups = CategoryGroup::ALL;
        groups.shuffle(rng);
        Self::with_personality(id, [groups[0], groups[1]])
    }

    pub fn with_personality(id: impl Into<String>, personality: [CategoryGroup; 2]) -> Self {
        Self { profile: ParticipantProfile::new(id), personality, seen: HashSet::new(), match_like_chance: MATCH_LIKE_CHANCE, mismatch_like_chance: MISMATCH_LIKE_CHANCE }
    }

    pub fn likes_group(&self, group: Option<CategoryGroup>) -> bool { group.is_some_and(|g| self.personality.contains(&g)) }

    pub fn react<R: Rng + ?Sized>(&self, item: &ContentItem, rng: &mut R) -> ChoiceAction {
        let chance = if self.likes_group(item.group()) { self.match_like_chance } else { self.mismatch_like_chance };
        if rng.gen_bool(chance.clamp(0.0, 1.0)) { ChoiceAction::Like } else { ChoiceAction::Skip }
    }

    /// Requests one card and records the reaction. Returns `false` once the bot is done.
    pub fn step<R: Rng + ?Sized>(&mut self, policy: &RecommendationPolicy<'_>, budget: usize, timestamp: u64, rng: &mut R) -> bool {
        let decision = policy.decide(&self.profile.history, &self.seen, budget, rng);
        let NextCardDecision::Card { content_id } = decision else { return false };
        let Some(item) = policy.item(&content_id) else { return false };
        let action = self.react(item, rng);
        self.seen.insert(content_id.clone());
        self.profile.record(ChoiceRecord { content_id, action, timestamp, dwell_time_ms: None });
        true
    }
}
