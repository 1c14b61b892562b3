//! End-of-session reveal: who sank deepest into a bubble, who stayed free, and how far apart
//! the room drifted. Everything here is a pure function of one snapshot.
//!
//! Unlike the live aggregate, the reveal covers every participant in the snapshot, active or not.

use crate::catalog::ContentCatalog;
use crate::config::InsightConfig;
use crate::similarity::cosine;
use crate::vectors::{category_vector, group_likes, ranked_groups};
use bubble_schema::{BiggestBubble, CategoryGroup, ChoiceRecord, ConcentrationInsight, GroupShare, Narrowing, ParticipantProfile, ParticipantSummary, RevealInsights, WorldsApart, GROUP_COUNT};
use std::collections::HashSet;

fn pct(part: f64, whole: f64) -> u32 { if whole <= 0.0 { 0 } else { (part / whole * 100.0).round() as u32 } }

/// A participant's liked-group breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupProfile<'p> {
    pub participant: &'p ParticipantProfile,
    pub top_group: Option<CategoryGroup>,
    /// Share of all likes (unknown ids included) that went to `top_group`.
    pub concentration_pct: u32,
    pub groups_liked: usize,
    pub total_likes: usize,
}

impl<'p> GroupProfile<'p> {
    pub fn build(participant: &'p ParticipantProfile, catalog: &ContentCatalog) -> Self {
        let ranked = ranked_groups(&participant.history, catalog);
        let total_likes = participant.likes().count();
        let (top_group, top_count) = ranked.first().map_or((None, 0), |(g, n)| (Some(*g), *n));
        Self { participant, top_group, concentration_pct: pct(top_count as f64, total_likes as f64), groups_liked: ranked.len(), total_likes }
    }

    fn insight(&self) -> ConcentrationInsight {
        ConcentrationInsight { participant_id: self.participant.id.clone(), group: self.top_group, concentration_pct: self.concentration_pct }
    }
}

pub fn summary(participant: &ParticipantProfile, catalog: &ContentCatalog, config: &InsightConfig) -> ParticipantSummary {
    ParticipantSummary {
        participant_id: participant.id.clone(),
        total_choices: participant.history.len(),
        total_likes: participant.likes().count(),
        top_groups: ranked_groups(&participant.history, catalog).into_iter().take(config.top_groups).map(|(g, n)| GroupShare::new(g, n)).collect(),
    }
}

/// Highest concentration among participants who liked anything. Ties keep the first.
pub fn most_trapped(profiles: &[GroupProfile<'_>]) -> Option<ConcentrationInsight> {
    let mut best: Option<&GroupProfile<'_>> = None;
    for p in profiles.iter().filter(|p| p.total_likes > 0) {
        if best.map_or(true, |b| p.concentration_pct > b.concentration_pct) { best = Some(p); }
    }
    best.map(GroupProfile::insight)
}

/// Lowest concentration among participants with more than `free_min_likes` likes. Ties keep the first.
pub fn most_free(profiles: &[GroupProfile<'_>], config: &InsightConfig) -> Option<ConcentrationInsight> {
    let mut best: Option<&GroupProfile<'_>> = None;
    for p in profiles.iter().filter(|p| p.total_likes > config.free_min_likes) {
        if best.map_or(true, |b| p.concentration_pct < b.concentration_pct) { best = Some(p); }
    }
    best.map(GroupProfile::insight)
}

/// The pair with the lowest category cosine. `None` when every pair is fully aligned.
pub fn worlds_apart(participants: &[ParticipantProfile], catalog: &ContentCatalog) -> Option<WorldsApart> {
    let vectors: Vec<_> = participants.iter().map(|p| category_vector(&p.history, catalog)).collect();
    let mut lowest = 1.0f64;
    let mut pair = None;
    for i in 0..vectors.len() {
        for j in i + 1..vectors.len() {
            let sim = cosine(&vectors[i], &vectors[j]);
            if sim < lowest { lowest = sim; pair = Some((i, j)); }
        }
    }
    pair.map(|(i, j)| WorldsApart { first_id: participants[i].id.clone(), second_id: participants[j].id.clone(), overlap_pct: pct(lowest.max(0.0), 1.0) })
}

/// Groups the average participant never liked, rounded. 0 for an empty session.
pub fn groups_missed(profiles: &[GroupProfile<'_>]) -> u32 {
    if profiles.is_empty() { return 0; }
    let avg = profiles.iter().map(|p| p.groups_liked).sum::<usize>() as f64 / profiles.len() as f64;
    (GROUP_COUNT as f64 - avg).round() as u32
}

/// The group that is most often somebody's top group, as a share of everyone. Ties keep group order.
pub fn biggest_bubble(profiles: &[GroupProfile<'_>]) -> Option<BiggestBubble> {
    let mut counts = [0u32; GROUP_COUNT];
    for g in profiles.iter().filter_map(|p| p.top_group) { counts[g.index()] += 1; }
    let mut best: Option<(CategoryGroup, u32)> = None;
    for g in CategoryGroup::ALL {
        let n = counts[g.index()];
        if n > 0 && best.map_or(true, |(_, b)| n > b) { best = Some((g, n)); }
    }
    best.map(|(g, n)| BiggestBubble { group: GroupShare::new(g, n), pct: pct(n as f64, profiles.len() as f64) })
}

fn distinct_groups(likes: &[&ChoiceRecord], catalog: &ContentCatalog) -> usize {
    group_likes(likes.iter().copied(), catalog).iter().filter(|n| **n > 0).count()
}

/// Liked-group diversity in the first vs. second half of each participant's likes, for
/// participants with at least `narrowing_min_choices` choices.
pub fn narrowing(participants: &[ParticipantProfile], catalog: &ContentCatalog, config: &InsightConfig) -> Narrowing {
    let (mut first, mut second, mut n) = (0usize, 0usize, 0usize);
    for p in participants.iter().filter(|p| p.history.len() >= config.narrowing_min_choices) {
        let likes: Vec<&ChoiceRecord> = p.likes().collect();
        let (a, b) = likes.split_at(likes.len() / 2);
        first += distinct_groups(a, catalog);
        second += distinct_groups(b, catalog);
        n += 1;
    }
    let avg = |total: usize| (total as f64 / n.max(1) as f64 * 10.0).round() / 10.0;
    let (first_half_groups, second_half_groups) = (avg(first), avg(second));
    Narrowing { first_half_groups, second_half_groups, narrowed: second_half_groups < first_half_groups }
}

/// Share of pairs where both sides liked something and nothing in common.
pub fn zero_in_common(participants: &[ParticipantProfile]) -> u32 {
    let sets: Vec<HashSet<&str>> = participants.iter().map(|p| p.likes().map(|c| c.content_id.as_str()).collect()).collect();
    let (mut zero, mut pairs) = (0usize, 0usize);
    for i in 0..sets.len() {
        for j in i + 1..sets.len() {
            pairs += 1;
            if !sets[i].is_empty() && !sets[j].is_empty() && sets[i].is_disjoint(&sets[j]) { zero += 1; }
        }
    }
    pct(zero as f64, pairs as f64)
}

/// Average share of the last `rabbit_hole_window` cards that were liked and in the participant's
/// top group, over participants with at least `rabbit_hole_min_choices` choices.
pub fn rabbit_hole(profiles: &[GroupProfile<'_>], catalog: &ContentCatalog, config: &InsightConfig) -> u32 {
    let eligible: Vec<&GroupProfile<'_>> = profiles.iter().filter(|p| p.participant.history.len() >= config.rabbit_hole_min_choices).collect();
    let mut total = 0.0;
    for p in &eligible {
        let history = &p.participant.history;
        let last = &history[history.len().saturating_sub(config.rabbit_hole_window)..];
        if last.is_empty() { continue; }
        let hits = last.iter().filter(|c| c.is_like() && p.top_group.is_some() && catalog.group_of(&c.content_id) == p.top_group).count();
        total += hits as f64 / last.len() as f64;
    }
    pct(total, eligible.len() as f64)
}

/// Share of everyone whose concentration exceeds `echo_concentration_pct` with at least `echo_min_likes` likes.
pub fn echo_chamber(profiles: &[GroupProfile<'_>], config: &InsightConfig) -> u32 {
    let n = profiles.iter().filter(|p| p.concentration_pct > config.echo_concentration_pct && p.total_likes >= config.echo_min_likes).count();
    pct(n as f64, profiles.len() as f64)
}

pub fn reveal(participants: &[ParticipantProfile], catalog: &ContentCatalog, config: &InsightConfig) -> RevealInsights {
    let profiles: Vec<GroupProfile<'_>> = participants.iter().map(|p| GroupProfile::build(p, catalog)).collect();
    RevealInsights {
        most_trapped: most_trapped(&profiles),
        most_free: most_free(&profiles, config),
        worlds_apart: worlds_apart(participants, catalog),
        groups_missed: groups_missed(&profiles),
        biggest_bubble: biggest_bubble(&profiles),
        narrowing: narrowing(participants, catalog, config),
        zero_in_common_pct: zero_in_common(participants),
        rabbit_hole_pct: rabbit_hole(&profiles, catalog, config),
        echo_chamber_pct: echo_chamber(&profiles, config),
    }
}
