//! Next-card selection: explore every group first, then amplify what was liked.

use crate::catalog::ContentCatalog;
use crate::config::RecommendConfig;
use bubble_schema::{CategoryGroup, ChoiceAction, ChoiceRecord, ContentItem, NextCardDecision, GROUP_COUNT};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase { Exploration, Exploitation }

impl Phase {
    pub fn as_str(self) -> &'static str { match self { Phase::Exploration => "exploration", Phase::Exploitation => "exploitation" } }
}

#[derive(Debug, Clone, Copy)]
pub struct RecommendationPolicy<'a> {
    catalog: &'a ContentCatalog,
    config: &'a RecommendConfig,
}

impl<'a> RecommendationPolicy<'a> {
    pub fn new(catalog: &'a ContentCatalog, config: &'a RecommendConfig) -> Self { Self { catalog, config } }

    pub fn item(&self, id: &str) -> Option<&'a ContentItem> { self.catalog.get(id) }

    pub fn phase(&self, history_len: usize) -> Phase {
        if history_len < self.config.exploration_len { Phase::Exploration } else { Phase::Exploitation }
    }

    /// Grows linearly from `base` to `base + gain` over the horizon, then holds.
    pub fn amplification(&self, history_len: usize) -> f64 {
        let c = self.config;
        let ratio = if c.amplification_horizon > 0.0 { (history_len as f64 / c.amplification_horizon).min(1.0) } else { 1.0 };
        c.amplification_base + ratio * c.amplification_gain
    }

    /// Picks the next unseen item, or `None` once nothing is left. Items already in `history`
    /// count as seen. Callers own `seen` and must add the returned id to it.
    pub fn next_card<R: Rng + ?Sized>(&self, history: &[ChoiceRecord], seen: &HashSet<String>, rng: &mut R) -> Option<&'a ContentItem> {
        let seen_idx: HashSet<usize> = seen.iter().map(String::as_str).chain(history.iter().map(|c| c.content_id.as_str())).filter_map(|id| self.catalog.index_of(id)).collect();
        let unseen: Vec<usize> = (0..self.catalog.len()).filter(|i| !seen_idx.contains(i)).collect();
        if unseen.is_empty() { return None; }
        let pick = match self.phase(history.len()) {
            Phase::Exploration => self.explore(&seen_idx, &unseen, rng),
            Phase::Exploitation => self.exploit(history, &unseen, rng),
        }?;
        self.catalog.items().get(pick)
    }

    /// [`RecommendationPolicy::next_card`] with the per-participant card budget applied.
    pub fn decide<R: Rng + ?Sized>(&self, history: &[ChoiceRecord], seen: &HashSet<String>, budget: usize, rng: &mut R) -> NextCardDecision {
        if seen.len().max(history.len()) >= budget { return NextCardDecision::Exhausted; }
        match self.next_card(history, seen, rng) {
            Some(item) => NextCardDecision::Card { content_id: item.id.clone() },
            None => NextCardDecision::Exhausted,
        }
    }

    fn explore<R: Rng + ?Sized>(&self, seen_idx: &HashSet<usize>, unseen: &[usize], rng: &mut R) -> Option<usize> {
        let represented: HashSet<CategoryGroup> = seen_idx.iter().map(|&i| self.catalog.group_at(i)).collect();
        let mut fresh: BTreeMap<CategoryGroup, Vec<usize>> = BTreeMap::new();
        for &i in unseen {
            let g = self.catalog.group_at(i);
            if !represented.contains(&g) { fresh.entry(g).or_default().push(i); }
        }
        let groups: Vec<CategoryGroup> = fresh.keys().copied().collect();
        match groups.choose(rng) {
            Some(g) => fresh.get(g).and_then(|items| items.choose(rng)).copied(),
            None => unseen.choose(rng).copied(),
        }
    }

    fn exploit<R: Rng + ?Sized>(&self, history: &[ChoiceRecord], unseen: &[usize], rng: &mut R) -> Option<usize> {
        let amplification = self.amplification(history.len());
        let tally = Tally::from_history(history, self.catalog);
        let weights = self.group_weights(&tally, amplification);
        let items = self.catalog.items();
        let mut scored: Vec<(f64, usize)> = unseen.iter().map(|&i| {
            let sub_likes = tally.subcategory_likes.get(items[i].category.as_str()).copied().unwrap_or(0) as f64;
            let bonus = sub_likes * amplification * self.config.subcategory_bonus;
            let jitter = rng.gen::<f64>() * self.config.jitter_max;
            (weights[self.catalog.group_at(i).index()] + bonus + jitter, i)
        }).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let top = self.config.top_k.max(1).min(scored.len());
        scored[..top].choose(rng).map(|(_, i)| *i)
    }

    pub(crate) fn group_weights(&self, tally: &Tally, amplification: f64) -> [f64; GROUP_COUNT] {
        let c = self.config;
        let mut w = [0.0; GROUP_COUNT];
        for (g, slot) in w.iter_mut().enumerate() {
            let (likes, skips) = (tally.likes[g] as f64, tally.skips[g] as f64);
            *slot = if likes == 0.0 && skips == 0.0 {
                c.untouched_group_weight
            } else if likes == 0.0 {
                c.rejected_group_weight
            } else {
                (likes * amplification - skips * c.skip_penalty).max(c.min_group_weight)
            };
        }
        w
    }
}

/// Like/skip counts per group plus likes per exact subcategory.
#[derive(Debug, Default)]
pub(crate) struct Tally<'c> {
    pub likes: [u32; GROUP_COUNT],
    pub skips: [u32; GROUP_COUNT],
    pub subcategory_likes: HashMap<&'c str, u32>,
}

impl<'c> Tally<'c> {
    pub fn from_history(history: &[ChoiceRecord], catalog: &'c ContentCatalog) -> Self {
        let mut t = Tally::default();
        for choice in history {
            let Some(idx) = catalog.index_of(&choice.content_id) else { continue };
            let g = catalog.group_at(idx).index();
            match choice.action {
                ChoiceAction::Like => {
                    t.likes[g] += 1;
                    *t.subcategory_likes.entry(catalog.items()[idx].category.as_str()).or_default() += 1;
                }
                ChoiceAction::Skip => t.skips[g] += 1,
            }
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::synthetic;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run_exploration(catalog: &ContentCatalog, seed: u64) -> Vec<CategoryGroup> {
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(catalog, &config);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut seen = HashSet::new();
        let mut history = vec![];
        let mut groups = vec![];
        for t in 0..8 {
            let item = policy.next_card(&history, &seen, &mut rng).expect("catalog has room");
            groups.push(item.group().unwrap());
            seen.insert(item.id.clone());
            history.push(ChoiceRecord::skip(item.id.clone(), t));
        }
        groups
    }

    #[test]
    fn exploration_spans_every_group() {
        let catalog = synthetic(3);
        let groups: HashSet<_> = run_exploration(&catalog, 7).into_iter().collect();
        assert_eq!(groups.len(), GROUP_COUNT);
    }

    #[test]
    fn exploration_degrades_on_partial_catalog() {
        let items = vec![ContentItem::new("a", "tech_optimist"), ContentItem::new("b", "tech_pessimist"), ContentItem::new("c", "finance_crypto")];
        let catalog = ContentCatalog::partial(items).unwrap();
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = HashSet::new();
        let mut picks = vec![];
        while let Some(item) = policy.next_card(&[], &seen, &mut rng) { seen.insert(item.id.clone()); picks.push(item.group().unwrap()); }
        assert_eq!(picks.len(), 3);
        // both groups show up before either repeats
        assert_ne!(picks[0], picks[1]);
    }

    #[test]
    fn amplification_ramps_and_holds() {
        let catalog = synthetic(1);
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        assert_eq!(policy.amplification(0), 2.0);
        assert!((policy.amplification(8) - 2.6).abs() < 1e-12);
        assert_eq!(policy.amplification(40), 5.0);
        assert_eq!(policy.amplification(80), 5.0);
        assert_eq!(policy.phase(7), Phase::Exploration);
        assert_eq!(policy.phase(8), Phase::Exploitation);
    }

    #[test]
    fn group_weights_follow_like_skip_rules() {
        let catalog = synthetic(6);
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        let mut history = vec![ChoiceRecord::like("tech_0", 0), ChoiceRecord::like("tech_1", 1), ChoiceRecord::skip("finance_0", 2)];
        history.push(ChoiceRecord::like("sports_0", 3));
        history.extend((1..6).map(|n| ChoiceRecord::skip(format!("sports_{}", n), 4 + n as u64)));
        let tally = Tally::from_history(&history, &catalog);
        let w = policy.group_weights(&tally, 3.0);
        assert_eq!(w[CategoryGroup::Tech.index()], 6.0);
        assert_eq!(w[CategoryGroup::Finance.index()], 0.05);
        assert_eq!(w[CategoryGroup::Animals.index()], 0.5);
        // 1 * 3.0 - 5 * 0.5 = 0.5
        assert_eq!(w[CategoryGroup::Sports.index()], 0.5);
        let mut heavy = history.clone();
        heavy.extend((0..6).map(|n| ChoiceRecord::skip(format!("science_{}", n), 20 + n as u64)));
        heavy.push(ChoiceRecord::like("science_0", 30));
        let tally = Tally::from_history(&heavy, &catalog);
        assert_eq!(policy.group_weights(&tally, 2.0)[CategoryGroup::Science.index()], 0.1);
    }

    #[test]
    fn exploitation_amplifies_liked_group() {
        let catalog = synthetic(6);
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        let mut history: Vec<ChoiceRecord> = CategoryGroup::ALL.iter().enumerate().map(|(t, g)| {
            let id = format!("{}_0", g);
            if *g == CategoryGroup::Tech { ChoiceRecord::like(id, t as u64) } else { ChoiceRecord::skip(id, t as u64) }
        }).collect();
        let mut seen: HashSet<String> = history.iter().map(|c| c.content_id.clone()).collect();
        let mut rng = StdRng::seed_from_u64(11);
        for t in 0..3u64 {
            let item = policy.next_card(&history, &seen, &mut rng).unwrap();
            assert_eq!(item.group(), Some(CategoryGroup::Tech));
            seen.insert(item.id.clone());
            history.push(ChoiceRecord::like(item.id.clone(), 100 + t));
        }
    }

    #[test]
    fn picks_vary_among_top_candidates() {
        let catalog = synthetic(4);
        let config = RecommendConfig { jitter_max: 0.0, ..RecommendConfig::default() };
        let policy = RecommendationPolicy::new(&catalog, &config);
        let history: Vec<ChoiceRecord> = CategoryGroup::ALL.iter().enumerate().map(|(t, g)| {
            let id = format!("{}_0", g);
            if *g == CategoryGroup::Animals { ChoiceRecord::like(id, t as u64) } else { ChoiceRecord::skip(id, t as u64) }
        }).collect();
        let mut picked = HashSet::new();
        for seed in 0..64 {
            let item = policy.next_card(&history, &HashSet::new(), &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(item.group(), Some(CategoryGroup::Animals));
            picked.insert(item.id.clone());
        }
        assert!(picked.len() > 1, "always the same card: {:?}", picked);
        assert!(picked.len() <= 3);
    }

    #[test]
    fn returns_none_when_catalog_is_exhausted() {
        let catalog = synthetic(1);
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        let seen: HashSet<String> = catalog.ids().map(str::to_string).collect();
        assert!(policy.next_card(&[], &seen, &mut StdRng::seed_from_u64(0)).is_none());
        assert_eq!(policy.decide(&[], &seen, 40, &mut StdRng::seed_from_u64(0)), NextCardDecision::Exhausted);
    }

    #[test]
    fn history_counts_as_seen() {
        let catalog = synthetic(1);
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        let history: Vec<ChoiceRecord> = catalog.ids().skip(1).enumerate().map(|(t, id)| ChoiceRecord::skip(id, t as u64)).collect();
        let item = policy.next_card(&history, &HashSet::new(), &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(item.id, "politics_0");
    }

    #[test]
    fn full_run_never_repeats_and_stops_at_budget() {
        let catalog = ContentCatalog::builtin().unwrap();
        let config = RecommendConfig::default();
        let policy = RecommendationPolicy::new(&catalog, &config);
        let mut rng = StdRng::seed_from_u64(2024);
        let mut seen = HashSet::new();
        let mut history = vec![];
        for step in 0..40u64 {
            let decision = policy.decide(&history, &seen, 40, &mut rng);
            let id = decision.content_id().expect("budget not reached").to_string();
            assert!(seen.insert(id.clone()), "repeated {}", id);
            history.push(if step % 3 == 0 { ChoiceRecord::like(id, step) } else { ChoiceRecord::skip(id, step) });
        }
        assert!(policy.decide(&history, &seen, 40, &mut rng).is_exhausted());
    }

    proptest! {
        #[test] fn prop_exploration_covers_groups(seed in any::<u64>(), per_group in 1usize..5) {
            let catalog = synthetic(per_group);
            let groups: HashSet<_> = run_exploration(&catalog, seed).into_iter().collect();
            prop_assert_eq!(groups.len(), GROUP_COUNT);
        }
        #[test] fn prop_small_catalog_exhausts_without_repeats(seed in any::<u64>(), per_group in 1usize..4) {
            let catalog = synthetic(per_group);
            let config = RecommendConfig::default();
            let policy = RecommendationPolicy::new(&catalog, &config);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut seen = HashSet::new();
            let mut history = vec![];
            let mut steps = 0usize;
            loop {
                let decision = policy.decide(&history, &seen, 40, &mut rng);
                let Some(id) = decision.content_id().map(str::to_string) else { break };
                prop_assert!(seen.insert(id.clone()));
                history.push(if rng.gen_bool(0.5) { ChoiceRecord::like(id, steps as u64) } else { ChoiceRecord::skip(id, steps as u64) });
                steps += 1;
            }
            prop_assert_eq!(steps, catalog.len().min(40));
        }
    }
}
