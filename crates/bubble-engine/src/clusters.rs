//! Greedy grouping of participants by category-vector cosine similarity.
//!
//! Each unassigned participant seeds a cluster and pulls in every other unassigned participant
//! whose similarity *to the seed* reaches the threshold. Members are never compared with each
//! other, so two members of one cluster can be mutually dissimilar.

use crate::catalog::ContentCatalog;
use crate::config::{ClusterConfig, ClusterLabels};
use crate::similarity::cosine;
use crate::vectors::{category_vector, CategoryVector};
use bubble_schema::{CategoryGroup, ClusterInfo, ParticipantProfile, Position};
use std::collections::{BTreeMap, HashMap};

const FALLBACK_CENTROID: Position = Position::new(50.0, 50.0);

/// Seed-similarity grouping over vectors in the given order. Returns index groups, singletons included.
pub fn group_by_seed(vectors: &[CategoryVector], threshold: f64) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; vectors.len()];
    let mut groups = vec![];
    for seed in 0..vectors.len() {
        if assigned[seed] { continue; }
        assigned[seed] = true;
        let mut group = vec![seed];
        for other in 0..vectors.len() {
            if assigned[other] { continue; }
            if cosine(&vectors[seed], &vectors[other]) >= threshold { assigned[other] = true; group.push(other); }
        }
        groups.push(group);
    }
    groups
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterDetector<'a> {
    catalog: &'a ContentCatalog,
    config: &'a ClusterConfig,
    labels: &'a ClusterLabels,
}

impl<'a> ClusterDetector<'a> {
    pub fn new(catalog: &'a ContentCatalog, config: &'a ClusterConfig, labels: &'a ClusterLabels) -> Self { Self { catalog, config, labels } }

    /// Clusters of two or more active participants, in discovery order.
    pub fn detect_clusters(&self, participants: &[ParticipantProfile], positions: &BTreeMap<String, Position>, threshold: f64) -> Vec<ClusterInfo> {
        let active: Vec<&ParticipantProfile> = participants.iter().filter(|p| p.active).collect();
        let vectors: Vec<CategoryVector> = active.iter().map(|p| category_vector(&p.history, self.catalog)).collect();
        let mut clusters = vec![];
        for group in group_by_seed(&vectors, threshold) {
            if group.len() < 2 { continue; }
            let members: Vec<&ParticipantProfile> = group.iter().map(|&i| active[i]).collect();
            let dominant = self.dominant_subcategories(&members);
            clusters.push(ClusterInfo {
                id: format!("cluster_{}", clusters.len()),
                label: self.label(&dominant).to_string(),
                member_ids: members.iter().map(|p| p.id.clone()).collect(),
                centroid: centroid(&members, positions),
                dominant_subcategories: dominant,
            });
        }
        tracing::debug!(active = active.len(), clusters = clusters.len(), threshold, "clusters detected");
        clusters
    }

    /// [`ClusterDetector::detect_clusters`] at the configured threshold.
    pub fn detect(&self, participants: &[ParticipantProfile], positions: &BTreeMap<String, Position>) -> Vec<ClusterInfo> {
        self.detect_clusters(participants, positions, self.config.threshold)
    }

    /// Most-liked subcategories across all members, highest count first, ties by name.
    pub fn dominant_subcategories(&self, members: &[&ParticipantProfile]) -> Vec<String> {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for p in members {
            for choice in p.likes() {
                if let Some(item) = self.catalog.get(&choice.content_id) { *counts.entry(item.category.as_str()).or_default() += 1; }
            }
        }
        let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(self.config.max_dominant).map(|(s, _)| s.to_string()).collect()
    }

    /// Display name of the group owning the top subcategory; the fallback when nothing was liked.
    pub fn label(&self, dominant: &[String]) -> &'a str {
        self.labels.label_for(dominant.first().and_then(|s| CategoryGroup::from_category(s)))
    }
}

/// Mean of members' visualization positions (not their preference vectors).
pub fn centroid(members: &[&ParticipantProfile], positions: &BTreeMap<String, Position>) -> Position {
    let found: Vec<Position> = members.iter().filter_map(|p| positions.get(&p.id).copied()).collect();
    if found.is_empty() { return FALLBACK_CENTROID; }
    let n = found.len() as f64;
    Position::new(found.iter().map(|p| p.x).sum::<f64>() / n, found.iter().map(|p| p.y).sum::<f64>() / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bubble_schema::ChoiceRecord;

    fn catalog() -> ContentCatalog { ContentCatalog::builtin().unwrap() }

    fn liker(id: &str, ids: &[&str]) -> ParticipantProfile {
        ParticipantProfile::with_history(id, ids.iter().enumerate().map(|(t, c)| ChoiceRecord::like(*c, t as u64)).collect())
    }

    fn people() -> Vec<ParticipantProfile> {
        vec![
            liker("ana", &["tech_o_1", "tech_p_1"]),
            liker("ben", &["tech_o_2", "tech_o_3"]),
            liker("cy", &["tech_o_1", "fin_c_1"]),
            liker("dee", &["fin_c_2", "fin_t_1"]),
        ]
    }

    #[test]
    fn threshold_one_merges_only_identical_vectors() {
        let catalog = catalog();
        let (cfg, labels) = (ClusterConfig::default(), ClusterLabels::default());
        let detector = ClusterDetector::new(&catalog, &cfg, &labels);
        let clusters = detector.detect_clusters(&people(), &BTreeMap::new(), 1.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_ids, vec!["ana", "ben"]);
        assert_eq!(clusters[0].label, "The Tech Prophets");
        assert_eq!(clusters[0].id, "cluster_0");
    }

    #[test]
    fn threshold_zero_merges_everyone_active() {
        let catalog = catalog();
        let (cfg, labels) = (ClusterConfig::default(), ClusterLabels::default());
        let detector = ClusterDetector::new(&catalog, &cfg, &labels);
        let mut all = people();
        all.push(ParticipantProfile::new("idle"));
        let mut gone = liker("gone", &["ani_c_1"]);
        gone.active = false;
        all.push(gone);
        let clusters = detector.detect_clusters(&all, &BTreeMap::new(), 0.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_ids, vec!["ana", "ben", "cy", "dee", "idle"]);
    }

    #[test]
    fn singletons_are_dropped() {
        let catalog = catalog();
        let (cfg, labels) = (ClusterConfig::default(), ClusterLabels::default());
        let detector = ClusterDetector::new(&catalog, &cfg, &labels);
        let solo = vec![liker("a", &["tech_o_1"]), liker("b", &["ani_w_1"]), liker("c", &["spt_m_1"])];
        assert!(detector.detect_clusters(&solo, &BTreeMap::new(), 0.5).is_empty());
    }

    #[test]
    fn grouping_compares_with_seed_only() {
        let mut seed = [0.0; 8];
        seed[0] = 0.5; seed[1] = 0.5;
        let mut x = [0.0; 8];
        x[0] = 1.0;
        let mut y = [0.0; 8];
        y[1] = 1.0;
        // x and y are orthogonal yet both land with the seed
        assert_eq!(group_by_seed(&[seed, x, y], 0.7), vec![vec![0, 1, 2]]);
        assert_eq!(group_by_seed(&[x, seed, y], 0.7), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn label_and_dominant_subcategories() {
        let catalog = catalog();
        let (cfg, labels) = (ClusterConfig::default(), ClusterLabels::default());
        let detector = ClusterDetector::new(&catalog, &cfg, &labels);
        let a = liker("a", &["ani_c_1", "ani_c_2", "ani_w_1", "pol_l_1"]);
        let b = liker("b", &["ani_w_2", "fin_t_1", "spt_n_1"]);
        let dominant = detector.dominant_subcategories(&[&a, &b]);
        assert_eq!(dominant, vec!["animals_cute", "animals_wild", "finance_traditional"]);
        assert_eq!(detector.label(&dominant), "The Animal Lovers");
        let idle = [ParticipantProfile::new("i"), ParticipantProfile::new("j")];
        assert!(detector.dominant_subcategories(&[&idle[0], &idle[1]]).is_empty());
        assert_eq!(detector.label(&[]), "The Eclectics");
        let clusters = detector.detect_clusters(&idle, &BTreeMap::new(), 0.9);
        assert_eq!(clusters[0].label, "The Eclectics");
    }

    #[test]
    fn centroid_averages_positions() {
        let (a, b, c) = (ParticipantProfile::new("a"), ParticipantProfile::new("b"), ParticipantProfile::new("c"));
        let mut positions = BTreeMap::new();
        positions.insert("a".to_string(), Position::new(10.0, 20.0));
        positions.insert("b".to_string(), Position::new(30.0, 60.0));
        assert_eq!(centroid(&[&a, &b, &c], &positions), Position::new(20.0, 40.0));
        assert_eq!(centroid(&[&c], &positions), FALLBACK_CENTROID);
    }
}
