//! Recommendation and divergence engine for the filter-bubble classroom demo.
//!
//! The engine is stateless between calls: it is handed the catalog and configuration once,
//! then every operation is a function of the snapshot it receives.

pub mod aggregate;
pub mod catalog;
pub mod clusters;
pub mod config;
pub mod insights;
pub mod position;
pub mod recommend;
pub mod similarity;
pub mod simulate;
pub mod vectors;

pub use catalog::{CatalogError, ContentCatalog};
pub use clusters::ClusterDetector;
pub use config::{AnchorTable, ClusterLabels, ConfigError, EngineConfig, InsightConfig};
pub use insights::GroupProfile;
pub use position::PositionMapper;
pub use recommend::{Phase, RecommendationPolicy};
pub use simulate::SimulatedParticipant;
pub use vectors::{CategoryVector, PreferenceVectors};

use bubble_schema::{ChoiceRecord, NextCardDecision, ParticipantProfile, ParticipantSummary, Position, RevealInsights, SessionAggregate};
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct Engine {
    catalog: ContentCatalog,
    config: EngineConfig,
}

impl Engine {
    pub fn new(catalog: ContentCatalog, config: EngineConfig) -> Self { Self { catalog, config } }

    /// Built-in catalog with default configuration.
    pub fn with_defaults() -> Result<Self, CatalogError> { Ok(Self::new(ContentCatalog::builtin()?, EngineConfig::default())) }

    pub fn catalog(&self) -> &ContentCatalog { &self.catalog }
    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn policy(&self) -> RecommendationPolicy<'_> { RecommendationPolicy::new(&self.catalog, &self.config.recommend) }
    pub fn position_mapper(&self) -> PositionMapper<'_> { PositionMapper::new(&self.catalog, &self.config.position, &self.config.anchors) }
    pub fn cluster_detector(&self) -> ClusterDetector<'_> { ClusterDetector::new(&self.catalog, &self.config.clusters, &self.config.labels) }

    pub fn vectors(&self, history: &[ChoiceRecord]) -> PreferenceVectors { PreferenceVectors::build(history, &self.catalog) }

    /// Next card within the configured per-participant budget.
    pub fn next_card<R: Rng + ?Sized>(&self, history: &[ChoiceRecord], seen: &HashSet<String>, rng: &mut R) -> NextCardDecision {
        self.policy().decide(history, seen, self.config.session.cards_per_participant, rng)
    }

    pub fn positions<R: Rng + ?Sized>(&self, participants: &[ParticipantProfile], rng: &mut R) -> BTreeMap<String, Position> {
        let mapper = self.position_mapper();
        participants.iter().map(|p| (p.id.clone(), mapper.map_position(p, rng))).collect()
    }

    pub fn shared_reality(&self, participants: &[ParticipantProfile]) -> u8 {
        similarity::shared_reality(participants, &self.catalog, &self.config.similarity)
    }

    /// Full snapshot for one tick. Participants are processed in slice order, which fixes
    /// cluster discovery order and tie-breaking.
    pub fn aggregate<R: Rng + ?Sized>(&self, participants: &[ParticipantProfile], rng: &mut R) -> SessionAggregate {
        let span = tracing::debug_span!("aggregate", participants = participants.len());
        let _e = span.enter();
        let positions = self.positions(participants, rng);
        let clusters = self.cluster_detector().detect(participants, &positions);
        let extremes = aggregate::extremes(participants, &self.catalog);
        let agg = SessionAggregate {
            shared_reality_pct: self.shared_reality(participants),
            clusters,
            most_unique_id: extremes.most_unique,
            most_mainstream_id: extremes.most_mainstream,
            total_choices: aggregate::total_choices(participants),
            average_progress_pct: aggregate::average_progress(participants, self.config.session.cards_per_participant),
            positions,
            checksum: None,
        };
        tracing::debug!(shared_reality = agg.shared_reality_pct, clusters = agg.clusters.len(), total_choices = agg.total_choices, "aggregate computed");
        agg
    }

    /// Completion-screen summary for one participant.
    pub fn summary(&self, participant: &ParticipantProfile) -> ParticipantSummary { insights::summary(participant, &self.catalog, &self.config.insights) }

    /// End-of-session insights over every participant in the snapshot.
    pub fn reveal(&self, participants: &[ParticipantProfile]) -> RevealInsights {
        let span = tracing::debug_span!("reveal", participants = participants.len());
        let _e = span.enter();
        insights::reveal(participants, &self.catalog, &self.config.insights)
    }
}
