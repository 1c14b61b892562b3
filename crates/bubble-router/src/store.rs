use bubble_engine::{Engine, Phase};
use bubble_schema::{ChoiceRecord, NextCardDecision, ParticipantProfile, SessionAggregate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::{broadcast, RwLock};

const BROADCAST_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceError { UnknownContent, NotServed, Duplicate }
impl ChoiceError {
    pub fn as_str(self) -> &'static str {
        match self { ChoiceError::UnknownContent => "unknown_content", ChoiceError::NotServed => "not_served", ChoiceError::Duplicate => "duplicate_choice" }
    }
}

struct Slot { profile: ParticipantProfile, seen: HashSet<String> }

struct SessionState {
    participants: BTreeMap<String, Slot>,
    latest: Option<SessionAggregate>,
    tx: broadcast::Sender<String>,
}
impl Default for SessionState {
    fn default() -> Self { let (tx, _) = broadcast::channel(BROADCAST_CAPACITY); Self { participants: BTreeMap::new(), latest: None, tx } }
}
impl SessionState {
    fn slot(&mut self, pid: &str) -> &mut Slot {
        self.participants.entry(pid.to_string()).or_insert_with(|| Slot { profile: ParticipantProfile::new(pid), seen: HashSet::new() })
    }
}

/// Histories and seen sets per session. Sessions and participants appear on first reference;
/// sessions nobody joined or watches are dropped by [`SessionStore::prune`].
#[derive(Default)]
pub struct SessionStore { inner: RwLock<HashMap<String, SessionState>> }

impl SessionStore {
    /// Serves the next card and marks it seen. The phase is the one the card was picked in.
    pub async fn next_card(&self, engine: &Engine, sid: &str, pid: &str) -> (NextCardDecision, Phase) {
        let mut map = self.inner.write().await;
        let slot = map.entry(sid.to_string()).or_default().slot(pid);
        let phase = engine.policy().phase(slot.profile.history.len());
        let decision = engine.next_card(&slot.profile.history, &slot.seen, &mut StdRng::from_entropy());
        if let Some(id) = decision.content_id() { slot.seen.insert(id.to_string()); }
        (decision, phase)
    }

    /// Appends a choice for a card that was served and not yet answered. Returns the new history length.
    pub async fn record_choice(&self, engine: &Engine, sid: &str, pid: &str, choice: ChoiceRecord) -> Result<usize, ChoiceError> {
        if engine.catalog().get(&choice.content_id).is_none() { return Err(ChoiceError::UnknownContent); }
        let mut map = self.inner.write().await;
        let slot = map.entry(sid.to_string()).or_default().slot(pid);
        if !slot.seen.contains(&choice.content_id) { return Err(ChoiceError::NotServed); }
        if slot.profile.history.iter().any(|c| c.content_id == choice.content_id) { return Err(ChoiceError::Duplicate); }
        slot.profile.record(choice);
        Ok(slot.profile.history.len())
    }

    pub async fn history_len(&self, sid: &str, pid: &str) -> usize {
        let map = self.inner.read().await;
        map.get(sid).and_then(|s| s.participants.get(pid)).map(|p| p.profile.history.len()).unwrap_or(0)
    }

    pub async fn profile(&self, sid: &str, pid: &str) -> Option<ParticipantProfile> {
        let map = self.inner.read().await;
        map.get(sid).and_then(|s| s.participants.get(pid)).map(|p| p.profile.clone())
    }

    /// Participants ordered by id.
    pub async fn snapshot(&self, sid: &str) -> Option<Vec<ParticipantProfile>> {
        let map = self.inner.read().await;
        map.get(sid).map(|s| s.participants.values().map(|p| p.profile.clone()).collect())
    }

    pub async fn session_ids(&self) -> Vec<String> { self.inner.read().await.keys().cloned().collect() }

    /// Fresh aggregate for `sid` with its checksum set. Nothing is stored or broadcast.
    pub async fn aggregate<R: Rng + ?Sized>(&self, engine: &Engine, sid: &str, rng: &mut R) -> Option<SessionAggregate> {
        let participants = self.snapshot(sid).await?;
        let mut agg = engine.aggregate(&participants, rng);
        match agg.compute_checksum() {
            Ok(c) => agg.checksum = Some(c),
            Err(e) => tracing::warn!(session_id=%sid, error=%e, "checksum failed"),
        }
        Some(agg)
    }

    pub async fn latest(&self, sid: &str) -> Option<SessionAggregate> {
        self.inner.read().await.get(sid).and_then(|s| s.latest.clone())
    }

    /// Stores and broadcasts `agg` unless its checksum matches the last published one.
    pub async fn publish(&self, sid: &str, agg: SessionAggregate) -> bool {
        let mut map = self.inner.write().await;
        let Some(state) = map.get_mut(sid) else { return false };
        if agg.checksum.is_some() && state.latest.as_ref().and_then(|l| l.checksum.as_ref()) == agg.checksum.as_ref() { return false; }
        if let Ok(json) = serde_json::to_string(&agg) { let _ = state.tx.send(json); }
        state.latest = Some(agg);
        true
    }

    pub async fn subscribe(&self, sid: &str) -> broadcast::Receiver<String> {
        self.inner.write().await.entry(sid.to_string()).or_default().tx.subscribe()
    }

    /// Drops sessions with no participants and no live subscribers. Returns how many went.
    pub async fn prune(&self) -> usize {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, s| !s.participants.is_empty() || s.tx.receiver_count() > 0);
        before - map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serve_then_record() {
        let engine = Engine::with_defaults().unwrap();
        let store = SessionStore::default();
        let (decision, phase) = store.next_card(&engine, "S1", "p1").await;
        assert_eq!(phase, Phase::Exploration);
        let id = decision.content_id().unwrap().to_string();
        assert_eq!(store.record_choice(&engine, "S1", "p1", ChoiceRecord::like(id.clone(), 1)).await, Ok(1));
        assert_eq!(store.record_choice(&engine, "S1", "p1", ChoiceRecord::like(id, 2)).await, Err(ChoiceError::Duplicate));
        assert_eq!(store.record_choice(&engine, "S1", "p1", ChoiceRecord::like("nope", 3)).await, Err(ChoiceError::UnknownContent));
        let unserved = engine.catalog().ids().find(|c| *c != decision.content_id().unwrap()).unwrap().to_string();
        assert_eq!(store.record_choice(&engine, "S1", "p1", ChoiceRecord::skip(unserved, 4)).await, Err(ChoiceError::NotServed));
        assert_eq!(store.history_len("S1", "p1").await, 1);
        assert_eq!(store.snapshot("S1").await.unwrap().len(), 1);
        assert!(store.snapshot("S2").await.is_none());
    }

    #[tokio::test]
    async fn publish_skips_unchanged_aggregates() {
        let store = SessionStore::default();
        let mut rx = store.subscribe("S").await;
        let agg = SessionAggregate::default().with_computed_checksum().unwrap();
        assert!(store.publish("S", agg.clone()).await);
        assert!(!store.publish("S", agg.clone()).await);
        assert!(!store.publish("missing", agg.clone()).await);
        let got: SessionAggregate = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(got, agg);
        assert_eq!(store.latest("S").await, Some(agg));
    }

    #[tokio::test]
    async fn prune_drops_abandoned_sessions() {
        let engine = Engine::with_defaults().unwrap();
        let store = SessionStore::default();
        let watcher = store.subscribe("watched").await;
        drop(store.subscribe("ghost").await);
        store.next_card(&engine, "live", "p1").await;
        assert_eq!(store.prune().await, 1);
        let mut ids = store.session_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["live", "watched"]);
        drop(watcher);
        assert_eq!(store.prune().await, 1);
        assert_eq!(store.session_ids().await, vec!["live"]);
    }

    #[tokio::test]
    async fn on_demand_aggregate_is_not_published() {
        let engine = Engine::with_defaults().unwrap();
        let store = SessionStore::default();
        let mut rx = store.subscribe("S").await;
        let (decision, _) = store.next_card(&engine, "S", "p1").await;
        store.record_choice(&engine, "S", "p1", ChoiceRecord::like(decision.content_id().unwrap(), 1)).await.unwrap();
        let agg = store.aggregate(&engine, "S", &mut StdRng::seed_from_u64(3)).await.unwrap();
        assert!(agg.verify_checksum());
        assert_eq!(agg.total_choices, 1);
        assert_eq!(store.latest("S").await, None);
        assert!(rx.try_recv().is_err());
        assert!(store.aggregate(&engine, "nobody", &mut StdRng::seed_from_u64(3)).await.is_none());
        assert_eq!(store.profile("S", "p1").await.map(|p| p.history.len()), Some(1));
        assert_eq!(store.profile("S", "p2").await, None);
    }
}
