//! Session-wide summary statistics.

use crate::catalog::ContentCatalog;
use crate::similarity::jaccard;
use crate::vectors::content_vector;
use bubble_schema::ParticipantProfile;

pub fn total_choices(participants: &[ParticipantProfile]) -> usize {
    participants.iter().map(|p| p.history.len()).sum()
}

/// Mean progress through `total_cards` over active participants, as a rounded percentage.
pub fn average_progress(participants: &[ParticipantProfile], total_cards: usize) -> u32 {
    let active: Vec<&ParticipantProfile> = participants.iter().filter(|p| p.active).collect();
    if active.is_empty() || total_cards == 0 { return 0; }
    let sum: f64 = active.iter().map(|p| p.history.len() as f64 / total_cards as f64 * 100.0).sum();
    (sum / active.len() as f64).round() as u32
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extremes {
    pub most_unique: Option<String>,
    pub most_mainstream: Option<String>,
}

/// Lowest and highest average content-level Jaccard similarity to everyone else.
/// Ties keep the participant encountered first. Both are `None` below two active participants.
pub fn extremes(participants: &[ParticipantProfile], catalog: &ContentCatalog) -> Extremes {
    let active: Vec<&ParticipantProfile> = participants.iter().filter(|p| p.active).collect();
    if active.len() < 2 { return Extremes::default(); }
    let vectors: Vec<Vec<f64>> = active.iter().map(|p| content_vector(&p.history, catalog)).collect();
    let mut unique: Option<(usize, f64)> = None;
    let mut mainstream: Option<(usize, f64)> = None;
    for i in 0..vectors.len() {
        let total: f64 = (0..vectors.len()).filter(|&j| j != i).map(|j| jaccard(&vectors[i], &vectors[j])).sum();
        let avg = total / (vectors.len() - 1) as f64;
        if unique.map_or(true, |(_, best)| avg < best) { unique = Some((i, avg)); }
        if mainstream.map_or(true, |(_, best)| avg > best) { mainstream = Some((i, avg)); }
    }
    Extremes {
        most_unique: unique.map(|(i, _)| active[i].id.clone()),
        most_mainstream: mainstream.map(|(i, _)| active[i].id.clone()),
    }
}

pub fn most_unique(participants: &[ParticipantProfile], catalog: &ContentCatalog) -> Option<String> { extremes(participants, catalog).most_unique }
pub fn most_mainstream(participants: &[ParticipantProfile], catalog: &ContentCatalog) -> Option<String> { extremes(participants, catalog).most_mainstream }
