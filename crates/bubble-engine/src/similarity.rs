//! Pairwise similarity over preference vectors and the session-wide shared reality score.

use crate::catalog::ContentCatalog;
use crate::config::SimilarityConfig;
use crate::vectors::category_vector;
use bubble_schema::ParticipantProfile;

/// Jaccard index over liked slots (`> 0`). Two empty like-sets are identical.
pub fn jaccard(a: &[f64], b: &[f64]) -> f64 {
    let liked = |v: &[f64], i: usize| v.get(i).is_some_and(|x| *x > 0.0);
    let count_a = a.iter().filter(|x| **x > 0.0).count();
    let count_b = b.iter().filter(|x| **x > 0.0).count();
    let intersection = (0..a.len().min(b.len())).filter(|&i| liked(a, i) && liked(b, i)).count();
    let union = count_a + count_b - intersection;
    if union == 0 { return 1.0; }
    intersection as f64 / union as f64
}

/// Cosine similarity. A zero-magnitude side counts as identical (1.0), never NaN.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (mut dot, mut mag_a, mut mag_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) { dot += x * y; }
    for x in a { mag_a += x * x; }
    for y in b { mag_b += y * y; }
    if mag_a == 0.0 || mag_b == 0.0 { return 1.0; }
    if a == b { return 1.0; }
    (dot / (mag_a.sqrt() * mag_b.sqrt())).clamp(-1.0, 1.0)
}

/// 0–100 score of how alike the active participants' category preferences are.
///
/// The raw score is the mean pairwise cosine. It is blended toward 100 until the average
/// participant has made `onset_choices` choices, so an almost-empty session reads as shared.
pub fn shared_reality(participants: &[ParticipantProfile], catalog: &ContentCatalog, config: &SimilarityConfig) -> u8 {
    let active: Vec<&ParticipantProfile> = participants.iter().filter(|p| p.active).collect();
    if active.len() < 2 { return 100; }
    let avg_choices = active.iter().map(|p| p.history.len()).sum::<usize>() as f64 / active.len() as f64;
    let vectors: Vec<_> = active.iter().map(|p| category_vector(&p.history, catalog)).collect();
    let (mut total, mut pairs) = (0.0, 0usize);
    for i in 0..vectors.len() {
        for j in i + 1..vectors.len() { total += cosine(&vectors[i], &vectors[j]); pairs += 1; }
    }
    let raw = ((total / pairs as f64) * 100.0).round();
    let onset = if config.onset_choices > 0.0 { (avg_choices / config.onset_choices).min(1.0) } else { 1.0 };
    (100.0 - (100.0 - raw) * onset).round().clamp(0.0, 100.0) as u8
}
