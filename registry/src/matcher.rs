use crate::store::SpeakerEntry;

/// Finds the best-scoring speaker for `query` across every stored
/// embedding.
///
/// Returns `(entry_index, best_score)`. The score starts at the `-1.0`
/// sentinel, so an empty table yields `(None, -1.0)`. Ties keep the
/// first hit: iteration follows registration order, so the
/// earliest-registered speaker wins.
pub(crate) fn best_match(entries: &[SpeakerEntry], query: &[f32]) -> (Option<usize>, f32) {
    let mut best_score: f32 = -1.0;
    let mut best_idx: Option<usize> = None;
    for (i, entry) in entries.iter().enumerate() {
        for emb in &entry.embeddings {
            let score = cosine_sim(query, emb);
            if score > best_score {
                best_score = score;
                best_idx = Some(i);
            }
        }
    }
    (best_idx, best_score)
}

/// Cosine similarity between two vectors.
/// Uses f64 intermediate precision.
///
/// Vectors of different lengths compare over the shared prefix, norms
/// included, so a vector scores 1.0 against any extension of itself.
/// Mixed-dimension tables happen when the extractor changes between
/// runs; truncation keeps old enrollments comparable. Zero-norm input
/// scores 0.0.
pub(crate) fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut dot: f64 = 0.0;
    let mut na: f64 = 0.0;
    let mut nb: f64 = 0.0;
    for i in 0..n {
        let ai = a[i] as f64;
        let bi = b[i] as f64;
        dot += ai * bi;
        na += ai * ai;
        nb += bi * bi;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom) as f32
}
