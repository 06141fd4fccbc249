use std::cmp::Ordering;

use serde::Serialize;

use sift_storage::models::Document;

use crate::{Error, Result};

/// Scores closer than this are treated as tied and ordered by document id.
const SCORE_RESOLUTION: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedCandidate {
	pub document: Document,
	/// Cosine similarity rounded to the tie resolution.
	pub score: f32,
	pub rank: usize,
}

/// Cosine similarity of two vectors of the same dimension.
///
/// A zero-magnitude vector has similarity 0 with everything.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Result<f32> {
	if lhs.len() != rhs.len() {
		return Err(Error::DimensionMismatch { expected: lhs.len(), actual: rhs.len() });
	}

	let mut dot = 0.0_f64;
	let mut lhs_norm = 0.0_f64;
	let mut rhs_norm = 0.0_f64;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		let (l, r) = (f64::from(*l), f64::from(*r));

		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f64::EPSILON || rhs_norm <= f64::EPSILON {
		return Ok(0.0);
	}

	let score = dot / (lhs_norm.sqrt() * rhs_norm.sqrt());

	if !score.is_finite() {
		return Ok(0.0);
	}

	Ok(score.clamp(-1.0, 1.0) as f32)
}

/// Orders candidates by descending similarity to `query`, ties broken by document id.
pub fn rank<V>(query: &[f32], candidates: Vec<(Document, V)>) -> Result<Vec<RankedCandidate>>
where
	V: AsRef<[f32]>,
{
	let mut scored = Vec::with_capacity(candidates.len());

	for (document, vector) in candidates {
		let score = cosine_similarity(query, vector.as_ref())?;
		let bucket = (f64::from(score) / SCORE_RESOLUTION).round() as i64;

		scored.push((bucket, document));
	}

	scored.sort_by(|(lhs_bucket, lhs_doc), (rhs_bucket, rhs_doc)| {
		match rhs_bucket.cmp(lhs_bucket) {
			Ordering::Equal => lhs_doc.id.cmp(&rhs_doc.id),
			other => other,
		}
	});

	Ok(scored
		.into_iter()
		.enumerate()
		.map(|(rank, (bucket, document))| RankedCandidate {
			document,
			score: (bucket as f64 * SCORE_RESOLUTION) as f32,
			rank,
		})
		.collect())
}
