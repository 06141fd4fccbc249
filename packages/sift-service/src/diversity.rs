//! Top-k selection with a bounded share of near-miss "surprise" picks.

use rand::{Rng, seq::index};
use serde::Serialize;

use sift_config::{Selection, SelectionMode};
use sift_storage::models::Document;

use crate::rank::RankedCandidate;

/// Surprises are drawn from ranks below this multiple of the target size.
const SURPRISE_BAND_FACTOR: usize = 3;
/// How far a surprise may land from the slot its rank maps to.
const SURPRISE_JITTER: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
	Top,
	Surprise,
}
impl SelectionOrigin {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Top => "top",
			Self::Surprise => "surprise",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectedDocument {
	pub document: Document,
	pub score: f32,
	/// Position in the ranked order the pick came from.
	pub rank: usize,
	pub origin: SelectionOrigin,
	/// Metadata title, or the file stem when the document has none.
	pub title: String,
	pub author: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SelectionResult {
	pub target_count: usize,
	pub top_count: usize,
	pub surprise_count: usize,
	pub items: Vec<SelectedDocument>,
}
impl SelectionResult {
	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn documents(&self) -> impl Iterator<Item = &Document> {
		self.items.iter().map(|item| &item.document)
	}
}

/// Selects `target_count` documents from `ranked`.
///
/// The best `top_count` ranks are always kept and rank 0 always comes first. Up to
/// `floor(target_count * surprise_fraction)` picks are drawn uniformly without replacement from
/// ranks `[top_count, min(3 * target_count, len))`. Each surprise is placed within one slot of
/// the position its rank scales to in the selection, never ahead of rank 0.
pub fn select<R>(
	ranked: &[RankedCandidate],
	target_count: usize,
	surprise_fraction: f64,
	rng: &mut R,
) -> SelectionResult
where
	R: Rng + ?Sized,
{
	if target_count == 0 || ranked.is_empty() {
		return SelectionResult { target_count, ..Default::default() };
	}
	if target_count > ranked.len() {
		let items = ranked.iter().map(|candidate| pick(candidate, SelectionOrigin::Top)).collect();

		return SelectionResult {
			target_count,
			top_count: ranked.len(),
			surprise_count: 0,
			items,
		};
	}

	let fraction =
		if surprise_fraction.is_finite() { surprise_fraction.clamp(0.0, 1.0) } else { 0.0 };
	let mut surprise_quota = (target_count as f64 * fraction).floor() as usize;
	let mut top_count = target_count - surprise_quota.min(target_count);

	if top_count == 0 {
		top_count = 1;
		surprise_quota = target_count - 1;
	}

	let mut items: Vec<SelectedDocument> =
		ranked[..top_count].iter().map(|candidate| pick(candidate, SelectionOrigin::Top)).collect();
	let band_end = (SURPRISE_BAND_FACTOR * target_count).min(ranked.len());
	let band = &ranked[top_count..band_end.max(top_count)];
	let draw = surprise_quota.min(band.len());

	if draw == 0 {
		return SelectionResult { target_count, top_count, surprise_count: 0, items };
	}

	let mut drawn = index::sample(rng, band.len(), draw).into_vec();

	drawn.sort_unstable();

	for offset in drawn {
		let slot = surprise_slot(top_count + offset, target_count, band_end, items.len(), rng);

		items.insert(slot, pick(&band[offset], SelectionOrigin::Surprise));
	}

	SelectionResult { target_count, top_count, surprise_count: draw, items }
}

/// Derives the requested selection size for a pool of `pool_size` ranked candidates.
pub fn target_count(selection: &Selection, pool_size: usize) -> usize {
	let requested = match selection.mode {
		SelectionMode::TopK => selection.top_k.unwrap_or(0) as usize,
		SelectionMode::Percent => {
			let derived = (selection.percent / 100.0 * pool_size as f64).round().max(0.0) as usize;

			derived.max(selection.min_count as usize)
		},
	};

	requested.min(pool_size)
}

/// Maps a band position onto `[1, len]` in proportion to its rank and jitters it locally.
fn surprise_slot<R>(
	position: usize,
	target_count: usize,
	band_end: usize,
	len: usize,
	rng: &mut R,
) -> usize
where
	R: Rng + ?Sized,
{
	let anchor = (position * target_count / band_end.max(1)).clamp(1, len);
	let lo = anchor.saturating_sub(SURPRISE_JITTER).max(1);
	let hi = (anchor + SURPRISE_JITTER).min(len);

	rng.gen_range(lo..=hi)
}

fn pick(candidate: &RankedCandidate, origin: SelectionOrigin) -> SelectedDocument {
	SelectedDocument {
		document: candidate.document.clone(),
		score: candidate.score,
		rank: candidate.rank,
		origin,
		title: candidate.document.title(),
		author: None,
	}
}
