use rand::{Rng, SeedableRng, seq::index};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_storage::models::Document;

use crate::{
	DocumentFailure, Error, Result, SiftService,
	aggregate::aggregate,
	cache::{CacheStats, VectorCache},
	diversity::{SelectionResult, select, target_count},
	rank::rank,
	reconcile::{LabelReport, Partition, partition},
};

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
	/// Rank and select without writing any label.
	pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceCounts {
	pub listed: usize,
	pub embedded: usize,
	pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CandidateCounts {
	/// Documents with neither label (or any label but the reference one when recommended
	/// documents are not excluded).
	pub eligible: usize,
	/// Documents skipped because they already carry the recommendation label.
	pub excluded: usize,
	/// Candidates left after subsampling.
	pub considered: usize,
	pub embedded: usize,
	pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
	pub run_id: Uuid,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub finished_at: OffsetDateTime,
	pub dry_run: bool,
	pub documents: usize,
	pub references: ReferenceCounts,
	pub candidates: CandidateCounts,
	pub cache: CacheStats,
	pub selection: SelectionResult,
	/// `None` for dry runs.
	pub labels: Option<LabelReport>,
	/// Extraction, embedding and label-read failures. Label-write failures are in `labels`.
	pub failures: Vec<DocumentFailure>,
}

impl SiftService {
	/// Runs the pipeline with a generator seeded from `selection.seed`, or from entropy when no
	/// seed is configured.
	pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
		let mut rng = match self.cfg.selection.seed {
			Some(seed) => ChaCha8Rng::seed_from_u64(seed),
			None => ChaCha8Rng::from_entropy(),
		};

		self.run_with_rng(options, &mut rng).await
	}

	pub async fn run_with_rng<R>(&self, options: RunOptions, rng: &mut R) -> Result<RunReport>
	where
		R: Rng + ?Sized,
	{
		let run_id = Uuid::new_v4();
		let started_at = OffsetDateTime::now_utc();
		let selection_cfg = &self.cfg.selection;
		let embedding_cfg = &self.cfg.providers.embedding;

		tracing::info!(%run_id, dry_run = options.dry_run, "Run started.");

		sift_config::validate_selection(selection_cfg)?;

		let documents = self.documents.list_documents()?;
		let document_count = documents.len();

		self.labels.refresh()?;

		let Partition { references, candidates, excluded, mut failures } = partition(
			self.labels.as_ref(),
			&self.cfg.labels,
			selection_cfg.exclude_recommended,
			documents,
		);

		if references.is_empty() {
			tracing::error!(%run_id, label = %self.cfg.labels.reference, "No reference documents.");

			return Err(Error::EmptyReferenceSet);
		}

		let eligible = candidates.len();
		let candidates = match selection_cfg.subsample {
			Some(limit) => subsample(candidates, limit as usize, rng),
			None => candidates,
		};

		tracing::info!(
			%run_id,
			documents = document_count,
			references = references.len(),
			eligible,
			considered = candidates.len(),
			excluded = excluded.len(),
			"Library partitioned."
		);

		let mut cache = VectorCache::load(self.vectors.clone(), embedding_cfg)?;
		let page_limit = self.cfg.library.page_limit;
		let embedded_refs =
			cache.embed_documents(&self.providers, embedding_cfg, page_limit, &references).await?;
		let embedded_candidates =
			cache.embed_documents(&self.providers, embedding_cfg, page_limit, &candidates).await?;

		cache.checkpoint()?;

		let reference_counts = ReferenceCounts {
			listed: references.len(),
			embedded: embedded_refs.embedded.len(),
			failed: embedded_refs.failures.len(),
		};
		let candidate_counts = CandidateCounts {
			eligible,
			excluded: excluded.len(),
			considered: candidates.len(),
			embedded: embedded_candidates.embedded.len(),
			failed: embedded_candidates.failures.len(),
		};

		failures.extend(embedded_refs.failures);
		failures.extend(embedded_candidates.failures);

		let reference_vectors: Vec<&[f32]> =
			embedded_refs.embedded.iter().map(|entry| entry.vector.as_slice()).collect();
		let query = aggregate(&reference_vectors)?;
		let ranked = rank(
			&query,
			embedded_candidates
				.embedded
				.iter()
				.map(|entry| (entry.document.clone(), entry.vector.as_slice()))
				.collect(),
		)?;
		let target = target_count(selection_cfg, ranked.len());
		let mut selection = select(&ranked, target, selection_cfg.surprise_fraction, rng);

		self.describe(&mut selection).await?;

		tracing::info!(
			%run_id,
			mode = selection_cfg.mode.as_str(),
			ranked = ranked.len(),
			target_count = target,
			selected = selection.len(),
			surprises = selection.surprise_count,
			"Selection complete."
		);

		let labels = if options.dry_run {
			None
		} else {
			Some(self.reconciler(&self.cfg.labels.recommendation).apply(&selection))
		};
		let finished_at = OffsetDateTime::now_utc();

		tracing::info!(%run_id, failures = failures.len(), "Run finished.");

		Ok(RunReport {
			run_id,
			started_at,
			finished_at,
			dry_run: options.dry_run,
			documents: document_count,
			references: reference_counts,
			candidates: candidate_counts,
			cache: cache.stats(),
			selection,
			labels,
			failures,
		})
	}

	/// Replaces file-stem titles with the document's own metadata where it has any.
	async fn describe(&self, selection: &mut SelectionResult) -> Result<()> {
		let mut lookups = Vec::with_capacity(selection.len());

		for item in &selection.items {
			let extractor = self.providers.extractor.clone();
			let document = item.document.clone();

			lookups.push(tokio::task::spawn_blocking(move || extractor.metadata(&document)));
		}

		for (item, lookup) in selection.items.iter_mut().zip(lookups) {
			let metadata = lookup.await.map_err(|err| Error::Provider {
				message: format!("Metadata task failed: {err}."),
			})?;

			match metadata {
				Ok(metadata) => {
					if let Some(title) = metadata.title {
						item.title = title;
					}

					item.author = metadata.author;
				},
				Err(err) => {
					tracing::debug!(
						document = %item.document.id,
						error = %err,
						"Document metadata unavailable."
					);
				},
			}
		}

		Ok(())
	}
}

/// Keeps a uniform random subset of `limit` candidates, preserving their order.
fn subsample<R>(candidates: Vec<Document>, limit: usize, rng: &mut R) -> Vec<Document>
where
	R: Rng + ?Sized,
{
	if candidates.len() <= limit {
		return candidates;
	}

	let mut keep = index::sample(rng, candidates.len(), limit).into_vec();

	keep.sort_unstable();

	let mut keep = keep.into_iter().peekable();

	candidates
		.into_iter()
		.enumerate()
		.filter_map(|(position, document)| {
			if keep.peek() == Some(&position) {
				keep.next();

				Some(document)
			} else {
				None
			}
		})
		.collect()
}
