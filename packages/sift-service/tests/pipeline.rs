use std::{path::Path, sync::Arc};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use sift_config::{Config, SelectionMode};
use sift_service::{
	Error, FailureStage, Providers, RunOptions, SelectionOrigin, SiftService, VectorCache,
};
use sift_storage::vectors::{CachedVector, MemoryVectorStorage};
use sift_testkit::{
	FakeEmbedder, FakeExtractor, MemoryDocuments, MemoryLabelStore, RECOMMENDATION_LABEL,
	REFERENCE_LABEL,
};

struct Fixture {
	labels: Arc<MemoryLabelStore>,
	embedder: Arc<FakeEmbedder>,
	extractor: Arc<FakeExtractor>,
	vectors: Arc<MemoryVectorStorage>,
	service: SiftService,
}

fn fixture(
	cfg: Config,
	ids: &[&str],
	labels: MemoryLabelStore,
	embedder: FakeEmbedder,
	extractor: FakeExtractor,
) -> Fixture {
	let labels = Arc::new(labels);
	let embedder = Arc::new(embedder);
	let extractor = Arc::new(extractor);
	let vectors = Arc::new(MemoryVectorStorage::new());
	let service = SiftService::with_parts(
		cfg,
		Arc::new(MemoryDocuments::new(ids)),
		labels.clone(),
		vectors.clone(),
		Providers::new(embedder.clone(), extractor.clone()),
	);

	Fixture { labels, embedder, extractor, vectors, service }
}

fn toy_embedder() -> FakeEmbedder {
	FakeEmbedder::new(2)
		.with_vector("ref-a", vec![1.0, 0.0])
		.with_vector("ref-b", vec![0.0, 1.0])
		.with_vector("ref-c", vec![1.0, 1.0])
		.with_vector("cand-parallel", vec![2.0, 2.0])
		.with_vector("cand-close", vec![1.0, 0.8])
		.with_vector("cand-side", vec![1.0, 0.1])
		.with_vector("cand-away", vec![-1.0, 0.2])
}

fn toy_labels() -> MemoryLabelStore {
	MemoryLabelStore::new()
		.with_label("ref-a", REFERENCE_LABEL)
		.with_label("ref-b", REFERENCE_LABEL)
		.with_label("ref-c", REFERENCE_LABEL)
}

const TOY_IDS: [&str; 7] =
	["ref-a", "ref-b", "ref-c", "cand-parallel", "cand-close", "cand-side", "cand-away"];

fn toy_config(top_k: u32) -> Config {
	let mut cfg = sift_testkit::config(Path::new("/library"));

	cfg.selection.top_k = Some(top_k);

	cfg
}

#[tokio::test]
async fn parallel_candidate_is_recommended_first() {
	let fx = fixture(toy_config(1), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions::default()).await.expect("run failed");

	assert_eq!(report.documents, 7);
	assert_eq!(report.references.listed, 3);
	assert_eq!(report.references.embedded, 3);
	assert_eq!(report.candidates.considered, 4);
	assert_eq!(report.selection.len(), 1);

	let best = &report.selection.items[0];

	assert_eq!(best.document.id.as_str(), "cand-parallel");
	assert_eq!(best.score, 1.0);
	assert_eq!(best.origin, SelectionOrigin::Top);

	let labels = report.labels.expect("Expected a label report.");

	assert_eq!((labels.applied, labels.already_labeled, labels.failed), (1, 0, 0));
	assert!(fx.labels.labels_of("cand-parallel").contains(RECOMMENDATION_LABEL));
	assert!(!fx.labels.labels_of("cand-close").contains(RECOMMENDATION_LABEL));
	assert_eq!(fx.labels.refreshes(), 1);
}

#[tokio::test]
async fn ranking_follows_similarity_to_the_mean() {
	let fx = fixture(toy_config(4), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");
	let ids: Vec<_> = report.selection.documents().map(|doc| doc.id.as_str()).collect();

	assert_eq!(ids, vec!["cand-parallel", "cand-close", "cand-side", "cand-away"]);
}

#[tokio::test]
async fn missing_references_abort_before_embedding() {
	let fx = fixture(
		toy_config(2),
		&TOY_IDS,
		MemoryLabelStore::new(),
		toy_embedder(),
		FakeExtractor::new(),
	);
	let err = fx.service.run(RunOptions::default()).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::EmptyReferenceSet));
	assert_eq!(fx.embedder.calls(), 0);
	assert_eq!(fx.extractor.calls(), 0);
}

#[tokio::test]
async fn unextractable_references_are_an_empty_reference_set() {
	let extractor = FakeExtractor::new().failing("ref-a").failing("ref-b").failing("ref-c");
	let fx = fixture(toy_config(2), &TOY_IDS, toy_labels(), toy_embedder(), extractor);
	let err = fx.service.run(RunOptions::default()).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::EmptyReferenceSet));
	assert_eq!(fx.labels.writes(), 0);
}

#[tokio::test]
async fn per_document_failures_are_reported_and_skipped() {
	let extractor = FakeExtractor::new().failing("cand-side");
	let embedder = toy_embedder().failing("cand-away");
	let mut cfg = toy_config(2);

	cfg.providers.embedding.batch_size = 1;

	let fx = fixture(cfg, &TOY_IDS, toy_labels(), embedder, extractor);
	let report = fx.service.run(RunOptions::default()).await.expect("run failed");
	let stages: Vec<_> = report.failures.iter().map(|f| (f.document.as_str(), f.stage)).collect();

	assert!(stages.contains(&("cand-side", FailureStage::Extraction)));
	assert!(stages.contains(&("cand-away", FailureStage::Embedding)));
	assert_eq!(report.candidates.embedded, 2);
	assert_eq!(report.candidates.failed, 2);
	assert_eq!(report.cache.failures, 2);
	assert_eq!(report.selection.len(), 2);
}

#[tokio::test]
async fn rerunning_the_same_selection_is_idempotent() {
	let mut cfg = toy_config(2);

	cfg.selection.exclude_recommended = false;

	let fx = fixture(cfg, &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());

	fx.labels.insert("cand-close", "Blue");

	let first = fx.service.run(RunOptions::default()).await.expect("run failed");
	let second = fx.service.run(RunOptions::default()).await.expect("run failed");
	let first_labels = first.labels.expect("Expected a label report.");
	let second_labels = second.labels.expect("Expected a label report.");

	assert_eq!(first_labels.applied, 2);
	assert_eq!(second_labels.applied, 0);
	assert_eq!(second_labels.already_labeled, 2);
	assert_eq!(fx.labels.writes(), 2);

	let kept = fx.labels.labels_of("cand-close");

	assert!(kept.contains("Blue"));
	assert!(kept.contains(RECOMMENDATION_LABEL));
}

#[tokio::test]
async fn recommended_documents_are_excluded_by_default() {
	let fx = fixture(toy_config(1), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let first = fx.service.run(RunOptions::default()).await.expect("run failed");
	let second = fx.service.run(RunOptions::default()).await.expect("run failed");

	assert_eq!(first.selection.items[0].document.id.as_str(), "cand-parallel");
	assert_eq!(second.candidates.excluded, 1);
	assert_eq!(second.selection.items[0].document.id.as_str(), "cand-close");
}

#[tokio::test]
async fn second_run_is_served_from_the_cache() {
	let fx = fixture(toy_config(2), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let first = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");

	assert_eq!(first.cache.misses, 7);
	assert_eq!(fx.embedder.texts(), 7);
	assert_eq!(fx.vectors.records().len(), 7);

	let second = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");

	assert_eq!(second.cache.hits, 7);
	assert_eq!(second.cache.misses, 0);
	assert_eq!(fx.embedder.texts(), 7);
}

#[tokio::test]
async fn identical_text_shares_a_cache_entry() {
	let fx = fixture(toy_config(2), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());

	fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");

	let edited = FakeExtractor::new().with_text("cand-side", "cand-close");
	let service = SiftService::with_parts(
		toy_config(2),
		Arc::new(MemoryDocuments::new(&TOY_IDS)),
		fx.labels.clone(),
		fx.vectors.clone(),
		Providers::new(fx.embedder.clone(), Arc::new(edited)),
	);
	let report = service.run(RunOptions { dry_run: true }).await.expect("run failed");

	// "cand-close" is already cached, so the edited document costs nothing new.
	assert_eq!(report.cache.misses, 0);
	assert_eq!(report.cache.hits, 7);
	assert_eq!(fx.vectors.records().len(), 7);
}

#[tokio::test]
async fn dry_run_writes_no_labels() {
	let fx = fixture(toy_config(3), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");

	assert!(report.dry_run);
	assert!(report.labels.is_none());
	assert_eq!(report.selection.len(), 3);
	assert_eq!(fx.labels.writes(), 0);
}

#[tokio::test]
async fn subsampling_never_touches_references() {
	let mut cfg = toy_config(1);

	cfg.selection.subsample = Some(2);

	let fx = fixture(cfg, &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let mut rng = ChaCha8Rng::seed_from_u64(21);
	let report = fx
		.service
		.run_with_rng(RunOptions { dry_run: true }, &mut rng)
		.await
		.expect("run failed");

	assert_eq!(report.references.embedded, 3);
	assert_eq!(report.candidates.eligible, 4);
	assert_eq!(report.candidates.considered, 2);
	assert_eq!(report.cache.misses, 5);
}

#[tokio::test]
async fn small_pool_recommends_everything() {
	let fx = fixture(toy_config(50), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions::default()).await.expect("run failed");

	assert_eq!(report.selection.len(), 4);
	assert_eq!(report.labels.expect("Expected a label report.").applied, 4);
}

#[tokio::test]
async fn percent_mode_uses_the_ranked_pool() {
	let mut cfg = toy_config(1);

	cfg.selection.mode = SelectionMode::Percent;
	cfg.selection.percent = 50.0;

	let fx = fixture(cfg, &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");

	assert_eq!(report.selection.target_count, 2);
	assert_eq!(report.selection.len(), 2);
}

#[tokio::test]
async fn unreadable_labels_exclude_the_document() {
	let labels = toy_labels().failing_read("cand-parallel");
	let fx = fixture(toy_config(1), &TOY_IDS, labels, toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions::default()).await.expect("run failed");

	assert_eq!(report.candidates.eligible, 3);
	assert_eq!(report.failures[0].stage, FailureStage::LabelRead);
	assert_eq!(report.selection.items[0].document.id.as_str(), "cand-close");
}

#[tokio::test]
async fn write_failures_do_not_abort_the_run() {
	let labels = toy_labels().failing_write("cand-parallel");
	let fx = fixture(toy_config(2), &TOY_IDS, labels, toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions::default()).await.expect("run failed");
	let labels = report.labels.expect("Expected a label report.");

	assert_eq!((labels.applied, labels.failed), (1, 1));
	assert_eq!(labels.failures[0].stage, FailureStage::LabelWrite);
}

#[tokio::test]
async fn stale_cache_dimension_is_fatal() {
	let cfg = toy_config(1);
	let version = format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id,
		cfg.providers.embedding.model,
		cfg.providers.embedding.dimensions
	);
	let storage = Arc::new(MemoryVectorStorage::with_records(vec![CachedVector {
		content_hash: VectorCache::content_hash("ref-a"),
		embedding_version: version,
		vector: vec![1.0, 0.0, 0.0],
	}]));
	let service = SiftService::with_parts(
		cfg,
		Arc::new(MemoryDocuments::new(&TOY_IDS)),
		Arc::new(toy_labels()),
		storage,
		Providers::new(Arc::new(toy_embedder()), Arc::new(FakeExtractor::new())),
	);
	let err = service.run(RunOptions::default()).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
}

#[tokio::test]
async fn wrong_provider_dimension_is_fatal() {
	let embedder = toy_embedder().with_vector("cand-side", vec![1.0, 0.0, 0.5]);
	let fx = fixture(toy_config(1), &TOY_IDS, toy_labels(), embedder, FakeExtractor::new());
	let err = fx.service.run(RunOptions::default()).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
	assert_eq!(fx.labels.writes(), 0);
}

#[tokio::test]
async fn seeded_runs_pick_the_same_surprises() {
	let ids: Vec<String> = (0..40).map(|i| format!("cand-{i:02}")).collect();
	let mut all: Vec<&str> = ids.iter().map(String::as_str).collect();
	let mut embedder = FakeEmbedder::new(2).with_vector("ref-a", vec![1.0, 0.0]);

	for (i, id) in ids.iter().enumerate() {
		embedder = embedder.with_vector(id, vec![1.0, i as f32 * 0.05]);
	}

	all.push("ref-a");

	let mut cfg = toy_config(6);

	cfg.selection.surprise_fraction = 0.5;

	let labels = MemoryLabelStore::new().with_label("ref-a", REFERENCE_LABEL);
	let fx = fixture(cfg, &all, labels, embedder, FakeExtractor::new());
	let first = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");
	let second = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");

	assert_eq!(first.selection, second.selection);
	assert_eq!(first.selection.surprise_count, 3);
	assert_eq!(first.selection.items[0].document.id.as_str(), "cand-00");
	assert!(first.selection.items.iter().all(|item| item.rank < 18));
}

#[tokio::test]
async fn report_serializes_to_json() {
	let fx = fixture(toy_config(1), &TOY_IDS, toy_labels(), toy_embedder(), FakeExtractor::new());
	let report = fx.service.run(RunOptions::default()).await.expect("run failed");
	let json = serde_json::to_value(&report).expect("Failed to serialize report.");

	assert_eq!(json["run_id"], report.run_id.to_string());
	assert_eq!(json["selection"]["items"][0]["origin"], "top");
	assert!(json["started_at"].as_str().is_some_and(|ts| ts.ends_with('Z')));
}

#[tokio::test]
async fn selections_carry_document_metadata() {
	let extractor = FakeExtractor::new().with_metadata(
		"cand-parallel",
		Some("Attention Is All You Need"),
		Some("Vaswani et al."),
	);
	let fx = fixture(toy_config(2), &TOY_IDS, toy_labels(), toy_embedder(), extractor);
	let report = fx.service.run(RunOptions { dry_run: true }).await.expect("run failed");
	let described: Vec<_> = report
		.selection
		.items
		.iter()
		.map(|item| (item.title.as_str(), item.author.as_deref()))
		.collect();

	assert_eq!(
		described,
		vec![("Attention Is All You Need", Some("Vaswani et al.")), ("cand-close", None)]
	);

	let json = serde_json::to_value(&report).expect("Failed to serialize report.");

	assert_eq!(json["selection"]["items"][0]["author"], "Vaswani et al.");
}
