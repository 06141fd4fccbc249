pub mod aggregate;
pub mod cache;
pub mod diversity;
pub mod rank;
pub mod reconcile;
pub mod recommend;
pub mod time_serde;

mod error;

pub use aggregate::aggregate;
pub use cache::{CacheStats, EmbeddedDocument, EmbeddingBatch, VectorCache};
pub use diversity::{SelectedDocument, SelectionOrigin, SelectionResult, select, target_count};
pub use error::{DocumentFailure, Error, FailureStage, Result};
pub use rank::{RankedCandidate, cosine_similarity, rank};
pub use reconcile::{LabelReconciler, LabelReport, Partition, partition};
pub use recommend::{CandidateCounts, ReferenceCounts, RunOptions, RunReport};

use std::{future::Future, pin::Pin, sync::Arc};

use sift_config::{Config, EmbeddingProviderConfig};
use sift_providers::{
	embedding,
	extractor::{self, DocumentMetadata},
};
use sift_storage::{
	labels::{JsonLabelStore, LabelStore},
	library::FsLibrary,
	models::Document,
	vectors::{FileVectorStorage, VectorStorage},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<Vec<Vec<f32>>>>;
}

pub trait TextExtractor
where
	Self: Send + Sync,
{
	fn extract_text(
		&self,
		document: &Document,
		page_limit: Option<u32>,
	) -> sift_providers::Result<String>;

	/// Title and author from the document itself. Extractors without a metadata source report
	/// none.
	fn metadata(&self, _document: &Document) -> sift_providers::Result<DocumentMetadata> {
		Ok(DocumentMetadata::default())
	}
}

pub trait DocumentSource
where
	Self: Send + Sync,
{
	fn list_documents(&self) -> sift_storage::Result<Vec<Document>>;

	/// Maps a user-supplied path onto a library document, if it is one.
	fn resolve(&self, path: &std::path::Path) -> Option<Document>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub extractor: Arc<dyn TextExtractor>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, extractor: Arc<dyn TextExtractor>) -> Self {
		Self { embedding, extractor }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), extractor: provider }
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl TextExtractor for DefaultProviders {
	fn extract_text(
		&self,
		document: &Document,
		page_limit: Option<u32>,
	) -> sift_providers::Result<String> {
		extractor::extract_text(&document.path, page_limit)
	}

	fn metadata(&self, document: &Document) -> sift_providers::Result<DocumentMetadata> {
		extractor::extract_metadata(&document.path)
	}
}

impl DocumentSource for FsLibrary {
	fn list_documents(&self) -> sift_storage::Result<Vec<Document>> {
		FsLibrary::list_documents(self)
	}

	fn resolve(&self, path: &std::path::Path) -> Option<Document> {
		FsLibrary::resolve(self, path)
	}
}

pub struct SiftService {
	pub cfg: Config,
	pub documents: Arc<dyn DocumentSource>,
	pub labels: Arc<dyn LabelStore>,
	pub vectors: Arc<dyn VectorStorage>,
	pub providers: Providers,
}
impl SiftService {
	/// Wires the filesystem library, the JSON label store and the file-backed vector cache.
	pub fn new(cfg: Config) -> Result<Self> {
		let documents = Arc::new(FsLibrary::new(&cfg.library));
		let labels = Arc::new(JsonLabelStore::open(&cfg.labels.store_path)?);
		let vectors = Arc::new(FileVectorStorage::new(&cfg.cache.path));

		Ok(Self { cfg, documents, labels, vectors, providers: Providers::default() })
	}

	pub fn with_parts(
		cfg: Config,
		documents: Arc<dyn DocumentSource>,
		labels: Arc<dyn LabelStore>,
		vectors: Arc<dyn VectorStorage>,
		providers: Providers,
	) -> Self {
		Self { cfg, documents, labels, vectors, providers }
	}

	pub fn reconciler(&self, label: &str) -> LabelReconciler {
		LabelReconciler::new(self.labels.clone(), label)
	}
}

pub(crate) fn embedding_version(cfg: &EmbeddingProviderConfig) -> String {
	format!("{}:{}:{}", cfg.provider_id, cfg.model, cfg.dimensions)
}
