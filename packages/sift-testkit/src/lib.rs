//! In-memory collaborators for exercising the sift pipeline without a library on disk.

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	path::{Path, PathBuf},
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Map;

use sift_config::{
	Cache, Config, EmbeddingProviderConfig, Labels, Library, Providers, Selection, SelectionMode,
	Service,
};
use sift_providers::extractor::DocumentMetadata;
use sift_service::{BoxFuture, DocumentSource, EmbeddingProvider, TextExtractor};
use sift_storage::{
	Error as StorageError,
	labels::{LabelSet, LabelStore},
	models::{Document, DocumentId},
};

pub const REFERENCE_LABEL: &str = "Red";
pub const RECOMMENDATION_LABEL: &str = "Gray";

/// A config rooted at `root` with a 2-dimensional toy embedding model.
pub fn config(root: &Path) -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		library: Library {
			root: root.to_path_buf(),
			recursive: true,
			extensions: vec!["pdf".to_string(), "txt".to_string()],
			page_limit: Some(10),
		},
		labels: Labels {
			store_path: root.join(".sift").join("labels.json"),
			reference: REFERENCE_LABEL.to_string(),
			recommendation: RECOMMENDATION_LABEL.to_string(),
		},
		cache: Cache { path: root.join(".sift").join("embeddings.json") },
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "testkit".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "toy".to_string(),
				dimensions: 2,
				timeout_ms: 1_000,
				default_headers: Map::new(),
				batch_size: 2,
				concurrency: 2,
			},
		},
		selection: Selection {
			mode: SelectionMode::TopK,
			percent: 20.0,
			top_k: Some(3),
			min_count: 0,
			surprise_fraction: 0.0,
			subsample: None,
			exclude_recommended: true,
			seed: Some(7),
		},
	}
}

pub fn document(id: &str) -> Document {
	Document::new(DocumentId::new(id), PathBuf::from("/library").join(id))
}

pub struct MemoryDocuments {
	documents: Vec<Document>,
}
impl MemoryDocuments {
	pub fn new(ids: &[&str]) -> Self {
		let mut documents: Vec<_> = ids.iter().map(|id| document(id)).collect();

		documents.sort_by(|lhs, rhs| lhs.id.cmp(&rhs.id));

		Self { documents }
	}
}

impl DocumentSource for MemoryDocuments {
	fn list_documents(&self) -> sift_storage::Result<Vec<Document>> {
		Ok(self.documents.clone())
	}

	fn resolve(&self, path: &Path) -> Option<Document> {
		self.documents.iter().find(|doc| doc.path == path).cloned()
	}
}

/// Label store backed by a map, with per-document read and write failures on demand.
#[derive(Default)]
pub struct MemoryLabelStore {
	labels: Mutex<BTreeMap<DocumentId, LabelSet>>,
	failing_reads: HashSet<DocumentId>,
	failing_writes: HashSet<DocumentId>,
	writes: AtomicUsize,
	refreshes: AtomicUsize,
}
impl MemoryLabelStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_label(self, id: &str, label: &str) -> Self {
		self.insert(id, label);

		self
	}

	pub fn failing_read(mut self, id: &str) -> Self {
		self.failing_reads.insert(DocumentId::new(id));

		self
	}

	pub fn failing_write(mut self, id: &str) -> Self {
		self.failing_writes.insert(DocumentId::new(id));

		self
	}

	/// Adds a label the way another program sharing the store would.
	pub fn insert(&self, id: &str, label: &str) {
		let mut labels = self.labels.lock().unwrap_or_else(|err| err.into_inner());

		labels.entry(DocumentId::new(id)).or_default().insert(label.to_string());
	}

	pub fn labels_of(&self, id: &str) -> LabelSet {
		let labels = self.labels.lock().unwrap_or_else(|err| err.into_inner());

		labels.get(&DocumentId::new(id)).cloned().unwrap_or_default()
	}

	pub fn writes(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	pub fn refreshes(&self) -> usize {
		self.refreshes.load(Ordering::SeqCst)
	}
}

impl LabelStore for MemoryLabelStore {
	fn read_labels(&self, document: &DocumentId) -> sift_storage::Result<LabelSet> {
		if self.failing_reads.contains(document) {
			return Err(StorageError::InvalidArgument(format!("Cannot read labels of {document}.")));
		}

		let labels = self.labels.lock().unwrap_or_else(|err| err.into_inner());

		Ok(labels.get(document).cloned().unwrap_or_default())
	}

	fn add_label(&self, document: &DocumentId, label: &str) -> sift_storage::Result<()> {
		if self.failing_writes.contains(document) {
			return Err(StorageError::InvalidArgument(format!("Cannot label {document}.")));
		}

		self.writes.fetch_add(1, Ordering::SeqCst);

		let mut labels = self.labels.lock().unwrap_or_else(|err| err.into_inner());

		labels.entry(document.clone()).or_default().insert(label.to_string());

		Ok(())
	}

	fn refresh(&self) -> sift_storage::Result<()> {
		self.refreshes.fetch_add(1, Ordering::SeqCst);

		Ok(())
	}
}

/// Returns each document's id as its text unless overridden; listed documents fail.
#[derive(Default)]
pub struct FakeExtractor {
	texts: HashMap<DocumentId, String>,
	metadata: HashMap<DocumentId, DocumentMetadata>,
	failing: HashSet<DocumentId>,
	calls: AtomicUsize,
}
impl FakeExtractor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_text(mut self, id: &str, text: &str) -> Self {
		self.texts.insert(DocumentId::new(id), text.to_string());

		self
	}

	pub fn with_metadata(mut self, id: &str, title: Option<&str>, author: Option<&str>) -> Self {
		self.metadata.insert(
			DocumentId::new(id),
			DocumentMetadata {
				title: title.map(str::to_string),
				author: author.map(str::to_string),
			},
		);

		self
	}

	pub fn failing(mut self, id: &str) -> Self {
		self.failing.insert(DocumentId::new(id));

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl TextExtractor for FakeExtractor {
	fn extract_text(
		&self,
		document: &Document,
		_page_limit: Option<u32>,
	) -> sift_providers::Result<String> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		if self.failing.contains(&document.id) {
			return Err(sift_providers::Error::EmptyText { path: document.path.clone() });
		}

		Ok(self.texts.get(&document.id).cloned().unwrap_or_else(|| document.id.to_string()))
	}

	fn metadata(&self, document: &Document) -> sift_providers::Result<DocumentMetadata> {
		if self.failing.contains(&document.id) {
			return Err(sift_providers::Error::EmptyText { path: document.path.clone() });
		}

		Ok(self.metadata.get(&document.id).cloned().unwrap_or_default())
	}
}

/// Looks vectors up by text. Unknown texts embed to a zero vector; a batch containing a failing
/// text fails as a whole.
pub struct FakeEmbedder {
	dims: usize,
	vectors: HashMap<String, Vec<f32>>,
	failing: HashSet<String>,
	calls: AtomicUsize,
	texts: AtomicUsize,
}
impl FakeEmbedder {
	pub fn new(dims: usize) -> Self {
		Self {
			dims,
			vectors: HashMap::new(),
			failing: HashSet::new(),
			calls: AtomicUsize::new(0),
			texts: AtomicUsize::new(0),
		}
	}

	pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
		self.vectors.insert(text.to_string(), vector);

		self
	}

	pub fn failing(mut self, text: &str) -> Self {
		self.failing.insert(text.to_string());

		self
	}

	/// Number of provider requests.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Number of texts embedded across all requests.
	pub fn texts(&self) -> usize {
		self.texts.load(Ordering::SeqCst)
	}
}

impl EmbeddingProvider for FakeEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if let Some(text) = texts.iter().find(|text| self.failing.contains(*text)) {
				return Err(sift_providers::Error::InvalidResponse {
					message: format!("Refusing to embed {text:?}."),
				});
			}

			self.texts.fetch_add(texts.len(), Ordering::SeqCst);

			let vectors: Vec<Vec<f32>> = texts
				.iter()
				.map(|text| self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0; self.dims]))
				.collect();

			Ok(vectors)
		})
	}
}
