//! Content-addressed embedding cache.
//!
//! Vectors are keyed by the BLAKE3 digest of a document's cleaned text and tagged with the
//! embedding version (`provider:model:dimensions`) that produced them. Records of other versions
//! are kept on disk untouched but never served.

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use serde::Serialize;
use tokio::task::JoinSet;

use sift_config::EmbeddingProviderConfig;
use sift_storage::{
	models::Document,
	vectors::{CachedVector, CachedVectorRef, VectorStorage},
};

use crate::{DocumentFailure, Error, FailureStage, Providers, Result, embedding_version};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
	/// Documents served from vectors already in the cache.
	pub hits: usize,
	/// Vectors computed by the embedding provider.
	pub misses: usize,
	/// Documents that could not be extracted or embedded.
	pub failures: usize,
}

#[derive(Clone, Debug)]
pub struct EmbeddedDocument {
	pub document: Document,
	pub content_hash: String,
	pub vector: Arc<Vec<f32>>,
}

#[derive(Debug, Default)]
pub struct EmbeddingBatch {
	/// Successfully embedded documents, in input order.
	pub embedded: Vec<EmbeddedDocument>,
	pub failures: Vec<DocumentFailure>,
}

pub struct VectorCache {
	storage: Arc<dyn VectorStorage>,
	version: String,
	dimensions: usize,
	entries: HashMap<String, Arc<Vec<f32>>>,
	retained: Vec<CachedVector>,
	dirty: bool,
	stats: CacheStats,
}
impl VectorCache {
	pub fn load(storage: Arc<dyn VectorStorage>, cfg: &EmbeddingProviderConfig) -> Result<Self> {
		let version = embedding_version(cfg);
		let dimensions = cfg.dimensions as usize;
		let mut entries = HashMap::new();
		let mut retained = Vec::new();

		for record in storage.load()? {
			if record.embedding_version != version {
				retained.push(record);

				continue;
			}
			if record.vector.len() != dimensions {
				return Err(Error::DimensionMismatch {
					expected: dimensions,
					actual: record.vector.len(),
				});
			}

			entries.insert(record.content_hash, Arc::new(record.vector));
		}

		if !retained.is_empty() {
			tracing::info!(
				count = retained.len(),
				embedding_version = %version,
				"Ignoring cached vectors from other embedding versions."
			);
		}

		tracing::debug!(entries = entries.len(), "Vector cache loaded.");

		Ok(Self {
			storage,
			version,
			dimensions,
			entries,
			retained,
			dirty: false,
			stats: CacheStats::default(),
		})
	}

	pub fn content_hash(text: &str) -> String {
		blake3::hash(text.as_bytes()).to_hex().to_string()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn stats(&self) -> CacheStats {
		self.stats
	}

	/// Returns the vector of every document in `documents`, computing and storing it on a miss.
	///
	/// Each document's extracted text is hashed and looked up first. Only misses reach the
	/// embedding provider, and the cache is checkpointed after every window of
	/// `batch_size * concurrency` documents. Documents whose text cannot be extracted are
	/// reported as unprocessed and never embedded. A vector of the wrong dimension or a failed
	/// checkpoint aborts the call.
	pub async fn embed_documents(
		&mut self,
		providers: &Providers,
		cfg: &EmbeddingProviderConfig,
		page_limit: Option<u32>,
		documents: &[Document],
	) -> Result<EmbeddingBatch> {
		let batch_size = (cfg.batch_size as usize).max(1);
		let window = batch_size * (cfg.concurrency as usize).max(1);
		let shared_cfg = Arc::new(cfg.clone());
		let mut out = EmbeddingBatch::default();

		for chunk in documents.chunks(window) {
			self.embed_window(providers, &shared_cfg, page_limit, chunk, &mut out).await?;
			self.checkpoint()?;
		}

		Ok(out)
	}

	/// Persists the cache if anything changed since the last checkpoint.
	pub fn checkpoint(&mut self) -> Result<()> {
		if !self.dirty {
			return Ok(());
		}

		let mut records: Vec<CachedVectorRef<'_>> = self
			.entries
			.iter()
			.map(|(hash, vector)| CachedVectorRef {
				content_hash: hash,
				embedding_version: &self.version,
				vector: vector.as_slice(),
			})
			.chain(self.retained.iter().map(|record| CachedVectorRef {
				content_hash: &record.content_hash,
				embedding_version: &record.embedding_version,
				vector: &record.vector,
			}))
			.collect();

		records.sort_by(|lhs, rhs| {
			lhs.content_hash
				.cmp(rhs.content_hash)
				.then_with(|| lhs.embedding_version.cmp(rhs.embedding_version))
		});

		self.storage.persist(&records)?;

		tracing::debug!(entries = records.len(), "Vector cache checkpointed.");

		self.dirty = false;

		Ok(())
	}

	async fn embed_window(
		&mut self,
		providers: &Providers,
		cfg: &Arc<EmbeddingProviderConfig>,
		page_limit: Option<u32>,
		chunk: &[Document],
		out: &mut EmbeddingBatch,
	) -> Result<()> {
		let mut extractions = Vec::with_capacity(chunk.len());

		for document in chunk {
			let extractor = providers.extractor.clone();
			let document = document.clone();

			extractions.push(tokio::task::spawn_blocking(move || {
				extractor.extract_text(&document, page_limit)
			}));
		}

		let mut hashes = Vec::with_capacity(chunk.len());
		let mut queued = HashSet::new();
		let mut pending = Vec::new();

		for (document, extraction) in chunk.iter().zip(extractions) {
			let extracted = extraction.await.map_err(|err| Error::Provider {
				message: format!("Extraction task failed: {err}."),
			})?;

			match extracted {
				Ok(text) => {
					let hash = Self::content_hash(&text);

					if self.entries.contains_key(&hash) {
						self.stats.hits += 1;
					} else if queued.insert(hash.clone()) {
						pending.push((hash.clone(), text));
					}

					hashes.push(Some(hash));
				},
				Err(err) => {
					self.stats.failures += 1;

					out.failures.push(DocumentFailure::new(
						&document.id,
						FailureStage::Extraction,
						err.to_string(),
					));
					hashes.push(None);
				},
			}
		}

		let failed = self.compute(providers, cfg, pending).await?;

		for (document, hash) in chunk.iter().zip(hashes) {
			let Some(hash) = hash else {
				continue;
			};

			if let Some(message) = failed.get(&hash) {
				self.stats.failures += 1;

				out.failures.push(DocumentFailure::new(
					&document.id,
					FailureStage::Embedding,
					message.clone(),
				));

				continue;
			}

			match self.entries.get(&hash) {
				Some(vector) => out.embedded.push(EmbeddedDocument {
					document: document.clone(),
					content_hash: hash,
					vector: vector.clone(),
				}),
				None => {
					self.stats.failures += 1;

					out.failures.push(DocumentFailure::new(
						&document.id,
						FailureStage::Embedding,
						"No vector was produced for this document.",
					));
				},
			}
		}

		Ok(())
	}

	/// Embeds `pending` in `batch_size` batches, all in flight at once. Returns the hashes whose
	/// batch failed, with the failure message.
	async fn compute(
		&mut self,
		providers: &Providers,
		cfg: &Arc<EmbeddingProviderConfig>,
		pending: Vec<(String, String)>,
	) -> Result<HashMap<String, String>> {
		let batch_size = (cfg.batch_size as usize).max(1);
		let mut failed = HashMap::new();
		let mut tasks = JoinSet::new();
		let mut pending = pending.into_iter().peekable();

		while pending.peek().is_some() {
			let (hashes, texts): (Vec<String>, Vec<String>) =
				pending.by_ref().take(batch_size).unzip();
			let provider = providers.embedding.clone();
			let cfg = cfg.clone();

			tasks.spawn(async move {
				let result = provider.embed(&cfg, &texts).await;

				(hashes, result)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			let (hashes, result) = joined.map_err(|err| Error::Provider {
				message: format!("Embedding task failed: {err}."),
			})?;

			match result {
				Ok(vectors) if vectors.len() == hashes.len() => {
					for (hash, vector) in hashes.into_iter().zip(vectors) {
						self.insert(hash, vector)?;
					}
				},
				Ok(vectors) => {
					let message = format!(
						"Embedding provider returned {} vectors for {} inputs.",
						vectors.len(),
						hashes.len()
					);

					for hash in hashes {
						failed.insert(hash, message.clone());
					}
				},
				Err(err) => {
					let message = err.to_string();

					for hash in hashes {
						failed.insert(hash, message.clone());
					}
				},
			}
		}

		Ok(failed)
	}

	fn insert(&mut self, hash: String, vector: Vec<f32>) -> Result<Arc<Vec<f32>>> {
		if vector.len() != self.dimensions {
			return Err(Error::DimensionMismatch {
				expected: self.dimensions,
				actual: vector.len(),
			});
		}

		let vector = Arc::new(vector);

		self.entries.insert(hash, vector.clone());

		self.stats.misses += 1;
		self.dirty = true;

		Ok(vector)
	}
}
