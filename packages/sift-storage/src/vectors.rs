use std::{
	path::PathBuf,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde::{Deserialize, Serialize};

use crate::{Result, atomic};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CachedVector {
	pub content_hash: String,
	pub embedding_version: String,
	pub vector: Vec<f32>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct CachedVectorRef<'a> {
	pub content_hash: &'a str,
	pub embedding_version: &'a str,
	pub vector: &'a [f32],
}
impl CachedVectorRef<'_> {
	pub fn to_record(self) -> CachedVector {
		CachedVector {
			content_hash: self.content_hash.to_string(),
			embedding_version: self.embedding_version.to_string(),
			vector: self.vector.to_vec(),
		}
	}
}

/// Durable home of the content-addressed vector cache.
///
/// `persist` replaces the stored snapshot as one unit; a reader never sees a partially written
/// record.
pub trait VectorStorage
where
	Self: Send + Sync,
{
	fn load(&self) -> Result<Vec<CachedVector>>;

	fn persist(&self, records: &[CachedVectorRef<'_>]) -> Result<()>;
}

#[derive(Deserialize)]
struct Snapshot {
	version: u32,
	records: Vec<CachedVector>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
	version: u32,
	records: &'a [CachedVectorRef<'a>],
}

pub struct FileVectorStorage {
	path: PathBuf,
}
impl FileVectorStorage {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl VectorStorage for FileVectorStorage {
	fn load(&self) -> Result<Vec<CachedVector>> {
		let Some(snapshot) = atomic::read_json::<Snapshot>(&self.path)? else {
			return Ok(Vec::new());
		};

		if snapshot.version != SNAPSHOT_VERSION {
			tracing::warn!(
				path = %self.path.display(),
				version = snapshot.version,
				"Ignoring vector cache with unknown snapshot version."
			);

			return Ok(Vec::new());
		}

		Ok(snapshot.records)
	}

	fn persist(&self, records: &[CachedVectorRef<'_>]) -> Result<()> {
		atomic::write_json(&self.path, &SnapshotRef { version: SNAPSHOT_VERSION, records })
	}
}

#[derive(Default)]
pub struct MemoryVectorStorage {
	records: Mutex<Vec<CachedVector>>,
	persists: AtomicUsize,
}
impl MemoryVectorStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_records(records: Vec<CachedVector>) -> Self {
		Self { records: Mutex::new(records), persists: AtomicUsize::new(0) }
	}

	pub fn records(&self) -> Vec<CachedVector> {
		self.records.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn persist_count(&self) -> usize {
		self.persists.load(Ordering::SeqCst)
	}
}

impl VectorStorage for MemoryVectorStorage {
	fn load(&self) -> Result<Vec<CachedVector>> {
		Ok(self.records())
	}

	fn persist(&self, records: &[CachedVectorRef<'_>]) -> Result<()> {
		let owned = records.iter().map(|record| record.to_record()).collect();

		*self.records.lock().unwrap_or_else(|err| err.into_inner()) = owned;

		self.persists.fetch_add(1, Ordering::SeqCst);

		Ok(())
	}
}
