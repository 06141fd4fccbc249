use std::{
	collections::{BTreeMap, BTreeSet},
	path::{Path, PathBuf},
	sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, atomic, models::DocumentId};

const LABEL_FILE_VERSION: u32 = 1;

pub type LabelSet = BTreeSet<String>;

/// A multi-valued label store shared with other writers.
///
/// Implementations must treat `add_label` as a union: labels the store already holds for a
/// document, including ones this process never wrote, survive every write.
pub trait LabelStore
where
	Self: Send + Sync,
{
	fn read_labels(&self, document: &DocumentId) -> Result<LabelSet>;

	fn add_label(&self, document: &DocumentId, label: &str) -> Result<()>;

	/// Re-reads external state before a run. Stores without a snapshot have nothing to do.
	fn refresh(&self) -> Result<()> {
		Ok(())
	}
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LabelFile {
	version: u32,
	labels: BTreeMap<DocumentId, LabelSet>,
}

/// Labels kept in a JSON sidecar file next to the library.
pub struct JsonLabelStore {
	path: PathBuf,
	snapshot: Mutex<BTreeMap<DocumentId, LabelSet>>,
}
impl JsonLabelStore {
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let labels = read_label_file(&path)?;

		Ok(Self { path, snapshot: Mutex::new(labels) })
	}

}

impl LabelStore for JsonLabelStore {
	fn read_labels(&self, document: &DocumentId) -> Result<LabelSet> {
		let snapshot = self.snapshot.lock().unwrap_or_else(|err| err.into_inner());

		Ok(snapshot.get(document).cloned().unwrap_or_default())
	}

	fn add_label(&self, document: &DocumentId, label: &str) -> Result<()> {
		let label = label.trim();

		if label.is_empty() {
			return Err(Error::InvalidArgument("Label must be non-empty.".to_string()));
		}

		let mut snapshot = self.snapshot.lock().unwrap_or_else(|err| err.into_inner());
		// Held from the read through the rename so no other writer's union is lost.
		let _guard = atomic::FileLock::acquire(&self.path)?;
		// Start from the file, not the snapshot, so writes made by others since the last read
		// are carried forward.
		let mut current = read_label_file(&self.path)?;
		let inserted = current.entry(document.clone()).or_default().insert(label.to_string());

		if inserted {
			atomic::write_json(
				&self.path,
				&LabelFile { version: LABEL_FILE_VERSION, labels: current.clone() },
			)?;
		}

		*snapshot = current;

		Ok(())
	}

	fn refresh(&self) -> Result<()> {
		let labels = read_label_file(&self.path)?;

		*self.snapshot.lock().unwrap_or_else(|err| err.into_inner()) = labels;

		Ok(())
	}
}

fn read_label_file(path: &Path) -> Result<BTreeMap<DocumentId, LabelSet>> {
	let Some(file) = atomic::read_json::<LabelFile>(path)? else {
		return Ok(BTreeMap::new());
	};

	if file.version != LABEL_FILE_VERSION {
		return Err(Error::InvalidArgument(format!(
			"Unsupported label file version {} at {path:?}.",
			file.version
		)));
	}

	Ok(file.labels)
}
