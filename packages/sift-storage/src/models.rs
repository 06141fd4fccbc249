use std::{
	fmt,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Stable document identity: the path relative to the library root, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);
impl DocumentId {
	pub fn new(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	pub fn from_relative(path: &Path) -> Self {
		let parts: Vec<String> = path
			.components()
			.map(|component| component.as_os_str().to_string_lossy().into_owned())
			.collect();

		Self(parts.join("/"))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
	pub id: DocumentId,
	pub path: PathBuf,
}
impl Document {
	pub fn new(id: DocumentId, path: PathBuf) -> Self {
		Self { id, path }
	}

	pub fn title(&self) -> String {
		self.path
			.file_stem()
			.map(|stem| stem.to_string_lossy().into_owned())
			.unwrap_or_else(|| self.id.to_string())
	}
}
