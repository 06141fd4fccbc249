use std::path::PathBuf;

use walkdir::WalkDir;

use crate::{
	Result,
	models::{Document, DocumentId},
};

/// A directory tree of documents, filtered by extension.
#[derive(Debug, Clone)]
pub struct FsLibrary {
	root: PathBuf,
	recursive: bool,
	extensions: Vec<String>,
}
impl FsLibrary {
	pub fn new(cfg: &sift_config::Library) -> Self {
		Self {
			root: cfg.root.clone(),
			recursive: cfg.recursive,
			extensions: cfg.extensions.iter().map(|ext| ext.to_ascii_lowercase()).collect(),
		}
	}

	/// Lists matching files ordered by document id. A missing root yields no documents.
	pub fn list_documents(&self) -> Result<Vec<Document>> {
		if !self.root.exists() {
			tracing::warn!(root = %self.root.display(), "Library root does not exist.");

			return Ok(Vec::new());
		}

		let max_depth = if self.recursive { usize::MAX } else { 1 };
		let mut out = Vec::new();

		for entry in WalkDir::new(&self.root).follow_links(true).max_depth(max_depth) {
			let entry = match entry {
				Ok(entry) => entry,
				Err(err) if err.depth() == 0 => return Err(err.into()),
				Err(err) => {
					tracing::warn!(error = %err, "Skipping unreadable library entry.");

					continue;
				},
			};

			if !entry.file_type().is_file() {
				continue;
			}

			let path = entry.path();
			let matches = path
				.extension()
				.map(|ext| ext.to_string_lossy().to_ascii_lowercase())
				.map(|ext| self.extensions.iter().any(|allowed| allowed == &ext))
				.unwrap_or(false);

			if !matches {
				continue;
			}

			let Ok(relative) = path.strip_prefix(&self.root) else { continue };

			out.push(Document::new(DocumentId::from_relative(relative), path.to_path_buf()));
		}

		out.sort_by(|a, b| a.id.cmp(&b.id));

		Ok(out)
	}

	pub fn resolve(&self, path: &std::path::Path) -> Option<Document> {
		let absolute = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
		let id = DocumentId::from_relative(absolute.strip_prefix(&self.root).ok()?);

		Some(Document::new(id, absolute))
	}
}
