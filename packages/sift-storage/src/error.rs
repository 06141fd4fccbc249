use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("I/O failure at {path:?}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Malformed JSON at {path:?}: {source}")]
	SerdeJson { path: PathBuf, source: serde_json::Error },
	#[error(transparent)]
	Walk(#[from] walkdir::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
impl Error {
	pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
		Self::Io { path: path.to_path_buf(), source }
	}
}
