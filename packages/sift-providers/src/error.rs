use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error(transparent)]
	Regex(#[from] regex::Error),
	#[error("Failed to read {path:?}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Failed to parse PDF {path:?}: {message}")]
	Pdf { path: PathBuf, message: String },
	#[error("No text could be extracted from {path:?}.")]
	EmptyText { path: PathBuf },
	#[error("Unsupported document format at {path:?}.")]
	UnsupportedFormat { path: PathBuf },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
