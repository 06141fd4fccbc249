use serde::Serialize;

use sift_storage::models::DocumentId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("No reference documents produced an embedding.")]
	EmptyReferenceSet,
	#[error("Vector dimension mismatch: expected {expected}, got {actual}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sift_storage::Error> for Error {
	fn from(err: sift_storage::Error) -> Self {
		match err {
			sift_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<sift_providers::Error> for Error {
	fn from(err: sift_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<sift_config::Error> for Error {
	fn from(err: sift_config::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

/// Pipeline stage at which a single document dropped out of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
	Extraction,
	Embedding,
	LabelRead,
	LabelWrite,
}
impl FailureStage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Extraction => "extraction",
			Self::Embedding => "embedding",
			Self::LabelRead => "label_read",
			Self::LabelWrite => "label_write",
		}
	}
}

/// A recoverable, per-document failure. These are collected, never raised.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentFailure {
	pub document: DocumentId,
	pub stage: FailureStage,
	pub message: String,
}
impl DocumentFailure {
	pub fn new(document: &DocumentId, stage: FailureStage, message: impl Into<String>) -> Self {
		let failure = Self { document: document.clone(), stage, message: message.into() };

		tracing::warn!(
			document = %failure.document,
			stage = failure.stage.as_str(),
			error = %failure.message,
			"Document skipped."
		);

		failure
	}
}
