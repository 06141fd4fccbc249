use std::sync::Arc;

use serde::Serialize;

use sift_config::Labels;
use sift_storage::{labels::LabelStore, models::Document};

use crate::{DocumentFailure, FailureStage, diversity::SelectionResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LabelReport {
	pub label: String,
	pub applied: usize,
	pub already_labeled: usize,
	pub failed: usize,
	pub failures: Vec<DocumentFailure>,
}

/// Documents split by their current labels.
#[derive(Debug, Default)]
pub struct Partition {
	pub references: Vec<Document>,
	pub candidates: Vec<Document>,
	/// Documents left out because they already carry the recommendation label.
	pub excluded: Vec<Document>,
	pub failures: Vec<DocumentFailure>,
}

/// Adds one label to documents in a shared label store.
///
/// Writes are unions, documents that already carry the label are not written, and a failure on
/// one document never stops the rest.
pub struct LabelReconciler {
	store: Arc<dyn LabelStore>,
	label: String,
}
impl LabelReconciler {
	pub fn new(store: Arc<dyn LabelStore>, label: impl Into<String>) -> Self {
		Self { store, label: label.into() }
	}

	pub fn apply(&self, selection: &SelectionResult) -> LabelReport {
		self.apply_documents(selection.documents())
	}

	pub fn apply_documents<'a, I>(&self, documents: I) -> LabelReport
	where
		I: IntoIterator<Item = &'a Document>,
	{
		let mut report = LabelReport { label: self.label.clone(), ..Default::default() };

		for document in documents {
			let current = match self.store.read_labels(&document.id) {
				Ok(current) => current,
				Err(err) => {
					report.failed += 1;

					report.failures.push(DocumentFailure::new(
						&document.id,
						FailureStage::LabelRead,
						err.to_string(),
					));

					continue;
				},
			};

			if current.contains(&self.label) {
				report.already_labeled += 1;

				continue;
			}

			match self.store.add_label(&document.id, &self.label) {
				Ok(()) => {
					report.applied += 1;

					tracing::debug!(document = %document.id, label = %self.label, "Label applied.");
				},
				Err(err) => {
					report.failed += 1;

					report.failures.push(DocumentFailure::new(
						&document.id,
						FailureStage::LabelWrite,
						err.to_string(),
					));
				},
			}
		}

		tracing::info!(
			label = %report.label,
			applied = report.applied,
			already_labeled = report.already_labeled,
			failed = report.failed,
			"Labels reconciled."
		);

		report
	}
}

/// Splits `documents` into references and candidates by their labels.
///
/// With `exclude_recommended`, documents that already carry the recommendation label are set
/// aside instead of becoming candidates. Documents whose labels cannot be read join neither set.
pub fn partition(
	store: &dyn LabelStore,
	labels: &Labels,
	exclude_recommended: bool,
	documents: Vec<Document>,
) -> Partition {
	let mut out = Partition::default();

	for document in documents {
		let current = match store.read_labels(&document.id) {
			Ok(current) => current,
			Err(err) => {
				out.failures.push(DocumentFailure::new(
					&document.id,
					FailureStage::LabelRead,
					err.to_string(),
				));

				continue;
			},
		};

		if current.contains(&labels.reference) {
			out.references.push(document);
		} else if exclude_recommended && current.contains(&labels.recommendation) {
			out.excluded.push(document);
		} else {
			out.candidates.push(document);
		}
	}

	out
}
