use sift_service::{LabelReport, RunReport, SelectedDocument};
use sift_storage::{labels::LabelSet, models::Document};

pub fn print_run(report: &RunReport) {
	let cache = &report.cache;
	let looked_up = cache.hits + cache.misses;

	println!("Run {}{}", report.run_id, if report.dry_run { " (dry run)" } else { "" });
	println!(
		"Documents: {} | references: {} listed, {} embedded, {} failed",
		report.documents,
		report.references.listed,
		report.references.embedded,
		report.references.failed
	);
	println!(
		"Candidates: {} eligible, {} excluded, {} considered, {} embedded, {} failed",
		report.candidates.eligible,
		report.candidates.excluded,
		report.candidates.considered,
		report.candidates.embedded,
		report.candidates.failed
	);
	println!(
		"Cache: {} hits, {} computed ({:.1}% hit rate)",
		cache.hits,
		cache.misses,
		sift_cli::percent(cache.hits, looked_up)
	);
	println!(
		"Selected {} of {} ({} surprise):",
		report.selection.len(),
		report.selection.target_count,
		report.selection.surprise_count
	);

	for (position, item) in report.selection.items.iter().enumerate() {
		println!(
			"{:>4}. {:.4}  #{:<5} {:<8} {}",
			position + 1,
			item.score,
			item.rank,
			item.origin.as_str(),
			describe(item)
		);
		println!("{:>22}{}", "", item.document.id);
	}

	if let Some(labels) = &report.labels {
		print_labels(labels);
	}
	if !report.failures.is_empty() {
		println!("Skipped {} document(s):", report.failures.len());

		for failure in &report.failures {
			println!("  {:<12} {}: {}", failure.stage.as_str(), failure.document, failure.message);
		}
	}
}

pub fn print_labels(report: &LabelReport) {
	println!(
		"Label {:?}: {} applied, {} already labeled, {} failed",
		report.label, report.applied, report.already_labeled, report.failed
	);

	for failure in &report.failures {
		println!("  {:<12} {}: {}", failure.stage.as_str(), failure.document, failure.message);
	}
}

pub fn print_document(document: &Document, labels: &LabelSet) {
	let joined = labels.iter().map(String::as_str).collect::<Vec<_>>().join(", ");

	println!("{}\t{}", document.id, joined);
}

fn describe(item: &SelectedDocument) -> String {
	match &item.author {
		Some(author) => format!("{} ({author})", item.title),
		None => item.title.clone(),
	}
}
