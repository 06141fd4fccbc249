pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use sift_config::{Config, Selection, SelectionMode};
use sift_service::{RunOptions, SiftService};
use sift_storage::models::Document;

#[derive(Debug, Parser)]
#[command(
	version = sift_cli::VERSION,
	rename_all = "kebab",
	styles = sift_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Rank the library against the reference documents and label the picks.
	Run(RunArgs),
	/// Add the reference label, or the recommendation label, to documents.
	Mark(MarkArgs),
	/// List documents with their labels.
	Show(ShowArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
	/// Recommend exactly N documents.
	#[arg(long, value_name = "N", conflicts_with = "percent")]
	pub top_k: Option<u32>,
	/// Recommend this percentage of the ranked candidates.
	#[arg(long, value_name = "P")]
	pub percent: Option<f64>,
	/// Share of the picks drawn from just below the cutoff.
	#[arg(long, value_name = "F")]
	pub surprise: Option<f64>,
	/// Consider at most N randomly chosen candidates.
	#[arg(long, value_name = "N")]
	pub subsample: Option<u32>,
	#[arg(long, value_name = "SEED")]
	pub seed: Option<u64>,
	/// Rank and select without writing labels.
	#[arg(long)]
	pub dry_run: bool,
	/// Print the run report as JSON.
	#[arg(long)]
	pub json: bool,
}
impl RunArgs {
	/// Overlays the command-line flags on the configured selection.
	pub fn apply(&self, selection: &mut Selection) {
		if let Some(top_k) = self.top_k {
			selection.mode = SelectionMode::TopK;
			selection.top_k = Some(top_k);
		}
		if let Some(percent) = self.percent {
			selection.mode = SelectionMode::Percent;
			selection.percent = percent;
		}
		if let Some(surprise) = self.surprise {
			selection.surprise_fraction = surprise;
		}
		if let Some(subsample) = self.subsample {
			selection.subsample = Some(subsample);
		}
		if let Some(seed) = self.seed {
			selection.seed = Some(seed);
		}
	}
}

#[derive(Debug, clap::Args)]
pub struct MarkArgs {
	/// Apply the recommendation label instead of the reference label.
	#[arg(long)]
	pub recommendation: bool,
	/// Documents to label, relative to the library root unless absolute.
	#[arg(required = true, value_name = "PATH")]
	pub paths: Vec<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct ShowArgs {
	/// Only list documents carrying this label.
	#[arg(long, value_name = "ID")]
	pub label: Option<String>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = sift_config::load(&args.config)?;

	init_tracing(&config)?;

	match args.command {
		Command::Run(run_args) => {
			run_args.apply(&mut config.selection);

			sift_config::validate_selection(&config.selection)?;

			let service = SiftService::new(config)?;
			let report = service.run(RunOptions { dry_run: run_args.dry_run }).await?;

			if run_args.json {
				println!("{}", serde_json::to_string_pretty(&report)?);
			} else {
				output::print_run(&report);
			}
		},
		Command::Mark(mark_args) => mark(config, mark_args)?,
		Command::Show(show_args) => show(config, show_args)?,
	}

	Ok(())
}

fn mark(config: Config, args: MarkArgs) -> color_eyre::Result<()> {
	let label = if args.recommendation {
		config.labels.recommendation.clone()
	} else {
		config.labels.reference.clone()
	};
	let service = SiftService::new(config)?;
	let mut documents: Vec<Document> = Vec::with_capacity(args.paths.len());
	let mut unknown = 0;

	for path in &args.paths {
		match service.documents.resolve(path) {
			Some(document) if document.path.is_file() => documents.push(document),
			_ => {
				unknown += 1;

				tracing::warn!(path = %path.display(), "Not a document in the library.");
			},
		}
	}

	let report = service.reconciler(&label).apply_documents(&documents);

	output::print_labels(&report);

	if unknown > 0 {
		return Err(eyre::eyre!("{unknown} path(s) are not documents in the library."));
	}

	Ok(())
}

fn show(config: Config, args: ShowArgs) -> color_eyre::Result<()> {
	let service = SiftService::new(config)?;
	let filter = args.label.as_deref().map(str::trim);

	for document in service.documents.list_documents()? {
		let labels = match service.labels.read_labels(&document.id) {
			Ok(labels) => labels,
			Err(err) => {
				tracing::warn!(document = %document.id, error = %err, "Failed to read labels.");

				continue;
			},
		};

		if filter.is_some_and(|label| !labels.contains(label)) {
			continue;
		}

		output::print_document(&document, &labels);
	}

	Ok(())
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.try_init()
		.map_err(|err| eyre::eyre!("Failed to install the tracing subscriber: {err}."))?;

	Ok(())
}
