use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub library: Library,
	pub labels: Labels,
	pub cache: Cache,
	pub providers: Providers,
	pub selection: Selection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Library {
	pub root: PathBuf,
	#[serde(default = "default_recursive")]
	pub recursive: bool,
	pub extensions: Vec<String>,
	/// Upper bound on pages read per document. `None` reads every page.
	#[serde(default = "default_page_limit")]
	pub page_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Labels {
	pub store_path: PathBuf,
	/// Label carried by the user-curated reference documents.
	pub reference: String,
	/// Label written onto recommended documents.
	pub recommendation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
	pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_concurrency")]
	pub concurrency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
	Percent,
	TopK,
}
impl SelectionMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Percent => "percent",
			Self::TopK => "top_k",
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Selection {
	pub mode: SelectionMode,
	#[serde(default = "default_percent")]
	pub percent: f64,
	pub top_k: Option<u32>,
	#[serde(default)]
	pub min_count: u32,
	pub surprise_fraction: f64,
	pub subsample: Option<u32>,
	#[serde(default = "default_exclude_recommended")]
	pub exclude_recommended: bool,
	pub seed: Option<u64>,
}

fn default_recursive() -> bool {
	true
}

fn default_page_limit() -> Option<u32> {
	Some(10)
}

fn default_batch_size() -> u32 {
	32
}

fn default_concurrency() -> u32 {
	4
}

fn default_percent() -> f64 {
	20.0
}

fn default_exclude_recommended() -> bool {
	true
}
