mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, EmbeddingProviderConfig, Labels, Library, Providers, Selection, SelectionMode,
	Service,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.library.root.as_os_str().is_empty() {
		return Err(Error::Validation { message: "library.root must be non-empty.".to_string() });
	}
	if cfg.library.extensions.is_empty() {
		return Err(Error::Validation {
			message: "library.extensions must be non-empty.".to_string(),
		});
	}
	if cfg.library.extensions.iter().any(|ext| ext.is_empty()) {
		return Err(Error::Validation {
			message: "library.extensions must not contain empty entries.".to_string(),
		});
	}
	if cfg.labels.store_path.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "labels.store_path must be non-empty.".to_string(),
		});
	}

	for (label, value) in [
		("labels.reference", &cfg.labels.reference),
		("labels.recommendation", &cfg.labels.recommendation),
	] {
		if value.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.labels.reference == cfg.labels.recommendation {
		return Err(Error::Validation {
			message: "labels.reference and labels.recommendation must differ.".to_string(),
		});
	}
	if cfg.cache.path.as_os_str().is_empty() {
		return Err(Error::Validation { message: "cache.path must be non-empty.".to_string() });
	}

	validate_embedding(&cfg.providers.embedding)?;
	validate_selection(&cfg.selection)?;

	Ok(())
}

pub fn validate_selection(selection: &Selection) -> Result<()> {
	if !selection.surprise_fraction.is_finite() {
		return Err(Error::Validation {
			message: "selection.surprise_fraction must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&selection.surprise_fraction) {
		return Err(Error::Validation {
			message: "selection.surprise_fraction must be in the range 0.0-1.0.".to_string(),
		});
	}

	match selection.mode {
		SelectionMode::Percent => {
			if !selection.percent.is_finite() {
				return Err(Error::Validation {
					message: "selection.percent must be a finite number.".to_string(),
				});
			}
			if !(0.0..=100.0).contains(&selection.percent) {
				return Err(Error::Validation {
					message: "selection.percent must be in the range 0.0-100.0.".to_string(),
				});
			}
		},
		SelectionMode::TopK => match selection.top_k {
			None => {
				return Err(Error::Validation {
					message: "selection.top_k is required when selection.mode is top_k."
						.to_string(),
				});
			},
			Some(0) => {
				return Err(Error::Validation {
					message: "selection.top_k must be greater than zero.".to_string(),
				});
			},
			Some(_) => {},
		},
	}

	if let Some(subsample) = selection.subsample
		&& subsample == 0
	{
		return Err(Error::Validation {
			message: "selection.subsample must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_embedding(cfg: &EmbeddingProviderConfig) -> Result<()> {
	if cfg.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.batch_size == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.concurrency == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("providers.embedding.provider_id", &cfg.provider_id),
		("providers.embedding.api_base", &cfg.api_base),
		("providers.embedding.api_key", &cfg.api_key),
		("providers.embedding.model", &cfg.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::Validation {
			message: "providers.embedding.default_headers values must be strings.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.labels.reference = cfg.labels.reference.trim().to_string();
	cfg.labels.recommendation = cfg.labels.recommendation.trim().to_string();
	cfg.library.extensions = cfg
		.library
		.extensions
		.iter()
		.map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
		.collect();

	cfg.library.extensions.sort();
	cfg.library.extensions.dedup();

	if cfg.library.page_limit == Some(0) {
		cfg.library.page_limit = None;
	}
}
