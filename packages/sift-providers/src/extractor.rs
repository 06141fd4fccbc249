//! Page-bounded text extraction for library documents.

use std::{fs, path::Path, sync::LazyLock};

use lopdf::{Dictionary, Object};
use regex::Regex;

use crate::{Error, Result};

const PLAIN_TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];
const PAGE_BREAK: char = '\u{c}';

static CLEANER: LazyLock<Result<Cleaner, regex::Error>> = LazyLock::new(Cleaner::new);

struct Cleaner {
	non_ascii: Regex,
	whitespace: Regex,
	space_before_punct: Regex,
}
impl Cleaner {
	fn new() -> Result<Self, regex::Error> {
		Ok(Self {
			non_ascii: Regex::new(r"[^\x00-\x7F]+")?,
			whitespace: Regex::new(r"\s+")?,
			space_before_punct: Regex::new(r"\s+([,.!?;:])")?,
		})
	}
}

/// Title and author recorded in a document's own metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
	pub title: Option<String>,
	pub author: Option<String>,
}

/// Extracts and cleans the text of the first `page_limit` pages (all pages when `None`).
pub fn extract_text(path: &Path, page_limit: Option<u32>) -> Result<String> {
	let extension = lowercase_extension(path);
	let raw = if extension == "pdf" {
		extract_pdf(path, page_limit)?
	} else if PLAIN_TEXT_EXTENSIONS.contains(&extension.as_str()) {
		extract_plain(path, page_limit)?
	} else {
		return Err(Error::UnsupportedFormat { path: path.to_path_buf() });
	};
	let text = clean_text(&raw)?;

	if text.is_empty() {
		return Err(Error::EmptyText { path: path.to_path_buf() });
	}

	Ok(text)
}

/// Collapses whitespace, blanks out non-ASCII runs and drops spaces before punctuation.
pub fn clean_text(raw: &str) -> Result<String> {
	let cleaner = CLEANER.as_ref().map_err(|err| Error::Regex(err.clone()))?;
	let text = cleaner.non_ascii.replace_all(raw, " ");
	let text = cleaner.whitespace.replace_all(&text, " ");
	let text = cleaner.space_before_punct.replace_all(&text, "$1");

	Ok(text.trim().to_string())
}

/// Reads the Title and Author entries of a PDF's document information dictionary.
///
/// Other formats carry no metadata and yield an empty record.
pub fn extract_metadata(path: &Path) -> Result<DocumentMetadata> {
	if lowercase_extension(path) != "pdf" {
		return Ok(DocumentMetadata::default());
	}

	let doc = load_pdf(path)?;
	let info = match doc.trailer.get(b"Info") {
		Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
		Ok(Object::Dictionary(info)) => Some(info),
		_ => None,
	};
	let Some(info) = info else {
		return Ok(DocumentMetadata::default());
	};

	Ok(DocumentMetadata { title: info_text(info, b"Title"), author: info_text(info, b"Author") })
}

fn info_text(info: &Dictionary, key: &[u8]) -> Option<String> {
	let raw = info.get(key).ok()?.as_str().ok()?;
	let text = decode_pdf_string(raw);
	let text = text.trim();

	(!text.is_empty()).then(|| text.to_string())
}

/// UTF-16BE when the byte order mark is present, otherwise one byte per character.
fn decode_pdf_string(raw: &[u8]) -> String {
	match raw {
		[0xFE, 0xFF, rest @ ..] => {
			let units: Vec<u16> =
				rest.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();

			String::from_utf16_lossy(&units)
		},
		_ => raw.iter().map(|byte| char::from(*byte)).collect(),
	}
}

fn lowercase_extension(path: &Path) -> String {
	path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase()).unwrap_or_default()
}

fn load_pdf(path: &Path) -> Result<lopdf::Document> {
	lopdf::Document::load(path)
		.map_err(|err| Error::Pdf { path: path.to_path_buf(), message: err.to_string() })
}

fn extract_pdf(path: &Path, page_limit: Option<u32>) -> Result<String> {
	let doc = load_pdf(path)?;
	let limit = page_limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
	let mut parts = Vec::new();

	for page_number in doc.get_pages().keys().take(limit) {
		match doc.extract_text(&[*page_number]) {
			Ok(text) => parts.push(text),
			Err(err) => {
				tracing::debug!(
					path = %path.display(),
					page = page_number,
					error = %err,
					"Skipping PDF page without extractable text."
				);
			},
		}
	}

	Ok(parts.join("\n"))
}

fn extract_plain(path: &Path, page_limit: Option<u32>) -> Result<String> {
	let raw = fs::read(path).map_err(|err| Error::Io { path: path.to_path_buf(), source: err })?;
	let text = String::from_utf8_lossy(&raw);
	let limit = page_limit.map(|limit| limit as usize).unwrap_or(usize::MAX);

	Ok(text.split(PAGE_BREAK).take(limit).collect::<Vec<_>>().join("\n"))
}
