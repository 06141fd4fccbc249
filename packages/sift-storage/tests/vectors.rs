use std::{env, fs};

use sift_storage::vectors::{CachedVectorRef, FileVectorStorage, VectorStorage};

#[test]
fn file_snapshot_round_trips_records() {
	let dir = env::temp_dir().join(format!("sift_vectors_{}", std::process::id()));
	let storage = FileVectorStorage::new(dir.join("cache").join("embeddings.json"));

	assert!(storage.load().expect("Failed to load empty cache.").is_empty());

	let vector = [0.25_f32, -1.5, 3.0];
	let records = [
		CachedVectorRef { content_hash: "abc", embedding_version: "local:m:3", vector: &vector },
		CachedVectorRef { content_hash: "def", embedding_version: "old:m:3", vector: &vector },
	];

	storage.persist(&records).expect("Failed to persist cache.");

	let loaded = storage.load().expect("Failed to load cache.");

	assert_eq!(loaded.len(), 2);
	assert_eq!(loaded[0].content_hash, "abc");
	assert_eq!(loaded[0].vector, vector.to_vec());
	assert_eq!(loaded[1].embedding_version, "old:m:3");

	fs::remove_dir_all(&dir).expect("Failed to remove test directory.");
}

#[test]
fn corrupt_snapshot_is_an_error() {
	let dir = env::temp_dir().join(format!("sift_vectors_corrupt_{}", std::process::id()));
	let path = dir.join("embeddings.json");

	fs::create_dir_all(&dir).expect("Failed to create test directory.");
	fs::write(&path, b"{\"version\":1,\"records\":[{\"content_hash\":").expect("write failed");

	let err = FileVectorStorage::new(&path).load().expect_err("Expected corrupt cache error.");

	assert!(err.to_string().contains("Malformed JSON"), "Unexpected error: {err}");

	fs::remove_dir_all(&dir).expect("Failed to remove test directory.");
}
