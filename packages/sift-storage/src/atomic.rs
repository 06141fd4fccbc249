//! Whole-file replacement through a sibling temp file and a rename, so readers only ever
//! observe the previous or the next complete snapshot.

use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

use crate::{Error, Result};

/// An exclusive advisory lock on `<path>.lock`, released on drop.
///
/// The lock lives on a sibling file because the data file itself is replaced by every rename.
pub struct FileLock {
	path: PathBuf,
	file: File,
}
impl FileLock {
	/// Blocks until no other holder, in this process or another, has the lock.
	pub fn acquire(path: &Path) -> Result<Self> {
		ensure_parent(path)?;

		let path = lock_path(path);
		let file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&path)
			.map_err(|err| Error::io(&path, err))?;

		lock_exclusive(&file).map_err(|err| Error::io(&path, err))?;

		Ok(Self { path, file })
	}
}
impl Drop for FileLock {
	fn drop(&mut self) {
		if let Err(err) = unlock(&self.file) {
			tracing::warn!(path = %self.path.display(), error = %err, "Failed to release file lock.");
		}
	}
}

pub fn write_json<T>(path: &Path, value: &T) -> Result<()>
where
	T: Serialize,
{
	let raw = serde_json::to_vec(value)
		.map_err(|err| Error::SerdeJson { path: path.to_path_buf(), source: err })?;

	write_bytes(path, &raw)
}

/// Returns `Ok(None)` when the file does not exist yet.
pub fn read_json<T>(path: &Path) -> Result<Option<T>>
where
	T: DeserializeOwned,
{
	let raw = match fs::read(path) {
		Ok(raw) => raw,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(Error::io(path, err)),
	};
	let value = serde_json::from_slice(&raw)
		.map_err(|err| Error::SerdeJson { path: path.to_path_buf(), source: err })?;

	Ok(Some(value))
}

/// Every call writes through its own uniquely named temp file, so concurrent writers never
/// share or truncate each other's staging file.
pub fn write_bytes(path: &Path, raw: &[u8]) -> Result<()> {
	let dir = ensure_parent(path)?;
	let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| Error::io(&dir, err))?;

	tmp.write_all(raw).map_err(|err| Error::io(tmp.path(), err))?;
	tmp.as_file().sync_all().map_err(|err| Error::io(tmp.path(), err))?;
	tmp.persist(path).map_err(|err| Error::io(path, err.error))?;

	Ok(())
}

fn ensure_parent(path: &Path) -> Result<PathBuf> {
	let parent = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};

	fs::create_dir_all(&parent).map_err(|err| Error::io(&parent, err))?;

	Ok(parent)
}

fn lock_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();

	name.push(".lock");

	path.with_file_name(name)
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
	use std::os::unix::io::AsRawFd;

	loop {
		let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };

		if result == 0 {
			return Ok(());
		}

		let err = std::io::Error::last_os_error();

		if err.kind() != std::io::ErrorKind::Interrupted {
			return Err(err);
		}
	}
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
	use std::os::unix::io::AsRawFd;

	let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };

	if result == 0 { Ok(()) } else { Err(std::io::Error::last_os_error()) }
}

#[cfg(not(unix))]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
	file.lock()
}

#[cfg(not(unix))]
fn unlock(file: &File) -> std::io::Result<()> {
	file.unlock()
}

#[cfg(test)]
mod tests {
	use std::{env, thread};

	use super::*;

	#[test]
	fn missing_file_reads_as_none() {
		let path = env::temp_dir().join(format!("sift_atomic_missing_{}.json", std::process::id()));
		let value: Option<Vec<u32>> = read_json(&path).expect("read failed");

		assert!(value.is_none());
	}

	#[test]
	fn replaces_existing_snapshot() {
		let dir = env::temp_dir().join(format!("sift_atomic_{}", std::process::id()));
		let path = dir.join("nested").join("snapshot.json");

		write_json(&path, &vec![1_u32, 2]).expect("first write failed");
		write_json(&path, &vec![3_u32]).expect("second write failed");

		let value: Option<Vec<u32>> = read_json(&path).expect("read failed");

		assert_eq!(value, Some(vec![3]));

		let leftovers = fs::read_dir(dir.join("nested"))
			.expect("Failed to list test directory.")
			.filter_map(|entry| entry.ok())
			.filter(|entry| entry.file_name() != "snapshot.json")
			.count();

		assert_eq!(leftovers, 0);

		fs::remove_dir_all(&dir).expect("Failed to remove test directory.");
	}

	#[test]
	fn parallel_writers_always_leave_a_complete_file() {
		let dir = env::temp_dir().join(format!("sift_atomic_parallel_{}", std::process::id()));
		let path = dir.join("snapshot.json");

		thread::scope(|scope| {
			for writer in 0..4_u32 {
				let path = &path;

				scope.spawn(move || {
					for round in 0..50_u32 {
						let value = vec![writer; (round as usize % 7) + 1];

						write_json(path, &value).expect("Parallel write failed.");
					}
				});
			}
		});

		let value: Option<Vec<u32>> = read_json(&path).expect("read failed");
		let value = value.expect("Snapshot must exist.");

		assert!(!value.is_empty());
		assert!(value.iter().all(|writer| *writer == value[0]));

		fs::remove_dir_all(&dir).expect("Failed to remove test directory.");
	}

	#[test]
	fn lock_is_exclusive_across_handles() {
		let dir = env::temp_dir().join(format!("sift_atomic_lock_{}", std::process::id()));
		let path = dir.join("counter.json");

		write_json(&path, &0_u32).expect("seed failed");

		thread::scope(|scope| {
			for _ in 0..4 {
				let path = &path;

				scope.spawn(move || {
					for _ in 0..25 {
						let _guard = FileLock::acquire(path).expect("Failed to lock.");
						let current: u32 =
							read_json(path).expect("read failed").expect("Counter must exist.");

						write_json(path, &(current + 1)).expect("write failed");
					}
				});
			}
		});

		let total: Option<u32> = read_json(&path).expect("read failed");

		assert_eq!(total, Some(100));

		fs::remove_dir_all(&dir).expect("Failed to remove test directory.");
	}
}
