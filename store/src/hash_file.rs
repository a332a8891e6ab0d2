// Copyright 2018 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Append-only, fixed-record-size file storage for the hashes making up
//! an MMR. Data already flushed to disk is read back through a
//! memory-mapped view for cheap random access; anything appended since
//! the last flush lives in a plain `Vec` until [`HashFile::flush`]
//! commits it, matching the same "buffer ahead of the durable file"
//! shape the txhashset extension/commit/discard lifecycle needs.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap::Mmap;

use mw_core::core::hash::{Hash, HASH_SIZE};

/// Errors raised reading or writing a hash file.
#[derive(Debug, failure_derive::Fail)]
pub enum HashFileError {
	/// The underlying file could not be opened, read or written.
	#[fail(display = "I/O error: {}", _0)]
	Io(String),
	/// A position past the end of the file was requested.
	#[fail(display = "position {} out of bounds (size {})", _0, _1)]
	OutOfBounds(u64, u64),
}

impl From<io::Error> for HashFileError {
	fn from(e: io::Error) -> HashFileError {
		HashFileError::Io(e.to_string())
	}
}

/// Append-only store of 32-byte MMR node hashes, indexed by 1-based MMR
/// position. Positions that have been pruned are simply never read back
/// (the [`mw_core::core::prune_list::PruneList`] tracks which positions
/// to skip); this file itself never shrinks except on an explicit
/// [`HashFile::rewind`].
pub struct HashFile {
	path: PathBuf,
	file: File,
	mmap: Option<Mmap>,
	/// Count of records durably flushed to disk.
	flushed_count: u64,
	/// Hashes appended since the last flush, not yet durable.
	pending: Vec<Hash>,
}

impl HashFile {
	/// Opens (creating if necessary) a hash file at `path`.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<HashFile, HashFileError> {
		let path = path.as_ref().to_path_buf();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.open(&path)?;
		let len = file.metadata()?.len();
		let flushed_count = len / HASH_SIZE as u64;
		let mmap = if len > 0 {
			Some(unsafe { Mmap::map(&file)? })
		} else {
			None
		};
		Ok(HashFile {
			path,
			file,
			mmap,
			flushed_count,
			pending: Vec::new(),
		})
	}

	/// Total number of records, flushed or not.
	pub fn size(&self) -> u64 {
		self.flushed_count + self.pending.len() as u64
	}

	/// Appends a hash, returning its 1-based position.
	pub fn append(&mut self, hash: Hash) -> u64 {
		self.pending.push(hash);
		self.flushed_count + self.pending.len() as u64
	}

	/// Reads the hash at 1-based position `pos`, whether flushed or
	/// still pending.
	pub fn get(&self, pos: u64) -> Result<Option<Hash>, HashFileError> {
		if pos == 0 || pos > self.size() {
			return Ok(None);
		}
		let idx = pos - 1;
		if idx < self.flushed_count {
			let mmap = self.mmap.as_ref().expect("flushed records imply a mapping");
			let start = (idx as usize) * HASH_SIZE;
			let bytes = &mmap[start..start + HASH_SIZE];
			Ok(Some(Hash::from_bytes(bytes).expect("fixed-size record")))
		} else {
			let pending_idx = (idx - self.flushed_count) as usize;
			Ok(self.pending.get(pending_idx).copied())
		}
	}

	/// Durably writes every pending hash to disk and refreshes the
	/// memory map over the new, larger file.
	pub fn flush(&mut self) -> Result<(), HashFileError> {
		if self.pending.is_empty() {
			return Ok(());
		}
		self.file.seek(SeekFrom::End(0))?;
		for hash in self.pending.drain(..) {
			self.file.write_all(hash.as_bytes())?;
		}
		self.file.flush()?;
		let len = self.file.metadata()?.len();
		self.flushed_count = len / HASH_SIZE as u64;
		self.mmap = if len > 0 {
			Some(unsafe { Mmap::map(&self.file)? })
		} else {
			None
		};
		Ok(())
	}

	/// Drops every pending, unflushed append.
	pub fn discard(&mut self) {
		self.pending.clear();
	}

	/// Truncates the file back to `pos` records, discarding everything
	/// after it, flushed or not. Used to undo a chain of blocks that a
	/// reorg determined should no longer be part of the confirmed chain.
	pub fn rewind(&mut self, pos: u64) -> Result<(), HashFileError> {
		if pos > self.size() {
			return Err(HashFileError::OutOfBounds(pos, self.size()));
		}
		self.pending.clear();
		if pos < self.flushed_count {
			let new_len = pos * HASH_SIZE as u64;
			self.file.set_len(new_len)?;
			self.flushed_count = pos;
			self.mmap = if new_len > 0 {
				Some(unsafe { Mmap::map(&self.file)? })
			} else {
				None
			};
		}
		Ok(())
	}

	/// Path this file was opened from, used for logging.
	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn temp_path(name: &str) -> PathBuf {
		let mut p = std::env::temp_dir();
		p.push(format!("mw_store_hash_file_test_{}_{}", name, std::process::id()));
		let _ = fs::remove_file(&p);
		p
	}

	#[test]
	fn append_then_flush_is_readable() {
		let path = temp_path("append_flush");
		{
			let mut hf = HashFile::open(&path).unwrap();
			let h = Hash::default();
			let pos = hf.append(h);
			assert_eq!(pos, 1);
			assert_eq!(hf.get(1).unwrap(), Some(h));
			hf.flush().unwrap();
			assert_eq!(hf.get(1).unwrap(), Some(h));
		}
		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn rewind_discards_flushed_records() {
		let path = temp_path("rewind");
		{
			let mut hf = HashFile::open(&path).unwrap();
			hf.append(Hash::default());
			hf.flush().unwrap();
			hf.append(Hash::default());
			hf.flush().unwrap();
			assert_eq!(hf.size(), 2);
			hf.rewind(1).unwrap();
			assert_eq!(hf.size(), 1);
		}
		fs::remove_file(&path).unwrap();
	}

	#[test]
	fn discard_drops_unflushed_appends() {
		let path = temp_path("discard");
		{
			let mut hf = HashFile::open(&path).unwrap();
			hf.append(Hash::default());
			hf.discard();
			assert_eq!(hf.size(), 0);
		}
		fs::remove_file(&path).unwrap();
	}
}
