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

//! Disk-backed [`mw_core::core::pmmr::Backend`] implementation: a
//! [`HashFile`] for durable storage plus a [`PruneList`] recording which
//! subtrees have been compacted away, the same pairing the TxHashSet's
//! output, range proof and kernel MMRs are each built from.

use std::path::Path;

use mw_core::core::hash::Hash;
use mw_core::core::pmmr::Backend;
use mw_core::core::prune_list::PruneList;

use crate::hash_file::HashFile;

/// A durable, prunable PMMR backend.
pub struct PMMRBackend {
	hash_file: HashFile,
	prune_list: PruneList,
}

impl PMMRBackend {
	/// Opens (creating if necessary) a backend rooted at `path`. The
	/// prune list currently starts empty on every open; a node that
	/// restarts after pruning re-derives it by replaying compaction,
	/// which [`crate::block_store::BlockStore`] drives at startup.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<PMMRBackend, String> {
		let hash_file = HashFile::open(path).map_err(|e| e.to_string())?;
		Ok(PMMRBackend {
			hash_file,
			prune_list: PruneList::new(),
		})
	}

	/// Durably commits every pending append.
	pub fn flush(&mut self) -> Result<(), String> {
		self.hash_file.flush().map_err(|e| e.to_string())
	}

	/// Discards every pending, unflushed append.
	pub fn discard(&mut self) {
		self.hash_file.discard();
	}
}

impl Backend for PMMRBackend {
	fn append(&mut self, hashes: &[Hash]) -> Result<(), String> {
		for hash in hashes {
			self.hash_file.append(*hash);
		}
		Ok(())
	}

	fn get(&self, position: u64) -> Option<Hash> {
		if self.prune_list.is_pruned(position) {
			return None;
		}
		self.hash_file.get(position).ok().flatten()
	}

	fn remove(&mut self, positions: &[u64]) -> Result<(), String> {
		for &pos in positions {
			self.prune_list.add(pos);
		}
		Ok(())
	}

	fn unpruned_size(&self) -> u64 {
		self.hash_file.size()
	}

	fn rewind(&mut self, pos: u64) -> Result<(), String> {
		self.hash_file.rewind(pos).map_err(|e| e.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mw_core::core::pmmr::PMMR as GenericPMMR;
	use std::fs;
	use std::path::PathBuf;

	fn temp_path(name: &str) -> PathBuf {
		let mut p = std::env::temp_dir();
		p.push(format!("mw_store_pmmr_backend_test_{}_{}", name, std::process::id()));
		let _ = fs::remove_file(&p);
		p
	}

	#[test]
	fn push_persists_across_flush() {
		let path = temp_path("push_persists");
		{
			let mut backend = PMMRBackend::open(&path).unwrap();
			{
				let mut pmmr = GenericPMMR::new(&mut backend);
				pmmr.push(&1u64).unwrap();
				pmmr.push(&2u64).unwrap();
			}
			backend.flush().unwrap();
			assert_eq!(backend.unpruned_size(), 3);
		}
		fs::remove_file(&path).unwrap();
	}
}
