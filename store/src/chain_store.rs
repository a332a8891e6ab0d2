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

//! In-memory index of every known header, arranged as a tree via `u32`
//! parent pointers into a flat arena rather than a graph of boxed nodes,
//! plus the three named chain tips a node tracks at once:
//!
//! - `Confirmed`: the fully validated chain, body and all.
//! - `Candidate`: the best header-only chain seen so far, which may run
//!   ahead of `Confirmed` while block bodies are still being fetched.
//! - `Sync`: the chain currently being pulled from a single peer during
//!   initial header sync, kept separate so a bad peer's headers don't
//!   contaminate `Candidate` before they are fully validated.
//!
//! `u32` arena indices rather than `Hash` are used for parent links so
//! walking toward genesis is a simple array index instead of a hash
//! lookup, which matters when computing a reorg's common ancestor across
//! a deep fork.

use std::collections::HashMap;

use log::{debug, info};

use mw_core::core::hash::Hash;
use mw_core::pow::Difficulty;

/// Which of the three tracked chains an operation applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChainName {
	/// Fully validated chain.
	Confirmed,
	/// Best known header-only chain.
	Candidate,
	/// Chain currently being fetched from a single sync peer.
	Sync,
}

/// One entry in the header arena.
#[derive(Clone, Debug)]
struct IndexEntry {
	hash: Hash,
	height: u64,
	parent: Option<u32>,
	total_difficulty: Difficulty,
}

/// Errors raised navigating or mutating the index.
#[derive(Clone, Debug, Eq, PartialEq, failure_derive::Fail)]
pub enum ChainStoreError {
	/// A hash referenced by an operation isn't in the arena.
	#[fail(display = "unknown header: {}", _0)]
	UnknownHeader(Hash),
	/// Two positions passed to a fork-point lookup belong to disjoint
	/// trees (no common ancestor, which should never happen as long as
	/// every entry chains back to the same genesis).
	#[fail(display = "no common ancestor")]
	NoCommonAncestor,
}

/// Arena-backed multi-chain header index.
#[derive(Default)]
pub struct ChainStore {
	arena: Vec<IndexEntry>,
	by_hash: HashMap<Hash, u32>,
	tips: HashMap<ChainName, u32>,
}

impl ChainStore {
	/// Builds an empty index. The first header added via
	/// [`ChainStore::add_header`] becomes genesis and has no parent.
	pub fn new() -> ChainStore {
		ChainStore::default()
	}

	/// Number of headers known to the index.
	pub fn len(&self) -> usize {
		self.arena.len()
	}

	/// Whether the index has no headers yet.
	pub fn is_empty(&self) -> bool {
		self.arena.is_empty()
	}

	fn idx_of(&self, hash: &Hash) -> Result<u32, ChainStoreError> {
		self.by_hash.get(hash).copied().ok_or_else(|| ChainStoreError::UnknownHeader(*hash))
	}

	/// Registers a new header. `previous` must already be indexed unless
	/// this is the very first header added (genesis). Returns the arena
	/// index assigned, idempotent if the hash is already known.
	pub fn add_header(
		&mut self,
		hash: Hash,
		previous: Option<Hash>,
		total_difficulty: Difficulty,
	) -> Result<u32, ChainStoreError> {
		if let Some(&idx) = self.by_hash.get(&hash) {
			return Ok(idx);
		}
		let (parent, height) = match previous {
			None => (None, 0),
			Some(prev_hash) => {
				let parent_idx = self.idx_of(&prev_hash)?;
				(Some(parent_idx), self.arena[parent_idx as usize].height + 1)
			}
		};
		let idx = self.arena.len() as u32;
		self.arena.push(IndexEntry {
			hash,
			height,
			parent,
			total_difficulty,
		});
		self.by_hash.insert(hash, idx);
		Ok(idx)
	}

	/// Height of a known header.
	pub fn height_of(&self, hash: &Hash) -> Result<u64, ChainStoreError> {
		Ok(self.arena[self.idx_of(hash)? as usize].height)
	}

	/// Total chain difficulty up to and including a known header.
	pub fn total_difficulty_of(&self, hash: &Hash) -> Result<Difficulty, ChainStoreError> {
		Ok(self.arena[self.idx_of(hash)? as usize].total_difficulty)
	}

	/// Parent hash of a known, non-genesis header.
	pub fn parent_of(&self, hash: &Hash) -> Result<Option<Hash>, ChainStoreError> {
		let idx = self.idx_of(hash)?;
		Ok(self.arena[idx as usize]
			.parent
			.map(|p| self.arena[p as usize].hash))
	}

	/// Sets which header a named chain's tip points to. The header must
	/// already be indexed.
	pub fn set_tip(&mut self, chain: ChainName, hash: Hash) -> Result<(), ChainStoreError> {
		let idx = self.idx_of(&hash)?;
		debug!(
			"chain_store: {:?} tip set to {} at height {}",
			chain, hash, self.arena[idx as usize].height
		);
		self.tips.insert(chain, idx);
		Ok(())
	}

	/// Current tip of a named chain, if one has been set.
	pub fn tip(&self, chain: ChainName) -> Option<Hash> {
		self.tips.get(&chain).map(|&idx| self.arena[idx as usize].hash)
	}

	/// Height of a named chain's tip.
	pub fn tip_height(&self, chain: ChainName) -> Option<u64> {
		self.tips.get(&chain).map(|&idx| self.arena[idx as usize].height)
	}

	/// Finds the most recent header that `a` and `b` have in common by
	/// walking the shorter branch up to the longer one's height, then
	/// stepping both toward genesis in lockstep until they converge. This
	/// is the fork point a reorg rewinds the confirmed chain back to
	/// before replaying the new branch's blocks forward.
	pub fn fork_point(&self, a: &Hash, b: &Hash) -> Result<Hash, ChainStoreError> {
		let mut a_idx = self.idx_of(a)?;
		let mut b_idx = self.idx_of(b)?;

		while self.arena[a_idx as usize].height > self.arena[b_idx as usize].height {
			a_idx = self.arena[a_idx as usize]
				.parent
				.ok_or(ChainStoreError::NoCommonAncestor)?;
		}
		while self.arena[b_idx as usize].height > self.arena[a_idx as usize].height {
			b_idx = self.arena[b_idx as usize]
				.parent
				.ok_or(ChainStoreError::NoCommonAncestor)?;
		}
		while a_idx != b_idx {
			a_idx = self.arena[a_idx as usize]
				.parent
				.ok_or(ChainStoreError::NoCommonAncestor)?;
			b_idx = self.arena[b_idx as usize]
				.parent
				.ok_or(ChainStoreError::NoCommonAncestor)?;
		}
		let fork_hash = self.arena[a_idx as usize].hash;
		info!(
			"chain_store: fork point between {} and {} is {} at height {}",
			a, b, fork_hash, self.arena[a_idx as usize].height
		);
		Ok(fork_hash)
	}

	/// Every header from just after `from` (exclusive) down to `to`
	/// (inclusive), oldest first: the sequence a reorg needs to replay
	/// onto the chain once it's been rewound back to `from`.
	pub fn path_from_to(&self, from: &Hash, to: &Hash) -> Result<Vec<Hash>, ChainStoreError> {
		let mut idx = self.idx_of(to)?;
		let from_idx = self.idx_of(from)?;
		let mut path = Vec::new();
		while idx != from_idx {
			path.push(self.arena[idx as usize].hash);
			idx = self.arena[idx as usize]
				.parent
				.ok_or(ChainStoreError::NoCommonAncestor)?;
		}
		path.reverse();
		Ok(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn h(byte: u8) -> Hash {
		let mut bytes = [0u8; 32];
		bytes[0] = byte;
		Hash::from_bytes(&bytes).unwrap()
	}

	#[test]
	fn linear_chain_heights() {
		let mut store = ChainStore::new();
		store.add_header(h(0), None, Difficulty::min()).unwrap();
		store.add_header(h(1), Some(h(0)), Difficulty::min()).unwrap();
		store.add_header(h(2), Some(h(1)), Difficulty::min()).unwrap();
		assert_eq!(store.height_of(&h(2)).unwrap(), 2);
		assert_eq!(store.parent_of(&h(2)).unwrap(), Some(h(1)));
	}

	#[test]
	fn fork_point_finds_common_ancestor() {
		let mut store = ChainStore::new();
		store.add_header(h(0), None, Difficulty::min()).unwrap();
		store.add_header(h(1), Some(h(0)), Difficulty::min()).unwrap();
		store.add_header(h(2), Some(h(1)), Difficulty::min()).unwrap();
		// fork at h(1): alternate branch h(3), h(4)
		store.add_header(h(3), Some(h(1)), Difficulty::min()).unwrap();
		store.add_header(h(4), Some(h(3)), Difficulty::min()).unwrap();

		assert_eq!(store.fork_point(&h(2), &h(4)).unwrap(), h(1));
	}

	#[test]
	fn path_from_to_replays_in_order() {
		let mut store = ChainStore::new();
		store.add_header(h(0), None, Difficulty::min()).unwrap();
		store.add_header(h(1), Some(h(0)), Difficulty::min()).unwrap();
		store.add_header(h(2), Some(h(1)), Difficulty::min()).unwrap();
		let path = store.path_from_to(&h(0), &h(2)).unwrap();
		assert_eq!(path, vec![h(1), h(2)]);
	}

	#[test]
	fn tips_track_independently() {
		let mut store = ChainStore::new();
		store.add_header(h(0), None, Difficulty::min()).unwrap();
		store.add_header(h(1), Some(h(0)), Difficulty::min()).unwrap();
		store.set_tip(ChainName::Confirmed, h(0)).unwrap();
		store.set_tip(ChainName::Candidate, h(1)).unwrap();
		assert_eq!(store.tip(ChainName::Confirmed), Some(h(0)));
		assert_eq!(store.tip(ChainName::Candidate), Some(h(1)));
		assert_eq!(store.tip(ChainName::Sync), None);
	}
}
