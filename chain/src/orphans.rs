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

//! A bounded holding pen for blocks whose parent hasn't been seen yet.
//! Indexed both by the orphan's own hash and by the missing parent hash
//! it's waiting on, so a newly admitted block can cheaply check whether
//! it just unblocked anything.

use std::collections::{HashMap, VecDeque};

use mw_core::core::hash::{Hash, Hashed};
use mw_core::core::Block;
use mw_util::RwLock;

/// Default cap on the number of orphans held at once, beyond which the
/// longest-parked orphan is evicted to make room.
pub const MAX_ORPHANS: usize = 200;

/// Bounded map from missing-parent hash to the block waiting on it, with
/// FIFO eviction once the cap is exceeded.
pub struct OrphanBlockPool {
	orphans: RwLock<HashMap<Hash, Block>>,
	by_previous: RwLock<HashMap<Hash, Hash>>,
	order: RwLock<VecDeque<Hash>>,
	capacity: usize,
}

impl OrphanBlockPool {
	/// An empty pool with the default capacity.
	pub fn new() -> OrphanBlockPool {
		OrphanBlockPool::with_capacity(MAX_ORPHANS)
	}

	/// An empty pool bounded at `capacity` entries.
	pub fn with_capacity(capacity: usize) -> OrphanBlockPool {
		OrphanBlockPool {
			orphans: RwLock::new(HashMap::new()),
			by_previous: RwLock::new(HashMap::new()),
			order: RwLock::new(VecDeque::new()),
			capacity,
		}
	}

	/// Number of orphans currently parked.
	pub fn len(&self) -> usize {
		self.orphans.read().len()
	}

	/// Whether the pool holds no orphans.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Parks `block`, evicting the longest-parked orphan first if this
	/// addition would exceed capacity.
	pub fn add(&self, block: Block) {
		let hash = block.header.hash();
		let previous = block.header.previous;
		{
			let mut orphans = self.orphans.write();
			let mut by_previous = self.by_previous.write();
			let mut order = self.order.write();
			by_previous.insert(previous, hash);
			orphans.insert(hash, block);
			order.push_back(hash);
		}
		if self.len() > self.capacity {
			let evict_hash = self.order.write().pop_front();
			if let Some(evict_hash) = evict_hash {
				self.remove(&evict_hash);
			}
		}
	}

	/// Removes and returns the orphan with the given hash, if parked.
	pub fn remove(&self, hash: &Hash) -> Option<Block> {
		let mut orphans = self.orphans.write();
		let mut by_previous = self.by_previous.write();
		let mut order = self.order.write();
		let removed = orphans.remove(hash);
		if let Some(ref block) = removed {
			by_previous.remove(&block.header.previous);
			if let Some(pos) = order.iter().position(|h| h == hash) {
				order.remove(pos);
			}
		}
		removed
	}

	/// The orphan waiting on `parent_hash`, if any, removed from the pool
	/// so the caller can attempt to admit it.
	pub fn remove_by_previous(&self, parent_hash: &Hash) -> Option<Block> {
		let child_hash = self.by_previous.read().get(parent_hash).copied();
		match child_hash {
			Some(hash) => self.remove(&hash),
			None => None,
		}
	}

	/// Whether `hash` is currently parked.
	pub fn contains(&self, hash: &Hash) -> bool {
		self.orphans.read().contains_key(hash)
	}
}

impl Default for OrphanBlockPool {
	fn default() -> OrphanBlockPool {
		OrphanBlockPool::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mw_core::core::TransactionBody;

	fn hash_byte(b: u8) -> Hash {
		let mut bytes = [0u8; 32];
		bytes[0] = b;
		Hash::from_bytes(&bytes).unwrap()
	}

	fn block_with_previous(previous: Hash, height: u64) -> Block {
		let mut header = mw_core::core::BlockHeader::default();
		header.previous = previous;
		header.height = height;
		Block {
			header,
			body: TransactionBody::empty(),
		}
	}

	#[test]
	fn parks_and_promotes_by_previous() {
		let pool = OrphanBlockPool::new();
		let genesis = Hash::default();
		let orphan = block_with_previous(genesis, 1);
		let orphan_hash = orphan.header.hash();
		pool.add(orphan);

		assert!(pool.contains(&orphan_hash));
		let promoted = pool.remove_by_previous(&genesis);
		assert_eq!(promoted.unwrap().header.hash(), orphan_hash);
		assert!(!pool.contains(&orphan_hash));
	}

	#[test]
	fn evicts_oldest_when_over_capacity() {
		let pool = OrphanBlockPool::with_capacity(2);
		// distinct previous hashes so each orphan gets its own index entry
		let a = block_with_previous(hash_byte(1), 1);
		let b = block_with_previous(hash_byte(2), 2);
		let c = block_with_previous(hash_byte(3), 3);
		let (a_hash, b_hash, c_hash) = (a.header.hash(), b.header.hash(), c.header.hash());

		pool.add(a);
		pool.add(b);
		pool.add(c);

		assert_eq!(pool.len(), 2);
		assert!(!pool.contains(&a_hash));
		assert!(pool.contains(&b_hash));
		assert!(pool.contains(&c_hash));
	}
}
