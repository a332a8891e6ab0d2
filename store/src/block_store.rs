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

//! Durable storage of full blocks and headers, keyed by block hash. Chain
//! traversal (parent/child, height lookups) lives one layer up in
//! [`crate::chain_store::ChainStore`]; this module only knows how to get
//! a header or block back out given its hash.

use mw_core::core::{Block, BlockHeader, Hash, Hashed};

use crate::lmdb::{option_to_not_found, Batch as LmdbBatch, Error, Store};

const HEADER_PREFIX: u8 = b'h';
const BLOCK_PREFIX: u8 = b'b';

fn header_key(hash: &Hash) -> Vec<u8> {
	let mut key = vec![HEADER_PREFIX];
	key.extend_from_slice(hash.as_bytes());
	key
}

fn block_key(hash: &Hash) -> Vec<u8> {
	let mut key = vec![BLOCK_PREFIX];
	key.extend_from_slice(hash.as_bytes());
	key
}

/// Key/value store of full blocks and bare headers.
pub struct BlockStore {
	db: Store,
}

impl BlockStore {
	/// Wraps an already-open LMDB [`Store`].
	pub fn new(db: Store) -> BlockStore {
		BlockStore { db }
	}

	/// Header stored under `hash`, if any.
	pub fn get_header(&self, hash: &Hash) -> Result<Option<BlockHeader>, Error> {
		self.db.get_ser(&header_key(hash))
	}

	/// Header stored under `hash`, erroring if absent.
	pub fn get_header_required(&self, hash: &Hash) -> Result<BlockHeader, Error> {
		option_to_not_found(self.get_header(hash), &format!("header {}", hash))
	}

	/// Full block stored under `hash`, if any.
	pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>, Error> {
		self.db.get_ser(&block_key(hash))
	}

	/// Whether a header for `hash` is known, independent of whether the
	/// full block body is still retained.
	pub fn has_header(&self, hash: &Hash) -> Result<bool, Error> {
		self.db.exists(&header_key(hash))
	}

	/// Opens a write batch against the underlying store.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			inner: self.db.batch()?,
		})
	}
}

/// Atomic write batch over the block store.
pub struct Batch<'a> {
	inner: LmdbBatch<'a>,
}

impl<'a> Batch<'a> {
	/// Saves a header, keyed by its own hash.
	pub fn save_header(&self, header: &BlockHeader) -> Result<(), Error> {
		self.inner.put_ser(&header_key(&header.hash()), header)
	}

	/// Saves a full block, keyed by its header's hash. Does not
	/// implicitly save the header separately; callers that want both
	/// should call [`Batch::save_header`] too.
	pub fn save_block(&self, block: &Block) -> Result<(), Error> {
		self.inner.put_ser(&block_key(&block.header.hash()), block)
	}

	/// Removes a full block's body, keeping its header (used once a
	/// block falls behind the cut-through horizon and its inputs/outputs
	/// are no longer needed, only its place in the header chain).
	pub fn delete_block_body(&self, hash: &Hash) -> Result<(), Error> {
		self.inner.delete(&block_key(hash))
	}

	/// Commits every write made through this batch.
	pub fn commit(self) -> Result<(), Error> {
		self.inner.commit()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mw_core::core::TransactionBody;
	use std::fs;
	use std::path::PathBuf;
	use std::sync::Arc;

	fn temp_dir(name: &str) -> PathBuf {
		let mut p = std::env::temp_dir();
		p.push(format!("mw_store_block_store_test_{}_{}", name, std::process::id()));
		let _ = fs::remove_dir_all(&p);
		fs::create_dir_all(&p).unwrap();
		p
	}

	#[test]
	fn round_trips_header_and_block() {
		let dir = temp_dir("round_trip");
		let env = Arc::new(crate::lmdb::new_env(dir.to_str().unwrap()));
		let store = BlockStore::new(Store::open(env, "test"));

		let header = BlockHeader::default();
		let block = Block {
			header: header.clone(),
			body: TransactionBody::empty(),
		};

		let batch = store.batch().unwrap();
		batch.save_header(&header).unwrap();
		batch.save_block(&block).unwrap();
		batch.commit().unwrap();

		let hash = header.hash();
		assert_eq!(store.get_header(&hash).unwrap(), Some(header));
		assert_eq!(store.get_block(&hash).unwrap(), Some(block));
		assert!(store.has_header(&hash).unwrap());

		fs::remove_dir_all(&dir).unwrap();
	}
}
