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

//! The single coordinator every other component in this crate talks
//! through: one reader-writer lock guarding the header MMR, chain index,
//! block store, orphan pool and TxHashSet together, so a reorg can never
//! observe half of those structures mid-update.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru_cache::LruCache;
use mw_util::RwLock;

use mw_core::core::hash::{Hash, Hashed};
use mw_core::core::pmmr::PMMR;
use mw_core::core::{Block, BlockHeader};
use mw_core::pow::Difficulty;
use mw_store::{lmdb, BlockStore, ChainName, ChainStore};

use crate::error::{Error, ErrorKind};
use crate::orphans::OrphanBlockPool;
use crate::pipe;
use crate::txhashset::TxHashSet;
use crate::types::Tip;

const VALIDATED_CACHE_CAPACITY: usize = 10_000;

pub(crate) struct Inner {
	pub(crate) header_mmr: mw_store::PMMRBackend,
	pub(crate) chain_store: ChainStore,
	pub(crate) block_store: BlockStore,
	pub(crate) orphans: OrphanBlockPool,
	pub(crate) txhashset: TxHashSet,
	pub(crate) validated_cache: LruCache<Hash, u64>,
	pub(crate) confirmed_tip: Option<Tip>,
	pub(crate) candidate_tip: Option<Tip>,
}

/// The chain facade: every public operation takes the single lock
/// internally, in shared mode for reads and exclusive mode for writes, and
/// never holds it across an I/O suspension point longer than one
/// operation needs.
pub struct ChainState {
	inner: RwLock<Inner>,
	db_root: PathBuf,
}

impl ChainState {
	/// Opens (or initializes, if empty) chain state rooted at
	/// `db_root`, matching the on-disk layout under `chain_data/`.
	pub fn new<P: AsRef<Path>>(db_root: P, genesis: &Block) -> Result<ChainState, Error> {
		let db_root = db_root.as_ref().to_path_buf();
		std::fs::create_dir_all(&db_root).map_err(|e| ErrorKind::StorageError(e.to_string()))?;
		std::fs::create_dir_all(db_root.join("txhashset"))
			.map_err(|e| ErrorKind::StorageError(e.to_string()))?;
		let header_mmr = mw_store::PMMRBackend::open(db_root.join("header"))
			.map_err(ErrorKind::StorageError)?;
		let block_store_path = db_root.join("block_store");
		let block_store_path_str = block_store_path
			.to_str()
			.ok_or_else(|| ErrorKind::StorageError("non-utf8 db root".into()))?;
		let env = Arc::new(lmdb::new_env(block_store_path_str));
		let block_store = BlockStore::new(lmdb::Store::open(env, "blocks"));
		let txhashset = TxHashSet::open(db_root.join("txhashset"))?;

		let mut chain = ChainState {
			inner: RwLock::new(Inner {
				header_mmr,
				chain_store: ChainStore::new(),
				block_store,
				orphans: OrphanBlockPool::new(),
				txhashset,
				validated_cache: LruCache::new(VALIDATED_CACHE_CAPACITY),
				confirmed_tip: None,
				candidate_tip: None,
			}),
			db_root,
		};

		if chain.inner.read().chain_store.is_empty() {
			chain.initialize(genesis)?;
		}
		Ok(chain)
	}

	fn initialize(&mut self, genesis: &Block) -> Result<(), Error> {
		let mut inner = self.inner.write();
		let hash = genesis.header.hash();
		inner
			.chain_store
			.add_header(hash, None, genesis.header.pow.total_difficulty)?;
		inner.chain_store.set_tip(ChainName::Confirmed, hash)?;
		inner.chain_store.set_tip(ChainName::Candidate, hash)?;

		{
			let mut pmmr = PMMR::new(&mut inner.header_mmr);
			pmmr.push(&genesis.header).map_err(ErrorKind::StorageError)?;
		}

		let batch = inner.block_store.batch()?;
		batch.save_header(&genesis.header)?;
		batch.save_block(genesis)?;
		batch.commit()?;

		inner.txhashset.apply_block(genesis)?;
		inner.confirmed_tip = Some(Tip::from_header(&genesis.header));
		inner.candidate_tip = Some(Tip::from_header(&genesis.header));
		Ok(())
	}

	/// Height of a named chain's tip.
	pub fn height(&self, chain: ChainName) -> Option<u64> {
		self.inner.read().chain_store.tip_height(chain)
	}

	/// Accumulated total difficulty of a named chain's tip.
	pub fn total_difficulty(&self, chain: ChainName) -> Result<Difficulty, Error> {
		let inner = self.inner.read();
		let tip = inner
			.chain_store
			.tip(chain)
			.ok_or_else(|| Error::from(ErrorKind::GenesisRequired))?;
		Ok(inner.chain_store.total_difficulty_of(&tip)?)
	}

	/// Header at a given hash, read straight through the block store.
	pub fn header_by_hash(&self, hash: &Hash) -> Result<Option<BlockHeader>, Error> {
		Ok(self.inner.read().block_store.get_header(hash)?)
	}

	/// Full block at a given hash, if its body is still retained.
	pub fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, Error> {
		Ok(self.inner.read().block_store.get_block(hash)?)
	}

	/// Header currently at the tip of `chain`.
	pub fn header_at_tip(&self, chain: ChainName) -> Result<Option<BlockHeader>, Error> {
		let inner = self.inner.read();
		match inner.chain_store.tip(chain) {
			Some(hash) => Ok(inner.block_store.get_header(&hash)?),
			None => Ok(None),
		}
	}

	/// Admits a new header. Extends candidate if it builds on the
	/// candidate tip; parks as an orphan-equivalent (an un-extending
	/// header is simply not indexed as a new tip) otherwise. Headers are
	/// not independently orphan-parked the way blocks are: a header with
	/// an unknown parent is rejected outright, since header sync always
	/// proceeds parent-first.
	pub fn add_header(&self, header: BlockHeader) -> Result<(), Error> {
		let mut inner = self.inner.write();
		pipe::process_header(&mut inner, &header)?;
		let batch = inner.block_store.batch()?;
		batch.save_header(&header)?;
		batch.commit()?;

		let candidate_tip = inner.candidate_tip.clone();
		if candidate_tip.map(|t| t.last_block_h) == Some(header.previous) {
			inner.candidate_tip = Some(Tip::from_header(&header));
			inner.chain_store.set_tip(ChainName::Candidate, header.hash())?;
		}
		Ok(())
	}

	/// Admits a full block: validates it on its own terms, then against
	/// chain state, parking it as an orphan if its parent is unknown and
	/// running the reorg pipeline if it overtakes the confirmed tip.
	pub fn add_block(&self, block: Block) -> Result<(), Error> {
		let mut inner = self.inner.write();
		Self::process_block_locked(&mut inner, block)
	}

	fn process_block_locked(inner: &mut Inner, block: Block) -> Result<(), Error> {
		let hash = block.header.hash();
		if inner.validated_cache.contains_key(&hash) {
			return Ok(());
		}

		if !inner.chain_store_contains(&block.header.previous) {
			inner.orphans.add(block);
			return Err(ErrorKind::OrphanBlock.into());
		}

		pipe::process_block(inner, block)?;
		let height = inner.chain_store.height_of(&hash)?;
		inner.validated_cache.insert(hash, height);

		if let Some(orphan) = inner.orphans.remove_by_previous(&hash) {
			let _ = Self::process_block_locked(inner, orphan);
		}
		Ok(())
	}

	/// Accepts an extracted TxHashSet archive directory bound to `header`,
	/// replacing the current set wholesale and fast-forwarding the
	/// confirmed tip to it. Entry point for fast sync.
	pub fn apply_txhashset_archive(&self, header: BlockHeader, path: &Path) -> Result<(), Error> {
		let mut inner = self.inner.write();
		let mut replacement = TxHashSet::open(path)?;
		replacement.validate(&header)?;

		inner.txhashset = replacement;
		let hash = header.hash();
		inner
			.chain_store
			.add_header(hash, Some(header.previous), header.pow.total_difficulty)?;
		inner.chain_store.set_tip(ChainName::Confirmed, hash)?;
		inner.confirmed_tip = Some(Tip::from_header(&header));
		inner.validated_cache.clear();
		Ok(())
	}

	/// Locates the first locator hash (checked in order, so callers should
	/// list them from their own tip backward) already present in the chain
	/// index, then returns up to `max` headers forward from there to the
	/// candidate tip, oldest first. Empty if none of the locator hashes are
	/// known, or if the match is already the candidate tip.
	pub fn locate_headers(&self, locator: &[Hash], max: usize) -> Result<Vec<BlockHeader>, Error> {
		let inner = self.inner.read();
		let candidate_tip = match inner.candidate_tip.as_ref() {
			Some(tip) => tip.last_block_h,
			None => return Ok(Vec::new()),
		};
		let known = locator.iter().find(|h| inner.chain_store.height_of(h).is_ok());
		let from = match known {
			Some(h) => *h,
			None => return Ok(Vec::new()),
		};
		let path = inner.chain_store.path_from_to(&from, &candidate_tip)?;
		path.into_iter()
			.take(max)
			.map(|h| {
				inner
					.block_store
					.get_header(&h)?
					.ok_or_else(|| Error::from(ErrorKind::StorageError("header missing for indexed hash".into())))
			})
			.collect()
	}

	/// Flushes the header MMR, chain store and TxHashSet, in that order,
	/// then records the confirmed tip as the recovery pivot. The database
	/// root this instance was opened against is where that tip pointer
	/// would live; writing it is left to the caller's store layer.
	pub fn flush_all(&self) -> Result<(), Error> {
		let mut inner = self.inner.write();
		inner.header_mmr.flush().map_err(ErrorKind::StorageError)?;
		inner.txhashset.commit()?;
		Ok(())
	}

	/// Root directory this instance was opened against.
	pub fn db_root(&self) -> &Path {
		&self.db_root
	}
}

impl Inner {
	fn chain_store_contains(&self, hash: &Hash) -> bool {
		self.chain_store.height_of(hash).is_ok()
	}
}
