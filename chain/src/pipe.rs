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

//! The header and block admission pipeline: stateless self-consistency
//! checks, then the checks that need chain state, then (for blocks that
//! overtake the confirmed tip from a side branch) the reorg protocol that
//! rewinds and replays the TxHashSet onto the winning fork.

use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use mw_core::consensus::MAX_FUTURE_SECS;
use mw_core::core::hash::{Hash, Hashed};
use mw_core::core::pmmr::PMMR;
use mw_core::core::{Block, BlockHeader};
use mw_core::pow::Difficulty;
use mw_store::ChainName;

use crate::chain_state::Inner;
use crate::error::{Error, ErrorKind};

fn now_secs() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

/// Trailing window of `(timestamp, difficulty)` pairs ending at `hash`,
/// oldest first, used to recompute the expected next difficulty. Walks
/// back through the block store via the chain index's parent pointers.
fn difficulty_window(inner: &Inner, hash: &Hash) -> Result<Vec<(u64, Difficulty)>, Error> {
	let mut window = Vec::new();
	let mut current = Some(*hash);
	while let Some(h) = current {
		if window.len() as u64 >= Difficulty::adjustment_window() + 1 {
			break;
		}
		let header = match inner.block_store.get_header(&h)? {
			Some(header) => header,
			None => break,
		};
		window.push((header.timestamp as u64, header.pow.difficulty));
		current = inner.chain_store.parent_of(&h).ok().flatten();
	}
	window.reverse();
	Ok(window)
}

/// Checks a header against its parent and the chain index: timestamp
/// advances and isn't claimed from the future, proof of work verifies,
/// total difficulty increases, and (once enough history exists) the
/// difficulty matches the retarget formula. Pure validation; registers
/// nothing.
fn validate_header(inner: &Inner, header: &BlockHeader) -> Result<(), Error> {
	let parent = inner
		.block_store
		.get_header(&header.previous)?
		.ok_or_else(|| ErrorKind::InvalidHeader("parent header not found".into()))?;

	if header.timestamp <= parent.timestamp {
		return Err(ErrorKind::InvalidHeader("timestamp does not advance".into()).into());
	}
	if header.timestamp > now_secs() + MAX_FUTURE_SECS as i64 {
		return Err(ErrorKind::InvalidHeader("timestamp too far in the future".into()).into());
	}

	header
		.verify_pow()
		.map_err(|e| ErrorKind::InvalidHeader(format!("proof of work: {:?}", e)))?;

	let parent_total_difficulty = inner.chain_store.total_difficulty_of(&header.previous)?;
	if header.pow.total_difficulty <= parent_total_difficulty {
		return Err(ErrorKind::InvalidHeader("total difficulty does not increase".into()).into());
	}

	let window = difficulty_window(inner, &header.previous)?;
	if window.len() >= 2 {
		let expected = Difficulty::next_difficulty(&window);
		if header.pow.difficulty != expected {
			return Err(ErrorKind::InvalidHeader("difficulty does not match retarget".into()).into());
		}
	}
	Ok(())
}

/// Validates a header, then registers it: appends to the header MMR and
/// indexes it in the chain store.
fn register_header(inner: &mut Inner, header: &BlockHeader) -> Result<(), Error> {
	validate_header(inner, header)?;
	inner
		.chain_store
		.add_header(header.hash(), Some(header.previous), header.pow.total_difficulty)?;
	{
		let mut pmmr = PMMR::new(&mut inner.header_mmr);
		pmmr.push(header).map_err(ErrorKind::StorageError)?;
	}
	Ok(())
}

/// Validates a header against its parent and the chain index, then
/// registers it. Does not move any chain tip; that is the caller's
/// decision, based on whether the header extends the candidate chain.
pub fn process_header(inner: &mut Inner, header: &BlockHeader) -> Result<(), Error> {
	register_header(inner, header)
}

/// Admits a full block. If its header has not already been registered
/// through [`process_header`] (the body arrived before or alongside the
/// header, rather than via headers-first sync), it is validated and
/// registered here first. Also checks the block's balance against its
/// parent's cumulative kernel offset, the one part of `Block::validate`
/// that needs chain state and so can't run stand-alone. Extends the
/// confirmed chain directly if the block's parent is the current
/// confirmed tip; otherwise treats it as a candidate branch and triggers
/// a reorg if it now carries more total difficulty.
pub fn process_block(inner: &mut Inner, block: Block) -> Result<(), Error> {
	block.validate()?;

	let previous = inner
		.block_store
		.get_header(&block.header.previous)?
		.ok_or_else(|| ErrorKind::InvalidBlock("parent header not found".into()))?;
	block.verify_kernel_sums_against_chain(&previous.total_kernel_offset)?;

	let hash = block.header.hash();
	if inner.chain_store.parent_of(&hash).is_err() {
		register_header(inner, &block.header)?;
	}

	{
		let batch = inner.block_store.batch()?;
		batch.save_header(&block.header)?;
		batch.save_block(&block)?;
		batch.commit()?;
	}

	let extends_confirmed = inner
		.confirmed_tip
		.as_ref()
		.map(|t| t.last_block_h == block.header.previous)
		.unwrap_or(false);

	if extends_confirmed {
		inner.txhashset.apply_block(&block)?;
		inner.chain_store.set_tip(ChainName::Confirmed, hash)?;
		inner.confirmed_tip = Some(crate::types::Tip::from_header(&block.header));
		if inner
			.candidate_tip
			.as_ref()
			.map(|t| t.total_difficulty < block.header.pow.total_difficulty)
			.unwrap_or(true)
		{
			inner.chain_store.set_tip(ChainName::Candidate, hash)?;
			inner.candidate_tip = Some(crate::types::Tip::from_header(&block.header));
		}
		return Ok(());
	}

	let confirmed_difficulty = inner
		.confirmed_tip
		.as_ref()
		.map(|t| t.total_difficulty)
		.unwrap_or(Difficulty::min());

	if block.header.pow.total_difficulty > confirmed_difficulty {
		reorg(inner, &hash)?;
	}
	Ok(())
}

/// Rewinds the confirmed chain back to its common ancestor with
/// `new_tip` and replays every block on `new_tip`'s branch back onto the
/// TxHashSet. On any replay failure the TxHashSet is left exactly as it
/// was before the reorg began; the confirmed chain is not moved.
fn reorg(inner: &mut Inner, new_tip: &Hash) -> Result<(), Error> {
	let confirmed_tip = inner
		.confirmed_tip
		.as_ref()
		.ok_or_else(|| Error::from(ErrorKind::GenesisRequired))?
		.last_block_h;

	let fork_hash = inner.chain_store.fork_point(&confirmed_tip, new_tip)?;
	let path = inner.chain_store.path_from_to(&fork_hash, new_tip)?;

	let pre_reorg_tip = inner.confirmed_tip.clone();

	let fork_header = inner
		.block_store
		.get_header(&fork_hash)?
		.ok_or_else(|| ErrorKind::StorageError("fork header missing".into()))?;
	inner.txhashset.rewind(&fork_header)?;

	for block_hash in &path {
		let block = inner
			.block_store
			.get_block(block_hash)?
			.ok_or_else(|| ErrorKind::StorageError("candidate block body missing".into()))?;
		if let Err(e) = inner.txhashset.apply_block(&block) {
			// Replay failed partway through; restore the TxHashSet to
			// the tip it had before this reorg was attempted at all.
			if let Some(tip) = pre_reorg_tip {
				if let Some(header) = inner.block_store.get_header(&tip.last_block_h)? {
					inner.txhashset.rewind(&header).ok();
				}
			}
			return Err(e);
		}
	}

	inner.chain_store.set_tip(ChainName::Confirmed, *new_tip)?;
	let new_header = inner
		.block_store
		.get_header(new_tip)?
		.ok_or_else(|| ErrorKind::StorageError("new tip header missing".into()))?;
	inner.confirmed_tip = Some(crate::types::Tip::from_header(&new_header));
	inner.txhashset.commit()?;

	info!(
		"pipe: reorg complete, confirmed tip now {} at height {}",
		new_tip, new_header.height
	);
	Ok(())
}
