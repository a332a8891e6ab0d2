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

//! The aggregate UTXO state: three MMRs (outputs, range proofs, kernels)
//! plus a bitmap of which output leaf positions have been spent. A
//! [`Block`]'s body is applied against this set; the roots that result
//! must match the block's header exactly or the whole apply rolls back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use croaring::Bitmap;
use log::debug;

use mw_core::consensus::reward;
use mw_core::core::hash::Hash;
use mw_core::core::pmmr::{Backend, PMMR};
use mw_core::core::transaction::kernel_signature_message;
use mw_core::core::{Block, BlockHeader, Output, TransactionKernel};
use mw_core::crypto::{offset_commitment, value_commitment, Commitment};
use mw_store::PMMRBackend;

use crate::error::{Error, ErrorKind};

/// An output retained alongside its MMR leaf position, so the full set
/// can be walked for validation, not just looked up by commitment.
#[derive(Clone)]
struct OutputEntry {
	pos: u64,
	output: Output,
}

/// Sizes of the three MMRs at some point in the set's history, enough to
/// roll back to or compare against a header's recorded sizes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Sizes {
	output: u64,
	rproof: u64,
	kernel: u64,
}

/// Snapshot of the spent bitmap and MMR sizes as of a committed block,
/// kept so [`TxHashSet::rewind`] can restore exactly this state during a
/// reorg without replaying every block from genesis.
#[derive(Clone)]
struct Checkpoint {
	sizes: Sizes,
	spent_bitmap: Bitmap,
	commit_index: HashMap<Vec<u8>, OutputEntry>,
	kernels: Vec<TransactionKernel>,
}

/// The aggregate commitment state: output, range proof and kernel MMRs,
/// the bitmap of spent output positions, an index from output commitment
/// to its MMR leaf position and full output (rebuilt from the output MMR
/// on open; not persisted independently), and every kernel ever applied,
/// needed to walk the full unspent set and its kernel excesses for
/// validation.
pub struct TxHashSet {
	output_pmmr_h: PMMRBackend,
	rproof_pmmr_h: PMMRBackend,
	kernel_pmmr_h: PMMRBackend,
	spent_bitmap: Bitmap,
	commit_index: HashMap<Vec<u8>, OutputEntry>,
	kernels: Vec<TransactionKernel>,
	checkpoints: HashMap<Hash, Checkpoint>,
}

impl TxHashSet {
	/// Opens (creating if necessary) the three MMRs rooted under
	/// `root_path`, matching the on-disk layout
	/// `txhashset/{output,rangeproof,kernel}/`.
	pub fn open<P: AsRef<Path>>(root_path: P) -> Result<TxHashSet, Error> {
		let root = root_path.as_ref();
		let output_pmmr_h =
			PMMRBackend::open(output_dir(root)).map_err(|e| ErrorKind::StorageError(e))?;
		let rproof_pmmr_h =
			PMMRBackend::open(rproof_dir(root)).map_err(|e| ErrorKind::StorageError(e))?;
		let kernel_pmmr_h =
			PMMRBackend::open(kernel_dir(root)).map_err(|e| ErrorKind::StorageError(e))?;
		Ok(TxHashSet {
			output_pmmr_h,
			rproof_pmmr_h,
			kernel_pmmr_h,
			spent_bitmap: Bitmap::create(),
			commit_index: HashMap::new(),
			kernels: Vec::new(),
			checkpoints: HashMap::new(),
		})
	}

	fn sizes(&self) -> Sizes {
		Sizes {
			output: self.output_pmmr_h.unpruned_size(),
			rproof: self.rproof_pmmr_h.unpruned_size(),
			kernel: self.kernel_pmmr_h.unpruned_size(),
		}
	}

	/// Applies a block's body to the set: marks spent inputs, appends new
	/// outputs/proofs/kernels, then checks the resulting roots against
	/// the header. On any failure the three MMRs and the bitmap are
	/// rewound back to their pre-apply sizes before the error is
	/// returned, so a failed apply never leaves partial state behind.
	pub fn apply_block(&mut self, block: &Block) -> Result<(), Error> {
		let pre = self.sizes();
		let pre_bitmap = self.spent_bitmap.clone();
		let pre_commit_index = self.commit_index.clone();
		let pre_kernels_len = self.kernels.len();

		if let Err(e) = self.apply_block_inner(block) {
			self.rewind_to_sizes(pre).ok();
			self.spent_bitmap = pre_bitmap;
			self.commit_index = pre_commit_index;
			self.kernels.truncate(pre_kernels_len);
			return Err(e);
		}

		let header = &block.header;
		let roots_match = self.output_pmmr_h_root()? == header.output_root
			&& self.rproof_pmmr_h_root()? == header.range_proof_root
			&& self.kernel_pmmr_h_root()? == header.kernel_root;

		if !roots_match {
			self.rewind_to_sizes(pre).ok();
			self.spent_bitmap = pre_bitmap;
			self.commit_index = pre_commit_index;
			self.kernels.truncate(pre_kernels_len);
			return Err(ErrorKind::RootMismatch.into());
		}

		self.checkpoints.insert(
			header.hash(),
			Checkpoint {
				sizes: self.sizes(),
				spent_bitmap: self.spent_bitmap.clone(),
				commit_index: self.commit_index.clone(),
				kernels: self.kernels.clone(),
			},
		);
		Ok(())
	}

	fn apply_block_inner(&mut self, block: &Block) -> Result<(), Error> {
		for input in &block.body.inputs {
			let key = input.commit.as_bytes().to_vec();
			let pos = self
				.commit_index
				.get(&key)
				.ok_or_else(|| Error::from(ErrorKind::InvalidBlock("output not found".into())))?
				.pos;
			if self.spent_bitmap.contains(pos as u32) {
				return Err(ErrorKind::InvalidBlock("output already spent".into()).into());
			}
			self.spent_bitmap.add(pos as u32);
		}

		for output in &block.body.outputs {
			let pos = {
				let mut pmmr = PMMR::new(&mut self.output_pmmr_h);
				pmmr.push(&output.commit).map_err(ErrorKind::InvalidBlock)?
			};
			{
				let mut pmmr = PMMR::new(&mut self.rproof_pmmr_h);
				pmmr.push(&output.proof).map_err(ErrorKind::InvalidBlock)?;
			}
			self.commit_index.insert(
				output.commit.as_bytes().to_vec(),
				OutputEntry {
					pos,
					output: output.clone(),
				},
			);
		}

		for kernel in &block.body.kernels {
			let mut pmmr = PMMR::new(&mut self.kernel_pmmr_h);
			pmmr.push(kernel).map_err(ErrorKind::InvalidBlock)?;
			self.kernels.push(kernel.clone());
		}

		Ok(())
	}

	/// Rewinds the set back to the state recorded at `header`, restoring
	/// the checkpointed spent bitmap and truncating all three MMRs to the
	/// sizes `header` itself records. Used by the reorg pipeline to
	/// return to the fork point before replaying the winning branch.
	pub fn rewind(&mut self, header: &BlockHeader) -> Result<(), Error> {
		let sizes = Sizes {
			output: header.output_mmr_size,
			rproof: header.output_mmr_size,
			kernel: header.kernel_mmr_size,
		};
		self.rewind_to_sizes(sizes)?;
		if let Some(checkpoint) = self.checkpoints.get(&header.hash()) {
			self.spent_bitmap = checkpoint.spent_bitmap.clone();
			self.commit_index = checkpoint.commit_index.clone();
			self.kernels = checkpoint.kernels.clone();
		}
		debug!(
			"txhashset: rewound to header {} (output/rproof size {}, kernel size {})",
			header.hash(),
			sizes.output,
			sizes.kernel
		);
		Ok(())
	}

	fn rewind_to_sizes(&mut self, sizes: Sizes) -> Result<(), Error> {
		PMMR::new(&mut self.output_pmmr_h)
			.rewind(sizes.output)
			.map_err(ErrorKind::StorageError)?;
		PMMR::new(&mut self.rproof_pmmr_h)
			.rewind(sizes.rproof)
			.map_err(ErrorKind::StorageError)?;
		PMMR::new(&mut self.kernel_pmmr_h)
			.rewind(sizes.kernel)
			.map_err(ErrorKind::StorageError)?;
		Ok(())
	}

	/// Flushes all three MMRs durably; the caller (`ChainState`) is
	/// responsible for writing the tip pointer last, after this returns.
	pub fn commit(&mut self) -> Result<(), Error> {
		self.output_pmmr_h.flush().map_err(ErrorKind::StorageError)?;
		self.rproof_pmmr_h.flush().map_err(ErrorKind::StorageError)?;
		self.kernel_pmmr_h.flush().map_err(ErrorKind::StorageError)?;
		Ok(())
	}

	/// Discards uncommitted appends across all three MMRs.
	pub fn discard(&mut self) {
		self.output_pmmr_h.discard();
		self.rproof_pmmr_h.discard();
		self.kernel_pmmr_h.discard();
	}

	/// Validates this set against `header`: MMR sizes and roots match,
	/// every unspent output's range proof verifies, every kernel's
	/// signature verifies, and the unspent outputs balance against the
	/// kernel excesses once the cumulative coinbase subsidy and kernel
	/// offset are folded in: `sum(unspent outputs) == sum(kernel
	/// excesses) + subsidy*H + total_kernel_offset*G`. Returns the two
	/// sums so a caller building on top of an accepted archive (fast
	/// sync) can fold them into further checks without re-walking the
	/// set. Doesn't mutate any MMR content, but needs `&mut self` the
	/// same way the root helpers below do: computing a root goes through
	/// `PMMR::new`, which borrows its backend mutably.
	pub fn validate(&mut self, header: &BlockHeader) -> Result<(Commitment, Commitment), Error> {
		if self.output_pmmr_h.unpruned_size() != header.output_mmr_size
			|| self.kernel_pmmr_h.unpruned_size() != header.kernel_mmr_size
		{
			return Err(ErrorKind::RootMismatch.into());
		}
		if self.output_pmmr_h_root()? != header.output_root
			|| self.rproof_pmmr_h_root()? != header.range_proof_root
			|| self.kernel_pmmr_h_root()? != header.kernel_root
		{
			return Err(ErrorKind::RootMismatch.into());
		}

		let mut unspent_commits = Vec::new();
		for (pos, output) in self.unspent_outputs() {
			if self.spent_bitmap.contains(pos as u32) {
				continue;
			}
			if !output.verify_proof() {
				return Err(ErrorKind::InvalidBlock("range proof failed validation".into()).into());
			}
			unspent_commits.push(output.commit.clone());
		}
		let output_sum =
			Commitment::sum(&unspent_commits, &[]).map_err(|_| ErrorKind::InvalidBlock("output sum".into()))?;

		let mut kernel_excesses = Vec::new();
		for kernel in &self.kernels {
			let msg = kernel_signature_message(&kernel.features);
			if !kernel.excess_sig.verify(&msg, &kernel.excess) {
				return Err(ErrorKind::InvalidBlock("kernel signature failed validation".into()).into());
			}
			kernel_excesses.push(kernel.excess.clone());
		}
		let kernel_sum =
			Commitment::sum(&kernel_excesses, &[]).map_err(|_| ErrorKind::InvalidBlock("kernel sum".into()))?;

		let mut adjusted = vec![kernel_sum.clone()];
		let subsidy = total_subsidy(header.height);
		if subsidy > 0 {
			adjusted.push(value_commitment(subsidy));
		}
		if !header.total_kernel_offset.is_zero() {
			adjusted.push(
				offset_commitment(&header.total_kernel_offset)
					.map_err(|_| ErrorKind::InvalidBlock("invalid kernel offset".into()))?,
			);
		}
		let adjusted_kernel_sum =
			Commitment::sum(&adjusted, &[]).map_err(|_| ErrorKind::InvalidBlock("kernel sum".into()))?;

		if output_sum != adjusted_kernel_sum {
			return Err(ErrorKind::InvalidBlock("unspent outputs do not balance against kernel excesses".into()).into());
		}

		Ok((output_sum, kernel_sum))
	}

	fn unspent_outputs(&self) -> Vec<(u64, Output)> {
		self.commit_index
			.values()
			.map(|entry| (entry.pos, entry.output.clone()))
			.collect()
	}

	fn output_pmmr_h_root(&mut self) -> Result<Hash, Error> {
		PMMR::new(&mut self.output_pmmr_h).root().map_err(|e| ErrorKind::StorageError(e).into())
	}

	fn rproof_pmmr_h_root(&mut self) -> Result<Hash, Error> {
		PMMR::new(&mut self.rproof_pmmr_h).root().map_err(|e| ErrorKind::StorageError(e).into())
	}

	fn kernel_pmmr_h_root(&mut self) -> Result<Hash, Error> {
		PMMR::new(&mut self.kernel_pmmr_h).root().map_err(|e| ErrorKind::StorageError(e).into())
	}
}

/// Total coinbase reward minted from genesis (which carries none) up to
/// and including `height`: one reward per block at heights `1..=height`.
fn total_subsidy(height: u64) -> u64 {
	(1..=height).map(reward).sum()
}

fn output_dir(root: &Path) -> PathBuf {
	root.join("output")
}

fn rproof_dir(root: &Path) -> PathBuf {
	root.join("rangeproof")
}

fn kernel_dir(root: &Path) -> PathBuf {
	root.join("kernel")
}

#[cfg(test)]
mod tests {
	use super::*;
	use mw_core::core::{BlockHeader, Output, OutputFeatures, TransactionBody};
	use mw_core::crypto::{Commitment, RangeProof};
	use std::fs;

	fn temp_root(name: &str) -> PathBuf {
		let mut p = std::env::temp_dir();
		p.push(format!("mw_chain_txhashset_test_{}_{}", name, std::process::id()));
		let _ = fs::remove_dir_all(&p);
		fs::create_dir_all(&p).unwrap();
		p
	}

	fn output(tag: u8) -> Output {
		let mut commit_bytes = [0u8; 33];
		commit_bytes[0] = tag;
		Output {
			features: OutputFeatures::Plain,
			commit: Commitment::from_bytes(&commit_bytes).unwrap(),
			proof: RangeProof::from_bytes(&[tag; 8]).unwrap(),
		}
	}

	#[test]
	fn apply_empty_block_matches_zero_roots() {
		let root = temp_root("empty_block");
		let mut set = TxHashSet::open(&root).unwrap();
		let block = Block::default();
		// An all-default header has zero roots; applying an empty body
		// should leave every MMR empty and hence matching.
		assert!(set.apply_block(&block).is_ok());
		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn mismatched_roots_roll_back_to_pre_apply_size() {
		let root = temp_root("root_mismatch");
		let mut set = TxHashSet::open(&root).unwrap();

		let block = Block {
			header: BlockHeader::default(),
			body: TransactionBody {
				inputs: Vec::new(),
				outputs: vec![output(1)],
				kernels: Vec::new(),
			},
		};

		// header carries all-zero roots, which can't match once a real
		// output has been pushed into the MMRs.
		let result = set.apply_block(&block);
		assert!(result.is_err());
		assert_eq!(set.output_pmmr_h.unpruned_size(), 0);
		assert_eq!(set.commit_index.len(), 0);
		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn spending_unknown_output_is_rejected() {
		let root = temp_root("unknown_spend");
		let mut set = TxHashSet::open(&root).unwrap();

		let mut header = BlockHeader::default();
		header.height = 1;
		let block = Block {
			header,
			body: TransactionBody {
				inputs: vec![mw_core::core::Input {
					commit: output(7).commit,
				}],
				outputs: Vec::new(),
				kernels: Vec::new(),
			},
		};

		assert!(set.apply_block(&block).is_err());
		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn failed_apply_preserves_earlier_commit_index_entries() {
		// Learn the roots a single-output block produces by applying it
		// in a throwaway set first, so the real run below has a header
		// apply_block will actually accept.
		let probe_root = temp_root("preserve_commit_index_probe");
		let mut probe = TxHashSet::open(&probe_root).unwrap();
		let block1_body = TransactionBody {
			inputs: Vec::new(),
			outputs: vec![output(1)],
			kernels: Vec::new(),
		};
		probe
			.apply_block_inner(&Block {
				header: BlockHeader::default(),
				body: block1_body.clone(),
			})
			.unwrap();
		let mut header1 = BlockHeader::default();
		header1.output_root = probe.output_pmmr_h_root().unwrap();
		header1.range_proof_root = probe.rproof_pmmr_h_root().unwrap();
		header1.kernel_root = probe.kernel_pmmr_h_root().unwrap();
		header1.output_mmr_size = probe.sizes().output;
		header1.kernel_mmr_size = probe.sizes().kernel;
		fs::remove_dir_all(&probe_root).unwrap();

		let root = temp_root("preserve_commit_index");
		let mut set = TxHashSet::open(&root).unwrap();
		let block1 = Block {
			header: header1,
			body: block1_body,
		};
		assert!(set.apply_block(&block1).is_ok());
		assert_eq!(set.commit_index.len(), 1);

		// A second, bad block (all-zero roots, which can't match once
		// another real output is pushed) must roll back to the set's
		// state after block1, not to an empty one.
		let block2 = Block {
			header: BlockHeader::default(),
			body: TransactionBody {
				inputs: Vec::new(),
				outputs: vec![output(2)],
				kernels: Vec::new(),
			},
		};
		assert!(set.apply_block(&block2).is_err());
		assert_eq!(set.commit_index.len(), 1);
		assert!(set.commit_index.contains_key(output(1).commit.as_bytes()));

		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn validate_rejects_header_with_wrong_sizes() {
		let root = temp_root("validate_size_mismatch");
		let mut set = TxHashSet::open(&root).unwrap();
		let mut header = BlockHeader::default();
		header.output_mmr_size = 5;
		assert!(set.validate(&header).is_err());
		fs::remove_dir_all(&root).unwrap();
	}

	#[test]
	fn validate_walks_unspent_outputs_and_rejects_bad_proof() {
		let root = temp_root("validate_bad_proof");
		let mut set = TxHashSet::open(&root).unwrap();
		let block = Block {
			header: BlockHeader::default(),
			body: TransactionBody {
				inputs: Vec::new(),
				outputs: vec![output(1)],
				kernels: Vec::new(),
			},
		};
		set.apply_block_inner(&block).unwrap();

		let mut header = BlockHeader::default();
		header.output_root = set.output_pmmr_h_root().unwrap();
		header.range_proof_root = set.rproof_pmmr_h_root().unwrap();
		header.kernel_root = set.kernel_pmmr_h_root().unwrap();
		header.output_mmr_size = set.sizes().output;
		header.kernel_mmr_size = set.sizes().kernel;

		// Roots and sizes now match, so validate() reaches the per-output
		// walk; output(1)'s proof is a synthetic 8-byte blob rather than a
		// real bulletproof, so it must fail there instead of reporting
		// success the way it would if unspent_outputs() were still empty.
		let result = set.validate(&header);
		assert!(result.is_err());
		fs::remove_dir_all(&root).unwrap();
	}
}
