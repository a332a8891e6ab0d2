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

//! Block header and full block types, plus the self-consistency checks a
//! block must pass before it is even looked up against chain state: the
//! body is internally sorted and cut through, every output's range proof
//! and every kernel's signature verifies, and the body's balance plus the
//! block reward and total fees sums to zero.

use failure_derive::Fail;

use crate::consensus::reward;
use crate::core::hash::{Hash, Hashed};
use crate::core::transaction::{
	kernel_signature_message, verify_kernel_sums, KernelFeatures, Output, OutputFeatures,
	TransactionBody, TransactionError, TransactionKernel,
};
use crate::crypto::{self, BlindingFactor, Commitment};
use crate::pow::{CuckooError, ProofOfWork};
use crate::ser::{Error as SerError, Readable, Reader, Writeable, Writer};

/// A block header: everything needed to verify proof-of-work and chain
/// every other header's roots without touching the block body itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
	/// Header format version, bumped on hard fork.
	pub version: u16,
	/// Height of this block, zero for genesis.
	pub height: u64,
	/// Hash of the previous block's header.
	pub previous: Hash,
	/// Root of the header MMR as of the previous header, letting any
	/// header prove its place in the chain without storing every
	/// ancestor.
	pub previous_root: Hash,
	/// Block timestamp, Unix seconds.
	pub timestamp: i64,
	/// Root of the output MMR after this block's outputs are applied.
	pub output_root: Hash,
	/// Root of the range proof MMR after this block's outputs are applied.
	pub range_proof_root: Hash,
	/// Root of the kernel MMR after this block's kernels are applied.
	pub kernel_root: Hash,
	/// Sum of every kernel offset up to and including this block, used to
	/// verify the full UTXO set balances without replaying every kernel.
	pub total_kernel_offset: BlindingFactor,
	/// Size of the output (and range proof) MMR after this block's
	/// outputs are applied, letting a header alone bound how far a
	/// TxHashSet rewind to it must truncate without consulting the block
	/// body.
	pub output_mmr_size: u64,
	/// Size of the kernel MMR after this block's kernels are applied.
	pub kernel_mmr_size: u64,
	/// Proof of work securing this header.
	pub pow: ProofOfWork,
}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: 1,
			height: 0,
			previous: Hash::default(),
			previous_root: Hash::default(),
			timestamp: 0,
			output_root: Hash::default(),
			range_proof_root: Hash::default(),
			kernel_root: Hash::default(),
			total_kernel_offset: BlindingFactor::zero(),
			output_mmr_size: 0,
			kernel_mmr_size: 0,
			pow: ProofOfWork {
				total_difficulty: crate::pow::Difficulty::min(),
				difficulty: crate::pow::Difficulty::min(),
				nonce: 0,
				proof: crate::pow::Proof {
					edge_bits: 0,
					nonces: Vec::new(),
				},
			},
		}
	}
}

impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_u16(self.version)?;
		writer.write_u64(self.height)?;
		self.previous.write(writer)?;
		self.previous_root.write(writer)?;
		writer.write_u64(self.timestamp as u64)?;
		self.output_root.write(writer)?;
		self.range_proof_root.write(writer)?;
		self.kernel_root.write(writer)?;
		self.total_kernel_offset.write(writer)?;
		writer.write_u64(self.output_mmr_size)?;
		writer.write_u64(self.kernel_mmr_size)?;
		self.pow.write(writer)
	}
}

impl Readable for BlockHeader {
	fn read(reader: &mut dyn Reader) -> Result<BlockHeader, SerError> {
		Ok(BlockHeader {
			version: reader.read_u16()?,
			height: reader.read_u64()?,
			previous: Hash::read(reader)?,
			previous_root: Hash::read(reader)?,
			timestamp: reader.read_u64()? as i64,
			output_root: Hash::read(reader)?,
			range_proof_root: Hash::read(reader)?,
			kernel_root: Hash::read(reader)?,
			total_kernel_offset: BlindingFactor::read(reader)?,
			output_mmr_size: reader.read_u64()?,
			kernel_mmr_size: reader.read_u64()?,
			pow: ProofOfWork::read(reader)?,
		})
	}
}

impl BlockHeader {
	/// The hash of the header with its proof-of-work nonce and proof
	/// fields excluded, the value Cuckoo Cycle edges are actually derived
	/// from (the proof itself can't be part of its own seed).
	pub fn pre_pow_hash(&self) -> Hash {
		let mut stripped = self.clone();
		stripped.pow.nonce = 0;
		stripped.pow.proof = crate::pow::Proof {
			edge_bits: 0,
			nonces: Vec::new(),
		};
		stripped.hash()
	}

	/// Verifies this header's proof of work against its own pre-pow hash.
	pub fn verify_pow(&self) -> Result<(), CuckooError> {
		self.pow.verify(&self.pre_pow_hash())
	}
}

/// A full block: a header plus the aggregated, cut-through body of every
/// transaction it includes, plus an implicit coinbase output and kernel
/// paying the miner the block reward and collected fees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
	/// This block's header.
	pub header: BlockHeader,
	/// Aggregated transaction body: every non-coinbase input, output and
	/// kernel plus the coinbase output and kernel, sorted and cut
	/// through.
	pub body: TransactionBody,
}

/// Errors that make a block invalid on its own terms, before it is ever
/// checked against chain state.
#[derive(Clone, Debug, Eq, PartialEq, Fail)]
pub enum BlockError {
	/// The body failed one of its internal consistency checks.
	#[fail(display = "invalid transaction body: {}", _0)]
	Transaction(TransactionError),
	/// The block's proof of work did not verify.
	#[fail(display = "invalid proof of work: {}", _0)]
	InvalidPow(CuckooError),
	/// The block carries no coinbase output, or more than one.
	#[fail(display = "coinbase output missing or duplicated")]
	CoinbaseCount,
	/// The block carries no coinbase kernel, or more than one.
	#[fail(display = "coinbase kernel missing or duplicated")]
	CoinbaseKernelCount,
	/// A kernel's lock height is higher than the block's own height.
	#[fail(display = "kernel lock height {} exceeds block height {}", _0, _1)]
	KernelLockHeight(u64, u64),
}

impl From<TransactionError> for BlockError {
	fn from(e: TransactionError) -> BlockError {
		BlockError::Transaction(e)
	}
}

/// Computes `header_offset*G - previous_offset*G` as a single commitment,
/// or `None` if both are the zero scalar (true for every header until one
/// actually carries a non-trivial offset). Implemented as a difference of
/// commitments rather than a difference of scalars, since `BlindingFactor`
/// exposes no scalar arithmetic.
fn net_offset_commitment(
	header_offset: &BlindingFactor,
	previous_offset: &BlindingFactor,
) -> Result<Option<Commitment>, TransactionError> {
	if header_offset.is_zero() && previous_offset.is_zero() {
		return Ok(None);
	}
	let mut positive = Vec::new();
	let mut negative = Vec::new();
	if !header_offset.is_zero() {
		positive.push(crypto::offset_commitment(header_offset).map_err(|_| TransactionError::KernelSumMismatch)?);
	}
	if !previous_offset.is_zero() {
		negative.push(crypto::offset_commitment(previous_offset).map_err(|_| TransactionError::KernelSumMismatch)?);
	}
	Commitment::sum(&positive, &negative)
		.map(Some)
		.map_err(|_| TransactionError::KernelSumMismatch)
}

impl Block {
	/// Checks this block is internally consistent, independent of any
	/// chain state: body sort order, cryptographic verification of every
	/// output and kernel, coinbase shape, lock heights, and that the
	/// whole body balances once the block reward and total fees are
	/// folded in. Does not check this header's cumulative kernel offset
	/// against its parent's — that needs chain state and is
	/// [`Block::verify_kernel_sums_against_chain`]'s job instead. This is
	/// the full extent of "is this block well-formed" and is always safe
	/// to run before the block's parent is even known.
	pub fn validate(&self) -> Result<(), BlockError> {
		self.body.verify_sorted()?;
		self.body.verify_cryptographic()?;
		self.verify_coinbase()?;
		self.verify_kernel_lock_heights()?;
		self.verify_kernel_sums()?;
		Ok(())
	}

	fn verify_coinbase(&self) -> Result<(), BlockError> {
		let coinbase_outputs = self
			.body
			.outputs
			.iter()
			.filter(|o| matches!(o.features, OutputFeatures::Coinbase))
			.count();
		if coinbase_outputs != 1 {
			return Err(BlockError::CoinbaseCount);
		}
		let coinbase_kernels = self
			.body
			.kernels
			.iter()
			.filter(|k| k.features.is_coinbase())
			.count();
		if coinbase_kernels != 1 {
			return Err(BlockError::CoinbaseKernelCount);
		}
		Ok(())
	}

	fn verify_kernel_lock_heights(&self) -> Result<(), BlockError> {
		for kernel in &self.body.kernels {
			let lock_height = kernel.features.lock_height();
			if lock_height > self.header.height {
				return Err(BlockError::KernelLockHeight(lock_height, self.header.height));
			}
		}
		Ok(())
	}

	/// The overage this block's coinbase claims: the reward due at this
	/// height plus every non-coinbase kernel's declared fee. Positive
	/// because the block is *creating* value (the output side of the
	/// balance equation is larger by this much).
	fn overage(&self) -> i64 {
		let fees: u64 = self
			.body
			.kernels
			.iter()
			.filter(|k| !k.features.is_coinbase())
			.map(|k| k.features.fee())
			.sum();
		(reward(self.header.height) + fees) as i64
	}

	fn verify_kernel_sums(&self) -> Result<(), BlockError> {
		verify_kernel_sums(&self.body, self.overage(), None).map_err(BlockError::from)
	}

	/// Verifies the body balances against the block reward, total fees,
	/// and the cumulative kernel offset this header carries forward from
	/// `previous_offset`. Needs `previous_offset` from chain state, so
	/// this is a separate check from [`Block::validate`] and runs once
	/// the block's parent header is known.
	pub fn verify_kernel_sums_against_chain(&self, previous_offset: &BlindingFactor) -> Result<(), BlockError> {
		let offset_commit = net_offset_commitment(&self.header.total_kernel_offset, previous_offset)?;
		verify_kernel_sums(&self.body, self.overage(), offset_commit.as_ref()).map_err(BlockError::from)
	}

	/// Builds the signed message the coinbase kernel's signature must
	/// cover, same shape as any other kernel.
	pub fn coinbase_kernel_message(&self) -> [u8; 32] {
		kernel_signature_message(&KernelFeatures::Coinbase)
	}

	/// Folds this block's coinbase output's commitment with the reward
	/// value commitment, used by callers that need to check the coinbase
	/// output's value matches the reward without ever learning its
	/// blinding factor.
	pub fn coinbase_output(&self) -> Option<&Output> {
		self.body.outputs.iter().find(|o| o.is_coinbase())
	}

	/// Coinbase kernel, if present.
	pub fn coinbase_kernel(&self) -> Option<&TransactionKernel> {
		self.body.kernels.iter().find(|k| k.features.is_coinbase())
	}

	/// Value commitment for this block's reward, for comparison against
	/// the coinbase output's commitment net of its own blinding factor
	/// during full UTXO-sum validation.
	pub fn reward_commitment(&self) -> Commitment {
		crate::crypto::value_commitment(reward(self.header.height))
	}
}

impl Writeable for Block {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		self.header.write(writer)?;
		self.body.write(writer)
	}
}

impl Readable for Block {
	fn read(reader: &mut dyn Reader) -> Result<Block, SerError> {
		Ok(Block {
			header: BlockHeader::read(reader)?,
			body: TransactionBody::read(reader)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_block_fails_coinbase_check() {
		let block = Block::default();
		assert_eq!(block.validate(), Err(BlockError::CoinbaseCount));
	}

	#[test]
	fn pre_pow_hash_ignores_proof_fields() {
		let mut header = BlockHeader::default();
		let base = header.pre_pow_hash();
		header.pow.nonce = 12345;
		assert_eq!(header.pre_pow_hash(), base);
	}

	#[test]
	fn net_offset_commitment_none_when_both_zero() {
		let zero = BlindingFactor::zero();
		assert_eq!(net_offset_commitment(&zero, &zero).unwrap(), None);
	}

	#[test]
	fn net_offset_commitment_present_when_offsets_differ() {
		let mut bytes = [0u8; 32];
		bytes[31] = 1;
		let header_offset = BlindingFactor::from_bytes(&bytes).unwrap();
		let previous_offset = BlindingFactor::zero();
		let net = net_offset_commitment(&header_offset, &previous_offset).unwrap();
		assert!(net.is_some());
	}
}
