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

//! Transaction data model: inputs, outputs and kernels, all referencing
//! value only through Pedersen commitments, plus the balance check that
//! ties them together. A MimbleWimble transaction has no script and no
//! addresses; it is a set of commitments that sums to zero once kernel
//! excesses are folded in.

use std::convert::TryInto;

use failure_derive::Fail;

use crate::consensus::MAX_IN_OUT_LEN;
use crate::crypto::{BlindingFactor, Commitment, RangeProof, Signature};
use crate::ser::{Error as SerError, Readable, Reader, Writeable, Writer};

/// Features bit carried by every kernel, distinguishing an ordinary
/// payment from a coinbase reward kernel and carrying an optional lock
/// height for time-locked kernels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelFeatures {
	/// Plain kernel, fee paid, no lock height.
	Plain {
		/// Fee paid by the owning transaction.
		fee: u64,
	},
	/// Coinbase kernel, no fee, matures after `COINBASE_MATURITY` blocks.
	Coinbase,
	/// Plain kernel that cannot be included in a block below `lock_height`.
	HeightLocked {
		/// Fee paid by the owning transaction.
		fee: u64,
		/// Minimum block height this kernel may be included at.
		lock_height: u64,
	},
}

const KERNEL_FEATURE_PLAIN: u8 = 0;
const KERNEL_FEATURE_COINBASE: u8 = 1;
const KERNEL_FEATURE_HEIGHT_LOCKED: u8 = 2;

impl KernelFeatures {
	/// Fee this kernel's transaction paid, zero for coinbase.
	pub fn fee(&self) -> u64 {
		match self {
			KernelFeatures::Plain { fee } => *fee,
			KernelFeatures::Coinbase => 0,
			KernelFeatures::HeightLocked { fee, .. } => *fee,
		}
	}

	/// Minimum height this kernel may appear in a block at, zero if
	/// unlocked.
	pub fn lock_height(&self) -> u64 {
		match self {
			KernelFeatures::HeightLocked { lock_height, .. } => *lock_height,
			_ => 0,
		}
	}

	/// Whether this is a coinbase kernel.
	pub fn is_coinbase(&self) -> bool {
		matches!(self, KernelFeatures::Coinbase)
	}
}

impl Writeable for KernelFeatures {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		match self {
			KernelFeatures::Plain { fee } => {
				writer.write_u8(KERNEL_FEATURE_PLAIN)?;
				writer.write_u64(*fee)
			}
			KernelFeatures::Coinbase => writer.write_u8(KERNEL_FEATURE_COINBASE),
			KernelFeatures::HeightLocked { fee, lock_height } => {
				writer.write_u8(KERNEL_FEATURE_HEIGHT_LOCKED)?;
				writer.write_u64(*fee)?;
				writer.write_u64(*lock_height)
			}
		}
	}
}

impl Readable for KernelFeatures {
	fn read(reader: &mut dyn Reader) -> Result<KernelFeatures, SerError> {
		match reader.read_u8()? {
			KERNEL_FEATURE_PLAIN => Ok(KernelFeatures::Plain {
				fee: reader.read_u64()?,
			}),
			KERNEL_FEATURE_COINBASE => Ok(KernelFeatures::Coinbase),
			KERNEL_FEATURE_HEIGHT_LOCKED => Ok(KernelFeatures::HeightLocked {
				fee: reader.read_u64()?,
				lock_height: reader.read_u64()?,
			}),
			tag => Err(SerError::InvalidTag(tag)),
		}
	}
}

/// A transaction kernel: the public remainder of a transaction once every
/// input and output blinding factor cancels out, carrying the fee, any
/// lock height, the excess commitment and a signature proving the excess
/// was legitimately constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionKernel {
	/// Features (plain, coinbase, height-locked) and their parameters.
	pub features: KernelFeatures,
	/// Commitment to the sum of blinding factors of the transaction's
	/// inputs and outputs; what's left once the amounts cancel out.
	pub excess: Commitment,
	/// Signature over the kernel's features, proving the excess was
	/// computed honestly.
	pub excess_sig: Signature,
}

impl Writeable for TransactionKernel {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		self.features.write(writer)?;
		self.excess.write(writer)?;
		self.excess_sig.write(writer)
	}
}

impl Readable for TransactionKernel {
	fn read(reader: &mut dyn Reader) -> Result<TransactionKernel, SerError> {
		Ok(TransactionKernel {
			features: KernelFeatures::read(reader)?,
			excess: Commitment::read(reader)?,
			excess_sig: Signature::read(reader)?,
		})
	}
}

/// An input simply references the commitment of the output it spends;
/// MimbleWimble carries no outpoint index because there is never more
/// than one output with a given commitment live in the UTXO set at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Input {
	/// Commitment of the output being spent.
	pub commit: Commitment,
}

impl Writeable for Input {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		self.commit.write(writer)
	}
}

impl Readable for Input {
	fn read(reader: &mut dyn Reader) -> Result<Input, SerError> {
		Ok(Input {
			commit: Commitment::read(reader)?,
		})
	}
}

/// Features bit carried by every output, distinguishing a coinbase output
/// (subject to maturity) from a plain one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFeatures {
	/// Plain output, spendable immediately.
	Plain,
	/// Coinbase output, spendable only after `COINBASE_MATURITY` blocks.
	Coinbase,
}

impl Writeable for OutputFeatures {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_u8(match self {
			OutputFeatures::Plain => 0,
			OutputFeatures::Coinbase => 1,
		})
	}
}

impl Readable for OutputFeatures {
	fn read(reader: &mut dyn Reader) -> Result<OutputFeatures, SerError> {
		match reader.read_u8()? {
			0 => Ok(OutputFeatures::Plain),
			1 => Ok(OutputFeatures::Coinbase),
			tag => Err(SerError::InvalidTag(tag)),
		}
	}
}

/// An output: a commitment to a value plus a range proof attesting the
/// committed value is non-negative. No address, no script; ownership is
/// implicit in knowledge of the blinding factor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
	/// Plain or coinbase.
	pub features: OutputFeatures,
	/// Commitment to the output's value.
	pub commit: Commitment,
	/// Range proof attesting `commit`'s value is in `[0, 2^64)`.
	pub proof: RangeProof,
}

impl Output {
	/// Verifies this output's range proof against its own commitment.
	pub fn verify_proof(&self) -> bool {
		self.proof.verify(&self.commit)
	}

	/// Whether this is a coinbase output.
	pub fn is_coinbase(&self) -> bool {
		matches!(self.features, OutputFeatures::Coinbase)
	}
}

impl Writeable for Output {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		self.features.write(writer)?;
		self.commit.write(writer)?;
		self.proof.write(writer)
	}
}

impl Readable for Output {
	fn read(reader: &mut dyn Reader) -> Result<Output, SerError> {
		Ok(Output {
			features: OutputFeatures::read(reader)?,
			commit: Commitment::read(reader)?,
			proof: RangeProof::read(reader)?,
		})
	}
}

/// The weighable contents of a transaction or block: its inputs, outputs
/// and kernels. Shared between `Transaction` (a single party's spend) and
/// a block's body (the union of every transaction it includes, with
/// spent/created pairs cut through).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionBody {
	/// Inputs spent by this body.
	pub inputs: Vec<Input>,
	/// Outputs created by this body.
	pub outputs: Vec<Output>,
	/// Kernels proving the body balances.
	pub kernels: Vec<TransactionKernel>,
}

/// Errors raised validating a transaction or block body's internal
/// consistency, independent of chain state.
#[derive(Clone, Debug, Eq, PartialEq, Fail)]
pub enum TransactionError {
	/// Inputs, outputs or kernels were not in their canonical sort order.
	#[fail(display = "body elements not sorted")]
	NotSorted,
	/// The same commitment appeared twice among the outputs.
	#[fail(display = "duplicate commitment")]
	DuplicateCommitment,
	/// An output's range proof did not verify against its commitment.
	#[fail(display = "invalid range proof")]
	InvalidRangeProof,
	/// A kernel's excess signature did not verify.
	#[fail(display = "invalid kernel signature")]
	InvalidKernelSignature,
	/// The sum of output commitments minus input commitments did not
	/// equal the sum of kernel excesses (plus any extra offset).
	#[fail(display = "kernel sum mismatch")]
	KernelSumMismatch,
	/// Too many inputs, outputs or kernels in a single body.
	#[fail(display = "too many elements in transaction body")]
	TooManyElements,
}

impl TransactionBody {
	/// Builds an empty body.
	pub fn empty() -> TransactionBody {
		TransactionBody::default()
	}

	/// Checks that inputs are sorted by commitment, outputs are sorted
	/// by commitment with no duplicates, and kernels are sorted by
	/// excess. Canonical ordering makes two semantically identical
	/// transactions hash identically and lets merging during cut-through
	/// run as a linear merge rather than a sort.
	pub fn verify_sorted(&self) -> Result<(), TransactionError> {
		if (self.inputs.len() as u64) > MAX_IN_OUT_LEN
			|| (self.outputs.len() as u64) > MAX_IN_OUT_LEN
			|| (self.kernels.len() as u64) > MAX_IN_OUT_LEN
		{
			return Err(TransactionError::TooManyElements);
		}
		if !is_sorted(&self.inputs, |i| i.commit.as_bytes()) {
			return Err(TransactionError::NotSorted);
		}
		if !is_sorted(&self.outputs, |o| o.commit.as_bytes()) {
			return Err(TransactionError::NotSorted);
		}
		for pair in self.outputs.windows(2) {
			if pair[0].commit == pair[1].commit {
				return Err(TransactionError::DuplicateCommitment);
			}
		}
		if !is_sorted(&self.kernels, |k| k.excess.as_bytes()) {
			return Err(TransactionError::NotSorted);
		}
		Ok(())
	}

	/// Verifies every output's range proof and every kernel's signature.
	/// Does not check the balance; see [`verify_kernel_sums`] for that.
	pub fn verify_cryptographic(&self) -> Result<(), TransactionError> {
		for output in &self.outputs {
			if !output.verify_proof() {
				return Err(TransactionError::InvalidRangeProof);
			}
		}
		for kernel in &self.kernels {
			let msg = kernel_signature_message(&kernel.features);
			if !kernel.excess_sig.verify(&msg, &kernel.excess) {
				return Err(TransactionError::InvalidKernelSignature);
			}
		}
		Ok(())
	}

	/// Total fees declared across this body's kernels.
	pub fn fee(&self) -> u64 {
		self.kernels.iter().map(|k| k.features.fee()).sum()
	}

	/// Removes matching input/output pairs that cancel out (an output
	/// created and then spent within the same body), the "cut-through"
	/// operation blocks apply when aggregating the transactions they
	/// include. Leaves sort order intact since both sides are already
	/// sorted by commitment.
	pub fn cut_through(&mut self) {
		let mut spent: std::collections::HashSet<Vec<u8>> =
			self.inputs.iter().map(|i| i.commit.as_bytes().to_vec()).collect();
		let mut created: std::collections::HashSet<Vec<u8>> =
			self.outputs.iter().map(|o| o.commit.as_bytes().to_vec()).collect();
		created.retain(|c| spent.contains(c));
		spent.retain(|c| created.contains(c));

		self.inputs.retain(|i| !spent.contains(&i.commit.as_bytes().to_vec()));
		self.outputs
			.retain(|o| !created.contains(&o.commit.as_bytes().to_vec()));
	}
}

fn is_sorted<T, F: Fn(&T) -> &[u8]>(items: &[T], key: F) -> bool {
	items.windows(2).all(|w| key(&w[0]) <= key(&w[1]))
}

/// The signed message a kernel's excess signature is computed over: the
/// kernel's features alone, serialized. Fee and lock height are already
/// folded into `features`, so this ties the signature to the exact
/// semantics the kernel claims.
pub fn kernel_signature_message(features: &KernelFeatures) -> [u8; 32] {
	use crate::core::hash::Hashed;
	features.hash().as_bytes().try_into().expect("hash is 32 bytes")
}

/// Verifies that a body's commitments balance: `sum(outputs) -
/// sum(inputs) == sum(kernel excesses) + overage + offset_commit`, where
/// `overage` folds in any block reward and total fees being claimed by
/// the caller (zero for a bare, non-coinbase transaction) and
/// `offset_commit` folds in a kernel offset already reduced to a single
/// commitment (e.g. a block's cumulative offset net of its parent's, see
/// [`crate::crypto::offset_commitment`]). This is the check that makes
/// forging value impossible without the corresponding blinding factors.
pub fn verify_kernel_sums(
	body: &TransactionBody,
	overage: i64,
	offset_commit: Option<&Commitment>,
) -> Result<(), TransactionError> {
	let output_commits: Vec<Commitment> = body.outputs.iter().map(|o| o.commit.clone()).collect();
	let input_commits: Vec<Commitment> = body.inputs.iter().map(|i| i.commit.clone()).collect();
	let mut kernel_excesses: Vec<Commitment> = body.kernels.iter().map(|k| k.excess.clone()).collect();
	if let Some(c) = offset_commit {
		kernel_excesses.push(c.clone());
	}

	let io_sum =
		Commitment::sum(&output_commits, &input_commits).map_err(|_| TransactionError::KernelSumMismatch)?;
	let kernel_sum =
		Commitment::sum(&kernel_excesses, &[]).map_err(|_| TransactionError::KernelSumMismatch)?;

	let adjusted_kernel_sum = if overage > 0 {
		Commitment::sum(&[kernel_sum, crate::crypto::value_commitment(overage as u64)], &[])
	} else if overage < 0 {
		Commitment::sum(&[kernel_sum], &[crate::crypto::value_commitment((-overage) as u64)])
	} else {
		Ok(kernel_sum)
	}
	.map_err(|_| TransactionError::KernelSumMismatch)?;

	if io_sum != adjusted_kernel_sum {
		return Err(TransactionError::KernelSumMismatch);
	}
	Ok(())
}

/// A standalone transaction: a body plus the extra blinding offset
/// factored out of its kernels to make partial transaction aggregation
/// possible without revealing individual kernel excesses before they are
/// finalized. Dandelion aggregation (stem phase batching) consumes this
/// shape; full aggregation logic is out of scope here beyond exposing the
/// hand-off point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
	/// Inputs, outputs and kernels.
	pub body: TransactionBody,
	/// Total excess offset shared across the whole transaction, signed
	/// separately from any single kernel.
	pub offset: BlindingFactor,
}

impl Writeable for TransactionBody {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		self.inputs.write(writer)?;
		self.outputs.write(writer)?;
		self.kernels.write(writer)
	}
}

impl Readable for TransactionBody {
	fn read(reader: &mut dyn Reader) -> Result<TransactionBody, SerError> {
		Ok(TransactionBody {
			inputs: Vec::read(reader)?,
			outputs: Vec::read(reader)?,
			kernels: Vec::read(reader)?,
		})
	}
}

impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		self.body.write(writer)?;
		self.offset.write(writer)
	}
}

impl Readable for Transaction {
	fn read(reader: &mut dyn Reader) -> Result<Transaction, SerError> {
		Ok(Transaction {
			body: TransactionBody::read(reader)?,
			offset: BlindingFactor::read(reader)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn commit(byte: u8) -> Commitment {
		let mut bytes = [0u8; 33];
		bytes[0] = 0x08;
		bytes[1] = byte;
		// not a real curve point; only used where tests avoid calling
		// into secp256k1zkp (sorting, cut-through) and never `verify()`.
		Commitment::from_bytes(&bytes).unwrap()
	}

	#[test]
	fn cut_through_removes_matching_pairs() {
		let mut body = TransactionBody::empty();
		body.inputs.push(Input { commit: commit(1) });
		body.inputs.push(Input { commit: commit(2) });
		body.outputs.push(Output {
			features: OutputFeatures::Plain,
			commit: commit(2),
			proof: RangeProof::from_bytes(&[]).unwrap(),
		});
		body.cut_through();
		assert_eq!(body.inputs.len(), 1);
		assert_eq!(body.outputs.len(), 0);
		assert_eq!(body.inputs[0].commit, commit(1));
	}

	#[test]
	fn detects_unsorted_inputs() {
		let mut body = TransactionBody::empty();
		body.inputs.push(Input { commit: commit(2) });
		body.inputs.push(Input { commit: commit(1) });
		assert_eq!(body.verify_sorted(), Err(TransactionError::NotSorted));
	}

	#[test]
	fn detects_duplicate_outputs() {
		let mut body = TransactionBody::empty();
		body.outputs.push(Output {
			features: OutputFeatures::Plain,
			commit: commit(1),
			proof: RangeProof::from_bytes(&[]).unwrap(),
		});
		body.outputs.push(Output {
			features: OutputFeatures::Plain,
			commit: commit(1),
			proof: RangeProof::from_bytes(&[]).unwrap(),
		});
		assert_eq!(body.verify_sorted(), Err(TransactionError::DuplicateCommitment));
	}
}
