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

//! Thin facade over `secp256k1zkp`. Every Pedersen commitment, Schnorr
//! signature and bulletproof range proof the rest of the crate touches
//! goes through here as an opaque, already-serialized blob; nothing above
//! this module ever reaches into curve arithmetic directly.

use std::fmt;

use secp256k1zkp::aggsig;
use secp256k1zkp::key::SecretKey;
use secp256k1zkp::pedersen;
use secp256k1zkp::{ContextFlag, Secp256k1};

use crate::ser::{Error as SerError, Readable, Reader, Writeable, Writer};

lazy_static! {
	/// Single process-wide secp256k1 context with both signing and
	/// verification capability, shared by every commitment, signature and
	/// range proof operation. Building a full context is expensive enough
	/// (loads precomputed tables) that it should happen exactly once.
	static ref SECP: Secp256k1 = Secp256k1::with_caps(ContextFlag::Commit);
}

/// A Pedersen commitment to a value: `r*G + v*H`, opaque beyond its byte
/// representation and the homomorphic sum operation used to check that a
/// transaction or block balances.
#[derive(Clone, PartialEq, Eq)]
pub struct Commitment(pedersen::Commitment);

impl Commitment {
	/// Wraps a raw 33-byte serialized commitment.
	pub fn from_bytes(bytes: &[u8]) -> Result<Commitment, SerError> {
		if bytes.len() != pedersen::PEDERSEN_COMMITMENT_SIZE {
			return Err(SerError::InvalidTag(1));
		}
		let mut raw = [0u8; pedersen::PEDERSEN_COMMITMENT_SIZE];
		raw.copy_from_slice(bytes);
		Ok(Commitment(pedersen::Commitment(raw)))
	}

	/// Raw serialized bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&(self.0).0
	}

	/// Sums a set of positive and a set of negative commitments and
	/// returns the resulting commitment, using the curve's homomorphic
	/// addition. Used to check that `sum(outputs) - sum(inputs) ==
	/// sum(kernel excesses) + reward` without ever learning the values or
	/// blinding factors involved.
	pub fn sum(positive: &[Commitment], negative: &[Commitment]) -> Result<Commitment, CryptoError> {
		let pos: Vec<pedersen::Commitment> = positive.iter().map(|c| c.0).collect();
		let neg: Vec<pedersen::Commitment> = negative.iter().map(|c| c.0).collect();
		SECP.commit_sum(pos, neg)
			.map(Commitment)
			.map_err(|_| CryptoError::InvalidCommitment)
	}
}

impl fmt::Debug for Commitment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Commitment({})", mw_util::to_hex(self.as_bytes()))
	}
}

impl Writeable for Commitment {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_fixed_bytes(self.as_bytes())
	}
}

impl Readable for Commitment {
	fn read(reader: &mut dyn Reader) -> Result<Commitment, SerError> {
		let bytes = reader.read_fixed_bytes(pedersen::PEDERSEN_COMMITMENT_SIZE)?;
		Commitment::from_bytes(&bytes)
	}
}

/// A Schnorr signature over a kernel's message (fee and lock height),
/// verified against the kernel's excess commitment treated as a public
/// key. Opaque beyond verification.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(aggsig::Signature);

impl Signature {
	/// Wraps a raw 64-byte serialized signature.
	pub fn from_bytes(bytes: &[u8]) -> Result<Signature, SerError> {
		aggsig::Signature::from_compact(&SECP, bytes)
			.map(Signature)
			.map_err(|_| SerError::InvalidTag(2))
	}

	/// Raw serialized bytes.
	pub fn as_bytes(&self) -> Vec<u8> {
		self.0.to_compact(&SECP).unwrap_or_default()
	}

	/// Verifies this signature was produced over `msg` by the holder of
	/// the private key behind `excess`, treating the commitment's point
	/// as the public key (standard MimbleWimble kernel signing scheme).
	pub fn verify(&self, msg: &[u8; 32], excess: &Commitment) -> bool {
		let pubkey = match excess.0.to_pubkey(&SECP) {
			Ok(p) => p,
			Err(_) => return false,
		};
		aggsig::verify_single(&SECP, &self.0, msg, None, &pubkey, Some(&pubkey), None, false)
	}
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Signature({})", mw_util::to_hex(&self.as_bytes()))
	}
}

impl Writeable for Signature {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_fixed_bytes(&self.as_bytes())
	}
}

impl Readable for Signature {
	fn read(reader: &mut dyn Reader) -> Result<Signature, SerError> {
		let bytes = reader.read_fixed_bytes(64)?;
		Signature::from_bytes(&bytes)
	}
}

/// A raw 32-byte scalar used as a blinding factor offset: the extra
/// factor taken out of a transaction's kernels so the excess of any
/// individual kernel reveals nothing about that kernel's own blinding
/// sum, and summed back in by the recipient aggregating transactions
/// into a block. Opaque; this crate never does scalar arithmetic on it
/// directly, only threads it through serialization.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BlindingFactor([u8; 32]);

impl BlindingFactor {
	/// Wraps a raw 32-byte scalar.
	pub fn from_bytes(bytes: &[u8]) -> Result<BlindingFactor, SerError> {
		if bytes.len() != 32 {
			return Err(SerError::InvalidTag(3));
		}
		let mut raw = [0u8; 32];
		raw.copy_from_slice(bytes);
		Ok(BlindingFactor(raw))
	}

	/// Raw bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// The zero scalar, used when a transaction has no additional offset.
	pub fn zero() -> BlindingFactor {
		BlindingFactor([0; 32])
	}

	/// Whether this is the zero scalar.
	pub fn is_zero(&self) -> bool {
		self.0 == [0; 32]
	}
}

impl fmt::Debug for BlindingFactor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BlindingFactor({})", mw_util::to_hex(&self.0))
	}
}

impl Writeable for BlindingFactor {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for BlindingFactor {
	fn read(reader: &mut dyn Reader) -> Result<BlindingFactor, SerError> {
		let bytes = reader.read_fixed_bytes(32)?;
		BlindingFactor::from_bytes(&bytes)
	}
}

/// A bulletproof range proof attesting that an output's committed value
/// lies in `[0, 2^64)` without revealing the value. Treated as an opaque,
/// variable-length blob; this crate never constructs one, only verifies.
#[derive(Clone, PartialEq, Eq)]
pub struct RangeProof {
	bytes: Vec<u8>,
}

/// Maximum size in bytes of a single serialized range proof, used both as
/// a read guard and to size the backing MMR's fixed-width records.
pub const MAX_PROOF_SIZE: usize = 675;

impl RangeProof {
	/// Wraps raw range proof bytes, rejecting anything over
	/// [`MAX_PROOF_SIZE`].
	pub fn from_bytes(bytes: &[u8]) -> Result<RangeProof, SerError> {
		if bytes.len() > MAX_PROOF_SIZE {
			return Err(SerError::TooLarge);
		}
		Ok(RangeProof {
			bytes: bytes.to_vec(),
		})
	}

	/// Raw bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}

	/// Verifies that `commit` is a commitment to a value provably in
	/// range, per this proof.
	pub fn verify(&self, commit: &Commitment) -> bool {
		let proof = pedersen::RangeProof {
			proof: {
				let mut buf = [0u8; pedersen::MAX_PROOF_SIZE];
				let len = self.bytes.len().min(buf.len());
				buf[..len].copy_from_slice(&self.bytes[..len]);
				buf
			},
			plen: self.bytes.len(),
		};
		SECP.verify_range_proof(commit.0, proof).is_ok()
	}
}

impl fmt::Debug for RangeProof {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RangeProof({} bytes)", self.bytes.len())
	}
}

impl Writeable for RangeProof {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_bytes(&self.bytes)
	}
}

impl Readable for RangeProof {
	fn read(reader: &mut dyn Reader) -> Result<RangeProof, SerError> {
		let bytes = reader.read_bytes_len_prefix(MAX_PROOF_SIZE as u64)?;
		RangeProof::from_bytes(&bytes)
	}
}

/// Errors raised by the curve operations this module wraps. Deliberately
/// thin: callers care whether a cryptographic check passed, not the
/// internals of why it didn't.
#[derive(Clone, Debug, Eq, PartialEq, failure_derive::Fail)]
pub enum CryptoError {
	/// A commitment failed to parse or sum.
	#[fail(display = "invalid commitment")]
	InvalidCommitment,
	/// A signature failed to verify.
	#[fail(display = "invalid signature")]
	InvalidSignature,
}

/// Derives the zero-value, zero-blinding commitment used as the additive
/// identity when summing an empty set of commitments (e.g. a block with
/// no kernels, which cannot happen post-genesis but is a convenient base
/// case for folds).
pub fn zero_commitment() -> Commitment {
	Commitment(SECP.commit_value(0).expect("committing to 0 cannot fail"))
}

/// Commitment to a plain value with a zero blinding factor: `v*H`. Used
/// to fold a publicly known amount (a block reward, total fees) into a
/// kernel sum check without anyone needing to know a blinding factor for
/// it.
pub fn value_commitment(value: u64) -> Commitment {
	Commitment(SECP.commit_value(value).expect("committing to a plain value cannot fail"))
}

/// Commitment to zero value with `offset` as the blinding factor:
/// `offset*G`. Folding this into a kernel sum check is how a block's
/// `total_kernel_offset` (or the difference between two headers' offsets)
/// gets verified without ever exposing the scalar itself.
pub fn offset_commitment(offset: &BlindingFactor) -> Result<Commitment, CryptoError> {
	let key = SecretKey::from_slice(&SECP, offset.as_bytes()).map_err(|_| CryptoError::InvalidCommitment)?;
	SECP.commit(0, key).map(Commitment).map_err(|_| CryptoError::InvalidCommitment)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_blinding_factor_is_zero() {
		assert!(BlindingFactor::zero().is_zero());
		let mut bytes = [0u8; 32];
		bytes[31] = 1;
		assert!(!BlindingFactor::from_bytes(&bytes).unwrap().is_zero());
	}

	#[test]
	fn offset_commitment_differs_for_distinct_offsets() {
		let mut one = [0u8; 32];
		one[31] = 1;
		let mut two = [0u8; 32];
		two[31] = 2;
		let c1 = offset_commitment(&BlindingFactor::from_bytes(&one).unwrap()).unwrap();
		let c2 = offset_commitment(&BlindingFactor::from_bytes(&two).unwrap()).unwrap();
		assert_ne!(c1, c2);
	}
}
