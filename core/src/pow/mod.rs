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

//! Proof-of-work types carried by a header: a Cuckoo Cycle proof plus the
//! difficulty bookkeeping needed to validate a header's target. Verification
//! only; the actual cycle search lives outside this crate's scope.

pub mod cuckoo;
pub mod siphash;

use std::cmp::{max, min};
use std::fmt;

use crate::consensus::{CLAMP_FACTOR, DIFFICULTY_ADJUST_WINDOW, MIN_DIFFICULTY};
use crate::core::hash::Hash;
use crate::ser::{Error, Readable, Reader, Writeable, Writer};

pub use self::cuckoo::CuckooError;

/// A chain difficulty value. Wraps a plain `u64` so that difficulty
/// arithmetic (addition across a window, clamped adjustment) can't be
/// confused with an arbitrary integer elsewhere in the code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Difficulty(u64);

impl Difficulty {
	/// Smallest valid difficulty.
	pub fn min() -> Difficulty {
		Difficulty(MIN_DIFFICULTY)
	}

	/// Wraps a raw value.
	pub fn from_num(num: u64) -> Difficulty {
		Difficulty(max(num, MIN_DIFFICULTY))
	}

	/// The raw value.
	pub fn to_num(self) -> u64 {
		self.0
	}

	/// Computes the next difficulty from a trailing window of
	/// `(timestamp, difficulty)` pairs, oldest first, clamping the
	/// adjustment factor to `[1/CLAMP_FACTOR, CLAMP_FACTOR]` of the
	/// previous value so a handful of outlier timestamps cannot swing the
	/// target wildly in one step.
	pub fn next_difficulty(window: &[(u64, Difficulty)]) -> Difficulty {
		if window.len() < 2 {
			return Difficulty::min();
		}
		let oldest_ts = window.first().unwrap().0;
		let newest_ts = window.last().unwrap().0;
		let actual_duration = max(newest_ts.saturating_sub(oldest_ts), 1);
		let target_duration = crate::consensus::BLOCK_TIME_SEC * (window.len() as u64 - 1);

		let total_difficulty: u64 = window.iter().map(|(_, d)| d.to_num()).sum();
		let avg_difficulty = total_difficulty / window.len() as u64;

		let clamped_duration = min(
			max(actual_duration, target_duration / CLAMP_FACTOR),
			target_duration * CLAMP_FACTOR,
		);
		let next = avg_difficulty * target_duration / clamped_duration;
		Difficulty::from_num(max(next, MIN_DIFFICULTY))
	}

	/// Length of the trailing window used by [`Difficulty::next_difficulty`].
	pub fn adjustment_window() -> u64 {
		DIFFICULTY_ADJUST_WINDOW
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Writeable for Difficulty {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_u64(self.0)
	}
}

impl Readable for Difficulty {
	fn read(reader: &mut dyn Reader) -> Result<Difficulty, Error> {
		Ok(Difficulty(reader.read_u64()?))
	}
}

/// A claimed Cuckoo Cycle solution: the graph size it was found in and the
/// sorted list of edge nonces making up the cycle. Serialized bit-packed
/// at `edge_bits` bits per nonce rather than as full `u64`s, since a
/// header is gossiped on every new block and the proof is its largest
/// component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
	/// log2 of the graph size the proof was found in.
	pub edge_bits: u8,
	/// The `PROOFSIZE` edge nonces making up the cycle, strictly
	/// increasing.
	pub nonces: Vec<u64>,
}

impl Proof {
	/// Number of whole bytes needed to bit-pack `count` nonces at
	/// `edge_bits` bits each.
	fn packed_len(edge_bits: u8, count: usize) -> usize {
		((edge_bits as usize) * count + 7) / 8
	}
}

impl Writeable for Proof {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_u8(self.edge_bits)?;
		writer.write_u8(self.nonces.len() as u8)?;
		let packed_len = Proof::packed_len(self.edge_bits, self.nonces.len());
		let mut bits = BitVec::new(packed_len);
		for (i, &nonce) in self.nonces.iter().enumerate() {
			bits.write_bits(i * self.edge_bits as usize, self.edge_bits as usize, nonce);
		}
		writer.write_fixed_bytes(&bits.bytes)
	}
}

impl Readable for Proof {
	fn read(reader: &mut dyn Reader) -> Result<Proof, Error> {
		let edge_bits = reader.read_u8()?;
		let count = reader.read_u8()? as usize;
		let packed_len = Proof::packed_len(edge_bits, count);
		let bytes = reader.read_fixed_bytes(packed_len)?;
		let bits = BitVec { bytes };
		let nonces = (0..count)
			.map(|i| bits.read_bits(i * edge_bits as usize, edge_bits as usize))
			.collect();
		Ok(Proof { edge_bits, nonces })
	}
}

/// Minimal fixed-width bit-packing buffer, used only to pack/unpack a
/// `Proof`'s nonce list.
struct BitVec {
	bytes: Vec<u8>,
}

impl BitVec {
	fn new(byte_len: usize) -> BitVec {
		BitVec {
			bytes: vec![0u8; byte_len],
		}
	}

	fn write_bits(&mut self, start_bit: usize, width: usize, value: u64) {
		for i in 0..width {
			let bit = (value >> i) & 1;
			if bit == 1 {
				let pos = start_bit + i;
				self.bytes[pos / 8] |= 1 << (pos % 8);
			}
		}
	}

	fn read_bits(&self, start_bit: usize, width: usize) -> u64 {
		let mut value = 0u64;
		for i in 0..width {
			let pos = start_bit + i;
			let bit = (self.bytes[pos / 8] >> (pos % 8)) & 1;
			value |= (bit as u64) << i;
		}
		value
	}
}

/// The full proof-of-work payload carried by a header: cumulative chain
/// difficulty up to and including this block, this block's own target
/// difficulty ("scaling difficulty" in the older Grin terminology), the
/// nonce used to derive the Cuckoo graph seed, and the claimed cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofOfWork {
	/// Total difficulty accumulated by the chain up to this block.
	pub total_difficulty: Difficulty,
	/// This block's own target difficulty.
	pub difficulty: Difficulty,
	/// Nonce mixed into the header hash that seeds the Cuckoo graph.
	pub nonce: u64,
	/// The claimed proof.
	pub proof: Proof,
}

impl ProofOfWork {
	/// Verifies the claimed proof against the pre-proof header hash,
	/// checking only the graph structure; the caller is responsible for
	/// comparing `self.difficulty` against the network's required target.
	pub fn verify(&self, pre_pow_hash: &Hash) -> Result<(), CuckooError> {
		cuckoo::verify(pre_pow_hash, &self.proof)
	}
}

impl Writeable for ProofOfWork {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.total_difficulty.write(writer)?;
		self.difficulty.write(writer)?;
		writer.write_u64(self.nonce)?;
		self.proof.write(writer)
	}
}

impl Readable for ProofOfWork {
	fn read(reader: &mut dyn Reader) -> Result<ProofOfWork, Error> {
		let total_difficulty = Difficulty::read(reader)?;
		let difficulty = Difficulty::read(reader)?;
		let nonce = reader.read_u64()?;
		let proof = Proof::read(reader)?;
		Ok(ProofOfWork {
			total_difficulty,
			difficulty,
			nonce,
			proof,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ser::{deserialize, serialize};

	#[test]
	fn proof_bit_packing_round_trips() {
		let proof = Proof {
			edge_bits: 29,
			nonces: vec![1, 100_000, 500_000_000, (1u64 << 29) - 1],
		};
		let bytes = serialize(&proof).unwrap();
		let back: Proof = deserialize(&bytes).unwrap();
		assert_eq!(proof, back);
	}

	#[test]
	fn difficulty_next_never_below_minimum() {
		let window = vec![(0, Difficulty::min()), (1, Difficulty::min())];
		let next = Difficulty::next_difficulty(&window);
		assert!(next >= Difficulty::min());
	}

	#[test]
	fn difficulty_clamps_large_time_gap() {
		let window = vec![(0, Difficulty::from_num(1000)), (100_000, Difficulty::from_num(1000))];
		let next = Difficulty::next_difficulty(&window);
		// a huge gap should push difficulty down, but not below the clamp
		assert!(next.to_num() >= 1000 / CLAMP_FACTOR);
	}
}
