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

//! Hash type and hashing of almost every type in the crate, built on
//! BLAKE2b. MMR node hashes, header hashes and commitment-derived IDs all
//! go through this one path so there is a single place that ever touches
//! the hashing backend.

use std::fmt;

use blake2_rfc::blake2b::Blake2b;
use mw_util::{from_hex, to_hex};

use crate::ser::{Error, Readable, Reader, Writeable, Writer};

/// Width of a hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 256-bit hash, displayed and parsed as hex.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

/// The hash used as a sentinel "no value" in places like a genesis block's
/// previous-header pointer.
pub const ZERO_HASH: Hash = Hash([0; HASH_SIZE]);

impl Hash {
	/// Wraps a raw 32-byte array.
	pub fn from_bytes(bytes: &[u8]) -> Result<Hash, Error> {
		if bytes.len() != HASH_SIZE {
			return Err(Error::InvalidTag(0));
		}
		let mut h = [0u8; HASH_SIZE];
		h.copy_from_slice(bytes);
		Ok(Hash(h))
	}

	/// Raw bytes of this hash.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Hex representation of this hash.
	pub fn to_hex(&self) -> String {
		to_hex(&self.0)
	}

	/// Parses a hash from its hex representation.
	pub fn from_hex(hex: &str) -> Result<Hash, Error> {
		let bytes = from_hex(hex).map_err(|_| Error::InvalidTag(0))?;
		Hash::from_bytes(&bytes)
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Writeable for Hash {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Hash {
	fn read(reader: &mut dyn Reader) -> Result<Hash, Error> {
		let bytes = reader.read_fixed_bytes(HASH_SIZE)?;
		Hash::from_bytes(&bytes)
	}
}

/// A hasher that accumulates written bytes and produces a single [`Hash`]
/// at the end, mirroring the `Writer` trait so any `Writeable` type can be
/// hashed by writing itself into one of these instead of a byte buffer.
pub struct HashWriter {
	state: Blake2b,
}

impl Default for HashWriter {
	fn default() -> Self {
		HashWriter {
			state: Blake2b::new(HASH_SIZE),
		}
	}
}

impl HashWriter {
	/// Consumes the writer and returns the resulting hash.
	pub fn finalize(self) -> Hash {
		let digest = self.state.finalize();
		let mut h = [0u8; HASH_SIZE];
		h.copy_from_slice(digest.as_bytes());
		Hash(h)
	}
}

impl Writer for HashWriter {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.state.update(&[n]);
		Ok(())
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.state.update(bytes);
		Ok(())
	}
}

/// Implemented by anything that has a canonical hash, derived by writing
/// its `Writeable` form through a [`HashWriter`].
pub trait Hashed {
	/// Computes the hash of `self`.
	fn hash(&self) -> Hash;
}

impl<W: Writeable> Hashed for W {
	fn hash(&self) -> Hash {
		let mut writer = HashWriter::default();
		// A Writeable whose write() fails is a programming error: every type
		// implementing it in this crate writes fixed, infallible shapes.
		self.write(&mut writer)
			.expect("hashing a Writeable should never fail");
		writer.finalize()
	}
}

/// Combines two child hashes with a position into the hash of their MMR
/// parent node: `H(pos || left || right)`.
pub fn combine_hash(pos: u64, left: &Hash, right: &Hash) -> Hash {
	let mut writer = HashWriter::default();
	writer.write_u64(pos).expect("write to HashWriter");
	writer.write_fixed_bytes(left.as_bytes()).expect("write to HashWriter");
	writer.write_fixed_bytes(right.as_bytes()).expect("write to HashWriter");
	writer.finalize()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_of_u64_is_deterministic() {
		let a: u64 = 42;
		let b: u64 = 42;
		assert_eq!(a.hash(), b.hash());
	}

	#[test]
	fn hash_differs_by_position() {
		let h = ZERO_HASH;
		assert_ne!(combine_hash(0, &h, &h), combine_hash(1, &h, &h));
	}

	#[test]
	fn hex_round_trip() {
		let h = 1234u64.hash();
		let hex = h.to_hex();
		assert_eq!(Hash::from_hex(&hex).unwrap(), h);
	}
}
