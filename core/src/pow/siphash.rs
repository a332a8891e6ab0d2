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

//! SipHash-2-4 keyed into four 64-bit words, used by Cuckoo Cycle to map a
//! nonce to a node in the graph. Not a general-purpose SipHash
//! implementation; it only needs to run the permutation and read back two
//! of the state words, so that's all this exposes.

use std::convert::TryInto;

/// Keyed SipHash-2-4 state, one instance shared across every nonce in a
/// proof (the key is derived once per header).
#[derive(Clone)]
pub struct SipHash24 {
	v: [u64; 4],
}

macro_rules! rotl {
	($x:expr, $b:expr) => {
		(($x << $b) | ($x >> (64 - $b)))
	};
}

fn sipround(v: &mut [u64; 4]) {
	v[0] = v[0].wrapping_add(v[1]);
	v[2] = v[2].wrapping_add(v[3]);
	v[1] = rotl!(v[1], 13);
	v[3] = rotl!(v[3], 16);
	v[1] ^= v[0];
	v[3] ^= v[2];
	v[0] = rotl!(v[0], 32);
	v[2] = v[2].wrapping_add(v[1]);
	v[0] = v[0].wrapping_add(v[3]);
	v[1] = rotl!(v[1], 17);
	v[3] = rotl!(v[3], 21);
	v[1] ^= v[2];
	v[3] ^= v[0];
	v[2] = rotl!(v[2], 32);
}

impl SipHash24 {
	/// Derives the four 64-bit state words from a 32-byte key, following
	/// the standard SipHash key schedule.
	pub fn new(key: &[u8; 32]) -> SipHash24 {
		let k0 = u64::from_le_bytes(key[0..8].try_into().unwrap());
		let k1 = u64::from_le_bytes(key[8..16].try_into().unwrap());
		SipHash24 {
			v: [
				k0 ^ 0x736f_6d65_7073_6575,
				k1 ^ 0x646f_7261_6e64_6f6d,
				k0 ^ 0x6c79_6765_6e65_7261,
				k1 ^ 0x7465_6462_7974_6573,
			],
		}
	}

	/// Runs SipHash-2-4 over a single 64-bit nonce and returns the 64-bit
	/// digest, following libsecp/cuckoo's two-compression-round,
	/// four-finalization-round schedule.
	pub fn hash(&self, nonce: u64) -> u64 {
		let mut v = self.v;
		v[3] ^= nonce;
		sipround(&mut v);
		sipround(&mut v);
		v[0] ^= nonce;
		v[2] ^= 0xff;
		sipround(&mut v);
		sipround(&mut v);
		sipround(&mut v);
		sipround(&mut v);
		v[0] ^ v[1] ^ v[2] ^ v[3]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deterministic() {
		let key = [7u8; 32];
		let h = SipHash24::new(&key);
		assert_eq!(h.hash(42), h.hash(42));
	}

	#[test]
	fn varies_by_nonce() {
		let key = [3u8; 32];
		let h = SipHash24::new(&key);
		assert_ne!(h.hash(1), h.hash(2));
	}
}
