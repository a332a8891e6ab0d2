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

//! Test-only proof-of-work mining. `mw_core::pow` deliberately only
//! verifies Cuckoo Cycle proofs (mining is out of scope for a node), so
//! chain tests that need a header to pass `verify_pow` mine one here by
//! brute force against a tiny graph, the same edge construction
//! `mw_core::pow::cuckoo` verifies against.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use mw_core::core::hash::Hash;
use mw_core::core::BlockHeader;
use mw_core::pow::siphash::SipHash24;
use mw_core::pow::{Difficulty, Proof};

static TMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A fresh, uniquely-named scratch directory under the system temp dir,
/// for tests that need a real `ChainState` backed by LMDB and PMMR files
/// on disk. Callers are responsible for removing it once done.
pub fn temp_root(name: &str) -> PathBuf {
	let n = TMP_COUNTER.fetch_add(1, Ordering::SeqCst);
	let mut dir = env::temp_dir();
	dir.push(format!("mw_chain_test_{}_{}", name, n));
	dir
}

/// Graph size used by every test header. Small enough that a two-cycle
/// (the shortest cycle this edge construction admits: two nonces whose
/// edges land on the very same pair of nodes) turns up within a handful
/// of attempts.
const TEST_EDGE_BITS: u8 = 8;

fn edge(hasher: &SipHash24, edge_bits: u8, nonce: u64) -> (u64, u64) {
	let mask = (1u64 << edge_bits) - 1;
	let u = hasher.hash(nonce << 1) & mask;
	let v = (hasher.hash((nonce << 1) | 1) & mask) | (1u64 << edge_bits);
	(u, v)
}

fn find_two_cycle(header_hash: &Hash, edge_bits: u8) -> Option<(u64, u64)> {
	let mut key = [0u8; 32];
	key.copy_from_slice(header_hash.as_bytes());
	let hasher = SipHash24::new(&key);

	let size = 1u64 << edge_bits;
	let mut seen = std::collections::HashMap::new();
	for nonce in 0..size {
		let e = edge(&hasher, edge_bits, nonce);
		if let Some(&other) = seen.get(&e) {
			return Some((other, nonce));
		}
		seen.insert(e, nonce);
	}
	None
}

/// Mines a valid proof of work into `header` at [`TEST_EDGE_BITS`], setting
/// `header.pow.proof` and `header.pow.difficulty` to match. Every other
/// field, including the timestamp, is left exactly as the caller set it;
/// the search instead walks the header's format version, a field that
/// feeds the pre-pow hash but carries no validation meaning of its own.
pub fn mine(header: &mut BlockHeader, difficulty: Difficulty) {
	header.pow.difficulty = difficulty;
	for version in 0..u16::MAX {
		header.version = version;
		let pre_pow_hash = header.pre_pow_hash();
		if let Some((n1, n2)) = find_two_cycle(&pre_pow_hash, TEST_EDGE_BITS) {
			let mut nonces = vec![n1, n2];
			nonces.sort_unstable();
			header.pow.proof = Proof {
				edge_bits: TEST_EDGE_BITS,
				nonces,
			};
			return;
		}
	}
	panic!("failed to mine a tiny test proof of work");
}
