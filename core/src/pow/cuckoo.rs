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

//! Cuckoo Cycle proof verification. This crate never searches for a
//! proof (mining is explicitly out of scope); it only checks that a
//! claimed cycle of edges is present in the bipartite graph derived from
//! a header hash and actually forms a single cycle of the right length.

use std::collections::HashMap;

use crate::core::hash::Hash;
use crate::pow::siphash::SipHash24;
use crate::pow::Proof;

/// Errors a claimed proof can fail with.
#[derive(Clone, Debug, Eq, PartialEq, failure_derive::Fail)]
pub enum CuckooError {
	/// Two nonces in the proof were not in strictly increasing order.
	#[fail(display = "nonces not sorted")]
	NoncesNotSorted,
	/// A nonce's value exceeds what the graph size allows.
	#[fail(display = "nonce out of range")]
	NonceOutOfRange,
	/// The edges in the proof do not close into one cycle of the expected
	/// length, i.e. they form multiple smaller cycles or a non-cycle.
	#[fail(display = "edges do not form a single {}-cycle", _0)]
	WrongCycleLength(usize),
}

/// One bipartite edge of the graph: a pair of node ids, one on each side.
struct Edge {
	u: u64,
	v: u64,
}

fn new_edge(hasher: &SipHash24, edge_bits: u8, nonce: u64) -> Edge {
	let mask = (1u64 << edge_bits) - 1;
	let u = hasher.hash(nonce << 1) & mask;
	let v = (hasher.hash((nonce << 1) | 1) & mask) | (1u64 << edge_bits);
	Edge { u, v }
}

/// Derives the SipHash key from a header hash, as the seed for generating
/// every edge referenced by a proof against that header.
fn hasher_for(header_hash: &Hash) -> SipHash24 {
	let mut key = [0u8; 32];
	key.copy_from_slice(header_hash.as_bytes());
	SipHash24::new(&key)
}

/// Verifies that `proof`, claimed against `header_hash` at the given
/// `edge_bits` graph size, is a valid Cuckoo Cycle: every nonce in range,
/// strictly increasing, and its edges form exactly one cycle touching
/// every node in the proof exactly twice.
pub fn verify(header_hash: &Hash, proof: &Proof) -> Result<(), CuckooError> {
	let edge_bits = proof.edge_bits;
	let size = 1u64 << edge_bits;
	let hasher = hasher_for(header_hash);

	let mut last = None;
	for &nonce in &proof.nonces {
		if nonce >= size {
			return Err(CuckooError::NonceOutOfRange);
		}
		if let Some(prev) = last {
			if nonce <= prev {
				return Err(CuckooError::NoncesNotSorted);
			}
		}
		last = Some(nonce);
	}

	// Union-find over the node ids touched by the proof's edges: a valid
	// cycle of length N means every node has degree exactly 2 and
	// following edges visits all N edges before returning to the start.
	let mut adjacency: HashMap<u64, Vec<u64>> = HashMap::new();
	for &nonce in &proof.nonces {
		let edge = new_edge(&hasher, edge_bits, nonce);
		adjacency.entry(edge.u).or_insert_with(Vec::new).push(edge.v);
		adjacency.entry(edge.v).or_insert_with(Vec::new).push(edge.u);
	}

	for neighbors in adjacency.values() {
		if neighbors.len() != 2 {
			return Err(CuckooError::WrongCycleLength(proof.nonces.len()));
		}
	}

	// Walk the cycle starting from an arbitrary node, alternating which
	// of the two neighbors we came from, and confirm it closes after
	// visiting exactly `proof.nonces.len()` edges.
	let start = match proof.nonces.first() {
		Some(_) => *adjacency.keys().next().expect("adjacency non-empty"),
		None => return Err(CuckooError::WrongCycleLength(0)),
	};

	let mut visited_edges = 0usize;
	let mut prev = start;
	let mut current = adjacency[&start][0];
	loop {
		visited_edges += 1;
		let neighbors = &adjacency[&current];
		let next = if neighbors[0] == prev { neighbors[1] } else { neighbors[0] };
		prev = current;
		current = next;
		if current == start {
			break;
		}
		if visited_edges > proof.nonces.len() {
			return Err(CuckooError::WrongCycleLength(proof.nonces.len()));
		}
	}

	if visited_edges != proof.nonces.len() {
		return Err(CuckooError::WrongCycleLength(proof.nonces.len()));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_unsorted_nonces() {
		let proof = Proof {
			edge_bits: 10,
			nonces: vec![5, 3],
		};
		let hash = Hash::default();
		assert_eq!(verify(&hash, &proof), Err(CuckooError::NoncesNotSorted));
	}

	#[test]
	fn rejects_out_of_range_nonce() {
		let proof = Proof {
			edge_bits: 4,
			nonces: vec![1, 1 << 4],
		};
		let hash = Hash::default();
		assert_eq!(verify(&hash, &proof), Err(CuckooError::NonceOutOfRange));
	}
}
