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

//! Definition of the genesis block: no inputs, no outputs, no kernels,
//! height zero. Every chain in this workspace (the real network and any
//! test fixture) starts a `ChainState` from one of these.

use crate::core::hash::Hash;
use crate::core::{Block, BlockHeader, TransactionBody};
use crate::crypto::BlindingFactor;
use crate::pow::Difficulty;

/// The genesis block. Real deployments would fix this to a specific
/// timestamp and pre-mined proof of work; this workspace has no network
/// to be compatible with, so it stamps the height-zero header with a
/// zero-valued, always-previous-hash-is-zero header and an empty body.
pub fn genesis() -> Block {
	Block {
		header: BlockHeader {
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
			pow: crate::pow::ProofOfWork {
				total_difficulty: Difficulty::min(),
				difficulty: Difficulty::min(),
				nonce: 0,
				proof: crate::pow::Proof {
					edge_bits: 0,
					nonces: Vec::new(),
				},
			},
		},
		body: TransactionBody::empty(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn genesis_is_height_zero_with_empty_body() {
		let gen = genesis();
		assert_eq!(gen.header.height, 0);
		assert_eq!(gen.header.previous, Hash::default());
		assert!(gen.body.inputs.is_empty());
		assert!(gen.body.outputs.is_empty());
		assert!(gen.body.kernels.is_empty());
	}
}
