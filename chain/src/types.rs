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

//! Base types shared across chain state management.

use mw_core::core::hash::{Hash, Hashed};
use mw_core::core::BlockHeader;
use mw_core::pow::Difficulty;

/// A handle to the leaf of a fork: its height, the last two block hashes
/// for convenience, and the accumulated total difficulty. `ChainStore`
/// tracks one of these per named chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tip {
	/// Height of the tip.
	pub height: u64,
	/// Hash of the last block on this fork.
	pub last_block_h: Hash,
	/// Hash of the block previous to the last.
	pub prev_block_h: Hash,
	/// Total difficulty accumulated on this fork.
	pub total_difficulty: Difficulty,
}

impl Tip {
	/// Tip at height zero for a given genesis hash.
	pub fn new(genesis_hash: Hash) -> Tip {
		Tip {
			height: 0,
			last_block_h: genesis_hash,
			prev_block_h: genesis_hash,
			total_difficulty: Difficulty::min(),
		}
	}

	/// The tip resulting from appending `header` to the chain.
	pub fn from_header(header: &BlockHeader) -> Tip {
		Tip {
			height: header.height,
			last_block_h: header.hash(),
			prev_block_h: header.previous,
			total_difficulty: header.pow.total_difficulty,
		}
	}
}
