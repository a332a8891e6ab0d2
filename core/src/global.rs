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

//! Process-wide values that vary by network but aren't themselves
//! consensus rules: which `ChainType` this node runs as, and the
//! parameters (proof-of-work graph size, coinbase maturity) that differ
//! between a production chain and a throwaway automated-test chain.
//! Should be used sparingly; almost everything belongs in
//! [`crate::consensus`] instead.

use mw_util::RwLock;

use crate::consensus::{COINBASE_MATURITY, DEFAULT_EDGE_BITS, PROOFSIZE};

/// Which network a node is participating in, set once at startup from
/// configuration and read by anything that needs network-specific
/// parameters (genesis block, proof-of-work graph size, coinbase
/// maturity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
	/// Throwaway chain for unit and integration tests: tiny graph size,
	/// near-instant coinbase maturity.
	AutomatedTesting,
	/// Larger graph size than automated testing but still cheap to mine,
	/// for manual end-to-end testing.
	UserTesting,
	/// A real, independent test network mirroring mainnet's parameters.
	Testnet,
	/// Production network.
	Mainnet,
}

const AUTOMATED_TESTING_EDGE_BITS: u8 = 10;
const AUTOMATED_TESTING_PROOF_SIZE: usize = 4;
const AUTOMATED_TESTING_COINBASE_MATURITY: u64 = 3;

const USER_TESTING_EDGE_BITS: u8 = 16;
const USER_TESTING_COINBASE_MATURITY: u64 = 3;

lazy_static! {
	/// The chain type this process is running as.
	pub static ref CHAIN_TYPE: RwLock<ChainType> = RwLock::new(ChainType::Mainnet);
}

/// Sets the process-wide chain type. Should be called exactly once,
/// early in startup, before anything reads it.
pub fn set_chain_type(chain_type: ChainType) {
	*CHAIN_TYPE.write() = chain_type;
}

/// The process-wide chain type.
pub fn chain_type() -> ChainType {
	*CHAIN_TYPE.read()
}

/// Proof-of-work graph size (`edge_bits`) required for the current chain
/// type.
pub fn proofsize() -> usize {
	match chain_type() {
		ChainType::AutomatedTesting => AUTOMATED_TESTING_PROOF_SIZE,
		_ => PROOFSIZE,
	}
}

/// Proof-of-work graph size (`edge_bits`) required for the current chain
/// type.
pub fn min_edge_bits() -> u8 {
	match chain_type() {
		ChainType::AutomatedTesting => AUTOMATED_TESTING_EDGE_BITS,
		ChainType::UserTesting => USER_TESTING_EDGE_BITS,
		ChainType::Testnet | ChainType::Mainnet => DEFAULT_EDGE_BITS,
	}
}

/// Coinbase maturity, in blocks, for the current chain type.
pub fn coinbase_maturity() -> u64 {
	match chain_type() {
		ChainType::AutomatedTesting => AUTOMATED_TESTING_COINBASE_MATURITY,
		ChainType::UserTesting => USER_TESTING_COINBASE_MATURITY,
		ChainType::Testnet | ChainType::Mainnet => COINBASE_MATURITY,
	}
}

/// Whether this process is running against a throwaway test chain.
pub fn is_testing_chain_type() -> bool {
	matches!(
		chain_type(),
		ChainType::AutomatedTesting | ChainType::UserTesting
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn automated_testing_uses_tiny_graph() {
		set_chain_type(ChainType::AutomatedTesting);
		assert_eq!(min_edge_bits(), AUTOMATED_TESTING_EDGE_BITS);
		set_chain_type(ChainType::Mainnet);
	}
}
