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

//! All the consensus-critical constants. Changing any of these changes
//! what blocks validate, so they live in one place rather than scattered
//! across the validators that use them.

/// Block reward, in the smallest indivisible unit.
pub const REWARD: u64 = 1_000_000_000;

/// Target block interval, in seconds.
pub const BLOCK_TIME_SEC: u64 = 15;

/// Number of blocks used to smooth the difficulty adjustment window.
pub const DIFFICULTY_ADJUST_WINDOW: u64 = 60;

/// Clamp factor for difficulty adjustment: the adjustment can move the
/// target by at most this factor in either direction per window.
pub const CLAMP_FACTOR: u64 = 4;

/// Minimum accepted difficulty, for the earliest blocks of a new chain.
pub const MIN_DIFFICULTY: u64 = 1;

/// Proof-of-work cycle length required by [`crate::pow::cuckoo`].
pub const PROOFSIZE: usize = 42;

/// Default Cuckoo Cycle graph size, as `2^edge_bits` edges.
pub const DEFAULT_EDGE_BITS: u8 = 29;

/// Coinbase outputs and kernels must mature this many blocks before they
/// can be spent.
pub const COINBASE_MATURITY: u64 = 1_440;

/// Hard cap on the number of inputs, outputs or kernels a single
/// transaction or block body may carry. Exists purely to bound
/// deserialization cost for a hostile peer.
pub const MAX_IN_OUT_LEN: u64 = 50_000;

/// Distance, in blocks, behind the confirmed chain tip beyond which
/// historical block data is no longer needed to validate new blocks and
/// may be pruned from the TxHashSet's backing MMRs.
pub const CUT_THROUGH_HORIZON: u64 = 5_000;

/// Number of blocks of headers a fresh peer connection is allowed to be
/// behind the theoretical "sync" head before the sync state machine
/// prefers fetching from a different peer.
pub const STATE_SYNC_THRESHOLD: u64 = 5;

/// How far into the future a header's timestamp may claim to be relative
/// to the local clock before it is rejected outright.
pub const MAX_FUTURE_SECS: u64 = 15 * 60;

/// Returns the overall creation reward for a block at the given height.
/// No halving schedule is modeled since the reward is currently constant;
/// the height parameter is kept so a future emission curve only needs to
/// change this one function.
pub fn reward(_height: u64) -> u64 {
	REWARD
}
