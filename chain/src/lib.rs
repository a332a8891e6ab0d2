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

//! Chain state management: the header/block admission pipeline, the
//! multi-chain index, the orphan pool and the TxHashSet, composed behind
//! a single coordinator so callers never juggle more than one lock.

pub mod chain_state;
pub mod error;
pub mod orphans;
pub mod pipe;
pub mod txhashset;
pub mod types;

pub use crate::chain_state::ChainState;
pub use crate::error::{Error, ErrorKind};
pub use crate::orphans::OrphanBlockPool;
pub use crate::txhashset::TxHashSet;
pub use crate::types::Tip;

pub use mw_store::ChainName;
