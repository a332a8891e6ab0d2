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

//! Core data model: hashing, transactions, blocks and the Merkle Mountain
//! Range they're indexed by.

pub mod block;
pub mod hash;
pub mod pmmr;
pub mod prune_list;
pub mod transaction;

pub use self::block::{Block, BlockError, BlockHeader};
pub use self::hash::{Hash, Hashed};
pub use self::pmmr::{Backend as PMMRBackend, PMMRable, PMMR};
pub use self::prune_list::PruneList;
pub use self::transaction::{
	Input, KernelFeatures, Output, OutputFeatures, Transaction, TransactionBody, TransactionError,
	TransactionKernel,
};
