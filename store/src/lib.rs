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

//! Storage layer: LMDB-backed key/value access, append-only hash files
//! for MMRs, and the header index used to track forks.

pub mod block_store;
pub mod chain_store;
pub mod hash_file;
pub mod lmdb;
pub mod pmmr_backend;

pub use crate::block_store::BlockStore;
pub use crate::chain_store::{ChainName, ChainStore, ChainStoreError};
pub use crate::hash_file::HashFile;
pub use crate::lmdb::{Error, Store};
pub use crate::pmmr_backend::PMMRBackend;
