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

//! Core data types, serialization, proof-of-work verification and the
//! Merkle Mountain Range shared by every other crate in the workspace.
//! Cryptographic primitives (Pedersen commitments, Schnorr signatures,
//! bulletproofs) are only ever consumed here through [`crypto`], never
//! implemented.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

pub mod consensus;
pub mod core;
pub mod crypto;
pub mod genesis;
pub mod global;
pub mod pow;
pub mod ser;

pub use crate::core::{
	Block, BlockError, BlockHeader, Hash, Hashed, Input, KernelFeatures, Output, OutputFeatures,
	Transaction, TransactionBody, TransactionError, TransactionKernel,
};
pub use crate::genesis::genesis;
