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

//! Integration-level checks of the PMMR against a larger sequence than
//! the unit tests bother with, closer to what a real header or output
//! MMR sees over the life of a chain.

use mw_core::core::pmmr::{n_leaves, peaks, postorder_height, VecBackend, PMMR};
use mw_core::ser::{Error as SerError, Writeable, Writer};

#[derive(Clone, Debug)]
struct Leaf(u64);

impl Writeable for Leaf {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
		writer.write_u64(self.0)
	}
}

#[test]
fn growing_mmr_keeps_consistent_peaks() {
	let mut backend = VecBackend::default();
	let mut pmmr = PMMR::new(&mut backend);

	let mut roots = Vec::new();
	for i in 0..100u64 {
		pmmr.push(&Leaf(i)).unwrap();
		roots.push(pmmr.root().unwrap());
		assert_eq!(n_leaves(pmmr.last_pos()), i + 1);
	}

	// every intermediate root must be unique: no two prefixes of the
	// sequence should ever hash to the same value
	let mut sorted = roots.clone();
	sorted.sort();
	sorted.dedup();
	assert_eq!(sorted.len(), roots.len());
}

#[test]
fn peaks_is_empty_only_for_empty_mmr() {
	assert!(peaks(0).is_empty());
	for size in [1u64, 3, 4, 7, 10, 100] {
		if postorder_height(size + 1) <= postorder_height(size) {
			assert!(!peaks(size).is_empty(), "size {}", size);
		}
	}
}

#[test]
fn pruning_a_leaf_does_not_change_the_root() {
	let mut backend = VecBackend::default();
	let mut pmmr = PMMR::new(&mut backend);
	for i in 0..8u64 {
		pmmr.push(&Leaf(i)).unwrap();
	}
	let root_before = pmmr.root().unwrap();
	pmmr.prune(1).unwrap();
	let root_after = pmmr.root().unwrap();
	assert_eq!(root_before, root_after);
}
