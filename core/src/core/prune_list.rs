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

//! Tracks which MMR positions have been pruned so a compacting backend
//! can translate a logical MMR position into its actual offset in a
//! backing file that no longer has gaps for the pruned subtrees.
//!
//! Only whole pruned subtrees are ever recorded: once every leaf beneath
//! a parent is gone, the parent's position replaces its children in the
//! set and the children are dropped from it, keeping the set's size
//! proportional to the number of *distinct* pruned roots rather than the
//! number of pruned leaves.

use croaring::Bitmap;

use crate::core::pmmr::postorder_height;

/// Positions of the root of every pruned subtree, plus leftover leaves
/// not yet part of a fully pruned subtree.
#[derive(Default)]
pub struct PruneList {
	pruned_roots: Bitmap,
}

/// Returns `(parent, sibling)` of a node at postorder position `pos`,
/// derived the same way `PMMR::push`'s carry walk derives a new parent:
/// if the next position's height is greater than this one's, this node
/// is the left child and the parent sits one position to the right;
/// otherwise this is the right child and its sibling is found first.
fn family(pos: u64) -> (u64, u64) {
	let height = postorder_height(pos);
	let next_height = postorder_height(pos + 1);
	if next_height > height {
		(pos + 1, pos - ((1 << (height + 1)) - 1))
	} else {
		let sibling = pos + (1 << (height + 1)) - 1;
		(sibling + 1, sibling)
	}
}

impl PruneList {
	/// Builds an empty prune list.
	pub fn new() -> PruneList {
		PruneList::default()
	}

	/// Whether `pos` has been pruned, directly or because it's beneath a
	/// pruned root.
	pub fn is_pruned(&self, pos: u64) -> bool {
		if self.pruned_roots.contains(pos as u32) {
			return true;
		}
		// walk up to see if any ancestor root is in the set; only needed
		// while pos's own ancestors haven't been compacted into the
		// bitmap yet, which add() prevents from lingering, but a cheap
		// direct check keeps this correct even if that invariant slips.
		let mut current = pos;
		loop {
			let (parent, _) = family(current);
			if self.pruned_roots.contains(parent as u32) {
				return true;
			}
			if parent == current {
				return false;
			}
			current = parent;
			if current > pos + (1 << 32) {
				return false;
			}
		}
	}

	/// Marks `pos` pruned, and recursively absorbs its parent into the
	/// set if doing so makes the parent's whole subtree pruned (i.e. its
	/// sibling is pruned too).
	pub fn add(&mut self, pos: u64) {
		let mut current = pos;
		loop {
			let (parent, sibling) = family(current);
			if self.pruned_roots.contains(sibling as u32) {
				self.pruned_roots.remove(sibling as u32);
				current = parent;
			} else {
				self.pruned_roots.add(current as u32);
				break;
			}
		}
	}

	/// Number of MMR positions that should be skipped when translating a
	/// logical position above `pos` into its backend offset: the total
	/// node count of every pruned subtree rooted below `pos`.
	pub fn get_shift(&self, pos: u64) -> u64 {
		self.pruned_roots
			.iter()
			.filter(|&root| (root as u64) < pos)
			.map(|root| {
				let height = postorder_height(root as u64);
				2 * ((1u64 << height) - 1)
			})
			.sum()
	}

	/// As [`PruneList::get_shift`] but counting only leaves, used by a
	/// backend that stores per-leaf data (range proofs, outputs) in a
	/// separate flat file from the MMR hash file.
	pub fn get_leaf_shift(&self, pos: u64) -> u64 {
		self.pruned_roots
			.iter()
			.filter(|&root| (root as u64) < pos)
			.map(|root| {
				let height = postorder_height(root as u64);
				if height == 0 {
					0
				} else {
					1u64 << height
				}
			})
			.sum()
	}

	/// Total count of pruned subtree roots currently tracked.
	pub fn len(&self) -> u64 {
		self.pruned_roots.cardinality()
	}

	/// Whether nothing has been pruned yet.
	pub fn is_empty(&self) -> bool {
		self.pruned_roots.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prune_single_leaf() {
		let mut list = PruneList::new();
		list.add(1);
		assert!(list.is_pruned(1));
		assert!(!list.is_pruned(2));
	}

	#[test]
	fn pruning_both_children_compacts_parent() {
		// positions 1 and 2 are leaves, 3 is their parent
		let mut list = PruneList::new();
		list.add(1);
		assert_eq!(list.len(), 1);
		list.add(2);
		// both children pruned: they collapse into parent position 3
		assert_eq!(list.len(), 1);
		assert!(list.is_pruned(1));
		assert!(list.is_pruned(2));
		assert!(list.is_pruned(3));
	}
}
