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

//! Append-only Merkle Mountain Range.
//!
//! An MMR is a sequence of perfect binary trees ("mountains"), each
//! strictly smaller than the one to its left, packed into a single
//! postorder-traversal position space so the whole structure is just a
//! flat, ever-growing list of hashes. Positions start at 1 and follow the
//! height sequence `0 0 1 0 0 1 2 0 0 1 0 0 1 2 3 ...`: a leaf sits at
//! height 0, and every time two equal-height peaks meet, a new parent
//! node is appended one position later summing them.
//!
//! Navigation within that position space needs no stored tree shape at
//! all, only a handful of bit tricks on the position itself. That's what
//! [`postorder_height`] and its siblings provide; [`PMMR`] builds the
//! actual push/root/prune API on top of them, backed by anything
//! implementing [`Backend`].

use std::fmt::Debug;
use std::marker::PhantomData;

use crate::core::hash::{combine_hash, Hash, Hashed};
use crate::ser::{Error as SerError, Readable, Reader, Writeable, Writer};

/// Anything that can sit at a leaf of a PMMR: hashable and serializable.
pub trait PMMRable: Writeable + Clone + Debug {}
impl<T: Writeable + Clone + Debug> PMMRable for T {}

/// Storage backend for a PMMR: append new leaf/parent hash pairs, fetch a
/// hash by position, and drop positions that pruning no longer needs.
/// Implementations range from a plain in-memory `Vec` (used by tests and
/// the header MMR, which is never pruned) to an append-only file backed
/// by a [`crate::core::prune_list::PruneList`] bitmap.
pub trait Backend {
	/// Appends hashes starting at `last_pos + 1`.
	fn append(&mut self, hashes: &[Hash]) -> Result<(), String>;
	/// Fetches the hash at `position`, if not pruned away.
	fn get(&self, position: u64) -> Option<Hash>;
	/// Removes the hashes at the given positions. A no-op for backends
	/// that don't implement pruning.
	fn remove(&mut self, positions: &[u64]) -> Result<(), String>;
	/// Total number of positions ever appended, including pruned ones;
	/// the high-water mark the next `append` continues from.
	fn unpruned_size(&self) -> u64;
	/// Truncates the backend back to `pos`, discarding everything after
	/// it. Used to undo a speculative batch of pushes.
	fn rewind(&mut self, pos: u64) -> Result<(), String>;
}

/// An in-memory `Vec`-backed MMR store, used for the header MMR (small,
/// never pruned) and in tests.
#[derive(Clone, Debug, Default)]
pub struct VecBackend {
	hashes: Vec<Option<Hash>>,
}

impl Backend for VecBackend {
	fn append(&mut self, hashes: &[Hash]) -> Result<(), String> {
		self.hashes.extend(hashes.iter().map(|h| Some(*h)));
		Ok(())
	}

	fn get(&self, position: u64) -> Option<Hash> {
		self.hashes.get((position - 1) as usize).and_then(|h| *h)
	}

	fn remove(&mut self, positions: &[u64]) -> Result<(), String> {
		for &pos in positions {
			if let Some(slot) = self.hashes.get_mut((pos - 1) as usize) {
				*slot = None;
			}
		}
		Ok(())
	}

	fn unpruned_size(&self) -> u64 {
		self.hashes.len() as u64
	}

	fn rewind(&mut self, pos: u64) -> Result<(), String> {
		self.hashes.truncate(pos as usize);
		Ok(())
	}
}

/// Append-only Merkle Mountain Range over an arbitrary [`Backend`].
/// Positions are 1-based postorder traversal indices, not leaf indices;
/// [`PMMR::push`] returns the position a new leaf actually landed at,
/// which callers must record if they ever want to prune or prove it
/// later.
pub struct PMMR<'a, B: Backend> {
	backend: &'a mut B,
}

impl<'a, B: Backend> PMMR<'a, B> {
	/// Wraps a backend for a sequence of MMR operations.
	pub fn new(backend: &'a mut B) -> PMMR<'a, B> {
		PMMR { backend }
	}

	/// Position of the most recently appended node, pruned or not.
	pub fn last_pos(&self) -> u64 {
		self.backend.unpruned_size()
	}

	/// Pushes a new leaf, computing and appending every parent node that
	/// completes as a result (a new leaf can complete one or more
	/// carries, the way adding 1 to `0111` in binary carries all the way
	/// to `1000`). Returns the position the leaf was written at.
	pub fn push<T: PMMRable>(&mut self, elmt: &T) -> Result<u64, String> {
		let elmt_pos = self.last_pos() + 1;
		let mut current_hash = leaf_hash(elmt_pos, elmt);
		let mut to_append = vec![current_hash];

		let mut height = 0;
		let mut pos = elmt_pos;
		while postorder_height(pos + 1) > height {
			let left_pos = jump_left_sibling(pos);
			let left_hash = self
				.backend
				.get(left_pos)
				.ok_or_else(|| format!("missing left sibling at {} while pushing", left_pos))?;
			let parent_pos = pos + 1;
			current_hash = combine_hash(parent_pos, &left_hash, &current_hash);
			to_append.push(current_hash);
			height += 1;
			pos += 1;
		}

		self.backend.append(&to_append)?;
		Ok(elmt_pos)
	}

	/// The bagged root of every peak in the range, the single hash that
	/// commits to the whole MMR's contents. Peaks are folded right to
	/// left, each new peak hashed together with the accumulator so far.
	pub fn root(&self) -> Result<Hash, String> {
		let peak_positions = peaks(self.last_pos());
		let mut iter = peak_positions.into_iter().rev();
		let mut acc = match iter.next() {
			Some(pos) => self
				.backend
				.get(pos)
				.ok_or_else(|| format!("missing peak at {}", pos))?,
			None => return Ok(Hash::default()),
		};
		for pos in iter {
			let h = self
				.backend
				.get(pos)
				.ok_or_else(|| format!("missing peak at {}", pos))?;
			acc = combine_hash(pos, &h, &acc);
		}
		Ok(acc)
	}

	/// Removes a leaf from the backend and, as a result, any of its
	/// ancestors that end up with no remaining live child. Only leaves
	/// (height 0 positions) can be pruned directly.
	pub fn prune(&mut self, position: u64) -> Result<(), String> {
		if postorder_height(position) != 0 {
			return Err(format!("position {} is not a leaf", position));
		}

		let mut to_prune = vec![position];
		let mut current = position;
		while current + 1 < self.last_pos() {
			let current_height = postorder_height(current);
			let next_height = postorder_height(current + 1);

			let (sibling, parent) = if next_height > current_height {
				(jump_left_sibling(current), current + 1)
			} else {
				let sib = jump_right_sibling(current);
				(sib, sib + 1)
			};

			if parent > self.last_pos() {
				break;
			}
			if self.backend.get(sibling).is_none() {
				to_prune.push(parent);
				current = parent;
			} else {
				break;
			}
		}

		self.backend.remove(&to_prune)
	}

	/// Discards every node appended after `pos`, undoing a batch of
	/// pushes that shouldn't be kept (e.g. after a block fails
	/// validation partway through being applied).
	pub fn rewind(&mut self, pos: u64) -> Result<(), String> {
		self.backend.rewind(pos)
	}
}

fn leaf_hash<T: PMMRable>(position: u64, elmt: &T) -> Hash {
	let inner = elmt.hash();
	combine_hash(position, &inner, &inner)
}

/// Positions, left to right, of every peak in an MMR whose last occupied
/// position is `size`. The leftmost peak is always the tallest; each
/// subsequent one is strictly shorter, matching the "mountain range"
/// silhouette the structure is named for. Empty MMR (`size == 0`) has no
/// peaks.
pub fn peaks(size: u64) -> Vec<u64> {
	if size == 0 {
		return vec![];
	}
	if postorder_height(size + 1) > postorder_height(size) {
		// an extra sibling exists with no parent yet: not a valid full
		// range to bag, caller should not have called root() here.
		return vec![];
	}

	let mut top = 1u64;
	while (top - 1) <= size {
		top <<= 1;
	}
	top = (top >> 1) - 1;
	if top == 0 {
		return vec![1];
	}

	let mut result = vec![top];
	let mut peak = top;
	loop {
		peak = jump_right_sibling(peak);
		while peak > size {
			match move_down_left(peak) {
				Some(p) => peak = p,
				None => return result,
			}
		}
		result.push(peak);
	}
}

/// Height of the node at postorder position `num`, the base every other
/// navigation primitive in this module builds on. See the module docs of
/// the upstream MMR note for the bit-trick derivation: repeatedly jump to
/// the leftmost node of the subtree containing `num` until the position
/// is all-ones in binary, then the height is the bit-length of that value
/// minus one.
pub fn postorder_height(num: u64) -> u64 {
	let mut h = num;
	while !all_ones(h) {
		h = jump_left(h);
	}
	most_significant_pos(h).saturating_sub(1)
}

fn jump_left(num: u64) -> u64 {
	num - ((1 << (most_significant_pos(num) - 1)) - 1)
}

fn move_down_left(num: u64) -> Option<u64> {
	let height = postorder_height(num);
	if height == 0 {
		return None;
	}
	Some(num - (1 << height))
}

fn jump_right_sibling(num: u64) -> u64 {
	num + (1 << (postorder_height(num) + 1)) - 1
}

fn jump_left_sibling(num: u64) -> u64 {
	num - ((1 << (postorder_height(num) + 1)) - 1)
}

fn all_ones(num: u64) -> bool {
	if num == 0 {
		return false;
	}
	let mut bit = 1;
	while num >= bit {
		if num & bit == 0 {
			return false;
		}
		bit = (bit << 1) | 1;
	}
	true
}

fn most_significant_pos(num: u64) -> u64 {
	let mut pos = 0;
	let mut bit = 1;
	while num >= bit {
		bit <<= 1;
		pos += 1;
	}
	pos
}

/// Number of leaves in an MMR whose last occupied postorder position is
/// `size`, i.e. the inverse of tracking how many insertions happened.
pub fn n_leaves(size: u64) -> u64 {
	let mut remaining = size;
	let mut leaves = 0u64;
	for &peak in peaks(size).iter() {
		let height = postorder_height(peak);
		leaves += 1 << height;
		remaining = remaining.saturating_sub((1 << (height + 1)) - 1);
	}
	debug_assert_eq!(remaining, 0);
	leaves
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Debug)]
	struct Leaf(u64);

	impl Writeable for Leaf {
		fn write<W: Writer>(&self, writer: &mut W) -> Result<(), SerError> {
			writer.write_u64(self.0)
		}
	}

	#[test]
	fn postorder_height_matches_known_sequence() {
		let expected = [0u64, 0, 1, 0, 0, 1, 2, 0, 0, 1, 0, 0, 1, 2, 3];
		for (i, &h) in expected.iter().enumerate() {
			assert_eq!(postorder_height((i + 1) as u64), h, "position {}", i + 1);
		}
	}

	#[test]
	fn push_and_root_three_leaves() {
		let mut backend = VecBackend::default();
		let mut pmmr = PMMR::new(&mut backend);
		pmmr.push(&Leaf(1)).unwrap();
		pmmr.push(&Leaf(2)).unwrap();
		pmmr.push(&Leaf(3)).unwrap();
		// 3 leaves -> positions 1,2,3(parent),4 : last_pos = 4
		assert_eq!(pmmr.last_pos(), 4);
		let root = pmmr.root().unwrap();
		assert_ne!(root, Hash::default());
	}

	#[test]
	fn root_is_stable_for_same_sequence() {
		let mut b1 = VecBackend::default();
		let mut b2 = VecBackend::default();
		{
			let mut p1 = PMMR::new(&mut b1);
			for i in 0..7 {
				p1.push(&Leaf(i)).unwrap();
			}
		}
		{
			let mut p2 = PMMR::new(&mut b2);
			for i in 0..7 {
				p2.push(&Leaf(i)).unwrap();
			}
		}
		let r1 = PMMR::new(&mut b1).root().unwrap();
		let r2 = PMMR::new(&mut b2).root().unwrap();
		assert_eq!(r1, r2);
	}

	#[test]
	fn rewind_truncates_and_changes_root() {
		let mut backend = VecBackend::default();
		let mut pmmr = PMMR::new(&mut backend);
		pmmr.push(&Leaf(1)).unwrap();
		let pos_after_one = pmmr.last_pos();
		let root_after_one = pmmr.root().unwrap();
		pmmr.push(&Leaf(2)).unwrap();
		pmmr.push(&Leaf(3)).unwrap();
		pmmr.rewind(pos_after_one).unwrap();
		assert_eq!(pmmr.last_pos(), pos_after_one);
		assert_eq!(pmmr.root().unwrap(), root_after_one);
	}

	#[test]
	fn n_leaves_counts_correctly() {
		let mut backend = VecBackend::default();
		let mut pmmr = PMMR::new(&mut backend);
		for i in 0..5 {
			pmmr.push(&Leaf(i)).unwrap();
		}
		assert_eq!(n_leaves(pmmr.last_pos()), 5);
	}
}
