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

//! Header-only admission: linear extension of the candidate chain and
//! the stateful checks that reject a bad header before it ever touches
//! the chain index.

mod support;

use std::fs;

use mw_core::core::hash::Hashed;
use mw_core::core::{Block, BlockHeader};
use mw_core::pow::Difficulty;
use mw_chain::{ChainName, ChainState, ErrorKind};

fn child_of(parent: &BlockHeader, total_difficulty: Difficulty) -> BlockHeader {
	let mut header = BlockHeader::default();
	header.height = parent.height + 1;
	header.previous = parent.hash();
	header.timestamp = parent.timestamp + 100;
	header.pow.total_difficulty = total_difficulty;
	support::mine(&mut header, Difficulty::min());
	header
}

#[test]
fn add_header_extends_candidate_chain() {
	let root = support::temp_root("extends_candidate");
	let genesis = Block::default();
	let chain = ChainState::new(&root, &genesis).unwrap();

	assert_eq!(chain.height(ChainName::Confirmed), Some(0));
	assert_eq!(chain.height(ChainName::Candidate), Some(0));

	let header1 = child_of(&genesis.header, Difficulty::from_num(2));
	chain.add_header(header1.clone()).unwrap();

	assert_eq!(chain.height(ChainName::Candidate), Some(1));
	assert_eq!(chain.header_at_tip(ChainName::Candidate).unwrap(), Some(header1));
	// Header sync never moves the confirmed chain; only full blocks do.
	assert_eq!(chain.height(ChainName::Confirmed), Some(0));

	fs::remove_dir_all(&root).ok();
}

#[test]
fn add_header_rejects_unknown_parent() {
	let root = support::temp_root("unknown_parent");
	let genesis = Block::default();
	let chain = ChainState::new(&root, &genesis).unwrap();

	let mut orphan = BlockHeader::default();
	orphan.height = 5;
	orphan.previous = mw_core::core::hash::Hash::from_hex(&"ab".repeat(32)).unwrap();
	orphan.timestamp = genesis.header.timestamp + 100;
	orphan.pow.total_difficulty = Difficulty::from_num(2);
	support::mine(&mut orphan, Difficulty::min());

	let err = chain.add_header(orphan).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::InvalidHeader(_)));

	fs::remove_dir_all(&root).ok();
}

#[test]
fn add_header_rejects_non_advancing_timestamp() {
	let root = support::temp_root("bad_timestamp");
	let genesis = Block::default();
	let chain = ChainState::new(&root, &genesis).unwrap();

	let mut header1 = BlockHeader::default();
	header1.height = 1;
	header1.previous = genesis.header.hash();
	header1.timestamp = genesis.header.timestamp;
	header1.pow.total_difficulty = Difficulty::from_num(2);
	support::mine(&mut header1, Difficulty::min());

	let err = chain.add_header(header1).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::InvalidHeader(_)));

	fs::remove_dir_all(&root).ok();
}

#[test]
fn add_header_rejects_non_increasing_difficulty() {
	let root = support::temp_root("bad_difficulty");
	let genesis = Block::default();
	let chain = ChainState::new(&root, &genesis).unwrap();

	// Genesis already carries `Difficulty::min()` as its total difficulty;
	// a child claiming the same total makes no forward progress.
	let header1 = child_of(&genesis.header, Difficulty::min());

	let err = chain.add_header(header1).unwrap_err();
	assert!(matches!(err.kind(), ErrorKind::InvalidHeader(_)));

	fs::remove_dir_all(&root).ok();
}

#[test]
fn sibling_header_is_indexed_but_does_not_move_candidate_tip() {
	let root = support::temp_root("sibling_header");
	let genesis = Block::default();
	let chain = ChainState::new(&root, &genesis).unwrap();

	let header1 = child_of(&genesis.header, Difficulty::from_num(2));
	chain.add_header(header1.clone()).unwrap();

	// Same parent as header1, but a later timestamp and more difficulty:
	// a genuine competing sibling, not a fork extending header1.
	let mut header2 = BlockHeader::default();
	header2.height = 1;
	header2.previous = genesis.header.hash();
	header2.timestamp = header1.timestamp + 1;
	header2.pow.total_difficulty = Difficulty::from_num(3);
	support::mine(&mut header2, Difficulty::min());

	chain.add_header(header2.clone()).unwrap();

	// Registering a sibling never moves the candidate tip on its own;
	// only a header that directly extends it does.
	assert_eq!(chain.header_at_tip(ChainName::Candidate).unwrap(), Some(header1));

	fs::remove_dir_all(&root).ok();
}
