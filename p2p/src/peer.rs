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

//! A single remote peer: its advertised identity plus the live
//! connection used to talk to it. Everything here is safe to share
//! across threads; `ChainState` and this module use the same
//! shared-for-reads, exclusive-for-writes locking style.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use mw_core::core::hash::Hash;
use mw_core::core::{Block, BlockHeader, Transaction};
use mw_core::pow::Difficulty;
use mw_util::RwLock;

use crate::conn::Connection;
use crate::msg::{GetBlock, GetHeaders, GetPeerAddrs, Ping, Type};
use crate::types::{Capabilities, Error, PeerInfo};

/// A connected remote peer. Total difficulty and height are updated from
/// `Pong` replies and rebroadcast headers; everything else is fixed at
/// handshake time.
pub struct Peer {
	info: RwLock<PeerInfo>,
	conn: Connection,
	total_difficulty: AtomicU64,
	height: AtomicU64,
}

impl Peer {
	pub fn new(info: PeerInfo, conn: Connection) -> Peer {
		let total_difficulty = info.total_difficulty.to_num();
		let height = info.height;
		Peer {
			info: RwLock::new(info),
			conn,
			total_difficulty: AtomicU64::new(total_difficulty),
			height: AtomicU64::new(height),
		}
	}

	pub fn addr(&self) -> SocketAddr {
		self.info.read().addr
	}

	pub fn capabilities(&self) -> Capabilities {
		self.info.read().capabilities
	}

	pub fn info(&self) -> PeerInfo {
		self.info.read().clone()
	}

	/// Total difficulty last heard from this peer, via handshake or
	/// `Pong`.
	pub fn total_difficulty(&self) -> Difficulty {
		Difficulty::from_num(self.total_difficulty.load(Ordering::Relaxed))
	}

	pub fn height(&self) -> u64 {
		self.height.load(Ordering::Relaxed)
	}

	/// Records a new tip heard from this peer without touching the
	/// socket, called from the `Pong` and `Headers` handlers.
	pub fn update_tip(&self, total_difficulty: Difficulty, height: u64) {
		self.total_difficulty
			.store(total_difficulty.to_num(), Ordering::Relaxed);
		self.height.store(height, Ordering::Relaxed);
		let mut info = self.info.write();
		info.total_difficulty = total_difficulty;
		info.height = height;
	}

	pub fn send_ping(&self, total_difficulty: Difficulty, height: u64) -> Result<(), Error> {
		self.conn
			.send_msg(Type::Ping, &Ping { total_difficulty, height })
	}

	pub fn send_block(&self, block: &Block) -> Result<(), Error> {
		self.conn
			.send_msg(Type::Block, &crate::msg::BlockMsg { block: block.clone() })
	}

	pub fn send_header(&self, header: &BlockHeader) -> Result<(), Error> {
		self.conn.send_msg(
			Type::Header,
			&crate::msg::HeaderMsg { header: header.clone() },
		)
	}

	pub fn send_transaction(&self, tx: &Transaction) -> Result<(), Error> {
		self.conn
			.send_msg(Type::Transaction, &crate::msg::TransactionMsg { tx: tx.clone() })
	}

	pub fn send_header_request(&self, locator: Vec<Hash>) -> Result<(), Error> {
		self.conn.send_msg(Type::GetHeaders, &GetHeaders { locator })
	}

	pub fn send_block_request(&self, hash: Hash) -> Result<(), Error> {
		self.conn.send_msg(Type::GetBlock, &GetBlock { hash })
	}

	pub fn send_peer_request(&self, capabilities: Capabilities) -> Result<(), Error> {
		self.conn
			.send_msg(Type::GetPeerAddrs, &GetPeerAddrs { capabilities })
	}

	pub(crate) fn conn(&self) -> &Connection {
		&self.conn
	}

	/// Whether the underlying connection has gone quiet past the
	/// inactivity timeout.
	pub fn is_inactive(&self) -> bool {
		self.conn.is_inactive()
	}
}
