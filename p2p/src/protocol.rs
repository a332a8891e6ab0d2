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

//! The dispatch table: turns a decoded message into chain/peer-manager
//! calls and the `ProcessMsgResult` the connection's reader loop acts
//! on. One [`MessageProcessor`] is shared by every connection; per-peer
//! state lives on the `Peer` handed to each call.

use std::io::Cursor;
use std::sync::Arc;

use log::{debug, warn};

use mw_chain::{ChainName, ChainState};
use mw_core::core::hash::Hashed;
use mw_core::ser::{Readable, StreamingReader};
use mw_util::zip;

use crate::msg::{
	self, BlockMsg, CompactBlock, GetBlock, GetHeaders, GetPeerAddrs, HeaderMsg, Headers,
	PeerAddrs, Ping, Pong, TransactionMsg, TxHashSetArchive, TxHashSetRequest, Type,
};
use crate::peer::Peer;
use crate::peers::PeerManager;
use crate::types::{BanReason, Error, ProcessMsgResult};

/// Decodes a message body of type `T`, mapping any failure to the
/// `DeserializationError` kind callers turn into a `BadMessage` ban.
fn decode<T: Readable>(body: &[u8]) -> Result<T, Error> {
	let mut reader = StreamingReader::new(&mut &body[..]);
	Ok(T::read(&mut reader)?)
}

/// Holds everything the dispatch table needs: the chain coordinator and
/// the peer registry. Stateless beyond those two handles, so one
/// instance is shared (via `Arc`) across every connection's handler
/// closure.
pub struct MessageProcessor {
	chain: Arc<ChainState>,
	peers: PeerManager,
}

impl MessageProcessor {
	pub fn new(chain: Arc<ChainState>, peers: PeerManager) -> MessageProcessor {
		MessageProcessor { chain, peers }
	}

	/// Processes one decoded frame from `peer`. Mirrors the dispatch
	/// table: an error from the chain on data a peer supplied earns a
	/// ban, a local storage error does not.
	pub fn process(&self, peer: &Arc<Peer>, msg_type: Option<Type>, body: &[u8]) -> ProcessMsgResult {
		let msg_type = match msg_type {
			Some(t) => t,
			None => return ProcessMsgResult::Success,
		};

		let result = match msg_type {
			Type::Error => {
				warn!("protocol: {} sent an Error message", peer.addr());
				return ProcessMsgResult::BanPeer(BanReason::ProtocolViolation);
			}
			Type::Hand | Type::Shake => {
				// Handshake messages only ever belong at connection setup,
				// handled by the server before the dispatch table takes
				// over; seeing one here means the peer repeated it.
				return ProcessMsgResult::BanPeer(BanReason::ProtocolViolation);
			}
			Type::Ping => self.handle_ping(peer, body),
			Type::Pong => self.handle_pong(peer, body),
			Type::GetPeerAddrs => self.handle_get_peer_addrs(peer, body),
			Type::PeerAddrs => self.handle_peer_addrs(body),
			Type::GetHeaders => self.handle_get_headers(peer, body),
			Type::Headers => self.handle_headers(peer, body),
			Type::Header => self.handle_header(peer, body),
			Type::GetBlock => self.handle_get_block(peer, body),
			Type::Block => self.handle_block(peer, body),
			Type::CompactBlock => self.handle_compact_block(peer, body),
			Type::Transaction => self.handle_transaction(body),
			Type::TxHashSetRequest => self.handle_txhashset_request(peer, body),
			Type::TxHashSetArchive => self.handle_txhashset_archive(body),
		};

		match result {
			Ok(()) => ProcessMsgResult::Success,
			Err(Dispatch::Ban(reason)) => ProcessMsgResult::BanPeer(reason),
			Err(Dispatch::Unknown(e)) => {
				debug!("protocol: error handling message from {}: {}", peer.addr(), e);
				ProcessMsgResult::UnknownError
			}
		}
	}

	fn handle_ping(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let ping: Ping = decode(body)?;
		peer.update_tip(ping.total_difficulty, ping.height);
		let total_difficulty = self
			.chain
			.total_difficulty(ChainName::Confirmed)
			.unwrap_or_default();
		let height = self.chain.height(ChainName::Confirmed).unwrap_or(0);
		peer.conn()
			.send_msg(Type::Pong, &Pong { total_difficulty, height })?;
		Ok(())
	}

	fn handle_pong(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let pong: Pong = decode(body)?;
		peer.update_tip(pong.total_difficulty, pong.height);
		Ok(())
	}

	fn handle_get_peer_addrs(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let req: GetPeerAddrs = decode(body)?;
		let addrs = self
			.peers
			.addrs_with_capability(req.capabilities)
			.into_iter()
			.map(msg::PeerAddr)
			.collect();
		peer.conn().send_msg(Type::PeerAddrs, &PeerAddrs { peers: addrs })?;
		Ok(())
	}

	fn handle_peer_addrs(&self, body: &[u8]) -> Result<(), Dispatch> {
		let reply: PeerAddrs = decode(body)?;
		let addrs: Vec<_> = reply.peers.into_iter().map(|a| a.0).collect();
		self.peers.merge_known(&addrs);
		Ok(())
	}

	fn handle_get_headers(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let req: GetHeaders = decode(body)?;
		let headers = self
			.chain
			.locate_headers(&req.locator, msg::MAX_BLOCK_HEADERS)
			.map_err(|e| Dispatch::Unknown(e.to_string()))?;
		peer.conn().send_msg(Type::Headers, &Headers { headers })?;
		Ok(())
	}

	fn handle_headers(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let msg: Headers = decode(body)?;
		for header in msg.headers {
			self.add_header(peer, header)?;
		}
		Ok(())
	}

	fn handle_header(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let msg: HeaderMsg = decode(body)?;
		self.add_header(peer, msg.header)
	}

	fn add_header(&self, peer: &Arc<Peer>, header: mw_core::BlockHeader) -> Result<(), Dispatch> {
		match self.chain.add_header(header.clone()) {
			Ok(()) => {
				self.peers.broadcast_header(&header, peer.addr());
				Ok(())
			}
			Err(e) => {
				if e.is_bad_data() {
					Err(Dispatch::Ban(BanReason::BadHeader))
				} else {
					Err(Dispatch::Unknown(e.to_string()))
				}
			}
		}
	}

	fn handle_get_block(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let req: GetBlock = decode(body)?;
		if let Some(block) = self
			.chain
			.block_by_hash(&req.hash)
			.map_err(|e| Dispatch::Unknown(e.to_string()))?
		{
			peer.conn().send_msg(Type::Block, &BlockMsg { block })?;
		}
		Ok(())
	}

	fn handle_block(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let msg: BlockMsg = decode(body)?;
		self.add_block(peer, msg.block)
	}

	fn add_block(&self, peer: &Arc<Peer>, block: mw_core::Block) -> Result<(), Dispatch> {
		match self.chain.add_block(block.clone()) {
			Ok(()) => {
				self.peers.broadcast_block(&block, peer.addr());
				Ok(())
			}
			Err(e) => {
				if e.kind() == mw_chain::ErrorKind::OrphanBlock {
					Ok(())
				} else if e.is_bad_data() {
					Err(Dispatch::Ban(BanReason::BadBlock))
				} else {
					Err(Dispatch::Unknown(e.to_string()))
				}
			}
		}
	}

	/// No mempool exists in this workspace, so a compact block can never
	/// be hydrated locally: always fall back to asking for the full
	/// block, which on arrival goes through the ordinary `Block` path.
	fn handle_compact_block(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let msg: CompactBlock = decode(body)?;
		peer.send_block_request(msg.header.hash())?;
		Ok(())
	}

	/// No mempool crate exists in this workspace; transactions are
	/// acknowledged but not retained or relayed. Dandelion stem/fluff
	/// routing is out of scope without one.
	fn handle_transaction(&self, body: &[u8]) -> Result<(), Dispatch> {
		let _msg: TransactionMsg = decode(body)?;
		Ok(())
	}

	fn handle_txhashset_request(&self, peer: &Arc<Peer>, body: &[u8]) -> Result<(), Dispatch> {
		let req: TxHashSetRequest = decode(body)?;
		let our_tip = self
			.chain
			.header_at_tip(ChainName::Confirmed)
			.map_err(|e| Dispatch::Unknown(e.to_string()))?;
		let matches = our_tip.map(|h| h.hash()) == Some(req.hash);
		if !matches {
			debug!(
				"protocol: txhashset request for unavailable header from {}",
				peer.addr()
			);
			return Ok(());
		}

		let tmp_path = self
			.chain
			.db_root()
			.join(format!("tmp-txhashset-{:016x}.zip", rand::random::<u64>()));
		let tmp_file = std::fs::File::create(&tmp_path)?;
		zip::compress(&self.chain.db_root().join("txhashset"), &tmp_file)
			.map_err(|e| Dispatch::Unknown(e.to_string()))?;
		drop(tmp_file);
		let data = std::fs::read(&tmp_path)?;
		let _ = std::fs::remove_file(&tmp_path);

		peer.conn().send_msg(
			Type::TxHashSetArchive,
			&TxHashSetArchive { hash: req.hash, height: req.height, data },
		)?;
		Ok(())
	}

	fn handle_txhashset_archive(&self, body: &[u8]) -> Result<(), Dispatch> {
		let msg: TxHashSetArchive = decode(body)?;
		let header = self
			.chain
			.header_by_hash(&msg.hash)
			.map_err(|e| Dispatch::Unknown(e.to_string()))?
			.ok_or(Dispatch::Ban(BanReason::BadMessage))?;

		let dest = self
			.chain
			.db_root()
			.join(format!("tmp-txhashset-extract-{:016x}", rand::random::<u64>()));
		zip::decompress(Cursor::new(msg.data), &dest).map_err(|e| Dispatch::Unknown(e.to_string()))?;

		let result = self.chain.apply_txhashset_archive(header, &dest);
		let _ = std::fs::remove_dir_all(&dest);
		match result {
			Ok(()) => Ok(()),
			Err(e) if e.is_bad_data() => Err(Dispatch::Ban(BanReason::BadMessage)),
			Err(e) => Err(Dispatch::Unknown(e.to_string())),
		}
	}
}

/// Internal outcome of a single handler, collapsed into a
/// `ProcessMsgResult` by [`MessageProcessor::process`].
enum Dispatch {
	Ban(BanReason),
	Unknown(String),
}

impl From<Error> for Dispatch {
	fn from(e: Error) -> Dispatch {
		Dispatch::Unknown(e.to_string())
	}
}

impl From<std::io::Error> for Dispatch {
	fn from(e: std::io::Error) -> Dispatch {
		Dispatch::Unknown(e.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use std::net::{SocketAddr, TcpListener, TcpStream};
	use std::path::PathBuf;

	use mw_core::core::hash::Hash;
	use mw_core::core::TransactionBody;
	use mw_core::pow::Difficulty;
	use mw_core::{Block, BlockHeader};

	use crate::conn::Connection;
	use crate::types::{Capabilities, PeerInfo};

	fn temp_db_root(name: &str) -> PathBuf {
		let mut p = std::env::temp_dir();
		p.push(format!("mw_p2p_protocol_test_{}_{}", name, std::process::id()));
		let _ = fs::remove_dir_all(&p);
		fs::create_dir_all(&p).unwrap();
		p
	}

	fn test_chain(name: &str) -> Arc<ChainState> {
		let genesis = mw_core::genesis();
		let db_root = temp_db_root(name);
		Arc::new(ChainState::new(&db_root, &genesis).unwrap())
	}

	/// A `Peer` backed by a real loopback socket, since `Connection::spawn`
	/// has no mock path; the messages sent to it are never read back.
	fn test_peer(addr: SocketAddr) -> Arc<Peer> {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let local = listener.local_addr().unwrap();
		let _client = TcpStream::connect(local).unwrap();
		let (server_stream, _) = listener.accept().unwrap();
		let conn = Connection::spawn(server_stream, |_, _| ProcessMsgResult::Success).unwrap();
		let info = PeerInfo {
			capabilities: Capabilities::FULL_NODE,
			user_agent: "test".to_string(),
			version: 1,
			addr,
			total_difficulty: Difficulty::min(),
			height: 0,
		};
		Arc::new(Peer::new(info, conn))
	}

	fn hash_byte(b: u8) -> Hash {
		let mut bytes = [0u8; 32];
		bytes[0] = b;
		Hash::from_bytes(&bytes).unwrap()
	}

	fn block_with_previous(previous: Hash, height: u64) -> Block {
		let mut header = BlockHeader::default();
		header.previous = previous;
		header.height = height;
		Block { header, body: TransactionBody::empty() }
	}

	fn processor_for(chain: Arc<ChainState>) -> MessageProcessor {
		MessageProcessor::new(chain, PeerManager::new())
	}

	#[test]
	fn add_block_parks_orphan_without_banning() {
		let chain = test_chain("add_block_orphan");
		let processor = processor_for(chain);
		let peer = test_peer("127.0.0.1:50001".parse().unwrap());

		// `header.previous` is not known to a chain that only has genesis,
		// so this parks as an orphan rather than failing validation.
		let orphan = block_with_previous(hash_byte(0xaa), 1);
		assert!(processor.add_block(&peer, orphan).is_ok());
	}

	#[test]
	fn add_block_bans_on_invalid_body() {
		let genesis_hash = mw_core::genesis().header.hash();
		let chain = test_chain("add_block_bad");
		let processor = processor_for(chain);
		let peer = test_peer("127.0.0.1:50002".parse().unwrap());

		// Known parent, but an empty body fails the one-coinbase-output rule,
		// which is the peer's fault rather than a storage problem.
		let bad = block_with_previous(genesis_hash, 1);
		match processor.add_block(&peer, bad) {
			Err(Dispatch::Ban(BanReason::BadBlock)) => {}
			other => panic!("expected a BadBlock ban, got ok={}", other.is_ok()),
		}
	}

	#[test]
	fn add_header_bans_on_unknown_parent() {
		let chain = test_chain("add_header_bad");
		let processor = processor_for(chain);
		let peer = test_peer("127.0.0.1:50003".parse().unwrap());

		// Unlike blocks, headers have no orphan pool: an unknown parent is
		// just an invalid header.
		let mut header = BlockHeader::default();
		header.previous = hash_byte(0xbb);
		header.height = 1;

		match processor.add_header(&peer, header) {
			Err(Dispatch::Ban(BanReason::BadHeader)) => {}
			other => panic!("expected a BadHeader ban, got ok={}", other.is_ok()),
		}
	}
}
