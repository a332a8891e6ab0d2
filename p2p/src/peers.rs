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

//! Tracks every connected peer and the ban list, behind fine-grained
//! locks so a broadcast doesn't have to hold up a concurrent handshake.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};

use mw_core::core::{Block, BlockHeader};
use mw_util::RwLock;

use crate::msg::MAX_PEER_ADDRS;
use crate::peer::Peer;
use crate::types::{BanReason, Capabilities};

/// How long a ban lasts before the address is eligible to reconnect.
const BAN_DURATION: Duration = Duration::from_secs(3600);

#[derive(Clone, Copy)]
struct Ban {
	reason: BanReason,
	expires_at: Instant,
}

/// Shared registry of connected peers and banned addresses. Cheap to
/// clone: every field is itself reference-counted, so each connection
/// thread holds its own handle without sharing a lock guard across
/// threads.
#[derive(Clone)]
pub struct PeerManager {
	peers: Arc<RwLock<HashMap<SocketAddr, Arc<Peer>>>>,
	banned: Arc<RwLock<HashMap<IpAddr, Ban>>>,
	/// Addresses learned from `PeerAddrs` but not currently connected.
	/// Just an address book, not a persistent store: it starts empty on
	/// every restart, unlike the connected-peer map it sits next to.
	known: Arc<RwLock<HashSet<SocketAddr>>>,
}

impl PeerManager {
	pub fn new() -> PeerManager {
		PeerManager {
			peers: Arc::new(RwLock::new(HashMap::new())),
			banned: Arc::new(RwLock::new(HashMap::new())),
			known: Arc::new(RwLock::new(HashSet::new())),
		}
	}

	/// Records addresses learned from a peer's `PeerAddrs` reply.
	pub fn merge_known(&self, addrs: &[SocketAddr]) {
		let mut known = self.known.write();
		for addr in addrs {
			known.insert(*addr);
		}
	}

	/// Known addresses not currently connected, for outbound dialing.
	pub fn known_addrs(&self) -> Vec<SocketAddr> {
		let peers = self.peers.read();
		self.known
			.read()
			.iter()
			.filter(|a| !peers.contains_key(a))
			.cloned()
			.collect()
	}

	pub fn add(&self, peer: Arc<Peer>) {
		info!("peers: new peer {}", peer.addr());
		self.peers.write().insert(peer.addr(), peer);
	}

	pub fn remove(&self, addr: &SocketAddr) {
		self.peers.write().remove(addr);
	}

	pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
		self.peers.read().get(addr).cloned()
	}

	pub fn connected_count(&self) -> usize {
		self.peers.read().len()
	}

	pub fn is_connected(&self, addr: &SocketAddr) -> bool {
		self.peers.read().contains_key(addr)
	}

	/// Every connected peer, in an arbitrary but stable-for-the-snapshot
	/// order (insertion order of the underlying map isn't guaranteed,
	/// but this is only ever used for one-shot iteration within a single
	/// call, never compared across calls).
	pub fn all(&self) -> Vec<Arc<Peer>> {
		self.peers.read().values().cloned().collect()
	}

	/// Up to `MAX_PEER_ADDRS` addresses of connected peers advertising
	/// `capabilities`.
	pub fn addrs_with_capability(&self, capabilities: Capabilities) -> Vec<SocketAddr> {
		self.peers
			.read()
			.values()
			.filter(|p| p.capabilities().contains(capabilities))
			.take(MAX_PEER_ADDRS)
			.map(|p| p.addr())
			.collect()
	}

	/// Sends `block` to every connected peer except `skip`, used to
	/// rebroadcast something just accepted from `skip` itself.
	pub fn broadcast_block(&self, block: &Block, skip: SocketAddr) {
		for peer in self.peers.read().values() {
			if peer.addr() == skip {
				continue;
			}
			if let Err(e) = peer.send_block(block) {
				debug!("peers: failed to relay block to {}: {}", peer.addr(), e);
			}
		}
	}

	/// Sends `header` to every connected peer except `skip`.
	pub fn broadcast_header(&self, header: &BlockHeader, skip: SocketAddr) {
		for peer in self.peers.read().values() {
			if peer.addr() == skip {
				continue;
			}
			if let Err(e) = peer.send_header(header) {
				debug!("peers: failed to relay header to {}: {}", peer.addr(), e);
			}
		}
	}

	/// Bans `addr`'s IP for `reason` and drops its connection if
	/// currently connected.
	pub fn ban(&self, addr: SocketAddr, reason: BanReason) {
		info!("peers: banning {} for {:?}", addr, reason);
		self.banned.write().insert(
			addr.ip(),
			Ban {
				reason,
				expires_at: Instant::now() + BAN_DURATION,
			},
		);
		self.remove(&addr);
	}

	/// Whether `addr`'s IP is currently banned. Expired bans are dropped
	/// as a side effect of checking.
	pub fn is_banned(&self, addr: &SocketAddr) -> bool {
		let ip = addr.ip();
		let expired = match self.banned.read().get(&ip) {
			Some(ban) => ban.expires_at <= Instant::now(),
			None => return false,
		};
		if expired {
			self.banned.write().remove(&ip);
			false
		} else {
			true
		}
	}

	/// Drops any connection that has gone quiet past the inactivity
	/// timeout. Called periodically by the connection manager's
	/// sweep.
	pub fn evict_inactive(&self) {
		let dead: Vec<SocketAddr> = self
			.peers
			.read()
			.values()
			.filter(|p| p.is_inactive())
			.map(|p| p.addr())
			.collect();
		for addr in dead {
			debug!("peers: evicting inactive peer {}", addr);
			self.remove(&addr);
		}
	}
}

impl Default for PeerManager {
	fn default() -> Self {
		PeerManager::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::TcpListener;
	use std::net::TcpStream;

	use mw_core::pow::Difficulty;

	use crate::conn::Connection;
	use crate::types::{PeerInfo, ProcessMsgResult};

	/// A `Peer` backed by a real loopback socket, since `Connection::spawn`
	/// has no mock path. `addr` is the identity `PeerManager` keys it
	/// under, independent of the loopback pair's actual ports.
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

	fn addr(port: u16) -> SocketAddr {
		format!("127.0.0.1:{}", port).parse().unwrap()
	}

	#[test]
	fn merge_known_feeds_known_addrs() {
		let peers = PeerManager::new();
		peers.merge_known(&[addr(40001), addr(40002)]);
		let mut known = peers.known_addrs();
		known.sort();
		let mut expected = vec![addr(40001), addr(40002)];
		expected.sort();
		assert_eq!(known, expected);
	}

	#[test]
	fn known_addrs_excludes_connected() {
		let peers = PeerManager::new();
		let a = addr(40011);
		peers.merge_known(&[a]);
		peers.add(test_peer(a));
		assert!(peers.known_addrs().is_empty());
	}

	#[test]
	fn add_remove_and_get_round_trip() {
		let peers = PeerManager::new();
		let a = addr(40021);
		let peer = test_peer(a);
		peers.add(peer.clone());
		assert_eq!(peers.connected_count(), 1);
		assert!(peers.is_connected(&a));
		assert!(peers.get(&a).is_some());

		peers.remove(&a);
		assert_eq!(peers.connected_count(), 0);
		assert!(peers.get(&a).is_none());
	}

	#[test]
	fn ban_marks_ip_banned_and_drops_peer() {
		let peers = PeerManager::new();
		let a = addr(40031);
		peers.add(test_peer(a));
		assert!(peers.is_connected(&a));

		peers.ban(a, BanReason::BadBlock);
		assert!(peers.is_banned(&a));
		assert!(!peers.is_connected(&a));
	}

	#[test]
	fn unbanned_address_is_not_banned() {
		let peers = PeerManager::new();
		assert!(!peers.is_banned(&addr(40041)));
	}

	#[test]
	fn addrs_with_capability_filters_by_capability() {
		let peers = PeerManager::new();
		let a = addr(40051);
		peers.add(test_peer(a));

		let found = peers.addrs_with_capability(Capabilities::FULL_NODE);
		assert_eq!(found, vec![a]);

		// FULL_NODE's bits already cover PEER_LIST, so a peer advertising
		// FULL_NODE still matches a narrower PEER_LIST query.
		let narrower = peers.addrs_with_capability(Capabilities::PEER_LIST);
		assert_eq!(narrower, vec![a]);
	}
}
