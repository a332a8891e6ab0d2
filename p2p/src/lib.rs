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

//! Peer-to-peer networking: the wire codec, per-peer connections, the
//! peer registry and the message dispatch table that ties them to a
//! `ChainState`.

#[macro_use]
extern crate bitflags;

mod conn;
mod msg;
mod peer;
mod peers;
mod protocol;
mod server;
mod types;

pub use crate::conn::Connection;
pub use crate::msg::{
	BlockMsg, CompactBlock, GetBlock, GetHeaders, GetPeerAddrs, Hand, HeaderMsg, Headers,
	PeerAddr, PeerAddrs, PeerError, Ping, Pong, Shake, TransactionMsg, TxHashSetArchive,
	TxHashSetRequest, Type, MAX_BLOCK_HEADERS, MAX_BLOCK_SIZE, MAX_LOCATOR_HASHES,
	MAX_MSG_SIZE, MAX_PEER_ADDRS, MAX_TXHASHSET_SIZE, PROTOCOL_VERSION, USER_AGENT,
};
pub use crate::peer::Peer;
pub use crate::peers::PeerManager;
pub use crate::protocol::MessageProcessor;
pub use crate::server::P2PServer;
pub use crate::types::{BanReason, Capabilities, Error, ErrorKind, PeerInfo, ProcessMsgResult};
