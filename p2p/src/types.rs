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

//! Shared types: errors, peer capabilities and the outcome a processed
//! message hands back to the connection that received it.

use std::fmt::{self, Display};
use std::io;

use failure::{Backtrace, Context, Fail};

use mw_chain::Error as ChainError;
use mw_core::ser;

/// A p2p error together with its causal context.
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// The kinds of failure the networking layer can produce. Mirrors the
/// peer-facing half of the chain crate's error kinds: a bad header or
/// block earns the sender a strike, a storage error is fatal, and
/// malformed wire input is worth banning over since no honest peer
/// produces it.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// Wire input failed to decode.
	#[fail(display = "deserialization error: {}", _0)]
	DeserializationError(String),
	/// The socket itself failed (reset, broken pipe, read past EOF).
	#[fail(display = "connection error: {}", _0)]
	ConnectionError(String),
	/// The peer is on the ban list already.
	#[fail(display = "peer is banned")]
	Banned,
	/// A handshake's protocol version isn't one we understand.
	#[fail(display = "protocol mismatch: us {}, peer {}", us, peer)]
	ProtocolMismatch { us: u32, peer: u32 },
	/// A handshake's genesis hash doesn't match ours: different network.
	#[fail(display = "genesis mismatch")]
	GenesisMismatch,
	/// A handshake's nonce matched one we sent: we connected to ourself.
	#[fail(display = "peer is self")]
	PeerWithSelf,
	/// The chain rejected something a peer sent.
	#[fail(display = "chain error: {}", _0)]
	Chain(String),
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let cause = match self.cause() {
			Some(c) => format!("{}", c),
			None => String::from("unknown"),
		};
		Display::fmt(&format!("{} (cause: {})", self.inner, cause), f)
	}
}

impl Error {
	/// The structured kind behind this error, independent of its causal
	/// chain.
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}

	/// The underlying cause, if any was attached.
	pub fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	/// Backtrace captured at the point of failure, if any.
	pub fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<ser::Error> for Error {
	fn from(error: ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::DeserializationError(error.to_string())),
		}
	}
}

impl From<io::Error> for Error {
	fn from(error: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::ConnectionError(error.to_string())),
		}
	}
}

impl From<ChainError> for Error {
	fn from(error: ChainError) -> Error {
		Error {
			inner: Context::new(ErrorKind::Chain(error.to_string())),
		}
	}
}

bitflags! {
	/// What a peer has told us it can do. Advertised in `Hand`/`Shake` and
	/// consulted whenever we need to pick a peer for something only some
	/// of them support, like serving a TxHashSet archive.
	pub struct Capabilities: u32 {
		/// We don't know yet; the default before a handshake completes.
		const UNKNOWN = 0b0000_0000;
		/// Full archival history, no pruning.
		const FULL_HIST = 0b0000_0001;
		/// Can serve a TxHashSet archive for fast sync.
		const TXHASHSET_HIST = 0b0000_0010;
		/// Can answer `GetPeerAddrs`.
		const PEER_LIST = 0b0000_0100;

		const FULL_NODE = Self::FULL_HIST.bits | Self::TXHASHSET_HIST.bits | Self::PEER_LIST.bits;
	}
}

/// What a connection should do after handing a decoded message to the
/// dispatch table, per the message table's `Action` column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessMsgResult {
	/// Handled, nothing more to do.
	Success,
	/// The socket itself is broken; drop the connection.
	SocketFailure,
	/// Something unexpected happened that isn't the peer's fault (a local
	/// storage error, for instance); drop the connection without banning.
	UnknownError,
	/// The peer is misbehaving; terminate the connection and record a
	/// ban.
	BanPeer(BanReason),
}

/// Why a peer was banned, carried along so the ban list can log it and
/// the peer can be told in an `Error` message before the socket closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BanReason {
	/// Sent a frame that didn't decode, or exceeded the max payload size
	/// for its message type.
	BadMessage,
	/// Sent a header that fails stateless proof-of-work/timestamp checks.
	BadHeader,
	/// Sent a block that fails body validation.
	BadBlock,
	/// Advertised a different genesis hash: wrong network entirely.
	GenesisMismatch,
	/// Handshake didn't start with `Hand`, or repeated one.
	ProtocolViolation,
}

/// General information about a connected peer, assembled from its
/// handshake and updated as `Ping`/`Pong` messages arrive.
#[derive(Clone, Debug)]
pub struct PeerInfo {
	pub capabilities: Capabilities,
	pub user_agent: String,
	pub version: u32,
	pub addr: std::net::SocketAddr,
	pub total_difficulty: mw_core::pow::Difficulty,
	pub height: u64,
}
