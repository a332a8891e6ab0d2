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

//! Wire protocol: message framing and the types that travel inside a
//! frame. Big-endian throughout, built on the same `Writeable`/`Readable`
//! pair every other crate's types implement, so a `Block` or
//! `BlockHeader` serializes here exactly as it does to disk.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use mw_core::core::hash::Hash;
use mw_core::ser::{self, Readable, Reader, Writeable, Writer};
use mw_core::pow::Difficulty;
use mw_core::{Block, BlockHeader, Transaction};

use crate::types::Capabilities;

/// Current protocol version. Carried in every handshake; a peer
/// advertising a version we don't understand is rejected rather than
/// guessed at.
pub const PROTOCOL_VERSION: u32 = 1;

/// User agent string sent in every handshake.
pub const USER_AGENT: &str = "MW/mwnode 0.1";

/// Two magic bytes opening every frame, chosen to be unlikely to appear
/// at the start of an HTTP request or TLS handshake aimed at the wrong
/// port by mistake.
pub const MAGIC: [u8; 2] = [0x1e, 0xc5];

/// Frame header size in bytes: magic(2) + type(1) + len(8).
pub const HEADER_LEN: u64 = 11;

/// Largest payload accepted for a `Block` message.
pub const MAX_BLOCK_SIZE: u64 = 64 * 1024 * 1024;
/// Largest payload accepted for a `TxHashSetArchive` message.
pub const MAX_TXHASHSET_SIZE: u64 = 128 * 1024 * 1024;
/// Largest payload accepted for everything else.
pub const MAX_MSG_SIZE: u64 = 512 * 1024;

/// Cap on how many headers a `GetHeaders` response carries.
pub const MAX_BLOCK_HEADERS: usize = 512;
/// Cap on how many peer addresses a `PeerAddrs` response carries.
pub const MAX_PEER_ADDRS: usize = 256;
/// Cap on how many locator hashes a `GetHeaders` request carries: enough
/// for an exponentially-spaced locator back past any plausible fork
/// depth without a hostile peer padding the request.
pub const MAX_LOCATOR_HASHES: u64 = 64;

/// Every message type that can appear after the frame header. Stable
/// and additive: a peer seeing a tag it doesn't recognize ignores the
/// message rather than erroring, so new types can be introduced without
/// breaking old peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
	Error,
	Hand,
	Shake,
	Ping,
	Pong,
	GetPeerAddrs,
	PeerAddrs,
	GetHeaders,
	Headers,
	Header,
	GetBlock,
	Block,
	CompactBlock,
	Transaction,
	TxHashSetRequest,
	TxHashSetArchive,
}

impl Type {
	fn from_u8(t: u8) -> Option<Type> {
		Some(match t {
			0 => Type::Error,
			1 => Type::Hand,
			2 => Type::Shake,
			3 => Type::Ping,
			4 => Type::Pong,
			5 => Type::GetPeerAddrs,
			6 => Type::PeerAddrs,
			7 => Type::GetHeaders,
			8 => Type::Headers,
			9 => Type::Header,
			10 => Type::GetBlock,
			11 => Type::Block,
			12 => Type::CompactBlock,
			13 => Type::Transaction,
			14 => Type::TxHashSetRequest,
			15 => Type::TxHashSetArchive,
			_ => return None,
		})
	}

	/// Largest payload this message type is ever allowed to declare.
	pub fn max_len(self) -> u64 {
		match self {
			Type::Block => MAX_BLOCK_SIZE,
			Type::TxHashSetArchive => MAX_TXHASHSET_SIZE,
			_ => MAX_MSG_SIZE,
		}
	}
}

/// The fixed-size preamble read off the wire before a message's body.
/// An unrecognized `msg_type` byte is kept as `None` rather than
/// rejected outright: per the dispatch table, unknown types are simply
/// ignored once the (still well-framed) body has been drained.
pub struct MsgHeader {
	pub msg_type: Option<Type>,
	pub msg_len: u64,
}

impl Writeable for MsgHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(MAGIC[0])?;
		writer.write_u8(MAGIC[1])?;
		writer.write_u8(self.msg_type.map(|t| t as u8).unwrap_or(0xff))?;
		writer.write_u64(self.msg_len)
	}
}

impl Readable for MsgHeader {
	fn read(reader: &mut dyn Reader) -> Result<MsgHeader, ser::Error> {
		let m0 = reader.read_u8()?;
		let m1 = reader.read_u8()?;
		if m0 != MAGIC[0] || m1 != MAGIC[1] {
			return Err(ser::Error::InvalidTag(m0));
		}
		let t = reader.read_u8()?;
		let msg_len = reader.read_u64()?;
		Ok(MsgHeader {
			msg_type: Type::from_u8(t),
			msg_len,
		})
	}
}

impl MsgHeader {
	pub fn new(msg_type: Type, msg_len: u64) -> MsgHeader {
		MsgHeader {
			msg_type: Some(msg_type),
			msg_len,
		}
	}
}

/// Wraps a `SocketAddr` so it can implement `Writeable`/`Readable`
/// without either type living in this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

impl Writeable for PeerAddr {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		match self.0 {
			SocketAddr::V4(a) => {
				writer.write_u8(0)?;
				writer.write_fixed_bytes(&a.ip().octets())?;
				writer.write_u16(a.port())
			}
			SocketAddr::V6(a) => {
				writer.write_u8(1)?;
				for seg in &a.ip().segments() {
					writer.write_u16(*seg)?;
				}
				writer.write_u16(a.port())
			}
		}
	}
}

impl Readable for PeerAddr {
	fn read(reader: &mut dyn Reader) -> Result<PeerAddr, ser::Error> {
		let tag = reader.read_u8()?;
		if tag == 0 {
			let ip = reader.read_fixed_bytes(4)?;
			let port = reader.read_u16()?;
			Ok(PeerAddr(SocketAddr::V4(SocketAddrV4::new(
				Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
				port,
			))))
		} else if tag == 1 {
			let mut seg = [0u16; 8];
			for s in seg.iter_mut() {
				*s = reader.read_u16()?;
			}
			let port = reader.read_u16()?;
			Ok(PeerAddr(SocketAddr::V6(SocketAddrV6::new(
				Ipv6Addr::new(
					seg[0], seg[1], seg[2], seg[3], seg[4], seg[5], seg[6], seg[7],
				),
				port,
				0,
				0,
			))))
		} else {
			Err(ser::Error::InvalidTag(tag))
		}
	}
}

fn write_str<W: Writer>(writer: &mut W, s: &str) -> Result<(), ser::Error> {
	writer.write_bytes(s.as_bytes())
}

fn read_str(reader: &mut dyn Reader, max_len: u64) -> Result<String, ser::Error> {
	let bytes = reader.read_bytes_len_prefix(max_len)?;
	String::from_utf8(bytes).map_err(|e| ser::Error::IoErr(e.to_string()))
}

/// Opening handshake message: the sender's version, capabilities, a
/// random nonce to detect connecting to ourselves, the chain we think
/// we're on and where we believe it has gotten to.
pub struct Hand {
	pub version: u32,
	pub capabilities: Capabilities,
	pub nonce: u64,
	pub total_difficulty: Difficulty,
	pub sender_addr: PeerAddr,
	pub receiver_addr: PeerAddr,
	pub user_agent: String,
	pub genesis_hash: Hash,
}

impl Writeable for Hand {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		writer.write_u32(self.capabilities.bits())?;
		writer.write_u64(self.nonce)?;
		self.total_difficulty.write(writer)?;
		self.sender_addr.write(writer)?;
		self.receiver_addr.write(writer)?;
		write_str(writer, &self.user_agent)?;
		self.genesis_hash.write(writer)
	}
}

impl Readable for Hand {
	fn read(reader: &mut dyn Reader) -> Result<Hand, ser::Error> {
		let version = reader.read_u32()?;
		let capabilities = Capabilities::from_bits_truncate(reader.read_u32()?);
		let nonce = reader.read_u64()?;
		let total_difficulty = Difficulty::read(reader)?;
		let sender_addr = PeerAddr::read(reader)?;
		let receiver_addr = PeerAddr::read(reader)?;
		let user_agent = read_str(reader, MAX_MSG_SIZE)?;
		let genesis_hash = Hash::read(reader)?;
		Ok(Hand {
			version,
			capabilities,
			nonce,
			total_difficulty,
			sender_addr,
			receiver_addr,
			user_agent,
			genesis_hash,
		})
	}
}

/// Handshake reply. Mirrors every field of `Hand` except the nonce,
/// which only the initiator needs back (the reply can't be a reply to
/// itself).
pub struct Shake {
	pub version: u32,
	pub capabilities: Capabilities,
	pub total_difficulty: Difficulty,
	pub sender_addr: PeerAddr,
	pub receiver_addr: PeerAddr,
	pub user_agent: String,
	pub genesis_hash: Hash,
}

impl Writeable for Shake {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		writer.write_u32(self.capabilities.bits())?;
		self.total_difficulty.write(writer)?;
		self.sender_addr.write(writer)?;
		self.receiver_addr.write(writer)?;
		write_str(writer, &self.user_agent)?;
		self.genesis_hash.write(writer)
	}
}

impl Readable for Shake {
	fn read(reader: &mut dyn Reader) -> Result<Shake, ser::Error> {
		let version = reader.read_u32()?;
		let capabilities = Capabilities::from_bits_truncate(reader.read_u32()?);
		let total_difficulty = Difficulty::read(reader)?;
		let sender_addr = PeerAddr::read(reader)?;
		let receiver_addr = PeerAddr::read(reader)?;
		let user_agent = read_str(reader, MAX_MSG_SIZE)?;
		let genesis_hash = Hash::read(reader)?;
		Ok(Shake {
			version,
			capabilities,
			total_difficulty,
			sender_addr,
			receiver_addr,
			user_agent,
			genesis_hash,
		})
	}
}

/// Periodic liveness and tip-advertisement message.
pub struct Ping {
	pub total_difficulty: Difficulty,
	pub height: u64,
}

impl Writeable for Ping {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.total_difficulty.write(writer)?;
		writer.write_u64(self.height)
	}
}

impl Readable for Ping {
	fn read(reader: &mut dyn Reader) -> Result<Ping, ser::Error> {
		Ok(Ping {
			total_difficulty: Difficulty::read(reader)?,
			height: reader.read_u64()?,
		})
	}
}

/// Reply to `Ping`, same shape.
pub struct Pong {
	pub total_difficulty: Difficulty,
	pub height: u64,
}

impl Writeable for Pong {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.total_difficulty.write(writer)?;
		writer.write_u64(self.height)
	}
}

impl Readable for Pong {
	fn read(reader: &mut dyn Reader) -> Result<Pong, ser::Error> {
		Ok(Pong {
			total_difficulty: Difficulty::read(reader)?,
			height: reader.read_u64()?,
		})
	}
}

/// Requests up to `MAX_PEER_ADDRS` known peers advertising `capabilities`.
pub struct GetPeerAddrs {
	pub capabilities: Capabilities,
}

impl Writeable for GetPeerAddrs {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.capabilities.bits())
	}
}

impl Readable for GetPeerAddrs {
	fn read(reader: &mut dyn Reader) -> Result<GetPeerAddrs, ser::Error> {
		Ok(GetPeerAddrs {
			capabilities: Capabilities::from_bits_truncate(reader.read_u32()?),
		})
	}
}

/// Reply to `GetPeerAddrs`.
pub struct PeerAddrs {
	pub peers: Vec<PeerAddr>,
}

impl Writeable for PeerAddrs {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.peers.len() as u64)?;
		for p in &self.peers {
			p.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for PeerAddrs {
	fn read(reader: &mut dyn Reader) -> Result<PeerAddrs, ser::Error> {
		let len = reader.read_u64()?;
		if len > MAX_PEER_ADDRS as u64 {
			return Err(ser::Error::TooLarge);
		}
		let peers = (0..len).map(|_| PeerAddr::read(reader)).collect::<Result<_, _>>()?;
		Ok(PeerAddrs { peers })
	}
}

/// A block locator: hashes the sender already has, listed from its own
/// tip backward at exponentially increasing spacing, used by the
/// receiver to find the most recent common ancestor without walking the
/// whole chain.
pub struct GetHeaders {
	pub locator: Vec<Hash>,
}

impl Writeable for GetHeaders {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.locator.len() as u64)?;
		for h in &self.locator {
			h.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for GetHeaders {
	fn read(reader: &mut dyn Reader) -> Result<GetHeaders, ser::Error> {
		let len = reader.read_u64()?;
		if len > MAX_LOCATOR_HASHES {
			return Err(ser::Error::TooLarge);
		}
		let locator = (0..len).map(|_| Hash::read(reader)).collect::<Result<_, _>>()?;
		Ok(GetHeaders { locator })
	}
}

/// Reply to `GetHeaders`, and also how a batch of headers is gossiped.
pub struct Headers {
	pub headers: Vec<BlockHeader>,
}

impl Writeable for Headers {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.headers.len() as u64)?;
		for h in &self.headers {
			h.write(writer)?;
		}
		Ok(())
	}
}

impl Readable for Headers {
	fn read(reader: &mut dyn Reader) -> Result<Headers, ser::Error> {
		let len = reader.read_u64()?;
		if len as usize > MAX_BLOCK_HEADERS {
			return Err(ser::Error::TooLarge);
		}
		let headers = (0..len).map(|_| BlockHeader::read(reader)).collect::<Result<_, _>>()?;
		Ok(Headers { headers })
	}
}

/// A single freshly-mined header, gossiped as soon as it's produced
/// rather than batched.
pub struct HeaderMsg {
	pub header: BlockHeader,
}

impl Writeable for HeaderMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)
	}
}

impl Readable for HeaderMsg {
	fn read(reader: &mut dyn Reader) -> Result<HeaderMsg, ser::Error> {
		Ok(HeaderMsg {
			header: BlockHeader::read(reader)?,
		})
	}
}

/// Requests a full block by hash, used when a `CompactBlock` can't be
/// hydrated locally.
pub struct GetBlock {
	pub hash: Hash,
}

impl Writeable for GetBlock {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.hash.write(writer)
	}
}

impl Readable for GetBlock {
	fn read(reader: &mut dyn Reader) -> Result<GetBlock, ser::Error> {
		Ok(GetBlock {
			hash: Hash::read(reader)?,
		})
	}
}

/// A full block, gossiped after being mined or sent in answer to
/// `GetBlock`.
pub struct BlockMsg {
	pub block: Block,
}

impl Writeable for BlockMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.block.write(writer)
	}
}

impl Readable for BlockMsg {
	fn read(reader: &mut dyn Reader) -> Result<BlockMsg, ser::Error> {
		Ok(BlockMsg {
			block: Block::read(reader)?,
		})
	}
}

/// A block announced by header plus short kernel identifiers, so a peer
/// that already holds the referenced transactions in its pool can
/// reconstruct the full block without the sender re-transmitting it.
pub struct CompactBlock {
	pub header: BlockHeader,
	pub nonce: u64,
	pub kern_ids: Vec<u64>,
}

impl Writeable for CompactBlock {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;
		writer.write_u64(self.nonce)?;
		self.kern_ids.write(writer)
	}
}

impl Readable for CompactBlock {
	fn read(reader: &mut dyn Reader) -> Result<CompactBlock, ser::Error> {
		Ok(CompactBlock {
			header: BlockHeader::read(reader)?,
			nonce: reader.read_u64()?,
			kern_ids: Vec::read(reader)?,
		})
	}
}

/// A transaction being relayed. Dandelion (stem/fluff routing) isn't
/// implemented; every transaction is relayed as if already in the fluff
/// phase.
pub struct TransactionMsg {
	pub tx: Transaction,
}

impl Writeable for TransactionMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.tx.write(writer)
	}
}

impl Readable for TransactionMsg {
	fn read(reader: &mut dyn Reader) -> Result<TransactionMsg, ser::Error> {
		Ok(TransactionMsg {
			tx: Transaction::read(reader)?,
		})
	}
}

/// Requests a TxHashSet archive bound to the state as of `hash` at
/// `height`, for fast sync.
pub struct TxHashSetRequest {
	pub hash: Hash,
	pub height: u64,
}

impl Writeable for TxHashSetRequest {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.hash.write(writer)?;
		writer.write_u64(self.height)
	}
}

impl Readable for TxHashSetRequest {
	fn read(reader: &mut dyn Reader) -> Result<TxHashSetRequest, ser::Error> {
		Ok(TxHashSetRequest {
			hash: Hash::read(reader)?,
			height: reader.read_u64()?,
		})
	}
}

/// An inbound TxHashSet archive: the header it's bound to and the raw
/// zip bytes themselves, carried in the same frame rather than as a
/// separate stream so the usual frame-size cap (`MAX_TXHASHSET_SIZE`)
/// already bounds it.
pub struct TxHashSetArchive {
	pub hash: Hash,
	pub height: u64,
	pub data: Vec<u8>,
}

impl Writeable for TxHashSetArchive {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.hash.write(writer)?;
		writer.write_u64(self.height)?;
		writer.write_bytes(&self.data)
	}
}

impl Readable for TxHashSetArchive {
	fn read(reader: &mut dyn Reader) -> Result<TxHashSetArchive, ser::Error> {
		let hash = Hash::read(reader)?;
		let height = reader.read_u64()?;
		let data = reader.read_bytes_len_prefix(MAX_TXHASHSET_SIZE)?;
		Ok(TxHashSetArchive { hash, height, data })
	}
}

/// Sent just before closing a connection for cause, so the remote end's
/// logs show why.
pub struct PeerError {
	pub code: u32,
	pub message: String,
}

impl Writeable for PeerError {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.code)?;
		write_str(writer, &self.message)
	}
}

impl Readable for PeerError {
	fn read(reader: &mut dyn Reader) -> Result<PeerError, ser::Error> {
		Ok(PeerError {
			code: reader.read_u32()?,
			message: read_str(reader, MAX_MSG_SIZE)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mw_core::ser::{StreamingReader, VecWriter};

	fn round_trip<T: Writeable + Readable>(msg: &T) -> T {
		let mut buf = Vec::new();
		msg.write(&mut VecWriter::new(&mut buf)).unwrap();
		let mut reader = StreamingReader::new(&mut &buf[..]);
		T::read(&mut reader).unwrap()
	}

	#[test]
	fn ping_round_trips() {
		let ping = Ping {
			total_difficulty: Difficulty::min(),
			height: 42,
		};
		let back = round_trip(&ping);
		assert_eq!(back.height, 42);
		assert_eq!(back.total_difficulty, Difficulty::min());
	}

	#[test]
	fn hand_round_trips_with_peer_addrs() {
		let hand = Hand {
			version: PROTOCOL_VERSION,
			capabilities: Capabilities::FULL_NODE,
			nonce: 0xdead_beef,
			total_difficulty: Difficulty::min(),
			sender_addr: PeerAddr("127.0.0.1:13414".parse().unwrap()),
			receiver_addr: PeerAddr("10.0.0.2:13414".parse().unwrap()),
			user_agent: USER_AGENT.to_string(),
			genesis_hash: Hash::default(),
		};
		let back = round_trip(&hand);
		assert_eq!(back.version, PROTOCOL_VERSION);
		assert_eq!(back.capabilities, Capabilities::FULL_NODE);
		assert_eq!(back.nonce, 0xdead_beef);
		assert_eq!(back.sender_addr, hand.sender_addr);
		assert_eq!(back.user_agent, USER_AGENT);
	}

	#[test]
	fn txhashset_archive_round_trips_its_raw_bytes() {
		let archive = TxHashSetArchive {
			hash: Hash::default(),
			height: 100,
			data: vec![1, 2, 3, 4, 5],
		};
		let back = round_trip(&archive);
		assert_eq!(back.height, 100);
		assert_eq!(back.data, vec![1, 2, 3, 4, 5]);
	}

	#[test]
	fn msg_header_keeps_unknown_type_as_none() {
		let mut buf = Vec::new();
		buf.push(MAGIC[0]);
		buf.push(MAGIC[1]);
		buf.push(0xaa); // not a known Type tag
		buf.extend_from_slice(&123u64.to_be_bytes());
		let mut reader = StreamingReader::new(&mut &buf[..]);
		let header = MsgHeader::read(&mut reader).unwrap();
		assert_eq!(header.msg_type, None);
		assert_eq!(header.msg_len, 123);
	}

	#[test]
	fn msg_header_rejects_bad_magic() {
		let mut buf = Vec::new();
		buf.push(0x00);
		buf.push(0x00);
		buf.push(Type::Ping as u8);
		buf.extend_from_slice(&0u64.to_be_bytes());
		let mut reader = StreamingReader::new(&mut &buf[..]);
		assert!(MsgHeader::read(&mut reader).is_err());
	}

	#[test]
	fn peer_addrs_reply_rejects_oversize_count() {
		let mut buf = Vec::new();
		buf.extend_from_slice(&(MAX_PEER_ADDRS as u64 + 1).to_be_bytes());
		let mut reader = StreamingReader::new(&mut &buf[..]);
		assert!(PeerAddrs::read(&mut reader).is_err());
	}
}
