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

//! Accepts and dials connections, runs the version handshake, and owns
//! the fixed-size worker pool that actually executes the dispatch
//! table. Handshakes run synchronously (blocking reads) on the
//! accepting/dialing thread; once a peer is admitted its socket is
//! handed to [`Connection::spawn`] and all further traffic goes through
//! the threaded reader/writer pair plus this pool.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use mw_chain::ChainState;
use mw_core::core::hash::Hash;
use mw_core::ser::{Readable, StreamingReader, VecWriter, Writeable};

use crate::conn::Connection;
use crate::msg::{
	Hand, MsgHeader, PeerAddr, Shake, Type, HEADER_LEN, MAX_MSG_SIZE, PROTOCOL_VERSION, USER_AGENT,
};
use crate::peer::Peer;
use crate::peers::PeerManager;
use crate::protocol::MessageProcessor;
use crate::types::{Capabilities, Error, ErrorKind, PeerInfo};

/// Depth of the queue feeding the worker pool. Connection threads push
/// here and never block on a worker being busy past this; beyond it a
/// job is dropped, same trade-off as the per-connection outbound queue.
const JOB_QUEUE_CAP: usize = 1024;

/// How often the sweep thread checks for inactive connections.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// One decoded frame waiting for the dispatch table. Carries the peer's
/// address rather than an `Arc<Peer>` directly: the connection handler
/// that produces a `Job` runs inside `Connection::spawn`'s reader
/// thread, before the `Peer` wrapping that same connection has been
/// constructed, so the worker looks the peer back up by address when it
/// runs.
struct Job {
	addr: SocketAddr,
	msg_type: Option<Type>,
	body: Vec<u8>,
}

/// Runs the accept loop, the outbound dialer and the worker pool that
/// backs every connection's dispatch table.
pub struct P2PServer {
	chain: Arc<ChainState>,
	peers: PeerManager,
	processor: Arc<MessageProcessor>,
	genesis_hash: Hash,
	nonce: u64,
	capabilities: Capabilities,
	job_tx: SyncSender<Job>,
	workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl P2PServer {
	/// Builds a server bound to `chain`, ready to accept or dial
	/// connections. `genesis_hash` is compared against every peer's
	/// handshake to reject a peer on the wrong network.
	pub fn new(chain: Arc<ChainState>, genesis_hash: Hash, capabilities: Capabilities) -> Arc<P2PServer> {
		let peers = PeerManager::new();
		let processor = Arc::new(MessageProcessor::new(chain.clone(), peers.clone()));
		let (job_tx, job_rx) = sync_channel(JOB_QUEUE_CAP);
		let job_rx = Arc::new(Mutex::new(job_rx));

		let server = Arc::new(P2PServer {
			chain,
			peers,
			processor,
			genesis_hash,
			nonce: rand::random(),
			capabilities,
			job_tx,
			workers: Mutex::new(Vec::new()),
		});

		let worker_count = std::cmp::max(4, 2 * num_cpus::get());
		let mut workers = Vec::with_capacity(worker_count);
		for i in 0..worker_count {
			let server = server.clone();
			let job_rx = job_rx.clone();
			workers.push(
				thread::Builder::new()
					.name(format!("p2p-worker-{}", i))
					.spawn(move || server.worker_loop(job_rx))
					.expect("spawn p2p worker"),
			);
		}
		*server.workers.lock().unwrap() = workers;
		server
	}

	fn worker_loop(&self, job_rx: Arc<Mutex<Receiver<Job>>>) {
		loop {
			let job = {
				let rx = job_rx.lock().unwrap();
				match rx.recv() {
					Ok(job) => job,
					Err(_) => return,
				}
			};
			let peer = match self.peers.get(&job.addr) {
				Some(peer) => peer,
				None => continue,
			};
			match self.processor.process(&peer, job.msg_type, &job.body) {
				crate::types::ProcessMsgResult::BanPeer(reason) => {
					self.peers.ban(job.addr, reason);
				}
				crate::types::ProcessMsgResult::SocketFailure => {
					self.peers.remove(&job.addr);
				}
				_ => {}
			}
		}
	}

	/// Binds `bind_addr` and accepts inbound connections until the
	/// listener errors. Also starts the inactivity sweep thread. Blocks
	/// the calling thread; callers that need to do other work should run
	/// this on its own thread.
	pub fn listen(self: Arc<Self>, bind_addr: SocketAddr) -> Result<(), Error> {
		let listener = TcpListener::bind(bind_addr)?;
		info!("p2p: listening on {}", bind_addr);

		{
			let server = self.clone();
			thread::spawn(move || loop {
				thread::sleep(SWEEP_INTERVAL);
				server.peers.evict_inactive();
			});
		}

		for incoming in listener.incoming() {
			let stream = match incoming {
				Ok(s) => s,
				Err(e) => {
					warn!("p2p: accept failed: {}", e);
					continue;
				}
			};
			let server = self.clone();
			thread::spawn(move || {
				if let Err(e) = server.accept(stream) {
					debug!("p2p: inbound handshake failed: {}", e);
				}
			});
		}
		Ok(())
	}

	/// Dials `addr` and runs the handshake as the initiating side.
	pub fn connect(self: Arc<Self>, addr: SocketAddr) -> Result<(), Error> {
		if self.peers.is_banned(&addr) {
			return Err(ErrorKind::Banned.into());
		}
		let stream = TcpStream::connect(addr)?;
		self.dial(stream, addr)
	}

	fn local_addr(&self, stream: &TcpStream) -> PeerAddr {
		PeerAddr(stream.local_addr().unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap()))
	}

	fn hand(&self, stream: &TcpStream, addr: SocketAddr) -> Hand {
		Hand {
			version: PROTOCOL_VERSION,
			capabilities: self.capabilities,
			nonce: self.nonce,
			total_difficulty: self.chain.total_difficulty(mw_chain::ChainName::Confirmed).unwrap_or_default(),
			sender_addr: self.local_addr(stream),
			receiver_addr: PeerAddr(addr),
			user_agent: USER_AGENT.to_string(),
			genesis_hash: self.genesis_hash,
		}
	}

	/// Initiating side: send `Hand`, read back `Shake`, validate it.
	fn dial(self: Arc<Self>, mut stream: TcpStream, addr: SocketAddr) -> Result<(), Error> {
		let hand = self.hand(&stream, addr);
		write_frame(&mut stream, Type::Hand, &hand)?;
		let (header, body) = read_frame_blocking(&mut stream)?;
		if header.msg_type != Some(Type::Shake) {
			return Err(ErrorKind::ConnectionError("expected Shake".to_string()).into());
		}
		let shake: Shake = decode(&body)?;
		self.admit(stream, addr, shake.version, shake.capabilities, shake.total_difficulty, shake.genesis_hash, shake.user_agent)
	}

	/// Accepting side: read `Hand`, validate it, reply with `Shake`.
	fn accept(self: Arc<Self>, mut stream: TcpStream) -> Result<(), Error> {
		let addr = stream.peer_addr()?;
		if self.peers.is_banned(&addr) {
			return Err(ErrorKind::Banned.into());
		}
		let (header, body) = read_frame_blocking(&mut stream)?;
		if header.msg_type != Some(Type::Hand) {
			return Err(ErrorKind::ConnectionError("expected Hand".to_string()).into());
		}
		let hand: Hand = decode(&body)?;
		if hand.nonce == self.nonce {
			return Err(ErrorKind::PeerWithSelf.into());
		}
		if hand.genesis_hash != self.genesis_hash {
			return Err(ErrorKind::GenesisMismatch.into());
		}
		if hand.version != PROTOCOL_VERSION {
			return Err(ErrorKind::ProtocolMismatch { us: PROTOCOL_VERSION, peer: hand.version }.into());
		}

		let shake = Shake {
			version: PROTOCOL_VERSION,
			capabilities: self.capabilities,
			total_difficulty: self.chain.total_difficulty(mw_chain::ChainName::Confirmed).unwrap_or_default(),
			sender_addr: self.local_addr(&stream),
			receiver_addr: PeerAddr(addr),
			user_agent: USER_AGENT.to_string(),
			genesis_hash: self.genesis_hash,
		};
		write_frame(&mut stream, Type::Shake, &shake)?;
		self.admit(stream, addr, hand.version, hand.capabilities, hand.total_difficulty, hand.genesis_hash, hand.user_agent)
	}

	fn admit(
		self: Arc<Self>,
		stream: TcpStream,
		addr: SocketAddr,
		version: u32,
		capabilities: Capabilities,
		total_difficulty: mw_core::pow::Difficulty,
		genesis_hash: Hash,
		user_agent: String,
	) -> Result<(), Error> {
		if genesis_hash != self.genesis_hash {
			return Err(ErrorKind::GenesisMismatch.into());
		}
		if version != PROTOCOL_VERSION {
			return Err(ErrorKind::ProtocolMismatch { us: PROTOCOL_VERSION, peer: version }.into());
		}

		let info = PeerInfo {
			capabilities,
			user_agent,
			version,
			addr,
			total_difficulty,
			height: 0,
		};

		let job_tx = self.job_tx.clone();
		let conn = Connection::spawn(stream, move |msg_type: Option<Type>, body: &[u8]| {
			match job_tx.try_send(Job { addr, msg_type, body: body.to_vec() }) {
				Ok(()) => {}
				Err(_) => debug!("p2p: worker queue full, dropping message from {}", addr),
			}
			crate::types::ProcessMsgResult::Success
		})?;

		let peer = Arc::new(Peer::new(info, conn));
		self.peers.add(peer);
		Ok(())
	}
}

fn write_frame<W: Writeable>(stream: &mut TcpStream, msg_type: Type, body: &W) -> Result<(), Error> {
	let mut payload = Vec::new();
	body.write(&mut VecWriter::new(&mut payload))?;
	let mut frame = Vec::with_capacity(HEADER_LEN as usize + payload.len());
	MsgHeader::new(msg_type, payload.len() as u64).write(&mut VecWriter::new(&mut frame))?;
	frame.extend_from_slice(&payload);
	stream.write_all(&frame)?;
	Ok(())
}

fn read_frame_blocking(stream: &mut TcpStream) -> Result<(MsgHeader, Vec<u8>), Error> {
	let mut head_buf = vec![0u8; HEADER_LEN as usize];
	stream.read_exact(&mut head_buf)?;
	let mut reader = StreamingReader::new(&mut &head_buf[..]);
	let header = MsgHeader::read(&mut reader)?;
	let max_len = header.msg_type.map(|t| t.max_len()).unwrap_or(MAX_MSG_SIZE);
	if header.msg_len > max_len {
		return Err(ErrorKind::DeserializationError("oversize handshake payload".to_string()).into());
	}
	let mut body = vec![0u8; header.msg_len as usize];
	stream.read_exact(&mut body)?;
	Ok((header, body))
}

fn decode<T: Readable>(body: &[u8]) -> Result<T, Error> {
	let mut reader = StreamingReader::new(&mut &body[..]);
	Ok(T::read(&mut reader)?)
}
