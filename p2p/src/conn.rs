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

//! The low-level connection wrapper: a dedicated reader thread that
//! frames incoming messages and a dedicated writer thread that drains a
//! bounded outbound queue, with a shared "last seen traffic" clock the
//! server polls to evict connections that have gone quiet.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use mw_core::ser::{Readable, StreamingReader, VecWriter, Writeable};

use crate::msg::{MsgHeader, Type, HEADER_LEN};
use crate::types::{Error, ErrorKind};

/// Depth of the outbound queue. Once full, further sends are dropped
/// rather than blocking the caller: a slow peer should fall behind, not
/// stall the connection or worker threads feeding it.
pub const SEND_CHANNEL_CAP: usize = 256;

/// A connection is considered dead if no frame, in either direction, has
/// been observed for this long.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the reader thread's poll loop sleeps between checks for new
/// data when the socket has nothing ready.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Called from the reader thread with every decoded frame. Implementors
/// do not own the socket and must not block for long: the dispatch
/// table runs here, so a slow handler stalls this one connection's
/// reads, not anyone else's.
pub trait Handler: Send + Sync {
	fn handle(&self, msg_type: Option<Type>, body: &[u8]) -> crate::types::ProcessMsgResult;
}

impl<F> Handler for F
where
	F: Fn(Option<Type>, &[u8]) -> crate::types::ProcessMsgResult + Send + Sync,
{
	fn handle(&self, msg_type: Option<Type>, body: &[u8]) -> crate::types::ProcessMsgResult {
		self(msg_type, body)
	}
}

/// A live peer connection: owns the socket's read and write halves on
/// two dedicated threads and exposes a channel-backed `send` that never
/// touches the socket from the caller's thread.
pub struct Connection {
	outbound: SyncSender<Vec<u8>>,
	terminate: Arc<AtomicBool>,
	last_seen_millis: Arc<AtomicU64>,
	started_at: Instant,
	reader: Option<thread::JoinHandle<()>>,
	writer: Option<thread::JoinHandle<()>>,
}

fn now_millis(started_at: Instant) -> u64 {
	Instant::now().duration_since(started_at).as_millis() as u64
}

impl Connection {
	/// Spawns the reader and writer threads for an already-connected
	/// socket. `handler` is invoked from the reader thread for every
	/// frame; its `ProcessMsgResult` never reaches back into this
	/// connection directly, the caller polls [`Connection::is_banned`]-
	/// style signals out of band via the handler's own side effects.
	pub fn spawn<H>(stream: TcpStream, handler: H) -> Result<Connection, Error>
	where
		H: Handler + 'static,
	{
		stream.set_nonblocking(true)?;
		let started_at = Instant::now();
		let last_seen_millis = Arc::new(AtomicU64::new(0));
		let terminate = Arc::new(AtomicBool::new(false));
		let (tx, rx) = sync_channel::<Vec<u8>>(SEND_CHANNEL_CAP);

		let reader_stream = stream.try_clone()?;
		let reader = {
			let last_seen_millis = last_seen_millis.clone();
			let terminate = terminate.clone();
			thread::spawn(move || {
				read_loop(reader_stream, handler, last_seen_millis, terminate, started_at);
			})
		};

		let writer_stream = stream;
		let writer = {
			let last_seen_millis = last_seen_millis.clone();
			let terminate = terminate.clone();
			thread::spawn(move || {
				write_loop(writer_stream, rx, last_seen_millis, terminate, started_at);
			})
		};

		Ok(Connection {
			outbound: tx,
			terminate,
			last_seen_millis,
			started_at,
			reader: Some(reader),
			writer: Some(writer),
		})
	}

	/// Frames and queues a message for send. Drops it (logging at debug)
	/// if the outbound queue is full rather than blocking: a connection
	/// to a slow peer must never back up the caller.
	pub fn send_msg<W: Writeable>(&self, msg_type: Type, body: &W) -> Result<(), Error> {
		let mut payload = Vec::new();
		body.write(&mut VecWriter::new(&mut payload))?;
		let mut frame = Vec::with_capacity(HEADER_LEN as usize + payload.len());
		MsgHeader::new(msg_type, payload.len() as u64).write(&mut VecWriter::new(&mut frame))?;
		frame.extend_from_slice(&payload);

		match self.outbound.try_send(frame) {
			Ok(()) => Ok(()),
			Err(TrySendError::Full(_)) => {
				debug!("conn: outbound queue full, dropping {:?}", msg_type as u8);
				Ok(())
			}
			Err(TrySendError::Disconnected(_)) => Err(ErrorKind::ConnectionError(
				"writer thread gone".to_string(),
			)
			.into()),
		}
	}

	/// Whether this connection has gone silent for longer than the
	/// inactivity timeout in either direction.
	pub fn is_inactive(&self) -> bool {
		let last = self.last_seen_millis.load(Ordering::Relaxed);
		now_millis(self.started_at) - last > INACTIVITY_TIMEOUT.as_millis() as u64
	}

	/// Signals both threads to stop at their next poll and joins them.
	pub fn close(&mut self) {
		self.terminate.store(true, Ordering::SeqCst);
		if let Some(h) = self.reader.take() {
			let _ = h.join();
		}
		if let Some(h) = self.writer.take() {
			let _ = h.join();
		}
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.close();
	}
}

fn touch(last_seen_millis: &AtomicU64, started_at: Instant) {
	last_seen_millis.store(now_millis(started_at), Ordering::Relaxed);
}

fn read_loop<H: Handler>(
	mut stream: TcpStream,
	handler: H,
	last_seen_millis: Arc<AtomicU64>,
	terminate: Arc<AtomicBool>,
	started_at: Instant,
) {
	while !terminate.load(Ordering::Relaxed) {
		match read_frame(&mut stream) {
			Ok(Some((header, body))) => {
				touch(&last_seen_millis, started_at);
				let result = handler.handle(header.msg_type, &body);
				if result == crate::types::ProcessMsgResult::SocketFailure
					|| matches!(result, crate::types::ProcessMsgResult::BanPeer(_))
				{
					terminate.store(true, Ordering::SeqCst);
					return;
				}
			}
			Ok(None) => thread::sleep(POLL_INTERVAL),
			Err(_) => {
				terminate.store(true, Ordering::SeqCst);
				return;
			}
		}
	}
}

/// Reads one frame if the header is fully available, else `None` if the
/// socket would block with nothing buffered yet (a non-blocking read
/// that returns `WouldBlock` before any bytes of the header arrive).
fn read_frame(stream: &mut TcpStream) -> Result<Option<(MsgHeader, Vec<u8>)>, Error> {
	let mut head_byte = [0u8; 1];
	match stream.read(&mut head_byte) {
		Ok(0) => return Err(ErrorKind::ConnectionError("connection closed".to_string()).into()),
		Ok(_) => {}
		Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
		Err(e) => return Err(e.into()),
	}

	// Got the first byte; block (briefly, the peer is mid-frame) for the
	// rest of the header and body rather than re-entering the poll loop
	// one byte at a time.
	stream.set_nonblocking(false)?;
	let result = (|| -> Result<(MsgHeader, Vec<u8>), Error> {
		let mut rest = vec![0u8; HEADER_LEN as usize - 1];
		stream.read_exact(&mut rest)?;
		let mut head_buf = Vec::with_capacity(HEADER_LEN as usize);
		head_buf.push(head_byte[0]);
		head_buf.extend_from_slice(&rest);
		let mut reader = StreamingReader::new(&mut &head_buf[..]);
		let header = MsgHeader::read(&mut reader)?;

		let max_len = header.msg_type.map(|t| t.max_len()).unwrap_or(crate::msg::MAX_MSG_SIZE);
		if header.msg_len > max_len {
			return Err(ErrorKind::DeserializationError("oversize payload".to_string()).into());
		}

		let mut body = vec![0u8; header.msg_len as usize];
		stream.read_exact(&mut body)?;
		Ok((header, body))
	})();
	stream.set_nonblocking(true)?;
	result.map(Some)
}

fn write_loop(
	mut stream: TcpStream,
	rx: Receiver<Vec<u8>>,
	last_seen_millis: Arc<AtomicU64>,
	terminate: Arc<AtomicBool>,
	started_at: Instant,
) {
	while !terminate.load(Ordering::Relaxed) {
		match rx.recv_timeout(POLL_INTERVAL) {
			Ok(frame) => {
				if stream.write_all(&frame).is_err() {
					terminate.store(true, Ordering::SeqCst);
					return;
				}
				touch(&last_seen_millis, started_at);
			}
			Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
			Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
		}
	}
}
