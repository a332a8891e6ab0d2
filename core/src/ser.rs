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

//! Serialization and deserialization layer for almost every type in the
//! crate. Designed to be fast and small: fixed-width integers are written
//! big-endian without padding, fixed-size byte arrays are written with no
//! length prefix (callers know their size), and variable-length data carries
//! an explicit `u64` length prefix.
//!
//! Follows the `Readable`/`Writeable` pattern used throughout the codebase:
//! a type implements both traits once and gets `serialize`/`deserialize`
//! for free via the blanket helpers at the bottom of this file.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use failure_derive::Fail;

/// Anything that can be written in a canonical binary form.
pub trait Writeable {
	/// Write `self` into the given writer.
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Anything that can be read back from its canonical binary form.
pub trait Readable: Sized {
	/// Read an instance of `Self` from the given reader.
	fn read(reader: &mut dyn Reader) -> Result<Self, Error>;
}

/// Low-level write primitives. A `Writer` has no notion of message framing;
/// it just accumulates bytes.
pub trait Writer {
	/// Write a single byte.
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	/// Write a 16-bit big-endian integer.
	fn write_u16(&mut self, n: u16) -> Result<(), Error>;
	/// Write a 32-bit big-endian integer.
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	/// Write a 64-bit big-endian integer.
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	/// Write a fixed-size byte slice with no length prefix.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;
	/// Write a `u64`-length-prefixed byte slice.
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_u64(bytes.len() as u64)?;
		self.write_fixed_bytes(bytes)
	}
}

/// Low-level read primitives, the dual of [`Writer`].
pub trait Reader {
	/// Read a single byte.
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a 16-bit big-endian integer.
	fn read_u16(&mut self) -> Result<u16, Error>;
	/// Read a 32-bit big-endian integer.
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a 64-bit big-endian integer.
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read exactly `len` bytes.
	fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error>;
	/// Read a `u64`-length-prefixed byte vector, rejecting declared lengths
	/// above `max_len` (a DoS guard against a peer claiming a multi-GB body).
	fn read_bytes_len_prefix(&mut self, max_len: u64) -> Result<Vec<u8>, Error> {
		let len = self.read_u64()?;
		if len > max_len {
			return Err(Error::TooLarge);
		}
		self.read_fixed_bytes(len as usize)
	}
	/// Peek at the single next byte without consuming it, used to branch on
	/// a variant tag before committing to reading the rest of a value.
	fn peek_u8(&mut self) -> Result<u8, Error>;
}

/// Errors produced while reading or writing the binary codec.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
	/// Writer/reader hit the end of its underlying stream early.
	#[fail(display = "unexpected end of input")]
	UnexpectedEof,
	/// A variant tag didn't match any of the expected values.
	#[fail(display = "invalid variant tag: {}", _0)]
	InvalidTag(u8),
	/// A declared length was larger than the caller's configured maximum.
	#[fail(display = "declared length too large")]
	TooLarge,
	/// Underlying I/O error (only relevant for file/stream backed readers).
	#[fail(display = "I/O error: {}", _0)]
	IoErr(String),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		match e.kind() {
			io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
			_ => Error::IoErr(e.to_string()),
		}
	}
}

/// A `Writer` that appends to an in-memory `Vec<u8>`.
pub struct VecWriter<'a> {
	vec: &'a mut Vec<u8>,
}

impl<'a> VecWriter<'a> {
	/// Wrap a mutable byte vector for writing.
	pub fn new(vec: &'a mut Vec<u8>) -> Self {
		VecWriter { vec }
	}
}

impl<'a> Writer for VecWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.vec.push(n);
		Ok(())
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		self.vec.write_u16::<BigEndian>(n)?;
		Ok(())
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.vec.write_u32::<BigEndian>(n)?;
		Ok(())
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.vec.write_u64::<BigEndian>(n)?;
		Ok(())
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.vec.extend_from_slice(bytes);
		Ok(())
	}
}

/// A `Reader` over an in-memory byte slice with a cursor.
pub struct SliceReader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> SliceReader<'a> {
	/// Wrap a byte slice for reading from the start.
	pub fn new(buf: &'a [u8]) -> Self {
		SliceReader { buf, pos: 0 }
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
		if self.pos + len > self.buf.len() {
			return Err(Error::UnexpectedEof);
		}
		let slice = &self.buf[self.pos..self.pos + len];
		self.pos += len;
		Ok(slice)
	}
}

impl<'a> Reader for SliceReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		Ok(self.take(1)?[0])
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		let mut s = self.take(2)?;
		Ok(s.read_u16::<BigEndian>()?)
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		let mut s = self.take(4)?;
		Ok(s.read_u32::<BigEndian>()?)
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		let mut s = self.take(8)?;
		Ok(s.read_u64::<BigEndian>()?)
	}
	fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
		Ok(self.take(len)?.to_vec())
	}
	fn peek_u8(&mut self) -> Result<u8, Error> {
		self.buf
			.get(self.pos)
			.copied()
			.ok_or(Error::UnexpectedEof)
	}
}

/// A `Reader` over any `std::io::Read`, used when streaming a large value
/// (e.g. a TxHashSet archive) directly off a socket or file without
/// buffering the whole thing in memory first.
pub struct StreamingReader<'a, R: Read> {
	source: &'a mut R,
	peeked: Option<u8>,
}

impl<'a, R: Read> StreamingReader<'a, R> {
	/// Wrap a `Read` implementor.
	pub fn new(source: &'a mut R) -> Self {
		StreamingReader {
			source,
			peeked: None,
		}
	}

	fn next_byte(&mut self) -> Result<u8, Error> {
		if let Some(b) = self.peeked.take() {
			return Ok(b);
		}
		let mut b = [0u8; 1];
		self.source.read_exact(&mut b)?;
		Ok(b[0])
	}
}

impl<'a, R: Read> Reader for StreamingReader<'a, R> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		self.next_byte()
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		let hi = self.next_byte()? as u16;
		let lo = self.next_byte()? as u16;
		Ok((hi << 8) | lo)
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		let mut buf = [0u8; 4];
		buf[0] = self.next_byte()?;
		for b in buf.iter_mut().skip(1) {
			*b = self.next_byte()?;
		}
		Ok(u32::from_be_bytes(buf))
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		let mut buf = [0u8; 8];
		buf[0] = self.next_byte()?;
		for b in buf.iter_mut().skip(1) {
			*b = self.next_byte()?;
		}
		Ok(u64::from_be_bytes(buf))
	}
	fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
		let mut buf = vec![0u8; len];
		self.source.read_exact(&mut buf)?;
		Ok(buf)
	}
	fn peek_u8(&mut self) -> Result<u8, Error> {
		if self.peeked.is_none() {
			self.peeked = Some(self.next_byte()?);
		}
		Ok(self.peeked.unwrap())
	}
}

/// Serializes a `Writeable` into a freshly allocated byte vector.
pub fn serialize<W: Writeable>(value: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::new();
	{
		let mut writer = VecWriter::new(&mut vec);
		value.write(&mut writer)?;
	}
	Ok(vec)
}

/// Deserializes a `Readable` from a byte slice. Does not require the whole
/// slice to be consumed (trailing bytes, if any, are ignored by the caller).
pub fn deserialize<T: Readable>(bytes: &[u8]) -> Result<T, Error> {
	let mut reader = SliceReader::new(bytes);
	T::read(&mut reader)
}

macro_rules! impl_int_rw {
	($t:ty, $w:ident, $r:ident) => {
		impl Writeable for $t {
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
				writer.$w(*self)
			}
		}
		impl Readable for $t {
			fn read(reader: &mut dyn Reader) -> Result<$t, Error> {
				reader.$r()
			}
		}
	};
}

impl_int_rw!(u8, write_u8, read_u8);
impl_int_rw!(u16, write_u16, read_u16);
impl_int_rw!(u32, write_u32, read_u32);
impl_int_rw!(u64, write_u64, read_u64);

impl<T: Writeable> Writeable for Vec<T> {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_u64(self.len() as u64)?;
		for item in self {
			item.write(writer)?;
		}
		Ok(())
	}
}

impl<T: Readable> Readable for Vec<T> {
	fn read(reader: &mut dyn Reader) -> Result<Vec<T>, Error> {
		let len = reader.read_u64()?;
		if len > super::consensus::MAX_IN_OUT_LEN {
			return Err(Error::TooLarge);
		}
		(0..len).map(|_| T::read(reader)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn int_round_trip() {
		let v: u64 = 0x0102_0304_0506_0708;
		let bytes = serialize(&v).unwrap();
		assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
		let back: u64 = deserialize(&bytes).unwrap();
		assert_eq!(back, v);
	}

	#[test]
	fn short_read_errors() {
		let bytes = vec![0u8; 3];
		let res: Result<u64, Error> = deserialize(&bytes);
		assert!(res.is_err());
	}

	#[test]
	fn vec_round_trip() {
		let v: Vec<u32> = vec![1, 2, 3, 4];
		let bytes = serialize(&v).unwrap();
		let back: Vec<u32> = deserialize(&bytes).unwrap();
		assert_eq!(back, v);
	}
}
