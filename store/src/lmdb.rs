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

//! Generic key/value storage on top of LMDB. The chain's block index,
//! header and block stores are all thin wrappers around a [`Store`]
//! keyed by serialized hashes or heights; all mutation goes through a
//! [`Batch`] so a chain reorg or block application either lands in full
//! or not at all.

use std::fs;
use std::marker;
use std::sync::Arc;

use failure_derive::Fail;
use lmdb_zero as lmdb;
use lmdb_zero::traits::CreateCursor;
use lmdb_zero::LmdbResultExt;

use mw_core::ser;

/// Errors raised by the LMDB storage layer.
#[derive(Clone, Debug, Fail)]
pub enum Error {
	/// The requested key was not present.
	#[fail(display = "not found: {}", _0)]
	NotFoundErr(String),
	/// An LMDB operation itself failed.
	#[fail(display = "lmdb error: {}", _0)]
	LmdbErr(String),
	/// A stored value failed to deserialize, or a value failed to
	/// serialize before being written.
	#[fail(display = "serialization error: {}", _0)]
	SerErr(String),
}

impl From<lmdb::error::Error> for Error {
	fn from(e: lmdb::error::Error) -> Error {
		Error::LmdbErr(e.to_string())
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::SerErr(e.to_string())
	}
}

/// Converts a `Result<Option<T>, Error>` into a `Result<T, Error>`,
/// turning a missing key into [`Error::NotFoundErr`] instead of letting
/// every caller re-derive that mapping.
pub fn option_to_not_found<T>(res: Result<Option<T>, Error>, field_name: &str) -> Result<T, Error> {
	match res {
		Ok(None) => Err(Error::NotFoundErr(field_name.to_owned())),
		Ok(Some(o)) => Ok(o),
		Err(e) => Err(e),
	}
}

/// Opens (creating if necessary) an LMDB environment rooted at `path`,
/// sized generously enough that the chain can grow for years without the
/// map needing to be resized (resizing requires every reader to be
/// quiesced, which is awkward with long-lived read transactions held by
/// other threads).
pub fn new_env(path: &str) -> lmdb::Environment {
	let full_path = format!("{}/lmdb", path);
	fs::create_dir_all(&full_path).expect("failed to create LMDB data directory");
	unsafe {
		let mut builder = lmdb::EnvBuilder::new().expect("failed to create LMDB env builder");
		builder.set_maxdbs(8).expect("failed to set LMDB max dbs");
		builder
			.set_mapsize(549_755_813_888) // 512 GiB, virtual address space only
			.unwrap_or_else(|e| panic!("unable to reserve LMDB address space: {:?}", e));
		builder
			.open(&full_path, lmdb::open::Flags::empty(), 0o600)
			.expect("failed to open LMDB environment")
	}
}

/// A single named database within an LMDB environment.
pub struct Store {
	env: Arc<lmdb::Environment>,
	db: Arc<lmdb::Database<'static>>,
}

impl Store {
	/// Opens (creating if necessary) the named database within `env`.
	pub fn open(env: Arc<lmdb::Environment>, name: &str) -> Store {
		let db = Arc::new(
			lmdb::Database::open(env.clone(), Some(name), &lmdb::DatabaseOptions::new(lmdb::db::CREATE))
				.expect("failed to open LMDB database"),
		);
		Store { env, db }
	}

	/// Raw bytes stored under `key`, if any.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		access
			.get(&self.db, key)
			.map(|res: &[u8]| res.to_vec())
			.to_opt()
			.map_err(Error::from)
	}

	/// Deserializes the value stored under `key`, if any.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		self.get_ser_access(key, &access)
	}

	fn get_ser_access<T: ser::Readable>(
		&self,
		key: &[u8],
		access: &lmdb::ConstAccessor,
	) -> Result<Option<T>, Error> {
		let res: lmdb::error::Result<&[u8]> = access.get(&self.db, key);
		match res.to_opt() {
			Ok(Some(bytes)) => Ok(Some(ser::deserialize(bytes)?)),
			Ok(None) => Ok(None),
			Err(e) => Err(Error::from(e)),
		}
	}

	/// Whether `key` is present.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&self.db, key);
		res.to_opt().map(|r| r.is_some()).map_err(Error::from)
	}

	/// Iterates deserialized values starting from the first key with
	/// `prefix` as a prefix.
	pub fn iter<T: ser::Readable>(&self, prefix: &[u8]) -> Result<SerIterator<T>, Error> {
		let txn = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = Arc::new(txn.cursor(self.db.clone())?);
		Ok(SerIterator {
			tx: txn,
			cursor,
			started: false,
			prefix: prefix.to_vec(),
			_marker: marker::PhantomData,
		})
	}

	/// Opens a new write batch against this store.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		let tx = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx })
	}
}

/// An atomic group of writes against a [`Store`]. Nothing is visible to
/// other readers until [`Batch::commit`] is called; dropping a `Batch`
/// without committing discards everything written through it.
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Writes a raw key/value pair.
	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
		self.tx
			.access()
			.put(&self.store.db, key, value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	/// Serializes `value` and writes it under `key`.
	pub fn put_ser<W: ser::Writeable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		let bytes = ser::serialize(value)?;
		self.put(key, &bytes)
	}

	/// Reads a raw value, seeing this batch's own uncommitted writes.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let access = self.tx.access();
		let res: lmdb::error::Result<&[u8]> = access.get(&self.store.db, key);
		res.map(|v: &[u8]| v.to_vec()).to_opt().map_err(Error::from)
	}

	/// Deserializes a value, seeing this batch's own uncommitted writes.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		let access = self.tx.access();
		self.store.get_ser_access(key, &access)
	}

	/// Whether `key` is present, seeing this batch's own uncommitted
	/// writes.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		let access = self.tx.access();
		let res: lmdb::error::Result<&lmdb::Ignore> = access.get(&self.store.db, key);
		res.to_opt().map(|r| r.is_some()).map_err(Error::from)
	}

	/// Deletes `key`, a no-op if absent.
	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		match self.tx.access().del_key(&self.store.db, key) {
			Ok(()) => Ok(()),
			Err(lmdb::Error::Code(lmdb::error::NOTFOUND)) => Ok(()),
			Err(e) => Err(Error::from(e)),
		}
	}

	/// Commits every write made through this batch, making them visible
	/// to subsequent readers.
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}
}

/// Iterates the `Readable` values of a [`Store`] whose keys share a
/// prefix, stopping as soon as a key no longer matches.
pub struct SerIterator<T: ser::Readable> {
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: Arc<lmdb::Cursor<'static, 'static>>,
	started: bool,
	prefix: Vec<u8>,
	_marker: marker::PhantomData<T>,
}

impl<T: ser::Readable> Iterator for SerIterator<T> {
	type Item = T;

	fn next(&mut self) -> Option<T> {
		let access = self.tx.access();
		let kv = if self.started {
			Arc::get_mut(&mut self.cursor).unwrap().next(&access)
		} else {
			self.started = true;
			Arc::get_mut(&mut self.cursor)
				.unwrap()
				.seek_range_k(&access, &self.prefix[..])
		};
		self.deser_if_prefix_match(kv)
	}
}

impl<T: ser::Readable> SerIterator<T> {
	fn deser_if_prefix_match(&self, kv: Result<(&[u8], &[u8]), lmdb::Error>) -> Option<T> {
		match kv {
			Ok((k, v)) => {
				let plen = self.prefix.len();
				if plen == 0 || (k.len() >= plen && k[0..plen] == self.prefix[..]) {
					ser::deserialize(v).ok()
				} else {
					None
				}
			}
			Err(_) => None,
		}
	}
}
