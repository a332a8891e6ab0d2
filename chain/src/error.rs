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

//! Error types for chain state management.

use std::fmt::{self, Display};

use failure::{Backtrace, Context, Fail};

use mw_core::core::block::BlockError;
use mw_core::core::transaction::TransactionError;
use mw_core::ser;
use mw_store::{ChainStoreError, Error as StoreError};

/// A chain error together with its causal context.
#[derive(Debug, Fail)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// The kinds of failure chain state management can produce. See §7's
/// error handling design: only `StorageError` is fatal to the process,
/// every other kind is a judgment about a single peer-supplied header,
/// block or message.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// Wire input failed to decode.
	#[fail(display = "deserialization error: {}", _0)]
	DeserializationError(String),
	/// A header failed a stateless check (bad PoW, bad difficulty,
	/// timestamp out of bounds).
	#[fail(display = "invalid header: {}", _0)]
	InvalidHeader(String),
	/// A block failed a validator (kernel sum, coinbase rule, range
	/// proof, lock height).
	#[fail(display = "invalid block: {}", _0)]
	InvalidBlock(String),
	/// The block's parent is not yet known; it has been parked in the
	/// orphan pool and this is not an error the caller need act on.
	#[fail(display = "orphan block, parent not found")]
	OrphanBlock,
	/// A block was offered that doesn't extend the tip of its target
	/// chain; the reorg pipeline needs to run.
	#[fail(display = "fork: block does not extend chain tip")]
	Fork,
	/// Applying a block's body to the TxHashSet produced roots that
	/// don't match the header; the apply has been rolled back.
	#[fail(display = "txhashset root mismatch")]
	RootMismatch,
	/// An I/O or codec failure in the storage layer. Fatal: the caller
	/// must discard uncommitted state and abort the current write.
	#[fail(display = "storage error: {}", _0)]
	StorageError(String),
	/// The offering peer is currently on the ban list.
	#[fail(display = "peer is banned")]
	Banned,
	/// Genesis has not been initialized yet.
	#[fail(display = "genesis block required")]
	GenesisRequired,
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

	/// Whether this error reflects something intrinsically wrong with
	/// the data a peer sent, as opposed to a local/storage failure. Used
	/// to decide between a peer strike and a fatal process abort.
	pub fn is_bad_data(&self) -> bool {
		match self.kind() {
			ErrorKind::StorageError(_) | ErrorKind::GenesisRequired | ErrorKind::OrphanBlock => false,
			_ => true,
		}
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

impl From<BlockError> for Error {
	fn from(error: BlockError) -> Error {
		Error {
			inner: Context::new(ErrorKind::InvalidBlock(error.to_string())),
		}
	}
}

impl From<TransactionError> for Error {
	fn from(error: TransactionError) -> Error {
		Error {
			inner: Context::new(ErrorKind::InvalidBlock(error.to_string())),
		}
	}
}

impl From<StoreError> for Error {
	fn from(error: StoreError) -> Error {
		Error {
			inner: Context::new(ErrorKind::StorageError(error.to_string())),
		}
	}
}

impl From<ChainStoreError> for Error {
	fn from(error: ChainStoreError) -> Error {
		Error {
			inner: Context::new(ErrorKind::StorageError(error.to_string())),
		}
	}
}

impl From<ser::Error> for Error {
	fn from(error: ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::DeserializationError(error.to_string())),
		}
	}
}
