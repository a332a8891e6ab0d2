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

//! Logging, locking and low-level utilities shared by every crate in the
//! workspace, factored out so none of them need to re-derive them.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

use std::cell::{Ref, RefCell};

pub mod hex;
pub mod logger;
pub mod types;
pub mod zip;

pub use crate::hex::{from_hex, to_hex};
pub use crate::logger::{init_logger, init_test_logger};
pub use crate::types::{LogLevel, LoggingConfig};

/// Re-export of `parking_lot`'s `RwLock`, used everywhere a `ChainState` or
/// `PeerManager` style component needs shared mutable state. `parking_lot`'s
/// locks do not poison on panic, which matters here: a panicking reader must
/// not wedge every other thread waiting on the chain lock.
pub type RwLock<T> = parking_lot::RwLock<T>;
/// Re-export of `parking_lot`'s `Mutex`, same rationale as [`RwLock`].
pub type Mutex<T> = parking_lot::Mutex<T>;

/// A write guard into a [`RwLock`].
pub type RwLockWriteGuard<'a, T> = parking_lot::RwLockWriteGuard<'a, T>;
/// A read guard into a [`RwLock`].
pub type RwLockReadGuard<'a, T> = parking_lot::RwLockReadGuard<'a, T>;

/// Encapsulation of a `RefCell<Option<T>>` for one-time initialization after
/// construction, used for values that can only be known once the rest of a
/// graph of components has been wired together (e.g. a `Weak` back-pointer
/// handed out before its target is fully built).
pub struct OneTime<T> {
	inner: RefCell<Option<T>>,
}

unsafe impl<T> Sync for OneTime<T> {}
unsafe impl<T> Send for OneTime<T> {}

impl<T> OneTime<T> {
	/// Builds a new uninitialized `OneTime`.
	pub fn new() -> OneTime<T> {
		OneTime {
			inner: RefCell::new(None),
		}
	}

	/// Initializes the `OneTime`. Should only be called once.
	pub fn init(&self, value: T) {
		let mut inner_mut = self.inner.borrow_mut();
		*inner_mut = Some(value);
	}

	/// Whether the `OneTime` has been initialized.
	pub fn is_initialized(&self) -> bool {
		self.inner.borrow().is_some()
	}

	/// Borrows the value. Panics if called before [`OneTime::init`].
	pub fn borrow(&self) -> Ref<'_, T> {
		Ref::map(self.inner.borrow(), |o| {
			o.as_ref().expect("OneTime accessed before initialization")
		})
	}
}

impl<T> Default for OneTime<T> {
	fn default() -> Self {
		OneTime::new()
	}
}
