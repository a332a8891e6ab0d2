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

//! Configuration file handling: a single `GlobalConfig` deserialized from
//! TOML, with defaults sane enough to run on with no file at all.

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod types;

pub use crate::types::{ConfigError, DandelionConfig, GlobalConfig, P2PConfig};
