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

//! Public types for config modules

use std::fmt;
use std::io;
use std::path::PathBuf;

use mw_util::LoggingConfig;

/// Error type wrapping config errors.
#[derive(Debug)]
pub enum ConfigError {
	/// Error with parsing of config file
	ParseError(String, String),

	/// Error with fileIO while reading config file
	FileIOError(String, String),

	/// No file found
	FileNotFoundError(String),

	/// Error serializing config values
	SerializationError(String),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ConfigError::ParseError(ref file_name, ref message) => write!(
				f,
				"Error parsing configuration file at {} - {}",
				file_name, message
			),
			ConfigError::FileIOError(ref file_name, ref message) => {
				write!(f, "{} {}", message, file_name)
			}
			ConfigError::FileNotFoundError(ref file_name) => {
				write!(f, "Configuration file not found: {}", file_name)
			}
			ConfigError::SerializationError(ref message) => {
				write!(f, "Error serializing configuration: {}", message)
			}
		}
	}
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
	fn from(error: io::Error) -> ConfigError {
		ConfigError::FileIOError(
			String::from(""),
			format!("Error loading config file: {}", error),
		)
	}
}

/// P2P networking section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct P2PConfig {
	/// The port to listen on for peer connections.
	pub port: u16,
	/// Maximum number of connected peers to keep at once.
	pub max_peers: u32,
	/// How long, in seconds, a ban lasts before the peer is allowed back.
	pub ban_window_secs: u64,
	/// Seed peers to dial on startup, `host:port` pairs.
	#[serde(default)]
	pub seeds: Vec<String>,
}

impl Default for P2PConfig {
	fn default() -> P2PConfig {
		P2PConfig {
			port: 13414,
			max_peers: 25,
			ban_window_secs: 10_800,
			seeds: vec![],
		}
	}
}

/// Dandelion relay parameters. No stempool exists yet in this workspace, so
/// these are read and stored but not yet acted on by anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DandelionConfig {
	/// Dandelion relay time: choose a new relay peer every n secs.
	pub relay_secs: u64,
	/// Fluff and broadcast after embargo expires if a tx isn't seen relayed.
	pub embargo_secs: u64,
}

impl Default for DandelionConfig {
	fn default() -> DandelionConfig {
		DandelionConfig {
			relay_secs: 600,
			embargo_secs: 180,
		}
	}
}

/// Top level configuration for the node. Deserializes directly from a TOML
/// config file; every field has a sensible default so an empty file (or no
/// file at all) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
	/// Directory in which the chain database and any temporary sync
	/// artifacts (txhashset zips) are stored.
	pub data_path: PathBuf,
	/// P2P networking options.
	#[serde(default)]
	pub p2p: P2PConfig,
	/// Dandelion relay options.
	#[serde(default)]
	pub dandelion: DandelionConfig,
	/// Logging options.
	#[serde(default)]
	pub logging: LoggingConfig,
}
