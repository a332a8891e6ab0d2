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

//! Configuration file management

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{ConfigError, DandelionConfig, GlobalConfig, P2PConfig};

/// Name of the default data directory, relative to the user's home.
const DEFAULT_DATA_DIR: &str = ".mwnode";

fn default_data_path() -> PathBuf {
	dirs::home_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join(DEFAULT_DATA_DIR)
}

impl Default for GlobalConfig {
	fn default() -> GlobalConfig {
		GlobalConfig {
			data_path: default_data_path(),
			p2p: P2PConfig::default(),
			dandelion: DandelionConfig::default(),
			logging: Default::default(),
		}
	}
}

impl GlobalConfig {
	/// Reads and parses a TOML config file at `path`. A missing file is an
	/// error; callers that want to fall back to defaults should check
	/// existence first and call `GlobalConfig::default()` instead.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<GlobalConfig, ConfigError> {
		let path = path.as_ref();
		if !path.exists() {
			return Err(ConfigError::FileNotFoundError(
				path.to_string_lossy().to_string(),
			));
		}
		let contents = fs::read_to_string(path)?;
		toml::from_str(&contents)
			.map_err(|e| ConfigError::ParseError(path.to_string_lossy().to_string(), e.to_string()))
	}

	/// Serializes this config back to TOML, for writing out a starter file.
	pub fn to_toml(&self) -> Result<String, ConfigError> {
		toml::to_string(self).map_err(|e| ConfigError::SerializationError(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_round_trip_through_toml() {
		let defaults = GlobalConfig::default();
		let toml_str = defaults.to_toml().unwrap();
		let decoded: GlobalConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(defaults, decoded);
	}

	#[test]
	fn partial_file_falls_back_to_defaults() {
		let toml_str = r#"
			data_path = "/tmp/mwnode-test"

			[p2p]
			port = 23414
			max_peers = 10
			ban_window_secs = 3600
		"#;
		let decoded: GlobalConfig = toml::from_str(toml_str).unwrap();
		assert_eq!(decoded.data_path, PathBuf::from("/tmp/mwnode-test"));
		assert_eq!(decoded.p2p.port, 23414);
		assert_eq!(decoded.dandelion, DandelionConfig::default());
	}

	#[test]
	fn missing_file_is_not_found_error() {
		match GlobalConfig::load("/nonexistent/path/to/mwnode.toml") {
			Err(ConfigError::FileNotFoundError(_)) => {}
			other => panic!("expected FileNotFoundError, got {:?}", other),
		}
	}
}
