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

//! Logging configuration types, shared by every crate in the workspace.

/// Log level, mirrors `log::LevelFilter` without pulling `log` into every
/// caller's config deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
	/// Error
	Error,
	/// Warning
	Warning,
	/// Info
	Info,
	/// Debug
	Debug,
	/// Trace
	Trace,
}

/// Logger configuration, set once at startup and read by `init_logger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
	/// Whether to log to stdout
	pub log_to_stdout: bool,
	/// Minimum log level printed to stdout
	pub stdout_log_level: LogLevel,
	/// Whether to log to disk
	pub log_to_file: bool,
	/// Minimum log level written to the log file
	pub file_log_level: LogLevel,
	/// Path of the log file, relative to `data_path` if not absolute
	pub log_file_path: String,
	/// Whether to append to an existing log file or truncate it on start
	pub log_file_append: bool,
	/// Maximum log file size before rotation, in bytes
	pub log_max_size: Option<u64>,
	/// Number of rotated log files to keep
	pub log_max_files: Option<u32>,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			log_to_stdout: true,
			stdout_log_level: LogLevel::Info,
			log_to_file: true,
			file_log_level: LogLevel::Debug,
			log_file_path: "mwnode.log".to_string(),
			log_file_append: true,
			log_max_size: Some(16 * 1024 * 1024),
			log_max_files: Some(32),
		}
	}
}
