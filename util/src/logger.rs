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

//! Logging wrapper, initialized once at process start and used throughout
//! every crate in the workspace via the plain `log` macros.

use std::panic;
use std::path::Path;

use backtrace::Backtrace;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::types::{LogLevel, LoggingConfig};
use crate::Mutex;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";

lazy_static! {
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
}

fn convert_level(level: LogLevel) -> LevelFilter {
	match level {
		LogLevel::Error => LevelFilter::Error,
		LogLevel::Warning => LevelFilter::Warn,
		LogLevel::Info => LevelFilter::Info,
		LogLevel::Debug => LevelFilter::Debug,
		LogLevel::Trace => LevelFilter::Trace,
	}
}

/// Initializes the global logger from the provided configuration. Safe to
/// call more than once; only the first call takes effect.
pub fn init_logger(config: &LoggingConfig) {
	let mut was_init = WAS_INIT.lock();
	if *was_init {
		return;
	}
	*was_init = true;

	let mut root_builder = Root::builder();
	let mut config_builder = Config::builder();
	let mut max_level = LevelFilter::Off;

	if config.log_to_stdout {
		let stdout = ConsoleAppender::builder()
			.encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
			.build();
		config_builder = config_builder.appender(Appender::builder().build("stdout", Box::new(stdout)));
		root_builder = root_builder.appender("stdout");
		max_level = max_level.max(convert_level(config.stdout_log_level));
	}

	if config.log_to_file {
		let path = Path::new(&config.log_file_path);
		if !config.log_file_append {
			let _ = std::fs::remove_file(path);
		}
		let size_trigger = SizeTrigger::new(config.log_max_size.unwrap_or(16 * 1024 * 1024));
		let roller_pattern = format!("{}.{{}}.gz", config.log_file_path);
		if let Ok(roller) = FixedWindowRoller::builder()
			.build(&roller_pattern, config.log_max_files.unwrap_or(32))
		{
			let policy = CompoundPolicy::new(Box::new(size_trigger), Box::new(roller));
			if let Ok(file) = RollingFileAppender::builder()
				.encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
				.build(path, Box::new(policy))
			{
				config_builder =
					config_builder.appender(Appender::builder().build("logfile", Box::new(file)));
				root_builder = root_builder.appender("logfile");
				max_level = max_level.max(convert_level(config.file_log_level));
			}
		}
	}

	let log_config = config_builder
		.build(root_builder.build(max_level))
		.expect("failed to build log4rs config");
	let _ = log4rs::init_config(log_config);

	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();
		log::error!("thread panicked: {}\n{:?}", info, backtrace);
	}));
}

/// Minimal stdout-only logger for unit tests, never panics if called more
/// than once.
pub fn init_test_logger() {
	let config = LoggingConfig {
		log_to_file: false,
		..LoggingConfig::default()
	};
	init_logger(&config);
}
