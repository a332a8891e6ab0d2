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

//! Binary entry point: loads config, opens chain state and runs the p2p
//! server until interrupted.

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use clap::{App, Arg};
use log::{error, info};

use mw_chain::ChainState;
use mw_config::GlobalConfig;
use mw_core::core::hash::Hashed;
use mw_p2p::{Capabilities, P2PServer};

/// Fatal configuration or storage error during startup.
const EXIT_INIT_ERROR: i32 = 1;

fn main() {
	let matches = App::new("mwnode")
		.about("A MimbleWimble-style chain node")
		.arg(
			Arg::with_name("config")
				.long("config")
				.value_name("PATH")
				.help("Path to a TOML config file; defaults built in if omitted")
				.takes_value(true),
		)
		.get_matches();

	let config = match matches.value_of("config") {
		Some(path) => GlobalConfig::load(path).unwrap_or_else(|e| {
			eprintln!("failed to load config at {}: {}", path, e);
			process::exit(EXIT_INIT_ERROR);
		}),
		None => GlobalConfig::default(),
	};

	mw_util::init_logger(&config.logging);

	if let Err(code) = run(config) {
		process::exit(code);
	}
}

fn run(config: GlobalConfig) -> Result<(), i32> {
	let genesis = mw_core::genesis();
	info!("genesis hash: {}", genesis.header.hash());

	let db_root = config.data_path.join("chain_data");
	let chain = ChainState::new(&db_root, &genesis).map_err(|e| {
		error!("failed to open chain state at {:?}: {}", db_root, e);
		EXIT_INIT_ERROR
	})?;
	let chain = Arc::new(chain);

	let server = P2PServer::new(chain, genesis.header.hash(), Capabilities::FULL_NODE);

	let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.p2p.port)
		.parse()
		.expect("port from config always parses as a valid socket address");

	for seed in &config.p2p.seeds {
		match seed.parse::<SocketAddr>() {
			Ok(addr) => {
				let server = server.clone();
				std::thread::spawn(move || {
					if let Err(e) = server.connect(addr) {
						info!("p2p: failed to dial seed {}: {}", addr, e);
					}
				});
			}
			Err(e) => error!("p2p: invalid seed address {}: {}", seed, e),
		}
	}

	// `P2PServer::listen` blocks forever in its accept loop; there is no
	// in-process way to unblock it short of a self-connect, so a Ctrl-C
	// just logs and exits rather than attempting a graceful drain.
	ctrlc::set_handler(move || {
		info!("shutting down on interrupt");
		process::exit(0);
	})
	.expect("failed to install signal handler");

	info!("mwnode listening on {}", bind_addr);
	server.listen(bind_addr).map_err(|e| {
		error!("p2p server failed: {}", e);
		EXIT_INIT_ERROR
	})
}
