//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! mudwire driver: the connection layer with an echoing stand-in game

use clap::Parser;
use mudwire_server::EchoHandler;
use mudwire_service::{PortConfig, ServerConfig, TelnetServer};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "MUD driver network front end", long_about = None)]
struct Args {
    /// Telnet port
    #[arg(default_value_t = 4000)]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Extra line-oriented ports
    #[arg(long = "ascii")]
    ascii_ports: Vec<u16>,

    /// Extra binary ports
    #[arg(long = "binary")]
    binary_ports: Vec<u16>,

    /// Size of the connection registry
    #[arg(long, default_value_t = 64)]
    max_connections: usize,

    /// Longest wait for activity, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Address server to send name lookups to
    #[arg(long)]
    address_server: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(SocketAddr::new(self.host, self.port))
            .with_max_connections(self.max_connections)
            .with_poll_timeout(Duration::from_millis(self.poll_ms));
        for &port in &self.ascii_ports {
            config = config.with_port(PortConfig::ascii(SocketAddr::new(self.host, port)));
        }
        for &port in &self.binary_ports {
            config = config.with_port(PortConfig::binary(SocketAddr::new(self.host, port)));
        }
        if let Some(address) = self.address_server {
            config = config.with_address_server(address);
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut server = TelnetServer::bind(args.config(), EchoHandler::new()).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.notify_one();
        }
    });

    server.run().await?;
    info!("{}", server.snapshot());
    Ok(())
}
