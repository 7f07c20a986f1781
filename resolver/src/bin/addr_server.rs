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


//! Standalone address resolution process

use clap::Parser;
use mudwire_resolver::{AddressServer, ResolverConfig, SystemLookup};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Address resolver for the mudwire driver", long_about = None)]
struct Args {
    /// Port to listen on for driver connections
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Number of driver connection slots
    #[arg(long, default_value_t = 8)]
    max_connections: usize,

    /// Events handled per pass before polling again
    #[arg(long, default_value_t = 10)]
    max_events: usize,

    /// Lookups allowed to run at once
    #[arg(long, default_value_t = 16)]
    max_lookups: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ResolverConfig::new(SocketAddr::new(args.host, args.port))
        .with_max_connections(args.max_connections)
        .with_max_events_per_pass(args.max_events)
        .with_max_lookups_in_flight(args.max_lookups);

    let mut server = AddressServer::bind(config, Arc::new(SystemLookup)).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.notify_one();
        }
    });

    server.run().await?;
    Ok(())
}
