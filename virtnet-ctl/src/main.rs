//! # virtnetctl
//!
//! ## Usage
//! ```bash
//! virtnetctl state --uid 1b2c... default blue
//! virtnetctl reset --uid 1b2c... blue
//! virtnetctl status --vmi vmi.json --domain domain.json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use virtnet_core::CacheFactory;
use virtnet_ctl::{commands, Args, Command, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::resolve(args.config.as_deref())?.with_cli_overrides(&args);

    virtnet_common::init(&config.logging.level, config.logging.format())?;

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        cache_dir = %config.cache.base_dir.display(),
        "virtnetctl configured"
    );

    let cache = CacheFactory::new(config.cache.base_dir.clone());

    if let Err(e) = run(&cache, args.command) {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

fn run(cache: &CacheFactory, command: Command) -> Result<()> {
    match command {
        Command::State { uid, networks } => {
            for (network, state) in commands::network_states(cache, &uid, &networks)? {
                println!("{}\t{}", network, state);
            }
        }
        Command::Reset { uid, network } => {
            let previous = commands::reset_network(cache, &uid, &network)?;
            println!("{}\t{} -> pending", network, previous);
        }
        Command::Status { vmi, domain } => {
            let interfaces = commands::reconcile_status(cache, &vmi, domain.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&interfaces)?);
        }
        Command::Teardown { uid } => {
            commands::teardown(cache, &uid)?;
        }
    }
    Ok(())
}
