// CLI binary entry point for oxitag

mod cli;

use clap::Parser;
use cli::Config;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = Config::parse();

    // RUST_LOG wins over --verbose/--quiet
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = cli::run(&config) {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
}
