use clap::Parser;
use nerfeed_trainer::{Cli, run};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("nerfeed failed: {e:#}");
        std::process::exit(1);
    }
}
