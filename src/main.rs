use std::path::Path;

use bigquery_loader::{do_main, error::LoadJobError, load_env_file, Cli, ENV_FILE};
use clap::Parser;
use log::warn;

#[tokio::main]
async fn main() -> Result<(), LoadJobError> {
    // Credentials and project settings may live in a local .env file
    let env_file = load_env_file(Path::new(ENV_FILE));
    let _ = rustls::crypto::ring::default_provider().install_default();
    env_logger::init();
    if let Err(e) = env_file {
        warn!("Could not load {}: {}", ENV_FILE, e);
    }
    let args = Cli::parse();
    do_main(args).await
}
