mod app;
mod crypto;
mod error;
mod filter;
mod generator;
mod logging;
mod models;
mod settings;
mod store;
mod ui;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::settings::Settings;
use crate::store::PassStore;

/// Terminal browser and editor for the standard Unix password store.
#[derive(Parser, Debug)]
#[command(name = "passview", version, about)]
struct Cli {
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    info!(version = env!("CARGO_PKG_VERSION"), "starting passview");

    let store = match PassStore::open_default() {
        Ok(store) => {
            info!(store = %store.root().display(), "using password store");
            store
        }
        Err(e) => {
            error!("{e}");
            eprintln!("passview: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = Settings::load();
    if let Err(e) = app::run(&store, settings) {
        error!("{e:#}");
        eprintln!("passview: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
