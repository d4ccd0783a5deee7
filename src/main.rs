mod api;
mod breeds;
mod cli;
mod config;
mod logging;
mod model;
mod server;
mod storage;

use std::process;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
