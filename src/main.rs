mod cli;
mod config;
mod export;
mod game;
mod library;
mod query;
mod steam;
mod store;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
