mod cli;
mod config;
mod db;
mod engine;
mod error;
mod importer;
mod ledger;
mod logging;
mod models;
mod operations;
mod prompt;
mod reconciler;
mod settings;
mod vendors;

use clap::Parser;

use cli::{Cli, Commands, VendorsCommands};

fn main() {
    logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Ingest {
            file,
            source,
            archive,
        } => cli::ingest::run(&file, &source, archive),
        Commands::Reconcile { timeout } => cli::reconcile::run(timeout),
        Commands::Status => cli::status::run(),
        Commands::Duplicates { column } => cli::duplicates::run(column),
        Commands::Export { set, output } => cli::export::run(&set, output),
        Commands::Vendors { command } => match command {
            VendorsCommands::List => cli::vendors::list(),
            VendorsCommands::Learn { vendor, category } => cli::vendors::learn(&vendor, &category),
            VendorsCommands::Categories => cli::vendors::categories(),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
