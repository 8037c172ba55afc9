pub mod duplicates;
pub mod export;
pub mod ingest;
pub mod init;
pub mod reconcile;
pub mod status;
pub mod vendors;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, DB_FILE};
use crate::error::{LedgerlineError, Result};
use crate::settings::{load_settings, Settings};

/// Settings plus an open connection to an initialized data directory.
pub(crate) fn open_ledger() -> Result<(Settings, Connection)> {
    let settings = load_settings();
    let db_path = settings.data_path().join(DB_FILE);
    if !db_path.exists() {
        return Err(LedgerlineError::Other(format!(
            "Database not found at {}. Run `ledgerline init` first.",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    Ok((settings, conn))
}

#[derive(Parser)]
#[command(
    name = "ledgerline",
    version,
    about = "Normalize bank exports into a clean ledger, quarantining what needs a human."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory, database and default configuration files.
    Init {
        /// Path for ledgerline data (default: ~/Documents/ledgerline)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Transform a CSV export and route its records to the ledger or quarantine.
    Ingest {
        /// Path to the CSV file
        file: PathBuf,
        /// Source id from sources.json, e.g. checking
        #[arg(long)]
        source: String,
        /// Move the file into <data_dir>/archive after a successful ingest
        #[arg(long)]
        archive: bool,
    },
    /// Interactively fill in quarantined records.
    Reconcile {
        /// Seconds to wait for each answer (default from settings)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show data directory and record counts.
    Status,
    /// List ledger records sharing an identity key.
    Duplicates {
        /// Column to compare (default from settings)
        #[arg(long)]
        column: Option<String>,
    },
    /// Write a record set to CSV.
    Export {
        /// Record set to export: ledger or quarantine
        #[arg(default_value = "ledger")]
        set: String,
        /// Output file path (default: <data_dir>/<set>.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Manage learned vendor categories.
    Vendors {
        #[command(subcommand)]
        command: VendorsCommands,
    },
}

#[derive(Subcommand)]
pub enum VendorsCommands {
    /// List learned vendor → category mappings.
    List,
    /// Teach a vendor's category.
    Learn {
        /// Vendor name as it appears after normalization
        vendor: String,
        /// Category name from the taxonomy
        #[arg(long)]
        category: String,
    },
    /// List the category taxonomy.
    Categories,
}
