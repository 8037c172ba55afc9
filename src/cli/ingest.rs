use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::init::ARCHIVE_DIR;
use crate::cli::open_ledger;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::importer::{archive_file, ingest_file};

pub fn run(file: &Path, source: &str, archive: bool) -> Result<()> {
    let (settings, conn) = open_ledger()?;
    let data_dir = settings.data_path();
    let config = PipelineConfig::load(&data_dir, source)?;

    let result = ingest_file(&conn, file, config, &settings.identity_column)?;
    if result.duplicate_file {
        println!("This file has already been ingested for '{source}' (duplicate checksum).");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Ledger", "Quarantine", "Cell errors"]);
    table.add_row(vec![
        Cell::new(result.completed),
        Cell::new(result.quarantined),
        Cell::new(result.cell_errors.len()),
    ]);
    println!("{table}");

    if !result.cell_errors.is_empty() {
        let mut errors = Table::new();
        errors.set_header(vec!["Row", "Column", "Problem"]);
        for e in &result.cell_errors {
            errors.add_row(vec![Cell::new(e.record + 1), Cell::new(&e.column), Cell::new(&e.reason)]);
        }
        println!("Cell errors\n{errors}");
    }

    if !result.duplicates.is_empty() {
        println!(
            "{} {} records share a '{}' value with another record in this file",
            "Warning:".yellow().bold(),
            result.duplicates.len(),
            settings.identity_column
        );
    }

    if result.quarantined > 0 {
        println!("Run `ledgerline reconcile` to resolve quarantined records.");
    }

    if archive {
        let target = archive_file(file, &data_dir.join(ARCHIVE_DIR))?;
        println!("Archived to {}", target.display());
    }
    Ok(())
}
