use std::path::{Path, PathBuf};

use crate::cli::open_ledger;
use crate::error::{LedgerlineError, Result};
use crate::ledger::{RecordBacking, SqliteRecords, LEDGER, QUARANTINE};
use crate::models::{Record, RecordSet};

pub fn run(set: &str, output: Option<PathBuf>) -> Result<()> {
    if set != LEDGER && set != QUARANTINE {
        return Err(LedgerlineError::Other(format!(
            "Unknown record set '{set}'. Use '{LEDGER}' or '{QUARANTINE}'."
        )));
    }
    let (settings, conn) = open_ledger()?;
    let records = SqliteRecords::new(&conn).load(set)?;
    let path = output.unwrap_or_else(|| settings.data_path().join(format!("{set}.csv")));
    let written = write_csv(&path, records)?;
    println!("Exported {written} {set} records to {}", path.display());
    Ok(())
}

/// Header is the union of columns in first-seen order. Unresolved cells are empty.
pub fn write_csv(path: &Path, records: Vec<Record>) -> Result<usize> {
    let set = RecordSet::from_records(records);
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&set.columns)?;
    for record in &set.records {
        wtr.write_record(
            set.columns
                .iter()
                .map(|c| record.text(c).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(set.len())
}
