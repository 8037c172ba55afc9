use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::error::Result;
use crate::ledger::{find_duplicates, RecordBacking, SqliteRecords, LEDGER};
use crate::operations::VENDOR_COLUMN;

pub fn run(column: Option<String>) -> Result<()> {
    let (settings, conn) = open_ledger()?;
    let column = column.unwrap_or(settings.identity_column);
    let ledger = SqliteRecords::new(&conn).load(LEDGER)?;
    let dups = find_duplicates(&ledger, &column);

    if dups.is_empty() {
        println!("No duplicate '{column}' values in the ledger.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![column.as_str(), "Date", "Vendor", "Amount"]);
    for record in dups {
        table.add_row(vec![
            Cell::new(record.text(&column).unwrap_or_default()),
            Cell::new(record.text("date").unwrap_or_default()),
            Cell::new(record.text(VENDOR_COLUMN).unwrap_or_default()),
            Cell::new(record.text("amount").unwrap_or_default()),
        ]);
    }
    println!("Duplicates\n{table}");
    Ok(())
}
