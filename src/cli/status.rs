use crate::cli::open_ledger;
use crate::db::DB_FILE;
use crate::error::Result;
use crate::ledger::{SqliteRecords, LEDGER, QUARANTINE};
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = settings.data_path();
    let db_path = data_dir.join(DB_FILE);

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `ledgerline init` to set up.");
        return Ok(());
    }

    let (_, conn) = open_ledger()?;
    let records = SqliteRecords::new(&conn);
    let vendors: i64 = conn.query_row("SELECT count(*) FROM known_vendors", [], |r| r.get(0))?;
    let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;
    let ingests: i64 = conn.query_row("SELECT count(*) FROM ingests", [], |r| r.get(0))?;

    println!();
    println!("Ledger:      {}", records.count(LEDGER)?);
    println!("Quarantine:  {}", records.count(QUARANTINE)?);
    println!("Vendors:     {vendors}");
    println!("Categories:  {categories}");
    println!("Ingests:     {ingests}");
    Ok(())
}
