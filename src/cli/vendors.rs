use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::error::Result;
use crate::reconciler::category_menu;
use crate::vendors::{learn_and_save, SqliteVendors, VendorBacking};

pub fn list() -> Result<()> {
    let (_, conn) = open_ledger()?;
    let store = SqliteVendors::new(&conn).load()?;
    if store.known().is_empty() {
        println!("No vendors learned yet.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Vendor", "Category"]);
    for (vendor, category) in store.known() {
        table.add_row(vec![Cell::new(vendor), Cell::new(category)]);
    }
    println!("Vendors\n{table}");
    Ok(())
}

pub fn learn(vendor: &str, category: &str) -> Result<()> {
    let (_, conn) = open_ledger()?;
    let backing = SqliteVendors::new(&conn);
    let mut store = backing.load()?;
    learn_and_save(&mut store, &backing, vendor, category)?;
    let group = store.taxonomy().group_of(category).map(|g| g.key()).unwrap_or_default();
    println!("Learned: {vendor} \u{2192} {category} ({group})");
    Ok(())
}

pub fn categories() -> Result<()> {
    let (_, conn) = open_ledger()?;
    let store = SqliteVendors::new(&conn).load()?;
    println!("{}", category_menu(store.taxonomy()));
    Ok(())
}
