use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const DB_FILE: &str = "ledgerline.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category_group TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS known_vendors (
    vendor TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    learned_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category) REFERENCES categories(name)
);

CREATE TABLE IF NOT EXISTS record_sets (
    id INTEGER PRIMARY KEY,
    set_name TEXT NOT NULL,
    record TEXT NOT NULL,
    added_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_record_sets_name ON record_sets(set_name);

CREATE TABLE IF NOT EXISTS ingests (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    source TEXT NOT NULL,
    ingest_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    completed INTEGER,
    quarantined INTEGER,
    checksum TEXT
);
";

// (name, group, description)
const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    // Expense
    ("Groceries", "expense", "Supermarkets, food stores"),
    ("Restaurants", "expense", "Dining out, takeaway, coffee"),
    ("Housing", "expense", "Rent, mortgage, repairs"),
    ("Utilities", "expense", "Power, water, internet, phone"),
    ("Transportation", "expense", "Fuel, transit, parking, rideshare"),
    ("Health", "expense", "Pharmacy, doctors, insurance premiums"),
    ("Entertainment", "expense", "Streaming, events, hobbies"),
    ("Subscriptions", "expense", "Software and recurring services"),
    ("Travel", "expense", "Flights, hotels"),
    ("Fees", "expense", "Bank charges, interest paid"),
    // Income
    ("Salary", "income", "Payroll deposits"),
    ("Interest", "income", "Bank interest, dividends"),
    ("Refunds", "income", "Returns and reimbursements"),
    // Other
    ("Transfer", "other", "Moves between own accounts"),
    ("Other", "other", "Anything else"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for cat in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (name, category_group, description) VALUES (?1, ?2, ?3)",
                rusqlite::params![cat.0, cat.1, cat.2],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}
