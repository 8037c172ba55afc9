use std::path::Path;

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::engine::Transformer;
use crate::error::Result;
use crate::ledger::{find_duplicates, route, SqliteRecords};
use crate::models::{CellError, Record, RecordSet, Value};
use crate::vendors::{SqliteVendors, VendorBacking};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a headed CSV into a raw record set. Blank cells become missing, and
/// short rows are padded with missing cells.
pub fn read_csv(file_path: &Path) -> Result<RecordSet> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(std::io::BufReader::new(file));

    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut set = RecordSet::new(columns);
    for result in rdr.records() {
        let row = result?;
        if row.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let record = Record::from_pairs(set.columns.iter().enumerate().map(|(i, c)| {
            let value = row.get(i).map(Value::from_raw).unwrap_or(Value::Missing);
            (c.clone(), value)
        }));
        set.records.push(record);
    }
    Ok(set)
}

pub fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn already_ingested(conn: &Connection, checksum: &str, source_id: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM ingests WHERE checksum = ?1 AND source = ?2")?;
    Ok(stmt.exists(rusqlite::params![checksum, source_id])?)
}

// ---------------------------------------------------------------------------
// ingest_file
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct IngestResult {
    pub completed: usize,
    pub quarantined: usize,
    pub cell_errors: Vec<CellError>,
    /// Completed records sharing an identity key with another in this batch.
    pub duplicates: Vec<Record>,
    pub duplicate_file: bool,
}

/// Normalize, transform and route one source file. Configuration and batch
/// validation failures abort before anything is written.
pub fn ingest_file(
    conn: &Connection,
    file_path: &Path,
    config: PipelineConfig,
    identity_column: &str,
) -> Result<IngestResult> {
    let transformer = Transformer::new(config);
    let source_id = transformer.source_id().to_string();
    let checksum = compute_checksum(file_path)?;
    if already_ingested(conn, &checksum, &source_id)? {
        return Ok(IngestResult {
            completed: 0,
            quarantined: 0,
            cell_errors: Vec::new(),
            duplicates: Vec::new(),
            duplicate_file: true,
        });
    }

    info!(file = %file_path.display(), source = %source_id, "processing input file");
    let raw = read_csv(file_path)?;
    let record_count = raw.len();

    let vendors = SqliteVendors::new(conn).load()?;
    let transformed = transformer.transform(raw, &vendors)?;

    // Routed records and the checksum row commit together, so a failed
    // ingest can be re-run without appending the batch twice.
    let tx = conn.unchecked_transaction()?;
    let routed = route(transformed.records, &SqliteRecords::new(&tx))?;
    tx.execute(
        "INSERT INTO ingests (filename, source, record_count, completed, quarantined, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            file_path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
            source_id,
            record_count as i64,
            routed.completed.len() as i64,
            routed.quarantined as i64,
            checksum,
        ],
    )?;
    tx.commit()?;

    let duplicates: Vec<Record> = find_duplicates(&routed.completed, identity_column)
        .into_iter()
        .cloned()
        .collect();
    if !duplicates.is_empty() {
        warn!(count = duplicates.len(), file = %file_path.display(), "duplicate transactions in batch");
    }

    Ok(IngestResult {
        completed: routed.completed.len(),
        quarantined: routed.quarantined,
        cell_errors: transformed.errors,
        duplicates,
        duplicate_file: false,
    })
}

/// Move an ingested file into `archive_dir`.
pub fn archive_file(file_path: &Path, archive_dir: &Path) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(archive_dir)?;
    let name = file_path.file_name().unwrap_or_default();
    let target = archive_dir.join(name);
    std::fs::rename(file_path, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_rules, default_sources};
    use crate::db::test_db;
    use crate::error::LedgerlineError;
    use crate::ledger::{RecordBacking, LEDGER, QUARANTINE};
    use crate::vendors::learn_and_save;

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn checking() -> PipelineConfig {
        PipelineConfig::resolve("checking", &default_sources(), &default_rules()).unwrap()
    }

    const CHECKING_CSV: &str = "\
Date,Description,Amount,Type,Category,Running Bal.
01/15/2025,Acme Market,12.50,Debit,,100.00
01/16/2025,Corner Bistro,30.00,Debit,Restaurants,70.00
01/17/2025,Mystery Shop,4.00,Debit,,66.00
";

    #[test]
    fn test_read_csv_marks_blank_cells_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "in.csv", "A, B\n1,\n\n3\n");
        let set = read_csv(&path).unwrap();
        assert_eq!(set.columns, vec!["A", "B"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.records[0].get("B"), Some(&Value::Missing));
        assert_eq!(set.records[1].get("B"), Some(&Value::Missing));
    }

    #[test]
    fn test_ingest_routes_complete_and_incomplete() {
        let (dir, conn) = test_db();
        let backing = SqliteVendors::new(&conn);
        let mut store = backing.load().unwrap();
        learn_and_save(&mut store, &backing, "Acme Market", "Groceries").unwrap();

        let path = write_csv(dir.path(), "checking.csv", CHECKING_CSV);
        let result = ingest_file(&conn, &path, checking(), "id").unwrap();
        assert_eq!(result.completed, 2);
        assert_eq!(result.quarantined, 1);
        assert_eq!(result.cell_errors.len(), 1);
        assert_eq!(result.cell_errors[0].column, "category");

        let records = SqliteRecords::new(&conn);
        let quarantine = records.load(QUARANTINE).unwrap();
        assert_eq!(quarantine.len(), 1);
        assert_eq!(quarantine[0].text("vendor"), Some("Mystery Shop"));
        assert_eq!(quarantine[0].get("category"), Some(&Value::Missing));
        assert_eq!(records.load(LEDGER).unwrap().len(), 2);
    }

    #[test]
    fn test_ingest_same_file_twice_is_refused() {
        let (dir, conn) = test_db();
        let path = write_csv(dir.path(), "checking.csv", CHECKING_CSV);
        let first = ingest_file(&conn, &path, checking(), "id").unwrap();
        assert!(!first.duplicate_file);
        let second = ingest_file(&conn, &path, checking(), "id").unwrap();
        assert!(second.duplicate_file);
        let ingests: i64 = conn.query_row("SELECT count(*) FROM ingests", [], |r| r.get(0)).unwrap();
        assert_eq!(ingests, 1);
    }

    #[test]
    fn test_ingest_reports_duplicates_without_rejecting() {
        let (dir, conn) = test_db();
        let csv = "\
Date,Description,Amount,Type,Category
01/15/2025,Corner Bistro,30.00,Debit,Restaurants
01/15/2025,Corner Bistro,30.00,Debit,Restaurants
";
        let path = write_csv(dir.path(), "dups.csv", csv);
        let result = ingest_file(&conn, &path, checking(), "id").unwrap();
        assert_eq!(result.completed, 2);
        assert_eq!(result.duplicates.len(), 2);
    }

    #[test]
    fn test_batch_failure_writes_nothing() {
        let (dir, conn) = test_db();
        let mut rules = default_rules();
        rules.transformations.push(crate::config::Rule {
            column: "vendor_check".to_string(),
            operation: crate::config::OperationKind::ValidateUnique,
            params: Default::default(),
        });
        let mut sources = default_sources();
        sources
            .sources
            .get_mut("checking")
            .unwrap()
            .columns
            .insert("Ref".to_string(), "vendor_check".to_string());
        let config = PipelineConfig::resolve("checking", &sources, &rules).unwrap();

        let path = write_csv(
            dir.path(),
            "bad.csv",
            "Date,Description,Amount,Type,Category,Ref\n01/15/2025,A,1,Debit,Other,r1\n01/16/2025,B,2,Debit,Other,r1\n",
        );
        let err = ingest_file(&conn, &path, config, "id").unwrap_err();
        assert!(matches!(err, LedgerlineError::BatchValidation { .. }));
        assert_eq!(SqliteRecords::new(&conn).count(LEDGER).unwrap(), 0);
    }

    #[test]
    fn test_failed_ingest_record_rolls_back_routed_batch() {
        let (dir, conn) = test_db();
        let path = write_csv(dir.path(), "checking.csv", CHECKING_CSV);
        conn.execute_batch(
            "CREATE TRIGGER reject_ingest BEFORE INSERT ON ingests BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
        assert!(ingest_file(&conn, &path, checking(), "id").is_err());

        let records = SqliteRecords::new(&conn);
        assert_eq!(records.count(LEDGER).unwrap(), 0);
        assert_eq!(records.count(QUARANTINE).unwrap(), 0);

        conn.execute_batch("DROP TRIGGER reject_ingest;").unwrap();
        let result = ingest_file(&conn, &path, checking(), "id").unwrap();
        assert!(!result.duplicate_file);
        assert_eq!(records.count(LEDGER).unwrap(), result.completed);
        assert_eq!(records.count(QUARANTINE).unwrap(), result.quarantined);
    }

    #[test]
    fn test_archive_file_moves_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "in.csv", "A\n1\n");
        let target = archive_file(&path, &dir.path().join("archive")).unwrap();
        assert!(!path.exists());
        assert!(target.exists());
    }
}
