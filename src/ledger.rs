use std::collections::HashMap;

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;
use crate::models::{Record, RecordSet};

pub const QUARANTINE: &str = "quarantine";
pub const LEDGER: &str = "ledger";

/// Persisted record sets (quarantine queue, ledger). Single writer.
pub trait RecordBacking {
    fn load(&self, set_name: &str) -> Result<Vec<Record>>;
    fn replace(&self, set_name: &str, records: &[Record]) -> Result<()>;
    fn append(&self, set_name: &str, records: &[Record]) -> Result<()>;
}

pub struct SqliteRecords<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecords<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn count(&self, set_name: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM record_sets WHERE set_name = ?1",
            [set_name],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    /// Run `f` in its own transaction, or inside the caller's when one is open.
    fn write<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        if !self.conn.is_autocommit() {
            return f(self.conn);
        }
        let tx = self.conn.unchecked_transaction()?;
        f(&*tx)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_all(&self, conn: &Connection, set_name: &str, records: &[Record]) -> Result<()> {
        let mut stmt =
            conn.prepare_cached("INSERT INTO record_sets (set_name, record) VALUES (?1, ?2)")?;
        for record in records {
            let json = serde_json::to_string(record)?;
            stmt.execute(rusqlite::params![set_name, json])?;
        }
        Ok(())
    }
}

impl RecordBacking for SqliteRecords<'_> {
    fn load(&self, set_name: &str) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM record_sets WHERE set_name = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map([set_name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(rows.len());
        for json in rows {
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }

    fn replace(&self, set_name: &str, records: &[Record]) -> Result<()> {
        self.write(|conn| {
            conn.execute("DELETE FROM record_sets WHERE set_name = ?1", [set_name])?;
            self.insert_all(conn, set_name, records)
        })
    }

    fn append(&self, set_name: &str, records: &[Record]) -> Result<()> {
        self.write(|conn| self.insert_all(conn, set_name, records))
    }
}

/// Split into (complete, incomplete). Exhaustive and disjoint.
pub fn partition(set: RecordSet) -> (Vec<Record>, Vec<Record>) {
    set.records.into_iter().partition(Record::is_complete)
}

pub struct RouteResult {
    pub completed: Vec<Record>,
    pub quarantined: usize,
}

/// Append complete records to the ledger and the rest to quarantine.
pub fn route(set: RecordSet, backing: &dyn RecordBacking) -> Result<RouteResult> {
    let (completed, incomplete) = partition(set);
    if !incomplete.is_empty() {
        info!(count = incomplete.len(), "saving records to quarantine");
        backing.append(QUARANTINE, &incomplete)?;
    }
    if !completed.is_empty() {
        info!(count = completed.len(), "saving records to ledger");
        backing.append(LEDGER, &completed)?;
    }
    Ok(RouteResult {
        completed,
        quarantined: incomplete.len(),
    })
}

/// Every record whose `column` value is shared with another record, in input
/// order. Records without a value are ignored. Reporting only.
pub fn find_duplicates<'a>(records: &'a [Record], column: &str) -> Vec<&'a Record> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        if let Some(key) = record.text(column) {
            *counts.entry(key).or_default() += 1;
        }
    }
    records
        .iter()
        .filter(|r| r.text(column).is_some_and(|k| counts.get(k).copied().unwrap_or(0) > 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::models::Value;

    fn rec(id: &str, category: Value) -> Record {
        Record::from_pairs([("id", Value::text(id)), ("category", category)])
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        let set = RecordSet::from_records(vec![
            rec("a", Value::text("Groceries")),
            rec("b", Value::Missing),
            rec("c", Value::Invalid),
            rec("d", Value::text("Travel")),
        ]);
        let (complete, incomplete) = partition(set);
        assert_eq!(complete.len() + incomplete.len(), 4);
        assert!(complete.iter().all(Record::is_complete));
        assert!(incomplete.iter().all(|r| !r.is_complete()));
    }

    #[test]
    fn test_route_appends_to_both_sets() {
        let (_dir, conn) = test_db();
        let backing = SqliteRecords::new(&conn);
        backing.append(LEDGER, &[rec("old", Value::text("Travel"))]).unwrap();

        let set = RecordSet::from_records(vec![rec("a", Value::text("Groceries")), rec("b", Value::Missing)]);
        let result = route(set, &backing).unwrap();
        assert_eq!(result.completed.len(), 1);
        assert_eq!(result.quarantined, 1);
        assert_eq!(backing.count(LEDGER).unwrap(), 2);
        assert_eq!(backing.count(QUARANTINE).unwrap(), 1);

        let ledger = backing.load(LEDGER).unwrap();
        assert_eq!(ledger[0].text("id"), Some("old"));
        assert_eq!(ledger[1].text("id"), Some("a"));
    }

    #[test]
    fn test_replace_overwrites_only_named_set() {
        let (_dir, conn) = test_db();
        let backing = SqliteRecords::new(&conn);
        backing.append(QUARANTINE, &[rec("a", Value::Missing), rec("b", Value::Missing)]).unwrap();
        backing.append(LEDGER, &[rec("z", Value::text("Travel"))]).unwrap();

        backing.replace(QUARANTINE, &[rec("b", Value::Missing)]).unwrap();
        let q = backing.load(QUARANTINE).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].text("id"), Some("b"));
        assert_eq!(q[0].get("category"), Some(&Value::Missing));
        assert_eq!(backing.count(LEDGER).unwrap(), 1);
    }

    #[test]
    fn test_writes_join_an_open_transaction() {
        let (_dir, conn) = test_db();
        {
            let tx = conn.unchecked_transaction().unwrap();
            let backing = SqliteRecords::new(&tx);
            backing.append(LEDGER, &[rec("a", Value::text("Travel"))]).unwrap();
            backing.replace(QUARANTINE, &[rec("b", Value::Missing)]).unwrap();
            // dropped without commit
        }
        let backing = SqliteRecords::new(&conn);
        assert_eq!(backing.count(LEDGER).unwrap(), 0);
        assert_eq!(backing.count(QUARANTINE).unwrap(), 0);
    }

    #[test]
    fn test_find_duplicates_returns_whole_groups() {
        let records = vec![
            rec("a", Value::text("x")),
            rec("b", Value::text("x")),
            rec("a", Value::text("y")),
            Record::from_pairs([("id", Value::Missing)]),
            Record::from_pairs([("id", Value::Missing)]),
        ];
        let dups = find_duplicates(&records, "id");
        assert_eq!(dups.len(), 2);
        assert!(dups.iter().all(|r| r.text("id") == Some("a")));
    }
}
