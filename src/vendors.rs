use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::info;

use crate::error::{LedgerlineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryGroup {
    Expense,
    Income,
    Other,
}

impl CategoryGroup {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Other => "other",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "expense" => Some(Self::Expense),
            "income" => Some(Self::Income),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Expense => 0,
            Self::Income => 1,
            Self::Other => 2,
        }
    }
}

/// The closed category list, presented expense first, then income, then other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Taxonomy {
    entries: Vec<(String, CategoryGroup)>,
}

impl Taxonomy {
    pub fn new(mut entries: Vec<(String, CategoryGroup)>) -> Self {
        // stable: keeps storage order within a group
        entries.sort_by_key(|(_, g)| g.rank());
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn group_of(&self, name: &str) -> Option<CategoryGroup> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, g)| *g)
    }

    pub fn entries(&self) -> &[(String, CategoryGroup)] {
        &self.entries
    }

    /// 1-based menu selection.
    pub fn by_position(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Learned vendor → category cache plus the taxonomy it is checked against.
#[derive(Debug, Clone, Default)]
pub struct VendorStore {
    known: BTreeMap<String, String>,
    taxonomy: Taxonomy,
}

impl VendorStore {
    pub fn new(known: BTreeMap<String, String>, taxonomy: Taxonomy) -> Self {
        Self { known, taxonomy }
    }

    pub fn lookup(&self, vendor: &str) -> Option<&str> {
        self.known.get(vendor).map(String::as_str)
    }

    /// Record a confirmed mapping. The category must be in the taxonomy.
    pub fn learn(&mut self, vendor: &str, category: &str) -> Result<()> {
        if !self.taxonomy.contains(category) {
            return Err(LedgerlineError::UnknownCategory(category.to_string()));
        }
        self.known.insert(vendor.to_string(), category.to_string());
        Ok(())
    }

    pub fn known(&self) -> &BTreeMap<String, String> {
        &self.known
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }
}

/// Durable home of the vendor cache. Single writer.
pub trait VendorBacking {
    fn load(&self) -> Result<VendorStore>;
    fn save(&self, known: &BTreeMap<String, String>) -> Result<()>;
}

pub struct SqliteVendors<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteVendors<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl VendorBacking for SqliteVendors<'_> {
    fn load(&self) -> Result<VendorStore> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, category_group FROM categories ORDER BY id")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(name, group)| CategoryGroup::from_key(&group).map(|g| (name, g)))
            .collect();

        let mut stmt = self.conn.prepare("SELECT vendor, category FROM known_vendors")?;
        let known = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        Ok(VendorStore::new(known, Taxonomy::new(entries)))
    }

    fn save(&self, known: &BTreeMap<String, String>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for (vendor, category) in known {
            tx.execute(
                "INSERT INTO known_vendors (vendor, category) VALUES (?1, ?2) \
                 ON CONFLICT(vendor) DO UPDATE SET category = excluded.category, learned_at = datetime('now') \
                 WHERE known_vendors.category <> excluded.category",
                rusqlite::params![vendor, category],
            )?;
        }
        tx.commit()?;
        info!(count = known.len(), "saved known vendors");
        Ok(())
    }
}

/// Learn one mapping and persist it right away.
pub fn learn_and_save(
    store: &mut VendorStore,
    backing: &dyn VendorBacking,
    vendor: &str,
    category: &str,
) -> Result<()> {
    store.learn(vendor, category)?;
    backing.save(store.known())
}
