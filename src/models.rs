use serde::{Deserialize, Serialize};

/// A single cell. `Missing` and `Invalid` both mark the cell as unresolved;
/// persisted sets store either as `null`, so a reloaded record only ever
/// carries `Missing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Value {
    Text(String),
    Missing,
    Invalid,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Raw CSV cells: empty or whitespace-only means missing.
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self::Missing
        } else {
            Self::Text(raw.to_string())
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Missing | Self::Invalid => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) => Self::Text(s),
            None => Self::Missing,
        }
    }
}

impl From<Value> for Option<String> {
    fn from(v: Value) -> Self {
        match v {
            Value::Text(s) => Some(s),
            Value::Missing | Value::Invalid => None,
        }
    }
}

/// Ordered column → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut record = Self::new();
        for (k, v) in pairs {
            record.set(k, v);
        }
        record
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    pub fn has(&self, column: &str) -> bool {
        self.fields.iter().any(|(c, _)| c == column)
    }

    /// Replace the value in place, or append the column if it is new.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some((_, v)) => *v = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn unresolved_columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_unresolved())
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(|(_, v)| !v.is_unresolved())
    }
}

/// A batch of records sharing one column set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    /// Build a set from persisted records, taking the union of their columns
    /// in first-seen order.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for c in record.columns() {
                if !columns.iter().any(|existing| existing == c) {
                    columns.push(c.to_string());
                }
            }
        }
        Self { columns, records }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Add a column to every record using `fill(index, record)`.
    pub fn add_column<F>(&mut self, column: &str, mut fill: F)
    where
        F: FnMut(usize, &Record) -> Value,
    {
        for (i, record) in self.records.iter_mut().enumerate() {
            let value = fill(i, record);
            record.set(column, value);
        }
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// A recoverable per-cell failure. Collected, never propagated.
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub record: usize,
    pub column: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_raw_treats_blank_as_missing() {
        assert_eq!(Value::from_raw(""), Value::Missing);
        assert_eq!(Value::from_raw("   "), Value::Missing);
        assert_eq!(Value::from_raw("Acme"), Value::text("Acme"));
    }

    #[test]
    fn test_record_set_preserves_column_order() {
        let mut r = Record::new();
        r.set("date", Value::text("2025-01-15"));
        r.set("amount", Value::text("10.00"));
        r.set("date", Value::text("2025-01-16"));
        let cols: Vec<&str> = r.columns().collect();
        assert_eq!(cols, vec!["date", "amount"]);
        assert_eq!(r.text("date"), Some("2025-01-16"));
    }

    #[test]
    fn test_unresolved_columns() {
        let r = Record::from_pairs([
            ("vendor", Value::text("Acme")),
            ("category", Value::Missing),
            ("amount", Value::Invalid),
        ]);
        assert!(!r.is_complete());
        assert_eq!(r.unresolved_columns(), vec!["category", "amount"]);
    }

    #[test]
    fn test_persisted_form_collapses_markers_to_null() {
        let r = Record::from_pairs([("a", Value::text("x")), ("b", Value::Invalid)]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"[["a","x"],["b",null]]"#);
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("b"), Some(&Value::Missing));
    }

    #[test]
    fn test_from_records_unions_columns() {
        let a = Record::from_pairs([("x", Value::text("1"))]);
        let b = Record::from_pairs([("x", Value::text("2")), ("y", Value::Missing)]);
        let set = RecordSet::from_records(vec![a, b]);
        assert_eq!(set.columns, vec!["x", "y"]);
    }
}
