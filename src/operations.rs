use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::config::{OperationKind, Rule, SourceConfig};
use crate::models::{Record, Value};
use crate::vendors::VendorStore;

pub const VENDOR_COLUMN: &str = "vendor";
pub const CATEGORY_COLUMN: &str = "category";

/// What a per-cell operation may read besides its own cell.
pub struct CellContext<'a> {
    pub record: &'a Record,
    pub vendors: &'a VendorStore,
}

pub type CellResult = std::result::Result<Value, String>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lenient numeric parse: strips `$`, thousands separators and quotes, and
/// reads `(12.50)` as negative.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| -v);
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepted input date patterns, in priority order. Each pattern only applies
/// to strings of its shape, so `01/02/23` never reads as year 23.
const DATE_PATTERNS: &[(&str, &str)] = &[
    (r"^\d{4}-\d{1,2}-\d{1,2}$", "%Y-%m-%d"),
    (r"^\d{1,2}/\d{1,2}/\d{4}$", "%m/%d/%Y"),
    (r"^\d{1,2}/\d{1,2}/\d{2}$", "%m/%d/%y"),
    (r"^\d{1,2}-\d{1,2}-\d{4}$", "%d-%m-%Y"),
    (r"^\d{4}\.\d{1,2}\.\d{1,2}$", "%Y.%m.%d"),
];

fn date_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DATE_PATTERNS
            .iter()
            .filter_map(|(shape, fmt)| Regex::new(shape).ok().map(|re| (re, *fmt)))
            .collect()
    })
}

/// First accepted pattern that both fits the shape and yields a real date.
pub fn parse_date(raw: &str) -> Option<(chrono::NaiveDate, &'static str)> {
    let raw = raw.trim();
    date_patterns().iter().find_map(|(shape, fmt)| {
        if !shape.is_match(raw) {
            return None;
        }
        chrono::NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .map(|d| (d, *fmt))
    })
}

const HASH_FIELD_SEPARATOR: u8 = 0x1f;

/// SHA-256 over the given columns' values, in the given order. Values are
/// separated and tagged so a missing cell differs from empty text.
pub fn hash_row(record: &Record, columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            hasher.update([HASH_FIELD_SEPARATOR]);
        }
        match record.text(column) {
            Some(text) => {
                hasher.update(b"t");
                hasher.update(text.as_bytes());
            }
            None => hasher.update(b"m"),
        }
    }
    hex::encode(hasher.finalize())
}

pub fn truncate_chars(value: &str, max_length: usize) -> String {
    value.chars().take(max_length).collect()
}

// ---------------------------------------------------------------------------
// Cell operations: enum dispatch, overrides wrap a base operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CellOp {
    Truncate,
    ValidateValue,
    FormatCurrency,
    FormatDate,
    AssignCategory,
    /// Replace known values, then delegate.
    RemapValue {
        mapping: BTreeMap<String, String>,
        inner: Box<CellOp>,
    },
    /// Negate negative numbers, then delegate.
    ForcePositive { inner: Box<CellOp> },
    /// Replace the record's asserted category, then delegate.
    RemapCategory {
        mapping: BTreeMap<String, String>,
        inner: Box<CellOp>,
    },
}

impl CellOp {
    pub fn apply(&self, value: &Value, rule: &Rule, ctx: &CellContext) -> CellResult {
        match self {
            Self::Truncate => Ok(truncate(value, rule.params.max_length.unwrap_or(usize::MAX))),
            Self::ValidateValue => validate_value(
                value,
                rule.params.allowed_values.as_deref().unwrap_or(&[]),
                rule.params.required,
            ),
            Self::FormatCurrency => format_currency(value, rule.min_value(), rule.params.required),
            Self::FormatDate => format_date(value, rule.date_format(), rule.params.required),
            Self::AssignCategory => {
                let vendor = ctx.record.text(VENDOR_COLUMN);
                assign_category(vendor, value.as_text(), ctx.vendors)
            }
            Self::RemapValue { mapping, inner } => {
                let remapped = match value.as_text().and_then(|v| mapping.get(v.trim())) {
                    Some(mapped) => Value::text(mapped.clone()),
                    None => value.clone(),
                };
                inner.apply(&remapped, rule, ctx)
            }
            Self::ForcePositive { inner } => {
                let positive = match value.as_text().and_then(parse_amount) {
                    Some(n) if n < 0.0 => Value::text((-n).to_string()),
                    _ => value.clone(),
                };
                inner.apply(&positive, rule, ctx)
            }
            Self::RemapCategory { mapping, inner } => {
                let remapped = match value.as_text().and_then(|v| mapping.get(v.trim())) {
                    Some(mapped) => Value::text(mapped.clone()),
                    None => value.clone(),
                };
                inner.apply(&remapped, rule, ctx)
            }
        }
    }
}

fn truncate(value: &Value, max_length: usize) -> Value {
    match value {
        Value::Text(s) => Value::Text(truncate_chars(s, max_length)),
        other => other.clone(),
    }
}

/// Missing input: an error when required, otherwise passed through.
fn missing(value: &Value, required: bool, what: &str) -> CellResult {
    if required {
        Err(format!("missing required {what}"))
    } else {
        Ok(value.clone())
    }
}

fn validate_value(value: &Value, allowed: &[String], required: bool) -> CellResult {
    let Some(text) = value.as_text() else {
        return missing(value, required, "value");
    };
    let text = text.trim();
    if allowed.iter().any(|a| a == text) {
        Ok(Value::text(text))
    } else {
        Err(format!(
            "invalid value '{text}', allowed values are: {}",
            allowed.join(", ")
        ))
    }
}

fn format_currency(value: &Value, min_value: f64, required: bool) -> CellResult {
    let Some(text) = value.as_text() else {
        return missing(value, required, "currency value");
    };
    let amount =
        parse_amount(text).ok_or_else(|| format!("'{}' is not a numeric amount", text.trim()))?;
    if !amount.is_finite() {
        return Err(format!("'{}' is not a numeric amount", text.trim()));
    }
    if amount < min_value {
        return Err(format!(
            "currency value {amount} is below the minimum allowed: {min_value}"
        ));
    }
    Ok(Value::Text(format!("{amount:.2}")))
}

fn format_date(value: &Value, target: &str, required: bool) -> CellResult {
    let Some(text) = value.as_text() else {
        return missing(value, required, "date value");
    };
    match parse_date(text) {
        Some((date, _)) => Ok(Value::Text(date.format(target).to_string())),
        None => Err(format!("invalid date format for '{}'", text.trim())),
    }
}

/// A learned vendor mapping wins over the asserted category.
fn assign_category(vendor: Option<&str>, asserted: Option<&str>, store: &VendorStore) -> CellResult {
    if let Some(known) = vendor.and_then(|v| store.lookup(v)) {
        return Ok(Value::text(known));
    }
    if let Some(category) = asserted.filter(|c| store.taxonomy().contains(c)) {
        return Ok(Value::text(category));
    }
    Err(format!(
        "unknown vendor '{}' and no valid category '{}'",
        vendor.unwrap_or(""),
        asserted.unwrap_or("")
    ))
}

// ---------------------------------------------------------------------------
// Operation table
// ---------------------------------------------------------------------------

/// Per-source dispatch table: shared defaults with source overrides composed
/// on top, resolved once when the pipeline is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationTable {
    truncate: CellOp,
    validate_value: CellOp,
    format_currency: CellOp,
    format_date: CellOp,
    assign_category: CellOp,
}

impl Default for OperationTable {
    fn default() -> Self {
        Self {
            truncate: CellOp::Truncate,
            validate_value: CellOp::ValidateValue,
            format_currency: CellOp::FormatCurrency,
            format_date: CellOp::FormatDate,
            assign_category: CellOp::AssignCategory,
        }
    }
}

impl OperationTable {
    pub fn for_source(source: &SourceConfig) -> Self {
        let mut table = Self::default();
        if !source.value_map.is_empty() {
            table.validate_value = CellOp::RemapValue {
                mapping: source.value_map.clone(),
                inner: Box::new(table.validate_value),
            };
        }
        if source.force_positive_amounts {
            table.format_currency = CellOp::ForcePositive {
                inner: Box::new(table.format_currency),
            };
        }
        if !source.category_map.is_empty() {
            table.assign_category = CellOp::RemapCategory {
                mapping: source.category_map.clone(),
                inner: Box::new(table.assign_category),
            };
        }
        table
    }

    /// The per-cell operation for `kind`, or `None` for whole-batch and
    /// synthesizing operations.
    pub fn cell_op(&self, kind: OperationKind) -> Option<&CellOp> {
        match kind {
            OperationKind::Truncate => Some(&self.truncate),
            OperationKind::ValidateValue => Some(&self.validate_value),
            OperationKind::FormatCurrency => Some(&self.format_currency),
            OperationKind::FormatDate => Some(&self.format_date),
            OperationKind::AssignCategory => Some(&self.assign_category),
            OperationKind::ValidateUnique | OperationKind::HashRow | OperationKind::AddSource => {
                None
            }
        }
    }
}
