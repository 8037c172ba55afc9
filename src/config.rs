use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerlineError, Result};

pub const RULES_FILE: &str = "rules.json";
pub const SOURCES_FILE: &str = "sources.json";

// ---------------------------------------------------------------------------
// Rule specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Truncate,
    ValidateUnique,
    ValidateValue,
    FormatCurrency,
    FormatDate,
    AssignCategory,
    HashRow,
    AddSource,
}

impl OperationKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Truncate => "truncate",
            Self::ValidateUnique => "validate_unique",
            Self::ValidateValue => "validate_value",
            Self::FormatCurrency => "format_currency",
            Self::FormatDate => "format_date",
            Self::AssignCategory => "assign_category",
            Self::HashRow => "hash_row",
            Self::AddSource => "add_source",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Target date pattern for `format_date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Column subset fingerprinted by `hash_row`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub column: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub params: RuleParams,
}

impl Rule {
    pub fn min_value(&self) -> f64 {
        self.params.min_value.unwrap_or(0.0)
    }

    pub fn date_format(&self) -> &str {
        self.params.format.as_deref().unwrap_or("%Y-%m-%d")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub transformations: Vec<Rule>,
}

impl RuleSpec {
    /// One rule per column, and every operation carries the params it needs.
    pub fn validate(&self, source_id: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.transformations {
            if !seen.insert(rule.column.as_str()) {
                return Err(LedgerlineError::config(
                    source_id,
                    format!("more than one rule for column '{}'", rule.column),
                ));
            }
            let missing = |param: &str| {
                LedgerlineError::config(
                    source_id,
                    format!(
                        "rule '{}' on column '{}' needs '{param}'",
                        rule.operation.key(),
                        rule.column
                    ),
                )
            };
            match rule.operation {
                OperationKind::Truncate | OperationKind::AddSource => {
                    if rule.params.max_length.is_none() {
                        return Err(missing("max_length"));
                    }
                }
                OperationKind::ValidateValue => {
                    if rule.params.allowed_values.is_none() {
                        return Err(missing("allowed_values"));
                    }
                }
                OperationKind::FormatDate => {
                    let fmt = rule.date_format();
                    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
                        return Err(LedgerlineError::config(
                            source_id,
                            format!("invalid date pattern '{fmt}' on column '{}'", rule.column),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Source configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Raw column name → canonical column name.
    pub columns: BTreeMap<String, String>,
    /// Remapped before `validate_value` runs, e.g. "Sale" → "Debit".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_map: BTreeMap<String, String>,
    /// Remapped before `assign_category` runs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_map: BTreeMap<String, String>,
    /// Negate negative amounts before `format_currency` runs.
    #[serde(default)]
    pub force_positive_amounts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesFile {
    pub sources: BTreeMap<String, SourceConfig>,
}

/// Everything the engine needs for one source, validated.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_id: String,
    pub source: SourceConfig,
    pub rules: RuleSpec,
}

impl PipelineConfig {
    pub fn resolve(source_id: &str, sources: &SourcesFile, rules: &RuleSpec) -> Result<Self> {
        let source = sources.sources.get(source_id).cloned().ok_or_else(|| {
            LedgerlineError::config(source_id, "no schema mapping for this source")
        })?;
        if source.columns.is_empty() {
            return Err(LedgerlineError::config(source_id, "schema mapping is empty"));
        }
        rules.validate(source_id)?;
        Ok(Self {
            source_id: source_id.to_string(),
            source,
            rules: rules.clone(),
        })
    }

    pub fn load(data_dir: &Path, source_id: &str) -> Result<Self> {
        let rules = load_rules(&data_dir.join(RULES_FILE), source_id)?;
        let sources = load_sources(&data_dir.join(SOURCES_FILE), source_id)?;
        Self::resolve(source_id, &sources, &rules)
    }
}

fn read_config_file(path: &Path, source_id: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        LedgerlineError::config(source_id, format!("cannot read {}: {e}", path.display()))
    })
}

pub fn load_rules(path: &Path, source_id: &str) -> Result<RuleSpec> {
    let content = read_config_file(path, source_id)?;
    serde_json::from_str(&content).map_err(|e| {
        LedgerlineError::config(source_id, format!("{}: {e}", path.display()))
    })
}

pub fn load_sources(path: &Path, source_id: &str) -> Result<SourcesFile> {
    let content = read_config_file(path, source_id)?;
    serde_json::from_str(&content).map_err(|e| {
        LedgerlineError::config(source_id, format!("{}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Defaults written by `init`
// ---------------------------------------------------------------------------

pub fn default_rules() -> RuleSpec {
    let rule = |column: &str, operation, params: RuleParams| Rule {
        column: column.to_string(),
        operation,
        params,
    };
    let required = RuleParams {
        required: true,
        ..Default::default()
    };
    RuleSpec {
        transformations: vec![
            rule("date", OperationKind::FormatDate, required.clone()),
            rule(
                "vendor",
                OperationKind::Truncate,
                RuleParams { max_length: Some(100), ..required.clone() },
            ),
            rule(
                "amount",
                OperationKind::FormatCurrency,
                RuleParams { min_value: Some(0.0), ..required.clone() },
            ),
            rule(
                "transaction_type",
                OperationKind::ValidateValue,
                RuleParams {
                    allowed_values: Some(vec!["Debit".to_string(), "Credit".to_string()]),
                    ..required.clone()
                },
            ),
            rule("category", OperationKind::AssignCategory, required.clone()),
            rule(
                "source",
                OperationKind::AddSource,
                RuleParams { max_length: Some(32), ..required.clone() },
            ),
            rule(
                "id",
                OperationKind::HashRow,
                RuleParams {
                    columns: Some(vec![
                        "date".to_string(),
                        "vendor".to_string(),
                        "amount".to_string(),
                        "transaction_type".to_string(),
                        "source".to_string(),
                    ]),
                    ..required
                },
            ),
        ],
    }
}

pub fn default_sources() -> SourcesFile {
    let columns = |pairs: &[(&str, &str)]| {
        pairs
            .iter()
            .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
            .collect::<BTreeMap<_, _>>()
    };
    let mut sources = BTreeMap::new();
    sources.insert(
        "checking".to_string(),
        SourceConfig {
            columns: columns(&[
                ("Date", "date"),
                ("Description", "vendor"),
                ("Amount", "amount"),
                ("Type", "transaction_type"),
                ("Category", "category"),
            ]),
            ..Default::default()
        },
    );
    sources.insert(
        "credit_card".to_string(),
        SourceConfig {
            columns: columns(&[
                ("Transaction Date", "date"),
                ("Description", "vendor"),
                ("Amount", "amount"),
                ("Type", "transaction_type"),
                ("Category", "category"),
            ]),
            value_map: [("Sale", "Debit"), ("Payment", "Credit"), ("Return", "Credit")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            category_map: [("Food & Drink", "Restaurants"), ("Shopping", "Other")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            force_positive_amounts: true,
        },
    );
    SourcesFile { sources }
}

/// Write a default config file unless one is already there.
pub fn write_default<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(true)
}
