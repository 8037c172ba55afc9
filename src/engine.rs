use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::{OperationKind, PipelineConfig, Rule};
use crate::error::{LedgerlineError, Result};
use crate::models::{CellError, Record, RecordSet, Value};
use crate::operations::{hash_row, truncate_chars, CellContext, OperationTable};
use crate::vendors::VendorStore;

/// Output of one transformation pass.
#[derive(Debug, Clone, Default)]
pub struct Transformed {
    pub records: RecordSet,
    /// Cell failures, in rule order then record order.
    pub errors: Vec<CellError>,
}

pub struct Transformer {
    config: PipelineConfig,
    ops: OperationTable,
}

impl Transformer {
    pub fn new(config: PipelineConfig) -> Self {
        let ops = OperationTable::for_source(&config.source);
        Self { config, ops }
    }

    pub fn source_id(&self) -> &str {
        &self.config.source_id
    }

    /// Rename mapped columns to their canonical names and drop everything
    /// else. Columns already carrying a canonical name are kept as they are,
    /// so normalizing twice changes nothing. Absent canonical columns are not
    /// synthesized here.
    pub fn normalize(&self, raw: RecordSet) -> RecordSet {
        let mapping = &self.config.source.columns;
        let canonical: HashSet<&str> = mapping.values().map(String::as_str).collect();

        let canonical_of = |column: &str| -> Option<String> {
            match mapping.get(column) {
                Some(target) => Some(target.clone()),
                None if canonical.contains(column) => Some(column.to_string()),
                None => None,
            }
        };

        // (raw column, canonical name); first raw column wins a canonical name
        let mut plan: Vec<(String, String)> = Vec::new();
        for column in &raw.columns {
            if let Some(target) = canonical_of(column) {
                if !plan.iter().any(|(_, t)| *t == target) {
                    plan.push((column.clone(), target));
                }
            }
        }

        let records = raw
            .records
            .into_iter()
            .map(|record| {
                let mut out = Record::new();
                for (from, to) in &plan {
                    let value = record.get(from).cloned().unwrap_or(Value::Missing);
                    out.set(to.clone(), value);
                }
                out
            })
            .collect();

        RecordSet {
            columns: plan.into_iter().map(|(_, to)| to).collect(),
            records,
        }
    }

    /// Apply every rule in order. Cell failures are collected; a batch-level
    /// failure aborts the pass.
    pub fn apply_rules(&self, mut set: RecordSet, vendors: &VendorStore) -> Result<Transformed> {
        let mut errors = Vec::new();

        for rule in &self.config.rules.transformations {
            if set.has_column(&rule.column) {
                self.apply_present(rule, &mut set, vendors, &mut errors)?;
            } else if rule.params.required {
                self.synthesize(rule, &mut set, vendors, &mut errors);
            } else {
                debug!(column = %rule.column, "optional column absent, rule skipped");
            }
        }

        info!(
            source = %self.config.source_id,
            records = set.len(),
            cell_errors = errors.len(),
            "transformation pass finished"
        );
        Ok(Transformed {
            records: set,
            errors,
        })
    }

    pub fn transform(&self, raw: RecordSet, vendors: &VendorStore) -> Result<Transformed> {
        let normalized = self.normalize(raw);
        self.apply_rules(normalized, vendors)
    }

    fn apply_present(
        &self,
        rule: &Rule,
        set: &mut RecordSet,
        vendors: &VendorStore,
        errors: &mut Vec<CellError>,
    ) -> Result<()> {
        match rule.operation {
            OperationKind::ValidateUnique => validate_unique(set, &rule.column),
            // synthesizing operations leave an existing column alone
            OperationKind::HashRow | OperationKind::AddSource => Ok(()),
            kind => {
                let Some(op) = self.ops.cell_op(kind) else {
                    return Ok(());
                };
                for (i, record) in set.records.iter_mut().enumerate() {
                    let current = match record.get(&rule.column) {
                        Some(Value::Text(s)) => Value::Text(s.clone()),
                        _ => Value::Missing,
                    };
                    let outcome = op.apply(
                        &current,
                        rule,
                        &CellContext {
                            record: &*record,
                            vendors,
                        },
                    );
                    let value = cell_value(outcome, i, rule, errors);
                    record.set(rule.column.as_str(), value);
                }
                Ok(())
            }
        }
    }

    fn synthesize(
        &self,
        rule: &Rule,
        set: &mut RecordSet,
        vendors: &VendorStore,
        errors: &mut Vec<CellError>,
    ) {
        match rule.operation {
            OperationKind::HashRow => {
                let columns: Vec<String> = match &rule.params.columns {
                    Some(subset) => subset.clone(),
                    None => set.columns.clone(),
                };
                set.add_column(&rule.column, |_, record| Value::Text(hash_row(record, &columns)));
            }
            OperationKind::AddSource => {
                let max = rule.params.max_length.unwrap_or(usize::MAX);
                let source = truncate_chars(&self.config.source_id, max);
                set.add_column(&rule.column, |_, _| Value::Text(source.clone()));
            }
            OperationKind::AssignCategory | OperationKind::ValidateValue => {
                let op = self.ops.cell_op(rule.operation);
                set.add_column(&rule.column, |i, record| match op {
                    Some(op) => {
                        let outcome = op.apply(
                            &Value::Missing,
                            rule,
                            &CellContext { record, vendors },
                        );
                        cell_value(outcome, i, rule, errors)
                    }
                    None => Value::Missing,
                });
            }
            _ => {
                warn!(column = %rule.column, "required column absent from source");
                set.add_column(&rule.column, |i, _| {
                    errors.push(CellError {
                        record: i,
                        column: rule.column.clone(),
                        reason: "required column absent from source".to_string(),
                    });
                    Value::Missing
                });
            }
        }
    }
}

fn cell_value(
    outcome: std::result::Result<Value, String>,
    record: usize,
    rule: &Rule,
    errors: &mut Vec<CellError>,
) -> Value {
    match outcome {
        Ok(value) => value,
        Err(reason) => {
            warn!(record, column = %rule.column, %reason, "cell rejected");
            errors.push(CellError {
                record,
                column: rule.column.clone(),
                reason,
            });
            Value::Invalid
        }
    }
}

fn validate_unique(set: &RecordSet, column: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for record in &set.records {
        if let Some(value) = record.text(column) {
            if !seen.insert(value) {
                return Err(LedgerlineError::BatchValidation {
                    column: column.to_string(),
                    reason: format!("duplicate value '{value}'"),
                });
            }
        }
    }
    Ok(())
}
