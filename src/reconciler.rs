use std::time::{Duration, Instant};

use comfy_table::{Cell, Table};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ledger::{find_duplicates, RecordBacking, LEDGER, QUARANTINE};
use crate::models::{Record, Value};
use crate::operations::{CATEGORY_COLUMN, VENDOR_COLUMN};
use crate::vendors::{learn_and_save, Taxonomy, VendorBacking, VendorStore};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Answer(String),
    TimedOut,
    Interrupted,
}

/// The operator's side of the session. `prompt` must return by `deadline`.
pub trait OperatorInput {
    fn show(&mut self, text: &str);
    fn prompt(&mut self, message: &str, deadline: Instant) -> PromptOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    PendingField,
    AwaitingInput,
    Resolved,
    TimedOut,
    Interrupted,
    StillPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    TimedOut,
    Interrupted,
}

impl SessionOutcome {
    fn abort_state(&self) -> RecordState {
        match self {
            Self::Completed => RecordState::StillPending,
            Self::TimedOut => RecordState::TimedOut,
            Self::Interrupted => RecordState::Interrupted,
        }
    }
}

#[derive(Debug)]
pub struct ReconcileReport {
    pub resolved: usize,
    pub still_pending: usize,
    pub learned: Vec<(String, String)>,
    pub outcome: SessionOutcome,
    /// Final state of each quarantined record, in queue order.
    pub states: Vec<RecordState>,
    pub ledger_duplicates: usize,
}

enum Step {
    Done,
    Abort(SessionOutcome),
}

pub struct Reconciler<'a> {
    vendors: &'a mut VendorStore,
    vendor_backing: &'a dyn VendorBacking,
    records: &'a dyn RecordBacking,
    timeout: Duration,
    identity_column: String,
    learned: Vec<(String, String)>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        vendors: &'a mut VendorStore,
        vendor_backing: &'a dyn VendorBacking,
        records: &'a dyn RecordBacking,
    ) -> Self {
        Self {
            vendors,
            vendor_backing,
            records,
            timeout: DEFAULT_TIMEOUT,
            identity_column: "id".to_string(),
            learned: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_identity_column(mut self, column: &str) -> Self {
        self.identity_column = column.to_string();
        self
    }

    /// Walk the quarantine queue record by record, prompting for each
    /// unresolved column. A timeout or interrupt stops the whole pass; what
    /// was resolved so far is still merged.
    pub fn run(mut self, input: &mut dyn OperatorInput) -> Result<ReconcileReport> {
        let mut pending = self.records.load(QUARANTINE)?;
        info!(count = pending.len(), "loaded pending transactions");

        let mut states = vec![RecordState::PendingField; pending.len()];
        let mut outcome = SessionOutcome::Completed;

        'records: for i in 0..pending.len() {
            debug!(record = i + 1, total = pending.len(), "processing transaction");
            let columns = pending[i].unresolved_columns();
            if !columns.is_empty() {
                input.show(&describe(&pending[i]));
            }
            // Answers land in a draft that replaces the record only once every
            // field was visited; an abort leaves the record as loaded.
            let mut draft = pending[i].clone();
            for column in columns {
                // an earlier answer may have filled it via vendor propagation
                if !draft.get(&column).is_some_and(Value::is_unresolved) {
                    continue;
                }
                states[i] = RecordState::AwaitingInput;
                let deadline = Instant::now() + self.timeout;
                let step = if column == CATEGORY_COLUMN {
                    self.resolve_category(&mut pending, i, &mut draft, deadline, input)?
                } else {
                    resolve_field(&mut draft, &column, deadline, input)
                };
                if let Step::Abort(reason) = step {
                    outcome = reason;
                    for state in &mut states[i..] {
                        *state = reason.abort_state();
                    }
                    break 'records;
                }
            }
            pending[i] = draft;
            states[i] = if pending[i].is_complete() {
                RecordState::Resolved
            } else {
                RecordState::StillPending
            };
        }

        match outcome {
            SessionOutcome::TimedOut => {
                info!(timeout_secs = self.timeout.as_secs(), "exiting data review due to timeout")
            }
            SessionOutcome::Interrupted => info!("exiting data review due to interrupt"),
            SessionOutcome::Completed => {}
        }

        // propagation can complete records the session never reached
        for (state, record) in states.iter_mut().zip(&pending) {
            if record.is_complete() {
                *state = RecordState::Resolved;
            }
        }

        let (resolved, still_pending): (Vec<Record>, Vec<Record>) =
            pending.into_iter().partition(Record::is_complete);

        // Not transactional across the two sets: a crash between them leaves
        // resolved records in both.
        if !resolved.is_empty() {
            self.records.append(LEDGER, &resolved)?;
        }
        self.records.replace(QUARANTINE, &still_pending)?;

        if !still_pending.is_empty() {
            warn!(count = still_pending.len(), "transactions still need to be processed");
        }
        info!(count = resolved.len(), "successfully processed transactions");

        let ledger = self.records.load(LEDGER)?;
        let ledger_duplicates = find_duplicates(&ledger, &self.identity_column).len();
        if ledger_duplicates > 0 {
            warn!(count = ledger_duplicates, "duplicate transactions in ledger");
        }

        Ok(ReconcileReport {
            resolved: resolved.len(),
            still_pending: still_pending.len(),
            learned: self.learned,
            outcome,
            states,
            ledger_duplicates,
        })
    }

    /// Ask for a category for `draft` (the working copy of `pending[index]`).
    /// The learned vendor mapping is saved at once and copied onto the other
    /// pending records for that vendor.
    fn resolve_category(
        &mut self,
        pending: &mut [Record],
        index: usize,
        draft: &mut Record,
        deadline: Instant,
        input: &mut dyn OperatorInput,
    ) -> Result<Step> {
        let taxonomy = self.vendors.taxonomy().clone();
        if taxonomy.is_empty() {
            warn!("category taxonomy is empty, leaving category unresolved");
            return Ok(Step::Done);
        }
        let vendor = draft.text(VENDOR_COLUMN).map(str::to_string);

        input.show(&category_menu(&taxonomy));
        let mut message = format!(
            "Category for {}: enter the number",
            vendor.as_deref().unwrap_or("(no vendor)")
        );
        let category = loop {
            match input.prompt(&message, deadline) {
                PromptOutcome::Answer(answer) => {
                    let choice = answer.trim().parse::<usize>().ok();
                    match choice.and_then(|n| taxonomy.by_position(n)) {
                        Some(name) => break name.to_string(),
                        None => {
                            message = format!(
                                "Invalid selection. Please choose a number from 1 to {}",
                                taxonomy.len()
                            );
                        }
                    }
                }
                PromptOutcome::TimedOut => return Ok(Step::Abort(SessionOutcome::TimedOut)),
                PromptOutcome::Interrupted => return Ok(Step::Abort(SessionOutcome::Interrupted)),
            }
        };

        draft.set(CATEGORY_COLUMN, Value::text(category.as_str()));
        let Some(vendor) = vendor else {
            return Ok(Step::Done);
        };

        learn_and_save(self.vendors, self.vendor_backing, &vendor, &category)?;
        self.learned.push((vendor.clone(), category.clone()));

        let mut propagated = 0usize;
        for (j, other) in pending.iter_mut().enumerate() {
            if j != index && other.has(CATEGORY_COLUMN) && other.text(VENDOR_COLUMN) == Some(vendor.as_str()) {
                other.set(CATEGORY_COLUMN, Value::text(category.as_str()));
                propagated += 1;
            }
        }
        info!(%vendor, %category, propagated, "learned vendor category");
        Ok(Step::Done)
    }
}

/// Free-text answer, trusted as given. An empty answer leaves the field missing.
fn resolve_field(
    record: &mut Record,
    column: &str,
    deadline: Instant,
    input: &mut dyn OperatorInput,
) -> Step {
    let message = format!("Please provide a value for {column} (required)");
    match input.prompt(&message, deadline) {
        PromptOutcome::Answer(answer) => {
            let answer = answer.trim();
            if answer.is_empty() {
                debug!(column, "field left unresolved");
            } else {
                record.set(column, Value::text(answer));
            }
            Step::Done
        }
        PromptOutcome::TimedOut => Step::Abort(SessionOutcome::TimedOut),
        PromptOutcome::Interrupted => Step::Abort(SessionOutcome::Interrupted),
    }
}

pub fn category_menu(taxonomy: &Taxonomy) -> String {
    let mut table = Table::new();
    table.set_header(vec!["#", "Category", "Group"]);
    for (i, (name, group)) in taxonomy.entries().iter().enumerate() {
        table.add_row(vec![Cell::new(i + 1), Cell::new(name), Cell::new(group.key())]);
    }
    format!("Categories\n{table}")
}

fn describe(record: &Record) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Column", "Value"]);
    for (column, value) in record.fields() {
        let shown = match value {
            Value::Text(s) => s.clone(),
            Value::Missing | Value::Invalid => "(missing)".to_string(),
        };
        table.add_row(vec![Cell::new(column), Cell::new(shown)]);
    }
    table.to_string()
}
