use std::time::Duration;

use colored::Colorize;

use crate::cli::open_ledger;
use crate::error::Result;
use crate::ledger::SqliteRecords;
use crate::prompt::TerminalInput;
use crate::reconciler::{Reconciler, SessionOutcome};
use crate::vendors::{SqliteVendors, VendorBacking};

pub fn run(timeout: Option<u64>) -> Result<()> {
    let (settings, conn) = open_ledger()?;
    let timeout = timeout
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| settings.prompt_timeout());

    let vendor_backing = SqliteVendors::new(&conn);
    let records = SqliteRecords::new(&conn);
    let mut store = vendor_backing.load()?;

    let report = Reconciler::new(&mut store, &vendor_backing, &records)
        .with_timeout(timeout)
        .with_identity_column(&settings.identity_column)
        .run(&mut TerminalInput)?;

    match report.outcome {
        SessionOutcome::TimedOut => println!(
            "{} no answer within {}s, stopping review",
            "Timed out:".yellow().bold(),
            timeout.as_secs()
        ),
        SessionOutcome::Interrupted => println!("{}", "Review interrupted".yellow().bold()),
        SessionOutcome::Completed => {}
    }

    println!("{} resolved, {} still pending", report.resolved, report.still_pending);
    for (vendor, category) in &report.learned {
        println!("Learned: {vendor} \u{2192} {category}");
    }
    if report.ledger_duplicates > 0 {
        println!(
            "{} {} ledger records share a '{}' value. See `ledgerline duplicates`.",
            "Warning:".yellow().bold(),
            report.ledger_duplicates,
            settings.identity_column
        );
    }
    Ok(())
}
