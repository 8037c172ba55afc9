use std::io::Write;
use std::time::Instant;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::warn;

use crate::reconciler::{OperatorInput, PromptOutcome};

/// Line input on the controlling terminal, bounded by a deadline.
pub struct TerminalInput;

impl OperatorInput for TerminalInput {
    fn show(&mut self, text: &str) {
        println!("{text}");
    }

    fn prompt(&mut self, message: &str, deadline: Instant) -> PromptOutcome {
        print!("{message}: ");
        let _ = std::io::stdout().flush();

        if let Err(e) = terminal::enable_raw_mode() {
            warn!(error = %e, "terminal does not support raw input");
            return PromptOutcome::Interrupted;
        }
        let outcome = read_line(deadline);
        restored(terminal::disable_raw_mode());
        println!();
        outcome
    }
}

fn restored(result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "failed to restore terminal mode");
            false
        }
    }
}

enum Edit {
    Continue,
    Done(PromptOutcome),
}

fn read_line(deadline: Instant) -> PromptOutcome {
    let mut line = String::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PromptOutcome::TimedOut;
        }
        match event::poll(remaining) {
            Ok(false) => return PromptOutcome::TimedOut,
            Ok(true) => {}
            Err(e) => {
                warn!(error = %e, "failed to poll terminal");
                return PromptOutcome::Interrupted;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Edit::Done(outcome) = handle_key(&mut line, key) {
                    return outcome;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed to read terminal event");
                return PromptOutcome::Interrupted;
            }
        }
    }
}

fn handle_key(line: &mut String, key: KeyEvent) -> Edit {
    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
    {
        return Edit::Done(PromptOutcome::Interrupted);
    }
    let mut out = std::io::stdout();
    match key.code {
        KeyCode::Enter => return Edit::Done(PromptOutcome::Answer(std::mem::take(line))),
        KeyCode::Esc => return Edit::Done(PromptOutcome::Interrupted),
        KeyCode::Backspace => {
            if line.pop().is_some() {
                let _ = write!(out, "\u{8} \u{8}");
            }
        }
        KeyCode::Char(c) => {
            line.push(c);
            let _ = write!(out, "{c}");
        }
        _ => {}
    }
    let _ = out.flush();
    Edit::Continue
}
