//! Console reporter, formatted like the classic command-line tool

use std::cell::Cell;
use std::io::Write;

use super::{FileStatus, Reporter};

/// Prints status lines and a dotted percentage bar to stderr.
pub struct ConsoleReporter {
    /// 2%-steps already printed for the current run
    steps: Cell<u64>,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter {
            steps: Cell::new(0),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn file_status(&self, name: &str, status: &FileStatus) {
        let text = match status {
            FileStatus::Ok => "OK".to_string(),
            FileStatus::Found(other) if other.is_empty() => "FOUND".to_string(),
            FileStatus::Found(other) => format!("FOUND: {}", other),
            FileStatus::Corrupt => "CORRUPT".to_string(),
            FileStatus::NotFound => "NOT FOUND".to_string(),
            FileStatus::Restorable => "can be restored".to_string(),
            FileStatus::Recovered => "RECOVERED".to_string(),
            FileStatus::NotRestored => "NOT RESTORED".to_string(),
            FileStatus::Failed => "FAILED".to_string(),
            FileStatus::Fixed => "FIXED".to_string(),
            FileStatus::NotFixed => "NOT FIXED".to_string(),
        };
        eprintln!("  {:<40} - {}", name, text);
    }

    fn rename(&self, from: &str, to: &str) {
        eprintln!("    Rename: {} -> {}", from, to);
    }

    fn duplicate(&self, kept: &str, other: &str) {
        eprintln!("    Duplicate: {} == {}", kept, other);
    }

    fn note(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn progress(&self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        if self.steps.get() == 0 {
            eprint!("0%");
        }
        // 50 ticks of 2%; every fifth tick prints the percentage
        let target = done.saturating_mul(50) / total;
        while self.steps.get() < target.min(50) {
            let step = self.steps.get() + 1;
            self.steps.set(step);
            if step % 5 == 0 {
                eprint!("{}%", step * 2);
            } else {
                eprint!(".");
            }
        }
        let _ = std::io::stderr().flush();
    }

    fn progress_done(&self) {
        // Catch up to 100% even for empty runs
        if self.steps.get() == 0 {
            eprint!("0%");
        }
        while self.steps.get() < 50 {
            let step = self.steps.get() + 1;
            self.steps.set(step);
            if step % 5 == 0 {
                eprint!("{}%", step * 2);
            } else {
                eprint!(".");
            }
        }
        eprintln!();
        self.steps.set(0);
    }
}
