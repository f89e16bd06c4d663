//! Progress and status reporting
//!
//! User-visible output goes through a trait so the REPL, the CLI, and
//! tests can render (or swallow) it independently of the logger.

pub mod console;
pub mod silent;

pub use console::ConsoleReporter;
pub use silent::SilentReporter;

/// Per-file outcome lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Present under its own name with the right content
    Ok,
    /// Present with the right content under another name
    Found(String),
    /// A candidate exists but could not be hashed or failed its digest
    Corrupt,
    NotFound,
    /// Missing but reconstructible from the loaded volumes
    Restorable,
    Recovered,
    NotRestored,
    /// Output could not be produced or finalized
    Failed,
    Fixed,
    NotFixed,
}

pub trait Reporter {
    /// One outcome line for a file or volume
    fn file_status(&self, name: &str, status: &FileStatus);

    /// A rename performed by the tool
    fn rename(&self, from: &str, to: &str);

    /// Two on-disk files with identical content
    fn duplicate(&self, kept: &str, other: &str);

    /// Free-form phase or summary line
    fn note(&self, message: &str);

    /// Codec progress: `done` of `total` bytes processed
    fn progress(&self, done: u64, total: u64);

    fn progress_done(&self);
}
