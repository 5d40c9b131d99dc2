//! Console output modes for the CLI
//!
//! Results always go to stdout. Informational lines (headers, progress,
//! summaries) are printed only in [`OutputMode::Normal`]; warnings go to
//! stderr unless the user asked for `--quiet`.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputMode {
    Normal = 0,
    /// `--quiet`: results and errors only
    Quiet = 1,
    /// `--json`: stdout carries one JSON document, warnings still reach stderr
    Json = 2,
}

impl OutputMode {
    /// Quiet wins over JSON
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        match (quiet, json) {
            (true, _) => Self::Quiet,
            (false, true) => Self::Json,
            (false, false) => Self::Normal,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Quiet,
            2 => Self::Json,
            _ => Self::Normal,
        }
    }
}

static MODE: AtomicU8 = AtomicU8::new(OutputMode::Normal as u8);

pub fn set_mode(mode: OutputMode) {
    MODE.store(mode as u8, Ordering::SeqCst);
}

pub fn mode() -> OutputMode {
    OutputMode::from_u8(MODE.load(Ordering::SeqCst))
}

/// Informational stdout output is suppressed
pub fn is_quiet() -> bool {
    mode() != OutputMode::Normal
}

/// Warnings on stderr are suppressed
pub fn warnings_muted() -> bool {
    mode() == OutputMode::Quiet
}

/// Print a message only in normal mode
#[macro_export]
macro_rules! info_print {
    ($($arg:tt)*) => {
        if !$crate::output::is_quiet() {
            println!($($arg)*);
        }
    };
}

/// Print a warning to stderr unless `--quiet`
#[macro_export]
macro_rules! warn_print {
    ($($arg:tt)*) => {
        if !$crate::output::warnings_muted() {
            eprintln!($($arg)*);
        }
    };
}
