//! Output seam for the chat session.
//!
//! The session and its receive loop never print directly; they go through a
//! [`Console`] so the transcript can be captured in tests.

use std::io::Write;

/// Prefix for user-visible failures.
pub const ERROR_MARK: &str = "✗";

/// Destination for everything the chat session shows the user.
pub trait Console: Send + Sync + std::fmt::Debug {
    /// Print one line.
    fn line(&self, text: &str);

    /// Print a failure, optionally followed by an indented remediation hint.
    fn error(&self, message: &str, hint: Option<&str>) {
        self.line(&format!("{ERROR_MARK} {message}"));
        if let Some(hint) = hint {
            self.line(&format!("  {hint}"));
        }
    }
}

/// Console that writes to the process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Console for Stdout {
    fn line(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout is not worth tearing the session down for
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }
}
