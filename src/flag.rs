//! IMAP message flags used with STORE

use std::fmt;

/// A system flag the harness sets on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message is marked for removal by the next EXPUNGE (`\Deleted`).
    Deleted,
}

impl Flag {
    /// The IMAP wire representation, including the leading backslash.
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
        }
    }

    /// A parenthesized flag list for STORE, e.g. `(\Seen \Deleted)`.
    #[must_use]
    pub fn list(flags: &[Self]) -> String {
        let names: Vec<&str> = flags.iter().map(|f| f.as_imap_str()).collect();
        format!("({})", names.join(" "))
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
