//! Fake IMAP server for integration testing
//!
//! An in-process IMAP server that speaks enough of the protocol to
//! drive `MailboxSession` end-to-end, over implicit TLS or STARTTLS:
//!
//! TCP -> TLS -> greeting -> LOGIN -> SELECT/SEARCH/FETCH/STORE/EXPUNGE -> LOGOUT
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, TLS setup, and command dispatch
//! - `handlers/` -- one file per command group
//! - `mailbox` -- accounts and messages, shared with the fake SMTP server
//! - `io` -- shared write helpers

mod handlers;
pub mod io;

pub use mailbox::{MailStoreBuilder, SharedStore};
pub use server::{FakeImapServer, Fault};
