//! Integration-test harness for a containerized mail service
//!
//! Brings up a docker compose stack, waits for the mail daemon to
//! report readiness, and then drives it from the outside: messages go
//! in over SMTP submission, come back out over IMAP, and the published
//! version is checked against every place it is advertised.
//!
//! The [`scenario`] module holds the end-to-end checks; everything else
//! is the plumbing they are built from and can be used on its own.

mod compose;
mod config;
mod connection;
mod docker;
mod environment;
mod error;
mod flag;
mod mailbox;
mod message;
mod readiness;
pub mod scenario;
mod submission;
mod version;

pub use compose::{ContainerHandle, ContainerRuntime, find_service, wait_for_exit};
pub use config::{
    CompositionSettings, HarnessConfig, ImapSettings, Principal, SubmissionSettings, TlsMode,
    VersionSettings,
};
pub use docker::DockerCompose;
pub use environment::TestEnvironment;
pub use error::{Error, Result};
pub use flag::Flag;
pub use mailbox::{MailboxSession, MailboxStats, RawMessage, SeqId, with_session};
pub use message::{Message, unique_token};
pub use readiness::{ReadinessProbe, Ready, await_ready};
pub use submission::{Ack, Reply, SubmissionDriver};
pub use version::{
    PackageVersion, Reconciliation, TAG_PREFIX, VERSION_LABEL, VersionRecord, Witness, reconcile,
};
