//! Stateful mailbox sessions
//!
//! A [`MailboxSession`] owns one authenticated IMAP connection and
//! issues commands strictly one after another. Sequence numbers handed
//! out by [`MailboxSession::search`] are tied to the view they came
//! from: a new SELECT or an EXPUNGE invalidates them, and the session
//! refuses to use a stale one instead of letting it address whatever
//! message the server renumbered into that slot.
//!
//! ```text
//! login -> Authenticated -> select -> Selected -> (fetch | store)*
//!                                        |
//!                                     expunge -> Expunged -> select -> Selected
//! ```
//!
//! [`with_session`] is the scoped way to use a session: it always logs
//! out, whatever the body returns.

use crate::config::{ImapSettings, Principal};
use crate::connection::{ImapSession, connect};
use crate::error::{Error, Result};
use crate::flag::Flag;
use async_imap::error::Error as ImapError;
use async_imap::types::Fetch;
use futures::TryStreamExt;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

const INBOX: &str = "INBOX";

/// Result of selecting a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStats {
    pub message_count: u32,
}

/// A message sequence number, valid only within the view it was
/// obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqId {
    view: u64,
    value: u32,
}

impl SeqId {
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A message exactly as the server returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage(Vec<u8>);

impl RawMessage {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Whether the raw message contains `needle` anywhere.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.text().contains(needle)
    }

    /// Value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        let text = self.text();
        text.lines()
            .take_while(|line| !line.is_empty())
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewState {
    Authenticated,
    Selected { exists: u32 },
    Expunged,
}

/// Tracks which view the session is in and which sequence numbers are
/// still meaningful.
#[derive(Debug)]
struct View {
    generation: u64,
    state: ViewState,
}

impl View {
    const fn new() -> Self {
        Self {
            generation: 0,
            state: ViewState::Authenticated,
        }
    }

    const fn selected(&mut self, exists: u32) {
        self.generation += 1;
        self.state = ViewState::Selected { exists };
    }

    const fn expunged(&mut self) {
        self.generation += 1;
        self.state = ViewState::Expunged;
    }

    fn require_selected(&self, command: &str) -> Result<u32> {
        match self.state {
            ViewState::Selected { exists } => Ok(exists),
            ViewState::Authenticated => Err(Error::protocol(
                command,
                "a selected mailbox",
                "no mailbox selected",
            )),
            ViewState::Expunged => Err(Error::protocol(
                command,
                "a fresh SELECT after EXPUNGE",
                "expunged view",
            )),
        }
    }

    fn require_expungeable(&self) -> Result<()> {
        match self.state {
            ViewState::Selected { .. } | ViewState::Expunged => Ok(()),
            ViewState::Authenticated => Err(Error::protocol(
                "EXPUNGE",
                "a selected mailbox",
                "no mailbox selected",
            )),
        }
    }

    fn check(&self, command: &str, id: SeqId) -> Result<()> {
        let exists = self.require_selected(command)?;
        if id.view != self.generation {
            return Err(Error::protocol(
                command,
                "a sequence number from the current view",
                format!("stale sequence number {id}"),
            ));
        }
        if id.value == 0 || id.value > exists {
            return Err(Error::protocol(
                command,
                format!("a sequence number in 1..={exists}"),
                id.to_string(),
            ));
        }
        Ok(())
    }

    const fn id(&self, value: u32) -> SeqId {
        SeqId {
            view: self.generation,
            value,
        }
    }
}

/// One authenticated connection to the mailbox endpoint.
pub struct MailboxSession {
    session: ImapSession,
    user: String,
    io_timeout: Duration,
    view: View,
}

impl MailboxSession {
    /// Connect and log in as `principal`.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] when the server rejects the credentials; connection
    /// and TLS failures as their own variants.
    pub async fn login(settings: &ImapSettings, principal: &Principal) -> Result<Self> {
        let session = connect(settings, principal).await?;
        Ok(Self {
            session,
            user: principal.username.clone(),
            io_timeout: settings.io_timeout,
            view: View::new(),
        })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// SELECT the INBOX.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the server refuses the SELECT.
    pub async fn select(&mut self) -> Result<MailboxStats> {
        self.select_folder(INBOX).await
    }

    /// SELECT `folder`, starting a fresh view.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the server refuses the SELECT.
    pub async fn select_folder(&mut self, folder: &str) -> Result<MailboxStats> {
        let mailbox = bounded(self.io_timeout, "SELECT", self.session.select(folder)).await?;
        self.view.selected(mailbox.exists);
        debug!("{} selected {}: {} messages", self.user, folder, mailbox.exists);
        Ok(MailboxStats {
            message_count: mailbox.exists,
        })
    }

    /// SEARCH with raw IMAP `criteria`, returning sequence numbers in
    /// ascending order. An empty mailbox yields an empty list.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] outside a freshly selected view or when the
    /// server rejects the search.
    pub async fn search(&mut self, criteria: &str) -> Result<Vec<SeqId>> {
        self.view.require_selected("SEARCH")?;
        let found = bounded(self.io_timeout, "SEARCH", self.session.search(criteria)).await?;

        let mut values: Vec<u32> = found.into_iter().collect();
        values.sort_unstable();
        Ok(values.into_iter().map(|v| self.view.id(v)).collect())
    }

    /// SEARCH ALL.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::search`].
    pub async fn search_all(&mut self) -> Result<Vec<SeqId>> {
        self.search("ALL").await
    }

    /// FETCH the full raw message `id`. Marks it `\Seen`.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when `id` is not valid in the current view or
    /// the server returns no body for it.
    pub async fn fetch(&mut self, id: SeqId) -> Result<RawMessage> {
        self.view.check("FETCH", id)?;
        let session = &mut self.session;
        let fetches: Vec<Fetch> = bounded(self.io_timeout, "FETCH", async {
            let stream = session.fetch(id.value.to_string(), "BODY[]").await?;
            let items: Vec<Fetch> = stream.try_collect().await?;
            Ok::<_, ImapError>(items)
        })
        .await?;

        fetches
            .iter()
            .find_map(|f| f.body().map(|b| RawMessage(b.to_vec())))
            .ok_or_else(|| Error::protocol("FETCH", "a message body", format!("no body for {id}")))
    }

    /// Add `flags` to message `id`.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when `id` is not valid in the current view or
    /// the server rejects the STORE.
    pub async fn store(&mut self, id: SeqId, flags: &[Flag]) -> Result<()> {
        self.view.check("STORE", id)?;
        let query = format!("+FLAGS {}", Flag::list(flags));
        let session = &mut self.session;
        bounded(self.io_timeout, "STORE", async {
            let stream = session.store(id.value.to_string(), &query).await?;
            let _updates: Vec<Fetch> = stream.try_collect().await?;
            Ok::<_, ImapError>(())
        })
        .await
    }

    /// Mark message `id` for deletion. Flagging an already flagged
    /// message succeeds.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::store`].
    pub async fn flag_deleted(&mut self, id: SeqId) -> Result<()> {
        self.store(id, &[Flag::Deleted]).await
    }

    /// Permanently remove every `\Deleted` message and return how many
    /// went. All sequence numbers obtained so far become stale.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when no mailbox was selected or the server
    /// rejects the EXPUNGE.
    pub async fn expunge(&mut self) -> Result<usize> {
        self.view.require_expungeable()?;
        let session = &mut self.session;
        let removed: Vec<u32> = bounded(self.io_timeout, "EXPUNGE", async {
            let stream = session.expunge().await?;
            let removed: Vec<u32> = stream.try_collect().await?;
            Ok::<_, ImapError>(removed)
        })
        .await?;

        self.view.expunged();
        info!("{} expunged {} messages", self.user, removed.len());
        Ok(removed.len())
    }

    /// LOGOUT and close the connection.
    ///
    /// # Errors
    ///
    /// Returns the LOGOUT failure; the connection is closed regardless.
    pub async fn logout(mut self) -> Result<()> {
        bounded(self.io_timeout, "LOGOUT", self.session.logout()).await
    }
}

/// Log in as `principal`, run `body`, and log out again no matter how
/// `body` ended. The body's result is returned; a failed logout is
/// only logged.
///
/// # Errors
///
/// The login error, or whatever `body` returned.
pub async fn with_session<T, F>(
    settings: &ImapSettings,
    principal: &Principal,
    body: F,
) -> Result<T>
where
    F: AsyncFnOnce(&mut MailboxSession) -> Result<T>,
{
    let mut session = MailboxSession::login(settings, principal).await?;
    let result = body(&mut session).await;
    if let Err(e) = session.logout().await {
        warn!("Logout for {} failed: {}", principal.username, e);
    }
    result
}

/// Run one IMAP round-trip under `timeout`, mapping failures to the
/// harness taxonomy.
async fn bounded<T, F>(timeout: Duration, command: &str, fut: F) -> Result<T>
where
    F: Future<Output = async_imap::error::Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout {
            operation: command.to_string(),
            after: timeout,
        })?
        .map_err(|e| command_error(command, e))
}

fn command_error(command: &str, err: ImapError) -> Error {
    match err {
        ImapError::No(msg) => Error::protocol(command, "OK", format!("NO {msg}")),
        ImapError::Bad(msg) => Error::protocol(command, "OK", format!("BAD {msg}")),
        ImapError::Io(io) => Error::Io(io),
        other => Error::Imap(format!("{command}: {other}")),
    }
}
