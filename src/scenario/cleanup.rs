//! The read-and-clear cycle

use crate::config::{ImapSettings, Principal};
use crate::error::{Error, Result};
use crate::mailbox::with_session;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    /// Message count reported by the first SELECT.
    pub found: u32,
    pub read: usize,
    pub removed: usize,
    /// Messages removed by an immediately repeated EXPUNGE; always 0.
    pub second_expunge: usize,
    /// Message count reported by the SELECT after expunging.
    pub remaining: u32,
}

/// Read every message in `principal`'s mailbox, flag each one deleted,
/// expunge twice and confirm with a fresh SELECT that the mailbox is
/// empty. With `require_messages`, an already empty mailbox fails.
///
/// # Errors
///
/// Mailbox errors as is; [`Error::Assertion`] when any count disagrees.
pub async fn read_and_clear(
    settings: &ImapSettings,
    principal: &Principal,
    require_messages: bool,
) -> Result<ClearReport> {
    with_session(settings, principal, async |session| {
        let found = session.select().await?.message_count;
        if require_messages && found == 0 {
            return Err(Error::Assertion(format!(
                "mailbox of {} is empty, expected delivered messages",
                principal.username
            )));
        }

        let ids = session.search_all().await?;
        if ids.len() != found as usize {
            return Err(Error::Assertion(format!(
                "SELECT reported {found} messages but SEARCH ALL returned {}",
                ids.len()
            )));
        }

        for &id in &ids {
            let raw = session.fetch(id).await?;
            if raw.as_bytes().is_empty() {
                return Err(Error::Assertion(format!("message {id} has no content")));
            }
        }
        for &id in &ids {
            session.flag_deleted(id).await?;
        }

        let removed = session.expunge().await?;
        if removed != ids.len() {
            return Err(Error::Assertion(format!(
                "expected EXPUNGE to remove {} messages, removed {removed}",
                ids.len()
            )));
        }

        let second_expunge = session.expunge().await?;
        if second_expunge != 0 {
            return Err(Error::Assertion(format!(
                "repeated EXPUNGE removed {second_expunge} messages, expected 0"
            )));
        }

        let remaining = session.select().await?.message_count;
        if remaining != 0 {
            return Err(Error::Assertion(format!(
                "mailbox of {} still holds {remaining} messages after expunge",
                principal.username
            )));
        }

        info!("Cleared {} messages for {}", removed, principal.username);
        Ok(ClearReport {
            found,
            read: ids.len(),
            removed,
            second_expunge,
            remaining,
        })
    })
    .await
}
