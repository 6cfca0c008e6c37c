//! SELECT command handler.
//!
//! Only the INBOX exists. The key piece of the response is
//! `* N EXISTS`, the message count the client builds its view on.
//!
//! Returns whether a mailbox is now selected.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::MailStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the SELECT command for `user`.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    inbox: bool,
    user: &str,
    store: &MailStore,
    stream: &mut BufReader<S>,
) -> bool {
    let Some(account) = store.account(user).filter(|_| inbox) else {
        let resp = format!("{tag} NO Mailbox does not exist\r\n");
        let _ = write_line(stream, &resp).await;
        return false;
    };

    // RFC 3501 Section 6.3.1: required FLAGS response
    let _ = write_line(
        stream,
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n",
    )
    .await;

    let exists = format!("* {} EXISTS\r\n", account.messages.len());
    let _ = write_line(stream, &exists).await;

    // RFC 3501 Section 6.3.1: required RECENT response
    let _ = write_line(stream, "* 0 RECENT\r\n").await;
    let _ = write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await;
    let _ = write_line(
        stream,
        "* OK [PERMANENTFLAGS (\\Seen \\Deleted)] Limited\r\n",
    )
    .await;

    let resp = format!("{tag} OK [READ-WRITE] SELECT completed\r\n");
    let _ = write_line(stream, &resp).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::test_support::read_all;
    use crate::fake_imap::mailbox::MailStoreBuilder;
    use tokio::io::BufReader;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    async fn run(inbox: bool, user: &str, store: &MailStore) -> (String, bool) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let selected = handle_select("A1", inbox, user, store, &mut stream).await;
        drop(stream);
        (read_all(client).await, selected)
    }

    #[tokio::test]
    async fn reports_message_count() {
        let store = MailStoreBuilder::new()
            .account("alice", "pw", "alice@example.com")
            .message(false, RAW)
            .message(true, RAW)
            .build();

        let (output, selected) = run(true, "alice", &store).await;

        assert!(selected);
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("A1 OK [READ-WRITE]"));
    }

    #[tokio::test]
    async fn counts_only_own_messages() {
        let store = MailStoreBuilder::new()
            .account("alice", "pw", "alice@example.com")
            .message(false, RAW)
            .account("bob", "pw", "bob@example.com")
            .build();

        let (output, _) = run(true, "bob", &store).await;
        assert!(output.contains("* 0 EXISTS"));
    }

    #[tokio::test]
    async fn other_mailboxes_do_not_exist() {
        let store = MailStoreBuilder::new()
            .account("alice", "pw", "alice@example.com")
            .build();

        let (output, selected) = run(false, "alice", &store).await;

        assert!(!selected);
        assert!(output.contains("A1 NO Mailbox does not exist"));
    }
}
