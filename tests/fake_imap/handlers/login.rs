//! LOGIN command handler.
//!
//! Credentials are checked against the account store. A rejected login
//! gets `NO [AUTHENTICATIONFAILED]` (RFC 5530) and leaves the
//! connection open and unauthenticated, like a real server.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::SharedStore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LOGIN command. Returns the authenticated user, if any.
///
/// `line` is the raw command line; the two arguments are read from it
/// directly as quoted strings or atoms.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    line: &str,
    store: &SharedStore,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let credentials = parse_credentials(line);
    let accepted = credentials
        .as_ref()
        .is_some_and(|(user, pass)| store.lock().unwrap().authenticate(user, pass));

    if accepted {
        let resp = format!("{tag} OK LOGIN completed\r\n");
        let _ = write_line(stream, &resp).await;
        credentials.map(|(user, _)| user)
    } else {
        let resp = format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let _ = write_line(stream, &resp).await;
        None
    }
}

/// Split `TAG LOGIN user pass` into its two arguments.
fn parse_credentials(line: &str) -> Option<(String, String)> {
    let mut rest = line.trim();
    for _ in 0..2 {
        rest = rest.split_once(' ')?.1.trim_start();
    }
    let (user, rest) = parse_astring(rest)?;
    let (pass, rest) = parse_astring(rest.trim_start())?;
    rest.trim().is_empty().then_some((user, pass))
}

/// Parse one quoted string (with `\\` and `\"` escapes) or atom from
/// the front of `input`.
fn parse_astring(input: &str) -> Option<(String, &str)> {
    if let Some(quoted) = input.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => value.push(chars.next()?.1),
                '"' => return Some((value, &quoted[i + 1..])),
                _ => value.push(c),
            }
        }
        None
    } else {
        let end = input.find(' ').unwrap_or(input.len());
        (end > 0).then(|| (input[..end].to_string(), &input[end..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::test_support::read_all;
    use crate::fake_imap::mailbox::MailStoreBuilder;
    use tokio::io::BufReader;

    async fn run(tag: &str, line: &str) -> (String, Option<String>) {
        let store = MailStoreBuilder::new()
            .account("alice", "s3cret", "alice@example.com")
            .shared();
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        let user = handle_login(tag, line, &store, &mut stream).await;
        drop(stream);
        (read_all(client).await, user)
    }

    #[tokio::test]
    async fn accepts_known_credentials() {
        let (output, user) = run("A0001", "A0001 LOGIN \"alice\" \"s3cret\"").await;
        assert_eq!(user.as_deref(), Some("alice"));
        assert_eq!(output, "A0001 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn accepts_atom_arguments() {
        let (_, user) = run("A1", "A1 login alice s3cret").await;
        assert_eq!(user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let (output, user) = run("A1", "A1 LOGIN \"alice\" \"nope\"").await;
        assert!(user.is_none());
        assert_eq!(output, "A1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
    }

    #[tokio::test]
    async fn rejects_empty_password() {
        let (output, user) = run("A1", "A1 LOGIN \"alice\" \"\"").await;
        assert!(user.is_none());
        assert!(output.contains("NO [AUTHENTICATIONFAILED]"));
    }

    #[test]
    fn unescapes_quoted_strings() {
        assert_eq!(
            parse_credentials(r#"A1 LOGIN "a\"b" "c\\d""#),
            Some(("a\"b".to_string(), "c\\d".to_string()))
        );
    }
}
