//! Fake SMTP submission server for integration testing
//!
//! Plaintext, no AUTH. Accepts a message for any address known to the
//! shared store and appends it to that account's INBOX the moment the
//! DATA terminator arrives, so a later IMAP session sees it at once.
//!
//! ```text
//!   S: 220 fake.test ESMTP ready
//!   C: EHLO client          S: 250-fake.test / 250 8BITMIME
//!   C: MAIL FROM:<a@b>      S: 250 OK
//!   C: RCPT TO:<c@d>        S: 250 OK | 550 5.1.1 No such user
//!   C: DATA                 S: 354 End data with <CR><LF>.<CR><LF>
//!   C: ... .                S: 250 2.0.0 Ok: queued as N
//!   C: QUIT                 S: 221 Bye
//! ```

use crate::fake_imap::SharedStore;
use crate::fake_imap::io::write_line;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;

pub struct FakeSmtpServer {
    port: u16,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeSmtpServer {
    /// Start a server on an OS-assigned port delivering into `store`.
    pub async fn start(store: SharedStore) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut queued = 0_u32;
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                queued += 1000;
                let store = store.clone();
                tokio::spawn(async move {
                    handle_smtp_session(BufReader::new(stream), &store, queued).await;
                });
            }
        });

        Self {
            port,
            _handle: handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }
}

/// Envelope collected for the current transaction.
#[derive(Debug, Default)]
struct Envelope {
    from: Option<String>,
    recipients: Vec<String>,
}

async fn handle_smtp_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: BufReader<S>,
    store: &SharedStore,
    mut queue_id: u32,
) {
    if write_line(&mut stream, "220 fake.test ESMTP ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    let mut envelope = Envelope::default();
    loop {
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let command = line.trim_end();
        let verb = command
            .split([' ', ':'])
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        let reply = match verb.as_str() {
            "EHLO" | "HELO" => {
                envelope = Envelope::default();
                "250-fake.test\r\n250 8BITMIME\r\n".to_string()
            }
            "MAIL" => {
                envelope = Envelope {
                    from: Some(path_argument(command)),
                    recipients: Vec::new(),
                };
                "250 OK\r\n".to_string()
            }
            "RCPT" if envelope.from.is_none() => "503 5.5.1 MAIL first\r\n".to_string(),
            "RCPT" => {
                let recipient = path_argument(command);
                if store.lock().unwrap().knows_address(&recipient) {
                    envelope.recipients.push(recipient);
                    "250 OK\r\n".to_string()
                } else {
                    "550 5.1.1 No such user\r\n".to_string()
                }
            }
            "DATA" if envelope.recipients.is_empty() => {
                "554 5.5.1 No valid recipients\r\n".to_string()
            }
            "DATA" => {
                if write_line(&mut stream, "354 End data with <CR><LF>.<CR><LF>\r\n")
                    .await
                    .is_err()
                {
                    break;
                }
                let Some(raw) = read_data(&mut stream).await else {
                    break;
                };
                {
                    let mut guard = store.lock().unwrap();
                    for recipient in &envelope.recipients {
                        guard.deliver(recipient, &raw);
                    }
                }
                envelope = Envelope::default();
                queue_id += 1;
                format!("250 2.0.0 Ok: queued as {queue_id}\r\n")
            }
            "RSET" => {
                envelope = Envelope::default();
                "250 OK\r\n".to_string()
            }
            "NOOP" => "250 OK\r\n".to_string(),
            "QUIT" => {
                let _ = write_line(&mut stream, "221 2.0.0 Bye\r\n").await;
                break;
            }
            _ => "502 5.5.2 Command not recognized\r\n".to_string(),
        };

        if write_line(&mut stream, &reply).await.is_err() {
            break;
        }
    }
}

/// The address between `<` and `>` in `MAIL FROM:<..>` or `RCPT TO:<..>`.
fn path_argument(command: &str) -> String {
    command
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(path, _)| path.to_string())
        .unwrap_or_default()
}

/// Read message data up to the lone `.` line, undoing dot-stuffing.
async fn read_data<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut BufReader<S>) -> Option<Vec<u8>> {
    let mut raw = Vec::new();
    loop {
        let mut line = String::new();
        if stream.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        if line == ".\r\n" || line == ".\n" {
            return Some(raw);
        }
        let unstuffed = line.strip_prefix('.').unwrap_or(&line);
        raw.extend_from_slice(unstuffed.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_path_from_envelope_commands() {
        assert_eq!(path_argument("MAIL FROM:<a@example.com>"), "a@example.com");
        assert_eq!(path_argument("RCPT TO:<b@example.com> NOTIFY=NEVER"), "b@example.com");
        assert_eq!(path_argument("RCPT TO:"), "");
    }
}
