//! Message submission over SMTP
//!
//! One connection per message: greeting, `EHLO`, `MAIL FROM`,
//! `RCPT TO`, `DATA`, `QUIT`. Nothing is retried; a rejected or broken
//! exchange is reported to the caller as is. The connection is owned by
//! [`SubmissionDriver::send`] and dropped on every return path.

use crate::config::SubmissionSettings;
use crate::error::{Error, Result};
use crate::message::Message;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// A complete (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    fn describe(&self) -> String {
        format!("{} {}", self.code, self.text())
    }
}

/// Server acceptance of one submitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub port: u16,
    pub recipient: String,
    /// Text of the final `250` reply to the message data.
    pub reply: String,
}

/// Submits messages to the configured host. Holds no connection state
/// between calls.
#[derive(Debug, Clone)]
pub struct SubmissionDriver {
    settings: SubmissionSettings,
}

impl SubmissionDriver {
    #[must_use]
    pub const fn new(settings: SubmissionSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn ports(&self) -> &[u16] {
        &self.settings.ports
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.settings.sender
    }

    /// Submit `message` to `message.to` through `port`.
    ///
    /// # Errors
    ///
    /// [`Error::Protocol`] when the server answers any step with an
    /// unexpected reply code, [`Error::Timeout`] when the exchange takes
    /// longer than the configured IO timeout, and IO errors as is.
    pub async fn send(&self, message: &Message, port: u16) -> Result<Ack> {
        let addr = format!("{}:{}", self.settings.host, port);
        let timeout = self.settings.io_timeout;
        debug!("Submitting to {} via {}", message.to, addr);

        let reply = tokio::time::timeout(timeout, submit_once(&addr, &self.settings.helo, message))
            .await
            .map_err(|_| timed_out(&addr, timeout))??;

        info!("Message for {} accepted on port {}", message.to, port);
        Ok(Ack {
            port,
            recipient: message.to.clone(),
            reply: reply.text(),
        })
    }
}

async fn submit_once(addr: &str, helo: &str, message: &Message) -> Result<Reply> {
    let stream = TcpStream::connect(addr).await?;
    SmtpConnection::new(stream).transact(helo, message).await
}

fn timed_out(addr: &str, after: Duration) -> Error {
    Error::Timeout {
        operation: format!("SMTP submission to {addr}"),
        after,
    }
}

struct SmtpConnection<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpConnection<S> {
    fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    async fn transact(&mut self, helo: &str, message: &Message) -> Result<Reply> {
        self.expect("greeting", 220).await?;
        self.command(&format!("EHLO {helo}"), 250).await?;
        self.command(&format!("MAIL FROM:<{}>", message.from), 250)
            .await?;
        self.command(&format!("RCPT TO:<{}>", message.to), 250).await?;
        self.command("DATA", 354).await?;

        self.write(&dot_stuff(&message.render())).await?;
        self.write(".\r\n").await?;
        let accepted = self.expect("message data", 250).await?;

        // The message is already accepted; a failed QUIT changes nothing.
        if let Err(e) = self.command("QUIT", 221).await {
            debug!("QUIT after accepted message failed: {}", e);
        }
        Ok(accepted)
    }

    async fn command(&mut self, line: &str, expected: u16) -> Result<Reply> {
        self.write(&format!("{line}\r\n")).await?;
        let verb = line.split([' ', ':']).next().unwrap_or(line);
        self.expect(verb, expected).await
    }

    async fn expect(&mut self, step: &str, expected: u16) -> Result<Reply> {
        let reply = self.read_reply(step).await?;
        if reply.code != expected {
            return Err(Error::protocol(
                step,
                expected.to_string(),
                reply.describe(),
            ));
        }
        Ok(reply)
    }

    async fn read_reply(&mut self, step: &str) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line).await? == 0 {
                return Err(Error::protocol(step, "a reply", "connection closed"));
            }
            let line = line.trim_end();
            let code = line
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| Error::protocol(step, "a reply code", line))?;
            let more = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if !more {
                return Ok(Reply { code, lines });
            }
        }
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(data.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Escape lines starting with `.` so they are not read as the end of
/// the data section.
fn dot_stuff(rendered: &str) -> String {
    let mut out = String::with_capacity(rendered.len() + 8);
    for line in rendered.split_inclusive("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}
