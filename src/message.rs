//! Test messages
//!
//! A [`Message`] is what the harness submits. The harness never learns
//! a server-side identifier for it, so scenarios find it again by a
//! unique token embedded in the subject and body.

use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Message {
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// A message whose subject and body both carry `token`.
    #[must_use]
    pub fn tagged(from: &str, to: &str, token: &str) -> Self {
        Self::new(
            from,
            to,
            format!("mailstack delivery check {token}"),
            format!("This message was sent by the mailstack harness.\nToken: {token}\n"),
        )
    }

    /// Render as an RFC 5322 message with CRLF line endings.
    #[must_use]
    pub fn render(&self) -> String {
        let date = Utc::now().to_rfc2822();
        let body = normalize_newlines(&self.body);
        format!(
            "From: {}\r\n\
             To: {}\r\n\
             Subject: {}\r\n\
             Date: {date}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             {body}",
            self.from, self.to, self.subject
        )
    }
}

/// Make a token unlikely to collide with anything already in a mailbox.
#[must_use]
pub fn unique_token(label: &str) -> String {
    format!("{label}-{}", Utc::now().format("%Y%m%dT%H%M%S%.9f"))
}

fn normalize_newlines(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\n', "\r\n");
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}
