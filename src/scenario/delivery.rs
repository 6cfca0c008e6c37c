//! Delivery and mailbox isolation

use crate::compose::ContainerRuntime;
use crate::config::{ImapSettings, Principal};
use crate::environment::TestEnvironment;
use crate::error::{Error, Result};
use crate::mailbox::{MailboxSession, with_session};
use crate::message::{Message, unique_token};
use crate::submission::{Ack, SubmissionDriver};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DeliveryCheck {
    pub port: u16,
    pub recipient: String,
    pub token: String,
    pub ack: Ack,
}

/// Send a tagged message to `recipient` through `port`, wait until it
/// shows up in the recipient's mailbox, then make sure no other
/// configured principal can see it.
///
/// # Errors
///
/// Submission and mailbox errors as is, [`Error::DeliveryTimeout`] when
/// the message never arrives, [`Error::Assertion`] when it leaks into
/// another mailbox.
pub async fn deliver_and_isolate<R: ContainerRuntime>(
    env: &TestEnvironment<R>,
    submission: &SubmissionDriver,
    port: u16,
    recipient: &Principal,
) -> Result<DeliveryCheck> {
    let config = env.config();
    let token = unique_token(&format!("{port}-{}", recipient.username));
    let message = Message::tagged(submission.sender(), &recipient.address, &token);

    let ack = submission.send(&message, port).await?;

    wait_for_delivery(
        &config.imap,
        recipient,
        &token,
        config.delivery_timeout,
        config.readiness.poll_interval,
    )
    .await?;

    for other in config
        .principals
        .iter()
        .filter(|p| p.username != recipient.username)
    {
        let leaked = with_session(&config.imap, other, async |session| {
            session.select().await?;
            find_token(session, &token).await
        })
        .await?;
        if leaked {
            return Err(Error::Assertion(format!(
                "message {token} for {} is visible to {}",
                recipient.address, other.username
            )));
        }
    }

    Ok(DeliveryCheck {
        port,
        recipient: recipient.address.clone(),
        token,
        ack,
    })
}

/// Re-select and scan the mailbox until `token` appears or `timeout`
/// runs out.
async fn wait_for_delivery(
    settings: &ImapSettings,
    recipient: &Principal,
    token: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let start = Instant::now();
    with_session(settings, recipient, async |session| {
        loop {
            session.select().await?;
            if find_token(session, token).await? {
                debug!("{} arrived for {} after {:?}", token, recipient.username, start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(Error::DeliveryTimeout {
                    token: token.to_string(),
                    recipient: recipient.address.clone(),
                    timeout,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
    .await
}

/// Whether any message in the selected mailbox contains `token`.
async fn find_token(session: &mut MailboxSession, token: &str) -> Result<bool> {
    for id in session.search_all().await? {
        if session.fetch(id).await?.contains(token) {
            return Ok(true);
        }
    }
    Ok(false)
}
