//! Authentication boundary, as a table of expected outcomes

use crate::config::{ImapSettings, Principal};
use crate::error::{Error, Result};
use crate::mailbox::MailboxSession;
use tracing::debug;

/// The kinds of failure a case can expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedResult {
    Success,
    ExpectedFailure(FailureKind),
}

#[derive(Debug, Clone)]
pub struct AuthCase {
    pub label: String,
    pub username: String,
    pub password: String,
    pub expected: ExpectedResult,
}

impl AuthCase {
    /// For every principal: the right credentials, a wrong password, an
    /// unknown user with the right password, and an empty password.
    #[must_use]
    pub fn matrix(principals: &[Principal]) -> Vec<Self> {
        let rejected = ExpectedResult::ExpectedFailure(FailureKind::Auth);
        principals
            .iter()
            .flat_map(|p| {
                [
                    Self {
                        label: format!("{} correct credentials", p.username),
                        username: p.username.clone(),
                        password: p.password.clone(),
                        expected: ExpectedResult::Success,
                    },
                    Self {
                        label: format!("{} wrong password", p.username),
                        username: p.username.clone(),
                        password: format!("{}-wrong", p.password),
                        expected: rejected,
                    },
                    Self {
                        label: format!("{} unknown user", p.username),
                        username: format!("{}-unknown", p.username),
                        password: p.password.clone(),
                        expected: rejected,
                    },
                    Self {
                        label: format!("{} empty password", p.username),
                        username: p.username.clone(),
                        password: String::new(),
                        expected: rejected,
                    },
                ]
            })
            .collect()
    }

    fn principal(&self) -> Principal {
        Principal {
            username: self.username.clone(),
            password: self.password.clone(),
            address: String::new(),
        }
    }
}

/// Attempt the login described by `case` and compare with its
/// expectation.
///
/// # Errors
///
/// [`Error::Assertion`] when a login that should fail succeeds; the
/// login error itself when a login that should succeed fails, or fails
/// for a reason other than the expected one.
pub async fn check_auth_case(settings: &ImapSettings, case: &AuthCase) -> Result<()> {
    let attempt = MailboxSession::login(settings, &case.principal()).await;

    match (case.expected, attempt) {
        (ExpectedResult::Success, Ok(session)) => session.logout().await,
        (ExpectedResult::Success, Err(e)) => Err(e),
        (ExpectedResult::ExpectedFailure(FailureKind::Auth), Ok(session)) => {
            session.logout().await.ok();
            Err(Error::Assertion(format!(
                "login as {:?} ({}) succeeded but should have been rejected",
                case.username, case.label
            )))
        }
        (ExpectedResult::ExpectedFailure(FailureKind::Auth), Err(e)) if e.is_auth() => {
            debug!("{} rejected as expected: {}", case.label, e);
            Ok(())
        }
        (ExpectedResult::ExpectedFailure(FailureKind::Auth), Err(e)) => Err(e),
    }
}
