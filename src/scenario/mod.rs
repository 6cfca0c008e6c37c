//! End-to-end verification scenarios
//!
//! Each scenario takes the [`TestEnvironment`] by reference and returns
//! a plain `Result`. [`run_suite`] runs them in the one order that
//! matters (delivery before read-and-clear, readiness before any
//! protocol traffic) and collects a [`SuiteReport`].
//!
//! Scenarios that mutate a mailbox (delivery, read-and-clear) must not
//! run concurrently against the same principal.

mod auth;
mod cleanup;
mod delivery;
mod lifecycle;
mod version;

pub use auth::{AuthCase, ExpectedResult, FailureKind, check_auth_case};
pub use cleanup::{ClearReport, read_and_clear};
pub use delivery::{DeliveryCheck, deliver_and_isolate};
pub use lifecycle::{composition_shape, readiness_gate, version_reporter_exit};
pub use version::version_agreement;

use crate::compose::ContainerRuntime;
use crate::environment::TestEnvironment;
use crate::error::Result;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Status {
    Passed { detail: String },
    Failed { cause: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: Status,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SuiteReport {
    /// True when nothing failed. Skipped scenarios do not count against
    /// the suite.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, Status::Failed { .. }))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScenarioOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    fn record(&mut self, name: impl Into<String>, result: Result<String>) -> bool {
        let name = name.into();
        let status = match result {
            Ok(detail) => {
                info!("PASS {}: {}", name, detail);
                Status::Passed { detail }
            }
            Err(e) => {
                warn!("FAIL {}: {}", name, e);
                Status::Failed {
                    cause: e.to_string(),
                }
            }
        };
        let passed = matches!(status, Status::Passed { .. });
        self.outcomes.push(ScenarioOutcome { name, status });
        passed
    }

    fn skip(&mut self, name: impl Into<String>, reason: &str) {
        let name = name.into();
        info!("SKIP {}: {}", name, reason);
        self.outcomes.push(ScenarioOutcome {
            name,
            status: Status::Skipped {
                reason: reason.to_string(),
            },
        });
    }
}

/// Run every scenario against `env` in dependency order.
pub async fn run_suite<R: ContainerRuntime>(env: &TestEnvironment<R>) -> SuiteReport {
    let config = env.config();
    let mut report = SuiteReport::default();

    report.record(
        "composition shape",
        composition_shape(env)
            .await
            .map(|n| format!("{n} containers")),
    );

    let ready = report.record(
        "readiness gate",
        readiness_gate(env)
            .await
            .map(|r| format!("ready after {:?} ({} polls)", r.elapsed, r.polls)),
    );

    match version_reporter_exit(env).await {
        Ok(None) => report.skip("version reporter exit", "topology has no version container"),
        result => {
            report.record(
                "version reporter exit",
                result.map(|code| format!("exit code {}", code.unwrap_or_default())),
            );
        }
    }

    if ready {
        let submission = env.submission();
        for &port in submission.ports() {
            for recipient in &config.principals {
                let result = deliver_and_isolate(env, &submission, port, recipient).await;
                report.record(
                    delivery_name(port, &recipient.address),
                    result.map(|c| format!("token {} delivered ({})", c.token, c.ack.reply)),
                );
            }
        }

        for case in AuthCase::matrix(&config.principals) {
            let result = check_auth_case(&config.imap, &case).await;
            report.record(
                format!("auth {}", case.label),
                result.map(|()| format!("{:?} as expected", case.expected)),
            );
        }

        for principal in &config.principals {
            let result = read_and_clear(&config.imap, principal, true).await;
            report.record(
                format!("read and clear {}", principal.username),
                result.map(|r| {
                    format!(
                        "read {} messages, expunged {}, then {}",
                        r.read, r.removed, r.second_expunge
                    )
                }),
            );
        }
    } else {
        for name in protocol_scenario_names(env) {
            report.skip(name, "readiness gate failed");
        }
    }

    report.record(
        "version agreement",
        version_agreement(env).await.map(|record| record.summary()),
    );

    report
}

fn delivery_name(port: u16, address: &str) -> String {
    format!("delivery port {port} -> {address}")
}

fn protocol_scenario_names<R: ContainerRuntime>(env: &TestEnvironment<R>) -> Vec<String> {
    let config = env.config();
    let deliveries = config.submission.ports.iter().flat_map(|&port| {
        config
            .principals
            .iter()
            .map(move |p| delivery_name(port, &p.address))
    });
    let auth = AuthCase::matrix(&config.principals)
        .into_iter()
        .map(|case| format!("auth {}", case.label));
    let clears = config
        .principals
        .iter()
        .map(|p| format!("read and clear {}", p.username));
    deliveries.chain(auth).chain(clears).collect()
}
