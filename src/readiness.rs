//! Log-sentinel readiness detection
//!
//! A container counts as ready once a sentinel string shows up in its
//! log. Each poll re-reads the whole accumulated log, so a poll never
//! depends on what an earlier poll saw.

use crate::compose::{ContainerHandle, ContainerRuntime};
use crate::error::{Error, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// What to look for, and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub sentinel: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Outcome of a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ready {
    pub elapsed: Duration,
    pub polls: u32,
}

/// Poll `container`'s log until `probe.sentinel` appears.
///
/// # Errors
///
/// [`Error::ReadinessTimeout`] when the sentinel has not appeared after
/// `probe.timeout`, including when a single log read outlasts it. Any
/// other error from reading the log is returned as is.
pub async fn await_ready<R: ContainerRuntime>(
    runtime: &R,
    container: &ContainerHandle,
    probe: &ReadinessProbe,
) -> Result<Ready> {
    let start = Instant::now();
    let mut polls = 0;

    let timed_out = || Error::ReadinessTimeout {
        sentinel: probe.sentinel.clone(),
        elapsed: start.elapsed(),
    };

    loop {
        polls += 1;
        let remaining = probe.timeout.saturating_sub(start.elapsed());
        let logs = tokio::time::timeout(remaining, runtime.logs(&container.id))
            .await
            .map_err(|_| timed_out())??;
        let elapsed = start.elapsed();

        if logs.contains(&probe.sentinel) {
            info!(
                "{} ready after {:?} ({} polls)",
                container.name, elapsed, polls
            );
            return Ok(Ready { elapsed, polls });
        }

        if elapsed >= probe.timeout {
            return Err(timed_out());
        }

        debug!("{:?} not yet in {} log", probe.sentinel, container.name);
        let remaining = probe.timeout.saturating_sub(elapsed);
        tokio::time::sleep(probe.poll_interval.min(remaining)).await;
    }
}
