//! In-memory `ContainerRuntime` for exercising the harness without
//! docker.
//!
//! ```ignore
//! let runtime = FakeRuntime::new()
//!     .running("postfix", "postfix: daemon started\n")
//!     .exited("version", 0, "3.2.1\n")
//!     .label("version", VERSION_LABEL, "3.2.1");
//! ```
//!
//! A container's log can grow over time with `.log_after(..)`, which
//! makes the text visible only once the given number of `logs` calls
//! have been made.

use mailstack_harness::{ContainerHandle, ContainerRuntime, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct FakeContainer {
    handle: ContainerHandle,
    log: String,
    /// Text appended once `logs` has been called this many times.
    late_log: Option<(usize, String)>,
    labels: HashMap<String, String>,
    /// `None` keeps `wait` pending forever.
    exit_code: Option<i64>,
}

/// `up`/`down` call counts, shared so they outlive a consumed runtime.
#[derive(Debug, Default)]
pub struct Counters {
    up: AtomicUsize,
    down: AtomicUsize,
}

impl Counters {
    pub fn up(&self) -> usize {
        self.up.load(Ordering::SeqCst)
    }

    pub fn down(&self) -> usize {
        self.down.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    containers: Vec<FakeContainer>,
    log_calls: Mutex<HashMap<String, usize>>,
    counters: Arc<Counters>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, service: &str, state: &str, exit_code: Option<i64>, log: &str) -> Self {
        let n = self.containers.len() + 1;
        self.containers.push(FakeContainer {
            handle: ContainerHandle {
                id: format!("{service}-id-{n}"),
                name: format!("stack-{service}-{n}"),
                service: service.to_string(),
                state: state.to_string(),
                exit_code: if state == "running" { None } else { exit_code },
            },
            log: log.to_string(),
            late_log: None,
            labels: HashMap::new(),
            exit_code,
        });
        self
    }

    /// A long-running container that never exits.
    pub fn running(self, service: &str, log: &str) -> Self {
        self.add(service, "running", None, log)
    }

    /// A container that already exited with `code`.
    pub fn exited(self, service: &str, code: i64, log: &str) -> Self {
        self.add(service, "exited", Some(code), log)
    }

    pub fn label(mut self, service: &str, key: &str, value: &str) -> Self {
        self.container_mut(service)
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Append `text` to `service`'s log from the `after`-th poll on.
    pub fn log_after(mut self, service: &str, after: usize, text: &str) -> Self {
        self.container_mut(service).late_log = Some((after, text.to_string()));
        self
    }

    fn container_mut(&mut self, service: &str) -> &mut FakeContainer {
        self.containers
            .iter_mut()
            .find(|c| c.handle.service == service)
            .expect("unknown service")
    }

    fn by_id(&self, id: &str) -> Result<&FakeContainer> {
        self.containers
            .iter()
            .find(|c| c.handle.id == id)
            .ok_or_else(|| Error::Composition(format!("no such container: {id}")))
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn up(&self) -> Result<()> {
        self.counters.up.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.counters.down.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_containers(
        &self,
        services: &[&str],
        include_stopped: bool,
    ) -> Result<Vec<ContainerHandle>> {
        Ok(self
            .containers
            .iter()
            .map(|c| &c.handle)
            .filter(|h| services.is_empty() || services.contains(&h.service.as_str()))
            .filter(|h| include_stopped || h.is_running())
            .cloned()
            .collect())
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let container = self.by_id(id)?;
        let calls = {
            let mut log_calls = self.log_calls.lock().unwrap();
            let calls = log_calls.entry(id.to_string()).or_default();
            *calls += 1;
            *calls
        };
        let mut log = container.log.clone();
        if let Some((after, text)) = &container.late_log
            && calls >= *after
        {
            log.push_str(text);
        }
        Ok(log)
    }

    async fn labels(&self, id: &str) -> Result<HashMap<String, String>> {
        Ok(self.by_id(id)?.labels.clone())
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        match self.by_id(id)?.exit_code {
            Some(code) => Ok(code),
            None => std::future::pending().await,
        }
    }
}
