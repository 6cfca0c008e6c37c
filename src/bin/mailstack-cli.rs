#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for running the mailstack checks by hand

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mailstack_harness::scenario::{self, Status, SuiteReport};
use mailstack_harness::{
    ContainerRuntime, DockerCompose, HarnessConfig, Message, PackageVersion, SubmissionDriver,
    TestEnvironment, VERSION_LABEL, VersionRecord, find_service, wait_for_exit,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailstack-cli")]
#[command(about = "Drive and verify a containerized mail stack")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full scenario suite
    Run {
        /// Use an already running composition instead of starting one
        #[arg(long)]
        attach: bool,

        /// Leave the composition running afterwards
        #[arg(long)]
        keep: bool,
    },

    /// Wait for the main container to report readiness
    Ready,

    /// Submit one message
    Send {
        /// Submission port
        #[arg(long)]
        port: u16,

        /// Recipient address
        #[arg(long)]
        to: String,

        #[arg(long, default_value = "mailstack test message")]
        subject: String,

        #[arg(long, default_value = "Sent by mailstack-cli.")]
        body: String,
    },

    /// Read, flag and expunge every message of a configured principal
    Clear {
        /// Login name of the principal
        #[arg(long)]
        user: String,
    },

    /// Check the version file against the release tag and, optionally,
    /// the running containers
    Version {
        /// Also check the image label
        #[arg(long)]
        label: bool,

        /// Also check the version container's output
        #[arg(long)]
        log: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = HarnessConfig::from_env()?;

    match &args.command {
        Command::Run { attach, keep } => cmd_run(config, &args, *attach, *keep).await,
        Command::Ready => cmd_ready(config, &args).await,
        Command::Send {
            port,
            to,
            subject,
            body,
        } => cmd_send(&config, &args, *port, to, subject, body).await,
        Command::Clear { user } => cmd_clear(&config, &args, user).await,
        Command::Version { label, log } => cmd_version(config, &args, *label, *log).await,
    }
}

async fn cmd_run(config: HarnessConfig, args: &Args, attach: bool, keep: bool) -> anyhow::Result<()> {
    let runtime = DockerCompose::new(&config.composition);
    let env = if attach {
        TestEnvironment::attach(runtime, config).await?
    } else {
        TestEnvironment::setup(runtime, config).await?
    };

    let report = scenario::run_suite(&env).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !keep {
        env.teardown().await?;
    }

    if !report.passed() {
        bail!("{} scenario(s) failed", report.failures().count());
    }
    Ok(())
}

async fn cmd_ready(config: HarnessConfig, args: &Args) -> anyhow::Result<()> {
    let runtime = DockerCompose::new(&config.composition);
    let env = TestEnvironment::attach(runtime, config).await?;
    let ready = scenario::readiness_gate(&env).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ready)?);
    } else {
        println!(
            "{} ready after {:?} ({} polls)",
            env.main_container().name,
            ready.elapsed,
            ready.polls
        );
    }
    Ok(())
}

async fn cmd_send(
    config: &HarnessConfig,
    args: &Args,
    port: u16,
    to: &str,
    subject: &str,
    body: &str,
) -> anyhow::Result<()> {
    let driver = SubmissionDriver::new(config.submission.clone());
    let message = Message::new(driver.sender(), to, subject, body);
    let ack = driver.send(&message, port).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ack)?);
    } else {
        println!("Accepted on port {} for {}: {}", ack.port, ack.recipient, ack.reply);
    }
    Ok(())
}

async fn cmd_clear(config: &HarnessConfig, args: &Args, user: &str) -> anyhow::Result<()> {
    let principal = config
        .principal(user)
        .with_context(|| format!("{user} is not a configured principal"))?;
    let report = scenario::read_and_clear(&config.imap, principal, false).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Read {} message(s), removed {} for {}",
            report.read, report.removed, user
        );
    }
    Ok(())
}

async fn cmd_version(
    config: HarnessConfig,
    args: &Args,
    label: bool,
    log: bool,
) -> anyhow::Result<()> {
    let mut record = VersionRecord::new(PackageVersion::load(&config.version.version_file)?);
    record.tag.clone_from(&config.version.release_tag);

    if label || log {
        let runtime = DockerCompose::new(&config.composition);
        let main = find_service(&runtime, &config.composition.main_service).await?;
        let reporter = match &config.composition.version_service {
            Some(service) => Some(find_service(&runtime, service).await?),
            None => None,
        };
        if label {
            let labelled = reporter.as_ref().unwrap_or(&main);
            record.label = runtime.labels(&labelled.id).await?.get(VERSION_LABEL).cloned();
            if record.label.is_none() {
                bail!("no {VERSION_LABEL} label on {}", labelled.name);
            }
        }
        if log {
            let reporter = reporter.context("no version service configured")?;
            wait_for_exit(&runtime, &reporter, config.composition.exit_timeout).await?;
            record.log = Some(runtime.logs(&reporter.id).await?.trim().to_string());
        }
    }

    let verdict = record.verify();
    if args.json {
        let output = json!({
            "record": record,
            "agreed": verdict.is_ok(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", record.summary());
    }
    verdict?;
    Ok(())
}

fn print_report(report: &SuiteReport) {
    for outcome in &report.outcomes {
        let (mark, text) = match &outcome.status {
            Status::Passed { detail } => ("PASS", detail),
            Status::Failed { cause } => ("FAIL", cause),
            Status::Skipped { reason } => ("SKIP", reason),
        };
        println!("{mark:<5} {:<45} {}", truncate(&outcome.name, 44), text);
    }

    let failed = report.failures().count();
    println!(
        "\n{} scenario(s), {} failed",
        report.outcomes.len(),
        failed
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
