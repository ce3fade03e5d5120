use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use kube_status::{
    ConditionTable, Event, KubeClusterReader, ObjectIdentifier, Outcome, PollInterval,
    PollOptions, RegistryBuilder, ResourceStatus, StatusPoller, StopCondition,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};

const EXIT_COMPLETED: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 2;
const EXIT_DEADLINE_EXCEEDED: i32 = 3;
const EXIT_USAGE: i32 = 64;

/// Waits until Kubernetes objects reach the desired status
#[derive(Parser, Debug)]
#[command(name = "kstatus")]
struct Args {
    /// Objects as group/Kind/namespace/name, e.g. apps/Deployment/default/web
    identifiers: Vec<String>,
    /// Manifest files; every document in them is tracked
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,
    #[arg(long, value_enum, default_value = "current")]
    poll_until: PollUntil,
    #[arg(long, default_value_t = 2000)]
    poll_interval_ms: u64,
    /// Give up after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Maximum number of parallel lookups
    #[arg(long)]
    concurrency: Option<usize>,
    /// YAML file with condition rules for kinds without dedicated evaluator
    #[arg(long)]
    conditions: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "text")]
    output: Output,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PollUntil {
    /// All objects are Current
    Current,
    /// All objects are gone
    Deleted,
    /// No object is InProgress
    Settled,
    /// Until interrupted
    Forever,
}

impl PollUntil {
    fn stop_condition(self) -> StopCondition {
        match self {
            PollUntil::Current => StopCondition::AllCurrent,
            PollUntil::Deleted => StopCondition::AllNotFound,
            PollUntil::Settled => StopCondition::NoneInProgress,
            PollUntil::Forever => StopCondition::Forever,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Output {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            std::process::exit(code);
        }
    };
    let identifiers = match collect_identifiers(&args) {
        Ok(ids) => ids,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(EXIT_USAGE);
        }
    };
    let code = match run(&args, identifiers).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            EXIT_FAILED
        }
    };
    std::process::exit(code);
}

fn collect_identifiers(args: &Args) -> anyhow::Result<Vec<ObjectIdentifier>> {
    let mut identifiers = Vec::new();
    for s in &args.identifiers {
        identifiers.push(s.parse::<ObjectIdentifier>()?);
    }
    for path in &args.files {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for document in serde_yaml::Deserializer::from_str(&data) {
            let value = serde_json::Value::deserialize(document)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            if value.is_null() {
                continue;
            }
            let id = ObjectIdentifier::from_object(&value)
                .with_context(|| format!("invalid object in {}", path.display()))?;
            identifiers.push(id);
        }
    }
    if identifiers.is_empty() {
        anyhow::bail!("no objects given, pass identifiers or --file");
    }
    identifiers.sort();
    identifiers.dedup();
    Ok(identifiers)
}

async fn run(args: &Args, identifiers: Vec<ObjectIdentifier>) -> anyhow::Result<i32> {
    let mut registry = RegistryBuilder::with_defaults();
    if let Some(path) = &args.conditions {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        registry = registry.conditions(ConditionTable::from_yaml(&data)?);
    }

    tracing::info!("Connecting to kube");
    let reader = KubeClusterReader::try_default().await?;
    let poller = StatusPoller::new(Arc::new(reader), registry.build());
    let options = PollOptions {
        stop_condition: Some(args.poll_until.stop_condition()),
        interval: Some(PollInterval::Fixed(Duration::from_millis(args.poll_interval_ms))),
        concurrency: args.concurrency,
        timeout: args.timeout_secs.map(Duration::from_secs),
        ..Default::default()
    };
    let mut events = poller.poll(identifiers, options)?;

    let cancel = events.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            cancel.cancel();
        }
    });

    let mut outcome = None;
    while let Some(event) = events.next().await {
        match args.output {
            Output::Text => print_text(&event),
            Output::Json => print_json(&event)?,
        }
        if let Event::Finished(o) = event {
            outcome = Some(o);
        }
    }
    Ok(exit_code(outcome.as_ref()))
}

/// Stream which ended without `Finished` is a failure
fn exit_code(outcome: Option<&Outcome>) -> i32 {
    match outcome {
        Some(Outcome::Completed) => EXIT_COMPLETED,
        Some(Outcome::Cancelled) => EXIT_CANCELLED,
        Some(Outcome::DeadlineExceeded) => EXIT_DEADLINE_EXCEEDED,
        Some(Outcome::Failed(_)) | None => EXIT_FAILED,
    }
}

fn print_text(event: &Event) {
    match event {
        Event::ResourceUpdate { status, .. } => {
            let mut line = format!("{}: {}", status.identifier, status.status);
            if !status.message.is_empty() {
                line.push_str(" - ");
                line.push_str(&status.message);
            }
            println!("{}", line);
        }
        Event::Aggregate { aggregate, .. } => {
            let counts = aggregate
                .counts
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(s, n)| format!("{}: {}", s, n))
                .collect::<Vec<_>>();
            println!("all: {} ({})", aggregate.status, counts.join(", "));
        }
        Event::Error {
            error,
            consecutive_failures,
            ..
        } => {
            println!("error (attempt {}): {:#}", consecutive_failures, error);
        }
        Event::Finished(outcome) => println!("finished: {}", outcome),
    }
}

/// One line of JSON output
#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    #[serde(rename = "type")]
    type_: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<&'a ObjectIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<serde_json::Map<String, serde_json::Value>>,
}

impl<'a> JsonLine<'a> {
    fn new(type_: &'static str, cycle: Option<u64>) -> Self {
        JsonLine {
            timestamp: chrono::Utc::now().to_rfc3339(),
            type_,
            cycle,
            identifier: None,
            status: None,
            message: None,
            counts: None,
        }
    }

    fn resource(cycle: u64, status: &'a ResourceStatus) -> Self {
        JsonLine {
            identifier: Some(&status.identifier),
            status: Some(status.status.into()),
            message: Some(status.message.clone()),
            ..JsonLine::new("resource", Some(cycle))
        }
    }
}

fn print_json(event: &Event) -> anyhow::Result<()> {
    let line = match event {
        Event::ResourceUpdate { cycle, status } => JsonLine::resource(*cycle, status),
        Event::Aggregate { cycle, aggregate } => JsonLine {
            status: Some(aggregate.status.into()),
            counts: Some(
                aggregate
                    .counts
                    .iter()
                    .map(|(s, n)| (s.to_string(), serde_json::Value::from(*n)))
                    .collect(),
            ),
            ..JsonLine::new("aggregate", Some(*cycle))
        },
        Event::Error { cycle, error, .. } => JsonLine {
            message: Some(format!("{:#}", error)),
            ..JsonLine::new("error", Some(*cycle))
        },
        Event::Finished(outcome) => JsonLine {
            message: Some(outcome.to_string()),
            ..JsonLine::new("finished", None)
        },
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
