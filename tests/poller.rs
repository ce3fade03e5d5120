use async_trait::async_trait;
use futures::StreamExt;
use kube_status::{
    BackoffPolicy, EngineState, Event, GroupKind, ObjectIdentifier, Outcome, PollInterval,
    PollOptions, ReadError, RegistryBuilder, Snapshot, Status, StatusPoller, StopCondition,
};
use serde_json::{json, Value};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::Instant;

#[derive(Clone)]
enum Step {
    Found(Value),
    Absent,
    ResourceError,
    Systemic,
    /// Lookup never returns
    Hang,
}

/// Replays scripted lookup results; the last step of a script repeats forever.
struct ScriptedReader {
    scripts: Mutex<HashMap<ObjectIdentifier, VecDeque<Step>>>,
    batching: bool,
    /// Every `list` call ends with this step instead of listing objects
    list_failure: Option<Step>,
    gets: AtomicUsize,
    lists: AtomicUsize,
    /// When each `get` was called
    started: Mutex<Vec<Instant>>,
}

impl ScriptedReader {
    fn new() -> Self {
        ScriptedReader {
            scripts: Mutex::new(HashMap::new()),
            batching: false,
            list_failure: None,
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    fn batching() -> Self {
        ScriptedReader {
            batching: true,
            ..ScriptedReader::new()
        }
    }

    fn failing_lists(self, step: Step) -> Self {
        ScriptedReader {
            list_failure: Some(step),
            ..self
        }
    }

    /// Delays between consecutive `get` calls
    fn gaps(&self) -> Vec<Duration> {
        let started = self.started.lock().unwrap();
        started.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn script(self, id: &ObjectIdentifier, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.clone(), steps.into_iter().collect());
        self
    }

    fn next_step(&self, id: &ObjectIdentifier) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(id) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or(Step::Absent),
            None => Step::Absent,
        }
    }
}

async fn perform(step: Step) -> Result<Option<Snapshot>, ReadError> {
    match step {
        Step::Found(v) => Ok(Some(Snapshot::new(v))),
        Step::Absent => Ok(None),
        Step::ResourceError => Err(ReadError::Resource(anyhow::anyhow!(
            "resource type is unknown"
        ))),
        Step::Systemic => Err(ReadError::Systemic(anyhow::anyhow!("connection refused"))),
        Step::Hang => {
            futures::future::pending::<()>().await;
            unreachable!()
        }
    }
}

#[async_trait]
impl kube_status::ClusterReader for ScriptedReader {
    async fn get(&self, id: &ObjectIdentifier) -> Result<Option<Snapshot>, ReadError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());
        let step = self.next_step(id);
        perform(step).await
    }

    fn supports_batching(&self) -> bool {
        self.batching
    }

    async fn list(
        &self,
        kind: &GroupKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Snapshot>, ReadError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = &self.list_failure {
            perform(step.clone()).await?;
        }
        let ids = {
            let scripts = self.scripts.lock().unwrap();
            scripts
                .keys()
                .filter(|id| &id.group_kind() == kind && id.namespace() == namespace)
                .cloned()
                .collect::<Vec<_>>()
        };
        let mut objects = vec![config_map(namespace.unwrap_or_default(), "unrelated")];
        for id in ids {
            if let Some(snapshot) = perform(self.next_step(&id)).await? {
                objects.push(snapshot);
            }
        }
        Ok(objects)
    }
}

fn deployment_id() -> ObjectIdentifier {
    ObjectIdentifier::new("apps", "Deployment", "default", "web")
}

fn config_map_id(name: &str) -> ObjectIdentifier {
    ObjectIdentifier::new("", "ConfigMap", "default", name)
}

fn config_map(namespace: &str, name: &str) -> Snapshot {
    Snapshot::new(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": namespace},
        "data": {"key": "value"},
    }))
}

fn deployment(generation: i64, observed: i64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "web", "namespace": "default", "generation": generation},
        "spec": {"replicas": 1},
        "status": {
            "observedGeneration": observed,
            "replicas": 1,
            "updatedReplicas": 1,
            "readyReplicas": 1,
            "availableReplicas": 1,
        },
    })
}

fn poller(reader: ScriptedReader) -> StatusPoller {
    StatusPoller::new(Arc::new(reader), RegistryBuilder::with_defaults().build())
}

fn every(millis: u64) -> Option<PollInterval> {
    Some(PollInterval::Fixed(Duration::from_millis(millis)))
}

/// Short description of an event for comparisons
fn describe(event: &Event) -> String {
    match event {
        Event::ResourceUpdate { cycle, status } => {
            format!("{} {} {}", cycle, status.identifier.name, status.status)
        }
        Event::Aggregate { cycle, aggregate } => {
            format!("{} aggregate {}", cycle, aggregate.status)
        }
        Event::Error {
            cycle,
            consecutive_failures,
            ..
        } => format!("{} error {}", cycle, consecutive_failures),
        Event::Finished(outcome) => format!("finished {}", outcome),
    }
}

#[tokio::test(start_paused = true)]
async fn deployment_becomes_current() {
    let reader = ScriptedReader::new().script(
        &deployment_id(),
        vec![Step::Found(deployment(2, 1)), Step::Found(deployment(2, 2))],
    );
    let stream = poller(reader)
        .poll(
            vec![deployment_id()],
            PollOptions {
                interval: every(1000),
                ..Default::default()
            },
        )
        .unwrap();
    let state = stream.state_changes();
    let events = stream.collect::<Vec<_>>().await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec![
            "1 web InProgress",
            "1 aggregate InProgress",
            "2 web Current",
            "2 aggregate Current",
            "finished completed",
        ]
    );
    match &events[0] {
        Event::ResourceUpdate { status, .. } => {
            assert_eq!(
                status.message,
                "Deployment generation is 2, but latest observed generation is 1"
            );
            assert!(status.resource.is_some());
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(*state.borrow(), EngineState::Completed);
}

#[tokio::test(start_paused = true)]
async fn config_map_is_current_on_first_cycle() {
    let reader = ScriptedReader::new().script(
        &config_map_id("cfg"),
        vec![Step::Found(config_map("default", "cfg").into_value())],
    );
    let events = poller(reader)
        .poll(vec![config_map_id("cfg")], PollOptions::default())
        .unwrap()
        .collect::<Vec<_>>()
        .await;
    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec!["1 cfg Current", "1 aggregate Current", "finished completed"]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_pod_times_out() {
    let pod = ObjectIdentifier::new("", "Pod", "default", "p");
    let reader = ScriptedReader::new().script(&pod, vec![Step::Absent]);
    let stream = poller(reader)
        .poll(
            vec![pod],
            PollOptions {
                interval: every(2000),
                timeout: Some(Duration::from_secs(10)),
                ..Default::default()
            },
        )
        .unwrap();
    let state = stream.state_changes();
    let events = stream.collect::<Vec<_>>().await;

    let updates = events
        .iter()
        .filter(|e| matches!(e, Event::ResourceUpdate { .. }))
        .count();
    assert_eq!(updates, 1, "status did not change, so only one update");
    assert_eq!(describe(&events[0]), "1 p NotFound");
    let aggregates = events
        .iter()
        .filter(|e| match e {
            Event::Aggregate { aggregate, .. } => aggregate.status == Status::NotFound,
            _ => false,
        })
        .count();
    assert!(aggregates >= 5, "{} aggregates", aggregates);
    assert!(matches!(
        events.last(),
        Some(Event::Finished(Outcome::DeadlineExceeded))
    ));
    assert_eq!(*state.borrow(), EngineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn systemic_errors_fail_the_run() {
    let reader = ScriptedReader::new().script(&config_map_id("cfg"), vec![Step::Systemic]);
    let stream = poller(reader)
        .poll(
            vec![config_map_id("cfg")],
            PollOptions {
                max_consecutive_failures: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
    let state = stream.state_changes();
    let events = stream.collect::<Vec<_>>().await;

    assert_eq!(
        events[..3].iter().map(describe).collect::<Vec<_>>(),
        vec!["1 error 1", "2 error 2", "3 error 3"]
    );
    assert_eq!(events.len(), 4);
    match &events[3] {
        Event::Finished(Outcome::Failed(err)) => {
            assert!(format!("{:#}", err).contains("connection refused"))
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(*state.borrow(), EngineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn systemic_error_is_forgotten_after_success() {
    let reader = ScriptedReader::new().script(
        &config_map_id("cfg"),
        vec![
            Step::Systemic,
            Step::Systemic,
            Step::Absent,
            Step::Systemic,
            Step::Systemic,
            Step::Found(config_map("default", "cfg").into_value()),
        ],
    );
    let events = poller(reader)
        .poll(
            vec![config_map_id("cfg")],
            PollOptions {
                max_consecutive_failures: Some(2),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;
    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec![
            "1 error 1",
            "2 error 2",
            "3 cfg NotFound",
            "3 aggregate NotFound",
            "4 error 1",
            "5 error 2",
            "6 cfg Current",
            "6 aggregate Current",
            "finished completed",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn lookup_failure_affects_only_its_resource() {
    let reader = ScriptedReader::new()
        .script(
            &config_map_id("a"),
            vec![Step::Found(config_map("default", "a").into_value())],
        )
        .script(&config_map_id("b"), vec![Step::ResourceError]);
    let events = poller(reader)
        .poll(
            vec![config_map_id("b"), config_map_id("a")],
            PollOptions {
                stop_condition: Some(StopCondition::custom(|_| true)),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec![
            "1 a Current",
            "1 b Unknown",
            "1 aggregate Unknown",
            "finished completed",
        ]
    );
    match &events[1] {
        Event::ResourceUpdate { status, .. } => {
            assert!(status.error.is_some());
            assert!(status.message.contains("resource type is unknown"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_skips_unfinished_lookups() {
    let reader = ScriptedReader::new()
        .script(
            &config_map_id("a"),
            vec![Step::Found(config_map("default", "a").into_value())],
        )
        .script(&config_map_id("b"), vec![Step::Hang]);
    let stream = poller(reader)
        .poll(
            vec![config_map_id("a"), config_map_id("b")],
            PollOptions {
                concurrency: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
    let state = stream.state_changes();

    // let the first cycle start, `a` returns and `b` hangs
    tokio::time::sleep(Duration::from_millis(100)).await;
    stream.cancel();
    let events = stream.collect::<Vec<_>>().await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec!["1 a Current", "finished cancelled"]
    );
    assert_eq!(*state.borrow(), EngineState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn dropping_stream_cancels_run() {
    let reader = ScriptedReader::new().script(&config_map_id("a"), vec![Step::Absent]);
    let mut stream = poller(reader)
        .poll(
            vec![config_map_id("a")],
            PollOptions {
                stop_condition: Some(StopCondition::Forever),
                ..Default::default()
            },
        )
        .unwrap();
    let mut state = stream.state_changes();
    assert!(stream.next().await.is_some());
    assert_eq!(stream.state(), EngineState::Running);
    drop(stream);

    state
        .wait_for(|s| *s == EngineState::Cancelled)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn batched_results_are_attributed_by_name() {
    let reader = Arc::new(
        ScriptedReader::batching()
            .script(
                &config_map_id("a"),
                vec![Step::Found(config_map("default", "a").into_value())],
            )
            .script(&config_map_id("b"), vec![Step::Absent]),
    );
    let poller = StatusPoller::new(reader.clone(), RegistryBuilder::with_defaults().build());
    let events = poller
        .poll(
            vec![config_map_id("a"), config_map_id("b")],
            PollOptions {
                stop_condition: Some(StopCondition::NoneInProgress),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec![
            "1 a Current",
            "1 b NotFound",
            "1 aggregate NotFound",
            "finished completed",
        ]
    );
    assert_eq!(reader.gets.load(Ordering::SeqCst), 0);
    assert_eq!(reader.lists.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_list_marks_every_member_unknown() {
    let reader = ScriptedReader::batching()
        .script(&config_map_id("a"), vec![Step::Absent])
        .script(&config_map_id("b"), vec![Step::Absent])
        .failing_lists(Step::ResourceError);
    let events = poller(reader)
        .poll(
            vec![config_map_id("a"), config_map_id("b")],
            PollOptions {
                stop_condition: Some(StopCondition::custom(|_| true)),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec![
            "1 a Unknown",
            "1 b Unknown",
            "1 aggregate Unknown",
            "finished completed",
        ]
    );
    for event in &events[..2] {
        match event {
            Event::ResourceUpdate { status, .. } => {
                assert!(status.error.is_some());
                assert_eq!(status.message, "resource type is unknown");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn systemic_list_failure_discards_cycle() {
    let reader = ScriptedReader::batching()
        .script(&config_map_id("a"), vec![Step::Absent])
        .script(&config_map_id("b"), vec![Step::Absent])
        .failing_lists(Step::Systemic);
    let events = poller(reader)
        .poll(
            vec![config_map_id("a"), config_map_id("b")],
            PollOptions {
                max_consecutive_failures: Some(0),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec!["1 error 1", "finished failed: connection refused"]
    );
}

#[tokio::test(start_paused = true)]
async fn backoff_interval_resets_on_change() {
    let reader = Arc::new(ScriptedReader::new().script(
        &config_map_id("a"),
        vec![
            Step::Absent,
            Step::Absent,
            Step::Absent,
            Step::Found(config_map("default", "a").into_value()),
        ],
    ));
    let poller = StatusPoller::new(reader.clone(), RegistryBuilder::with_defaults().build());
    let interval = BackoffPolicy {
        first: Duration::from_millis(100),
        max: Duration::from_secs(10),
        factor: 2.0,
        jitter: 0.0,
    };
    let events = poller
        .poll(
            vec![config_map_id("a")],
            PollOptions {
                stop_condition: Some(StopCondition::Forever),
                interval: Some(PollInterval::Backoff(interval)),
                timeout: Some(Duration::from_millis(1050)),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    let millis = |ms: &[u64]| ms.iter().copied().map(Duration::from_millis).collect::<Vec<_>>();
    // cycle 1 and 4 change the status, the rest are quiet
    assert_eq!(reader.gaps(), millis(&[100, 200, 400, 100, 200]));
    assert!(matches!(
        events.last(),
        Some(Event::Finished(Outcome::DeadlineExceeded))
    ));
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_hanging_lookup() {
    let reader = ScriptedReader::new().script(&config_map_id("a"), vec![Step::Hang]);
    let stream = poller(reader)
        .poll(
            vec![config_map_id("a")],
            PollOptions {
                timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .unwrap();
    let state = stream.state_changes();
    let started = Instant::now();
    let events = stream.collect::<Vec<_>>().await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec!["finished deadline exceeded"]
    );
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(*state.borrow(), EngineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn cancel_wins_over_later_deadline() {
    let mut reader = ScriptedReader::new();
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let id = config_map_id(name);
        reader = reader.script(
            &id,
            vec![Step::Found(config_map("default", name).into_value())],
        );
        ids.push(id);
    }
    let stream = poller(reader)
        .poll(
            ids,
            PollOptions {
                stop_condition: Some(StopCondition::Forever),
                channel_capacity: Some(1),
                timeout: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        )
        .unwrap();

    // the poller is now blocked on a full channel
    tokio::time::sleep(Duration::from_millis(10)).await;
    stream.cancel();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let events = stream.collect::<Vec<_>>().await;

    assert!(matches!(events.last(), Some(Event::Finished(Outcome::Cancelled))));
}

#[tokio::test]
async fn broken_backoff_is_rejected() {
    let poller = poller(ScriptedReader::new());
    let broken = BackoffPolicy {
        jitter: f64::NAN,
        ..BackoffPolicy::default()
    };
    let res = poller.poll(
        vec![config_map_id("a")],
        PollOptions {
            retry_backoff: Some(broken),
            ..Default::default()
        },
    );
    assert!(res.is_err());
    let res = poller.poll(
        vec![config_map_id("a")],
        PollOptions {
            interval: Some(PollInterval::Backoff(broken)),
            ..Default::default()
        },
    );
    assert!(res.is_err());
}

#[tokio::test(start_paused = true)]
async fn panicking_stop_condition_fails_the_run() {
    let reader = ScriptedReader::new().script(&config_map_id("a"), vec![Step::Absent]);
    let stream = poller(reader)
        .poll(
            vec![config_map_id("a")],
            PollOptions {
                stop_condition: Some(StopCondition::custom(|_| panic!("broken predicate"))),
                ..Default::default()
            },
        )
        .unwrap();
    let state = stream.state_changes();
    let events = stream.collect::<Vec<_>>().await;

    match events.last() {
        Some(Event::Finished(Outcome::Failed(err))) => {
            assert!(err.to_string().contains("broken predicate"), "{:#}", err)
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(*state.borrow(), EngineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn events_are_ordered_with_small_buffer() {
    let mut reader = ScriptedReader::new();
    let mut ids = Vec::new();
    for name in ["e", "c", "a", "d", "b"] {
        let id = config_map_id(name);
        reader = reader.script(
            &id,
            vec![Step::Found(config_map("default", name).into_value())],
        );
        ids.push(id);
    }
    let events = poller(reader)
        .poll(
            ids,
            PollOptions {
                channel_capacity: Some(1),
                concurrency: Some(2),
                ..Default::default()
            },
        )
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec![
            "1 a Current",
            "1 b Current",
            "1 c Current",
            "1 d Current",
            "1 e Current",
            "1 aggregate Current",
            "finished completed",
        ]
    );
    match &events[5] {
        Event::Aggregate { aggregate, .. } => {
            assert_eq!(aggregate.count(Status::Current), 5);
            assert_eq!(aggregate.total(), 5);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn empty_set_completes_immediately() {
    let events = poller(ScriptedReader::new())
        .poll(Vec::new(), PollOptions::default())
        .unwrap()
        .collect::<Vec<_>>()
        .await;
    assert_eq!(
        events.iter().map(describe).collect::<Vec<_>>(),
        vec!["1 aggregate Current", "finished completed"]
    );
}

#[tokio::test]
async fn invalid_identifiers_are_rejected() {
    let poller = poller(ScriptedReader::new());
    let bad = ObjectIdentifier::new("apps", "Deployment", "default", "");
    assert!(poller
        .poll(vec![deployment_id(), bad], PollOptions::default())
        .is_err());
    let bad = ObjectIdentifier::new("", " ", "default", "x");
    assert!(poller.poll(vec![bad], PollOptions::default()).is_err());
}
