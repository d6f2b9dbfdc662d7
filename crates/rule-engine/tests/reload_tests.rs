//! 핫 리로드 통합 테스트

use std::sync::{Arc, Barrier};
use std::time::Duration;

use pipewright_core::message::{DEFAULT_STREAM_ID, Message};
use pipewright_core::value::Value;
use pipewright_rule_engine::functions::FunctionArgs;
use pipewright_rule_engine::types::ValueType;
use pipewright_rule_engine::{
    ConfigurationStateUpdater, Definitions, DirectoryDefinitionSource, EngineConfig,
    EngineConfigBuilder, EvaluationContext, Function, FunctionDescriptor, FunctionError,
    FunctionRegistry, InMemoryDefinitionSource, InMemoryMetricRegistry, Interpreter,
    NoopInterpreterListener, PipelineResolver, PipelineSource, ReloadEvent, RuleEngineError,
    RuleParser, RuleSource, Snapshot, SnapshotProvider,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn rule(id: &str, source: &str) -> RuleSource {
    RuleSource {
        id: id.to_owned(),
        title: id.to_owned(),
        source: source.to_owned(),
    }
}

fn pipeline(id: &str, source: &str) -> PipelineSource {
    PipelineSource {
        id: id.to_owned(),
        title: id.to_owned(),
        source: source.to_owned(),
    }
}

fn tagging(tag: &str) -> Definitions {
    let mut defs = Definitions::default();
    defs.rules.push(rule(
        "tag",
        &format!(r#"rule "tag" when true then set_field("tag", "{tag}"); end"#),
    ));
    defs.pipelines
        .push(pipeline("main", r#"pipeline "main" stage 0 match all rule "tag"; end"#));
    defs.connect(DEFAULT_STREAM_ID, "main");
    defs
}

fn updater<S: pipewright_rule_engine::DefinitionSource>(
    source: S,
    metrics: Arc<InMemoryMetricRegistry>,
    config: &EngineConfig,
) -> Arc<ConfigurationStateUpdater<S>> {
    Arc::new(ConfigurationStateUpdater::new(
        source,
        RuleParser::new(Arc::new(FunctionRegistry::with_builtins())),
        metrics,
        config,
    ))
}

fn tag_of<P: SnapshotProvider>(interpreter: &Interpreter<P>) -> Option<Value> {
    let out = interpreter.process(vec![Message::empty()], &mut NoopInterpreterListener);
    out[0].field("tag").cloned()
}

#[tokio::test]
async fn concurrent_reloads_publish_distinct_increasing_versions() {
    let updater = updater(
        InMemoryDefinitionSource::new(tagging("a")),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let updater = Arc::clone(&updater);
        handles.push(tokio::spawn(async move {
            updater
                .reload_for_update(&[format!("tag-{i}")])
                .await
                .map(|snapshot| snapshot.version())
        }));
    }

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
    assert_eq!(updater.current().map(|s| s.version()), Some(8));
}

#[test]
fn resolving_twice_yields_equivalent_snapshots() {
    let mut defs = Definitions::default();
    defs.rules.push(rule(
        "classify",
        r#"rule "classify" when to_long($message.code) >= 500
           then set_field("class", "server"); rename_field("code", "status"); end"#,
    ));
    defs.rules.push(rule(
        "route",
        r#"rule "route" when has_field("class") then route_to_stream(id: "errors"); end"#,
    ));
    defs.rules.push(rule(
        "divide",
        r#"rule "divide" when to_long($message.status) / 0 > 1 then set_field("never", true); end"#,
    ));
    defs.rules.push(rule(
        "audit",
        r#"rule "audit" when true then set_field("audited", true); remove_field("class"); end"#,
    ));
    defs.pipelines.push(pipeline(
        "main",
        r#"pipeline "main" stage 0 match all rule "classify"; stage 1 match either rule "route"; rule "divide"; end"#,
    ));
    defs.pipelines
        .push(pipeline("errors", r#"pipeline "errors" stage 0 match all rule "audit"; end"#));
    defs.connect(DEFAULT_STREAM_ID, "main");
    defs.connect("errors", "errors");

    let config = EngineConfig::default();
    let resolver = PipelineResolver::new(
        RuleParser::new(Arc::new(FunctionRegistry::with_builtins())),
        Arc::new(InMemoryMetricRegistry::new()),
        &config,
    );
    let first = Arc::new(resolver.resolve(&defs, 1).unwrap());
    let second = Arc::new(resolver.resolve(&defs, 2).unwrap());
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!((first.version(), second.version()), (1, 2));

    let mut input = Message::empty().with_id("fixed");
    input.add_field("code", Value::Long(503));

    let run = |snapshot: Arc<Snapshot>| {
        Interpreter::with_config(snapshot, &config)
            .process(vec![input.clone()], &mut NoopInterpreterListener)
    };
    let from_first = run(first);
    let from_second = run(second);

    assert_eq!(from_first, from_second);
    assert_eq!(from_first[0].field("status"), Some(&Value::Long(503)));
    assert!(from_first[0].has_field("audited"));
    assert!(from_first[0].streams().contains("errors"));
}

/// 평가 도중 두 번 멈춰 서는 조건 함수: 진입을 알리고, 재개 신호를 기다립니다.
struct Rendezvous {
    descriptor: FunctionDescriptor,
    barrier: Arc<Barrier>,
}

impl Function for Rendezvous {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        _args: &FunctionArgs,
        _ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, FunctionError> {
        self.barrier.wait();
        self.barrier.wait();
        Ok(Value::Bool(true))
    }
}

fn waiting_then_tagging(tag: &str) -> Definitions {
    let mut defs = Definitions::default();
    defs.rules.push(rule("wait", r#"rule "wait" when rendezvous() then end"#));
    defs.rules.push(rule(
        "tag",
        &format!(r#"rule "tag" when true then set_field("tag", "{tag}"); end"#),
    ));
    defs.pipelines.push(pipeline(
        "main",
        r#"pipeline "main" stage 0 match all rule "wait"; stage 1 match all rule "tag"; end"#,
    ));
    defs.connect(DEFAULT_STREAM_ID, "main");
    defs
}

#[tokio::test]
async fn in_flight_snapshot_keeps_its_semantics() {
    let barrier = Arc::new(Barrier::new(2));
    let mut functions = FunctionRegistry::with_builtins();
    functions.register(Rendezvous {
        descriptor: FunctionDescriptor::new("rendezvous", ValueType::Bool),
        barrier: Arc::clone(&barrier),
    });
    let updater = Arc::new(ConfigurationStateUpdater::new(
        InMemoryDefinitionSource::new(waiting_then_tagging("old")),
        RuleParser::new(Arc::new(functions)),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    ));
    updater.init().await.unwrap();

    let worker = {
        let updater = Arc::clone(&updater);
        std::thread::spawn(move || {
            Interpreter::new(updater).process(vec![Message::empty()], &mut NoopInterpreterListener)
        })
    };

    // 워커가 stage 0 조건 평가 안에 들어올 때까지 대기
    let entered = Arc::clone(&barrier);
    tokio::task::spawn_blocking(move || entered.wait()).await.unwrap();

    updater.source().replace(tagging("new"));
    let published = updater.reload_for_update(&["wait".to_owned()]).await.unwrap();
    assert_eq!(published.version(), 2);
    assert!(published.rule("wait").is_none());

    let resume = Arc::clone(&barrier);
    tokio::task::spawn_blocking(move || resume.wait()).await.unwrap();
    let out = worker.join().unwrap();

    assert_eq!(out[0].field("tag"), Some(&Value::from("old")));
    assert_eq!(tag_of(&Interpreter::new(Arc::clone(&updater))), Some(Value::from("new")));
}

#[tokio::test]
async fn failed_reload_keeps_previous_snapshot() {
    let updater = updater(
        InMemoryDefinitionSource::new(tagging("kept")),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    );
    updater.init().await.unwrap();

    updater.source().set_available(false);
    let result = updater.reload_for_update(&[]).await;
    assert!(matches!(result, Err(RuleEngineError::Reload(_))));

    let current = updater.current().unwrap();
    assert_eq!(current.version(), 1);
    assert_eq!(tag_of(&Interpreter::new(current)), Some(Value::from("kept")));
}

#[tokio::test]
async fn strict_resolution_rejects_broken_definitions() {
    let config = EngineConfigBuilder::new().strict_resolution(true).build().unwrap();
    let updater = updater(
        InMemoryDefinitionSource::new(tagging("good")),
        Arc::new(InMemoryMetricRegistry::new()),
        &config,
    );
    updater.init().await.unwrap();

    updater
        .source()
        .upsert_rule(rule("tag", r#"rule "tag" when true then undefined_fn(); end"#));
    assert!(updater.reload_for_update(&["tag".to_owned()]).await.is_err());
    assert_eq!(tag_of(&Interpreter::new(Arc::clone(&updater))), Some(Value::from("good")));
}

#[tokio::test]
async fn lenient_resolution_publishes_degraded_snapshot() {
    let updater = updater(
        InMemoryDefinitionSource::new(tagging("good")),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    );
    updater
        .source()
        .upsert_rule(rule("broken", r#"rule "broken" when true then"#));

    let snapshot = updater.init().await.unwrap();
    assert!(snapshot.has_errors());
    assert_eq!(snapshot.source_errors().len(), 1);
    assert_eq!(tag_of(&Interpreter::new(snapshot)), Some(Value::from("good")));
}

#[tokio::test]
async fn deleting_a_rule_removes_its_instruments() {
    let metrics = Arc::new(InMemoryMetricRegistry::new());
    let updater = updater(
        InMemoryDefinitionSource::new(tagging("x")),
        Arc::clone(&metrics),
        &EngineConfig::default(),
    );
    updater.init().await.unwrap();
    assert!(metrics.names().iter().any(|n| n.starts_with("pipewright.rule.tag.")));

    updater.source().remove_rule("tag");
    updater.reload_for_delete(&["tag".to_owned()]).await.unwrap();

    assert!(!metrics.names().iter().any(|n| n.starts_with("pipewright.rule.tag.")));
    // 파이프라인은 남아 있으므로 계측기도 유지
    assert!(metrics.names().iter().any(|n| n.starts_with("pipewright.pipeline.main.")));
}

#[tokio::test]
async fn listener_applies_events_until_cancelled() {
    let updater = updater(
        InMemoryDefinitionSource::new(tagging("v1")),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    );
    updater.init().await.unwrap();

    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = Arc::clone(&updater).spawn_listener(rx, cancel.clone());

    updater.source().replace(tagging("v2"));
    tx.send(ReloadEvent::Update(vec!["tag".to_owned()])).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while updater.current().map(|s| s.version()) != Some(2) {
        assert!(tokio::time::Instant::now() < deadline, "reload event not applied");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(tag_of(&Interpreter::new(Arc::clone(&updater))), Some(Value::from("v2")));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn directory_source_picks_up_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("rules")).unwrap();
    std::fs::create_dir_all(root.join("pipelines")).unwrap();
    std::fs::write(
        root.join("rules/tag.rule"),
        r#"rule "tag" when true then set_field("tag", "disk-1"); end"#,
    )
    .unwrap();
    std::fs::write(
        root.join("pipelines/main.pipeline"),
        r#"pipeline "main" stage 0 match all rule "tag"; end"#,
    )
    .unwrap();
    std::fs::write(
        root.join("connections.toml"),
        format!("[[connection]]\nstream = \"{DEFAULT_STREAM_ID}\"\npipelines = [\"main\"]\n"),
    )
    .unwrap();

    let updater = updater(
        DirectoryDefinitionSource::new(root),
        Arc::new(InMemoryMetricRegistry::new()),
        &EngineConfig::default(),
    );
    updater.init().await.unwrap();
    let interpreter = Interpreter::new(Arc::clone(&updater));
    assert_eq!(tag_of(&interpreter), Some(Value::from("disk-1")));

    std::fs::write(
        root.join("rules/tag.rule"),
        r#"rule "tag" when true then set_field("tag", "disk-2"); end"#,
    )
    .unwrap();
    updater.reload_for_update(&["tag".to_owned()]).await.unwrap();
    assert_eq!(tag_of(&interpreter), Some(Value::from("disk-2")));
}

#[tokio::test]
async fn init_fails_when_source_never_becomes_available() {
    let config = EngineConfigBuilder::new()
        .init_retry(2, Duration::from_millis(1))
        .build()
        .unwrap();
    let source = InMemoryDefinitionSource::new(tagging("x"));
    source.set_available(false);
    let updater = updater(source, Arc::new(InMemoryMetricRegistry::new()), &config);

    assert!(matches!(updater.init().await, Err(RuleEngineError::NotReady(_))));
    assert!(updater.current().is_none());
}
