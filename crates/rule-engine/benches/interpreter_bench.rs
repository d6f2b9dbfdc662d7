//! 인터프리터 벤치마크
//!
//! 메시지 배치 처리량과 파이프라인 수에 따른 스케일링, 출력 필터 비용을 측정합니다.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pipewright_core::message::{DEFAULT_STREAM_ID, Message};
use pipewright_core::value::Value;
use pipewright_rule_engine::filter::{
    FilterDefinitionSource, InMemoryFilterSource, filter_function_registry,
};
use pipewright_rule_engine::{
    Definitions, EngineConfig, EngineConfigBuilder, FunctionRegistry, InMemoryMetricRegistry,
    Interpreter, NoopInterpreterListener, PipelineResolver, PipelineRuleOutputFilter,
    PipelineSource, RuleParser, RuleSource, Snapshot, StreamDestinationFilter,
};

fn create_message(code: i64) -> Message {
    let mut message = Message::empty();
    message.add_field("responseCode", Value::Long(code));
    message.add_field("path", Value::from("/api/orders"));
    message.add_field("level", Value::from(if code >= 500 { "error" } else { "info" }));
    message
}

fn resolve(definitions: &Definitions, functions: FunctionRegistry, config: &EngineConfig) -> Arc<Snapshot> {
    let resolver = PipelineResolver::new(
        RuleParser::new(Arc::new(functions)),
        Arc::new(InMemoryMetricRegistry::new()),
        config,
    );
    Arc::new(resolver.resolve(definitions, 1).unwrap())
}

/// 파이프라인 `pipelines`개, 각 파이프라인은 2개 스테이지
fn definitions(pipelines: usize) -> Definitions {
    let mut defs = Definitions::default();
    defs.rules.push(RuleSource {
        id: "categorize".to_owned(),
        title: String::new(),
        source: r#"rule "categorize" when to_long($message.responseCode) >= 500
            then set_field("response_category", "server_error"); end"#
            .to_owned(),
    });
    defs.rules.push(RuleSource {
        id: "tag".to_owned(),
        title: String::new(),
        source: r#"rule "tag" when has_field("path") then
            set_field("api", starts_with(to_string($message.path), "/api")); end"#
            .to_owned(),
    });
    for i in 0..pipelines {
        let id = format!("p{i}");
        defs.pipelines.push(PipelineSource {
            id: id.clone(),
            title: String::new(),
            source: format!(
                "pipeline \"{id}\"\nstage 0 match pass\nrule \"categorize\";\nstage 1 match all\nrule \"tag\";\nend"
            ),
        });
        defs.connect(DEFAULT_STREAM_ID, id);
    }
    defs
}

fn bench_single_message(c: &mut Criterion) {
    let config = EngineConfig::default();
    let snapshot = resolve(&definitions(1), FunctionRegistry::with_builtins(), &config);
    let interpreter = Interpreter::new(snapshot);

    let mut group = c.benchmark_group("single_message");
    group.throughput(Throughput::Elements(1));
    group.bench_function("two_stages", |b| {
        b.iter(|| {
            interpreter.process(
                black_box(vec![create_message(503)]),
                &mut NoopInterpreterListener,
            )
        })
    });
    group.finish();
}

fn bench_batch_throughput(c: &mut Criterion) {
    let config = EngineConfig::default();
    let snapshot = resolve(&definitions(1), FunctionRegistry::with_builtins(), &config);
    let interpreter = Interpreter::new(snapshot);

    let mut group = c.benchmark_group("batch_throughput");
    for batch in [10usize, 100, 1000] {
        let messages: Vec<Message> = (0..batch)
            .map(|i| create_message(if i % 4 == 0 { 500 } else { 200 }))
            .collect();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &messages, |b, messages| {
            b.iter(|| interpreter.process(black_box(messages.clone()), &mut NoopInterpreterListener))
        });
    }
    group.finish();
}

fn bench_pipeline_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_scaling");
    for cached in [true, false] {
        let config = EngineConfigBuilder::new()
            .cache_stage_plans(cached)
            .build()
            .unwrap();
        for pipelines in [1usize, 10, 50] {
            let snapshot = resolve(&definitions(pipelines), FunctionRegistry::with_builtins(), &config);
            let interpreter = Interpreter::with_config(snapshot, &config);
            let label = if cached { "cached" } else { "uncached" };
            group.throughput(Throughput::Elements(pipelines as u64));
            group.bench_with_input(BenchmarkId::new(label, pipelines), &pipelines, |b, _| {
                b.iter(|| {
                    interpreter.process(
                        black_box(vec![create_message(500)]),
                        &mut NoopInterpreterListener,
                    )
                })
            });
        }
    }
    group.finish();
}

fn bench_output_filter(c: &mut Criterion) {
    let config = EngineConfig::default();
    let filters: Vec<StreamDestinationFilter> = (0..20)
        .map(|i| StreamDestinationFilter {
            id: format!("f{i}"),
            title: String::new(),
            stream_id: format!("stream-{}", i % 5),
            destination_type: "indexer".to_owned(),
            condition: format!(r#"to_string($message.level) == "level-{i}""#),
            status: Default::default(),
        })
        .collect();
    let snapshot = resolve(
        &FilterDefinitionSource::<InMemoryFilterSource>::definitions(&filters),
        filter_function_registry(),
        &config,
    );
    let output = PipelineRuleOutputFilter::new(snapshot, &config);

    let mut message = create_message(200);
    for i in 0..5 {
        message.add_stream(format!("stream-{i}"));
    }

    let mut group = c.benchmark_group("output_filter");
    group.throughput(Throughput::Elements(1));
    group.bench_function("20_filters_5_streams", |b| {
        b.iter(|| output.apply(black_box(message.clone())))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_single_message,
    bench_batch_throughput,
    bench_pipeline_scaling,
    bench_output_filter
);
criterion_main!(benches);
