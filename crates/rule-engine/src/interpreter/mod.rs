//! 파이프라인 인터프리터
//!
//! 메시지마다 스트림에 연결된 파이프라인을 스테이지 번호 순서로 실행합니다.
//!
//! # 처리 순서
//! 1. 메시지의 스트림(없으면 기본 스트림)에서 아직 처리하지 않은 스트림을 고름
//! 2. 연결된 파이프라인을 ID 순으로 모아 스테이지 계획을 실행
//! 3. 규칙이 메시지를 새 스트림으로 보내면 새 스트림에 대해서만 반복
//! 4. 규칙이 만든 메시지는 처리 큐 뒤에 추가
//!
//! 규칙 평가 에러는 처리 에러로 메시지에 기록될 뿐 호출자에게 전파되지 않습니다.

mod context;
pub mod eval;
pub mod listener;
pub mod plan;

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use pipewright_core::message::{DEFAULT_STREAM_ID, Message};
use pipewright_core::metrics as names;

pub use context::{EvalError, EvaluationContext};
pub use listener::{InterpreterListener, NoopInterpreterListener, RuleMetricsListener, TraceListener};

use crate::config::{EngineConfig, StageMissBehavior};
use crate::pipeline::{Pipeline, StageRule};
use crate::resolver::Snapshot;
use crate::state::SnapshotProvider;

/// 조건 평가 실패 처리 에러 분류
pub const CAUSE_CONDITION: &str = "rule_condition_evaluation";
/// 액션 실행 실패 처리 에러 분류
pub const CAUSE_EXECUTION: &str = "rule_execution";

/// 메시지 처리기
///
/// 처리 시작 시점에 스냅샷을 한 번 읽고, 처리가 끝날 때까지 그 스냅샷만 사용합니다.
pub struct Interpreter<P> {
    provider: P,
    stage_miss: StageMissBehavior,
    rule_metrics: bool,
}

impl<P: SnapshotProvider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, &EngineConfig::default())
    }

    pub fn with_config(provider: P, config: &EngineConfig) -> Self {
        Self {
            provider,
            stage_miss: config.stage_miss,
            rule_metrics: config.rule_metrics,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// 현재 스냅샷으로 메시지를 처리합니다.
    ///
    /// 결과에는 드롭되지 않은 입력 메시지와 규칙이 만든 메시지가 처리 완료 순서로 담깁니다.
    /// 게시된 스냅샷이 없으면 메시지를 그대로 돌려줍니다.
    pub fn process<L: InterpreterListener>(&self, messages: Vec<Message>, listener: &mut L) -> Vec<Message> {
        match self.provider.current() {
            Some(snapshot) => self.process_with_snapshot(&snapshot, messages, listener),
            None => {
                tracing::debug!(
                    messages = messages.len(),
                    "no snapshot published yet, passing messages through"
                );
                messages
            }
        }
    }

    /// 주어진 스냅샷으로 메시지를 처리합니다.
    pub fn process_with_snapshot<L: InterpreterListener>(
        &self,
        snapshot: &Snapshot,
        messages: Vec<Message>,
        listener: &mut L,
    ) -> Vec<Message> {
        if self.rule_metrics {
            let mut listener = (RuleMetricsListener::new(), listener);
            self.run(snapshot, messages, &mut listener)
        } else {
            self.run(snapshot, messages, listener)
        }
    }

    fn run<L: InterpreterListener>(&self, snapshot: &Snapshot, messages: Vec<Message>, listener: &mut L) -> Vec<Message> {
        let mut queue: VecDeque<Message> = messages.into();
        let mut output = Vec::with_capacity(queue.len());

        while let Some(mut message) = queue.pop_front() {
            let started = Instant::now();
            listener.start_processing(&message);

            // 이 메시지에 대해 이미 처리한 스트림
            let mut processed_streams: BTreeSet<String> = BTreeSet::new();
            loop {
                let pending: BTreeSet<String> = if message.streams().is_empty() {
                    std::iter::once(DEFAULT_STREAM_ID.to_owned())
                        .filter(|s| !processed_streams.contains(s))
                        .collect()
                } else {
                    message.streams().difference(&processed_streams).cloned().collect()
                };
                if pending.is_empty() {
                    break;
                }
                processed_streams.extend(pending.iter().cloned());

                let pipelines = snapshot.pipelines_for_streams(pending.iter().map(String::as_str));
                listener.process_streams(&message, &pipelines, &pending);
                if pipelines.is_empty() {
                    continue;
                }

                let created = self.process_for_resolved_pipelines(&mut message, &pipelines, listener, snapshot);
                queue.extend(created);

                if message.is_filtered_out() {
                    break;
                }
            }

            message.flush_processing_errors();
            listener.finish_processing(&message);

            metrics::counter!(names::INTERPRETER_MESSAGES_PROCESSED_TOTAL).increment(1);
            metrics::histogram!(names::INTERPRETER_PROCESSING_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());

            if message.is_filtered_out() {
                tracing::debug!(message_id = %message.id(), "message dropped by pipeline rule");
                metrics::counter!(names::INTERPRETER_MESSAGES_DROPPED_TOTAL).increment(1);
            } else {
                output.push(message);
            }
        }
        output
    }

    /// 이미 고른 파이프라인 집합을 메시지 하나에 실행하고, 규칙이 만든 메시지를 반환합니다.
    ///
    /// 처리 에러는 메시지에 누적만 되며 `gl2_processing_error` 필드로 옮기지 않습니다.
    pub fn process_for_resolved_pipelines<L: InterpreterListener>(
        &self,
        message: &mut Message,
        pipelines: &[Arc<Pipeline>],
        listener: &mut L,
        snapshot: &Snapshot,
    ) -> Vec<Message> {
        let mut created = Vec::new();
        // 스테이지에서 멈춘 파이프라인
        let mut stopped: HashSet<String> = HashSet::new();

        for pipeline in pipelines {
            pipeline.executed.increment(1);
        }

        let plan = snapshot.stage_plan(pipelines);
        for slice in plan.slices() {
            if message.is_filtered_out() {
                break;
            }
            for (pipeline, stage) in slice.stages() {
                if stopped.contains(pipeline.id.as_str()) {
                    continue;
                }
                listener.enter_stage(stage, pipeline);
                stage.executed.increment(1);

                let mut ctx = EvaluationContext::new(message);

                let mut matched: Vec<&StageRule> = Vec::with_capacity(stage.rules.len());
                for rule in &stage.rules {
                    listener.evaluate_rule(rule, pipeline);
                    ctx.clear_variables();
                    match eval::eval_condition(&rule.rule, &mut ctx) {
                        Ok(true) => {
                            rule.metrics.matched(true);
                            listener.satisfy_rule(rule, pipeline);
                            matched.push(rule);
                        }
                        Ok(false) => {
                            rule.metrics.matched(false);
                            listener.dissatisfy_rule(rule, pipeline);
                        }
                        Err(error) => {
                            tracing::debug!(
                                rule = %rule.rule.name,
                                pipeline_id = %pipeline.id,
                                error = %error,
                                "rule condition failed to evaluate"
                            );
                            listener.fail_evaluate_rule(rule, pipeline, &error);
                            rule.metrics.failed();
                            metrics::counter!(names::INTERPRETER_CONDITION_ERRORS_TOTAL).increment(1);
                            ctx.message_mut().add_processing_error(
                                CAUSE_CONDITION,
                                describe(&rule.rule.name, &error, "condition"),
                            );
                        }
                    }
                }

                for rule in &matched {
                    listener.execute_rule(rule, pipeline);
                    ctx.clear_variables();
                    rule.metrics.executed();
                    match eval::execute_statements(&rule.rule, &mut ctx) {
                        Ok(()) => listener.finish_execute_rule(rule, pipeline),
                        Err(error) => {
                            tracing::debug!(
                                rule = %rule.rule.name,
                                pipeline_id = %pipeline.id,
                                error = %error,
                                "rule action failed"
                            );
                            listener.fail_execute_rule(rule, pipeline, &error);
                            rule.metrics.failed();
                            metrics::counter!(names::INTERPRETER_EXECUTION_ERRORS_TOTAL).increment(1);
                            ctx.message_mut().add_processing_error(
                                CAUSE_EXECUTION,
                                describe(&rule.rule.name, &error, "action"),
                            );
                        }
                    }
                }

                created.extend(ctx.take_created_messages());
                drop(ctx);
                listener.exit_stage(stage, pipeline);

                if stage.should_continue(matched.len()) {
                    listener.continue_pipeline(pipeline, stage);
                } else {
                    listener.stop_pipeline(pipeline, stage);
                    if self.stage_miss == StageMissBehavior::Stop {
                        stopped.insert(pipeline.id.clone());
                    }
                }
            }
        }
        created
    }
}

/// 처리 에러 상세 문자열
fn describe(rule_name: &str, error: &EvalError, phase: &str) -> String {
    let detail = match error {
        EvalError::Function { .. } => error.to_string(),
        EvalError::Expression { span, reason } => format!("Error evaluating {phase} at {span}: {reason}"),
    };
    format!("For rule '{rule_name}': {detail}")
}
