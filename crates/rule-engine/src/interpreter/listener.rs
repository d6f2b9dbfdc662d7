//! 인터프리터 진행 상황 콜백
//!
//! 모든 메서드는 기본 구현이 비어 있어 필요한 콜백만 구현하면 됩니다.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use pipewright_core::message::Message;

use crate::ast::Rule;
use crate::interpreter::EvalError;
use crate::pipeline::{Pipeline, Stage, StageRule};

/// 메시지 처리 중 인터프리터가 호출하는 콜백
#[allow(unused_variables)]
pub trait InterpreterListener {
    fn start_processing(&mut self, message: &Message) {}

    fn finish_processing(&mut self, message: &Message) {}

    /// 스트림 집합에 연결된 파이프라인을 실행하기 직전
    fn process_streams(&mut self, message: &Message, pipelines: &[Arc<Pipeline>], streams: &BTreeSet<String>) {}

    fn enter_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {}

    fn exit_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {}

    fn evaluate_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {}

    fn satisfy_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {}

    fn dissatisfy_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {}

    fn fail_evaluate_rule(&mut self, rule: &StageRule, pipeline: &Pipeline, error: &EvalError) {}

    fn execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {}

    fn finish_execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {}

    fn fail_execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline, error: &EvalError) {}

    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {}

    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {}
}

/// 아무 것도 하지 않는 리스너
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInterpreterListener;

impl InterpreterListener for NoopInterpreterListener {}

impl<L: InterpreterListener + ?Sized> InterpreterListener for &mut L {
    fn start_processing(&mut self, message: &Message) {
        (**self).start_processing(message);
    }
    fn finish_processing(&mut self, message: &Message) {
        (**self).finish_processing(message);
    }
    fn process_streams(&mut self, message: &Message, pipelines: &[Arc<Pipeline>], streams: &BTreeSet<String>) {
        (**self).process_streams(message, pipelines, streams);
    }
    fn enter_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {
        (**self).enter_stage(stage, pipeline);
    }
    fn exit_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {
        (**self).exit_stage(stage, pipeline);
    }
    fn evaluate_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        (**self).evaluate_rule(rule, pipeline);
    }
    fn satisfy_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        (**self).satisfy_rule(rule, pipeline);
    }
    fn dissatisfy_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        (**self).dissatisfy_rule(rule, pipeline);
    }
    fn fail_evaluate_rule(&mut self, rule: &StageRule, pipeline: &Pipeline, error: &EvalError) {
        (**self).fail_evaluate_rule(rule, pipeline, error);
    }
    fn execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        (**self).execute_rule(rule, pipeline);
    }
    fn finish_execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        (**self).finish_execute_rule(rule, pipeline);
    }
    fn fail_execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline, error: &EvalError) {
        (**self).fail_execute_rule(rule, pipeline, error);
    }
    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        (**self).continue_pipeline(pipeline, stage);
    }
    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        (**self).stop_pipeline(pipeline, stage);
    }
}

/// 두 리스너에 차례로 전달
impl<A: InterpreterListener, B: InterpreterListener> InterpreterListener for (A, B) {
    fn start_processing(&mut self, message: &Message) {
        self.0.start_processing(message);
        self.1.start_processing(message);
    }
    fn finish_processing(&mut self, message: &Message) {
        self.0.finish_processing(message);
        self.1.finish_processing(message);
    }
    fn process_streams(&mut self, message: &Message, pipelines: &[Arc<Pipeline>], streams: &BTreeSet<String>) {
        self.0.process_streams(message, pipelines, streams);
        self.1.process_streams(message, pipelines, streams);
    }
    fn enter_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {
        self.0.enter_stage(stage, pipeline);
        self.1.enter_stage(stage, pipeline);
    }
    fn exit_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {
        self.0.exit_stage(stage, pipeline);
        self.1.exit_stage(stage, pipeline);
    }
    fn evaluate_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        self.0.evaluate_rule(rule, pipeline);
        self.1.evaluate_rule(rule, pipeline);
    }
    fn satisfy_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        self.0.satisfy_rule(rule, pipeline);
        self.1.satisfy_rule(rule, pipeline);
    }
    fn dissatisfy_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        self.0.dissatisfy_rule(rule, pipeline);
        self.1.dissatisfy_rule(rule, pipeline);
    }
    fn fail_evaluate_rule(&mut self, rule: &StageRule, pipeline: &Pipeline, error: &EvalError) {
        self.0.fail_evaluate_rule(rule, pipeline, error);
        self.1.fail_evaluate_rule(rule, pipeline, error);
    }
    fn execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        self.0.execute_rule(rule, pipeline);
        self.1.execute_rule(rule, pipeline);
    }
    fn finish_execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline) {
        self.0.finish_execute_rule(rule, pipeline);
        self.1.finish_execute_rule(rule, pipeline);
    }
    fn fail_execute_rule(&mut self, rule: &StageRule, pipeline: &Pipeline, error: &EvalError) {
        self.0.fail_execute_rule(rule, pipeline, error);
        self.1.fail_execute_rule(rule, pipeline, error);
    }
    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        self.0.continue_pipeline(pipeline, stage);
        self.1.continue_pipeline(pipeline, stage);
    }
    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        self.0.stop_pipeline(pipeline, stage);
        self.1.stop_pipeline(pipeline, stage);
    }
}

/// 시뮬레이션용 추적 로그 수집기
#[derive(Debug, Default, Clone)]
pub struct TraceListener {
    lines: Vec<String>,
}

impl TraceListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}

fn rule_label(rule: &Rule) -> String {
    format!("rule '{}'", rule.name)
}

impl InterpreterListener for TraceListener {
    fn start_processing(&mut self, message: &Message) {
        self.push(format!("Starting message processing for {}", message.id()));
    }

    fn finish_processing(&mut self, message: &Message) {
        self.push(format!("Finished message processing for {}", message.id()));
    }

    fn process_streams(&mut self, _message: &Message, pipelines: &[Arc<Pipeline>], streams: &BTreeSet<String>) {
        let streams: Vec<&str> = streams.iter().map(String::as_str).collect();
        let pipelines: Vec<String> = pipelines
            .iter()
            .map(|p| format!("'{}' ({})", p.name, p.id))
            .collect();
        self.push(format!(
            "Running pipelines [{}] for streams [{}]",
            pipelines.join(", "),
            streams.join(", ")
        ));
    }

    fn enter_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {
        self.push(format!("Enter stage {} of pipeline '{}'", stage.number, pipeline.name));
    }

    fn exit_stage(&mut self, stage: &Stage, pipeline: &Pipeline) {
        self.push(format!("Exit stage {} of pipeline '{}'", stage.number, pipeline.name));
    }

    fn evaluate_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        self.push(format!("Evaluate {}", rule_label(&rule.rule)));
    }

    fn satisfy_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        self.push(format!("Evaluation satisfied {}", rule_label(&rule.rule)));
    }

    fn dissatisfy_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        self.push(format!("Evaluation not satisfied {}", rule_label(&rule.rule)));
    }

    fn fail_evaluate_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline, error: &EvalError) {
        self.push(format!("Evaluation failed {}: {error}", rule_label(&rule.rule)));
    }

    fn execute_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        self.push(format!("Execute {}", rule_label(&rule.rule)));
    }

    fn finish_execute_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        self.push(format!("Finished execution {}", rule_label(&rule.rule)));
    }

    fn fail_execute_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline, error: &EvalError) {
        self.push(format!("Execution failed {}: {error}", rule_label(&rule.rule)));
    }

    fn continue_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        self.push(format!(
            "Completed stage {} for pipeline '{}', continuing to next stage",
            stage.number, pipeline.name
        ));
    }

    fn stop_pipeline(&mut self, pipeline: &Pipeline, stage: &Stage) {
        self.push(format!(
            "Completed stage {} for pipeline '{}', NOT continuing to next stage",
            stage.number, pipeline.name
        ));
    }
}

/// 규칙 평가/실행 시간을 규칙 타이머에 기록
///
/// 평가와 실행은 규칙 단위로 중첩되지 않으므로 시작 시각 하나로 충분합니다.
#[derive(Debug, Default)]
pub struct RuleMetricsListener {
    started: Option<Instant>,
}

impl RuleMetricsListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn elapsed(&mut self) -> Option<f64> {
        self.started.take().map(|start| start.elapsed().as_secs_f64())
    }
}

impl InterpreterListener for RuleMetricsListener {
    fn evaluate_rule(&mut self, _rule: &StageRule, _pipeline: &Pipeline) {
        self.started = Some(Instant::now());
    }

    fn satisfy_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        if let Some(seconds) = self.elapsed() {
            rule.metrics.evaluate_time.record(seconds);
        }
    }

    fn dissatisfy_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        if let Some(seconds) = self.elapsed() {
            rule.metrics.evaluate_time.record(seconds);
        }
    }

    fn fail_evaluate_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline, _error: &EvalError) {
        if let Some(seconds) = self.elapsed() {
            rule.metrics.evaluate_time.record(seconds);
        }
    }

    fn execute_rule(&mut self, _rule: &StageRule, _pipeline: &Pipeline) {
        self.started = Some(Instant::now());
    }

    fn finish_execute_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline) {
        if let Some(seconds) = self.elapsed() {
            rule.metrics.execute_time.record(seconds);
        }
    }

    fn fail_execute_rule(&mut self, rule: &StageRule, _pipeline: &Pipeline, _error: &EvalError) {
        if let Some(seconds) = self.elapsed() {
            rule.metrics.execute_time.record(seconds);
        }
    }
}
