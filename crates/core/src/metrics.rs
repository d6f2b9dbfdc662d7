//! 메트릭 상수 및 설명 등록
//!
//! 정적 메트릭(처리량, 리로드 결과, 스냅샷 버전)의 이름과 설명을 중앙에서 정의합니다.
//! 파이프라인/규칙별 동적 계측기는 ID가 이름에 포함되므로, 이름 생성 함수를 함께 제공합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 정적 메트릭: `pipewright_{component}_{name}` + `_total` (counter), `_seconds` (histogram)
//! - 동적 계측기: `pipewright.pipeline.{id}.…`, `pipewright.rule.{id}.…`
//!   (접두어 단위로 일괄 제거할 수 있도록 점 구분자를 사용)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(pipewright_core::metrics::INTERPRETER_MESSAGES_PROCESSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 상태 갱신기 레이블 키 (pipelines, output_filter)
pub const LABEL_UPDATER: &str = "updater";

// ─── Interpreter 메트릭 ─────────────────────────────────────────────

/// Interpreter: 처리된 메시지 수 (counter)
pub const INTERPRETER_MESSAGES_PROCESSED_TOTAL: &str =
    "pipewright_interpreter_messages_processed_total";

/// Interpreter: 규칙에 의해 드롭된 메시지 수 (counter)
pub const INTERPRETER_MESSAGES_DROPPED_TOTAL: &str =
    "pipewright_interpreter_messages_dropped_total";

/// Interpreter: 조건 평가 에러 수 (counter)
pub const INTERPRETER_CONDITION_ERRORS_TOTAL: &str =
    "pipewright_interpreter_condition_errors_total";

/// Interpreter: 액션 실행 에러 수 (counter)
pub const INTERPRETER_EXECUTION_ERRORS_TOTAL: &str =
    "pipewright_interpreter_execution_errors_total";

/// Interpreter: 메시지 한 건 처리 시간 (histogram, 초)
pub const INTERPRETER_PROCESSING_DURATION_SECONDS: &str =
    "pipewright_interpreter_processing_duration_seconds";

// ─── State Updater 메트릭 ───────────────────────────────────────────

/// State: 리로드 시도 수 (counter, label: result, updater)
pub const STATE_RELOADS_TOTAL: &str = "pipewright_state_reloads_total";

/// State: 현재 게시된 스냅샷 버전 (gauge, label: updater)
pub const STATE_SNAPSHOT_VERSION: &str = "pipewright_state_snapshot_version";

/// State: 규칙/파이프라인 파싱 에러 수 (counter)
pub const STATE_PARSE_ERRORS_TOTAL: &str = "pipewright_state_parse_errors_total";

/// State: 규칙 참조 해석 에러 수 (counter)
pub const STATE_RESOLUTION_ERRORS_TOTAL: &str = "pipewright_state_resolution_errors_total";

// ─── Output Filter 메트릭 ───────────────────────────────────────────

/// Output Filter: 필터링된 메시지 수 (counter)
pub const OUTPUT_FILTER_MESSAGES_TOTAL: &str = "pipewright_output_filter_messages_total";

/// Output Filter: 목적지에서 제거된 스트림 수 (counter)
pub const OUTPUT_FILTER_DESTINATIONS_REMOVED_TOTAL: &str =
    "pipewright_output_filter_destinations_removed_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 메시지 처리 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 1s 범위
pub const PROCESSING_DURATION_BUCKETS: [f64; 9] =
    [0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1, 1.0];

// ─── 동적 계측기 이름 ───────────────────────────────────────────────

const DYNAMIC_PREFIX: &str = "pipewright";

/// 파이프라인 ID에 속한 모든 동적 계측기의 접두어
pub fn pipeline_prefix(pipeline_id: &str) -> String {
    format!("{DYNAMIC_PREFIX}.pipeline.{pipeline_id}.")
}

/// 규칙 ID에 속한 모든 동적 계측기의 접두어
pub fn rule_prefix(rule_id: &str) -> String {
    format!("{DYNAMIC_PREFIX}.rule.{rule_id}.")
}

/// 파이프라인 실행 횟수
pub fn pipeline_executed(pipeline_id: &str) -> String {
    format!("{}executed", pipeline_prefix(pipeline_id))
}

/// 파이프라인 스테이지 실행 횟수
pub fn stage_executed(pipeline_id: &str, stage: i32) -> String {
    format!("{}stage.{stage}.executed", pipeline_prefix(pipeline_id))
}

/// 규칙 전체(모든 파이프라인 합산) 계측기 (`executed`, `matched`, `not_matched`, `failed`)
pub fn rule_total(rule_id: &str, suffix: &str) -> String {
    format!("{}{suffix}", rule_prefix(rule_id))
}

/// 특정 파이프라인/스테이지 안에서의 규칙 계측기
pub fn rule_in_stage(rule_id: &str, pipeline_id: &str, stage: i32, suffix: &str) -> String {
    format!("{}{pipeline_id}.{stage}.{suffix}", rule_prefix(rule_id))
}

/// 규칙 평가/실행 시간 타이머 (`evaluate`, `execute`)
pub fn rule_timer(rule_id: &str, phase: &str) -> String {
    format!("{}{phase}_time", rule_prefix(rule_id))
}

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 정적 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Interpreter
    describe_counter!(
        INTERPRETER_MESSAGES_PROCESSED_TOTAL,
        "Total number of messages run through pipelines"
    );
    describe_counter!(
        INTERPRETER_MESSAGES_DROPPED_TOTAL,
        "Total number of messages dropped by drop_message"
    );
    describe_counter!(
        INTERPRETER_CONDITION_ERRORS_TOTAL,
        "Total number of rule conditions that failed to evaluate"
    );
    describe_counter!(
        INTERPRETER_EXECUTION_ERRORS_TOTAL,
        "Total number of rule actions that failed to execute"
    );
    describe_histogram!(
        INTERPRETER_PROCESSING_DURATION_SECONDS,
        "Time to run one message through its pipelines in seconds"
    );

    // State Updater
    describe_counter!(
        STATE_RELOADS_TOTAL,
        "Total number of snapshot reloads by result"
    );
    describe_gauge!(
        STATE_SNAPSHOT_VERSION,
        "Version of the currently published pipeline snapshot"
    );
    describe_counter!(
        STATE_PARSE_ERRORS_TOTAL,
        "Total number of rule or pipeline sources that failed to parse"
    );
    describe_counter!(
        STATE_RESOLUTION_ERRORS_TOTAL,
        "Total number of unresolved rule references dropped from stages"
    );

    // Output Filter
    describe_counter!(
        OUTPUT_FILTER_MESSAGES_TOTAL,
        "Total number of messages passed through the output filter"
    );
    describe_counter!(
        OUTPUT_FILTER_DESTINATIONS_REMOVED_TOTAL,
        "Total number of stream destinations removed by filter rules"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        INTERPRETER_MESSAGES_PROCESSED_TOTAL,
        INTERPRETER_MESSAGES_DROPPED_TOTAL,
        INTERPRETER_CONDITION_ERRORS_TOTAL,
        INTERPRETER_EXECUTION_ERRORS_TOTAL,
        INTERPRETER_PROCESSING_DURATION_SECONDS,
        STATE_RELOADS_TOTAL,
        STATE_SNAPSHOT_VERSION,
        STATE_PARSE_ERRORS_TOTAL,
        STATE_RESOLUTION_ERRORS_TOTAL,
        OUTPUT_FILTER_MESSAGES_TOTAL,
        OUTPUT_FILTER_DESTINATIONS_REMOVED_TOTAL,
    ];

    #[test]
    fn all_static_metrics_have_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(name.starts_with("pipewright_"), "{name} missing prefix");
        }
    }

    #[test]
    fn counter_names_end_with_total() {
        for name in ALL_METRIC_NAMES.iter().filter(|n| n.contains("errors")) {
            assert!(name.ends_with("_total"), "{name}");
        }
    }

    #[test]
    fn buckets_are_sorted() {
        assert!(PROCESSING_DURATION_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn dynamic_names_share_prefix() {
        let prefix = rule_prefix("r1");
        assert!(rule_total("r1", "matched").starts_with(&prefix));
        assert!(rule_in_stage("r1", "p1", 0, "failed").starts_with(&prefix));
        assert!(rule_timer("r1", "evaluate").starts_with(&prefix));
        assert!(stage_executed("p1", 2).starts_with(&pipeline_prefix("p1")));
        assert_eq!(pipeline_executed("p1"), "pipewright.pipeline.p1.executed");
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }

    /// 설명 등록만 기록하는 레코더
    #[derive(Default)]
    struct DescribedNames(std::sync::Mutex<Vec<String>>);

    impl DescribedNames {
        fn push(&self, key: metrics::KeyName) {
            if let Ok(mut names) = self.0.lock() {
                names.push(key.as_str().to_owned());
            }
        }
    }

    impl metrics::Recorder for DescribedNames {
        fn describe_counter(
            &self,
            key: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
            self.push(key);
        }

        fn describe_gauge(
            &self,
            key: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
            self.push(key);
        }

        fn describe_histogram(
            &self,
            key: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
            self.push(key);
        }

        fn register_counter(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(
            &self,
            _: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn describe_all_covers_every_static_metric() {
        let recorder = DescribedNames::default();
        metrics::with_local_recorder(&recorder, describe_all);

        let described = recorder.0.lock().unwrap();
        for name in ALL_METRIC_NAMES {
            assert!(described.iter().any(|d| d == name), "{name} not described");
        }
        assert_eq!(described.len(), ALL_METRIC_NAMES.len());
    }
}
