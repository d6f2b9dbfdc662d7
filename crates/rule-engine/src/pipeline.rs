//! 해석이 끝난 파이프라인 모델
//!
//! [`Pipeline`]은 스테이지 번호 오름차순의 [`Stage`] 목록을 갖고, 각 스테이지는
//! 파싱된 규칙을 직접 참조합니다. 모든 값은 게시 후 변경되지 않습니다.
//! 계측기 핸들은 해석 시점에 등록되어 함께 보관됩니다.

use std::sync::Arc;

use metrics::{Counter, Histogram};
use pipewright_core::metrics as names;

use crate::ast::{MatchPolicy, Rule};
use crate::metrics::MetricRegistry;

/// 규칙 결과 카운터 묶음
#[derive(Clone)]
pub struct RuleCounters {
    pub executed: Counter,
    pub matched: Counter,
    pub not_matched: Counter,
    pub failed: Counter,
}

impl RuleCounters {
    fn register(registry: &dyn MetricRegistry, name: impl Fn(&str) -> String) -> Self {
        Self {
            executed: registry.counter(&name("executed")),
            matched: registry.counter(&name("matched")),
            not_matched: registry.counter(&name("not_matched")),
            failed: registry.counter(&name("failed")),
        }
    }

    fn noop() -> Self {
        Self {
            executed: Counter::noop(),
            matched: Counter::noop(),
            not_matched: Counter::noop(),
            failed: Counter::noop(),
        }
    }

    pub(crate) fn increment_matched(&self, matched: bool) {
        if matched {
            self.matched.increment(1);
        } else {
            self.not_matched.increment(1);
        }
    }
}

/// 규칙 하나의 계측기 (전체 합산 + 이 파이프라인/스테이지 안에서)
#[derive(Clone)]
pub struct RuleMetrics {
    pub total: RuleCounters,
    pub local: RuleCounters,
    pub evaluate_time: Histogram,
    pub execute_time: Histogram,
}

impl RuleMetrics {
    pub fn register(registry: &dyn MetricRegistry, rule_id: &str, pipeline_id: &str, stage: i32) -> Self {
        Self {
            total: RuleCounters::register(registry, |suffix| names::rule_total(rule_id, suffix)),
            local: RuleCounters::register(registry, |suffix| {
                names::rule_in_stage(rule_id, pipeline_id, stage, suffix)
            }),
            evaluate_time: registry.histogram(&names::rule_timer(rule_id, "evaluate")),
            execute_time: registry.histogram(&names::rule_timer(rule_id, "execute")),
        }
    }

    pub fn noop() -> Self {
        Self {
            total: RuleCounters::noop(),
            local: RuleCounters::noop(),
            evaluate_time: Histogram::noop(),
            execute_time: Histogram::noop(),
        }
    }

    pub(crate) fn matched(&self, matched: bool) {
        self.total.increment_matched(matched);
        self.local.increment_matched(matched);
    }

    pub(crate) fn failed(&self) {
        self.total.failed.increment(1);
        self.local.failed.increment(1);
    }

    pub(crate) fn executed(&self) {
        self.total.executed.increment(1);
        self.local.executed.increment(1);
    }
}

/// 스테이지에 바인딩된 규칙
#[derive(Clone)]
pub struct StageRule {
    pub rule: Arc<Rule>,
    pub metrics: RuleMetrics,
}

/// 해석된 스테이지
#[derive(Clone)]
pub struct Stage {
    pub number: i32,
    pub match_policy: MatchPolicy,
    /// 선언된 규칙 이름 (해석 실패한 참조 포함)
    pub rule_references: Vec<String>,
    /// 해석에 성공한 규칙 (선언 순서)
    pub rules: Vec<StageRule>,
    pub executed: Counter,
}

impl Stage {
    /// 규칙 `matched`개가 일치했을 때 파이프라인이 다음 스테이지로 진행하는지
    pub fn should_continue(&self, matched: usize) -> bool {
        match self.match_policy {
            MatchPolicy::All => matched == self.rules.len(),
            MatchPolicy::Either => matched > 0 || self.rules.is_empty(),
            MatchPolicy::Pass => true,
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("number", &self.number)
            .field("match_policy", &self.match_policy)
            .field("rules", &self.rules.iter().map(|r| r.rule.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

/// 해석된 파이프라인
#[derive(Clone)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    /// 스테이지 번호 오름차순
    pub stages: Vec<Stage>,
    pub executed: Counter,
}

impl Pipeline {
    pub fn stage(&self, number: i32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.number == number)
    }

    /// 이 파이프라인이 참조하는 규칙 ID (중복 제거, 정렬)
    pub fn rule_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .stages
            .iter()
            .flat_map(|s| s.rules.iter().map(|r| r.rule.id().to_owned()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(policy: MatchPolicy, rules: usize) -> Stage {
        let rule = Arc::new(Rule {
            id: None,
            name: "r".to_owned(),
            when: crate::ast::Expr::new(crate::ast::ExprKind::Bool(true), Default::default()),
            then: vec![],
        });
        Stage {
            number: 0,
            match_policy: policy,
            rule_references: vec!["r".to_owned(); rules],
            rules: (0..rules)
                .map(|_| StageRule {
                    rule: rule.clone(),
                    metrics: RuleMetrics::noop(),
                })
                .collect(),
            executed: Counter::noop(),
        }
    }

    #[test]
    fn all_requires_every_rule() {
        assert!(stage(MatchPolicy::All, 2).should_continue(2));
        assert!(!stage(MatchPolicy::All, 2).should_continue(1));
        assert!(stage(MatchPolicy::All, 0).should_continue(0));
    }

    #[test]
    fn either_requires_one_rule_unless_empty() {
        assert!(stage(MatchPolicy::Either, 3).should_continue(1));
        assert!(!stage(MatchPolicy::Either, 3).should_continue(0));
        assert!(stage(MatchPolicy::Either, 0).should_continue(0));
    }

    #[test]
    fn pass_always_continues() {
        assert!(stage(MatchPolicy::Pass, 2).should_continue(0));
    }

    #[test]
    fn rule_ids_are_deduplicated() {
        let pipeline = Pipeline {
            id: "p".to_owned(),
            name: "p".to_owned(),
            stages: vec![stage(MatchPolicy::All, 2)],
            executed: Counter::noop(),
        };
        assert_eq!(pipeline.rule_ids(), vec!["r".to_owned()]);
        assert!(pipeline.stage(0).is_some());
        assert!(pipeline.stage(1).is_none());
    }

    #[test]
    fn rule_metrics_register_under_rule_prefix() {
        let registry = crate::metrics::InMemoryMetricRegistry::new();
        let metrics = RuleMetrics::register(&registry, "r1", "p1", 0);
        metrics.matched(true);
        metrics.executed();
        assert_eq!(registry.counter_value("pipewright.rule.r1.matched"), Some(1));
        assert_eq!(registry.counter_value("pipewright.rule.r1.p1.0.matched"), Some(1));
        assert_eq!(registry.counter_value("pipewright.rule.r1.executed"), Some(1));
        assert_eq!(registry.remove_matching(&names::rule_prefix("r1")), 10);
    }
}
