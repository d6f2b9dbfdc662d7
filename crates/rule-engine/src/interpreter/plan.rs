//! 스테이지 실행 계획
//!
//! 여러 파이프라인을 함께 실행할 때 같은 스테이지 번호끼리 묶어(slice) 번호 오름차순으로
//! 실행합니다. 한 slice 안에서는 파이프라인 ID 순서를 따릅니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::pipeline::{Pipeline, Stage};

/// 같은 스테이지 번호를 가진 (파이프라인, 스테이지 인덱스) 묶음
#[derive(Debug, Clone)]
pub struct StageSlice {
    pub number: i32,
    entries: Vec<(Arc<Pipeline>, usize)>,
}

impl StageSlice {
    pub fn stages(&self) -> impl Iterator<Item = (&Arc<Pipeline>, &Stage)> {
        self.entries
            .iter()
            .filter_map(|(pipeline, index)| pipeline.stages.get(*index).map(|s| (pipeline, s)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StagePlan {
    slices: Vec<StageSlice>,
}

impl StagePlan {
    /// 파이프라인 목록(ID 순)으로 계획을 만듭니다.
    pub fn build(pipelines: &[Arc<Pipeline>]) -> Self {
        let mut by_number: BTreeMap<i32, Vec<(Arc<Pipeline>, usize)>> = BTreeMap::new();
        for pipeline in pipelines {
            for (index, stage) in pipeline.stages.iter().enumerate() {
                by_number
                    .entry(stage.number)
                    .or_default()
                    .push((Arc::clone(pipeline), index));
            }
        }
        Self {
            slices: by_number
                .into_iter()
                .map(|(number, entries)| StageSlice { number, entries })
                .collect(),
        }
    }

    pub fn slices(&self) -> &[StageSlice] {
        &self.slices
    }

    /// 계획 캐시 키 (정렬된 파이프라인 ID)
    pub fn cache_key(pipelines: &[Arc<Pipeline>]) -> Vec<String> {
        let mut key: Vec<String> = pipelines.iter().map(|p| p.id.clone()).collect();
        key.sort();
        key
    }
}

#[cfg(test)]
mod tests {
    use metrics::Counter;

    use super::*;
    use crate::ast::MatchPolicy;

    fn pipeline(id: &str, stages: &[i32]) -> Arc<Pipeline> {
        Arc::new(Pipeline {
            id: id.to_owned(),
            name: id.to_owned(),
            stages: stages
                .iter()
                .map(|&number| Stage {
                    number,
                    match_policy: MatchPolicy::Either,
                    rule_references: vec![],
                    rules: vec![],
                    executed: Counter::noop(),
                })
                .collect(),
            executed: Counter::noop(),
        })
    }

    #[test]
    fn slices_interleave_pipelines_by_stage_number() {
        let plan = StagePlan::build(&[pipeline("a", &[-1, 5]), pipeline("b", &[0, 5])]);
        let numbers: Vec<i32> = plan.slices().iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![-1, 0, 5]);
        let last: Vec<&str> = plan.slices()[2].stages().map(|(p, _)| p.id.as_str()).collect();
        assert_eq!(last, vec!["a", "b"]);
    }

    #[test]
    fn cache_key_is_order_independent() {
        let a = pipeline("a", &[0]);
        let b = pipeline("b", &[0]);
        assert_eq!(
            StagePlan::cache_key(&[b.clone(), a.clone()]),
            StagePlan::cache_key(&[a, b])
        );
    }

    #[test]
    fn empty_input_has_no_slices() {
        assert!(StagePlan::build(&[]).slices().is_empty());
    }
}
