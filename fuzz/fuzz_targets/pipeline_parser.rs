#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use pipewright_rule_engine::{FunctionRegistry, RuleParser};

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let parser = RuleParser::new(Arc::new(FunctionRegistry::new()));
        if let Ok(pipelines) = parser.parse_pipelines(source) {
            // 스테이지는 번호 오름차순, 중복 없음
            for pipeline in pipelines {
                assert!(pipeline.stages.windows(2).all(|w| w[0].number < w[1].number));
            }
        }
    }
});
