#![no_main]

use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;
use pipewright_rule_engine::{FunctionRegistry, RuleParser};

fn parser() -> &'static RuleParser {
    static PARSER: OnceLock<RuleParser> = OnceLock::new();
    PARSER.get_or_init(|| RuleParser::new(Arc::new(FunctionRegistry::with_builtins())))
}

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // 에러는 위치를 가져야 함 (줄은 1부터)
        if let Err(errors) = parser().parse_rule(source) {
            assert!(!errors.is_empty());
            assert!(errors.iter().all(|e| e.line >= 1));
        }
    }
});
