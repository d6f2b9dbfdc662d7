#![no_main]

use libfuzzer_sys::fuzz_target;
use pipewright_rule_engine::filter::TomlFilterSource;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(filters) = TomlFilterSource::parse(content, "fuzz/filters.toml") {
            // 파싱을 통과한 필터는 모두 검증을 통과해야 함
            assert!(filters.iter().all(|f| f.validate().is_ok()));
        }
    }
});
