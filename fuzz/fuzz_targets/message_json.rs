#![no_main]

use libfuzzer_sys::fuzz_target;
use pipewright_core::message::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Ok(mut message) = Message::from_json(json) {
            let _ = serde_json::to_string(&message);
            message.flush_processing_errors();
        }
    }
});
