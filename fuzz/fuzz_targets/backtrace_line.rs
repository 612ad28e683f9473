#![no_main]

use faultline_core::decode::legacy::parse_backtrace_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Some(frame) = parse_backtrace_line(line) {
            let rendered = format!("{}:{}:in `{}'", frame.file, frame.line, frame.method);
            let _ = parse_backtrace_line(&rendered);
        }
    }
});
