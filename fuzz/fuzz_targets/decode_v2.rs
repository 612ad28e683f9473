#![no_main]

use faultline_core::decode::{Decoder, WireFormat};
use faultline_core::summary::{MAX_SUBJECT_CHARS, subject};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(notice) = WireFormat::V2.decoder().decode(data) {
        let text = subject(
            &notice.environment_name,
            &notice.error_class,
            notice.backtrace.first(),
        );
        assert!(text.chars().count() <= MAX_SUBJECT_CHARS);
    }
});
