#![no_main]

use faultline_core::decode::{Decoder, WireFormat};
use faultline_core::filter::BacktraceFilter;
use faultline_core::render::{Dialect, render};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(notice) = WireFormat::Legacy.decoder().decode(data) {
        let filtered = BacktraceFilter::builtin().apply(&notice.backtrace);
        assert!(filtered.frames.len() <= notice.backtrace.len());
        let _ = render(
            Dialect::Markdown,
            &notice.error_message,
            &filtered.frames,
            &notice,
            &notice.backtrace,
        );
    }
});
