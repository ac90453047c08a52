#![no_main]

use std::io::Cursor;

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use differ_core::config::{ExtractConfig, TracebackConfig};
use differ_scanner::BlockExtractor;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// tail budget, clamped to 1..=16
    max_lines: u8,
    /// per-line cap, clamped to 1..=300
    max_line_length: u16,
    data: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let config = ExtractConfig {
        max_lines: usize::from(input.max_lines % 16) + 1,
        max_line_length: usize::from(input.max_line_length % 300) + 1,
        ..ExtractConfig::default()
    };
    let Ok(extractor) = BlockExtractor::new(&config, &TracebackConfig::default()) else {
        return;
    };
    let Some(now) = Utc.timestamp_opt(1_700_000_000, 0).single() else {
        return;
    };

    let end = input.data.len() as u64;
    let Ok(outcome) = extractor.extract(Cursor::new(&input.data), 0, end, "/fuzz.log", now) else {
        return;
    };

    // every byte is consumed and every block respects the budget
    assert_eq!(outcome.offset, end);
    for record in &outcome.records {
        assert!(record.raw_message.lines().count() <= config.max_lines + 1);
    }
});
