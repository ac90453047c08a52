#![no_main]

use differ_core::config::TracebackConfig;
use differ_scanner::TracebackParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(parser) = TracebackParser::from_config(&TracebackConfig::default()) else {
        return;
    };

    // any block yields a ParsedBlock without panicking
    let parsed = parser.parse(data);
    if let Some(location) = parsed.location {
        assert!(data.contains(location.as_str()));
    }
});
