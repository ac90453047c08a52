#![no_main]

use arbitrary::Arbitrary;
use differ_scanner::truncate;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    content: String,
    limit: u16,
    suffix: String,
}

fuzz_target!(|input: FuzzInput| {
    let limit = usize::from(input.limit);
    let once = truncate(&input.content, limit, &input.suffix).into_owned();
    let suffix_len = input.suffix.chars().count();

    assert!(once.chars().count() <= limit.max(suffix_len));
    assert_eq!(truncate(&once, limit, &input.suffix), once.as_str());
});
