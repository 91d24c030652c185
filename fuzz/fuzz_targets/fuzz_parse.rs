#![no_main]

use heif_container::{finalize_and_write, read_file};
use libfuzzer_sys::fuzz_target;

/// Parser fuzzer: arbitrary bytes must either fail cleanly or produce a
/// tree that re-serializes and re-parses to the same tree.
fuzz_target!(|data: &[u8]| {
    let Ok(mut tree) = read_file(data, &enough::Unstoppable) else {
        return;
    };
    let Ok(bytes) = finalize_and_write(&mut tree) else {
        return;
    };
    let reparsed = read_file(&bytes, &enough::Unstoppable).expect("rewritten file must parse");
    assert_eq!(reparsed, tree);
});
