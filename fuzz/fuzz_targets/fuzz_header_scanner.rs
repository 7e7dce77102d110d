#![no_main]

use libfuzzer_sys::fuzz_target;
use loomhttp::scanner::find_terminator;

fuzz_target!(|data: &[u8]| {
    let _ = find_terminator(data);
});
