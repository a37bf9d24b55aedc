#![no_main]

use cabload::timestamp::parse_eastern_timestamp;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Rejections are fine; we only care about panics.
        let _ = parse_eastern_timestamp("tpep_pickup_datetime", input);
    }
});
