#![no_main]

use cabload::BatchReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a CSV body under a fixed header
    let mut input = b"tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,store_and_fwd_flag,PULocationID,DOLocationID,fare_amount,tip_amount\n".to_vec();
    input.extend_from_slice(data);

    if let Ok(reader) = BatchReader::from_reader(input.as_slice(), 3) {
        for item in reader {
            let _ = item;
        }
    }
});
