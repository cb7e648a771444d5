#![no_main]
use libfuzzer_sys::fuzz_target;
use voxprep::{Codec, Payload};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = Codec::default().decode(data) {
        if let Payload::Array(array) = payload {
            let _ = array.shape();
            let _ = array.scalar_value();
        }
    }
});
