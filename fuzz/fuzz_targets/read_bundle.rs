#![no_main]
use libfuzzer_sys::fuzz_target;
use voxprep::Bundle;

fuzz_target!(|data: &[u8]| {
    if let Ok(bundle) = Bundle::from_bytes(data) {
        for (name, _) in &bundle {
            let _ = bundle.scalar(name);
        }
    }
});
