#![no_main]
use libfuzzer_sys::fuzz_target;
use voxprep::npy;

fuzz_target!(|data: &[u8]| {
    if let Ok(array) = npy::read_npy(data) {
        let _ = array.dtype();
        let _ = array.nbytes();
        let _ = npy::to_bytes(&array);
    }
});
