#![no_main]

use libfuzzer_sys::fuzz_target;
use tormonol_core::core_frame::FrameCipher;

fuzz_target!(|data: &[u8]| {
    // Forged frames must be rejected without panicking
    let cipher = FrameCipher::new(&[0x5a; 16]);
    assert!(cipher.open_frame(data).is_err());
});
