#![no_main]

use libfuzzer_sys::fuzz_target;
use tormonol_core::core_frame::{Dimensions, Frame};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must re-encode to the same bytes
    if let Ok(frame) = Frame::decode(data) {
        if let Frame::Data { .. } = frame {
            assert_eq!(frame.encode(), data);
        }
    }

    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(dims) = text.parse::<Dimensions>() {
            assert!(dims.cols > 0 && dims.rows > 0);
        }
    }
});
