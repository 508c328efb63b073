#![no_main]

use libfuzzer_sys::fuzz_target;
use tormonol_core::config::HandshakeConfig;
use tormonol_core::core_crypto::SigningIdentity;
use tormonol_core::HandshakeCoordinator;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    let coordinator = HandshakeCoordinator::new(
        SigningIdentity::generate().trust_anchor(),
        &HandshakeConfig::default(),
    );
    // Nothing was issued, so every body must be refused
    assert!(coordinator.ticket(body).is_err());
    assert!(coordinator.salt(body).is_err());
    if let Some((id, token)) = body.split_once('?') {
        assert!(coordinator.admit(id, token).is_err());
    }
});
