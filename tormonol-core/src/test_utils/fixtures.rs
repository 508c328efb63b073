//! Key and config fixtures

use std::time::Duration;

use crate::config::Config;
use crate::core_crypto::{DirectionKeys, Role};
use crate::core_frame::Dimensions;

/// Matching key sets for both ends of one session
pub fn session_key_pair() -> (DirectionKeys, DirectionKeys) {
    let c2s = [0x11u8; 16];
    let s2c = [0x22u8; 16];
    (
        DirectionKeys::from_raw(c2s, s2c, Role::Initiator),
        DirectionKeys::from_raw(c2s, s2c, Role::Responder),
    )
}

/// Config with short lifetimes and a deterministic shell for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.bind_address = ([127, 0, 0, 1], 0).into();
    config.server.shutdown_timeout = Duration::from_millis(500);
    config.server.expose_failure_reasons = true;
    config.handshake.sweep_interval = Duration::from_millis(100);
    config.shell.program = "/bin/sh".to_string();
    config.shell.cwd = None;
    config.shell.default_dimensions = Dimensions { cols: 100, rows: 30 };
    config
}
