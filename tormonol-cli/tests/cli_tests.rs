//! Tests for the `tormonol` binary
//!
//! Only commands that need no network or terminal: config printing and key management.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const PASSWORD: &str = "correct horse battery staple";

fn tormonol(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tormonol"))
        .args(args)
        .env("TORMONOL_KEY_PASSWORD", PASSWORD)
        .env_remove("TORMONOL_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tormonol")
}

fn key_dir_arg(dir: &Path) -> String {
    dir.to_string_lossy().into_owned()
}

#[test]
fn test_print_config_is_toml() {
    let output = tormonol(&["print-config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    for section in ["[server]", "[auth]", "[handshake]", "[shell]", "[logging]", "[metrics]"] {
        assert!(stdout.contains(section), "missing {} in\n{}", section, stdout);
    }
}

#[test]
fn test_print_config_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tormonol.toml");
    std::fs::write(
        &path,
        "[server]\nbind_address = \"0.0.0.0:4100\"\nshutdown_timeout = \"5s\"\nexpose_failure_reasons = true\n",
    )
    .unwrap();

    let output = tormonol(&["--config", path.to_str().unwrap(), "print-config"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("0.0.0.0:4100"));
}

#[test]
fn test_keygen_writes_key_pair() {
    let dir = TempDir::new().unwrap();
    let key_dir = dir.path().join("keys");
    let authorized = dir.path().join("authorized.pub.pem");

    let output = Command::new(env!("CARGO_BIN_EXE_tormonol"))
        .args(["keygen", "--key-dir", &key_dir_arg(&key_dir), "--authorize"])
        .env("TORMONOL_KEY_PASSWORD", PASSWORD)
        .env("TORMONOL_AUTH_AUTHORIZED_KEY_PATH", &authorized)
        .env_remove("TORMONOL_CONFIG")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert!(key_dir.join("identity.key.enc").exists());
    let public = std::fs::read_to_string(key_dir.join("identity.pub.pem")).unwrap();
    assert!(public.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert_eq!(std::fs::read_to_string(&authorized).unwrap(), public);
}

#[test]
fn test_keygen_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let key_dir = key_dir_arg(dir.path());

    assert!(tormonol(&["keygen", "--key-dir", &key_dir]).status.success());
    let before = std::fs::read(dir.path().join("identity.key.enc")).unwrap();

    let again = tormonol(&["keygen", "--key-dir", &key_dir]);
    assert!(!again.status.success());
    assert_eq!(std::fs::read(dir.path().join("identity.key.enc")).unwrap(), before);

    assert!(tormonol(&["keygen", "--key-dir", &key_dir, "--force"]).status.success());
    assert_ne!(std::fs::read(dir.path().join("identity.key.enc")).unwrap(), before);
}

#[test]
fn test_connect_without_key_fails() {
    let dir = TempDir::new().unwrap();
    let output = tormonol(&[
        "connect",
        "http://127.0.0.1:9",
        "--key-dir",
        &key_dir_arg(dir.path()),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_connect_with_wrong_password_fails() {
    let dir = TempDir::new().unwrap();
    let key_dir = key_dir_arg(dir.path());
    assert!(tormonol(&["keygen", "--key-dir", &key_dir]).status.success());

    let output = Command::new(env!("CARGO_BIN_EXE_tormonol"))
        .args(["connect", "http://127.0.0.1:9", "--key-dir", &key_dir])
        .env("TORMONOL_KEY_PASSWORD", "wrong")
        .env_remove("TORMONOL_CONFIG")
        .output()
        .unwrap();
    assert!(!output.status.success());
}
