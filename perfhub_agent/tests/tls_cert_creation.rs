use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

fn expected_paths(config_home: &Path) -> (PathBuf, PathBuf) {
    let base = config_home.join("perfhub_agent").join("tls");
    (base.join("cert.pem"), base.join("key.pem"))
}

#[test]
fn generates_self_signed_cert_and_key_in_xdg_path() {
    let tmpdir = tempfile::tempdir().expect("tempdir");
    let xdg = tmpdir.path().to_path_buf();

    let mut child = Command::cargo_bin("perfhub_agent")
        .expect("binary exists")
        .env("XDG_CONFIG_HOME", &xdg)
        .args(["--enableSSL", "-p", "0"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn agent");

    let (cert_path, key_path) = expected_paths(&xdg);
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(3) {
        if cert_path.exists() && key_path.exists() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let _ = child.kill();
    let _ = child.wait();

    assert!(cert_path.exists(), "cert not found at {}", cert_path.display());
    assert!(key_path.exists(), "key not found at {}", key_path.display());
    let cert = fs::read_to_string(&cert_path).expect("read cert");
    let key = fs::read_to_string(&key_path).expect("read key");
    assert!(cert.contains("BEGIN CERTIFICATE"));
    assert!(key.contains("PRIVATE KEY"));
}
