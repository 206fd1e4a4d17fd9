//! CLI arg handling for the perfhub_agent binary.
use assert_cmd::prelude::*;
use std::process::{Command, Stdio};
use std::time::Duration;

#[test]
fn accepts_long_short_and_assigned_port_flags() {
    let exe = env!("CARGO_BIN_EXE_perfhub_agent");
    for args in [&["--port", "0"][..], &["-p", "0"], &["--port=0"]] {
        let mut child = Command::new(exe)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn agent");
        std::thread::sleep(Duration::from_millis(150));
        // Still running means the flags parsed and the listener bound.
        assert!(
            child.try_wait().expect("try_wait").is_none(),
            "agent exited early with {args:?}"
        );
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[test]
fn help_prints_usage_and_exits_cleanly() {
    let out = Command::cargo_bin("perfhub_agent")
        .expect("binary exists")
        .arg("--help")
        .output()
        .expect("run agent");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Usage"), "unexpected help text: {stdout}");
    assert!(stdout.contains("--enableSSL"));
}

#[test]
fn bad_port_exits_with_usage_error() {
    let out = Command::cargo_bin("perfhub_agent")
        .expect("binary exists")
        .args(["--port", "notaport"])
        .output()
        .expect("run agent");
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("notaport"), "unexpected stderr: {stderr}");
}
