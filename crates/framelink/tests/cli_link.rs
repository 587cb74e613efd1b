#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/framelink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn framelink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_framelink"));
    for var in [
        "FRAMELINK_DEVICE",
        "FRAMELINK_SOCKET",
        "FRAMELINK_ACK_TIMEOUT",
        "FRAMELINK_MAX_RETRIES",
        "FRAMELINK_TICK",
    ] {
        cmd.env_remove(var);
    }
    cmd.arg("--log-level").arg("error");
    cmd
}

fn wait_for_path(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("{} never appeared", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return Some(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return None;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn send_against_serve_is_acknowledged_and_echoed() {
    let dir = unique_temp_dir("echo");
    let sock_path = dir.join("device.sock");

    let mut server = framelink()
        .arg("serve")
        .arg(&sock_path)
        .arg("--once")
        .arg("--tick")
        .arg("10ms")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_path(&sock_path, Duration::from_secs(3));

    let output = framelink()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg("--unix")
        .arg(&sock_path)
        .arg("--command")
        .arg("0x05")
        .arg("--data")
        .arg("hello")
        .arg("--tick")
        .arg("10ms")
        .arg("--wait")
        .arg("--wait-timeout")
        .arg("3s")
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("reply should be json");
    assert_eq!(reply["command"], 5);
    assert_eq!(reply["payload"], "hello");

    let status = wait_with_timeout(&mut server, Duration::from_secs(5));
    assert!(
        status.is_some_and(|s| s.success()),
        "serve --once should exit cleanly"
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_exits_on_interrupt_while_no_client_is_connected() {
    let dir = unique_temp_dir("sigint");
    let sock_path = dir.join("device.sock");

    let mut server = framelink()
        .arg("serve")
        .arg(&sock_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_path(&sock_path, Duration::from_secs(3));
    // The interrupt handler goes in right after the bind.
    thread::sleep(Duration::from_millis(300));

    let signalled = Command::new("kill")
        .arg("-INT")
        .arg(server.id().to_string())
        .status()
        .expect("kill should run");
    assert!(signalled.success());

    let status = wait_with_timeout(&mut server, Duration::from_secs(5));
    assert!(
        status.is_some_and(|s| s.success()),
        "serve should stop cleanly on interrupt"
    );
    assert!(!sock_path.exists(), "socket file should be removed on exit");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_prints_message_and_acknowledges_it() {
    let dir = unique_temp_dir("listen");
    let sock_path = dir.join("device.sock");
    let listener = UnixListener::bind(&sock_path).expect("test socket should bind");

    let child = framelink()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg("--unix")
        .arg(&sock_path)
        .arg("--count")
        .arg("1")
        .arg("--tick")
        .arg("10ms")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen should start");

    let (mut device, _) = listener.accept().expect("listen should connect");
    device
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should be settable");

    // Leading noise, then command 0x02 carrying "1".
    device
        .write_all(&[0x13, 0x37, 0xAA, 0x02, 0x01, 0x34, 0x31, 0x55])
        .expect("frame should be written");

    let mut ack = [0u8; 6];
    device.read_exact(&mut ack).expect("ack should arrive");
    assert_eq!(ack, [0xAA, 0x01, 0x01, 0x04, 0x02, 0x55]);

    let output = child.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    let message: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("message should be json");
    assert_eq!(message["command"], 2);
    assert_eq!(message["payload"], "1");
    assert_eq!(message["payload_size"], 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unanswered_send_fails_after_retries() {
    let dir = unique_temp_dir("silent");
    let sock_path = dir.join("device.sock");
    let listener = UnixListener::bind(&sock_path).expect("test socket should bind");

    let accept = thread::spawn(move || {
        let (mut device, _) = listener.accept().expect("send should connect");
        let mut received = Vec::new();
        let _ = device.read_to_end(&mut received);
        received
    });

    let output = framelink()
        .arg("send")
        .arg("--unix")
        .arg(&sock_path)
        .arg("--hex")
        .arg("31")
        .arg("--ack-timeout")
        .arg("50ms")
        .arg("--max-retries")
        .arg("2")
        .arg("--tick")
        .arg("10ms")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not acknowledged"));

    let received = accept.join().expect("device thread should finish");
    let frame = [0xAA, 0x02, 0x01, 0x34, 0x31, 0x55];
    assert_eq!(received, frame.repeat(3));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn oversized_payload_is_rejected_before_connecting() {
    let output = framelink()
        .arg("send")
        .arg("--unix")
        .arg("/nonexistent/framelink.sock")
        .arg("--data")
        .arg("x".repeat(251))
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn missing_socket_is_transport_error() {
    let output = framelink()
        .arg("send")
        .arg("--unix")
        .arg("/nonexistent/framelink.sock")
        .arg("--data")
        .arg("hi")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_reports_name() {
    let output = framelink()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("framelink "));
}
