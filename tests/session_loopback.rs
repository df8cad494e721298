//! End-to-end loopback tests exercising `Session` against a hand-written
//! fake server thread, covering the concrete scenarios in `spec.md` §8:
//! refuse-all negotiation, binary option acceptance, login failure, and
//! execute quiescence. (The escape-round-trip scenario is exercised at
//! the wire-codec level in `src/telnet.rs`'s unit tests, since
//! `Session::execute` takes a `&str` and can't carry a raw, non-UTF-8
//! `0xFF` byte the way the language-neutral contract's byte buffer can.)

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use rtelnet::{Session, SessionConfig, TelnetError};

const IAC: u8 = 0xFF;
const WILL: u8 = 251;
const DO: u8 = 253;
const WONT: u8 = 252;

fn bind_loopback() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn expect_bytes(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(buf, expected);
}

fn read_until_newline(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).unwrap();
        if byte[0] == b'\n' {
            break;
        }
        out.push(byte[0]);
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[test]
fn refuse_all_negotiation_then_successful_login_and_execute() {
    let (listener, port) = bind_loopback();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();

        // scenario 1: DO ECHO -> WONT ECHO.
        stream.write_all(&[IAC, DO, 1]).unwrap();
        expect_bytes(&mut stream, &[IAC, WONT, 1]);

        stream.write_all(b"login:").unwrap();
        let username = read_until_newline(&mut stream);
        assert_eq!(username, "alice");

        stream.write_all(b"Password:").unwrap();
        let password = read_until_newline(&mut stream);
        assert_eq!(password, "hunter2");

        stream.write_all(b"welcome$ ").unwrap();

        let command = read_until_newline(&mut stream);
        assert_eq!(command, "echo hello");
        stream.write_all(b"hello\n").unwrap();

        thread::sleep(Duration::from_millis(300));
    });

    let config = SessionConfig::new("127.0.0.1", "alice", "hunter2")
        .port(port)
        .idle_ms(200)
        .total_ms(5000);
    let mut session = Session::new(config);
    session.connect().expect("connect should succeed");
    assert!(session.is_negotiated());
    assert!(session.is_logged_in());

    let out = session.execute("echo hello").expect("execute should succeed");
    assert!(out.contains("hello"));

    server.join().unwrap();
}

#[test]
fn accept_binary_option_in_both_directions() {
    let (listener, port) = bind_loopback();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();

        // scenario 2: DO BINARY -> WILL BINARY.
        stream.write_all(&[IAC, DO, 0]).unwrap();
        expect_bytes(&mut stream, &[IAC, WILL, 0]);

        // scenario 3: WILL BINARY -> DO BINARY.
        stream.write_all(&[IAC, WILL, 0]).unwrap();
        expect_bytes(&mut stream, &[IAC, DO, 0]);

        stream.write_all(b"login:").unwrap();
        read_until_newline(&mut stream);
        stream.write_all(b"Password:").unwrap();
        read_until_newline(&mut stream);
        stream.write_all(b"# ").unwrap();

        thread::sleep(Duration::from_millis(300));
    });

    let config = SessionConfig::new("127.0.0.1", "alice", "hunter2").port(port);
    let mut session = Session::new(config);
    session.connect().expect("connect should succeed");
    assert!(session.is_negotiated());

    server.join().unwrap();
}

#[test]
fn login_failure_reports_failed_login_and_leaves_logged_in_false() {
    let (listener, port) = bind_loopback();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();

        stream.write_all(&[IAC, DO, 1]).unwrap();
        expect_bytes(&mut stream, &[IAC, WONT, 1]);

        stream.write_all(b"login:").unwrap();
        read_until_newline(&mut stream);
        stream.write_all(b"Password:").unwrap();
        read_until_newline(&mut stream);
        stream.write_all(b"Login incorrect\r\n").unwrap();

        thread::sleep(Duration::from_millis(200));
    });

    let config = SessionConfig::new("127.0.0.1", "alice", "wrong-password").port(port);
    let mut session = Session::new(config);
    let err = session.connect().unwrap_err();
    assert!(matches!(err, TelnetError::FailedLogin));
    assert!(!session.is_logged_in());

    server.join().unwrap();
}

#[test]
fn execute_quiesces_on_idle_timeout_within_expected_window() {
    let (listener, port) = bind_loopback();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();

        stream.write_all(&[IAC, DO, 1]).unwrap();
        expect_bytes(&mut stream, &[IAC, WONT, 1]);

        stream.write_all(b"login:").unwrap();
        read_until_newline(&mut stream);
        stream.write_all(b"Password:").unwrap();
        read_until_newline(&mut stream);
        stream.write_all(b"$ ").unwrap();

        let command = read_until_newline(&mut stream);
        assert_eq!(command, "echo hello");
        stream.write_all(b"hello\n").unwrap();
        // then silence: the executor should quiesce on idle_ms, not
        // total_ms.

        thread::sleep(Duration::from_millis(400));
    });

    let config = SessionConfig::new("127.0.0.1", "alice", "hunter2")
        .port(port)
        .idle_ms(200)
        .total_ms(5000);
    let mut session = Session::new(config);
    session.connect().expect("connect should succeed");

    let start = std::time::Instant::now();
    let out = session.execute("echo hello").expect("execute should succeed");
    let elapsed = start.elapsed();

    assert!(out.contains("hello\n"));
    assert!(elapsed < Duration::from_millis(1000), "expected quiescence well before total_ms, took {elapsed:?}");

    server.join().unwrap();
}
