//! Username/password login against a line-oriented shell banner.
//!
//! The expect/send/detect shape and its constants come directly from the
//! login steps laid out for this crate; `examples/original_source` carries
//! no login routine to crib from (its `rtelnet.cpp` only drives `Connect`/
//! `FlushBanner` on a class whose definition was never captured). The
//! retry-then-timeout loop itself is layered on
//! [`crate::buffer::InboundBuffer::read`]'s own poll-and-timeout loop.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{debug, warn};
use regex::Regex;

use crate::buffer::ReadMode;
use crate::error::TelnetError;
use crate::reader::Shared;

/// Post-password probe window (`spec.md` §6's `LOGIN_TIMEOUT`).
pub const LOGIN_TIMEOUT: Duration = Duration::from_millis(3000);

/// `expect`'s retry ceiling: 300 iterations of 200 ms is a ≈60 s
/// wall-clock budget (`spec.md` §4.5 step 1).
const EXPECT_ITERATIONS: u32 = 300;
const EXPECT_INTERVAL: Duration = Duration::from_millis(200);

/// Poll granularity for the post-password probe.
const PROBE_POLL: Duration = Duration::from_millis(100);

fn prompt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[$>#]").expect("static prompt pattern is valid"))
}

fn strip_crlf(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().filter(|&c| c != '\r' && c != '\n').collect()
}

/// Repeatedly read (destructively) until `needle` appears in the
/// accumulated, CR/LF-stripped text, or the retry ceiling is hit.
fn expect(shared: &Shared, needle: &str) -> Result<(), TelnetError> {
    let mut accumulated = String::new();
    for _ in 0..EXPECT_ITERATIONS {
        let chunk = shared.inbound.read(4096, ReadMode::Destructive, EXPECT_INTERVAL);
        if chunk.is_empty() {
            continue;
        }
        accumulated.push_str(&strip_crlf(&chunk));
        if accumulated.contains(needle) {
            return Ok(());
        }
    }
    warn!("timed out waiting for {needle:?}");
    Err(TelnetError::CantFindExpected)
}

fn send_line(shared: &Shared, text: &str) -> Result<(), TelnetError> {
    let mut line = text.to_owned();
    line.push('\n');
    let binary_send = shared.binary_send_enabled.load(std::sync::atomic::Ordering::SeqCst);
    let binary_receive = shared.binary_receive_enabled.load(std::sync::atomic::Ordering::SeqCst);
    let mut transport = shared.transport.lock().expect("transport mutex poisoned");
    transport.send_text(line.as_bytes(), binary_send, binary_receive)
}

/// Detect whether the post-password banner indicates success or failure.
///
/// Peek-reads (never consuming) and re-accumulates from the start of the
/// buffer each pass, since the executor/`flush_banner` that follows login
/// still needs to drain these same bytes. Bounded by [`LOGIN_TIMEOUT`];
/// a timeout without either verdict is treated as success, since the
/// banner may suppress prompt characters entirely (`spec.md` §4.5 step 5).
fn detect_login_outcome(shared: &Shared) -> Result<(), TelnetError> {
    let deadline = Instant::now() + LOGIN_TIMEOUT;
    loop {
        let peeked = shared.inbound.read(4096, ReadMode::Peek, PROBE_POLL);
        let text = strip_crlf(&peeked);
        if text.contains("Login incorrect") {
            return Err(TelnetError::FailedLogin);
        }
        if prompt_pattern().is_match(&text) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            debug!("login probe window elapsed with no verdict, assuming success");
            return Ok(());
        }
    }
}

/// Drive the full login sub-protocol. Precondition (checked by the
/// caller): connected, negotiated, and both credentials non-empty.
pub fn login(shared: &Shared, username: &str, password: &str) -> Result<(), TelnetError> {
    expect(shared, "login:")?;
    send_line(shared, username)?;
    expect(shared, "Password:")?;
    send_line(shared, password)?;
    detect_login_outcome(shared)
}
