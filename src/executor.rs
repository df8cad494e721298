//! Command execution: send a line, accumulate output until the server
//! goes quiet or a hard ceiling is hit.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use log::trace;

use crate::buffer::ReadMode;
use crate::error::TelnetError;
use crate::reader::Shared;

const POLL: Duration = Duration::from_millis(50);
const SCRATCH_SIZE: usize = 4096;

/// Send `command + "\n"` and accumulate inbound bytes until no new bytes
/// arrive for `idle_ms`, or until `total_ms` have elapsed since the send
/// (`spec.md` §4.6). Does not parse the output; returns exactly what the
/// server emitted in that window.
pub fn execute(shared: &Shared, command: &str, idle_ms: u64, total_ms: u64) -> Result<String, TelnetError> {
    let mut line = command.to_owned();
    line.push('\n');
    {
        let binary_send = shared.binary_send_enabled.load(Ordering::SeqCst);
        let binary_receive = shared.binary_receive_enabled.load(Ordering::SeqCst);
        let mut transport = shared.transport.lock().expect("transport mutex poisoned");
        transport.send_text(line.as_bytes(), binary_send, binary_receive)?;
    }

    let idle_timeout = Duration::from_millis(idle_ms);
    let total_timeout = Duration::from_millis(total_ms);
    let start = Instant::now();
    let mut last_read_at = start;
    let mut out = Vec::new();

    loop {
        let chunk = shared.inbound.read(SCRATCH_SIZE, ReadMode::Destructive, POLL);
        if !chunk.is_empty() {
            trace!("execute drained {} bytes", chunk.len());
            out.extend_from_slice(&chunk);
            last_read_at = Instant::now();
        }
        if last_read_at.elapsed() > idle_timeout || start.elapsed() > total_timeout {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Drain whatever the server sent unprompted right after login (the
/// MOTD/banner). Implemented literally as `execute("", …)`, reusing the
/// same quiescence loop rather than a separate code path (`spec.md`
/// §4.6).
pub fn flush_banner(shared: &Shared, idle_ms: u64, total_ms: u64) -> Result<String, TelnetError> {
    execute(shared, "", idle_ms, total_ms)
}
