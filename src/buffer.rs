//! Mutex-protected inbound byte queue shared between the reader thread and
//! synchronous callers.
//!
//! Grounded on `its-laika-telnet_server`'s `telnet::state::State`, which
//! holds an `output_buffer: Vec<u8>` behind a shared lock and exposes it
//! through `impl Read`. Here the queue is its own type rather than an
//! `io::Read` impl, since callers need both destructive and peek reads
//! (`spec.md` §4.4), which `std::io::Read` has no vocabulary for.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval used while waiting for more bytes to arrive.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Whether a read consumes the bytes it copies out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Destructive,
    Peek,
}

/// FIFO byte queue. Bytes are appended by the reader thread in the order
/// they were received from the socket, after IAC triples have been
/// stripped; they are removed only by destructive reads from a
/// synchronous caller.
#[derive(Default)]
pub struct InboundBuffer(Mutex<Vec<u8>>);

impl InboundBuffer {
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    /// Append bytes received from the socket. Called only by the reader
    /// thread.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.0.lock().expect("inbound buffer mutex poisoned").extend_from_slice(bytes);
    }

    /// Copy up to `max` buffered bytes into a fresh `Vec`, optionally
    /// removing them. A single non-blocking attempt; see [`Self::read`]
    /// for the polling version callers actually use.
    fn try_take(&self, max: usize, mode: ReadMode) -> Vec<u8> {
        let mut guard = self.0.lock().expect("inbound buffer mutex poisoned");
        let take = max.min(guard.len());
        let out = guard[..take].to_vec();
        if mode == ReadMode::Destructive {
            guard.drain(..take);
        }
        out
    }

    /// Poll until at least one byte is available or `timeout` elapses,
    /// per `spec.md` §4.4: acquire the mutex, copy up to `max` bytes,
    /// erase the copied prefix unless `mode` is `Peek`; if nothing was
    /// available, sleep 10 ms and retry until the deadline, then return
    /// an empty result successfully (timing out is not an error here —
    /// only the login driver and executor treat an empty result as
    /// meaningful).
    pub fn read(&self, max: usize, mode: ReadMode, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        loop {
            let out = self.try_take(max, mode);
            if !out.is_empty() || Instant::now() >= deadline {
                return out;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn len(&self) -> usize {
        self.0.lock().expect("inbound buffer mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
