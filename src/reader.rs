//! The background reader thread: the only component, after `connect`
//! returns, that calls [`Transport::recv`].
//!
//! Grounded on `its-laika-telnet_server`'s `Session::listen` — a
//! `thread::spawn`-owned loop around a mutex-guarded stream that keeps
//! running until a shared flag tells it to stop. `spec.md` §9 sanctions
//! an implementation that parses the IAC triple directly out of whatever
//! the socket handed back, without a second `MSG_PEEK` round-trip, "since
//! an implementation that parses the IAC triple directly in the reader
//! eliminates the peek mode entirely; equivalent and simpler" — that is
//! the design taken here. A small `pending` carry-over buffer absorbs an
//! IAC triple that arrives split across two socket reads, so nothing is
//! lost at a chunk boundary even without `MSG_PEEK`. The same buffer
//! absorbs a sub-negotiation (`IAC SB ... IAC SE`) that straddles two
//! reads: until the closing `IAC SE` is seen, the whole frame collected
//! so far is carried forward rather than guessed at.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, trace, warn};

use crate::buffer::InboundBuffer;
use crate::error::{push_error, ErrorLedger, TelnetError};
use crate::telnet::{self, negotiation_reply, reply_triple, IAC, SB, SE};
use crate::transport::Transport;

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// No background error latched yet.
const NO_ERROR: i32 = 0;

/// State shared between the caller thread and the reader thread.
///
/// `negotiated` and `stop` are the two flags `spec.md` §5 calls out as
/// needing to be atomic rather than mutex-guarded, since both are
/// monotonic booleans polled rather than waited on with a condvar.
pub struct Shared {
    pub transport: Mutex<Transport>,
    pub inbound: InboundBuffer,
    pub negotiated: AtomicBool,
    pub binary_send_enabled: AtomicBool,
    pub binary_receive_enabled: AtomicBool,
    pub stop: AtomicBool,
    background_error: AtomicI32,
}

impl Shared {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Mutex::new(transport),
            inbound: InboundBuffer::new(),
            negotiated: AtomicBool::new(false),
            binary_send_enabled: AtomicBool::new(false),
            binary_receive_enabled: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            background_error: AtomicI32::new(NO_ERROR),
        }
    }

    pub fn is_negotiated(&self) -> bool {
        self.negotiated.load(Ordering::SeqCst)
    }

    pub fn background_error(&self) -> i32 {
        self.background_error.load(Ordering::SeqCst)
    }

    pub fn has_background_error(&self) -> bool {
        self.background_error() != NO_ERROR
    }

    fn latch_background_error(&self, code: i32) {
        self.background_error.store(code, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Join handle for the spawned reader thread.
pub struct ReaderHandle {
    shared: Arc<Shared>,
    join: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Spawn the reader over `shared`. Ownership of `Transport::recv` now
    /// belongs exclusively to this thread; callers only ever reach the
    /// transport through `shared.transport` for sends.
    pub fn spawn(shared: Arc<Shared>, errors: Arc<ErrorLedger>) -> Self {
        let thread_shared = Arc::clone(&shared);
        let join = thread::spawn(move || run(&thread_shared, &errors));
        Self { shared, join: Some(join) }
    }

    /// Signal the reader to stop and wait for it to exit. Safe to call
    /// more than once.
    pub fn stop_and_join(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run(shared: &Shared, errors: &ErrorLedger) {
    let mut pending: Vec<u8> = Vec::new();
    debug!("reader thread started");
    while !shared.stop.load(Ordering::SeqCst) {
        let chunk = {
            let mut transport = shared.transport.lock().expect("transport mutex poisoned");
            transport.recv(telnet::BUFFER_SIZE, false)
        };
        match chunk {
            Err(e) => {
                let err = push_error!(errors, e, "reader::run");
                error!("reader recv failed: {err}");
                shared.latch_background_error(err.code());
                break;
            }
            Ok(bytes) if bytes.is_empty() => {
                thread::sleep(IDLE_SLEEP);
                continue;
            }
            Ok(bytes) => {
                trace!("reader received {} bytes", bytes.len());
                pending.extend_from_slice(&bytes);
                match process_chunk(&pending, shared) {
                    Ok(leftover) => pending = leftover,
                    Err(e) => {
                        let err = push_error!(errors, e, "reader::process_chunk");
                        warn!("reader protocol error: {err}");
                        shared.latch_background_error(err.code());
                        break;
                    }
                }
            }
        }
        thread::sleep(IDLE_SLEEP);
    }
    debug!("reader thread exiting");
}

/// Find the end of a sub-negotiation frame starting at `bytes[start]`
/// (which must be the `IAC` of an `IAC SB`). Returns the index just past
/// the closing `IAC SE`, or `None` if the frame isn't closed within
/// `bytes`. A doubled `IAC IAC` inside the payload (RFC 855's escape for
/// a literal 0xFF) is skipped as a pair rather than mistaken for the
/// start of `SE`.
fn find_subnegotiation_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut j = start + 2;
    while j < bytes.len() {
        if bytes[j] == IAC {
            if j + 1 >= bytes.len() {
                return None;
            }
            if bytes[j + 1] == SE {
                return Some(j + 2);
            }
            j += 2;
        } else {
            j += 1;
        }
    }
    None
}

/// Scan `bytes` for IAC triples and sub-negotiation frames, answering
/// negotiations inline and appending non-command runs to the inbound
/// buffer. Returns whatever trailing bytes form an incomplete IAC triple
/// or an unclosed sub-negotiation frame, to be retried once more data
/// arrives.
fn process_chunk(bytes: &[u8], shared: &Shared) -> Result<Vec<u8>, TelnetError> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == IAC {
            if i + 1 >= bytes.len() {
                return Ok(bytes[i..].to_vec());
            }
            let command = bytes[i + 1];

            if command == SB {
                // Variable-length sub-negotiation: acknowledged as
                // negotiation activity, but the whole frame (option byte
                // and payload) is discarded unparsed, never treated as
                // inbound user data.
                match find_subnegotiation_end(bytes, i) {
                    Some(end) => {
                        shared.negotiated.store(true, Ordering::SeqCst);
                        i = end;
                        continue;
                    }
                    None => return Ok(bytes[i..].to_vec()),
                }
            }

            if command == SE {
                // A bare SE with no SB opening it in this chunk (its SB
                // closed out an earlier chunk already). Two-byte frame.
                shared.negotiated.store(true, Ordering::SeqCst);
                i += 2;
                continue;
            }

            if i + 2 >= bytes.len() {
                return Ok(bytes[i..].to_vec());
            }
            let option = bytes[i + 2];
            if let Some((reply_cmd, effect)) = negotiation_reply(command, option) {
                let reply = reply_triple(reply_cmd, option);
                let mut transport = shared.transport.lock().expect("transport mutex poisoned");
                transport.send_raw(&reply)?;
                drop(transport);
                apply_effect(effect, shared);
            }
            shared.negotiated.store(true, Ordering::SeqCst);
            i += 3;
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != IAC {
                i += 1;
            }
            let run = &bytes[start..i];
            if !shared.negotiated.load(Ordering::SeqCst) {
                return Err(TelnetError::NotANegotiation);
            }
            shared.inbound.push(run);
        }
    }
    Ok(Vec::new())
}

fn apply_effect(effect: telnet::NegotiationEffect, shared: &Shared) {
    match effect {
        telnet::NegotiationEffect::None => {}
        telnet::NegotiationEffect::EnableBinarySend => {
            shared.binary_send_enabled.store(true, Ordering::SeqCst);
        }
        telnet::NegotiationEffect::EnableBinaryReceive => {
            shared.binary_receive_enabled.store(true, Ordering::SeqCst);
        }
    }
}
