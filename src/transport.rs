//! Blocking TCP transport: resolve, connect, raw send/recv, close.
//!
//! Grounded on `its-laika-telnet_server`'s `TcpStream`-backed session (the
//! blocking-socket-plus-read-timeout idiom) and on `tf-rs/src/net.rs`'s
//! `send_line` 0xFF-doubling rule, adapted from async to a blocking
//! `std::net::TcpStream` with a read timeout standing in for the
//! select-based wake the original C++ transport used.

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::TelnetError;
use crate::telnet;

/// `spec.md` §4.1's one-second select gate: `recv` blocks at most this
/// long before returning an empty, successful read so the reader thread
/// can observe its stop flag.
pub const RECV_GATE: Duration = Duration::from_secs(1);

/// Resolve a literal IPv4 address and port into a socket address.
///
/// Only `family == 4` is accepted; v6 literal parsing is out of contract
/// (`spec.md` §1, §9) and is rejected earlier, at `SessionConfig`
/// construction, so by the time a `Transport` is built `family` is always
/// 4. `resolve` itself only ever sees v4 literals and rejects anything
/// the platform's parser (`Ipv4Addr::from_str`) does not accept.
pub fn resolve(address: &str, port: u16) -> Result<SocketAddr, TelnetError> {
    let ip = Ipv4Addr::from_str(address).map_err(|_| TelnetError::AddressNotValid)?;
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// A connected, blocking TCP socket plus the two binary-mode flags that
/// govern how outgoing user data is escaped.
pub struct Transport {
    stream: Option<TcpStream>,
}

impl Transport {
    /// Connect to `addr`. On success the returned transport is
    /// `connected`.
    pub fn connect(addr: SocketAddr) -> Result<Self, TelnetError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(RECV_GATE))?;
        stream.set_nodelay(true).ok();
        debug!("connected to {addr}");
        Ok(Self { stream: Some(stream) })
    }

    /// Wrap an already-connected stream directly, skipping `connect`.
    /// Used by tests that set up a loopback pair with `TcpListener`
    /// themselves and by any future caller handed a pre-established
    /// socket.
    pub fn from_stream(stream: TcpStream) -> Self {
        stream.set_read_timeout(Some(RECV_GATE)).ok();
        stream.set_nodelay(true).ok();
        Self { stream: Some(stream) }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send raw bytes with no escaping — used for negotiation replies,
    /// which bypass the 0xFF-doubling rule entirely (`spec.md` §4.2 step
    /// 4).
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TelnetError> {
        let stream = self.stream.as_mut().ok_or(TelnetError::NotConnected)?;
        if bytes.is_empty() {
            return Err(TelnetError::FailedSend);
        }
        match stream.write(bytes) {
            Ok(0) => Err(TelnetError::FailedSend),
            Ok(n) if n < bytes.len() => Err(TelnetError::PartialSend),
            Ok(_) => {
                trace!("sent {} raw bytes", bytes.len());
                Ok(())
            }
            Err(e) => Err(TelnetError::from(e)),
        }
    }

    /// Send user-level text, escaping 0xFF per the current binary flags
    /// (`spec.md` §4.1, §8 "escape round-trip").
    pub fn send_text(&mut self, data: &[u8], binary_send_enabled: bool, binary_receive_enabled: bool) -> Result<(), TelnetError> {
        let escaped = telnet::escape_for_wire(data, binary_send_enabled, binary_receive_enabled);
        self.send_raw(&escaped)
    }

    /// Read up to `telnet::BUFFER_SIZE` bytes, gated by [`RECV_GATE`]. A
    /// timeout with no data is success with an empty result, matching
    /// `spec.md` §4.1's select-gate behaviour (it lets the reader thread
    /// re-check its stop flag roughly once a second).
    ///
    /// `peek` mirrors `MSG_PEEK`: bytes are inspected but left in the
    /// kernel socket buffer for a subsequent non-peek read to re-observe,
    /// which is what the negotiator needs while `pre_negotiated`
    /// (`spec.md` §4.3, §9 "peek-then-consume").
    pub fn recv(&mut self, max_len: usize, peek: bool) -> Result<Vec<u8>, TelnetError> {
        let stream = self.stream.as_mut().ok_or(TelnetError::NotConnected)?;
        let mut buf = vec![0u8; max_len];
        let result = if peek { stream.peek(&mut buf) } else { stream.read(&mut buf) };
        match result {
            Ok(0) => Err(TelnetError::ConnectionClosedR),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(TelnetError::from(e)),
        }
    }

    /// Idempotent close: a second call on an already-closed transport is
    /// a no-op, not an error.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                warn!("error shutting down socket: {e}");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
