//! The public `Session` facade: configuration, the state machine, and the
//! lifecycle glue (`Connect`, `Execute`, `FlushBanner`, `Read`) that ties
//! the transport, reader, login driver, and executor together.
//!
//! State machine (`spec.md` §4.9): `Fresh → Connected → Negotiated →
//! LoggedIn → Closed`, monotonic forward, with `Closed` reachable from
//! any state via `Drop` or a latched background error.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::buffer::ReadMode;
use crate::error::{push_error, ErrorLedger, TelnetError};
use crate::executor;
use crate::login;
use crate::reader::{ReaderHandle, Shared};
use crate::transport::{self, Transport};

/// `spec.md` §6's `NEGOTIATION_TIMEOUT`: how long `connect` waits for the
/// reader to observe the first option-negotiation reply.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(3);

const CONNECT_POLL: Duration = Duration::from_millis(20);

/// Configuration for a [`Session`], built programmatically — `spec.md`
/// names no configuration *file* format, so none is invented here.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    address: String,
    port: u16,
    family: u8,
    username: String,
    password: String,
    idle_ms: u64,
    total_ms: u64,
    verbosity: u8,
}

impl SessionConfig {
    /// `port` defaults to 23, `family` to 4, `idle_ms` to 1000, `total_ms`
    /// to 10000, `verbosity` to 0 — the defaults named in `spec.md` §6.
    pub fn new(address: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: 23,
            family: 4,
            username: username.into(),
            password: password.into(),
            idle_ms: 1000,
            total_ms: 10000,
            verbosity: 0,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Only `family == 4` is accepted. The literal-address parser this
    /// crate carries is IPv4-only (`spec.md` §1, §9); rather than accept
    /// `family = 6` and silently resolve it as if it were a v4 literal,
    /// construction fails immediately.
    pub fn family(mut self, family: u8) -> Result<Self, TelnetError> {
        if family != 4 {
            return Err(TelnetError::UnsupportedFamily(family));
        }
        self.family = family;
        Ok(self)
    }

    pub fn idle_ms(mut self, idle_ms: u64) -> Self {
        self.idle_ms = idle_ms;
        self
    }

    pub fn total_ms(mut self, total_ms: u64) -> Self {
        self.total_ms = total_ms;
        self
    }

    /// 0 (silent) through 4 (per-byte trace); values above 4 are clamped.
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity.min(4);
        self
    }
}

/// A Telnet client session. Construct with [`SessionConfig`], call
/// [`Session::connect`], then drive it with [`Session::execute`],
/// [`Session::flush_banner`], and [`Session::read`].
pub struct Session {
    config: SessionConfig,
    shared: Option<Arc<Shared>>,
    reader: Option<ReaderHandle>,
    connected: bool,
    logged_in: bool,
    errors: Arc<ErrorLedger>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: None,
            reader: None,
            connected: false,
            logged_in: false,
            errors: Arc::new(ErrorLedger::new()),
        }
    }

    /// Resolve, connect, spawn the reader, wait for the first
    /// negotiation reply, then log in. On any step's failure the error is
    /// pushed to the ledger and returned; the partially-constructed
    /// session is left connected-but-not-logged-in so the caller can
    /// still inspect `error_stack()` before dropping it.
    pub fn connect(&mut self) -> Result<(), TelnetError> {
        if self.config.username.is_empty() {
            return Err(push_error!(self.errors, TelnetError::UsernameNotSet, "Session::connect"));
        }
        if self.config.password.is_empty() {
            return Err(push_error!(self.errors, TelnetError::PasswordNotSet, "Session::connect"));
        }

        let addr = transport::resolve(&self.config.address, self.config.port)
            .map_err(|e| push_error!(self.errors, e, "Session::connect"))?;

        let transport = Transport::connect(addr).map_err(|e| push_error!(self.errors, e, "Session::connect"))?;
        self.connected = true;
        info!("connected to {addr}");

        let shared = Arc::new(Shared::new(transport));
        let reader = ReaderHandle::spawn(Arc::clone(&shared), Arc::clone(&self.errors));
        self.shared = Some(Arc::clone(&shared));
        self.reader = Some(reader);

        let deadline = Instant::now() + NEGOTIATION_TIMEOUT;
        loop {
            if shared.is_negotiated() {
                break;
            }
            if shared.has_background_error() {
                let code = shared.background_error();
                return Err(push_error!(self.errors, TelnetError::Background(code), "Session::connect"));
            }
            if Instant::now() >= deadline {
                return Err(push_error!(self.errors, TelnetError::NegotiationTimeout, "Session::connect"));
            }
            thread::sleep(CONNECT_POLL);
        }

        login::login(&shared, &self.config.username, &self.config.password)
            .map_err(|e| push_error!(self.errors, e, "Session::connect"))?;
        self.logged_in = true;
        info!("login complete");
        Ok(())
    }

    /// Send `command` and accumulate the server's response until it
    /// quiesces. Requires `LoggedIn`.
    pub fn execute(&mut self, command: &str) -> Result<String, TelnetError> {
        let shared = self.require_logged_in("Session::execute")?;
        executor::execute(shared, command, self.config.idle_ms, self.config.total_ms)
            .map_err(|e| push_error!(self.errors, e, "Session::execute"))
    }

    /// Drain whatever the server sent unprompted right after login.
    pub fn flush_banner(&mut self) -> Result<String, TelnetError> {
        let shared = self.require_logged_in("Session::flush_banner")?;
        executor::flush_banner(shared, self.config.idle_ms, self.config.total_ms)
            .map_err(|e| push_error!(self.errors, e, "Session::flush_banner"))
    }

    /// Raw polling read of whatever the reader has queued. `peek` leaves
    /// the bytes in place for a subsequent call to re-observe. Requires
    /// only `Connected`.
    pub fn read(&mut self, max: usize, peek: bool, timeout_ms: u64) -> Result<Vec<u8>, TelnetError> {
        let shared = self.require_connected("Session::read")?;
        let mode = if peek { ReadMode::Peek } else { ReadMode::Destructive };
        Ok(shared.inbound.read(max, mode, Duration::from_millis(timeout_ms)))
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_negotiated(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.is_negotiated())
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn background_error(&self) -> i32 {
        self.shared.as_ref().map_or(0, |s| s.background_error())
    }

    pub fn has_background_error(&self) -> bool {
        self.background_error_latched()
    }

    /// Render the full error ledger as a diagnostic stack, oldest frame
    /// first (`spec.md` §4.8's `throw_error_stack`).
    pub fn error_stack(&self) -> String {
        self.errors.render()
    }

    fn background_error_latched(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.has_background_error())
    }

    /// A latched background error is treated as terminal for the
    /// session: the reader has already exited, so no further `execute`
    /// or `read` call can make progress (`spec.md` §9's reader-error
    /// open question, resolved in this crate as non-recoverable).
    fn require_connected(&self, func: &'static str) -> Result<&Arc<Shared>, TelnetError> {
        if self.background_error_latched() || !self.connected {
            return Err(push_error!(self.errors, TelnetError::NotConnected, func));
        }
        self.shared.as_ref().ok_or_else(|| push_error!(self.errors, TelnetError::NotConnected, func))
    }

    fn require_logged_in(&self, func: &'static str) -> Result<&Arc<Shared>, TelnetError> {
        let shared = self.require_connected(func)?;
        if !self.logged_in {
            return Err(push_error!(self.errors, TelnetError::NotLogged, func));
        }
        Ok(shared)
    }
}

impl Drop for Session {
    /// Stop the reader and close the socket. The reader observes the
    /// stop flag within roughly one recv-gate cycle (`spec.md` §5).
    fn drop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop_and_join();
        }
        if let Some(shared) = self.shared.take() {
            if let Ok(mut transport) = shared.transport.lock() {
                transport.close();
            } else {
                warn!("transport mutex poisoned during Session drop");
            }
        }
    }
}
