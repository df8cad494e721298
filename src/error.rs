//! Error codes and the append-only error ledger.
//!
//! Every public operation that can fail returns a [`TelnetError`]; callers
//! that want the raw numeric code (e.g. to match `spec.md` §7's ranges) call
//! [`TelnetError::code`]. Failure sites additionally push a frame onto the
//! session's [`ErrorLedger`] via the [`push_error`] macro so a caller can
//! render a full call-path trace after a failure with
//! [`ErrorLedger::render`].
//!
//! Corresponds to the "Error ledger" and "Error handling design" portions
//! of `spec.md` (§§3, 4.8, 7).

use std::fmt;
use std::io;
use std::sync::Mutex;

use thiserror::Error;

/// A single diagnostic frame: the failing code, the source line it was
/// pushed from, and the function name the caller supplied.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub code: i32,
    pub line: u32,
    pub function: &'static str,
}

/// Append-only stack of [`ErrorFrame`]s, shared between the caller thread
/// and the reader thread.
///
/// Invariant: frames are never removed within the lifetime of a session;
/// the ledger only grows. A fresh session starts with an empty ledger.
#[derive(Default)]
pub struct ErrorLedger(Mutex<Vec<ErrorFrame>>);

impl ErrorLedger {
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    /// Push a new frame. Called by [`push_error`]; public so the reader
    /// thread can latch a background error without going through a macro
    /// invocation at the call site (it has no local `fn` name to quote).
    pub fn push(&self, code: i32, line: u32, function: &'static str) {
        self.0
            .lock()
            .expect("error ledger mutex poisoned")
            .push(ErrorFrame { code, line, function });
    }

    /// Snapshot of all frames pushed so far, oldest first.
    pub fn frames(&self) -> Vec<ErrorFrame> {
        self.0.lock().expect("error ledger mutex poisoned").clone()
    }

    /// Render the ledger as a tree of frames, oldest first, culminating in
    /// the most recent — `throw_error_stack` from `spec.md` §6.
    pub fn render(&self) -> String {
        let frames = self.frames();
        if frames.is_empty() {
            return "(no errors recorded)".to_owned();
        }
        let mut out = String::new();
        for (depth, frame) in frames.iter().enumerate() {
            let indent = "  ".repeat(depth);
            out.push_str(&format!(
                "{indent}in {} (line {}): code {}\n",
                frame.function, frame.line, frame.code
            ));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().expect("error ledger mutex poisoned").is_empty()
    }
}

impl fmt::Debug for ErrorLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames().into_iter().map(|fr| fr.code)).finish()
    }
}

/// Numeric-coded errors per `spec.md` §7:
///
/// - 1-199: OS errno, passed through from sockets.
/// - 200-209: library-logic errors.
/// - 210-219: transport errors.
/// - 300-319: protocol/session errors.
#[derive(Debug, Error)]
pub enum TelnetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't find expected string before the timeout elapsed")]
    CantFindExpected,

    #[error("address is not a valid IPv4 literal")]
    AddressNotValid,
    #[error("cannot allocate a socket file descriptor")]
    CannotAllocateFd,
    #[error("connection closed by remote while reading")]
    ConnectionClosedR,
    #[error("not connected")]
    NotConnected,
    #[error("send failed: zero bytes transferred")]
    FailedSend,
    #[error("partial send: fewer bytes transferred than requested")]
    PartialSend,

    #[error("received non-IAC data while not yet negotiated")]
    NotANegotiation,
    #[error("option negotiation has not completed")]
    NotNegotiated,
    #[error("username not set")]
    UsernameNotSet,
    #[error("password not set")]
    PasswordNotSet,
    #[error("not logged in")]
    NotLogged,
    #[error("login failed: server reported \"Login incorrect\"")]
    FailedLogin,
    #[error("background reader failed while handling a negotiation")]
    IacReaderFailedNego,
    #[error("shared buffer empty: incomplete IAC triple")]
    SharedBufferEmpty,
    #[error("timed out waiting for the first negotiation reply")]
    NegotiationTimeout,
    #[error("unsupported address family {0} (only IPv4 literal parsing is implemented)")]
    UnsupportedFamily(u8),
    #[error("background reader error (code {0})")]
    Background(i32),
}

impl TelnetError {
    /// The numeric code this error corresponds to, per `spec.md` §7.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(1).clamp(1, 199),
            Self::CantFindExpected => 200,
            Self::AddressNotValid => 210,
            Self::CannotAllocateFd => 211,
            Self::ConnectionClosedR => 212,
            Self::NotConnected => 213,
            Self::FailedSend => 214,
            Self::PartialSend => 215,
            Self::NotANegotiation => 300,
            Self::NotNegotiated => 301,
            Self::UsernameNotSet => 302,
            Self::PasswordNotSet => 303,
            Self::NotLogged => 304,
            Self::FailedLogin => 305,
            Self::IacReaderFailedNego => 306,
            Self::SharedBufferEmpty => 307,
            Self::NegotiationTimeout => 308,
            Self::UnsupportedFamily(_) => 309,
            Self::Background(code) => *code,
        }
    }
}

/// Push a frame onto `$ledger` recording `$err`'s code, the call site's
/// line, and the supplied function name, then yield `$err` back so it can
/// be returned in the same expression.
///
/// ```ignore
/// return Err(push_error!(self.errors, TelnetError::NotConnected, "Session::execute"));
/// ```
macro_rules! push_error {
    ($ledger:expr, $err:expr, $func:expr) => {{
        let __err = $err;
        $ledger.push(__err.code(), line!(), $func);
        __err
    }};
}

pub(crate) use push_error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_starts_empty() {
        let ledger = ErrorLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.render(), "(no errors recorded)");
    }

    #[test]
    fn push_error_records_code_and_returns_error() {
        let ledger = ErrorLedger::new();
        let err = push_error!(ledger, TelnetError::NotConnected, "test::fn");
        assert_eq!(err.code(), 213);
        let frames = ledger.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].code, 213);
        assert_eq!(frames[0].function, "test::fn");
    }

    #[test]
    fn ledger_is_append_only_and_ordered() {
        let ledger = ErrorLedger::new();
        ledger.push(100, 1, "a");
        ledger.push(200, 2, "b");
        let frames = ledger.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].code, 100);
        assert_eq!(frames[1].code, 200);
    }

    #[test]
    fn render_lists_frames_oldest_first() {
        let ledger = ErrorLedger::new();
        ledger.push(200, 10, "outer");
        ledger.push(300, 20, "inner");
        let rendered = ledger.render();
        let outer_pos = rendered.find("outer").unwrap();
        let inner_pos = rendered.find("inner").unwrap();
        assert!(outer_pos < inner_pos);
    }

    #[test]
    fn error_codes_match_spec_ranges() {
        assert_eq!(TelnetError::CantFindExpected.code(), 200);
        assert_eq!(TelnetError::AddressNotValid.code(), 210);
        assert_eq!(TelnetError::PartialSend.code(), 215);
        assert_eq!(TelnetError::NotANegotiation.code(), 300);
        assert_eq!(TelnetError::NegotiationTimeout.code(), 308);
    }

    #[test]
    fn io_error_code_passes_through_raw_os_error() {
        let io_err = io::Error::from_raw_os_error(111); // ECONNREFUSED on Linux
        let err = TelnetError::from(io_err);
        assert_eq!(err.code(), 111);
    }
}
