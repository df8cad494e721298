//! A synchronous Telnet client: option negotiation, username/password
//! login, and command execution over a line-oriented shell.
//!
//! The entry point is [`Session`]: build a [`SessionConfig`], construct a
//! `Session`, call [`Session::connect`], then drive it with
//! [`Session::execute`], [`Session::flush_banner`], and [`Session::read`].
//!
//! ```no_run
//! use rtelnet::{Session, SessionConfig};
//!
//! let config = SessionConfig::new("192.0.2.1", "alice", "hunter2").port(23);
//! let mut session = Session::new(config);
//! session.connect().expect("connect failed");
//! session.flush_banner().ok();
//! let output = session.execute("ls -la").expect("execute failed");
//! println!("{output}");
//! ```

pub mod buffer;
pub mod error;
pub mod executor;
pub mod login;
pub mod reader;
pub mod session;
pub mod telnet;
pub mod transport;

pub use error::{ErrorFrame, ErrorLedger, TelnetError};
pub use session::{Session, SessionConfig};
