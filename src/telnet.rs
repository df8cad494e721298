//! Wire-level Telnet constants and the negotiation policy table.
//!
//! This module is deliberately free of I/O and threading: it classifies
//! bytes and decides replies, nothing more. The reader thread
//! ([`crate::reader`]) and the transport ([`crate::transport`]) are the
//! only things that touch a socket.
//!
//! Per RFC 854: IAC introduces every in-band command; WILL/WONT/DO/DONT
//! negotiate a single option in one direction; SB/SE frame a
//! sub-negotiation payload that this crate recognises but does not parse.

use std::borrow::Cow;

/// Interpret-As-Command: introduces every Telnet command in the stream.
pub const IAC: u8 = 0xFF;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

/// The only option this policy ever agrees to.
pub const BINARY: u8 = 0;

/// Bytes read per `recv` call (`spec.md` §6's `BUFFER_SIZE`).
pub const BUFFER_SIZE: usize = 1024;

/// Side effect of answering a negotiation, beyond sending the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationEffect {
    None,
    EnableBinarySend,
    EnableBinaryReceive,
}

/// Decide how to answer an incoming `(command, option)` pair.
///
/// Returns `None` for WONT/DONT and any other command byte: the default
/// policy table has no reply for those (`spec.md` §4.2 step 3, "no reply").
/// Otherwise returns the reply command byte and the state change it
/// causes. The default policy is refuse-all; BINARY is the sole
/// exception in each direction.
///
/// Calling this twice with the same input yields the same output and no
/// additional state beyond what the caller applies — this is the "policy
/// table idempotence" property from `spec.md` §8.
pub fn negotiation_reply(command: u8, option: u8) -> Option<(u8, NegotiationEffect)> {
    match command {
        DO if option == BINARY => Some((WILL, NegotiationEffect::EnableBinarySend)),
        DO => Some((WONT, NegotiationEffect::None)),
        WILL if option == BINARY => Some((DO, NegotiationEffect::EnableBinaryReceive)),
        WILL => Some((DONT, NegotiationEffect::None)),
        WONT | DONT => None,
        _ => None,
    }
}

/// True for the three-byte option commands WILL/WONT/DO/DONT.
pub fn is_option_command(command: u8) -> bool {
    matches!(command, WILL | WONT | DO | DONT)
}

/// Build the three raw bytes of a negotiation reply.
pub fn reply_triple(command: u8, option: u8) -> [u8; 3] {
    [IAC, command, option]
}

/// Escape `data` for transmission: double every `0xFF` unless both
/// directions have agreed to binary mode, in which case the bytes pass
/// through unchanged. This is the *only* transformation `send_text`
/// applies to user data (`spec.md` §4.1, §8 "escape round-trip").
pub fn escape_for_wire(data: &[u8], binary_send_enabled: bool, binary_receive_enabled: bool) -> Cow<'_, [u8]> {
    if binary_send_enabled && binary_receive_enabled {
        return Cow::Borrowed(data);
    }
    if !data.contains(&IAC) {
        return Cow::Borrowed(data);
    }
    let mut out = Vec::with_capacity(data.len() + 4);
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuse_all_default_policy() {
        // scenario 1: server sends DO ECHO (option 1), client answers WONT ECHO.
        let (reply, effect) = negotiation_reply(DO, 1).unwrap();
        assert_eq!(reply, WONT);
        assert_eq!(effect, NegotiationEffect::None);
        assert_eq!(reply_triple(reply, 1), [IAC, WONT, 1]);
    }

    #[test]
    fn accept_binary_send() {
        // scenario 2: server sends DO BINARY, client answers WILL BINARY.
        let (reply, effect) = negotiation_reply(DO, BINARY).unwrap();
        assert_eq!(reply, WILL);
        assert_eq!(effect, NegotiationEffect::EnableBinarySend);
        assert_eq!(reply_triple(reply, BINARY), [IAC, WILL, BINARY]);
    }

    #[test]
    fn accept_binary_receive() {
        // scenario 3: server sends WILL BINARY, client answers DO BINARY.
        let (reply, effect) = negotiation_reply(WILL, BINARY).unwrap();
        assert_eq!(reply, DO);
        assert_eq!(effect, NegotiationEffect::EnableBinaryReceive);
        assert_eq!(reply_triple(reply, BINARY), [IAC, DO, BINARY]);
    }

    #[test]
    fn unknown_option_follows_command_default() {
        let (reply, _) = negotiation_reply(DO, 42).unwrap();
        assert_eq!(reply, WONT);
        let (reply, _) = negotiation_reply(WILL, 42).unwrap();
        assert_eq!(reply, DONT);
    }

    #[test]
    fn wont_and_dont_have_no_reply() {
        assert_eq!(negotiation_reply(WONT, BINARY), None);
        assert_eq!(negotiation_reply(DONT, BINARY), None);
    }

    #[test]
    fn policy_table_is_idempotent() {
        let a = negotiation_reply(DO, BINARY);
        let b = negotiation_reply(DO, BINARY);
        assert_eq!(a, b);
    }

    #[test]
    fn escape_doubles_iac_when_not_fully_binary() {
        let wire = escape_for_wire(b"a\xffb\n", false, false);
        assert_eq!(&*wire, &[b'a', IAC, IAC, b'b', b'\n']);
    }

    #[test]
    fn escape_requires_both_directions_binary() {
        let only_send = escape_for_wire(b"\xff", true, false);
        assert_eq!(&*only_send, &[IAC, IAC]);
        let only_receive = escape_for_wire(b"\xff", false, true);
        assert_eq!(&*only_receive, &[IAC, IAC]);
    }

    #[test]
    fn escape_passes_through_in_full_binary_mode() {
        let wire = escape_for_wire(b"a\xffb", true, true);
        assert_eq!(&*wire, b"a\xffb");
    }

    #[test]
    fn escape_is_noop_without_iac_bytes() {
        let wire = escape_for_wire(b"plain text", false, false);
        assert_eq!(&*wire, b"plain text");
    }
}
