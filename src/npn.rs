//! NPN (Next Protocol Negotiation) helper (spec.md §6, §8 scenario S6).
//!
//! Ported from `spdylay_select_next_protocol` / `spdylay_npn_get_version`.
//! Pure byte-string selection; has no dependency on any TLS library — the
//! embedder is responsible for wiring this into their TLS stack's NPN/ALPN
//! callback.

use crate::dictionary::SpdyVersion;

/// Result of running the NPN selection algorithm against a peer's
/// advertised, length-prefixed, non-null-terminated protocol list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpnSelection {
    Spdy(SpdyVersion),
    Http11,
    /// No overlap between our supported protocols and the peer's list.
    NoOverlap,
}

impl NpnSelection {
    /// The protocol name that would be written to the TLS NPN/ALPN output
    /// buffer, or `None` for [`NpnSelection::NoOverlap`].
    pub fn protocol_name(self) -> Option<&'static [u8]> {
        match self {
            NpnSelection::Spdy(SpdyVersion::V3) => Some(b"spdy/3"),
            NpnSelection::Spdy(SpdyVersion::V2) => Some(b"spdy/2"),
            NpnSelection::Http11 => Some(b"http/1.1"),
            NpnSelection::NoOverlap => None,
        }
    }
}

/// Returns the SPDY version recognized by name, or 0 if `proto` is not a
/// SPDY protocol string this engine supports.
pub fn npn_get_version(proto: &[u8]) -> u16 {
    match proto {
        b"spdy/3" => 3,
        b"spdy/2" => 2,
        _ => 0,
    }
}

fn parse_length_prefixed(input: &[u8]) -> Vec<&[u8]> {
    let mut protocols = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        let len = input[pos] as usize;
        pos += 1;
        if pos + len > input.len() {
            break;
        }
        protocols.push(&input[pos..pos + len]);
        pos += len;
    }
    protocols
}

/// Selects a protocol from the peer's advertised list, in engine-preference
/// order regardless of how the peer ordered its own list: spdy/3 if present
/// anywhere, else spdy/2, else `http/1.1`, else [`NpnSelection::NoOverlap`].
pub fn select_next_protocol(input: &[u8]) -> NpnSelection {
    let protocols = parse_length_prefixed(input);
    if protocols.iter().any(|p| *p == b"spdy/3") {
        return NpnSelection::Spdy(SpdyVersion::V3);
    }
    if protocols.iter().any(|p| *p == b"spdy/2") {
        return NpnSelection::Spdy(SpdyVersion::V2);
    }
    if protocols.iter().any(|p| *p == b"http/1.1") {
        return NpnSelection::Http11;
    }
    NpnSelection::NoOverlap
}
