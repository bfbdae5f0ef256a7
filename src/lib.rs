//! spdy-sans-io: A sans-I/O SPDY/2 and SPDY/3 session engine.
//!
//! This crate provides the framing codec, header-block compressor, outbound
//! scheduler, and per-stream/session state machines for SPDY, designed for
//! environments that want full control over transport and TLS (e.g. custom
//! event loops, WebAssembly, embedded systems).
//!
//! # Features
//!
//! - **Sans-I/O Design**: no sockets, no async runtime — bytes move only
//!   through the [`SessionHandler`] trait you implement.
//! - **Both wire versions**: SPDY/2 and SPDY/3 framing, including the v3
//!   additions (WINDOW_UPDATE, numbered SETTINGS flow control).
//! - **DEFLATE header compression**: a persistent, dictionary-seeded
//!   compressor/decompressor pair per direction, matching the reference
//!   implementation's framing exactly.
//! - **Priority scheduling**: control frames outrank DATA; FIFO within a
//!   priority tier.
//! - **NPN helper**: a pure byte-string `spdy/3`/`spdy/2`/`http/1.1`
//!   selector, independent of any TLS stack.
//!
//! # Quick start
//!
//! ```ignore
//! use spdy_sans_io::{Session, SpdyVersion, SessionHandler};
//!
//! struct MyHandler;
//! impl SessionHandler for MyHandler {
//!     fn send(&mut self, data: &[u8]) -> Result<spdy_sans_io::SendOutcome, ()> {
//!         // write `data` to your socket
//!         # Ok(spdy_sans_io::SendOutcome::Sent(data.len()))
//!     }
//!     fn recv(&mut self, buf: &mut [u8]) -> Result<spdy_sans_io::RecvOutcome, ()> {
//!         // read into `buf` from your socket
//!         # Ok(spdy_sans_io::RecvOutcome::WouldBlock)
//!     }
//! }
//!
//! let mut session = Session::new_client(SpdyVersion::V3, MyHandler);
//! session.submit_request(0, vec![(":method".into(), "GET".into())], None, None).unwrap();
//! session.send().unwrap();
//! session.recv().unwrap();
//! ```
//!
//! # Architecture
//!
//! This crate is intentionally minimal. It provides:
//! - Frame codec (bytes ↔ typed frames)
//! - Header-block compression (name/value blocks ↔ DEFLATE bytes)
//! - Session state machine (stream lifecycle, SETTINGS/PING/GOAWAY, scheduling)
//!
//! It does NOT provide:
//! - TCP/UDP transport (you supply `send`/`recv`)
//! - TLS (use rustls or similar; see [`npn`] for the NPN helper only)
//! - Example clients/servers or a CLI

pub mod dictionary;
pub mod error;
pub mod frame;
pub mod handler;
pub mod header_block;
pub mod npn;
pub mod outbound;
pub mod session;
pub mod stream;

pub use dictionary::SpdyVersion;
pub use error::{NotSentReason, SessionError, SubmitError};
pub use frame::{
    CtrlFlags, DataFlags, Frame, GoAwayStatusCode, RstStatusCode, SettingsFlags, StreamCloseStatus,
    StreamId,
};
pub use handler::{DataProvider, DataRead, DataReadOutcome, RecvOutcome, SendOutcome, SessionHandler};
pub use header_block::NameValueBlock;
pub use npn::{npn_get_version, select_next_protocol, NpnSelection};
pub use session::{Role, Session};
pub use stream::{ShutFlags, StreamState};
