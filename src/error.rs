//! Error taxonomy for the session engine.
//!
//! Mirrors the `spdylay_error` enum from the reference C implementation,
//! split along the fault lines spec.md draws: synchronous submission
//! errors, stream-level non-fatal conditions, and session-fatal errors
//! that tear the session down. `would-block` and `deferred` are not part
//! of this enum — they're outcomes of the I/O and data-provider callbacks,
//! not failures (see [`crate::handler`]).

use crate::frame::StreamId;
use thiserror::Error;

/// Errors returned synchronously from `submit_*` calls, before anything
/// is queued.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SubmitError {
    #[error("priority {0} is out of range for this protocol version")]
    InvalidPriority(u8),
    #[error("stream {0} has a deferred DATA item already; resume it before submitting more")]
    DeferredDataExists(StreamId),
    #[error("GOAWAY has already been sent; no new streams may be submitted")]
    GoawayAlreadySent,
    #[error("stream {0} does not exist")]
    UnknownStream(StreamId),
    #[error("no deferred DATA item is held for stream {0}")]
    NoDeferredData(StreamId),
    #[error("the local stream ID space is exhausted")]
    StreamIdNotAvailable,
}

/// Reasons a queued frame was discarded instead of transmitted.
/// Surfaced to the embedder through `on_ctrl_not_send` / `on_data_send`'s
/// sibling path, never as a session-fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSentReason {
    /// SYN_STREAM submitted after GOAWAY was sent or received.
    GoawayNotAllowed,
    /// The frame's stream no longer exists (e.g. it was reset).
    StreamClosed,
    /// DATA or HEADERS submitted after the sending half was already shut.
    StreamShutWr,
    /// SYN_REPLY submitted on a stream that already has one outstanding.
    StreamAlreadyReplied,
    /// The local stream ID space was exhausted between submission and send.
    StreamIdNotAvailable,
}

/// Session-fatal errors. Once returned from `send`/`recv`, the session is
/// unusable and must be destroyed by the embedder.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("zlib error in header-block compressor: {0}")]
    Zlib(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("frame is invalid: {0}")]
    InvalidFrame(String),
    #[error("peer performed a shutdown on the connection")]
    Eof,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("a user callback failed")]
    CallbackFailure,
    #[error("out of memory")]
    OutOfMemory,
}
