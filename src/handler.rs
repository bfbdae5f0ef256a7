//! The embedder-supplied collaborators: byte I/O, DATA sources, and the
//! protocol event callbacks (spec.md §6 "Callback interface").
//!
//! The engine does no I/O of its own (spec.md §1). `SessionHandler`
//! bundles the two I/O callbacks (`send`/`recv`) with the event callbacks,
//! matching `spdylay_session_callbacks`; `DataProvider` is supplied
//! per-submission, matching `spdylay_data_provider`.

use crate::error::NotSentReason;
use crate::frame::{Frame, RstStatusCode, StreamCloseStatus, StreamId};

/// Outcome of a single `send` callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// `n` bytes were accepted; `n` may be less than requested.
    Sent(usize),
    /// The embedder cannot accept any bytes right now without blocking.
    WouldBlock,
}

/// Outcome of a single `recv` callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// `n` bytes were written into the supplied buffer.
    Received(usize),
    /// No bytes are available right now without blocking.
    WouldBlock,
    /// The peer shut down the connection.
    Eof,
}

/// Outcome of a single `DataProvider::read` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRead {
    pub len: usize,
    pub eof: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataReadOutcome {
    Read(DataRead),
    /// The provider is not ready; park this DATA item on the stream
    /// (spec.md §4.3 "Deferred DATA").
    Deferred,
}

/// Supplies the bytes of a request or response body, submitted alongside
/// `submit_request`/`submit_response`/`submit_data`.
pub trait DataProvider {
    /// Read up to `buf.len()` bytes. Returning `Err(())` is a callback
    /// failure and tears the session down (spec.md §7).
    fn read(&mut self, buf: &mut [u8]) -> Result<DataReadOutcome, ()>;
}

/// The embedder's I/O and event-callback surface for one session.
///
/// All event callbacks default to no-ops so implementers only override the
/// ones they care about, matching the optional-field feel of
/// `spdylay_session_callbacks` while staying a single trait object.
pub trait SessionHandler {
    /// Send at most `data.len()` bytes. May be called repeatedly for a
    /// single frame if it returns `Sent(n)` with `n < data.len()`.
    fn send(&mut self, data: &[u8]) -> Result<SendOutcome, ()>;

    /// Receive at most `buf.len()` bytes.
    fn recv(&mut self, buf: &mut [u8]) -> Result<RecvOutcome, ()>;

    fn on_ctrl_recv(&mut self, _frame: &Frame) {}
    fn on_invalid_ctrl_recv(&mut self, _frame_type: u16, _status: RstStatusCode) {}
    fn on_data_chunk_recv(&mut self, _flags: u8, _stream_id: StreamId, _data: &[u8]) {}
    fn on_data_recv(&mut self, _flags: u8, _stream_id: StreamId, _length: u32) {}
    fn before_ctrl_send(&mut self, _frame: &Frame) {}
    fn on_ctrl_send(&mut self, _frame: &Frame) {}
    fn on_ctrl_not_send(&mut self, _frame: &Frame, _reason: NotSentReason) {}
    fn on_data_send(&mut self, _flags: u8, _stream_id: StreamId, _length: u32) {}
    fn on_stream_close(&mut self, _stream_id: StreamId, _status: StreamCloseStatus) {}
    fn on_request_recv(&mut self, _stream_id: StreamId) {}
}
