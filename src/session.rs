//! Session core (spec.md §4.4, §4.5, §4.6): the send loop, the incremental
//! receive parser, SETTINGS/PING/GOAWAY application, and the submission API.
//!
//! `Session<H>` owns everything the engine needs except I/O itself — bytes
//! move only through `H::send`/`H::recv` (spec.md §1, "sans-I/O").

use std::any::Any;
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::dictionary::SpdyVersion;
use crate::error::{NotSentReason, SessionError, SubmitError};
use crate::frame::{
    self, frame_type, settings_id, CtrlFlags, DataFlags, Frame, GoAwayFrame, GoAwayStatusCode,
    HeadersFrame, PingFrame, RawHeader, RstStatusCode, RstStreamFrame, StreamCloseStatus, StreamId,
    SynReplyFrame, SynStreamFrame, WindowUpdateFrame,
};
use crate::handler::{DataReadOutcome, RecvOutcome, SendOutcome, SessionHandler};
use crate::header_block::{HeaderBlockDecoder, HeaderBlockEncoder, NameValueBlock};
use crate::outbound::{DataSubmission, OutboundItem, OutboundPayload, OutboundQueue, PriorityClass};
use crate::stream::{ShutFlags, Stream, StreamState};

/// Which end of the connection this session represents. Determines stream-
/// ID and PING-ID parity (spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn stream_id_parity(self) -> u32 {
        match self {
            Role::Client => 1,
            Role::Server => 0,
        }
    }

    fn ping_id_parity(self) -> u32 {
        self.stream_id_parity()
    }
}

/// The maximum DATA payload the engine will emit in a single frame.
const MAX_DATA_FRAME_PAYLOAD: usize = 4096;
/// Read chunk size used while draining a control frame's payload or a DATA
/// frame's body off the wire.
const RECV_CHUNK: usize = 4096;

struct SettingsState {
    max_concurrent_streams: u32,
    initial_window_size: u32,
    entries: HashMap<u32, crate::frame::SettingsEntry>,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            max_concurrent_streams: frame::DEFAULT_MAX_CONCURRENT_STREAMS,
            initial_window_size: frame::DEFAULT_INITIAL_WINDOW_SIZE,
            entries: HashMap::new(),
        }
    }
}

/// The incremental receive parser's state (spec.md §4.5: NEED_HEAD →
/// NEED_PAYLOAD → FRAME_READY, folded here into three buffering states that
/// resolve as soon as enough bytes are available).
enum RecvState {
    NeedHeader {
        buf: Vec<u8>,
    },
    NeedControlPayload {
        frame_type: u16,
        flags: u8,
        length: u32,
        buf: Vec<u8>,
    },
    NeedDataPayload {
        stream_id: StreamId,
        flags: u8,
        total: u32,
        remaining: u32,
    },
}

impl Default for RecvState {
    fn default() -> Self {
        RecvState::NeedHeader { buf: Vec::with_capacity(8) }
    }
}

/// A frame mid-transmission: either fully serialized and waiting for the
/// embedder's `send` to accept the rest, or (for DATA) carrying the
/// submission back so it can be requeued once this chunk lands.
struct PendingSend {
    bytes: Vec<u8>,
    sent: usize,
    outcome: PendingOutcome,
}

enum PendingOutcome {
    Ctrl {
        frame: Frame,
    },
    Data {
        stream_id: StreamId,
        flags: DataFlags,
        length: u32,
        requeue: Option<OutboundItem>,
    },
}

/// A sans-I/O SPDY/2 or SPDY/3 session. Drives one connection's worth of
/// framing, header compression, and multiplexed stream state; owns no
/// socket and performs no I/O beyond calling back into `H`.
pub struct Session<H: SessionHandler> {
    role: Role,
    version: SpdyVersion,
    handler: H,

    next_stream_id: StreamId,
    last_peer_stream_id: StreamId,
    next_ping_id: u32,

    goaway_sent: bool,
    goaway_sent_last_good_id: StreamId,
    goaway_received: bool,
    goaway_received_last_good_id: StreamId,

    local_settings: SettingsState,

    encoder: HeaderBlockEncoder,
    decoder: HeaderBlockDecoder,

    streams: HashMap<StreamId, Stream>,
    outbound: OutboundQueue,
    /// SYN_STREAMs held back by MAX_CONCURRENT_STREAMS; spec.md §4.4 calls
    /// for them to "remain in the queue" rather than being discarded, so
    /// they wait here and are re-enqueued as local stream slots free up.
    blocked_syn_streams: VecDeque<OutboundItem>,

    recv_state: RecvState,
    pending_send: Option<PendingSend>,

    fatal: bool,
    session_user_data: Option<Box<dyn Any>>,
}

impl<H: SessionHandler> Session<H> {
    pub fn new_client(version: SpdyVersion, handler: H) -> Self {
        Self::new(Role::Client, version, handler)
    }

    pub fn new_server(version: SpdyVersion, handler: H) -> Self {
        Self::new(Role::Server, version, handler)
    }

    fn new(role: Role, version: SpdyVersion, handler: H) -> Self {
        let parity = role.stream_id_parity();
        Self {
            role,
            version,
            handler,
            next_stream_id: if parity == 0 { 2 } else { 1 },
            last_peer_stream_id: 0,
            next_ping_id: if role.ping_id_parity() == 0 { 2 } else { 1 },
            goaway_sent: false,
            goaway_sent_last_good_id: 0,
            goaway_received: false,
            goaway_received_last_good_id: 0,
            local_settings: SettingsState::default(),
            encoder: HeaderBlockEncoder::new(version),
            decoder: HeaderBlockDecoder::new(version),
            streams: HashMap::new(),
            outbound: OutboundQueue::new(),
            blocked_syn_streams: VecDeque::new(),
            recv_state: RecvState::default(),
            pending_send: None,
            fatal: false,
            session_user_data: None,
        }
    }

    pub fn set_user_data(&mut self, data: Box<dyn Any>) {
        self.session_user_data = Some(data);
    }

    pub fn user_data(&self) -> Option<&(dyn Any)> {
        self.session_user_data.as_deref()
    }

    pub fn get_stream_user_data(&self, stream_id: StreamId) -> Option<&(dyn Any)> {
        self.streams.get(&stream_id).and_then(|s| s.user_data.as_deref())
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Whether the session has anything it would still like to write.
    pub fn want_write(&self) -> bool {
        !self.fatal && (!self.outbound.is_empty() || self.pending_send.is_some())
    }

    /// Whether the session has anything it would still like to read.
    /// Ported from `spdylay_session_want_read`.
    pub fn want_read(&self) -> bool {
        !self.fatal && !(self.goaway_sent && self.goaway_received)
    }

    fn local_parity(&self) -> u32 {
        self.role.stream_id_parity()
    }

    fn peer_parity(&self) -> u32 {
        1 - self.local_parity()
    }

    fn open_local_stream_count(&self) -> usize {
        let parity = self.local_parity();
        self.streams
            .values()
            .filter(|s| s.stream_id % 2 == parity && s.state != StreamState::Closing)
            .count()
    }

    // ---------------------------------------------------------------
    // Submission API (spec.md §4.6)
    // ---------------------------------------------------------------

    /// Submits a new stream with a name/value block and, optionally, a body.
    /// Mirrors `spdylay_submit_request` / `spdylay_submit_syn_stream`.
    pub fn submit_syn_stream(
        &mut self,
        flags: CtrlFlags,
        assoc_stream_id: StreamId,
        priority: u8,
        nv: NameValueBlock,
        data_provider: Option<Box<dyn crate::handler::DataProvider>>,
        user_data: Option<Box<dyn Any>>,
    ) -> Result<(), SubmitError> {
        if priority > self.version.lowest_priority() {
            return Err(SubmitError::InvalidPriority(priority));
        }
        let nv = normalize_nv(nv, self.version);
        let frame = SynStreamFrame {
            flags,
            stream_id: 0, // assigned when popped off the queue
            assoc_stream_id,
            priority,
            slot: 0,
            nv,
        };
        let seq = self.outbound.next_seq();
        let mut item = OutboundItem::control(priority, seq, Frame::SynStream(frame));
        item.user_data = user_data;
        if let Some(provider) = data_provider {
            // The body is queued separately; it trails the SYN_STREAM in
            // submission order via a later, larger sequence number. Its
            // stream ID isn't known yet (assigned lazily at dispatch, per
            // spec.md §4.4), so it's resolved through a shared cell the
            // SYN_STREAM item publishes into once dispatched.
            let stream_id_cell: crate::outbound::StreamIdCell = Rc::new(Cell::new(0));
            item.publish_stream_id = Some(stream_id_cell.clone());
            self.outbound.push(item);
            let data_seq = self.outbound.next_seq();
            let submission = DataSubmission {
                stream_id: 0,
                stream_id_cell: Some(stream_id_cell),
                fin_requested: flags.contains(CtrlFlags::FIN),
                provider,
            };
            self.outbound.push(OutboundItem::data(priority, data_seq, submission));
        } else {
            self.outbound.push(item);
        }
        Ok(())
    }

    /// Convenience wrapper matching `spdylay_submit_request`.
    pub fn submit_request(
        &mut self,
        priority: u8,
        nv: NameValueBlock,
        data_provider: Option<Box<dyn crate::handler::DataProvider>>,
        user_data: Option<Box<dyn Any>>,
    ) -> Result<(), SubmitError> {
        let fin = data_provider.is_none();
        let mut flags = CtrlFlags::empty();
        if fin {
            flags |= CtrlFlags::FIN;
        }
        self.submit_syn_stream(flags, 0, priority, nv, data_provider, user_data)
    }

    pub fn submit_syn_reply(
        &mut self,
        stream_id: StreamId,
        flags: CtrlFlags,
        nv: NameValueBlock,
    ) -> Result<(), SubmitError> {
        if !self.streams.contains_key(&stream_id) {
            return Err(SubmitError::UnknownStream(stream_id));
        }
        let nv = normalize_nv(nv, self.version);
        let frame = SynReplyFrame { flags, stream_id, nv };
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::control(0, seq, Frame::SynReply(frame)));
        Ok(())
    }

    /// Convenience wrapper matching `spdylay_submit_response`.
    pub fn submit_response(
        &mut self,
        stream_id: StreamId,
        nv: NameValueBlock,
        data_provider: Option<Box<dyn crate::handler::DataProvider>>,
    ) -> Result<(), SubmitError> {
        let fin = data_provider.is_none();
        let mut flags = CtrlFlags::empty();
        if fin {
            flags |= CtrlFlags::FIN;
        }
        self.submit_syn_reply(stream_id, flags, nv)?;
        if let Some(provider) = data_provider {
            self.submit_data(stream_id, true, provider)?;
        }
        Ok(())
    }

    pub fn submit_headers(&mut self, stream_id: StreamId, flags: CtrlFlags, nv: NameValueBlock) -> Result<(), SubmitError> {
        if !self.streams.contains_key(&stream_id) {
            return Err(SubmitError::UnknownStream(stream_id));
        }
        let nv = normalize_nv(nv, self.version);
        let frame = HeadersFrame { flags, stream_id, nv };
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::control(0, seq, Frame::Headers(frame)));
        Ok(())
    }

    /// Submits a DATA body for an already-open stream. Rejects if a
    /// deferred DATA item is already held (spec.md §9 Open Question #1).
    pub fn submit_data(
        &mut self,
        stream_id: StreamId,
        fin_requested: bool,
        provider: Box<dyn crate::handler::DataProvider>,
    ) -> Result<(), SubmitError> {
        let stream = self.streams.get(&stream_id).ok_or(SubmitError::UnknownStream(stream_id))?;
        if stream.deferred.is_some() {
            return Err(SubmitError::DeferredDataExists(stream_id));
        }
        let priority = stream.priority;
        let submission = DataSubmission { stream_id, stream_id_cell: None, fin_requested, provider };
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::data(priority, seq, submission));
        Ok(())
    }

    /// Resumes a stream's deferred DATA item, matching `spdylay_session_resume_data`.
    pub fn resume_data(&mut self, stream_id: StreamId) -> Result<(), SubmitError> {
        let stream = self.streams.get_mut(&stream_id).ok_or(SubmitError::UnknownStream(stream_id))?;
        let mut item = stream.take_deferred().ok_or(SubmitError::NoDeferredData(stream_id))?;
        item.seq = self.outbound.next_seq();
        self.outbound.push(item);
        Ok(())
    }

    pub fn submit_rst_stream(&mut self, stream_id: StreamId, status: RstStatusCode) -> Result<(), SubmitError> {
        let frame = RstStreamFrame { stream_id, status };
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::control(0, seq, Frame::RstStream(frame)));
        Ok(())
    }

    pub fn submit_ping(&mut self) -> Result<(), SubmitError> {
        let id = self.next_ping_id;
        self.next_ping_id += 2;
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::control(0, seq, Frame::Ping(PingFrame { id })));
        Ok(())
    }

    /// Submits a GOAWAY. `last_good_stream_id` is fixed at submission time
    /// to the highest peer-initiated stream observed so far — a
    /// simplification over recomputing it lazily when the frame reaches the
    /// front of the queue, noted in DESIGN.md.
    pub fn submit_goaway(&mut self, status: GoAwayStatusCode) -> Result<(), SubmitError> {
        let frame = GoAwayFrame {
            last_good_stream_id: self.last_peer_stream_id,
            status,
        };
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::control(0, seq, Frame::GoAway(frame)));
        Ok(())
    }

    // ---------------------------------------------------------------
    // Send loop (spec.md §4.4)
    // ---------------------------------------------------------------

    pub fn send(&mut self) -> Result<(), SessionError> {
        if self.fatal {
            return Err(SessionError::Protocol("session already failed".to_string()));
        }
        loop {
            if let Some(pending) = self.pending_send.take() {
                match self.flush_pending(pending)? {
                    Some(still_pending) => {
                        self.pending_send = Some(still_pending);
                        return Ok(());
                    }
                    None => continue,
                }
            }

            let Some(item) = self.outbound.pop_top() else { return Ok(()) };
            if !self.dispatch_item(item)? {
                continue;
            }
            if self.pending_send.is_none() {
                continue;
            }
            // A frame is buffered (fully or partially) in pending_send;
            // loop back around to try flushing it this same call.
        }
    }

    /// Prepares one outbound item for transmission. Returns `Ok(false)` if
    /// the item was discarded (precondition failed or deferred) and the
    /// loop should move to the next item without touching `pending_send`.
    fn dispatch_item(&mut self, item: OutboundItem) -> Result<bool, SessionError> {
        match item.payload {
            OutboundPayload::Frame(frame) => {
                self.dispatch_control(*frame, item.user_data, item.priority, item.publish_stream_id)
            }
            OutboundPayload::Data(submission) => self.dispatch_data(submission, item.priority, item.seq),
        }
    }

    fn dispatch_control(
        &mut self,
        mut frame: Frame,
        user_data: Option<Box<dyn Any>>,
        priority: u8,
        publish_stream_id: Option<crate::outbound::StreamIdCell>,
    ) -> Result<bool, SessionError> {
        if matches!(frame, Frame::SynStream(_)) {
            // Both goaway_sent and goaway_received forbid new local
            // streams outright: any candidate ID assigned from here on is
            // by construction higher than any ID already seen by the peer
            // (IDs only increase), so there's no narrower case where a
            // goaway-received session could still assign an acceptable ID.
            if self.goaway_sent || self.goaway_received {
                self.handler.on_ctrl_not_send(&frame, NotSentReason::GoawayNotAllowed);
                return Ok(false);
            }
            if self.open_local_stream_count() >= self.local_settings.max_concurrent_streams as usize {
                let seq = self.outbound.next_seq();
                let mut requeued = OutboundItem::control(priority, seq, frame);
                requeued.user_data = user_data;
                requeued.publish_stream_id = publish_stream_id;
                self.blocked_syn_streams.push_back(requeued);
                return Ok(false);
            }
            let candidate = self.next_stream_id;
            if candidate > 0x7fff_ffff {
                self.handler.on_ctrl_not_send(&frame, NotSentReason::StreamIdNotAvailable);
                return Ok(false);
            }
            self.next_stream_id += 2;
            let (assoc_stream_id, stream_flags, stream_priority) = match &mut frame {
                Frame::SynStream(f) => {
                    f.stream_id = candidate;
                    (f.assoc_stream_id, f.flags.bits(), f.priority)
                }
                _ => unreachable!(),
            };
            if let Some(cell) = &publish_stream_id {
                cell.set(candidate);
            }
            let mut stream = Stream::new(candidate, stream_flags, stream_priority, StreamState::Opening, self.local_settings.initial_window_size as i64);
            stream.user_data = user_data;
            if assoc_stream_id != 0 {
                if let Some(parent) = self.streams.get_mut(&assoc_stream_id) {
                    parent.add_pushed_stream(candidate);
                }
            }
            self.streams.insert(candidate, stream);
            debug!(stream_id = candidate, "opening stream");
            self.handler.before_ctrl_send(&frame);
            let bytes = frame::pack(&frame, self.version, &mut self.encoder).map_err(SessionError::Zlib)?;
            self.pending_send = Some(PendingSend { bytes, sent: 0, outcome: PendingOutcome::Ctrl { frame } });
            return Ok(true);
        }

        match &frame {
            Frame::SynReply(f) => {
                let Some(stream) = self.streams.get(&f.stream_id) else {
                    self.handler.on_ctrl_not_send(&frame, NotSentReason::StreamClosed);
                    return Ok(false);
                };
                if stream.syn_reply_sent {
                    self.handler.on_ctrl_not_send(&frame, NotSentReason::StreamAlreadyReplied);
                    return Ok(false);
                }
            }
            Frame::Headers(f) => {
                let Some(stream) = self.streams.get(&f.stream_id) else {
                    self.handler.on_ctrl_not_send(&frame, NotSentReason::StreamClosed);
                    return Ok(false);
                };
                if stream.shut_flags.contains(ShutFlags::WR) {
                    self.handler.on_ctrl_not_send(&frame, NotSentReason::StreamShutWr);
                    return Ok(false);
                }
            }
            _ => {}
        }

        self.handler.before_ctrl_send(&frame);
        let bytes = frame::pack(&frame, self.version, &mut self.encoder).map_err(SessionError::Zlib)?;
        self.pending_send = Some(PendingSend { bytes, sent: 0, outcome: PendingOutcome::Ctrl { frame } });
        Ok(true)
    }

    fn dispatch_data(&mut self, mut submission: DataSubmission, priority: u8, seq: u64) -> Result<bool, SessionError> {
        let stream_id = submission.resolved_stream_id();
        submission.stream_id = stream_id;
        submission.stream_id_cell = None;
        let Some(stream) = self.streams.get(&stream_id) else {
            return Ok(false); // stream already gone (e.g. reset)
        };
        if stream.shut_flags.contains(ShutFlags::WR) {
            return Ok(false);
        }
        let max_len = if self.version.supports_window_update() {
            MAX_DATA_FRAME_PAYLOAD.min(stream.window_size.max(0) as usize)
        } else {
            MAX_DATA_FRAME_PAYLOAD
        };
        if max_len == 0 {
            // Flow-control window exhausted; park for a future WINDOW_UPDATE.
            let item = OutboundItem { priority_class: PriorityClass::Data, priority, seq, payload: OutboundPayload::Data(submission), user_data: None, publish_stream_id: None };
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.defer_data(item);
            }
            return Ok(false);
        }
        let mut buf = vec![0u8; max_len];
        match submission.provider.read(&mut buf).map_err(|_| SessionError::CallbackFailure)? {
            DataReadOutcome::Deferred => {
                let item = OutboundItem { priority_class: PriorityClass::Data, priority, seq, payload: OutboundPayload::Data(submission), user_data: None, publish_stream_id: None };
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.defer_data(item);
                }
                Ok(false)
            }
            DataReadOutcome::Read(read) => {
                buf.truncate(read.len);
                let fin = read.eof && submission.fin_requested;
                let mut flags = DataFlags::empty();
                if fin {
                    flags |= DataFlags::FIN;
                }
                let length = buf.len() as u32;
                let bytes_frame = Frame::Data(crate::frame::DataFrame { stream_id, flags, data: buf });
                let wire = frame::pack(&bytes_frame, self.version, &mut self.encoder).map_err(SessionError::Zlib)?;
                let requeue = if read.eof {
                    None
                } else {
                    Some(OutboundItem { priority_class: PriorityClass::Data, priority, seq, payload: OutboundPayload::Data(submission), user_data: None, publish_stream_id: None })
                };
                self.pending_send = Some(PendingSend {
                    bytes: wire,
                    sent: 0,
                    outcome: PendingOutcome::Data { stream_id, flags, length, requeue },
                });
                Ok(true)
            }
        }
    }

    /// Attempts to flush a buffered frame. Returns `Ok(None)` once fully
    /// flushed and finalized, `Ok(Some(pending))` if more bytes remain.
    fn flush_pending(&mut self, mut pending: PendingSend) -> Result<Option<PendingSend>, SessionError> {
        loop {
            if pending.sent >= pending.bytes.len() {
                self.finalize_send(pending.outcome)?;
                return Ok(None);
            }
            match self.handler.send(&pending.bytes[pending.sent..]).map_err(|_| SessionError::CallbackFailure)? {
                SendOutcome::Sent(0) => return Ok(Some(pending)),
                SendOutcome::Sent(n) => pending.sent += n,
                SendOutcome::WouldBlock => return Ok(Some(pending)),
            }
        }
    }

    fn finalize_send(&mut self, outcome: PendingOutcome) -> Result<(), SessionError> {
        match outcome {
            PendingOutcome::Ctrl { frame } => {
                self.handler.on_ctrl_send(&frame);
                self.apply_ctrl_send_effects(&frame);
            }
            PendingOutcome::Data { stream_id, flags, length, requeue } => {
                self.handler.on_data_send(flags.bits(), stream_id, length);
                if self.version.supports_window_update() {
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        stream.window_size -= length as i64;
                    }
                }
                if flags.contains(DataFlags::FIN) {
                    self.shutdown_stream(stream_id, ShutFlags::WR);
                }
                if let Some(item) = requeue {
                    self.outbound.push(item);
                }
            }
        }
        Ok(())
    }

    fn apply_ctrl_send_effects(&mut self, frame: &Frame) {
        match frame {
            Frame::SynStream(f) => {
                if f.flags.contains(CtrlFlags::FIN) {
                    self.shutdown_stream(f.stream_id, ShutFlags::WR);
                }
            }
            Frame::SynReply(f) => {
                if let Some(stream) = self.streams.get_mut(&f.stream_id) {
                    stream.syn_reply_sent = true;
                    if stream.state == StreamState::Opening {
                        stream.state = StreamState::Opened;
                    }
                }
                if f.flags.contains(CtrlFlags::FIN) {
                    self.shutdown_stream(f.stream_id, ShutFlags::WR);
                }
            }
            Frame::Headers(f) => {
                if f.flags.contains(CtrlFlags::FIN) {
                    self.shutdown_stream(f.stream_id, ShutFlags::WR);
                }
            }
            Frame::RstStream(f) => {
                self.outbound.remove_all_for_stream(f.stream_id);
                if self.streams.remove(&f.stream_id).is_some() {
                    self.handler.on_stream_close(f.stream_id, StreamCloseStatus::Rst(f.status));
                }
            }
            Frame::Settings(f) => self.apply_settings_locally_sent(f),
            Frame::GoAway(f) => {
                self.goaway_sent = true;
                self.goaway_sent_last_good_id = f.last_good_stream_id;
                warn!(last_good_stream_id = f.last_good_stream_id, "GOAWAY sent");
            }
            Frame::Ping(_) | Frame::Noop | Frame::WindowUpdate(_) | Frame::Data(_) => {}
        }
    }

    /// A SETTINGS frame we send carries no protocol effect on our own
    /// state (it advertises our limits to the peer); present for symmetry
    /// with `apply_settings` and to leave a documented hook.
    fn apply_settings_locally_sent(&mut self, _frame: &crate::frame::SettingsFrame) {}

    fn shutdown_stream(&mut self, stream_id: StreamId, flag: ShutFlags) {
        let Some(stream) = self.streams.get_mut(&stream_id) else { return };
        stream.shutdown(flag);
        if stream.shut_flags.is_shut_both() {
            self.streams.remove(&stream_id);
            self.handler.on_stream_close(stream_id, StreamCloseStatus::Ok);
            debug!(stream_id, "stream closed");
            self.unblock_syn_streams();
        }
    }

    fn unblock_syn_streams(&mut self) {
        while let Some(mut item) = self.blocked_syn_streams.pop_front() {
            item.seq = self.outbound.next_seq();
            self.outbound.push(item);
        }
    }

    // ---------------------------------------------------------------
    // Receive loop (spec.md §4.5)
    // ---------------------------------------------------------------

    pub fn recv(&mut self) -> Result<(), SessionError> {
        if self.fatal {
            return Err(SessionError::Protocol("session already failed".to_string()));
        }
        loop {
            match self.step_recv()? {
                StepOutcome::Progressed => continue,
                StepOutcome::WouldBlock => return Ok(()),
            }
        }
    }

    fn step_recv(&mut self) -> Result<StepOutcome, SessionError> {
        match std::mem::take(&mut self.recv_state) {
            RecvState::NeedHeader { mut buf } => {
                let need = 8 - buf.len();
                let mut tmp = vec![0u8; need];
                match self.handler.recv(&mut tmp).map_err(|_| SessionError::CallbackFailure)? {
                    RecvOutcome::Received(0) => {
                        self.recv_state = RecvState::NeedHeader { buf };
                        Ok(StepOutcome::WouldBlock)
                    }
                    RecvOutcome::Received(n) => {
                        buf.extend_from_slice(&tmp[..n]);
                        if buf.len() < 8 {
                            self.recv_state = RecvState::NeedHeader { buf };
                            return Ok(StepOutcome::Progressed);
                        }
                        let header = frame::parse_raw_header(&buf).map_err(|e| self.fail(SessionError::InvalidFrame(e)))?;
                        self.recv_state = match header {
                            RawHeader::Control { frame_type, flags, length, .. } => {
                                RecvState::NeedControlPayload { frame_type, flags, length, buf: Vec::with_capacity(length as usize) }
                            }
                            RawHeader::Data { stream_id, flags, length } => {
                                trace!(stream_id, length, "DATA header received");
                                RecvState::NeedDataPayload { stream_id, flags, total: length, remaining: length }
                            }
                        };
                        Ok(StepOutcome::Progressed)
                    }
                    RecvOutcome::WouldBlock => {
                        self.recv_state = RecvState::NeedHeader { buf };
                        Ok(StepOutcome::WouldBlock)
                    }
                    RecvOutcome::Eof => Err(self.fail(SessionError::Eof)),
                }
            }
            RecvState::NeedControlPayload { frame_type, flags, length, mut buf } => {
                let need = length as usize - buf.len();
                if need == 0 {
                    self.handle_control_payload(frame_type, flags, &buf)?;
                    self.recv_state = RecvState::default();
                    return Ok(StepOutcome::Progressed);
                }
                let chunk_len = need.min(RECV_CHUNK);
                let mut tmp = vec![0u8; chunk_len];
                match self.handler.recv(&mut tmp).map_err(|_| SessionError::CallbackFailure)? {
                    RecvOutcome::Received(0) => {
                        self.recv_state = RecvState::NeedControlPayload { frame_type, flags, length, buf };
                        Ok(StepOutcome::WouldBlock)
                    }
                    RecvOutcome::Received(n) => {
                        buf.extend_from_slice(&tmp[..n]);
                        self.recv_state = RecvState::NeedControlPayload { frame_type, flags, length, buf };
                        Ok(StepOutcome::Progressed)
                    }
                    RecvOutcome::WouldBlock => {
                        self.recv_state = RecvState::NeedControlPayload { frame_type, flags, length, buf };
                        Ok(StepOutcome::WouldBlock)
                    }
                    RecvOutcome::Eof => Err(self.fail(SessionError::Eof)),
                }
            }
            RecvState::NeedDataPayload { stream_id, flags, total, remaining } => {
                if remaining == 0 {
                    self.handle_data_complete(stream_id, flags, total);
                    self.recv_state = RecvState::default();
                    return Ok(StepOutcome::Progressed);
                }
                let chunk_len = (remaining as usize).min(RECV_CHUNK);
                let mut tmp = vec![0u8; chunk_len];
                match self.handler.recv(&mut tmp).map_err(|_| SessionError::CallbackFailure)? {
                    RecvOutcome::Received(0) => {
                        self.recv_state = RecvState::NeedDataPayload { stream_id, flags, total, remaining };
                        Ok(StepOutcome::WouldBlock)
                    }
                    RecvOutcome::Received(n) => {
                        if n > 0 {
                            self.handler.on_data_chunk_recv(flags, stream_id, &tmp[..n]);
                        }
                        self.recv_state = RecvState::NeedDataPayload { stream_id, flags, total, remaining: remaining - n as u32 };
                        Ok(StepOutcome::Progressed)
                    }
                    RecvOutcome::WouldBlock => {
                        self.recv_state = RecvState::NeedDataPayload { stream_id, flags, total, remaining };
                        Ok(StepOutcome::WouldBlock)
                    }
                    RecvOutcome::Eof => Err(self.fail(SessionError::Eof)),
                }
            }
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.fatal = true;
        err
    }

    fn handle_control_payload(&mut self, frame_type: u16, flags: u8, payload: &[u8]) -> Result<(), SessionError> {
        let frame = match frame::unpack_control(self.version, frame_type, flags, payload, &mut self.decoder) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(frame_type, error = %e, "undecodable control frame, failing session");
                let goaway = GoAwayFrame { last_good_stream_id: self.last_peer_stream_id, status: GoAwayStatusCode::ProtocolError };
                let seq = self.outbound.next_seq();
                self.outbound.push(OutboundItem::control(0, seq, Frame::GoAway(goaway)));
                return Err(self.fail(SessionError::InvalidFrame(e)));
            }
        };

        match &frame {
            Frame::SynStream(f) => self.on_recv_syn_stream(f.clone()),
            Frame::SynReply(f) => self.on_recv_syn_reply(f.clone()),
            Frame::Headers(f) => self.on_recv_headers(f.clone()),
            Frame::RstStream(f) => self.on_recv_rst_stream(*f),
            Frame::Settings(f) => self.apply_settings(f.clone()),
            Frame::Ping(f) => self.on_recv_ping(*f),
            Frame::GoAway(f) => self.on_recv_goaway(*f),
            Frame::WindowUpdate(f) => self.on_recv_window_update(*f),
            Frame::Noop => {}
            Frame::Data(_) => unreachable!("DATA never arrives through the control path"),
        }
        self.handler.on_ctrl_recv(&frame);
        Ok(())
    }

    fn on_recv_syn_stream(&mut self, f: SynStreamFrame) {
        if f.stream_id % 2 != self.peer_parity() {
            self.reject_frame(frame_type::SYN_STREAM, f.stream_id, RstStatusCode::ProtocolError);
            return;
        }
        if f.priority > self.version.lowest_priority() {
            self.reject_frame(frame_type::SYN_STREAM, f.stream_id, RstStatusCode::ProtocolError);
            return;
        }
        if f.stream_id <= self.last_peer_stream_id {
            self.reject_frame(frame_type::SYN_STREAM, f.stream_id, RstStatusCode::ProtocolError);
            return;
        }
        self.last_peer_stream_id = f.stream_id;
        let mut stream = Stream::new(f.stream_id, f.flags.bits(), f.priority, StreamState::Opening, self.local_settings.initial_window_size as i64);
        if f.flags.contains(CtrlFlags::FIN) {
            stream.shutdown(ShutFlags::RD);
        }
        let fin = f.flags.contains(CtrlFlags::FIN);
        self.streams.insert(f.stream_id, stream);
        debug!(stream_id = f.stream_id, "peer opened stream");
        if fin {
            self.handler.on_request_recv(f.stream_id);
        }
    }

    fn on_recv_syn_reply(&mut self, f: SynReplyFrame) {
        let Some(stream) = self.streams.get_mut(&f.stream_id) else {
            self.reject_frame(frame_type::SYN_REPLY, f.stream_id, RstStatusCode::InvalidStream);
            return;
        };
        if stream.syn_reply_received {
            self.reject_frame(frame_type::SYN_REPLY, f.stream_id, RstStatusCode::StreamInUse);
            return;
        }
        stream.syn_reply_received = true;
        if stream.state == StreamState::Opening {
            stream.state = StreamState::Opened;
        }
        if f.flags.contains(CtrlFlags::FIN) {
            self.shutdown_stream(f.stream_id, ShutFlags::RD);
            self.handler.on_request_recv(f.stream_id);
        }
    }

    fn on_recv_headers(&mut self, f: HeadersFrame) {
        if !self.streams.contains_key(&f.stream_id) {
            self.reject_frame(frame_type::HEADERS, f.stream_id, RstStatusCode::InvalidStream);
            return;
        }
        if f.flags.contains(CtrlFlags::FIN) {
            self.shutdown_stream(f.stream_id, ShutFlags::RD);
            self.handler.on_request_recv(f.stream_id);
        }
    }

    fn on_recv_rst_stream(&mut self, f: RstStreamFrame) {
        self.outbound.remove_all_for_stream(f.stream_id);
        if self.streams.remove(&f.stream_id).is_some() {
            self.handler.on_stream_close(f.stream_id, StreamCloseStatus::Rst(f.status));
        }
    }

    fn apply_settings(&mut self, f: crate::frame::SettingsFrame) {
        use crate::frame::SettingsFlags;
        if f.flags.contains(SettingsFlags::CLEAR_SETTINGS) {
            self.local_settings.entries.clear();
        }
        for entry in &f.entries {
            self.local_settings.entries.insert(entry.id, entry.clone());
            if entry.id == settings_id::MAX_CONCURRENT_STREAMS {
                self.local_settings.max_concurrent_streams = entry.value;
                self.unblock_syn_streams();
            } else if entry.id == settings_id::INITIAL_WINDOW_SIZE && self.version.supports_window_update() {
                let delta = entry.value as i64 - self.local_settings.initial_window_size as i64;
                for stream in self.streams.values_mut() {
                    stream.window_size += delta;
                }
                self.local_settings.initial_window_size = entry.value;
            }
        }
    }

    fn on_recv_ping(&mut self, f: PingFrame) {
        if f.id % 2 != self.role.ping_id_parity() {
            // Peer-initiated: echo it straight back, highest priority.
            let seq = self.outbound.next_seq();
            self.outbound.push(OutboundItem::control(0, seq, Frame::Ping(f)));
        }
    }

    fn on_recv_goaway(&mut self, f: GoAwayFrame) {
        self.goaway_received = true;
        self.goaway_received_last_good_id = f.last_good_stream_id;
        warn!(last_good_stream_id = f.last_good_stream_id, "GOAWAY received");
        let parity = self.local_parity();
        let doomed: Vec<StreamId> = self
            .streams
            .keys()
            .copied()
            .filter(|id| *id % 2 == parity && *id > f.last_good_stream_id)
            .collect();
        for id in doomed {
            self.outbound.remove_all_for_stream(id);
            self.streams.remove(&id);
            self.handler.on_stream_close(id, StreamCloseStatus::Rst(RstStatusCode::RefusedStream));
        }
    }

    fn on_recv_window_update(&mut self, f: WindowUpdateFrame) {
        if f.delta == 0 {
            self.reject_frame(frame_type::WINDOW_UPDATE, f.stream_id, RstStatusCode::ProtocolError);
            return;
        }
        let Some(stream) = self.streams.get_mut(&f.stream_id) else {
            return; // stream already closed; nothing to replenish
        };
        stream.window_size += f.delta as i64;
        if let Some(deferred) = stream.take_deferred() {
            self.outbound.push(deferred);
        }
    }

    fn handle_data_complete(&mut self, stream_id: StreamId, flags: u8, length: u32) {
        self.handler.on_data_recv(flags, stream_id, length);
        if DataFlags::from_bits_truncate(flags).contains(DataFlags::FIN) {
            self.shutdown_stream(stream_id, ShutFlags::RD);
            self.handler.on_request_recv(stream_id);
        }
    }

    /// Enqueues an RST_STREAM for a decodable-but-semantically-invalid
    /// control frame and reports it through `on_invalid_ctrl_recv`
    /// (spec.md §7 — stream-level, not connection-fatal).
    fn reject_frame(&mut self, frame_type: u16, stream_id: StreamId, status: RstStatusCode) {
        self.handler.on_invalid_ctrl_recv(frame_type, status);
        let seq = self.outbound.next_seq();
        self.outbound.push(OutboundItem::control(0, seq, Frame::RstStream(RstStreamFrame { stream_id, status })));
    }
}

enum StepOutcome {
    Progressed,
    WouldBlock,
}

fn normalize_nv(nv: NameValueBlock, version: SpdyVersion) -> NameValueBlock {
    nv.into_iter()
        .map(|(name, value)| (crate::header_block::normalize_name(&name, version), value))
        .collect()
}
