//! Per-stream state (spec.md §3, §4's "Stream" component).

use std::any::Any;

use crate::frame::StreamId;
use crate::outbound::OutboundItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initial,
    Opening,
    Opened,
    Closing,
}

bitflags::bitflags! {
    /// Half-close tracking, one bit per direction.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShutFlags: u8 {
        const RD = 0x1;
        const WR = 0x2;
    }
}

impl ShutFlags {
    pub fn is_shut_both(self) -> bool {
        self.contains(ShutFlags::RD) && self.contains(ShutFlags::WR)
    }
}

/// A single multiplexed stream.
pub struct Stream {
    pub stream_id: StreamId,
    pub flags: u8,
    pub priority: u8,
    pub state: StreamState,
    pub shut_flags: ShutFlags,
    /// Stream IDs of server-push children associated with this stream.
    pub pushed_streams: Vec<StreamId>,
    /// At most one deferred DATA item per stream (spec.md §3 invariant).
    pub deferred: Option<OutboundItem>,
    pub user_data: Option<Box<dyn Any>>,
    /// SPDY/3 flow-control send window; unused on SPDY/2 (left at i64::MAX).
    pub window_size: i64,
    pub syn_reply_sent: bool,
    pub syn_reply_received: bool,
}

impl Stream {
    pub fn new(stream_id: StreamId, flags: u8, priority: u8, state: StreamState, window_size: i64) -> Self {
        Self {
            stream_id,
            flags,
            priority,
            state,
            shut_flags: ShutFlags::empty(),
            pushed_streams: Vec::new(),
            deferred: None,
            user_data: None,
            window_size,
            syn_reply_sent: false,
            syn_reply_received: false,
        }
    }

    pub fn shutdown(&mut self, flag: ShutFlags) {
        self.shut_flags |= flag;
        if self.shut_flags.is_shut_both() {
            self.state = StreamState::Closing;
        }
    }

    pub fn add_pushed_stream(&mut self, stream_id: StreamId) {
        self.pushed_streams.push(stream_id);
    }

    /// Parks `item` as this stream's deferred DATA. Panics if one is
    /// already held — callers must check via `submit_data`'s
    /// `SubmitError::DeferredDataExists` before reaching this point.
    pub fn defer_data(&mut self, item: OutboundItem) {
        assert!(self.deferred.is_none(), "stream already has deferred data");
        self.deferred = Some(item);
    }

    pub fn take_deferred(&mut self) -> Option<OutboundItem> {
        self.deferred.take()
    }
}
