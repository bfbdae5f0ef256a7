//! SPDY frame codec: bit-exact wire format for SPDY/2 and SPDY/3
//! (spec.md §4.1, §6).
//!
//! Control-frame common header: `{C=1:1 | version:15 | type:16 | flags:8 |
//! length:24}` — 8 bytes. DATA header: `{C=0 | stream_id:31 | flags:8 |
//! length:24}` — 8 bytes. All multi-byte integers are big-endian.

use crate::dictionary::SpdyVersion;
use crate::header_block::{HeaderBlockDecoder, HeaderBlockEncoder, NameValueBlock};

pub type StreamId = u32;

/// Control frame type identifiers (spec.md §6).
pub mod frame_type {
    pub const SYN_STREAM: u16 = 1;
    pub const SYN_REPLY: u16 = 2;
    pub const RST_STREAM: u16 = 3;
    pub const SETTINGS: u16 = 4;
    pub const NOOP: u16 = 5;
    pub const PING: u16 = 6;
    pub const GOAWAY: u16 = 7;
    pub const HEADERS: u16 = 8;
    pub const WINDOW_UPDATE: u16 = 9;
}

bitflags::bitflags! {
    /// Control-frame flags (SYN_STREAM, SYN_REPLY, HEADERS).
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtrlFlags: u8 {
        const FIN = 0x1;
        /// SYN_STREAM only: marks a server push stream with no response
        /// expected from the peer beyond the push itself.
        const UNIDIRECTIONAL = 0x2;
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataFlags: u8 {
        const FIN = 0x1;
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SettingsFlags: u8 {
        const CLEAR_SETTINGS = 0x1;
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SettingsEntryFlags: u8 {
        const PERSIST_VALUE = 0x1;
        const PERSISTED = 0x2;
    }
}

/// RST_STREAM and invalid-frame status codes (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RstStatusCode {
    ProtocolError = 1,
    InvalidStream = 2,
    RefusedStream = 3,
    UnsupportedVersion = 4,
    Cancel = 5,
    InternalError = 6,
    FlowControlError = 7,
    StreamInUse = 8,
    StreamAlreadyClosed = 9,
    InvalidCredentials = 10,
    FrameTooLarge = 11,
}

impl RstStatusCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        use RstStatusCode::*;
        Some(match value {
            1 => ProtocolError,
            2 => InvalidStream,
            3 => RefusedStream,
            4 => UnsupportedVersion,
            5 => Cancel,
            6 => InternalError,
            7 => FlowControlError,
            8 => StreamInUse,
            9 => StreamAlreadyClosed,
            10 => InvalidCredentials,
            11 => FrameTooLarge,
            _ => return None,
        })
    }
}

/// Status reported through `on_stream_close`: either a graceful FIN-driven
/// closure (`Ok`) or closure via RST_STREAM with a specific status.
/// Mirrors `spdylay_status_code`, where `SPDYLAY_OK` (0) is not a valid
/// wire status but is used for this purpose internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCloseStatus {
    Ok,
    Rst(RstStatusCode),
}

/// GOAWAY status codes (SPDY/3 only; ignored on the wire for SPDY/2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GoAwayStatusCode {
    Ok = 0,
    ProtocolError = 1,
    InternalError = 11,
}

impl GoAwayStatusCode {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => GoAwayStatusCode::ProtocolError,
            11 => GoAwayStatusCode::InternalError,
            _ => GoAwayStatusCode::Ok,
        }
    }
}

/// SETTINGS identifiers 1..=8 (spdylay.h `spdylay_settings_id`).
pub mod settings_id {
    pub const UPLOAD_BANDWIDTH: u32 = 1;
    pub const DOWNLOAD_BANDWIDTH: u32 = 2;
    pub const ROUND_TRIP_TIME: u32 = 3;
    pub const MAX_CONCURRENT_STREAMS: u32 = 4;
    pub const CURRENT_CWND: u32 = 5;
    pub const DOWNLOAD_RETRANS_RATE: u32 = 6;
    pub const INITIAL_WINDOW_SIZE: u32 = 7;
    /// SPDY/3 only.
    pub const CLIENT_CERTIFICATE_VECTOR_SIZE: u32 = 8;
}

pub const SETTINGS_MAX_ID: u32 = 8;
/// Default maximum number of locally-open streams (SPDYLAY_CONCURRENT_STREAMS_MAX).
pub const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;
/// Default SPDY/3 per-stream flow-control window.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEntry {
    pub id: u32,
    pub flags: SettingsEntryFlags,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynStreamFrame {
    pub flags: CtrlFlags,
    pub stream_id: StreamId,
    pub assoc_stream_id: StreamId,
    pub priority: u8,
    /// SPDY/3 only; always 0 on SPDY/2.
    pub slot: u8,
    pub nv: NameValueBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynReplyFrame {
    pub flags: CtrlFlags,
    pub stream_id: StreamId,
    pub nv: NameValueBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub status: RstStatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub flags: SettingsFlags,
    pub entries: Vec<SettingsEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_good_stream_id: StreamId,
    pub status: GoAwayStatusCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadersFrame {
    pub flags: CtrlFlags,
    pub stream_id: StreamId,
    pub nv: NameValueBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub delta: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub flags: DataFlags,
    pub data: Vec<u8>,
}

/// The wire union, tagged by frame kind (spec.md §9 "Tagged union of frames").
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Noop,
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    Headers(HeadersFrame),
    WindowUpdate(WindowUpdateFrame),
    Data(DataFrame),
}

impl Frame {
    pub fn frame_type_id(&self) -> Option<u16> {
        match self {
            Frame::SynStream(_) => Some(frame_type::SYN_STREAM),
            Frame::SynReply(_) => Some(frame_type::SYN_REPLY),
            Frame::RstStream(_) => Some(frame_type::RST_STREAM),
            Frame::Settings(_) => Some(frame_type::SETTINGS),
            Frame::Noop => Some(frame_type::NOOP),
            Frame::Ping(_) => Some(frame_type::PING),
            Frame::GoAway(_) => Some(frame_type::GOAWAY),
            Frame::Headers(_) => Some(frame_type::HEADERS),
            Frame::WindowUpdate(_) => Some(frame_type::WINDOW_UPDATE),
            Frame::Data(_) => None,
        }
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Frame::SynStream(f) => Some(f.stream_id),
            Frame::SynReply(f) => Some(f.stream_id),
            Frame::RstStream(f) => Some(f.stream_id),
            Frame::Headers(f) => Some(f.stream_id),
            Frame::WindowUpdate(f) => Some(f.stream_id),
            Frame::Data(f) => Some(f.stream_id),
            Frame::Settings(_) | Frame::Noop | Frame::Ping(_) | Frame::GoAway(_) => None,
        }
    }
}

/// Decoded common frame header, before the payload is interpreted.
#[derive(Debug, Clone, Copy)]
pub enum RawHeader {
    Control {
        version: u16,
        frame_type: u16,
        flags: u8,
        length: u32,
    },
    Data {
        stream_id: StreamId,
        flags: u8,
        length: u32,
    },
}

impl RawHeader {
    pub fn length(&self) -> u32 {
        match self {
            RawHeader::Control { length, .. } => *length,
            RawHeader::Data { length, .. } => *length,
        }
    }
}

/// Parses the 8-byte common frame header.
pub fn parse_raw_header(bytes: &[u8]) -> Result<RawHeader, String> {
    if bytes.len() < 8 {
        return Err("frame header shorter than 8 bytes".to_string());
    }
    let control = bytes[0] & 0x80 != 0;
    if control {
        let version = (((bytes[0] & 0x7f) as u16) << 8) | bytes[1] as u16;
        let frame_type = ((bytes[2] as u16) << 8) | bytes[3] as u16;
        let flags = bytes[4];
        let length = ((bytes[5] as u32) << 16) | ((bytes[6] as u32) << 8) | bytes[7] as u32;
        Ok(RawHeader::Control {
            version,
            frame_type,
            flags,
            length,
        })
    } else {
        let stream_id = (((bytes[0] & 0x7f) as u32) << 24)
            | ((bytes[1] as u32) << 16)
            | ((bytes[2] as u32) << 8)
            | bytes[3] as u32;
        let flags = bytes[4];
        let length = ((bytes[5] as u32) << 16) | ((bytes[6] as u32) << 8) | bytes[7] as u32;
        Ok(RawHeader::Data {
            stream_id,
            flags,
            length,
        })
    }
}

fn write_control_header(out: &mut Vec<u8>, version: SpdyVersion, frame_type: u16, flags: u8, length: usize) {
    let version = version.as_u16();
    out.push(0x80 | ((version >> 8) as u8 & 0x7f));
    out.push(version as u8);
    out.push((frame_type >> 8) as u8);
    out.push(frame_type as u8);
    out.push(flags);
    out.push((length >> 16) as u8);
    out.push((length >> 8) as u8);
    out.push(length as u8);
}

fn write_data_header(out: &mut Vec<u8>, stream_id: StreamId, flags: u8, length: usize) {
    out.push(((stream_id >> 24) as u8) & 0x7f);
    out.push((stream_id >> 16) as u8);
    out.push((stream_id >> 8) as u8);
    out.push(stream_id as u8);
    out.push(flags);
    out.push((length >> 16) as u8);
    out.push((length >> 8) as u8);
    out.push(length as u8);
}

/// Minimum control-frame payload length per type, used to validate
/// decoded lengths before field extraction (spec.md §4.1).
fn min_payload_len(frame_type: u16, version: SpdyVersion) -> usize {
    match frame_type {
        t if t == frame_type::SYN_STREAM => {
            if version == SpdyVersion::V2 {
                10
            } else {
                12
            }
        }
        t if t == frame_type::SYN_REPLY => 4,
        t if t == frame_type::RST_STREAM => 8,
        t if t == frame_type::SETTINGS => 4,
        t if t == frame_type::NOOP => 0,
        t if t == frame_type::PING => 4,
        t if t == frame_type::GOAWAY => {
            if version == SpdyVersion::V2 {
                4
            } else {
                8
            }
        }
        t if t == frame_type::HEADERS => 4,
        t if t == frame_type::WINDOW_UPDATE => 8,
        _ => 0,
    }
}

/// Packs a frame into its wire representation. The header-block encoder is
/// shared across the whole direction and must not be used concurrently.
pub fn pack(frame: &Frame, version: SpdyVersion, encoder: &mut HeaderBlockEncoder) -> Result<Vec<u8>, String> {
    match frame {
        Frame::SynStream(f) => {
            let compressed = encoder.encode(&f.nv, version)?;
            let mut payload = Vec::new();
            payload.extend_from_slice(&f.stream_id.to_be_bytes());
            payload.extend_from_slice(&f.assoc_stream_id.to_be_bytes());
            if version == SpdyVersion::V2 {
                payload.push(f.priority << 5);
            } else {
                payload.push(f.priority << 5);
                payload.push(f.slot);
            }
            payload.extend_from_slice(&compressed);
            let mut out = Vec::with_capacity(8 + payload.len());
            write_control_header(&mut out, version, frame_type::SYN_STREAM, f.flags.bits(), payload.len());
            out.extend_from_slice(&payload);
            Ok(out)
        }
        Frame::SynReply(f) => {
            let compressed = encoder.encode(&f.nv, version)?;
            let mut payload = Vec::new();
            payload.extend_from_slice(&f.stream_id.to_be_bytes());
            if version == SpdyVersion::V2 {
                payload.extend_from_slice(&[0, 0]);
            }
            payload.extend_from_slice(&compressed);
            let mut out = Vec::with_capacity(8 + payload.len());
            write_control_header(&mut out, version, frame_type::SYN_REPLY, f.flags.bits(), payload.len());
            out.extend_from_slice(&payload);
            Ok(out)
        }
        Frame::RstStream(f) => {
            let mut out = Vec::with_capacity(16);
            write_control_header(&mut out, version, frame_type::RST_STREAM, 0, 8);
            out.extend_from_slice(&f.stream_id.to_be_bytes());
            out.extend_from_slice(&(f.status as u32).to_be_bytes());
            Ok(out)
        }
        Frame::Settings(f) => {
            let mut payload = Vec::new();
            payload.extend_from_slice(&(f.entries.len() as u32).to_be_bytes());
            for entry in &f.entries {
                let id_and_flags = (entry.id & 0x00ff_ffff) | ((entry.flags.bits() as u32) << 24);
                payload.extend_from_slice(&id_and_flags.to_be_bytes());
                payload.extend_from_slice(&entry.value.to_be_bytes());
            }
            let mut out = Vec::with_capacity(8 + payload.len());
            write_control_header(&mut out, version, frame_type::SETTINGS, f.flags.bits(), payload.len());
            out.extend_from_slice(&payload);
            Ok(out)
        }
        Frame::Noop => {
            let mut out = Vec::with_capacity(8);
            write_control_header(&mut out, version, frame_type::NOOP, 0, 0);
            Ok(out)
        }
        Frame::Ping(f) => {
            let mut out = Vec::with_capacity(12);
            write_control_header(&mut out, version, frame_type::PING, 0, 4);
            out.extend_from_slice(&f.id.to_be_bytes());
            Ok(out)
        }
        Frame::GoAway(f) => {
            let mut payload = Vec::new();
            payload.extend_from_slice(&f.last_good_stream_id.to_be_bytes());
            if version == SpdyVersion::V3 {
                payload.extend_from_slice(&(f.status as u32).to_be_bytes());
            }
            let mut out = Vec::with_capacity(8 + payload.len());
            write_control_header(&mut out, version, frame_type::GOAWAY, 0, payload.len());
            out.extend_from_slice(&payload);
            Ok(out)
        }
        Frame::Headers(f) => {
            let compressed = encoder.encode(&f.nv, version)?;
            let mut payload = Vec::new();
            payload.extend_from_slice(&f.stream_id.to_be_bytes());
            if version == SpdyVersion::V2 {
                payload.extend_from_slice(&[0, 0]);
            }
            payload.extend_from_slice(&compressed);
            let mut out = Vec::with_capacity(8 + payload.len());
            write_control_header(&mut out, version, frame_type::HEADERS, f.flags.bits(), payload.len());
            out.extend_from_slice(&payload);
            Ok(out)
        }
        Frame::WindowUpdate(f) => {
            let mut out = Vec::with_capacity(16);
            write_control_header(&mut out, version, frame_type::WINDOW_UPDATE, 0, 8);
            out.extend_from_slice(&f.stream_id.to_be_bytes());
            out.extend_from_slice(&f.delta.to_be_bytes());
            Ok(out)
        }
        Frame::Data(f) => {
            let mut out = Vec::with_capacity(8 + f.data.len());
            write_data_header(&mut out, f.stream_id, f.flags.bits(), f.data.len());
            out.extend_from_slice(&f.data);
            Ok(out)
        }
    }
}

/// Unpacks a control frame's payload given its already-parsed header.
/// `role_is_server` determines which stream-ID parity is valid for
/// SYN_STREAM (peer-initiated streams must have the opposite parity of the
/// local role).
pub fn unpack_control(
    version: SpdyVersion,
    frame_type: u16,
    flags: u8,
    payload: &[u8],
    decoder: &mut HeaderBlockDecoder,
) -> Result<Frame, String> {
    let min_len = min_payload_len(frame_type, version);
    if payload.len() < min_len {
        return Err(format!(
            "control frame type {} payload too short: {} < {}",
            frame_type,
            payload.len(),
            min_len
        ));
    }
    match frame_type {
        t if t == frame_type::SYN_STREAM => {
            let stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
            let assoc_stream_id =
                u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]) & 0x7fff_ffff;
            if stream_id == 0 {
                return Err("SYN_STREAM with stream ID 0".to_string());
            }
            // Both versions share the same 3-bit wire layout (top bits of
            // the byte after assoc_stream_id); v2 just restricts valid
            // values to 0..=3, so a peer-sent priority of 4..=7 decodes
            // cleanly but is out of range for v2 (spec.md §8 S4).
            let (priority, slot, nv_offset) = if version == SpdyVersion::V2 {
                (payload[8] >> 5, 0u8, 10)
            } else {
                (payload[8] >> 5, payload[9], 12)
            };
            // Priority range is validated at the stream level in
            // `on_recv_syn_stream`, not here: an out-of-range priority is a
            // decodable-but-invalid frame, not an undecodable one.
            let nv = decoder.decode(&payload[nv_offset..], version)?;
            Ok(Frame::SynStream(SynStreamFrame {
                flags: CtrlFlags::from_bits_truncate(flags),
                stream_id,
                assoc_stream_id,
                priority,
                slot,
                nv,
            }))
        }
        t if t == frame_type::SYN_REPLY => {
            let stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
            if stream_id == 0 {
                return Err("SYN_REPLY with stream ID 0".to_string());
            }
            let nv_offset = if version == SpdyVersion::V2 { 6 } else { 4 };
            let nv = decoder.decode(&payload[nv_offset..], version)?;
            Ok(Frame::SynReply(SynReplyFrame {
                flags: CtrlFlags::from_bits_truncate(flags),
                stream_id,
                nv,
            }))
        }
        t if t == frame_type::RST_STREAM => {
            let stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
            let status_raw = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            let status = RstStatusCode::from_u32(status_raw)
                .unwrap_or(RstStatusCode::ProtocolError);
            Ok(Frame::RstStream(RstStreamFrame { stream_id, status }))
        }
        t if t == frame_type::SETTINGS => {
            let count = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
            let mut entries = Vec::with_capacity(count);
            let mut pos = 4;
            for _ in 0..count {
                if payload.len() < pos + 8 {
                    return Err("SETTINGS frame truncated".to_string());
                }
                let id_and_flags =
                    u32::from_be_bytes([payload[pos], payload[pos + 1], payload[pos + 2], payload[pos + 3]]);
                let id = id_and_flags & 0x00ff_ffff;
                let entry_flags = (id_and_flags >> 24) as u8;
                let value = u32::from_be_bytes([
                    payload[pos + 4],
                    payload[pos + 5],
                    payload[pos + 6],
                    payload[pos + 7],
                ]);
                entries.push(SettingsEntry {
                    id,
                    flags: SettingsEntryFlags::from_bits_truncate(entry_flags),
                    value,
                });
                pos += 8;
            }
            Ok(Frame::Settings(SettingsFrame {
                flags: SettingsFlags::from_bits_truncate(flags),
                entries,
            }))
        }
        t if t == frame_type::NOOP => Ok(Frame::Noop),
        t if t == frame_type::PING => {
            let id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Ok(Frame::Ping(PingFrame { id }))
        }
        t if t == frame_type::GOAWAY => {
            let last_good_stream_id =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
            let status = if version == SpdyVersion::V3 && payload.len() >= 8 {
                GoAwayStatusCode::from_u32(u32::from_be_bytes([
                    payload[4], payload[5], payload[6], payload[7],
                ]))
            } else {
                GoAwayStatusCode::Ok
            };
            Ok(Frame::GoAway(GoAwayFrame {
                last_good_stream_id,
                status,
            }))
        }
        t if t == frame_type::HEADERS => {
            let stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
            if stream_id == 0 {
                return Err("HEADERS with stream ID 0".to_string());
            }
            let nv_offset = if version == SpdyVersion::V2 { 6 } else { 4 };
            let nv = decoder.decode(&payload[nv_offset..], version)?;
            Ok(Frame::Headers(HeadersFrame {
                flags: CtrlFlags::from_bits_truncate(flags),
                stream_id,
                nv,
            }))
        }
        t if t == frame_type::WINDOW_UPDATE => {
            if version != SpdyVersion::V3 {
                return Err("WINDOW_UPDATE is not valid on SPDY/2".to_string());
            }
            let stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
            let delta = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]) & 0x7fff_ffff;
            Ok(Frame::WindowUpdate(WindowUpdateFrame { stream_id, delta }))
        }
        _ => Err(format!("unrecognized control frame type {}", frame_type)),
    }
}
