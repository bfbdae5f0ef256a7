//! Frame codec round-trip and validation tests (spec.md §4.1, §8).

use spdy_sans_io::frame::{
    self, frame_type, CtrlFlags, DataFlags, Frame, GoAwayFrame, GoAwayStatusCode, HeadersFrame,
    PingFrame, RawHeader, RstStatusCode, RstStreamFrame, SynReplyFrame, SynStreamFrame,
    WindowUpdateFrame,
};
use spdy_sans_io::header_block::{HeaderBlockDecoder, HeaderBlockEncoder};
use spdy_sans_io::SpdyVersion;

fn nv(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn round_trip(frame: Frame, version: SpdyVersion) -> Frame {
    let mut encoder = HeaderBlockEncoder::new(version);
    let mut decoder = HeaderBlockDecoder::new(version);
    let bytes = frame::pack(&frame, version, &mut encoder).expect("pack");
    let header = frame::parse_raw_header(&bytes).expect("header");
    let (frame_type, flags, payload) = match header {
        RawHeader::Control { frame_type, flags, length, .. } => {
            (frame_type, flags, &bytes[8..8 + length as usize])
        }
        RawHeader::Data { .. } => panic!("control frame expected"),
    };
    frame::unpack_control(version, frame_type, flags, payload, &mut decoder).expect("unpack")
}

#[test]
fn syn_stream_round_trips_on_v3() {
    let frame = Frame::SynStream(SynStreamFrame {
        flags: CtrlFlags::FIN,
        stream_id: 1,
        assoc_stream_id: 0,
        priority: 2,
        slot: 0,
        nv: nv(&[(":method", "GET"), (":path", "/")]),
    });
    match round_trip(frame, SpdyVersion::V3) {
        Frame::SynStream(f) => {
            assert_eq!(f.stream_id, 1);
            assert_eq!(f.priority, 2);
            assert!(f.flags.contains(CtrlFlags::FIN));
            assert_eq!(f.nv, nv(&[(":method", "GET"), (":path", "/")]));
        }
        other => panic!("expected SynStream, got {:?}", other),
    }
}

#[test]
fn syn_stream_round_trips_on_v2_with_name_translation() {
    let frame = Frame::SynStream(SynStreamFrame {
        flags: CtrlFlags::empty(),
        stream_id: 1,
        assoc_stream_id: 0,
        priority: 1,
        slot: 0,
        nv: nv(&[(":method", "GET"), (":path", "/")]),
    });
    match round_trip(frame, SpdyVersion::V2) {
        Frame::SynStream(f) => {
            assert_eq!(f.nv, nv(&[("method", "GET"), ("url", "/")]));
        }
        other => panic!("expected SynStream, got {:?}", other),
    }
}

#[test]
fn data_frame_header_round_trips_and_clears_reserved_bit() {
    let frame = Frame::Data(spdy_sans_io::frame::DataFrame {
        stream_id: 0x7fff_ffff,
        flags: DataFlags::FIN,
        data: b"hello".to_vec(),
    });
    let mut encoder = HeaderBlockEncoder::new(SpdyVersion::V3);
    let bytes = frame::pack(&frame, SpdyVersion::V3, &mut encoder).unwrap();
    match frame::parse_raw_header(&bytes).unwrap() {
        RawHeader::Data { stream_id, flags, length } => {
            assert_eq!(stream_id, 0x7fff_ffff);
            assert_eq!(flags, DataFlags::FIN.bits());
            assert_eq!(length, 5);
        }
        RawHeader::Control { .. } => panic!("expected data header"),
    }
}

#[test]
fn ping_round_trips() {
    let frame = Frame::Ping(PingFrame { id: 42 });
    match round_trip(frame, SpdyVersion::V3) {
        Frame::Ping(f) => assert_eq!(f.id, 42),
        other => panic!("expected Ping, got {:?}", other),
    }
}

#[test]
fn rst_stream_round_trips_with_status() {
    let frame = Frame::RstStream(RstStreamFrame { stream_id: 3, status: RstStatusCode::Cancel });
    match round_trip(frame, SpdyVersion::V3) {
        Frame::RstStream(f) => {
            assert_eq!(f.stream_id, 3);
            assert_eq!(f.status, RstStatusCode::Cancel);
        }
        other => panic!("expected RstStream, got {:?}", other),
    }
}

#[test]
fn goaway_v3_carries_status_v2_does_not() {
    let frame = Frame::GoAway(GoAwayFrame { last_good_stream_id: 7, status: GoAwayStatusCode::InternalError });
    match round_trip(frame.clone(), SpdyVersion::V3) {
        Frame::GoAway(f) => assert_eq!(f.status, GoAwayStatusCode::InternalError),
        other => panic!("expected GoAway, got {:?}", other),
    }
    match round_trip(frame, SpdyVersion::V2) {
        Frame::GoAway(f) => assert_eq!(f.status, GoAwayStatusCode::Ok),
        other => panic!("expected GoAway, got {:?}", other),
    }
}

#[test]
fn window_update_rejected_on_v2() {
    let mut encoder = HeaderBlockEncoder::new(SpdyVersion::V3);
    let mut decoder = HeaderBlockDecoder::new(SpdyVersion::V2);
    let frame = Frame::WindowUpdate(WindowUpdateFrame { stream_id: 1, delta: 100 });
    let bytes = frame::pack(&frame, SpdyVersion::V3, &mut encoder).unwrap();
    let payload = &bytes[8..];
    let result = frame::unpack_control(SpdyVersion::V2, frame_type::WINDOW_UPDATE, 0, payload, &mut decoder);
    assert!(result.is_err());
}

#[test]
fn headers_round_trips() {
    let frame = Frame::Headers(HeadersFrame {
        flags: CtrlFlags::FIN,
        stream_id: 5,
        nv: nv(&[("x-custom", "value")]),
    });
    match round_trip(frame, SpdyVersion::V3) {
        Frame::Headers(f) => {
            assert_eq!(f.stream_id, 5);
            assert!(f.flags.contains(CtrlFlags::FIN));
        }
        other => panic!("expected Headers, got {:?}", other),
    }
}

#[test]
fn control_frame_payload_too_short_is_rejected() {
    let mut decoder = HeaderBlockDecoder::new(SpdyVersion::V3);
    let result = frame::unpack_control(SpdyVersion::V3, frame_type::PING, 0, &[0, 0], &mut decoder);
    assert!(result.is_err());
}

#[test]
fn syn_reply_v2_round_trips_through_padding() {
    let frame = Frame::SynReply(SynReplyFrame {
        flags: CtrlFlags::empty(),
        stream_id: 1,
        nv: nv(&[(":status", "200")]),
    });
    match round_trip(frame, SpdyVersion::V2) {
        Frame::SynReply(f) => assert_eq!(f.nv, nv(&[("status", "200")])),
        other => panic!("expected SynReply, got {:?}", other),
    }
}
