//! End-to-end OPUS packetization: verifies the RTP timestamp placement
//! across a contiguous run of 20 ms frames (scenario 4, §8 — the capture
//! pipeline advances `pts` by 960 OPUS-clock units per frame) and that
//! the wrapped datagrams round-trip through the inbound parser the
//! playback side uses.

use ustreamer_dataplane::rtp::opus::OpusPacketizer;
use ustreamer_dataplane::rtp::{InboundRtp, OPUS_SAMPLES_PER_FRAME, PAYLOAD_TYPE_OPUS};

#[test]
fn contiguous_frames_advance_pts_by_960() {
    let packetizer = OpusPacketizer::new();
    let mut pts = 0u32;
    let mut timestamps = Vec::new();

    for frame_index in 0..10u8 {
        let payload = vec![frame_index; 32];
        let datagram = packetizer.wrap(&payload, pts).expect("payload fits one datagram");
        let parsed = InboundRtp::parse(&datagram).unwrap();

        assert_eq!(parsed.payload_type, PAYLOAD_TYPE_OPUS);
        assert!(!parsed.marker);
        assert_eq!(parsed.payload, &payload[..]);

        timestamps.push(u32::from_be_bytes(datagram[4..8].try_into().unwrap()));
        pts += OPUS_SAMPLES_PER_FRAME;
    }

    let expected: Vec<u32> = (0..10).map(|i| i * OPUS_SAMPLES_PER_FRAME).collect();
    assert_eq!(timestamps, expected);
    assert_eq!(expected.last(), Some(&8640));
}

#[test]
fn sequence_numbers_are_contiguous_across_frames() {
    let packetizer = OpusPacketizer::new();
    let mut sequences = Vec::new();
    for _ in 0..5 {
        let datagram = packetizer.wrap(&[0u8; 4], 0).unwrap();
        sequences.push(InboundRtp::parse(&datagram).unwrap().sequence);
    }
    for pair in sequences.windows(2) {
        assert_eq!(pair[1], pair[0].wrapping_add(1));
    }
}
