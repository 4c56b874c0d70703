//! End-to-end playback ingestion: drives `AudioPlayback::recv` with real
//! RTP datagrams (not just the bare `accept_sequence` helper), covering
//! the full rejection stack — muted playback, wrong payload type, short
//! packets, video-tagged packets — plus the late/wrap guard from
//! scenario 5, §8, observed through the decoder actually producing PCM
//! (or not) for each packet.

use std::time::{Duration, Instant};

use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Channels, SampleRate};
use ustreamer_dataplane::audio::AudioPlayback;
use ustreamer_dataplane::error::ProtocolError;
use ustreamer_dataplane::rtp::{PAYLOAD_TYPE_H264, PAYLOAD_TYPE_OPUS, RTP_HEADER_SIZE};

fn silent_opus_frame() -> Vec<u8> {
    let mut encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio).unwrap();
    let pcm = vec![0i16; 960 * 2];
    let mut out = vec![0u8; 512];
    let used = encoder.encode(&pcm, &mut out).unwrap();
    out.truncate(used);
    out
}

fn datagram(payload_type: u8, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; RTP_HEADER_SIZE + payload.len()];
    buf[0] = 2 << 6;
    buf[1] = payload_type & 0x7F;
    buf[2..4].copy_from_slice(&sequence.to_be_bytes());
    buf[RTP_HEADER_SIZE..].copy_from_slice(payload);
    buf
}

/// Polls `try_recv_pcm` until no new frame has shown up for `quiet_for`.
fn drain_decoded_count(playback: &AudioPlayback, quiet_for: Duration) -> usize {
    let mut count = 0;
    let mut last_progress = Instant::now();
    while last_progress.elapsed() < quiet_for {
        if playback.try_recv_pcm().is_ok() {
            count += 1;
            last_progress = Instant::now();
        } else {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    count
}

#[test]
fn rejects_while_muted_then_accepts_once_unmuted() {
    let playback = AudioPlayback::start().unwrap();
    let pkt = datagram(PAYLOAD_TYPE_OPUS, 0, &[0u8; 8]);

    let err = playback.recv(false, &pkt).unwrap_err();
    assert!(matches!(err, ProtocolError::PlaybackMuted));

    playback.set_transmit_aplay(true);
    assert!(playback.recv(false, &pkt).is_ok());
}

#[test]
fn rejects_video_tagged_and_malformed_packets() {
    let mut playback = AudioPlayback::start().unwrap();
    playback.set_transmit_aplay(true);

    let opus_pkt = datagram(PAYLOAD_TYPE_OPUS, 0, &[0u8; 8]);
    assert!(matches!(playback.recv(true, &opus_pkt).unwrap_err(), ProtocolError::UnexpectedVideo));
    assert!(matches!(playback.recv(false, &[0u8; 4]).unwrap_err(), ProtocolError::ShortPacket));
    assert!(matches!(
        playback.recv(false, &datagram(PAYLOAD_TYPE_H264, 0, &[0u8; 8])).unwrap_err(),
        ProtocolError::WrongPayloadType(pt) if pt == PAYLOAD_TYPE_H264
    ));

    playback.stop();
}

#[test]
fn scenario_five_sequence_only_decodes_accepted_packets() {
    let mut playback = AudioPlayback::start().unwrap();
    playback.set_transmit_aplay(true);
    let frame = silent_opus_frame();

    // Prime `aplay_seq_next` to 100 the way a normal stream would.
    playback.recv(false, &datagram(PAYLOAD_TYPE_OPUS, 99, &frame)).unwrap();

    // Scenario 5: deliver [99, 100, 101, 60000] against aplay_seq_next=100.
    // 99 is stale and must be dropped silently; the rest are accepted.
    for seq in [99u16, 100, 101, 60000] {
        playback.recv(false, &datagram(PAYLOAD_TYPE_OPUS, seq, &frame)).unwrap();
    }

    // One decode for the priming packet plus three for 100/101/60000 — the
    // stale 99 never reaches the decoder ring at all.
    let decoded = drain_decoded_count(&playback, Duration::from_millis(500));
    assert_eq!(decoded, 4);

    playback.stop();
}
