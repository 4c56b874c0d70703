//! C8: audio playback pipeline. RTP OPUS → OPUS decoder → PCM ring, with
//! the inbound sequence/jitter guard.
//!
//! Grounded on `janus/src/client.c`'s `us_janus_client_recv` (the
//! late/wrap guard and packet validation) and `_aplay_thread` (the
//! decode loop, zero-length silence markers).

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use audiopus::coder::Decoder as OpusDecoder;
use audiopus::{Channels, SampleRate};
use tracing::error;

use crate::error::{AudioError, ProtocolError};
use crate::ring::Ring;
use crate::rtp::{InboundRtp, PAYLOAD_TYPE_OPUS, RTP_HEADER_SIZE};

const APLAY_ENC_RING_CAPACITY: usize = 64;
const APLAY_PCM_RING_CAPACITY: usize = 64;
const PCM_FRAMES_PER_PACKET: usize = 960; // 20ms at 48kHz
const OPUS_CH: usize = 2;
/// Late/wrap guard tolerance: a sequence this far behind `aplay_seq_next`
/// is presumed to be a post-wraparound packet rather than a stale one.
const WRAP_TOLERANCE: u16 = 50;

#[derive(Default, Clone)]
struct EncSlot {
    data: Vec<u8>,
}

#[derive(Default, Clone)]
pub struct PcmSlot {
    pub data: Vec<i16>,
}

/// Accepts iff `seq >= next` or the unsigned backward distance `next - seq`
/// (mod 2^16) exceeds the wrap tolerance — the explicit modulo-2^16
/// distance check called for in place of the source's signed-looking
/// `next - seq > 50` comparison.
pub fn accept_sequence(next: u16, seq: u16) -> bool {
    if seq >= next {
        return true;
    }
    let backward_distance = next.wrapping_sub(seq);
    backward_distance as u32 > WRAP_TOLERANCE as u32
}

pub struct AudioPlayback {
    enc_ring: Arc<Ring<EncSlot>>,
    pcm_ring: Arc<Ring<PcmSlot>>,
    aplay_seq_next: AtomicU16,
    transmit_aplay: AtomicBool,
    stop: Arc<AtomicBool>,
    decoder_thread: Option<JoinHandle<()>>,
}

impl AudioPlayback {
    pub fn start() -> Result<Self, AudioError> {
        let decoder = OpusDecoder::new(SampleRate::Hz48000, Channels::Stereo)
            .map_err(|e| AudioError::Codec(format!("{e:?}")))?;

        let enc_ring = Arc::new(Ring::new(APLAY_ENC_RING_CAPACITY, EncSlot::default));
        let pcm_ring = Arc::new(Ring::new(APLAY_PCM_RING_CAPACITY, PcmSlot::default));
        let stop = Arc::new(AtomicBool::new(false));

        let decoder_thread = {
            let enc_ring = Arc::clone(&enc_ring);
            let pcm_ring = Arc::clone(&pcm_ring);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || decoder_loop(decoder, enc_ring, pcm_ring, stop))
        };

        Ok(Self {
            enc_ring,
            pcm_ring,
            aplay_seq_next: AtomicU16::new(0),
            transmit_aplay: AtomicBool::new(false),
            stop,
            decoder_thread: Some(decoder_thread),
        })
    }

    pub fn set_transmit_aplay(&self, enabled: bool) {
        self.transmit_aplay.store(enabled, Ordering::Relaxed);
    }

    /// Validates and enqueues one inbound datagram. Rejects video packets,
    /// short packets, wrong payload type, and packets arriving while
    /// playback is muted; applies the late/wrap guard to everything else.
    pub fn recv(&self, video: bool, data: &[u8]) -> Result<(), ProtocolError> {
        if video {
            return Err(ProtocolError::UnexpectedVideo);
        }
        if !self.transmit_aplay.load(Ordering::Relaxed) {
            return Err(ProtocolError::PlaybackMuted);
        }
        if data.len() < RTP_HEADER_SIZE {
            return Err(ProtocolError::ShortPacket);
        }
        let packet = InboundRtp::parse(data).ok_or(ProtocolError::ShortPacket)?;
        if packet.payload_type != PAYLOAD_TYPE_OPUS {
            return Err(ProtocolError::WrongPayloadType(packet.payload_type));
        }

        let next = self.aplay_seq_next.load(Ordering::Relaxed);
        if !accept_sequence(next, packet.sequence) {
            return Ok(());
        }
        self.aplay_seq_next.store(packet.sequence.wrapping_add(1), Ordering::Relaxed);

        if let Ok(mut slot) = self.enc_ring.producer_acquire(Duration::ZERO) {
            slot.data.clear();
            slot.data.extend_from_slice(packet.payload);
            self.enc_ring.producer_release(slot);
        }
        Ok(())
    }

    /// Non-blocking: used by the controller's mixer thread, which
    /// polls every session in turn and can't afford to block on one that
    /// has nothing decoded yet.
    pub fn try_recv_pcm(&self) -> Result<PcmSlot, AudioError> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(AudioError::Stopped);
        }
        let slot = self
            .pcm_ring
            .consumer_acquire(Duration::ZERO)
            .map_err(|_| AudioError::NoData)?;
        let pcm = slot.clone();
        self.pcm_ring.consumer_release(slot);
        Ok(pcm)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.decoder_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decoder_loop(
    mut decoder: OpusDecoder,
    enc_ring: Arc<Ring<EncSlot>>,
    pcm_ring: Arc<Ring<PcmSlot>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let enc_slot = match enc_ring.consumer_acquire(Duration::from_millis(100)) {
            Ok(slot) => slot,
            Err(_) => continue,
        };

        if enc_slot.data.is_empty() {
            // Silence marker: skip, don't touch the PCM ring.
            enc_ring.consumer_release(enc_slot);
            continue;
        }

        let mut pcm_out = vec![0i16; PCM_FRAMES_PER_PACKET * OPUS_CH];
        let decode_result = decoder.decode(Some(&enc_slot.data), &mut pcm_out, false);
        enc_ring.consumer_release(enc_slot);

        match decode_result {
            Ok(decoded_frames) => match pcm_ring.producer_acquire(Duration::ZERO) {
                Ok(mut out_slot) => {
                    pcm_out.truncate(decoded_frames * OPUS_CH);
                    out_slot.data = pcm_out;
                    pcm_ring.producer_release(out_slot);
                }
                Err(_) => tracing::warn!("audio playback: PCM ring is full"),
            },
            Err(e) => error!(error = ?e, "fatal: can't decode OPUS packet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_in_order_and_slightly_ahead() {
        assert!(accept_sequence(100, 100));
        assert!(accept_sequence(100, 101));
    }

    #[test]
    fn rejects_stale_within_tolerance() {
        assert!(!accept_sequence(100, 99));
        assert!(!accept_sequence(100, 50));
    }

    #[test]
    fn accepts_wraparound_beyond_tolerance() {
        // scenario 5: aplay_seq_next = 100, incoming 60000 wraps around.
        assert!(accept_sequence(100, 60000));
    }

    #[test]
    fn scenario_five_sequence_matches_spec() {
        let next = AtomicU16::new(100);
        let incoming = [99u16, 100, 101, 60000];
        let mut accepted = Vec::new();
        for &seq in &incoming {
            let current = next.load(Ordering::Relaxed);
            if accept_sequence(current, seq) {
                accepted.push(seq);
                next.store(seq.wrapping_add(1), Ordering::Relaxed);
            }
        }
        assert_eq!(accepted, vec![100, 101, 60000]);
        assert_eq!(next.load(Ordering::Relaxed), 60001);
    }
}
