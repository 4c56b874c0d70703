//! C7: audio capture pipeline. ALSA PCM reader → optional Speex resample
//! → OPUS encoder, staged through two rings and two threads.
//!
//! Grounded on `janus/src/acap.c`: `pcm_ring`/`enc_ring` capacity 8,
//! 20 ms reads (`pcm_hz / 50` frames), non-blocking producer acquire with
//! a logged drop on overflow, `bitrate`/`max_bandwidth`/`signal` encoder
//! controls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::Direction;
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Bandwidth, Bitrate, Channels, SampleRate, Signal};
use speexdsp_resampler::State as Resampler;
use tracing::{error, warn};

use crate::error::AudioError;
use crate::ring::Ring;

pub const MIN_PCM_HZ: u32 = 8_000;
pub const MAX_PCM_HZ: u32 = 192_000;
const OPUS_HZ: u32 = 48_000;
const OPUS_CH: usize = 2;
const FRAME_MS: u32 = 20;
const RESAMPLER_QUALITY_DESKTOP: i32 = 5;
const PCM_RING_CAPACITY: usize = 8;
const ENC_RING_CAPACITY: usize = 8;
const MAX_ENCODED_PAYLOAD: usize = crate::rtp::US_RTP_DATAGRAM_SIZE - crate::rtp::RTP_HEADER_SIZE;

fn hz_to_frames(hz: u32) -> usize {
    (hz / (1000 / FRAME_MS)) as usize
}

#[derive(Default, Clone)]
struct PcmBuffer {
    data: Vec<i16>,
}

#[derive(Default, Clone)]
pub struct EncodedBuffer {
    pub data: Vec<u8>,
    pub pts: u64,
}

pub struct AudioCaptureConfig {
    pub device: String,
    pub pcm_hz: u32,
    pub opus_bitrate_bps: u32,
}

/// Probes whether a capture device name opens successfully, without
/// keeping it open. Mirrors `us_acap_probe`.
pub fn probe(device: &str) -> bool {
    match PCM::new(device, Direction::Capture, false) {
        Ok(_) => true,
        Err(e) => {
            warn!(device, error = %e, "audio capture device is not available");
            false
        }
    }
}

pub struct AudioCapture {
    pcm_ring: Arc<Ring<PcmBuffer>>,
    enc_ring: Arc<Ring<EncodedBuffer>>,
    stop: Arc<AtomicBool>,
    pts: Arc<AtomicU64>,
    pcm_thread: Option<JoinHandle<()>>,
    encoder_thread: Option<JoinHandle<()>>,
}

impl AudioCapture {
    pub fn start(config: AudioCaptureConfig) -> Result<Self, AudioError> {
        if !(MIN_PCM_HZ..=MAX_PCM_HZ).contains(&config.pcm_hz) {
            return Err(AudioError::SampleRateOutOfRange(config.pcm_hz));
        }

        let pcm = open_capture_device(&config.device, config.pcm_hz)?;
        let pcm_frames = hz_to_frames(config.pcm_hz);

        let resampler = if config.pcm_hz != OPUS_HZ {
            Some(
                Resampler::new(OPUS_CH as u32, config.pcm_hz, OPUS_HZ, RESAMPLER_QUALITY_DESKTOP)
                    .map_err(|e| AudioError::Resample(format!("{e:?}")))?,
            )
        } else {
            None
        };

        let mut encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)
            .map_err(|e| AudioError::Codec(format!("{e:?}")))?;
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(config.opus_bitrate_bps as i32))
            .map_err(|e| AudioError::Codec(format!("{e:?}")))?;
        encoder
            .set_max_bandwidth(Bandwidth::Fullband)
            .map_err(|e| AudioError::Codec(format!("{e:?}")))?;
        encoder
            .set_signal(Signal::Music)
            .map_err(|e| AudioError::Codec(format!("{e:?}")))?;

        let pcm_ring = Arc::new(Ring::new(PCM_RING_CAPACITY, PcmBuffer::default));
        let enc_ring = Arc::new(Ring::new(ENC_RING_CAPACITY, EncodedBuffer::default));
        let stop = Arc::new(AtomicBool::new(false));
        let pts = Arc::new(AtomicU64::new(0));

        let pcm_thread = {
            let pcm_ring = Arc::clone(&pcm_ring);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || pcm_reader_loop(pcm, pcm_frames, pcm_ring, stop))
        };

        let encoder_thread = {
            let pcm_ring = Arc::clone(&pcm_ring);
            let enc_ring = Arc::clone(&enc_ring);
            let stop = Arc::clone(&stop);
            let pts = Arc::clone(&pts);
            std::thread::spawn(move || {
                encoder_loop(config.pcm_hz, pcm_frames, resampler, encoder, pcm_ring, enc_ring, stop, pts)
            })
        };

        Ok(Self {
            pcm_ring,
            enc_ring,
            stop,
            pts,
            pcm_thread: Some(pcm_thread),
            encoder_thread: Some(encoder_thread),
        })
    }

    /// Public op: returns the next encoded OPUS frame, if any.
    pub fn get_encoded(&self) -> Result<EncodedBuffer, AudioError> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(AudioError::Stopped);
        }
        let slot = self
            .enc_ring
            .consumer_acquire(Duration::from_millis(100))
            .map_err(|_| AudioError::NoData)?;
        let buffer = slot.clone();
        self.enc_ring.consumer_release(slot);
        Ok(buffer)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.pcm_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.encoder_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_capture_device(device: &str, pcm_hz: u32) -> Result<PCM, AudioError> {
    let pcm = PCM::new(device, Direction::Capture, false).map_err(|e| AudioError::Alsa(e.to_string()))?;
    {
        let hwp = HwParams::any(&pcm).map_err(|e| AudioError::Alsa(e.to_string()))?;
        hwp.set_access(Access::RWInterleaved).map_err(|e| AudioError::Alsa(e.to_string()))?;
        hwp.set_channels(OPUS_CH as u32).map_err(|e| AudioError::Alsa(e.to_string()))?;
        hwp.set_format(Format::s16()).map_err(|e| AudioError::Alsa(e.to_string()))?;
        hwp.set_rate_near(pcm_hz, alsa::ValueOr::Nearest).map_err(|e| AudioError::Alsa(e.to_string()))?;
        pcm.hw_params(&hwp).map_err(|e| AudioError::Alsa(e.to_string()))?;
    }
    Ok(pcm)
}

fn pcm_reader_loop(pcm: PCM, pcm_frames: usize, pcm_ring: Arc<Ring<PcmBuffer>>, stop: Arc<AtomicBool>) {
    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            error!(error = %e, "fatal: can't obtain PCM io handle");
            stop.store(true, Ordering::Relaxed);
            return;
        }
    };
    let mut buffer = vec![0i16; pcm_frames * OPUS_CH];

    while !stop.load(Ordering::Relaxed) {
        match io.readi(&mut buffer) {
            Ok(frames) if frames == pcm_frames => {
                match pcm_ring.producer_acquire(Duration::ZERO) {
                    Ok(mut slot) => {
                        slot.data.clear();
                        slot.data.extend_from_slice(&buffer);
                        pcm_ring.producer_release(slot);
                    }
                    Err(_) => warn!("audio capture: PCM ring is full"),
                }
            }
            Ok(_) => {
                error!("fatal: too few PCM frames captured");
                break;
            }
            Err(e) => {
                error!(error = %e, "fatal: can't capture PCM frames");
                break;
            }
        }
    }
    stop.store(true, Ordering::Relaxed);
}

#[allow(clippy::too_many_arguments)]
fn encoder_loop(
    pcm_hz: u32,
    pcm_frames: usize,
    mut resampler: Option<Resampler>,
    mut encoder: OpusEncoder,
    pcm_ring: Arc<Ring<PcmBuffer>>,
    enc_ring: Arc<Ring<EncodedBuffer>>,
    stop: Arc<AtomicBool>,
    pts: Arc<AtomicU64>,
) {
    let out_frames = hz_to_frames(OPUS_HZ);
    let mut resampled = vec![0i16; out_frames * OPUS_CH];

    while !stop.load(Ordering::Relaxed) {
        let in_slot = match pcm_ring.consumer_acquire(Duration::from_millis(100)) {
            Ok(slot) => slot,
            Err(_) => continue,
        };

        let encode_input: &[i16] = if let Some(resampler) = resampler.as_mut() {
            debug_assert_ne!(pcm_hz, OPUS_HZ);
            match resampler.process_interleaved_int(&in_slot.data, &mut resampled) {
                Ok(_) => &resampled,
                Err(e) => {
                    error!(error = ?e, "fatal: resampler failed");
                    pcm_ring.consumer_release(in_slot);
                    break;
                }
            }
        } else {
            debug_assert_eq!(pcm_hz, OPUS_HZ);
            &in_slot.data[..pcm_frames * OPUS_CH]
        };

        let mut encoded = vec![0u8; MAX_ENCODED_PAYLOAD];
        let encode_result = encoder.encode(encode_input, &mut encoded);
        pcm_ring.consumer_release(in_slot);

        match encode_result {
            Ok(used) => match enc_ring.producer_acquire(Duration::ZERO) {
                Ok(mut out_slot) => {
                    encoded.truncate(used);
                    out_slot.data = encoded;
                    out_slot.pts = pts.fetch_add(out_frames as u64, Ordering::Relaxed);
                    enc_ring.producer_release(out_slot);
                }
                Err(_) => warn!("audio capture: OPUS encoder queue is full"),
            },
            Err(e) => error!(error = ?e, "fatal: can't encode PCM frame to OPUS"),
        }
    }
    stop.store(true, Ordering::Relaxed);
}
