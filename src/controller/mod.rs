//! C10: plugin controller. Owns the dataplane's lifecycle — the memsink
//! thread, the audio capture fan-out thread, the playback mixer thread,
//! and the session list — and dispatches the gateway's lifecycle
//! callbacks and JSON-RPC-like messages onto them.
//!
//! Grounded on `janus/src/plugin.c`: `_plugin_init`/`_plugin_destroy` (the
//! config load + memsink-thread spawn/join pair), `_clients_thread` (the
//! memsink read loop, reproduced in `memsink_loop` below), and
//! `_plugin_handle_message`'s `start`/`stop`/`watch` dispatch. Unlike the
//! C original's process-wide globals, this is an explicit value the
//! binary entry point owns and passes to gateway callbacks as context
//! (spec.md §9 design note on the global controller state).

pub mod audio_probe;
pub mod tc358743;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use alsa::pcm::PCM;
use alsa::Direction;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::audio::mixer::mix_all;
use crate::audio::{AudioCapture, AudioCaptureConfig};
use crate::config::Config;
use crate::error::{ControllerError, MemsinkError};
use crate::frame::Frame;
use crate::gateway::{Gateway, PluginEvent, SessionId};
use crate::memsink::MemSinkReader;
use crate::rtp::h264::H264Packetizer;
use crate::rtp::opus::OpusPacketizer;
use crate::session::Session;
use crate::sdp;

const WATCHERS_POLL_INTERVAL: Duration = Duration::from_millis(100);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const APLAY_MIX_INTERVAL: Duration = Duration::from_millis(20);

pub struct Controller {
    config: Config,
    gateway: Arc<dyn Gateway>,
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    next_session_id: AtomicU64,
    has_watchers: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    rtpv: Arc<H264Packetizer>,
    rtpa: Option<Arc<OpusPacketizer>>,
    acap: Arc<Mutex<Option<AudioCapture>>>,
    memsink_thread: Option<JoinHandle<()>>,
    acap_fanout_thread: Option<JoinHandle<()>>,
    aplay_mix_thread: Option<JoinHandle<()>>,
}

impl Controller {
    /// Loads configuration, probes the audio device, starts capture if
    /// enabled, and spawns the memsink/audio-fanout/playback-mix threads.
    pub fn init(config_path: impl AsRef<std::path::Path>, gateway: Arc<dyn Gateway>) -> Result<Self, ControllerError> {
        let mut config = Config::load(config_path)?;
        info!(sink = %config.video.sink, "initializing uStreamer dataplane controller");

        let acap_enabled = config.acap_enabled() && probe_audio_device(&mut config);
        let aplay_enabled = config.aplay_enabled();

        let acap = if acap_enabled {
            let device = config.acap.device.clone().expect("acap_enabled implies device is set");
            match AudioCapture::start(AudioCaptureConfig {
                device: device.clone(),
                pcm_hz: config.acap.sampling_rate,
                opus_bitrate_bps: config.acap.opus_bitrate_bps,
            }) {
                Ok(capture) => Some(capture),
                Err(e) => {
                    warn!(device, error = %e, "audio capture device failed to start, continuing video-only");
                    None
                }
            }
        } else {
            None
        };

        let rtpv = Arc::new(H264Packetizer::new());
        let rtpa = if acap.is_some() || aplay_enabled {
            Some(Arc::new(OpusPacketizer::new()))
        } else {
            None
        };

        let sessions = Arc::new(Mutex::new(HashMap::new()));
        let has_watchers = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let acap = Arc::new(Mutex::new(acap));

        let memsink_thread = {
            let sink = config.video.sink.clone();
            let sessions = Arc::clone(&sessions);
            let has_watchers = Arc::clone(&has_watchers);
            let stop = Arc::clone(&stop);
            let rtpv = Arc::clone(&rtpv);
            std::thread::spawn(move || memsink_loop(sink, sessions, has_watchers, stop, rtpv))
        };

        let acap_fanout_thread = rtpa.as_ref().map(|rtpa| {
            let acap = Arc::clone(&acap);
            let sessions = Arc::clone(&sessions);
            let stop = Arc::clone(&stop);
            let rtpa = Arc::clone(rtpa);
            std::thread::spawn(move || acap_fanout_loop(acap, sessions, stop, rtpa))
        });

        let aplay_mix_thread = if aplay_enabled {
            let device = config.aplay.device.clone().expect("aplay_enabled implies device is set");
            let sessions = Arc::clone(&sessions);
            let stop = Arc::clone(&stop);
            Some(std::thread::spawn(move || aplay_mix_loop(device, sessions, stop)))
        } else {
            None
        };

        Ok(Self {
            config,
            gateway,
            sessions,
            next_session_id: AtomicU64::new(1),
            has_watchers,
            stop,
            rtpv,
            rtpa,
            acap,
            memsink_thread: Some(memsink_thread),
            acap_fanout_thread,
            aplay_mix_thread,
        })
    }

    fn recompute_has_watchers(&self, sessions: &HashMap<SessionId, Session>) {
        let any = sessions.values().any(|s| s.is_transmitting());
        self.has_watchers.store(any, Ordering::Relaxed);
    }

    pub fn create_session(&self) -> Result<SessionId, ControllerError> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(id, Arc::clone(&self.gateway))?;
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(id, session);
        self.has_watchers.store(true, Ordering::Relaxed);
        info!(session = id, "session created");
        Ok(id)
    }

    pub fn destroy_session(&self, id: SessionId) -> Result<(), ControllerError> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(mut session) = sessions.remove(&id) else {
            return Err(ControllerError::UnknownSession(id));
        };
        session.stop();
        self.recompute_has_watchers(&sessions);
        info!(session = id, "session destroyed");
        Ok(())
    }

    pub fn setup_media(&self, id: SessionId) {
        let sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get(&id) {
            session.setup_media();
        }
        self.recompute_has_watchers(&sessions);
    }

    pub fn hangup_media(&self, id: SessionId) {
        let sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get(&id) {
            session.hangup_media();
        }
        self.recompute_has_watchers(&sessions);
    }

    pub fn set_video_orient(&self, id: SessionId, orient: u32) {
        let sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get(&id) {
            session.set_video_orient(orient);
        }
    }

    /// Routes an inbound RTP datagram (the audio return channel) from the
    /// gateway to the owning session's playback pipeline.
    pub fn recv_rtp(&self, id: SessionId, video: bool, data: &[u8]) {
        let sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get(&id) {
            if let Err(e) = session.recv_rtp(video, data) {
                warn!(session = id, error = %e, "inbound RTP packet rejected");
            }
        }
    }

    fn make_offer(&self) -> Option<String> {
        let bidirectional = self.config.aplay_enabled();
        sdp::create_offer(&self.rtpv, self.rtpa.as_deref().map(|rtpa| (rtpa, bidirectional)))
    }

    /// Dispatches a plugin message per spec.md §6/§4.9:
    /// `start`/`stop` toggle the acap/aplay transmit gates and acknowledge;
    /// `watch` returns an SDP offer or a `503` if SPS/PPS haven't arrived
    /// yet; anything else is `405`.
    pub async fn handle_message(&self, session_id: SessionId, transaction: &str, request: &Value) -> Result<(), ControllerError> {
        let event = match request.get("request").and_then(Value::as_str) {
            Some("start") => {
                self.apply_transmit_gates(session_id, request, true);
                PluginEvent::status("started")
            }
            Some("stop") => {
                self.apply_transmit_gates(session_id, request, false);
                PluginEvent::status("stopped")
            }
            Some("watch") => match self.make_offer() {
                Some(sdp) => PluginEvent::status("started")
                    .with_jsep(serde_json::json!({ "type": "offer", "sdp": sdp })),
                None => PluginEvent::error(503, "Haven't received SPS/PPS from memsink yet"),
            },
            _ => PluginEvent::error(405, "Not implemented"),
        };

        self.gateway
            .push_event(session_id, transaction, event)
            .await
            .map_err(|e| ControllerError::Gateway(e.to_string()))
    }

    fn apply_transmit_gates(&self, id: SessionId, request: &Value, default: bool) {
        let acap_on = request.get("acap").and_then(Value::as_bool).unwrap_or(default);
        let aplay_on = request.get("aplay").and_then(Value::as_bool).unwrap_or(default);
        let sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get(&id) {
            session.set_transmit_acap(acap_on);
            session.set_transmit_aplay(aplay_on);
        }
    }

    /// Stops every dataplane thread and drains the session list. Joins
    /// before returning so no thread observes a half-torn-down controller.
    pub fn destroy(&mut self) {
        info!("destroying controller");
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.memsink_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.acap_fanout_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.aplay_mix_thread.take() {
            let _ = handle.join();
        }

        let mut sessions = self.sessions.lock().unwrap();
        for (_, mut session) in sessions.drain() {
            session.stop();
        }

        if let Some(mut acap) = self.acap.lock().unwrap().take() {
            acap.stop();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Probes the configured ALSA device (and, if a TC358743 node is
/// configured, the HDMI audio-present/sampling-rate controls) before
/// capture commits to opening it. Overrides `config.acap.sampling_rate`
/// with the HDMI-reported rate when present, since the TC358743 reading
/// is ground truth for what the source is actually sending.
fn probe_audio_device(config: &mut Config) -> bool {
    let Some(device) = config.acap.device.as_deref() else {
        return false;
    };
    if !audio_probe::probe(device) {
        warn!(device, "audio capture device not found under /proc/asound, disabling capture");
        return false;
    }

    if let Some(path) = config.acap.tc358743.clone() {
        match tc358743::read_info(&path) {
            Ok(info) if info.has_audio && info.audio_hz > 0 => {
                info!(hz = info.audio_hz, "HDMI audio present, overriding configured sampling rate");
                config.acap.sampling_rate = info.audio_hz;
            }
            Ok(_) => {
                info!("TC358743 reports no HDMI audio present, disabling capture");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "TC358743 audio probe failed, using configured sampling rate");
            }
        }
    }
    true
}

/// Mirrors `_clients_thread`: while no session is watching, sleep; once
/// watchers exist, attach the memsink and relay every frame's RTP
/// datagrams into each transmitting session's video ring. Fatal
/// attach/read errors close the cycle and retry after `RETRY_DELAY`; a
/// bare `NoData` wait timeout is not fatal and the loop just spins.
fn memsink_loop(
    sink: String,
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    has_watchers: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    rtpv: Arc<H264Packetizer>,
) {
    let mut frame = Frame::new();
    let mut reader = match MemSinkReader::new(&sink) {
        Ok(reader) => reader,
        Err(e) => {
            error!(sink, error = %e, "fatal: can't resolve memsink capacity, video intake disabled");
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        if !has_watchers.load(Ordering::Relaxed) {
            std::thread::sleep(WATCHERS_POLL_INTERVAL);
            continue;
        }

        if let Err(e) = reader.attach() {
            warn!(sink, error = %e, "can't attach memsink");
            std::thread::sleep(RETRY_DELAY);
            continue;
        }
        info!(sink, "memsink attached, reading frames");

        while !stop.load(Ordering::Relaxed) && has_watchers.load(Ordering::Relaxed) {
            match reader.wait_frame() {
                Ok(()) => {
                    if let Err(e) = reader.get_frame(&mut frame, false) {
                        warn!(sink, error = %e, "can't read frame from memsink");
                        break;
                    }
                    rtpv.wrap(&frame, false, |datagram| {
                        let sessions = sessions.lock().unwrap();
                        for session in sessions.values() {
                            if session.is_transmitting() {
                                session.push_video(datagram.clone());
                            }
                        }
                    });
                }
                Err(MemsinkError::NoData) => continue,
                Err(e) => {
                    warn!(sink, error = %e, "memsink read failed, reattaching");
                    break;
                }
            }
        }

        reader.detach();
        info!(sink, "memsink detached");
        std::thread::sleep(RETRY_DELAY);
    }
}

/// Consumes the audio capture pipeline's encoded OPUS frames, wraps each
/// in an RTP datagram, and fans it out to every session's `acap_ring` —
/// the per-session thread gates delivery on `transmit && transmit_acap`.
fn acap_fanout_loop(
    acap: Arc<Mutex<Option<AudioCapture>>>,
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    stop: Arc<AtomicBool>,
    rtpa: Arc<OpusPacketizer>,
) {
    while !stop.load(Ordering::Relaxed) {
        let encoded = {
            let guard = acap.lock().unwrap();
            match guard.as_ref() {
                Some(capture) => capture.get_encoded(),
                None => return,
            }
        };
        match encoded {
            Ok(buffer) => {
                if let Some(datagram) = rtpa.wrap(&buffer.data, buffer.pts as u32) {
                    let sessions = sessions.lock().unwrap();
                    for session in sessions.values() {
                        session.push_acap(datagram.clone());
                    }
                }
            }
            Err(crate::error::AudioError::NoData) => continue,
            Err(crate::error::AudioError::Stopped) => {
                warn!("audio capture pipeline stopped, ending fan-out thread");
                return;
            }
            Err(e) => warn!(error = %e, "audio capture encode error"),
        }
    }
}

/// Mixes every active session's decoded playback PCM (per
/// `audio::mixer::mix_all`, spec.md §2's data-flow "mixer" stage) and
/// writes the result to the configured ALSA playback device every 20ms.
fn aplay_mix_loop(device: String, sessions: Arc<Mutex<HashMap<SessionId, Session>>>, stop: Arc<AtomicBool>) {
    let pcm = match open_playback_device(&device) {
        Ok(pcm) => pcm,
        Err(e) => {
            error!(device, error = %e, "fatal: can't open ALSA playback device");
            return;
        }
    };
    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            error!(device, error = %e, "fatal: can't obtain ALSA playback io handle");
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        let buffers: Vec<Vec<i16>> = {
            let sessions = sessions.lock().unwrap();
            sessions
                .values()
                .filter_map(|s| s.playback.try_recv_pcm().ok().map(|p| p.data))
                .collect()
        };
        let mixed = mix_all(buffers.iter().map(|b| b.as_slice()));
        if mixed.is_empty() {
            std::thread::sleep(APLAY_MIX_INTERVAL);
            continue;
        }
        if let Err(e) = io.writei(&mixed) {
            error!(device, error = %e, "fatal: ALSA playback write failed");
            break;
        }
    }
}

fn open_playback_device(device: &str) -> Result<PCM, alsa::Error> {
    use alsa::pcm::{Access, Format, HwParams};

    let pcm = PCM::new(device, Direction::Playback, false)?;
    {
        let hwp = HwParams::any(&pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_channels(2)?;
        hwp.set_format(Format::s16())?;
        hwp.set_rate_near(48_000, alsa::ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }
    Ok(pcm)
}
