//! C9: client session. Per-session outbound rings, the three fan-out
//! threads, transmit flags, and the state machine driven by gateway
//! callbacks.
//!
//! Grounded on `janus/src/client.c`: `video_ring` (2048) / `acap_ring`
//! (64) with a shared `_video_or_acap_thread` pattern, nonblocking
//! producer acquire with a logged drop on overflow, and the playback
//! decode pipeline delegated to `AudioPlayback`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

use crate::audio::AudioPlayback;
use crate::error::SessionError;
use crate::gateway::{Gateway, RtpExtensions, RtpOutPacket, SessionId};
use crate::ring::Ring;

const VIDEO_RING_CAPACITY: usize = 2048;
const ACAP_RING_CAPACITY: usize = 64;
const FANOUT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Ready,
    Transmitting,
    Muted,
    HungUp,
    Destroyed,
}

#[derive(Default, Clone)]
struct RingSlot {
    data: Option<Bytes>,
}

pub struct Session {
    id: SessionId,
    state: std::sync::Mutex<SessionState>,
    transmit: Arc<AtomicBool>,
    transmit_acap: Arc<AtomicBool>,
    video_orient: Arc<AtomicU32>,
    stop: Arc<AtomicBool>,
    video_ring: Arc<Ring<RingSlot>>,
    acap_ring: Arc<Ring<RingSlot>>,
    pub playback: AudioPlayback,
    video_thread: Option<JoinHandle<()>>,
    acap_thread: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(id: SessionId, gateway: Arc<dyn Gateway>) -> Result<Self, SessionError> {
        let playback = AudioPlayback::start().map_err(|e| SessionError::Gateway(e.to_string()))?;

        let video_ring = Arc::new(Ring::new(VIDEO_RING_CAPACITY, RingSlot::default));
        let acap_ring = Arc::new(Ring::new(ACAP_RING_CAPACITY, RingSlot::default));
        let transmit = Arc::new(AtomicBool::new(false));
        let transmit_acap = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let video_orient = Arc::new(AtomicU32::new(0));

        let video_thread = {
            let ring = Arc::clone(&video_ring);
            let gateway = Arc::clone(&gateway);
            let transmit = Arc::clone(&transmit);
            let stop = Arc::clone(&stop);
            let video_orient_for_thread = Arc::clone(&video_orient);
            std::thread::spawn(move || {
                fanout_loop(id, ring, gateway, transmit, None, stop, 0, video_orient_for_thread)
            })
        };

        let acap_thread = {
            let ring = Arc::clone(&acap_ring);
            let gateway = Arc::clone(&gateway);
            let transmit = Arc::clone(&transmit);
            let transmit_acap = Arc::clone(&transmit_acap);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                fanout_loop(
                    id,
                    ring,
                    gateway,
                    transmit,
                    Some(transmit_acap),
                    stop,
                    1,
                    Arc::new(AtomicU32::new(0)),
                )
            })
        };

        Ok(Self {
            id,
            state: std::sync::Mutex::new(SessionState::New),
            transmit,
            transmit_acap,
            video_orient,
            stop,
            video_ring,
            acap_ring,
            playback,
            video_thread: Some(video_thread),
            acap_thread: Some(acap_thread),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmit.load(Ordering::Relaxed)
    }

    pub fn video_orient(&self) -> u32 {
        self.video_orient.load(Ordering::Relaxed)
    }

    pub fn set_video_orient(&self, orient: u32) {
        self.video_orient.store(orient, Ordering::Relaxed);
    }

    pub fn setup_media(&self) {
        self.transmit.store(true, Ordering::Relaxed);
        *self.state.lock().unwrap() = SessionState::Transmitting;
    }

    pub fn hangup_media(&self) {
        self.transmit.store(false, Ordering::Relaxed);
        *self.state.lock().unwrap() = SessionState::HungUp;
    }

    pub fn set_transmit_acap(&self, enabled: bool) {
        self.transmit_acap.store(enabled, Ordering::Relaxed);
    }

    pub fn set_transmit_aplay(&self, enabled: bool) {
        self.playback.set_transmit_aplay(enabled);
    }

    /// Enqueues a video datagram for fan-out; drops (with a logged
    /// warning) if the session's video fan-out can't keep up, never
    /// blocking the memsink thread (§5 back-pressure policy).
    pub fn push_video(&self, packet: Bytes) {
        match self.video_ring.producer_acquire(Duration::ZERO) {
            Ok(mut slot) => {
                slot.data = Some(packet);
                self.video_ring.producer_release(slot);
            }
            Err(_) => warn!(session = self.id, "video ring is full"),
        }
    }

    pub fn push_acap(&self, packet: Bytes) {
        match self.acap_ring.producer_acquire(Duration::ZERO) {
            Ok(mut slot) => {
                slot.data = Some(packet);
                self.acap_ring.producer_release(slot);
            }
            Err(_) => warn!(session = self.id, "acap ring is full"),
        }
    }

    /// Routes an inbound RTP datagram from the gateway to the playback
    /// pipeline. Rejections are logged by the caller, not here, to keep
    /// this a pure forwarding call.
    pub fn recv_rtp(&self, video: bool, data: &[u8]) -> Result<(), crate::error::ProtocolError> {
        self.playback.recv(video, data)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        *self.state.lock().unwrap() = SessionState::Destroyed;
        if let Some(handle) = self.video_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.acap_thread.take() {
            let _ = handle.join();
        }
        self.playback.stop();
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[allow(clippy::too_many_arguments)]
fn fanout_loop(
    session: SessionId,
    ring: Arc<Ring<RingSlot>>,
    gateway: Arc<dyn Gateway>,
    transmit: Arc<AtomicBool>,
    transmit_gate: Option<Arc<AtomicBool>>,
    stop: Arc<AtomicBool>,
    mindex: u32,
    video_orient: Arc<AtomicU32>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(session, error = %e, "fan-out thread: can't build tokio runtime");
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        let slot = match ring.consumer_acquire(FANOUT_POLL_TIMEOUT) {
            Ok(slot) => slot,
            Err(_) => continue,
        };

        let should_send = transmit.load(Ordering::Relaxed)
            && transmit_gate.as_ref().map(|g| g.load(Ordering::Relaxed)).unwrap_or(true);
        let payload = slot.data.clone();
        ring.consumer_release(slot);

        if !should_send {
            continue;
        }
        let Some(buffer) = payload else { continue };

        let extensions = if mindex == 0 {
            RtpExtensions::for_video(video_orient.load(Ordering::Relaxed))
        } else {
            RtpExtensions::none()
        };
        let packet = RtpOutPacket {
            video: mindex == 0,
            buffer,
            mindex,
            extensions,
        };
        if let Err(e) = runtime.block_on(gateway.relay_rtp(session, packet)) {
            warn!(session, error = %e, "relay_rtp failed");
        }
    }
}
