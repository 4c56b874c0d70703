//! uStreamer streaming dataplane: shared-memory H.264 intake, RTP
//! packetization for H.264 and OPUS, an audio capture/playback pipeline,
//! a per-session fan-out engine, and SDP generation. See `DESIGN.md` for
//! how each module grounds back to the upstream C implementation.

pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod logging;
pub mod memsink;
pub mod ring;
pub mod rtp;
pub mod sdp;
pub mod session;
pub mod util;

pub use config::Config;
pub use controller::Controller;
pub use gateway::{Gateway, GatewayError, LoggingGateway, PluginEvent, RtpOutPacket, SessionId};
