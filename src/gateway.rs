//! The signalling gateway boundary: the host process that owns session
//! lifecycle callbacks and actually puts packets on the wire. Out of
//! scope per the crate's purpose, narrowed here to the trait this crate
//! calls into.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::rtp::h264::video_orientation_extension;

pub type SessionId = u64;

/// Matches the gateway's `relay_rtp` extension fields: `video_rotation`
/// carries the post-swap `video_orientation` value, `min_delay`/
/// `max_delay` are left `None` since this crate applies no
/// playout-delay extension by default.
pub struct RtpExtensions {
    pub min_delay: Option<u32>,
    pub max_delay: Option<u32>,
    pub video_rotation: Option<u32>,
}

impl RtpExtensions {
    pub fn for_video(video_orient: u32) -> Self {
        Self {
            min_delay: None,
            max_delay: None,
            video_rotation: video_orientation_extension(video_orient),
        }
    }

    pub fn none() -> Self {
        Self {
            min_delay: None,
            max_delay: None,
            video_rotation: None,
        }
    }
}

pub struct RtpOutPacket {
    pub video: bool,
    pub buffer: bytes::Bytes,
    pub mindex: u32,
    pub extensions: RtpExtensions,
}

#[derive(Debug, Clone)]
pub struct PluginEvent {
    pub status: Option<String>,
    pub error_code: Option<u32>,
    pub error: Option<String>,
    pub jsep: Option<Value>,
}

impl PluginEvent {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            error_code: None,
            error: None,
            jsep: None,
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            status: None,
            error_code: Some(code),
            error: Some(message.into()),
            jsep: None,
        }
    }

    pub fn with_jsep(mut self, jsep: Value) -> Self {
        self.jsep = Some(jsep);
        self
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway rejected relay_rtp: {0}")]
    Relay(String),

    #[error("gateway rejected push_event: {0}")]
    Push(String),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn relay_rtp(&self, session: SessionId, packet: RtpOutPacket) -> Result<(), GatewayError>;
    async fn push_event(
        &self,
        session: SessionId,
        transaction: &str,
        event: PluginEvent,
    ) -> Result<(), GatewayError>;
}

/// A minimal standalone `Gateway` that logs every call instead of relaying
/// to a real signalling host. This crate builds the dataplane as a
/// library the signalling gateway embeds; the binary entry point has no
/// such host to attach to, so it runs against this logger to exercise the
/// full lifecycle (memsink intake, audio pipelines, session fan-out) on
/// its own.
pub struct LoggingGateway;

#[async_trait]
impl Gateway for LoggingGateway {
    async fn relay_rtp(&self, session: SessionId, packet: RtpOutPacket) -> Result<(), GatewayError> {
        tracing::trace!(session, video = packet.video, mindex = packet.mindex, bytes = packet.buffer.len(), "relay_rtp");
        Ok(())
    }

    async fn push_event(
        &self,
        session: SessionId,
        transaction: &str,
        event: PluginEvent,
    ) -> Result<(), GatewayError> {
        tracing::info!(session, transaction, status = ?event.status, error = ?event.error, "push_event");
        Ok(())
    }
}
