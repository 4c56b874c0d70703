//! Error taxonomy shared across the dataplane.
//!
//! Every component reports failures through one of these enums rather than
//! panicking. Dataplane threads never unwind across a ring boundary: on a
//! fatal error they set their `stop` flag and exit, matching the taxonomy
//! in the controller's own lifecycle.

use thiserror::Error;

/// Errors from the shared-memory frame intake (attach / wait_frame / get_frame).
#[derive(Error, Debug)]
pub enum MemsinkError {
    #[error("no new frame within the wait deadline")]
    NoData,

    #[error("shared memory io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("advisory lock could not be acquired: {0}")]
    Lock(std::io::Error),

    #[error("frame format is not H264 (fourcc {0:#x})")]
    NotH264(u32),

    #[error("unsupported memsink version {0} (expected 2)")]
    UnsupportedVersion(u32),

    #[error("bad magic number {0:#x}")]
    BadMagic(u64),

    #[error("unknown capacity suffix in sink name {0:?}")]
    UnknownCapacity(String),
}

/// Errors from `Ring<T>` acquire operations.
#[derive(Error, Debug)]
pub enum RingError {
    #[error("acquire timed out")]
    Timeout,
}

/// Errors from the audio capture/playback pipelines.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no encoded/decoded data available yet")]
    NoData,

    #[error("pipeline has stopped")]
    Stopped,

    #[error("alsa error: {0}")]
    Alsa(String),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("sample rate {0} out of range [8000, 192000]")]
    SampleRateOutOfRange(u32),
}

/// Protocol-level rejects that are dropped with a rate-limited warning, never fatal.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("packet shorter than the RTP header")]
    ShortPacket,

    #[error("unexpected payload type {0}")]
    WrongPayloadType(u8),

    #[error("packet marked video on an audio-only path")]
    UnexpectedVideo,

    #[error("playback channel is muted")]
    PlaybackMuted,
}

/// Configuration errors: missing keys or invalid values. Fatal to controller init.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required configuration key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Errors surfaced by the client session / controller lifecycle.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("gateway call failed: {0}")]
    Gateway(String),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memsink(#[from] MemsinkError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("gateway call failed: {0}")]
    Gateway(String),

    #[error("no session {0}")]
    UnknownSession(u64),
}
