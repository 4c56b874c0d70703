//! C7/C8: audio capture-encode and decode-playback pipelines, plus the
//! PCM mixer that sits between playback and ALSA output.

pub mod capture;
pub mod mixer;
pub mod playback;

pub use capture::{AudioCapture, AudioCaptureConfig};
pub use playback::AudioPlayback;
