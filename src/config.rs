//! Configuration object: `video.sink` / `acap.*` / `aplay.*`.
//!
//! Mirrors the key set read by the upstream jcfg parser (`video.sink` is
//! required; `acap.device` enables capture; `aplay.device`+`aplay.check`
//! gates playback on a sentinel file's presence).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_sampling_rate() -> u32 {
    48_000
}

fn default_opus_bitrate_bps() -> u32 {
    // Newer upstream code path (acap.c) uses 128 kb/s; an older path (audio.c)
    // used 48 kb/s. Exposed here rather than hard-coded.
    128_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Shared-memory object name the H.264 producer writes to.
    pub sink: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcapConfig {
    /// ALSA capture device string, e.g. "hw:0,0". Absent disables capture.
    pub device: Option<String>,
    /// V4L2 device node used to query TC358743 HDMI audio presence.
    pub tc358743: Option<PathBuf>,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
    #[serde(default = "default_opus_bitrate_bps")]
    pub opus_bitrate_bps: u32,
}

impl Default for AcapConfig {
    fn default() -> Self {
        Self {
            device: None,
            tc358743: None,
            sampling_rate: default_sampling_rate(),
            opus_bitrate_bps: default_opus_bitrate_bps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AplayConfig {
    /// ALSA playback device string.
    pub device: Option<String>,
    /// Sentinel file whose absence disables playback even if `device` is set.
    pub check: Option<PathBuf>,
}

impl Default for AplayConfig {
    fn default() -> Self {
        Self {
            device: None,
            check: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    #[serde(default)]
    pub acap: AcapConfig,
    #[serde(default)]
    pub aplay: AplayConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video.sink.trim().is_empty() {
            return Err(ConfigError::MissingKey("video.sink"));
        }
        if self.acap.tc358743.is_some() && self.acap.device.is_none() {
            return Err(ConfigError::Invalid {
                key: "acap.tc358743",
                reason: "requires acap.device to be set".into(),
            });
        }
        if !(8_000..=192_000).contains(&self.acap.sampling_rate) {
            return Err(ConfigError::Invalid {
                key: "acap.sampling_rate",
                reason: format!("{} is outside [8000, 192000]", self.acap.sampling_rate),
            });
        }
        Ok(())
    }

    /// Playback is only enabled when both a device and an existing check file are set,
    /// matching the upstream rule that an absent check file disables aplay outright.
    pub fn aplay_enabled(&self) -> bool {
        match (&self.aplay.device, &self.aplay.check) {
            (Some(_), Some(check)) => check.exists(),
            _ => false,
        }
    }

    pub fn acap_enabled(&self) -> bool {
        self.acap.device.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sink_is_rejected() {
        let config = Config {
            video: VideoConfig { sink: String::new() },
            acap: AcapConfig::default(),
            aplay: AplayConfig::default(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingKey("video.sink"))));
    }

    #[test]
    fn tc358743_requires_device() {
        let config = Config {
            video: VideoConfig { sink: "ustreamer::h264".into() },
            acap: AcapConfig {
                device: None,
                tc358743: Some(PathBuf::from("/dev/video0")),
                ..AcapConfig::default()
            },
            aplay: AplayConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sampling_rate_out_of_range_is_rejected() {
        let config = Config {
            video: VideoConfig { sink: "ustreamer::h264".into() },
            acap: AcapConfig {
                sampling_rate: 1000,
                ..AcapConfig::default()
            },
            aplay: AplayConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn aplay_disabled_without_check_file() {
        let config = Config {
            video: VideoConfig { sink: "ustreamer::h264".into() },
            acap: AcapConfig::default(),
            aplay: AplayConfig {
                device: Some("hw:0,0".into()),
                check: Some(PathBuf::from("/nonexistent/path/for/test")),
            },
        };
        assert!(!config.aplay_enabled());
    }

    #[test]
    fn roundtrip_toml() {
        let toml_text = r#"
            [video]
            sink = "ustreamer::h264"

            [acap]
            device = "hw:0,0"
            sampling_rate = 44100
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.video.sink, "ustreamer::h264");
        assert_eq!(config.acap.sampling_rate, 44100);
        assert_eq!(config.acap.opus_bitrate_bps, 128_000);
    }
}
