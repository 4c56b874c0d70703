//! ALSA device-name parsing used to decide whether capture is actually
//! available before committing to `AudioCapture::start`.
//!
//! Grounded on `janus/src/au.c::us_au_probe`: the device string is
//! something like `hw:0,0`, `hw:tc358743,0` or `plughw:UAC2Gadget,0`; the
//! card token between `:` and `,` is checked against `/proc/asound/` —
//! numeric tokens map to a `cardN` directory, named tokens to a symlink.

use std::path::Path;

/// Returns whether `device`'s card component exists under `/proc/asound/`.
pub fn probe(device: &str) -> bool {
    probe_against(device, Path::new("/proc/asound"))
}

fn probe_against(device: &str, asound_dir: &Path) -> bool {
    if device.contains('/') || device.contains('.') {
        return false;
    }
    let Some(after_colon) = device.split_once(':').map(|(_, rest)| rest) else {
        return false;
    };
    if after_colon.is_empty() {
        return false;
    }
    let Some((card, _)) = after_colon.split_once(',') else {
        return false;
    };
    if card.is_empty() {
        return false;
    }

    let numeric = card.chars().all(|c| c.is_ascii_digit());
    let path = if numeric {
        asound_dir.join(format!("card{card}"))
    } else {
        asound_dir.join(card)
    };

    let Ok(meta) = std::fs::symlink_metadata(&path) else {
        return false;
    };
    if numeric {
        meta.is_dir()
    } else {
        meta.file_type().is_symlink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn rejects_malformed_device_strings() {
        assert!(!probe_against("nodevice", Path::new("/proc/asound")));
        assert!(!probe_against("hw:", Path::new("/proc/asound")));
        assert!(!probe_against("hw:0", Path::new("/proc/asound")));
        assert!(!probe_against("../evil:0,0", Path::new("/proc/asound")));
    }

    #[test]
    fn numeric_card_requires_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("card0")).unwrap();
        assert!(probe_against("hw:0,0", dir.path()));
        assert!(!probe_against("hw:1,0", dir.path()));
    }

    #[test]
    fn named_card_requires_a_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("card0");
        std::fs::create_dir(&target).unwrap();
        symlink(&target, dir.path().join("tc358743")).unwrap();
        assert!(probe_against("hw:tc358743,0", dir.path()));
        assert!(!probe_against("hw:other,0", dir.path()));
    }
}
