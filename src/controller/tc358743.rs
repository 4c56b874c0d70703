//! HDMI audio-presence and sampling-rate probe for the TC358743
//! HDMI-to-CSI bridge, read through two vendor `VIDIOC_G_CTRL` ioctls.
//!
//! Grounded on `janus/src/tc358743.c::us_tc358743_read_info`; the control
//! IDs are the upstream driver's vendor-extension constants, not part of
//! the `v4l` crate's typed control set, so this goes through `nix`'s raw
//! `ioctl_readwrite!` escape hatch the way the pack's V4L2 consumers do
//! for anything outside the standard control classes.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::ioctl_readwrite;

const V4L2_CTRL_CLASS_USER: u32 = 0x0098_0000;
const V4L2_CID_USER_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
const V4L2_CID_USER_TC358743_BASE: u32 = V4L2_CID_USER_BASE + 0x1080;
const TC358743_CID_AUDIO_SAMPLING_RATE: u32 = V4L2_CID_USER_TC358743_BASE;
const TC358743_CID_AUDIO_PRESENT: u32 = V4L2_CID_USER_TC358743_BASE + 1;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

ioctl_readwrite!(vidioc_g_ctrl, b'V', 27, V4l2Control);

#[derive(Debug, Clone, Copy, Default)]
pub struct Tc358743Info {
    pub has_audio: bool,
    pub audio_hz: u32,
}

/// Opens `path` and reads both vendor controls. Any ioctl or open failure
/// is treated as "the HDMI audio probe is unavailable" by the caller —
/// non-fatal, since TC358743 audio detection is a refinement over the
/// configured sampling rate, not a requirement for capture to proceed.
pub fn read_info(path: &Path) -> std::io::Result<Tc358743Info> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let fd = file.as_raw_fd();

    let has_audio = read_control(fd, TC358743_CID_AUDIO_PRESENT)?;
    let audio_hz = read_control(fd, TC358743_CID_AUDIO_SAMPLING_RATE)?;

    Ok(Tc358743Info {
        has_audio: has_audio != 0,
        audio_hz: audio_hz.max(0) as u32,
    })
}

fn read_control(fd: std::os::unix::io::RawFd, cid: u32) -> std::io::Result<i32> {
    let mut control = V4l2Control { id: cid, value: 0 };
    unsafe { vidioc_g_ctrl(fd, &mut control) }.map_err(std::io::Error::from)?;
    Ok(control.value)
}
