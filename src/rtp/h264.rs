//! C5: H.264 RTP packetizer. Annex-B scan → RFC 6184 single-NALU / FU-A
//! fragmentation, SPS/PPS capture, and the video SDP fragment.
//!
//! Grounded on `janus/src/rtpv.c` (`us_rtpv_wrap`, `us_rtpv_make_sdp`),
//! the newer split-out H.264-only wrapper — the FU-A header layout and
//! the Annex-B scan are reproduced exactly.

use std::sync::Mutex;

use base64::Engine;
use bytes::Bytes;

use super::{build_datagram, video_pts_now, RtpStream, RTP_HEADER_SIZE, US_RTP_DATAGRAM_SIZE, PAYLOAD_TYPE_H264};
use crate::frame::Frame;

const NALU_TYPE_SPS: u8 = 7;
const NALU_TYPE_PPS: u8 = 8;
const FU_A_INDICATOR_TYPE: u8 = 28;
const MAX_FRAGMENT_PAYLOAD: usize = US_RTP_DATAGRAM_SIZE - RTP_HEADER_SIZE - 2;

/// Splits an Annex-B access unit into NALU byte ranges, trimming a
/// trailing `0x00` before the next start code as the upstream scanner does.
fn scan_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nalus = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let mut end = starts.get(idx + 1).map(|&next| next - 3).unwrap_or(data.len());
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            nalus.push(&data[start..end]);
        }
    }
    nalus
}

pub struct H264Packetizer {
    stream: RtpStream,
    sps_pps: Mutex<(Option<Vec<u8>>, Option<Vec<u8>>)>,
}

impl H264Packetizer {
    pub fn new() -> Self {
        Self {
            stream: RtpStream::new(PAYLOAD_TYPE_H264),
            sps_pps: Mutex::new((None, None)),
        }
    }

    /// Wraps one Annex-B access unit, invoking `emit` once per outbound
    /// datagram. `zero_playout_delay` is accepted for parity with the
    /// upstream signature; this crate applies no playout-delay extension
    /// by default (§6: "no extensions by default").
    pub fn wrap(&self, frame: &Frame, _zero_playout_delay: bool, mut emit: impl FnMut(Bytes)) {
        let nalus = scan_annexb(&frame.data);
        if nalus.is_empty() {
            return;
        }
        let pts = video_pts_now();
        let last_index = nalus.len() - 1;
        for (index, nalu) in nalus.into_iter().enumerate() {
            self.process_nalu(nalu, pts, index == last_index, &mut emit);
        }
    }

    fn process_nalu(&self, data: &[u8], pts: u32, marked: bool, emit: &mut impl FnMut(Bytes)) {
        if data.is_empty() {
            return;
        }
        let ref_idc = (data[0] >> 5) & 0x3;
        let nalu_type = data[0] & 0x1F;

        if nalu_type == NALU_TYPE_SPS {
            self.sps_pps.lock().unwrap().0 = Some(data.to_vec());
        } else if nalu_type == NALU_TYPE_PPS {
            self.sps_pps.lock().unwrap().1 = Some(data.to_vec());
        }

        if RTP_HEADER_SIZE + data.len() <= US_RTP_DATAGRAM_SIZE {
            let header = self.stream.write_header(pts, marked);
            emit(build_datagram(header, data));
            return;
        }

        let indicator = (ref_idc << 5) | FU_A_INDICATOR_TYPE;
        let mut offset = 1; // the NALU header byte is replaced by the FU-A indicator+header pair
        let body = &data[1..];
        let mut first = true;
        while offset - 1 < body.len() {
            let remaining = body.len() - (offset - 1);
            let chunk_len = remaining.min(MAX_FRAGMENT_PAYLOAD);
            let chunk = &body[offset - 1..offset - 1 + chunk_len];
            let is_last_fragment = offset - 1 + chunk_len >= body.len();

            let fu_header = nalu_type | (if first { 0x80 } else { 0 }) | (if is_last_fragment { 0x40 } else { 0 });
            let mut payload = Vec::with_capacity(2 + chunk.len());
            payload.push(indicator);
            payload.push(fu_header);
            payload.extend_from_slice(chunk);

            let header = self.stream.write_header(pts, marked && is_last_fragment);
            emit(build_datagram(header, &payload));

            offset += chunk_len;
            first = false;
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.stream.ssrc()
    }

    /// Produces the `m=video` SDP fragment. Returns `None` until both SPS
    /// and PPS have been observed (scenario 3, §8).
    pub fn make_sdp(&self, mid: &str) -> Option<String> {
        let (sps, pps) = self.sps_pps.lock().unwrap().clone();
        let (sps, pps) = (sps?, pps?);
        let engine = base64::engine::general_purpose::STANDARD;
        let sprop = format!("{},{}", engine.encode(sps), engine.encode(pps));

        Some(format!(
            "m=video 9 UDP/TLS/RTP/SAVPF {pt}\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=rtpmap:{pt} H264/90000\r\n\
             a=fmtp:{pt} profile-level-id=42E01F;packetization-mode=1;sprop-parameter-sets={sprop}\r\n\
             a=rtcp-fb:{pt} nack\r\n\
             a=rtcp-fb:{pt} nack pli\r\n\
             a=rtcp-fb:{pt} goog-remb\r\n\
             a=extmap:1 urn:3gpp:video-orientation\r\n\
             a=extmap:2 http://www.webrtc.org/experiments/rtp-hdrext/playout-delay\r\n\
             a=extmap:3 http://www.webrtc.org/experiments/rtp-hdrext/abs-capture-time\r\n\
             a=ssrc:{ssrc} cname:ustreamer\r\n\
             a=mid:{mid}\r\n\
             a=sendonly\r\n",
            pt = PAYLOAD_TYPE_H264,
            ssrc = self.ssrc(),
        ))
    }
}

/// Computes the `video_orientation` RTP extension value from a configured
/// rotation. 90 and 270 are swapped so the rotation reads counter-clockwise
/// for the viewer; 0 means "no extension" (returns `None`).
pub fn video_orientation_extension(video_orient: u32) -> Option<u32> {
    match video_orient {
        0 => None,
        90 => Some(270),
        270 => Some(90),
        other => Some(other),
    }
}
