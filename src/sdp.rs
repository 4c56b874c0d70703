//! C4.10: SDP offer generation. Combines the H.264 and OPUS m-section
//! fragments from `rtp::h264` / `rtp::opus` into one offer blob.
//!
//! Grounded on `janus/src/sdp.c::us_sdp_create`: the `o=` line's session id
//! is `now_id() >> 1`, and on Janus plugin API >= 1.0 the video m-section
//! precedes the audio one so stream indices stay stable whether or not
//! audio is available. This crate only targets that >= 1.0 layout (the
//! pre-1.0 audio-first ordering is not carried forward).

use crate::rtp::h264::H264Packetizer;
use crate::rtp::opus::OpusPacketizer;
use crate::util::now_id;

/// Builds a full SDP offer. Returns `None` until the video packetizer has
/// observed both SPS and PPS (scenario 3, spec.md §8) — mirrors
/// `us_rtp_make_sdp` returning `NULL` and the controller surfacing that as
/// a `503` error rather than advertising an incomplete video section.
pub fn create_offer(rtpv: &H264Packetizer, rtpa: Option<(&OpusPacketizer, bool)>) -> Option<String> {
    let video_sdp = rtpv.make_sdp("v")?;
    let audio_sdp = rtpa
        .map(|(packetizer, bidirectional)| packetizer.make_sdp("a", bidirectional))
        .unwrap_or_default();

    Some(format!(
        "v=0\r\n\
         o=- {id} 1 IN IP4 0.0.0.0\r\n\
         s=PiKVM uStreamer\r\n\
         t=0 0\r\n\
         {video_sdp}{audio_sdp}",
        id = now_id(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn annexb(nalus: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nalu in nalus {
            out.extend_from_slice(&[0, 0, 1]);
            out.extend_from_slice(nalu);
        }
        out
    }

    #[test]
    fn offer_is_none_before_sps_pps() {
        let rtpv = H264Packetizer::new();
        assert!(create_offer(&rtpv, None).is_none());
    }

    #[test]
    fn offer_contains_video_before_audio() {
        let rtpv = H264Packetizer::new();
        let mut frame = Frame::new();
        frame.set_data(&annexb(&[&[0x67, 1, 2, 3]]));
        rtpv.wrap(&frame, false, |_| {});
        frame.set_data(&annexb(&[&[0x68, 4, 5]]));
        rtpv.wrap(&frame, false, |_| {});

        let rtpa = OpusPacketizer::new();
        let offer = create_offer(&rtpv, Some((&rtpa, false))).unwrap();

        assert!(offer.starts_with("v=0\r\n"));
        assert!(offer.contains("s=PiKVM uStreamer\r\n"));
        let video_pos = offer.find("m=video").unwrap();
        let audio_pos = offer.find("m=audio").unwrap();
        assert!(video_pos < audio_pos);
    }

    #[test]
    fn offer_omits_audio_section_when_absent() {
        let rtpv = H264Packetizer::new();
        let mut frame = Frame::new();
        frame.set_data(&annexb(&[&[0x67, 1, 2, 3]]));
        rtpv.wrap(&frame, false, |_| {});
        frame.set_data(&annexb(&[&[0x68, 4, 5]]));
        rtpv.wrap(&frame, false, |_| {});

        let offer = create_offer(&rtpv, None).unwrap();
        assert!(offer.contains("m=video"));
        assert!(!offer.contains("m=audio"));
    }
}
