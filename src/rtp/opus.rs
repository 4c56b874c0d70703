//! C6: OPUS RTP packetizer. Single-packet payloading, no fragmentation,
//! plus the audio SDP fragment.
//!
//! Grounded on `janus/src/rtpa.c` (`us_rtpa_wrap`, `us_rtpa_make_sdp`).

use bytes::Bytes;

use super::{build_datagram, RtpStream, RTP_HEADER_SIZE, US_RTP_DATAGRAM_SIZE, PAYLOAD_TYPE_OPUS};

pub struct OpusPacketizer {
    stream: RtpStream,
}

impl OpusPacketizer {
    pub fn new() -> Self {
        Self {
            stream: RtpStream::new(PAYLOAD_TYPE_OPUS),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.stream.ssrc()
    }

    /// Wraps one encoded OPUS frame (`pts_units` already in 48 kHz units).
    /// Marker is always false per §4.5. Returns `None` when the payload
    /// would overflow the 1200-byte datagram cap.
    pub fn wrap(&self, payload: &[u8], pts_units: u32) -> Option<Bytes> {
        if RTP_HEADER_SIZE + payload.len() > US_RTP_DATAGRAM_SIZE {
            return None;
        }
        let header = self.stream.write_header(pts_units, false);
        Some(build_datagram(header, payload))
    }

    /// Produces the `m=audio` SDP fragment. `bidirectional` enables
    /// `sendrecv` (return channel enabled) instead of `sendonly`.
    pub fn make_sdp(&self, mid: &str, bidirectional: bool) -> String {
        let direction = if bidirectional { "sendrecv" } else { "sendonly" };
        format!(
            "m=audio 9 UDP/TLS/RTP/SAVPF {pt}\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=rtpmap:{pt} OPUS/48000/2\r\n\
             a=fmtp:{pt} sprop-stereo=1\r\n\
             a=rtcp-fb:{pt} nack\r\n\
             a=rtcp-fb:{pt} nack pli\r\n\
             a=rtcp-fb:{pt} goog-remb\r\n\
             a=ssrc:{ssrc} cname:ustreamer\r\n\
             a=mid:{mid}\r\n\
             a={direction}\r\n",
            pt = PAYLOAD_TYPE_OPUS,
            ssrc = self.ssrc(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_placed_verbatim_after_header() {
        let packetizer = OpusPacketizer::new();
        let payload = vec![1, 2, 3, 4, 5];
        let datagram = packetizer.wrap(&payload, 960).unwrap();
        assert_eq!(&datagram[RTP_HEADER_SIZE..], &payload[..]);
        assert_eq!(datagram[1] & 0x80, 0); // marker always false
        assert_eq!(datagram[1] & 0x7F, PAYLOAD_TYPE_OPUS);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let packetizer = OpusPacketizer::new();
        let payload = vec![0u8; US_RTP_DATAGRAM_SIZE];
        assert!(packetizer.wrap(&payload, 0).is_none());
    }

    #[test]
    fn sdp_direction_follows_bidirectional_flag() {
        let packetizer = OpusPacketizer::new();
        assert!(packetizer.make_sdp("a", false).contains("sendonly"));
        assert!(packetizer.make_sdp("a", true).contains("sendrecv"));
    }
}
