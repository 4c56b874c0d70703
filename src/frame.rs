//! C1: the owned byte buffer + geometry/timing metadata shared by every
//! component that passes an access unit or a raw frame around.

/// FOURCC identifying the pixel/coding format. `H264` is the only format
/// the memsink reader accepts for ingest.
pub const FOURCC_H264: u32 = u32::from_le_bytes(*b"H264");

/// A grow-only byte buffer plus the metadata the memsink header carries
/// alongside it. Allocated once at component start and reused for the
/// process lifetime; `used` tracks the live prefix, `data` may be longer.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub stride: u32,
    pub online: bool,
    pub key: bool,
    pub gop: u32,
    pub grab_ts: f64,
    pub encode_begin_ts: f64,
    pub encode_end_ts: f64,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes actually in use. The frame is semantically absent when this is zero.
    pub fn used(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replaces the live contents, growing the backing allocation if needed
    /// but never shrinking it (grow-only reallocation per the memsink contract).
    pub fn set_data(&mut self, bytes: &[u8]) {
        self.data.clear();
        if self.data.capacity() < bytes.len() {
            self.data.reserve(bytes.len() - self.data.capacity());
        }
        self.data.extend_from_slice(bytes);
    }
}
