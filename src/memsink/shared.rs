//! Wire layout of the memsink shared region, ported from
//! `src/libs/memsinksh.h`.

use crate::error::MemsinkError;

pub const MEMSINK_MAGIC: u64 = 0xCAFE_BABE_CAFE_BABE;
pub const MEMSINK_VERSION: u32 = 2;

pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();

/// Raw header layout, little-endian, native alignment — matches the C
/// `memsink_shared_s` struct up to (and excluding) `data[]`. Field order
/// follows the documented layout exactly: `gop` immediately after `key`,
/// the three capture/encode timestamps, `last_client_ts`, and finally
/// `key_requested` right before `data[]` — a spec-conforming writer lays
/// the region out in this order, so the reader must match it byte for
/// byte.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub magic: u64,
    pub version: u32,
    pub id: u64,
    pub used: u64,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub stride: u32,
    pub online: u8,
    pub key: u8,
    pub _pad: [u8; 2],
    pub gop: u32,
    pub grab_ts: f64,
    pub encode_begin_ts: f64,
    pub encode_end_ts: f64,
    pub last_client_ts: f64,
    pub key_requested: u8,
    pub _pad_tail: [u8; 7],
}

impl Header {
    pub fn check_magic_and_version(&self) -> Result<(), MemsinkError> {
        if self.magic != MEMSINK_MAGIC {
            return Err(MemsinkError::BadMagic(self.magic));
        }
        if self.version != MEMSINK_VERSION {
            return Err(MemsinkError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Capacity, in bytes, of the trailing `data[]` region — derived from the
/// `:`- or `.`-delimited suffix of the sink object name, per §6.
pub fn capacity_for_name(name: &str) -> Result<usize, MemsinkError> {
    let suffix = name
        .rsplit(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(name);
    match suffix {
        "jpeg" => Ok(4 * 1024 * 1024),
        "h264" => Ok(2 * 1024 * 1024),
        "raw" => Ok(1920 * 1200 * 3),
        _ => Err(MemsinkError::UnknownCapacity(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_lookup_matches_known_suffixes() {
        assert_eq!(capacity_for_name("ustreamer::h264").unwrap(), 2 * 1024 * 1024);
        assert_eq!(capacity_for_name("ustreamer::jpeg").unwrap(), 4 * 1024 * 1024);
        assert_eq!(capacity_for_name("ustreamer::raw").unwrap(), 1920 * 1200 * 3);
    }

    #[test]
    fn dotted_suffix_is_also_accepted() {
        assert_eq!(capacity_for_name("ustreamer.h264").unwrap(), 2 * 1024 * 1024);
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        assert!(capacity_for_name("ustreamer::potato").is_err());
    }
}
