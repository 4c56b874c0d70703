//! C11: common utilities — monotonic time and aligned size helpers shared
//! across the dataplane. `flock`-with-timeout lives next to its one
//! caller in `memsink`; everything else that multiple components need
//! sits here.

use once_cell::sync::Lazy;
use std::time::Instant;

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic seconds since process start, as a binary64 — matches the unit
/// the memsink header stores `grab_ts` / `encode_begin_ts` / etc. in.
pub fn monotonic_now() -> f64 {
    PROCESS_START.elapsed().as_secs_f64()
}

/// Monotonic nanoseconds since process start, used for RTP's 90 kHz H.264
/// clock: `pts = now_monotonic_ns * 9 / 100_000`.
pub fn monotonic_now_nanos() -> u64 {
    PROCESS_START.elapsed().as_nanos() as u64
}

/// `now_id` used for SDP `o=` session ids: a monotonic nanosecond counter
/// right-shifted by one bit so it fits a signed 63-bit field.
pub fn now_id() -> u64 {
    monotonic_now_nanos() >> 1
}
