//! Audio playback mixing — supplements the dataplane spec, which names a
//! mixer between the per-session `aplay_pcm_ring`s and ALSA playback
//! without specifying the algorithm. Ported from `janus/src/au.c`'s
//! `us_au_pcm_mix`: a perceptually-linear loudness blend of two 16-bit
//! PCM buffers, generalized here to fold across however many sessions are
//! actively playing back (the original only ever mixes two streams
//! because its caller is pairwise; folding left-to-right is
//! behavior-equivalent for two streams and a natural extension for more).

/// Mixes `src` into `dest` in place, following the perceptual blend used
/// upstream. If `dest` is empty, `src` is copied in. Mismatched frame
/// counts are a no-op (the upstream mixer only combines equal-length
/// buffers).
pub fn mix_into(dest: &mut Vec<i16>, src: &[i16]) {
    if src.is_empty() {
        return;
    }
    if dest.is_empty() {
        dest.extend_from_slice(src);
        return;
    }
    if dest.len() != src.len() {
        return;
    }
    for (d, &s) in dest.iter_mut().zip(src.iter()) {
        *d = mix_sample(*d, s);
    }
}

/// Folds an arbitrary number of PCM buffers into one mix, in order.
pub fn mix_all<'a>(buffers: impl IntoIterator<Item = &'a [i16]>) -> Vec<i16> {
    let mut out = Vec::new();
    for buffer in buffers {
        mix_into(&mut out, buffer);
    }
    out
}

fn mix_sample(dest: i16, src: i16) -> i16 {
    let a = dest as i32 + 32768;
    let b = src as i32 + 32768;
    let mut m = if a < 32768 && b < 32768 {
        a * b / 32768
    } else {
        2 * (a + b) - (a * b) / 32768 - 65536
    };
    if m == 65536 {
        m = 65535;
    }
    (m - 32768) as i16
}
