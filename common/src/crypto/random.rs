/// Cryptographically secure randomness for the mixing path.
///
/// This module provides the only randomness primitives the mixer is allowed
/// to use when shuffling routes, jittering amounts, or picking delays.
/// Every function here is backed by the operating system's
/// CSPRNG (`OsRng`), never `rand::thread_rng()`.
///
/// SECURITY: a thread_rng()-seeded route would let an observer with enough
/// samples correlate source and destination wallets across hops.
use rand::rngs::OsRng;
use rand::RngCore;

/// Generate cryptographically secure random bytes.
pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a cryptographically secure random `u64`.
pub fn secure_random_u64() -> u64 {
    OsRng.next_u64()
}

/// Generate a cryptographically secure random `u32`.
pub fn secure_random_u32() -> u32 {
    OsRng.next_u32()
}

/// A uniform `f64` in `[0.0, 1.0)` derived from a 32-bit CSPRNG sample.
fn uniform_unit() -> f64 {
    secure_random_u32() as f64 / (u32::MAX as f64 + 1.0)
}

/// Pick a millisecond delay uniformly in `[min, max)`. Returns `min` unchanged when `max <= min`.
pub fn random_delay_ms(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    let span = (max - min) as f64;
    min + (uniform_unit() * span) as u64
}

/// Jitter `base` by a random ±0.1%-1.0% factor (`jitter(x)`).
///
/// `u` is drawn uniformly from `[0.001, 0.01)` and the sign is chosen by a
/// uniform bit, so the result is `±floor(base * u)`.
pub fn amount_jitter(base: u64) -> i64 {
    let u = 0.001 + uniform_unit() * (0.01 - 0.001);
    let magnitude = (base as f64 * u).floor() as i64;
    if secure_random_u32() % 2 == 0 {
        magnitude
    } else {
        -magnitude
    }
}

/// Fisher-Yates shuffle using CSPRNG-derived uniform indices. In place, so callers can shuffle
/// a `Vec<MixingRoute>` without an extra allocation.
pub fn crypto_shuffle<T>(items: &mut [T]) {
    if items.len() < 2 {
        return;
    }
    for i in (1..items.len()).rev() {
        let j = (secure_random_u32() as usize) % (i + 1);
        items.swap(i, j);
    }
}
