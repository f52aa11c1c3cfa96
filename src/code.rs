//! Verification code generation and comparison.
//!
//! Codes are six ASCII digits in `100000..=999999`, drawn from the operating
//! system CSPRNG by rejection sampling a 20-bit value, so every code in the
//! range is equally likely.

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

const CODE_SPAN: u32 = CODE_MAX - CODE_MIN + 1;
const DRAW_MASK: u32 = (1 << 20) - 1;

pub fn generate_code() -> String {
    generate_code_with(&mut OsRng)
}

pub fn generate_code_with<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    loop {
        let draw = rng.next_u32() & DRAW_MASK;
        if draw < CODE_SPAN {
            return (CODE_MIN + draw).to_string();
        }
    }
}

/// Trims both sides and compares in constant time.
pub fn codes_match(stored: &str, candidate: &str) -> bool {
    constant_time_eq(stored.trim().as_bytes(), candidate.trim().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
