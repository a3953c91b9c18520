//! IUPAC 4-bit encoding and 2-bit packed-k-mer base codes.
//!
//! Bases are stored one 4-bit IUPAC code per byte (A=1, C=2, G=4, T=8, N=0,
//! ambiguity codes are the bitwise OR of their constituent bases). Packed
//! k-mers use 2 bits per base (A=0 C=1 G=2 T=3), little-endian within a
//! `u64`, so the k-th base occupies bits `2(k-1)..2k`.

use crate::error::{AlignError, Result};

pub const BASE_A: u8 = 1;
pub const BASE_C: u8 = 2;
pub const BASE_G: u8 = 4;
pub const BASE_T: u8 = 8;
pub const BASE_N: u8 = 0;

/// Table mapping an ASCII IUPAC byte to its 4-bit code. Unrecognized bytes
/// (whitespace, other punctuation) map to `N`.
const fn build_ascii_table() -> [u8; 256] {
    let mut t = [BASE_N; 256];
    t[b'A' as usize] = BASE_A;
    t[b'a' as usize] = BASE_A;
    t[b'C' as usize] = BASE_C;
    t[b'c' as usize] = BASE_C;
    t[b'G' as usize] = BASE_G;
    t[b'g' as usize] = BASE_G;
    t[b'T' as usize] = BASE_T;
    t[b't' as usize] = BASE_T;
    t[b'U' as usize] = BASE_T;
    t[b'u' as usize] = BASE_T;
    t[b'N' as usize] = BASE_N;
    t[b'n' as usize] = BASE_N;
    t[b'R' as usize] = BASE_A | BASE_G;
    t[b'r' as usize] = BASE_A | BASE_G;
    t[b'Y' as usize] = BASE_C | BASE_T;
    t[b'y' as usize] = BASE_C | BASE_T;
    t[b'S' as usize] = BASE_G | BASE_C;
    t[b's' as usize] = BASE_G | BASE_C;
    t[b'W' as usize] = BASE_A | BASE_T;
    t[b'w' as usize] = BASE_A | BASE_T;
    t[b'K' as usize] = BASE_G | BASE_T;
    t[b'k' as usize] = BASE_G | BASE_T;
    t[b'M' as usize] = BASE_A | BASE_C;
    t[b'm' as usize] = BASE_A | BASE_C;
    t[b'B' as usize] = BASE_C | BASE_G | BASE_T;
    t[b'b' as usize] = BASE_C | BASE_G | BASE_T;
    t[b'D' as usize] = BASE_A | BASE_G | BASE_T;
    t[b'd' as usize] = BASE_A | BASE_G | BASE_T;
    t[b'H' as usize] = BASE_A | BASE_C | BASE_T;
    t[b'h' as usize] = BASE_A | BASE_C | BASE_T;
    t[b'V' as usize] = BASE_A | BASE_C | BASE_G;
    t[b'v' as usize] = BASE_A | BASE_C | BASE_G;
    t
}

static ASCII_TO_4BIT: [u8; 256] = build_ascii_table();

/// Reverse mapping, for rendering a 4-bit code back to an ASCII IUPAC byte
/// (used by debug formatting and the GPA/SAM writers' sequence fields).
const fn build_4bit_table() -> [u8; 16] {
    let mut t = [b'N'; 16];
    t[BASE_A as usize] = b'A';
    t[BASE_C as usize] = b'C';
    t[BASE_G as usize] = b'G';
    t[BASE_T as usize] = b'T';
    t[(BASE_A | BASE_G) as usize] = b'R';
    t[(BASE_C | BASE_T) as usize] = b'Y';
    t[(BASE_G | BASE_C) as usize] = b'S';
    t[(BASE_A | BASE_T) as usize] = b'W';
    t[(BASE_G | BASE_T) as usize] = b'K';
    t[(BASE_A | BASE_C) as usize] = b'M';
    t[(BASE_C | BASE_G | BASE_T) as usize] = b'B';
    t[(BASE_A | BASE_G | BASE_T) as usize] = b'D';
    t[(BASE_A | BASE_C | BASE_T) as usize] = b'H';
    t[(BASE_A | BASE_C | BASE_G) as usize] = b'V';
    t
}

static FOUR_BIT_TO_ASCII: [u8; 16] = build_4bit_table();

#[inline]
pub fn encode_ascii(b: u8) -> u8 {
    ASCII_TO_4BIT[b as usize]
}

#[inline]
pub fn decode_4bit(code: u8) -> u8 {
    FOUR_BIT_TO_ASCII[(code & 0x0f) as usize]
}

/// Complements a 4-bit IUPAC code by reversing which of A/C/G/T are set.
#[inline]
pub fn complement_4bit(code: u8) -> u8 {
    let mut out = 0u8;
    if code & BASE_A != 0 {
        out |= BASE_T;
    }
    if code & BASE_T != 0 {
        out |= BASE_A;
    }
    if code & BASE_C != 0 {
        out |= BASE_G;
    }
    if code & BASE_G != 0 {
        out |= BASE_C;
    }
    out
}

/// Encodes an ASCII byte slice into 4-bit codes, one per output byte.
pub fn encode_ascii_seq(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|&b| encode_ascii(b)).collect()
}

/// The 2-bit (A=0 C=1 G=2 T=3) index for an *unambiguous* 4-bit code, or
/// `None` for `N`/multi-base IUPAC codes, which have no single index.
#[inline]
pub fn base2bit_index(code: u8) -> Option<usize> {
    match code {
        BASE_A => Some(0),
        BASE_C => Some(1),
        BASE_G => Some(2),
        BASE_T => Some(3),
        _ => None,
    }
}

/// Number of concrete bases an IUPAC 4-bit code expands to (its popcount).
#[inline]
pub fn popcount4(code: u8) -> u32 {
    (code & 0x0f).count_ones()
}

/// The concrete 2-bit (A=0 C=1 G=2 T=3) variants a 4-bit code expands to, in
/// ascending order, used by the k-mer enumerator's ambiguity-buffer
/// replication step.
pub fn variants2bit(code: u8) -> smallvec::SmallVec<[u8; 4]> {
    let mut out = smallvec::SmallVec::new();
    if code & BASE_A != 0 {
        out.push(0u8);
    }
    if code & BASE_C != 0 {
        out.push(1u8);
    }
    if code & BASE_G != 0 {
        out.push(2u8);
    }
    if code & BASE_T != 0 {
        out.push(3u8);
    }
    out
}

/// Validates that a requested k-mer length is in the supported range.
pub fn check_klen(k: u32) -> Result<()> {
    if !(4..=32).contains(&k) {
        Err(AlignError::InvalidArgs(format!(
            "k = {k} must be within 4..=32"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unambiguous_bases_round_trip_through_4bit() {
        for b in [b'A', b'C', b'G', b'T', b'a', b'c', b'g', b't'] {
            assert_eq!(decode_4bit(encode_ascii(b)), b.to_ascii_uppercase());
        }
    }

    proptest! {
        #[test]
        fn complement_is_an_involution(code in 0u8..16u8) {
            prop_assert_eq!(complement_4bit(complement_4bit(code)), code);
        }

        #[test]
        fn complement_preserves_popcount(code in 0u8..16u8) {
            prop_assert_eq!(popcount4(complement_4bit(code)), popcount4(code));
        }

        #[test]
        fn variants2bit_count_matches_popcount(code in 0u8..16u8) {
            prop_assert_eq!(variants2bit(code).len() as u32, popcount4(code));
        }
    }
}
