//! Bit-vector packing helpers.
//!
//! All multi-bit fields travel most-significant-bit first on the wire, and
//! every helper here follows that ordering. The byte start sequence (BSS) is
//! the two-bit dominant/recessive pattern transmitted ahead of each byte.

use crate::error::{Error, Result};
use crate::level::Level;

/// Two-cell byte start sequence, in wire order.
pub const BSS: [bool; 2] = [Level::Dominant.bit(), Level::Recessive.bit()];

/// Number of wire cells per byte once the BSS is attached.
pub const CELLS_PER_BYTE: usize = 10;

/// Expand `value` into its `count` low bits, most significant first.
///
/// # Panics
/// If `count` exceeds 32.
#[must_use]
pub fn to_bits(value: u32, count: usize) -> Vec<bool> {
    assert!(count <= 32, "bit count {count} exceeds u32 width");
    (0..count)
        .map(|i| (value >> (count - 1 - i)) & 1 == 1)
        .collect()
}

/// Read `count` bits starting at `start`, most significant first.
///
/// # Errors
/// [Error::NotEnoughBits] if the requested range runs past the end of `bits`.
///
/// # Panics
/// If `count` exceeds 32.
pub fn from_bits(bits: &[bool], start: usize, count: usize) -> Result<u32> {
    assert!(count <= 32, "bit count {count} exceeds u32 width");
    let needed = start + count;
    if needed > bits.len() {
        return Err(Error::NotEnoughBits {
            actual: bits.len(),
            needed,
        });
    }
    Ok(bits[start..start + count]
        .iter()
        .fold(0, |acc, &b| (acc << 1) | u32::from(b)))
}

/// Attach a byte start sequence ahead of every 8-bit group.
///
/// A final partial group is padded out with trailing zero bits, though
/// callers are expected to pass a multiple of 8. For such inputs the output
/// length is `len + 2 * (len / 8)`.
#[must_use]
pub fn extend_with_bss(bits: &[bool]) -> Vec<bool> {
    let groups = bits.len().div_ceil(8);
    let mut out = Vec::with_capacity(groups * CELLS_PER_BYTE);
    for group in 0..groups {
        out.extend_from_slice(&BSS);
        for i in 0..8 {
            out.push(bits.get(group * 8 + i).copied().unwrap_or(false));
        }
    }
    out
}

/// Strip the byte start sequences attached by [extend_with_bss].
///
/// # Errors
/// [Error::BssViolation] if a group does not lead with the dominant/recessive
/// pattern, or [Error::NotEnoughBits] if `bits` is not a whole number of
/// 10-cell groups.
pub fn strip_bss(bits: &[bool]) -> Result<Vec<bool>> {
    if bits.len() % CELLS_PER_BYTE != 0 {
        return Err(Error::NotEnoughBits {
            actual: bits.len(),
            needed: bits.len().div_ceil(CELLS_PER_BYTE) * CELLS_PER_BYTE,
        });
    }
    let mut out = Vec::with_capacity(bits.len() / CELLS_PER_BYTE * 8);
    for (group, cells) in bits.chunks_exact(CELLS_PER_BYTE).enumerate() {
        if cells[..2] != BSS {
            return Err(Error::BssViolation {
                bit: group * CELLS_PER_BYTE,
            });
        }
        out.extend_from_slice(&cells[2..]);
    }
    Ok(out)
}
