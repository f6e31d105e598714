//! Coding length: `⌈log₂(n)⌉` bits to distinguish `n` alternatives.
//!
//! Gemeinsame Basis für Event Codes, n-bit Integer, Enumerations und
//! die Compact-IDs der String Tables.

/// Bits für `n` Alternativen. `n ≤ 1` braucht kein Bit.
#[inline]
pub fn for_count(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

/// Bits für den geschlossenen Bereich `[lower, upper]`.
///
/// Liefert `None` für leere oder nicht darstellbare Bereiche.
pub fn for_range(lower: i64, upper: i64) -> Option<u8> {
    if upper < lower {
        return None;
    }
    let span = (i128::from(upper) - i128::from(lower)) as u128 + 1;
    if span <= 1 {
        return Some(0);
    }
    Some((u128::BITS - (span - 1).leading_zeros()) as u8)
}

/// Bytes, die ein byte-granularer Kanal für `n` Bits schreibt.
#[inline]
pub fn bytes_for_bits(n: u8) -> usize {
    usize::from(n).div_ceil(8)
}
