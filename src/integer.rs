//! Integer (EXI 7.1.5).
//!
//! Drei Varianten, abhängig von den Schema-Grenzen:
//! 1. Bereich ≤ 4096 Werte: n-bit Offset vom Minimum
//! 2. Minimum ≥ 0: Unsigned Integer
//! 3. sonst: Vorzeichenbit + Unsigned-Betrag (negativ: `-v - 1`)

use crate::bit_width;
use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, unsigned_integer};

/// Obergrenze für die n-bit Darstellung eines beschränkten Bereichs.
pub const MAX_BOUNDED_RANGE: u64 = 4096;

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: i64) -> Result<()> {
    if value >= 0 {
        channel.encode_boolean(false)?;
        unsigned_integer::encode(channel, value as u64)
    } else {
        channel.encode_boolean(true)?;
        // -value - 1 ohne Überlauf bei i64::MIN
        unsigned_integer::encode(channel, !(value as u64))
    }
}

pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<i64> {
    let negative = channel.decode_boolean()?;
    let magnitude = unsigned_integer::decode(channel)?;
    if magnitude > i64::MAX as u64 {
        return Err(Error::IntegerOverflow);
    }
    let magnitude = magnitude as i64;
    Ok(if negative { -magnitude - 1 } else { magnitude })
}

/// Ob `[lower, upper]` als n-bit Offset dargestellt wird.
pub fn is_n_bit_range(lower: i64, upper: i64) -> bool {
    upper >= lower && (i128::from(upper) - i128::from(lower)) < i128::from(MAX_BOUNDED_RANGE)
}

/// n-bit Offset vom Minimum; `value` muss in `[lower, upper]` liegen.
pub fn encode_bounded<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    value: i64,
    lower: i64,
    upper: i64,
) -> Result<()> {
    if value < lower || value > upper {
        return Err(Error::InvalidValue(format!("{value} not in [{lower}, {upper}]")));
    }
    let n = bit_width::for_range(lower, upper).ok_or(Error::IntegerOverflow)?;
    let offset = (i128::from(value) - i128::from(lower)) as u64;
    channel.encode_n_bit_unsigned_integer(offset, n)
}

pub fn decode_bounded<C: DecoderChannel + ?Sized>(
    channel: &mut C,
    lower: i64,
    upper: i64,
) -> Result<i64> {
    let n = bit_width::for_range(lower, upper).ok_or(Error::IntegerOverflow)?;
    let offset = channel.decode_n_bit_unsigned_integer(n)?;
    let value = i128::from(lower) + i128::from(offset);
    if value > i128::from(upper) {
        return Err(Error::IntegerOverflow);
    }
    Ok(value as i64)
}
