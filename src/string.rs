//! String (EXI 7.1.10): Länge in Code Points, dann jeder Code Point als
//! Unsigned Integer. Surrogatpaare existieren in `&str` nicht, jeder `char`
//! ist genau ein Code Point.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, unsigned_integer};

/// Obergrenze für vorab reservierten Speicher beim Decodieren.
const MAX_PREALLOC_CHARS: usize = 1 << 16;

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: &str) -> Result<()> {
    encode_with_offset(channel, value, 0)
}

/// Schreibt `char_count + offset` als Länge und danach die Code Points.
///
/// String Tables nutzen den Offset, um Treffer (0, 1) von Literalen zu trennen.
pub fn encode_with_offset<C: EncoderChannel + ?Sized>(
    channel: &mut C,
    value: &str,
    offset: u64,
) -> Result<()> {
    let count = if value.is_ascii() { value.len() } else { value.chars().count() };
    unsigned_integer::encode(channel, count as u64 + offset)?;
    encode_chars(channel, value)
}

/// Nur die Code Points, ohne Längenpräfix.
pub fn encode_chars<C: EncoderChannel + ?Sized>(channel: &mut C, value: &str) -> Result<()> {
    if value.is_ascii() {
        // ASCII-Code-Points sind einoktettige Varints, identisch mit dem Rohbyte.
        return channel.encode_bytes(value.as_bytes());
    }
    for ch in value.chars() {
        unsigned_integer::encode(channel, u64::from(u32::from(ch)))?;
    }
    Ok(())
}

pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<String> {
    let len = unsigned_integer::decode(channel)?;
    let len = usize::try_from(len).map_err(|_| Error::IntegerOverflow)?;
    decode_chars(channel, len)
}

/// Liest `len` Code Points.
pub fn decode_chars<C: DecoderChannel + ?Sized>(channel: &mut C, len: usize) -> Result<String> {
    let mut s = String::with_capacity(len.min(MAX_PREALLOC_CHARS));
    for _ in 0..len {
        let cp = unsigned_integer::decode(channel)?;
        let ch = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidCodePoint(cp))?;
        s.push(ch);
    }
    Ok(s)
}
