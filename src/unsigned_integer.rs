//! Unsigned Integer (EXI 7.1.6): base-128 varint.
//!
//! Jedes Oktett trägt 7 Datenbits und im MSB das Fortsetzungsbit. Die
//! niederwertigste Gruppe kommt zuerst, das letzte Oktett hat MSB = 0.

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result};

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: u64) -> Result<()> {
    if value < 0x80 {
        return channel.encode(value as u8);
    }
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            return channel.encode(low7);
        }
        channel.encode(0x80 | low7)?;
    }
}

/// Decodes a varint; values beyond `u64` are [`Error::IntegerOverflow`].
pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = channel.decode()?;
        let data = u64::from(byte & 0x7F);
        // Beim 10. Oktett ist nur noch Datenbit 0 gültig.
        if shift == 63 && (data > 1 || byte & 0x80 != 0) {
            return Err(Error::IntegerOverflow);
        }
        result |= data << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Anzahl Oktette, die `value` belegt.
pub fn encoded_len(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(7)
    }
}
