//! Binary (EXI 7.1.1): Länge als Unsigned Integer, danach die Oktette.
//!
//! Lexikalisch als base64Binary oder hexBinary.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, unsigned_integer};

/// Obergrenze für vorab reservierten Speicher beim Decodieren.
const MAX_PREALLOC: usize = 1 << 16;

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: &[u8]) -> Result<()> {
    unsigned_integer::encode(channel, value.len() as u64)?;
    channel.encode_bytes(value)
}

pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<Vec<u8>> {
    let len = unsigned_integer::decode(channel)?;
    let len = usize::try_from(len).map_err(|_| Error::IntegerOverflow)?;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        out.push(channel.decode()?);
    }
    Ok(out)
}

/// base64Binary; Whitespace im Lexical wird ignoriert.
pub fn parse_base64(lexical: &str) -> Result<Vec<u8>> {
    let compact: String = lexical.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::InvalidValue(format!("invalid base64: {e}")))
}

pub fn format_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn parse_hex(lexical: &str) -> Result<Vec<u8>> {
    let s = lexical.trim();
    if s.len() % 2 != 0 {
        return Err(Error::InvalidValue(format!("odd hexBinary length: '{s}'")));
    }
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = hex_digit(pair[0]);
            let lo = hex_digit(pair[1]);
            match (hi, lo) {
                (Some(h), Some(l)) => Ok(h << 4 | l),
                _ => Err(Error::InvalidValue(format!("invalid hexBinary: '{s}'"))),
            }
        })
        .collect()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

pub fn format_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02X}");
    }
    s
}
