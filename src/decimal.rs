//! Decimal (EXI 7.1.3): Vorzeichen-Boolean, dann zwei Unsigned Integer.
//!
//! Der Nachkommateil steht mit umgekehrter Ziffernfolge im Stream, damit
//! führende Nullen (`1.05` → `50`) erhalten bleiben. Minus Null ist
//! darstellbar.

use std::fmt;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, unsigned_integer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub negative: bool,
    pub integral: u64,
    /// Nachkommaziffern in umgekehrter Reihenfolge.
    pub fractional: u64,
}

impl Decimal {
    /// Parst `[+-]int[.frac]`. Nullen am Ende des Nachkommateils entfallen.
    pub fn parse(lexical: &str) -> Result<Self> {
        let s = lexical.trim();
        let invalid = || Error::InvalidValue(format!("not a decimal: '{lexical}'"));
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let integral = parse_digits(int_part.bytes())?;
        let fractional = parse_digits(frac_part.trim_end_matches('0').bytes().rev())?;
        Ok(Self { negative, integral, fractional })
    }
}

fn parse_digits(digits: impl Iterator<Item = u8>) -> Result<u64> {
    digits.fold(Ok(0u64), |acc, b| {
        acc?.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(Error::IntegerOverflow)
    })
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        let frac: String = self.fractional.to_string().chars().rev().collect();
        write!(f, "{}.{frac}", self.integral)
    }
}

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: &Decimal) -> Result<()> {
    channel.encode_boolean(value.negative)?;
    unsigned_integer::encode(channel, value.integral)?;
    unsigned_integer::encode(channel, value.fractional)
}

pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<Decimal> {
    let negative = channel.decode_boolean()?;
    let integral = unsigned_integer::decode(channel)?;
    let fractional = unsigned_integer::decode(channel)?;
    Ok(Decimal { negative, integral, fractional })
}
