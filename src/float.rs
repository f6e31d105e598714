//! Float (EXI 7.1.4): Mantisse und Basis-10-Exponent als zwei Integer.
//!
//! Der Sonderexponent `-(2^14)` codiert INF (Mantisse 1), -INF (Mantisse -1)
//! und NaN (jede andere Mantisse). Normale Exponenten liegen in
//! `-(2^14-1)..=2^14-1`.

use std::fmt;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, integer};

pub const EXPONENT_MIN: i64 = -(1 << 14) + 1;
pub const EXPONENT_MAX: i64 = (1 << 14) - 1;
pub const SPECIAL_EXPONENT: i64 = -(1 << 14);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Float {
    /// `mantissa × 10^exponent`
    Value { mantissa: i64, exponent: i64 },
    Infinity,
    NegativeInfinity,
    NaN,
}

impl Float {
    /// Parst die lexikalische Form (`1.5`, `-3E2`, `INF`, `-INF`, `NaN`).
    ///
    /// Nachkommastellen wandern in den Exponenten, Nullen am Ende der
    /// Mantisse werden in den Exponenten geschoben.
    pub fn parse(lexical: &str) -> Result<Self> {
        let s = lexical.trim();
        match s {
            "INF" | "+INF" => return Ok(Self::Infinity),
            "-INF" => return Ok(Self::NegativeInfinity),
            "NaN" => return Ok(Self::NaN),
            _ => {}
        }
        let invalid = || Error::InvalidValue(format!("not a float: '{lexical}'"));

        let (number, exp_part) = match s.find(['e', 'E']) {
            Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
            None => (s, None),
        };
        let mut exponent: i64 = match exp_part {
            Some(e) => e.parse().map_err(|_| invalid())?,
            None => 0,
        };
        let (negative, digits) = match number.as_bytes().first() {
            Some(b'-') => (true, &number[1..]),
            Some(b'+') => (false, &number[1..]),
            _ => (false, number),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let mut mantissa: i64 = 0;
        for (i, b) in int_part.bytes().chain(frac_part.bytes()).enumerate() {
            if !b.is_ascii_digit() {
                return Err(invalid());
            }
            let digit = i64::from(b - b'0');
            let fractional = i >= int_part.len();
            match mantissa.checked_mul(10).and_then(|m| m.checked_add(digit)) {
                Some(m) => {
                    mantissa = m;
                    if fractional {
                        exponent -= 1;
                    }
                }
                // Ziffern jenseits der i64-Präzision verschieben nur noch den Exponenten.
                None if !fractional => exponent += 1,
                None => {}
            }
        }
        if mantissa == 0 {
            return Ok(Self::Value { mantissa: 0, exponent: 0 });
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }
        if negative {
            mantissa = -mantissa;
        }
        if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
            return Err(Error::FloatOutOfRange);
        }
        Ok(Self::Value { mantissa, exponent })
    }
}

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { mantissa, exponent } => write!(f, "{mantissa}E{exponent}"),
            Self::Infinity => f.write_str("INF"),
            Self::NegativeInfinity => f.write_str("-INF"),
            Self::NaN => f.write_str("NaN"),
        }
    }
}

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: Float) -> Result<()> {
    let (mantissa, exponent) = match value {
        Float::Value { mantissa, exponent } => {
            if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
                return Err(Error::FloatOutOfRange);
            }
            (mantissa, exponent)
        }
        Float::Infinity => (1, SPECIAL_EXPONENT),
        Float::NegativeInfinity => (-1, SPECIAL_EXPONENT),
        Float::NaN => (0, SPECIAL_EXPONENT),
    };
    integer::encode(channel, mantissa)?;
    integer::encode(channel, exponent)
}

pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C) -> Result<Float> {
    let mantissa = integer::decode(channel)?;
    let exponent = integer::decode(channel)?;
    if exponent == SPECIAL_EXPONENT {
        return Ok(match mantissa {
            1 => Float::Infinity,
            -1 => Float::NegativeInfinity,
            _ => Float::NaN,
        });
    }
    if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
        return Err(Error::FloatOutOfRange);
    }
    Ok(Float::Value { mantissa, exponent })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitDecoderChannel, BitEncoderChannel};

    fn round_trip(value: Float) -> Float {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, value).unwrap();
        let data = ch.into_inner().unwrap();
        decode(&mut BitDecoderChannel::new(&data[..])).unwrap()
    }

    #[test]
    fn specials_round_trip() {
        for f in [Float::Infinity, Float::NegativeInfinity, Float::NaN] {
            assert_eq!(round_trip(f), f);
        }
    }

    #[test]
    fn extreme_exponents_round_trip() {
        for exponent in [EXPONENT_MIN, EXPONENT_MAX] {
            let f = Float::Value { mantissa: -7, exponent };
            assert_eq!(round_trip(f), f);
        }
    }

    #[test]
    fn exponent_out_of_range_is_rejected() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        let f = Float::Value { mantissa: 1, exponent: EXPONENT_MAX + 1 };
        assert_eq!(encode(&mut ch, f).unwrap_err(), Error::FloatOutOfRange);
    }

    /// Mantisse != ±1 mit Sonderexponent ist NaN.
    #[test]
    fn special_exponent_other_mantissa_is_nan() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        integer::encode(&mut ch, 42).unwrap();
        integer::encode(&mut ch, SPECIAL_EXPONENT).unwrap();
        let data = ch.into_inner().unwrap();
        assert_eq!(decode(&mut BitDecoderChannel::new(&data[..])).unwrap(), Float::NaN);
    }

    #[test]
    fn parse_lexical_forms() {
        assert_eq!(Float::parse("1.5").unwrap(), Float::Value { mantissa: 15, exponent: -1 });
        assert_eq!(Float::parse("-300").unwrap(), Float::Value { mantissa: -3, exponent: 2 });
        assert_eq!(Float::parse("2.5E3").unwrap(), Float::Value { mantissa: 25, exponent: 2 });
        assert_eq!(Float::parse("0.000").unwrap(), Float::Value { mantissa: 0, exponent: 0 });
        assert_eq!(Float::parse(".5").unwrap(), Float::Value { mantissa: 5, exponent: -1 });
        assert_eq!(Float::parse("INF").unwrap(), Float::Infinity);
        assert_eq!(Float::parse("-INF").unwrap(), Float::NegativeInfinity);
        assert_eq!(Float::parse("NaN").unwrap(), Float::NaN);
    }

    #[test]
    fn parse_rejects_garbage() {
        for s in ["", "abc", "1.2.3", "1e", "--1"] {
            assert!(Float::parse(s).is_err(), "{s}");
        }
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(Float::Value { mantissa: 15, exponent: -1 }.to_string(), "15E-1");
        assert_eq!(Float::parse(&Float::NaN.to_string()).unwrap(), Float::NaN);
    }
}
