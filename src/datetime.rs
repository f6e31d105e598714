//! Date-Time (EXI 7.1.8).
//!
//! Jeder der acht XML-Schema Datums-/Zeittypen codiert eine feste Teilmenge
//! der Komponenten Year, MonthDay, Time, FractionalSecs und TimeZone
//! (EXI Table 7-3). Year ist ein Integer-Offset zu 2000.

use std::fmt;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, integer, unsigned_integer};

const YEAR_OFFSET: i64 = 2000;
const MONTH_DAY_BITS: u8 = 9;
const TIME_BITS: u8 = 17;
const TIMEZONE_BITS: u8 = 11;
/// 14 × 64: verschiebt den Timezone-Offset in den positiven Bereich.
const TIMEZONE_BIAS: i32 = 896;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeKind {
    GYear,
    GYearMonth,
    Date,
    DateTime,
    GMonth,
    GMonthDay,
    GDay,
    Time,
}

impl DateTimeKind {
    fn has_year(self) -> bool {
        matches!(self, Self::GYear | Self::GYearMonth | Self::Date | Self::DateTime)
    }

    fn has_month_day(self) -> bool {
        !matches!(self, Self::GYear | Self::Time)
    }

    fn has_time(self) -> bool {
        matches!(self, Self::DateTime | Self::Time)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GYear => "gYear",
            Self::GYearMonth => "gYearMonth",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::GMonth => "gMonth",
            Self::GMonthDay => "gMonthDay",
            Self::GDay => "gDay",
            Self::Time => "time",
        }
    }
}

/// A date-time value; components the kind does not carry stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub kind: DateTimeKind,
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Sekundenbruchteil, Ziffern umgekehrt (wie Decimal).
    pub fractional_secs: Option<u64>,
    /// Offset in Minuten, `None` ohne Zeitzone.
    pub timezone_minutes: Option<i16>,
}

impl DateTime {
    fn empty(kind: DateTimeKind) -> Self {
        Self {
            kind,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            fractional_secs: None,
            timezone_minutes: None,
        }
    }

    /// Parst die lexikalische Form des jeweiligen XML-Schema-Typs.
    pub fn parse(kind: DateTimeKind, lexical: &str) -> Result<Self> {
        let invalid = || Error::InvalidValue(format!("not a {}: '{lexical}'", kind.name()));
        let mut dt = Self::empty(kind);
        let (body, tz) = split_timezone(lexical.trim()).ok_or_else(invalid)?;
        dt.timezone_minutes = tz;

        let rest = match kind {
            DateTimeKind::GMonth | DateTimeKind::GMonthDay => body.strip_prefix("--"),
            DateTimeKind::GDay => body.strip_prefix("---"),
            DateTimeKind::Time => Some(body),
            _ => {
                let (year, rest) = take_year(body).ok_or_else(invalid)?;
                dt.year = year;
                Some(rest)
            }
        };
        let mut rest = rest.ok_or_else(invalid)?;

        match kind {
            DateTimeKind::GYearMonth | DateTimeKind::Date | DateTimeKind::DateTime => {
                rest = rest.strip_prefix('-').ok_or_else(invalid)?;
                (dt.month, rest) = take_two(rest).ok_or_else(invalid)?;
            }
            DateTimeKind::GMonth | DateTimeKind::GMonthDay => {
                (dt.month, rest) = take_two(rest).ok_or_else(invalid)?;
            }
            _ => {}
        }
        match kind {
            DateTimeKind::Date | DateTimeKind::DateTime | DateTimeKind::GMonthDay => {
                rest = rest.strip_prefix('-').ok_or_else(invalid)?;
                (dt.day, rest) = take_two(rest).ok_or_else(invalid)?;
            }
            DateTimeKind::GDay => (dt.day, rest) = take_two(rest).ok_or_else(invalid)?,
            _ => {}
        }
        if kind == DateTimeKind::DateTime {
            rest = rest.strip_prefix('T').ok_or_else(invalid)?;
        }
        if kind.has_time() {
            (dt.hour, rest) = take_two(rest).ok_or_else(invalid)?;
            rest = rest.strip_prefix(':').ok_or_else(invalid)?;
            (dt.minute, rest) = take_two(rest).ok_or_else(invalid)?;
            rest = rest.strip_prefix(':').ok_or_else(invalid)?;
            (dt.second, rest) = take_two(rest).ok_or_else(invalid)?;
            if let Some(frac) = rest.strip_prefix('.') {
                if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let trimmed = frac.trim_end_matches('0');
                if !trimmed.is_empty() {
                    let reversed: String = trimmed.chars().rev().collect();
                    dt.fractional_secs = Some(reversed.parse().map_err(|_| Error::IntegerOverflow)?);
                }
                rest = "";
            }
        }
        if !rest.is_empty() {
            return Err(invalid());
        }
        dt.validate()?;
        Ok(dt)
    }

    /// Letzter gültiger Tag; ohne Jahr gilt der 29. Februar.
    fn max_day(&self) -> u8 {
        match self.month {
            2 if !self.kind.has_year() || is_leap_year(self.year) => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    fn validate(&self) -> Result<()> {
        let k = self.kind;
        let month_ok = !k.has_month_day() || k == DateTimeKind::GDay || (1..=12).contains(&self.month);
        let day_ok = !k.has_month_day()
            || matches!(k, DateTimeKind::GMonth | DateTimeKind::GYearMonth)
            || (1..=self.max_day()).contains(&self.day);
        let time_ok = !k.has_time()
            || (self.hour < 24 && self.minute < 60 && self.second <= 60)
            || (self.hour == 24 && self.minute == 0 && self.second == 0);
        let tz_ok = self.timezone_minutes.is_none_or(|m| (-14 * 60..=14 * 60).contains(&m));
        if month_ok && day_ok && time_ok && tz_ok {
            Ok(())
        } else {
            Err(Error::InvalidValue(format!("{} component out of range", k.name())))
        }
    }
}

fn is_leap_year(year: i64) -> bool {
    year.rem_euclid(4) == 0 && (year.rem_euclid(100) != 0 || year.rem_euclid(400) == 0)
}

/// Trennt `Z`, `+hh:mm` oder `-hh:mm` vom Ende ab.
fn split_timezone(s: &str) -> Option<(&str, Option<i16>)> {
    if let Some(body) = s.strip_suffix('Z') {
        return Some((body, Some(0)));
    }
    if s.len() >= 6 && s.is_char_boundary(s.len() - 6) {
        let (body, tz) = s.split_at(s.len() - 6);
        if !tz.is_ascii() {
            return Some((s, None));
        }
        let b = tz.as_bytes();
        if (b[0] == b'+' || b[0] == b'-') && b[3] == b':' {
            let (hours, _) = take_two(&tz[1..3])?;
            let (minutes, _) = take_two(&tz[4..6])?;
            if minutes >= 60 {
                return None;
            }
            let offset = i16::from(hours) * 60 + i16::from(minutes);
            return Some((body, Some(if b[0] == b'-' { -offset } else { offset })));
        }
    }
    Some((s, None))
}

fn take_two(s: &str) -> Option<(u8, &str)> {
    let b = s.as_bytes();
    if b.len() < 2 || !b[0].is_ascii_digit() || !b[1].is_ascii_digit() {
        return None;
    }
    Some(((b[0] - b'0') * 10 + (b[1] - b'0'), &s[2..]))
}

/// Jahr mit optionalem Minus und mindestens vier Ziffern.
fn take_year(s: &str) -> Option<(i64, &str)> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, s),
    };
    let end = digits.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(digits.len());
    if end < 4 {
        return None;
    }
    let year: i64 = digits[..end].parse().ok()?;
    Some((if negative { -year } else { year }, &digits[end..]))
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = self.kind;
        if k.has_year() {
            if self.year < 0 {
                write!(f, "-{:04}", self.year.unsigned_abs())?;
            } else {
                write!(f, "{:04}", self.year)?;
            }
        }
        match k {
            DateTimeKind::GYearMonth => write!(f, "-{:02}", self.month)?,
            DateTimeKind::Date | DateTimeKind::DateTime => write!(f, "-{:02}-{:02}", self.month, self.day)?,
            DateTimeKind::GMonth => write!(f, "--{:02}", self.month)?,
            DateTimeKind::GMonthDay => write!(f, "--{:02}-{:02}", self.month, self.day)?,
            DateTimeKind::GDay => write!(f, "---{:02}", self.day)?,
            _ => {}
        }
        if k == DateTimeKind::DateTime {
            f.write_str("T")?;
        }
        if k.has_time() {
            write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
            if let Some(frac) = self.fractional_secs {
                let digits: String = frac.to_string().chars().rev().collect();
                write!(f, ".{digits}")?;
            }
        }
        match self.timezone_minutes {
            None => Ok(()),
            Some(0) => f.write_str("Z"),
            Some(m) => {
                let sign = if m < 0 { '-' } else { '+' };
                let m = m.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", m / 60, m % 60)
            }
        }
    }
}

pub fn encode<C: EncoderChannel + ?Sized>(channel: &mut C, value: &DateTime) -> Result<()> {
    value.validate()?;
    let kind = value.kind;
    if kind.has_year() {
        let offset = value.year.checked_sub(YEAR_OFFSET).ok_or(Error::IntegerOverflow)?;
        integer::encode(channel, offset)?;
    }
    if kind.has_month_day() {
        let month_day = u64::from(value.month) * 32 + u64::from(value.day);
        channel.encode_n_bit_unsigned_integer(month_day, MONTH_DAY_BITS)?;
    }
    if kind.has_time() {
        let time = (u64::from(value.hour) * 64 + u64::from(value.minute)) * 64 + u64::from(value.second);
        channel.encode_n_bit_unsigned_integer(time, TIME_BITS)?;
        channel.encode_boolean(value.fractional_secs.is_some())?;
        if let Some(frac) = value.fractional_secs {
            unsigned_integer::encode(channel, frac)?;
        }
    }
    channel.encode_boolean(value.timezone_minutes.is_some())?;
    if let Some(tz) = value.timezone_minutes {
        let tz = i32::from(tz);
        let raw = (tz / 60) * 64 + tz % 60 + TIMEZONE_BIAS;
        channel.encode_n_bit_unsigned_integer(raw as u64, TIMEZONE_BITS)?;
    }
    Ok(())
}

pub fn decode<C: DecoderChannel + ?Sized>(channel: &mut C, kind: DateTimeKind) -> Result<DateTime> {
    let mut dt = DateTime::empty(kind);
    if kind.has_year() {
        dt.year = integer::decode(channel)?
            .checked_add(YEAR_OFFSET)
            .ok_or(Error::IntegerOverflow)?;
    }
    if kind.has_month_day() {
        let month_day = channel.decode_n_bit_unsigned_integer(MONTH_DAY_BITS)?;
        dt.month = (month_day / 32) as u8;
        dt.day = (month_day % 32) as u8;
    }
    if kind.has_time() {
        let time = channel.decode_n_bit_unsigned_integer(TIME_BITS)?;
        dt.second = (time % 64) as u8;
        dt.minute = ((time / 64) % 64) as u8;
        dt.hour = (time / 4096) as u8;
        if channel.decode_boolean()? {
            dt.fractional_secs = Some(unsigned_integer::decode(channel)?);
        }
    }
    if channel.decode_boolean()? {
        let raw = channel.decode_n_bit_unsigned_integer(TIMEZONE_BITS)? as i32 - TIMEZONE_BIAS;
        // Minuten tragen das Vorzeichen der Stunden: -1:30 → -64 - 30
        let (hours, minutes) = (raw / 64, raw % 64);
        if minutes.abs() > 59 {
            return Err(Error::IntegerOverflow);
        }
        dt.timezone_minutes = Some((hours * 60 + minutes) as i16);
    }
    dt.validate().map_err(|_| Error::IntegerOverflow)?;
    Ok(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitDecoderChannel, BitEncoderChannel};
    use crate::bytestream::{ByteDecoderChannel, ByteEncoderChannel};

    fn round_trip(kind: DateTimeKind, lexical: &str) -> String {
        let value = DateTime::parse(kind, lexical).unwrap();
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, &value).unwrap();
        let data = ch.into_inner().unwrap();
        let decoded = decode(&mut BitDecoderChannel::new(&data[..]), kind).unwrap();
        assert_eq!(decoded, value);
        decoded.to_string()
    }

    // --- Test 1: alle acht Typen ---

    #[test]
    fn alle_typen() {
        let cases = [
            (DateTimeKind::GYear, "2025"),
            (DateTimeKind::GYear, "-0044"),
            (DateTimeKind::GYearMonth, "1999-12Z"),
            (DateTimeKind::Date, "2024-02-29+05:30"),
            (DateTimeKind::DateTime, "2001-10-26T21:32:52.125-02:00"),
            (DateTimeKind::GMonth, "--07"),
            (DateTimeKind::GMonthDay, "--12-25"),
            (DateTimeKind::GDay, "---01Z"),
            (DateTimeKind::Time, "13:20:00.05"),
        ];
        for (kind, lexical) in cases {
            assert_eq!(round_trip(kind, lexical), lexical, "{kind:?}");
        }
    }

    // --- Test 2: Komponenten-Layout ---

    /// gYear 2000: Integer 0 (Vorzeichen 0 + Oktett 0), dann Timezone-Bit 0.
    #[test]
    fn year_is_offset_from_2000() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, &DateTime::parse(DateTimeKind::GYear, "2000").unwrap()).unwrap();
        assert_eq!(ch.into_inner().unwrap(), vec![0x00, 0x00]);
    }

    /// Byte-Kanal: MonthDay (9 Bit) belegt zwei Bytes, Booleans je ein Byte.
    #[test]
    fn byte_channel_layout() {
        let value = DateTime::parse(DateTimeKind::GMonthDay, "--03-04").unwrap();
        let mut ch = ByteEncoderChannel::new(Vec::new());
        encode(&mut ch, &value).unwrap();
        let data = ch.into_inner();
        // 3*32+4 = 100 → [100, 0], Timezone-Flag 0
        assert_eq!(data, vec![100, 0, 0]);
        assert_eq!(decode(&mut ByteDecoderChannel::new(&data[..]), DateTimeKind::GMonthDay).unwrap(), value);
    }

    // --- Test 3: Zeitzonen ---

    #[test]
    fn negative_timezone_with_minutes() {
        assert_eq!(round_trip(DateTimeKind::Time, "10:00:00-01:30"), "10:00:00-01:30");
        assert_eq!(round_trip(DateTimeKind::Time, "10:00:00-14:00"), "10:00:00-14:00");
        assert_eq!(round_trip(DateTimeKind::Time, "10:00:00+14:00"), "10:00:00+14:00");
        assert_eq!(round_trip(DateTimeKind::Time, "10:00:00+00:00"), "10:00:00Z");
    }

    // --- Test 4: Ungültige Lexicals ---

    #[test]
    fn invalid_lexicals() {
        let cases = [
            (DateTimeKind::Date, "2024-13-01"),
            (DateTimeKind::Date, "24-01-01"),
            (DateTimeKind::Time, "25:00:00"),
            (DateTimeKind::Time, "12:00"),
            (DateTimeKind::DateTime, "2024-01-01 12:00:00"),
            (DateTimeKind::GDay, "--01"),
            (DateTimeKind::Time, "10:00:00+15:00"),
        ];
        for (kind, lexical) in cases {
            assert!(DateTime::parse(kind, lexical).is_err(), "{lexical}");
        }
    }

    // --- Test 5: Tage je Monat ---
    #[test]
    fn tage_je_monat() {
        let ok = [
            (DateTimeKind::Date, "2024-02-29"),
            (DateTimeKind::Date, "2000-02-29"),
            (DateTimeKind::Date, "2023-04-30"),
            (DateTimeKind::DateTime, "2023-12-31T23:59:59"),
            (DateTimeKind::GMonthDay, "--02-29"),
        ];
        for (kind, lexical) in ok {
            assert!(DateTime::parse(kind, lexical).is_ok(), "{lexical}");
        }
        let invalid = [
            (DateTimeKind::DateTime, "2024-02-30T00:00:00"),
            (DateTimeKind::Date, "2023-02-29"),
            (DateTimeKind::Date, "1900-02-29"),
            (DateTimeKind::Date, "2023-04-31"),
            (DateTimeKind::GMonthDay, "--06-31"),
        ];
        for (kind, lexical) in invalid {
            assert!(DateTime::parse(kind, lexical).is_err(), "{lexical}");
        }
    }

    #[test]
    fn trailing_fraction_zeros_dropped() {
        assert_eq!(round_trip(DateTimeKind::Time, "08:15:30.500"), "08:15:30.5");
        assert_eq!(round_trip(DateTimeKind::Time, "08:15:30.000"), "08:15:30");
    }

    #[test]
    fn decode_rejects_month_13() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        ch.encode_n_bit_unsigned_integer(13 * 32 + 1, MONTH_DAY_BITS).unwrap();
        ch.encode_boolean(false).unwrap();
        let data = ch.into_inner().unwrap();
        let err = decode(&mut BitDecoderChannel::new(&data[..]), DateTimeKind::GMonthDay).unwrap_err();
        assert_eq!(err, Error::IntegerOverflow);
    }
}
