//! Event codes (EXI 6.2, 8.1).
//!
//! Ein Event Code hat 1-3 Teile. Jeder Teil ist ein n-bit Unsigned Integer,
//! n hängt nur von der Anzahl der Geschwister ab:
//!
//! - Teil 1: alle Level-1 Productions, plus ein Wert für "weiter auf Level 2"
//! - Teil 2: alle Level-2 Slots, plus ein Wert für "weiter auf Level 3"
//! - Teil 3: alle Level-3 Slots
//!
//! Ein Zustand mit nur einer Alternative braucht 0 Bits.

use std::fmt;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result, bit_width};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode {
    part1: u32,
    part2: Option<u32>,
    part3: Option<u32>,
}

impl EventCode {
    pub fn one(part1: u32) -> Self {
        Self { part1, part2: None, part3: None }
    }

    pub fn two(part1: u32, part2: u32) -> Self {
        Self { part1, part2: Some(part2), part3: None }
    }

    pub fn three(part1: u32, part2: u32, part3: u32) -> Self {
        Self { part1, part2: Some(part2), part3: Some(part3) }
    }

    /// Anzahl der Teile (1-3).
    pub fn length(&self) -> usize {
        1 + usize::from(self.part2.is_some()) + usize::from(self.part3.is_some())
    }

    pub fn part1(&self) -> u32 {
        self.part1
    }

    pub fn part2(&self) -> Option<u32> {
        self.part2
    }

    pub fn part3(&self) -> Option<u32> {
        self.part3
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.part1)?;
        if let Some(p2) = self.part2 {
            write!(f, ".{p2}")?;
        }
        if let Some(p3) = self.part3 {
            write!(f, ".{p3}")?;
        }
        Ok(())
    }
}

/// Number of alternatives per level of one grammar state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeWidths {
    pub n1: u32,
    pub n2: u32,
    pub n3: u32,
}

impl CodeWidths {
    pub fn new(n1: usize, n2: usize, n3: usize) -> Self {
        Self { n1: n1 as u32, n2: n2 as u32, n3: n3 as u32 }
    }

    pub fn has_second_level(&self) -> bool {
        self.n2 > 0 || self.n3 > 0
    }

    /// Werte des ersten Teils.
    pub fn part1_values(&self) -> u32 {
        self.n1 + u32::from(self.has_second_level())
    }

    pub fn part2_values(&self) -> u32 {
        self.n2 + u32::from(self.n3 > 0)
    }

    pub fn bits_part1(&self) -> u8 {
        bit_width::for_count(self.part1_values() as usize)
    }

    pub fn bits_part2(&self) -> u8 {
        bit_width::for_count(self.part2_values() as usize)
    }

    pub fn bits_part3(&self) -> u8 {
        bit_width::for_count(self.n3 as usize)
    }

    /// Event code of the level-1 production with code `code`.
    pub fn level1(&self, code: u32) -> EventCode {
        EventCode::one(code)
    }

    pub fn level2(&self, slot: u32) -> EventCode {
        EventCode::two(self.n1, slot)
    }

    pub fn level3(&self, slot: u32) -> EventCode {
        EventCode::three(self.n1, self.n2, slot)
    }

    /// Prüft, ob `code` in diesem Zustand existiert.
    pub fn contains(&self, code: &EventCode) -> bool {
        match (code.part2, code.part3) {
            (None, None) => code.part1 < self.n1,
            (Some(p2), None) => code.part1 == self.n1 && p2 < self.n2,
            (Some(p2), Some(p3)) => code.part1 == self.n1 && p2 == self.n2 && p3 < self.n3,
            (None, Some(_)) => false,
        }
    }
}

pub fn encode<C: EncoderChannel + ?Sized>(ch: &mut C, code: &EventCode, widths: &CodeWidths) -> Result<()> {
    if !widths.contains(code) {
        return Err(Error::invalid_event_code(code.to_string(), ""));
    }
    ch.encode_n_bit_unsigned_integer(u64::from(code.part1), widths.bits_part1())?;
    if let Some(p2) = code.part2 {
        ch.encode_n_bit_unsigned_integer(u64::from(p2), widths.bits_part2())?;
    }
    if let Some(p3) = code.part3 {
        ch.encode_n_bit_unsigned_integer(u64::from(p3), widths.bits_part3())?;
    }
    Ok(())
}

/// Reads one event code. `state` names the grammar state for errors.
pub fn decode<C: DecoderChannel + ?Sized>(
    ch: &mut C,
    widths: &CodeWidths,
    state: &str,
) -> Result<EventCode> {
    let invalid = |code: String| Error::invalid_event_code(code, state.to_string());

    let part1 = ch.decode_n_bit_unsigned_integer(widths.bits_part1())? as u32;
    if part1 < widths.n1 {
        return Ok(EventCode::one(part1));
    }
    if part1 > widths.n1 || !widths.has_second_level() {
        return Err(invalid(part1.to_string()));
    }

    let part2 = ch.decode_n_bit_unsigned_integer(widths.bits_part2())? as u32;
    if part2 < widths.n2 {
        return Ok(EventCode::two(part1, part2));
    }
    if part2 > widths.n2 || widths.n3 == 0 {
        return Err(invalid(format!("{part1}.{part2}")));
    }

    let part3 = ch.decode_n_bit_unsigned_integer(widths.bits_part3())? as u32;
    if part3 >= widths.n3 {
        return Err(invalid(format!("{part1}.{part2}.{part3}")));
    }
    Ok(EventCode::three(part1, part2, part3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitDecoderChannel, BitEncoderChannel};
    use crate::bytestream::{ByteDecoderChannel, ByteEncoderChannel};

    fn bits(code: EventCode, widths: CodeWidths) -> Vec<u8> {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, &code, &widths).unwrap();
        ch.into_inner().unwrap()
    }

    // --- Test 1: Ein einziger Level-1 Code braucht keine Bits ---
    #[test]
    fn null_bits() {
        let w = CodeWidths::new(1, 0, 0);
        assert_eq!(bits(EventCode::one(0), w), Vec::<u8>::new());
        let mut ch = BitDecoderChannel::new(&[][..]);
        assert_eq!(decode(&mut ch, &w, "DocEnd").unwrap(), EventCode::one(0));
    }

    // --- Test 2: Built-in ElementContent ---
    // EE 0, SE(*) 1.0, CH 1.1, CM 1.2.0, PI 1.2.1
    #[test]
    fn element_content_codes() {
        let w = CodeWidths::new(1, 2, 2);
        assert_eq!(w.bits_part1(), 1);
        assert_eq!(w.bits_part2(), 2);
        assert_eq!(w.bits_part3(), 1);
        assert_eq!(w.level3(1), EventCode::three(1, 2, 1));
        // 1 | 10 | 1 -> 1101_0000
        assert_eq!(bits(w.level3(1), w), [0b1101_0000]);
        // 1 | 01 -> 1010_0000
        assert_eq!(bits(w.level2(1), w), [0b1010_0000]);
    }

    // --- Test 3: Leeres Level 2 mit Level 3 ---
    #[test]
    fn level3_ohne_level2() {
        let w = CodeWidths::new(1, 0, 2);
        // Teil 2 hat nur einen Wert -> 0 Bits
        assert_eq!(w.bits_part2(), 0);
        assert_eq!(bits(w.level3(1), w), [0b1100_0000]);
        let bytes = [0b1100_0000];
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        assert_eq!(decode(&mut ch, &w, "").unwrap(), EventCode::three(1, 0, 1));
    }

    // --- Test 4: Ungültige Codes ---
    #[test]
    fn ungueltige_codes() {
        // n1 = 2, kein Level 2: 2 Bits wären nötig für 3 Werte, hier 1 Bit -> Wert 1 gültig
        let w = CodeWidths::new(3, 0, 0);
        let bytes = [0b1100_0000];
        let mut ch = BitDecoderChannel::new(&bytes[..]);
        let err = decode(&mut ch, &w, "StartTag").unwrap_err();
        assert!(matches!(err, Error::InvalidEventCode { .. }), "{err:?}");
        assert!(err.to_string().contains("StartTag"));

        let mut ch = BitEncoderChannel::new(Vec::new());
        assert!(encode(&mut ch, &EventCode::two(0, 0), &w).is_err());
    }

    // --- Test 5: Byte-Kanal rundet jeden Teil auf ---
    #[test]
    fn byte_aligned_parts() {
        let w = CodeWidths::new(300, 2, 0);
        let mut ch = ByteEncoderChannel::new(Vec::new());
        encode(&mut ch, &w.level2(1), &w).unwrap();
        let bytes = ch.into_inner();
        // Teil 1: 300 in 9 Bits -> 2 Bytes LSB zuerst, Teil 2: 1 Byte
        assert_eq!(bytes, [0x2C, 0x01, 0x01]);
        let mut ch = ByteDecoderChannel::new(bytes.as_slice());
        assert_eq!(decode(&mut ch, &w, "").unwrap(), EventCode::two(300, 1));
    }

    #[test]
    fn anzeige() {
        assert_eq!(EventCode::three(1, 2, 0).to_string(), "1.2.0");
        assert_eq!(EventCode::one(4).length(), 1);
        assert_eq!(EventCode::two(4, 0).length(), 2);
    }
}
