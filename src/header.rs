//! EXI Header (EXI 5).
//!
//! ```text
//! [ "$EXI" ]  10  P  V  1111* 0000..1110  [ Padding ]
//!  Cookie     DB  |  |  Version-Chunks
//!                 |  Preview
//!                 Options vorhanden
//! ```
//!
//! Options werden nie im Header übertragen: Encoder und Decoder bekommen sie
//! vom Aufrufer. Ein Header mit Presence-Bit 1 wird abgelehnt.
//!
//! ```
//! use exi_codec::bitstream::BitEncoderChannel;
//! use exi_codec::header::{self, ExiHeader};
//!
//! let mut ch = BitEncoderChannel::new(Vec::new());
//! header::encode(&mut ch, &ExiHeader::new(), false).unwrap();
//! assert_eq!(ch.into_inner().unwrap(), [0x80]);
//! ```

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::{Error, Result};

const EXI_COOKIE: [u8; 4] = *b"$EXI";
const DISTINGUISHING_BITS: u64 = 0b10;
/// 4-Bit Chunk, der eine weitere Versionsstelle ankündigt.
const VERSION_CONTINUE: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExiHeader {
    cookie: bool,
    options_present: bool,
    preview: bool,
    version: u16,
}

impl Default for ExiHeader {
    fn default() -> Self {
        Self { cookie: false, options_present: false, preview: false, version: 1 }
    }
}

impl ExiHeader {
    /// Final version 1, no cookie.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cookie(&self) -> bool {
        self.cookie
    }

    pub fn options_present(&self) -> bool {
        self.options_present
    }

    pub fn preview(&self) -> bool {
        self.preview
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn with_cookie(mut self) -> Self {
        self.cookie = true;
        self
    }

    /// Nur für Tests von Fremd-Headern; der Encoder schreibt nie Options.
    pub fn with_options(mut self) -> Self {
        self.options_present = true;
        self
    }

    /// Version 0 wird zu 1.
    pub fn with_version(mut self, version: u16) -> Self {
        self.version = version.max(1);
        self
    }

    pub fn as_preview(mut self) -> Self {
        self.preview = true;
        self
    }
}

/// Writes the header; `padding` aligns to the next byte afterwards.
pub fn encode<C: EncoderChannel + ?Sized>(ch: &mut C, header: &ExiHeader, padding: bool) -> Result<()> {
    if header.cookie {
        ch.encode_bytes(&EXI_COOKIE)?;
    }
    ch.encode_n_bit_unsigned_integer(DISTINGUISHING_BITS, 2)?;
    ch.encode_boolean(header.options_present)?;
    ch.encode_boolean(header.preview)?;

    let mut remaining = u64::from(header.version - 1);
    while remaining >= VERSION_CONTINUE {
        ch.encode_n_bit_unsigned_integer(VERSION_CONTINUE, 4)?;
        remaining -= VERSION_CONTINUE;
    }
    ch.encode_n_bit_unsigned_integer(remaining, 4)?;

    if padding {
        ch.align()?;
    }
    Ok(())
}

/// Reads and checks the header.
///
/// # Errors
///
/// - `InvalidDistinguishingBits` wenn die Bits nicht `10` sind (auch bei
///   einem unvollständigen Cookie)
/// - `UnsupportedHeaderOptions` bei Options im Header
/// - `UnsupportedVersion` für alles außer Final Version 1
/// - `PrematureEndOfStream`
pub fn decode<C: DecoderChannel + ?Sized>(ch: &mut C, padding: bool) -> Result<ExiHeader> {
    let cookie = ch.look_ahead()? == Some(EXI_COOKIE[0]);
    if cookie {
        let bytes = ch.decode_bytes(EXI_COOKIE.len())?;
        if bytes != EXI_COOKIE {
            // '$' = 0b00100100 ist kein gültiger Header-Anfang
            return Err(Error::InvalidDistinguishingBits((EXI_COOKIE[0] >> 6) & 0b11));
        }
    }

    let bits = ch.decode_n_bit_unsigned_integer(2)?;
    if bits != DISTINGUISHING_BITS {
        return Err(Error::InvalidDistinguishingBits(bits as u8));
    }
    let options_present = ch.decode_boolean()?;
    let preview = ch.decode_boolean()?;

    let mut version: u16 = 1;
    loop {
        let chunk = ch.decode_n_bit_unsigned_integer(4)?;
        version = version.saturating_add(chunk as u16);
        if chunk < VERSION_CONTINUE {
            break;
        }
    }
    if preview || version != 1 {
        return Err(Error::UnsupportedVersion);
    }
    if options_present {
        log::warn!("header carries EXI options; only out-of-band options are supported");
        return Err(Error::UnsupportedHeaderOptions);
    }

    if padding {
        ch.align();
    }
    Ok(ExiHeader { cookie, options_present, preview, version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitDecoderChannel, BitEncoderChannel};

    fn encoded(header: &ExiHeader, padding: bool) -> Vec<u8> {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, header, padding).unwrap();
        ch.into_inner().unwrap()
    }

    fn decoded(bytes: &[u8], padding: bool) -> Result<ExiHeader> {
        let mut ch = BitDecoderChannel::new(bytes);
        decode(&mut ch, padding)
    }

    // --- Test 1: Minimaler Header ---
    /// EXI 5: 10 0 0 0000 -> 1000_0000
    #[test]
    fn minimaler_header() {
        assert_eq!(encoded(&ExiHeader::new(), false), [0x80]);
        assert_eq!(decoded(&[0x80], false).unwrap(), ExiHeader::new());
    }

    // --- Test 2: Cookie ---
    /// EXI 5.1
    #[test]
    fn cookie() {
        let header = ExiHeader::new().with_cookie();
        let bytes = encoded(&header, false);
        assert_eq!(bytes, [b'$', b'E', b'X', b'I', 0x80]);
        assert!(decoded(&bytes, false).unwrap().cookie());
    }

    #[test]
    fn kaputter_cookie() {
        assert_eq!(decoded(b"$EXA\x80", false), Err(Error::InvalidDistinguishingBits(0)));
        assert_eq!(decoded(b"$E", false), Err(Error::PrematureEndOfStream));
    }

    // --- Test 3: Distinguishing Bits ---
    /// EXI 5.2
    #[test]
    fn distinguishing_bits() {
        for (byte, bits) in [(0x00, 0b00), (0x40, 0b01), (0xC0, 0b11)] {
            assert_eq!(decoded(&[byte], false), Err(Error::InvalidDistinguishingBits(bits)));
        }
    }

    // --- Test 4: Versionen ---
    /// EXI 5.3: Version 16 = 1111 0000
    #[test]
    fn versions_chunks() {
        // 10 0 0 1111 | 0000
        assert_eq!(encoded(&ExiHeader::new().with_version(16), false), [0x8F, 0x00]);
        assert_eq!(decoded(&[0x8F, 0x00], false), Err(Error::UnsupportedVersion));
        // Version 2
        assert_eq!(decoded(&[0x81], false), Err(Error::UnsupportedVersion));
        assert_eq!(ExiHeader::new().with_version(0).version(), 1);
    }

    #[test]
    fn preview_abgelehnt() {
        let bytes = encoded(&ExiHeader::new().as_preview(), false);
        assert_eq!(bytes, [0x90]);
        assert_eq!(decoded(&bytes, false), Err(Error::UnsupportedVersion));
    }

    #[test]
    fn options_im_header_abgelehnt() {
        let bytes = encoded(&ExiHeader::new().with_options(), false);
        assert_eq!(bytes, [0xA0]);
        assert_eq!(decoded(&bytes, false), Err(Error::UnsupportedHeaderOptions));
    }

    // --- Test 5: Padding ---
    #[test]
    fn padding() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        encode(&mut ch, &ExiHeader::new(), true).unwrap();
        assert!(ch.is_byte_aligned());
        ch.encode_n_bit_unsigned_integer(0b101, 3).unwrap();
        let bytes = ch.into_inner().unwrap();
        assert_eq!(bytes, [0x80, 0b1010_0000]);

        let mut ch = BitDecoderChannel::new(bytes.as_slice());
        decode(&mut ch, true).unwrap();
        assert_eq!(ch.decode_n_bit_unsigned_integer(3).unwrap(), 0b101);
    }

    #[test]
    fn leerer_stream() {
        assert_eq!(decoded(&[], false), Err(Error::PrematureEndOfStream));
        // Abgeschnittene Versions-Fortsetzung
        assert_eq!(decoded(&[0x8F], false), Err(Error::PrematureEndOfStream));
    }
}
