//! Channel contract shared by the bit- and byte-granular flavours.
//!
//! Ein Kanal kennt nur vier Primitive (Byte, n-bit Unsigned, Boolean,
//! Alignment). Alle abgeleiteten Codecs (Unsigned/Signed Integer, String,
//! Float, Decimal, DateTime, Binary) sind Default-Methoden, die über diese
//! Primitive laufen. Dadurch ergibt derselbe Codec im Byte-Kanal automatisch
//! die byte-alignierte Darstellung (EXI 7.1.9).

use std::io::Read;

use crate::datetime::DateTime;
use crate::decimal::Decimal;
use crate::float::Float;
use crate::{Result, binary, datetime, decimal, float, integer, string, unsigned_integer};

/// Write side of a channel.
pub trait EncoderChannel {
    /// Schreibt ein ganzes Byte (8 Bits im Bit-Kanal).
    fn encode(&mut self, byte: u8) -> Result<()>;

    /// Schreibt `value` mit `n` Bits (Byte-Kanal: `⌈n/8⌉` Bytes, LSB zuerst).
    fn encode_n_bit_unsigned_integer(&mut self, value: u64, n: u8) -> Result<()>;

    fn encode_boolean(&mut self, value: bool) -> Result<()>;

    /// Füllt Restbits mit Nullen auf und gibt das Byte an die Senke.
    fn align(&mut self) -> Result<()>;

    /// `align()` plus Flush der Senke.
    fn flush(&mut self) -> Result<()>;

    fn is_byte_aligned(&self) -> bool;

    /// Vollständig an die Senke übergebene Bytes.
    fn bytes_written(&self) -> u64;

    fn encode_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.encode(b)?;
        }
        Ok(())
    }

    fn encode_unsigned_integer(&mut self, value: u64) -> Result<()> {
        unsigned_integer::encode(self, value)
    }

    fn encode_integer(&mut self, value: i64) -> Result<()> {
        integer::encode(self, value)
    }

    fn encode_string(&mut self, value: &str) -> Result<()> {
        string::encode(self, value)
    }

    fn encode_float(&mut self, value: Float) -> Result<()> {
        float::encode(self, value)
    }

    fn encode_decimal(&mut self, value: &Decimal) -> Result<()> {
        decimal::encode(self, value)
    }

    fn encode_date_time(&mut self, value: &DateTime) -> Result<()> {
        datetime::encode(self, value)
    }

    fn encode_binary(&mut self, value: &[u8]) -> Result<()> {
        binary::encode(self, value)
    }
}

/// Read side of a channel.
pub trait DecoderChannel {
    fn decode(&mut self) -> Result<u8>;

    fn decode_n_bit_unsigned_integer(&mut self, n: u8) -> Result<u64>;

    fn decode_boolean(&mut self) -> Result<bool>;

    /// Verwirft ungelesene Restbits des aktuellen Bytes.
    fn align(&mut self);

    fn is_byte_aligned(&self) -> bool;

    /// Die nächsten 8 Bits, ohne sie zu konsumieren. `None`, wenn weniger
    /// als 8 Bits übrig sind.
    fn look_ahead(&mut self) -> Result<Option<u8>>;

    fn decode_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(self.decode()?);
        }
        Ok(out)
    }

    fn decode_unsigned_integer(&mut self) -> Result<u64> {
        unsigned_integer::decode(self)
    }

    fn decode_integer(&mut self) -> Result<i64> {
        integer::decode(self)
    }

    fn decode_string(&mut self) -> Result<String> {
        string::decode(self)
    }

    /// String-Literal bekannter Länge (Value/Local-Name Miss).
    fn decode_string_of_length(&mut self, len: usize) -> Result<String> {
        string::decode_chars(self, len)
    }

    fn decode_float(&mut self) -> Result<Float> {
        float::decode(self)
    }

    fn decode_decimal(&mut self) -> Result<Decimal> {
        decimal::decode(self)
    }

    fn decode_date_time(&mut self, kind: datetime::DateTimeKind) -> Result<DateTime> {
        datetime::decode(self, kind)
    }

    fn decode_binary(&mut self) -> Result<Vec<u8>> {
        binary::decode(self)
    }
}

/// Byte source with a one-byte lookahead.
///
/// Wird zwischen Header-Kanal und Body-Kanal weitergereicht, damit ein
/// gepeektes Byte beim Wechsel des Kanals nicht verloren geht.
#[derive(Debug)]
pub struct ByteSource<R> {
    inner: R,
    peeked: Option<u8>,
    consumed: u64,
}

impl<R: Read> ByteSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            consumed: 0,
        }
    }

    /// Liest genau ein Byte; Ende der Quelle ist `PrematureEndOfStream`.
    pub fn read_byte(&mut self) -> Result<u8> {
        if let Some(b) = self.peeked.take() {
            self.consumed += 1;
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        self.consumed += 1;
        Ok(buf[0])
    }

    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            let mut buf = [0u8; 1];
            loop {
                match self.inner.read(&mut buf) {
                    Ok(0) => return Ok(None),
                    Ok(_) => {
                        self.peeked = Some(buf[0]);
                        break;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(self.peeked)
    }

    /// Restliche Bytes (Compression-Modus dekomprimiert blockweise aus dem Puffer).
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if let Some(b) = self.peeked.take() {
            out.push(b);
        }
        self.inner.read_to_end(&mut out)?;
        self.consumed += out.len() as u64;
        Ok(out)
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }
}
