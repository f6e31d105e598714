//! Bit-granular channel (bit-packed coding mode).
//!
//! EXI packt MSB-first: das erste geschriebene Bit landet in Bit 7 des
//! ersten Bytes. Der Kanal hält höchstens 7 Restbits; sobald ein Byte voll
//! ist, geht es sofort an die Senke.

use std::io::{Read, Write};

use crate::channel::{ByteSource, DecoderChannel, EncoderChannel};
use crate::Result;

/// Maske für die unteren `n` Bits eines Bytes (`n` in 1..=8).
#[inline(always)]
fn low_mask(n: u8) -> u8 {
    if n >= 8 { 0xFF } else { (1u8 << n) - 1 }
}

/// Writes bits MSB-first into an [`io::Write`](std::io::Write) sink.
#[derive(Debug)]
pub struct BitEncoderChannel<W: Write> {
    sink: W,
    /// Restbits, linksbündig.
    buffer: u8,
    /// Freie Bitplätze im Puffer (8 = leer).
    capacity: u8,
    written: u64,
}

impl<W: Write> BitEncoderChannel<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            buffer: 0,
            capacity: 8,
            written: 0,
        }
    }

    #[inline]
    fn emit(&mut self) -> Result<()> {
        self.sink.write_all(&[self.buffer])?;
        self.written += 1;
        self.buffer = 0;
        self.capacity = 8;
        Ok(())
    }

    fn write_bits(&mut self, value: u64, n: u8) -> Result<()> {
        debug_assert!(n <= 64, "bit count must be 0..=64, got {n}");
        if n == 8 && self.capacity == 8 {
            self.buffer = value as u8;
            return self.emit();
        }
        let mut remaining = n;
        while remaining > 0 {
            let take = remaining.min(self.capacity);
            let shift = remaining - take;
            let chunk = ((value >> shift) as u8) & low_mask(take);
            self.buffer |= chunk << (self.capacity - take);
            self.capacity -= take;
            remaining = shift;
            if self.capacity == 0 {
                self.emit()?;
            }
        }
        Ok(())
    }

    /// Aligniert, flusht und gibt die Senke zurück (Wechsel Header → Body).
    pub fn into_inner(mut self) -> Result<W> {
        EncoderChannel::flush(&mut self)?;
        Ok(self.sink)
    }
}

impl<W: Write> EncoderChannel for BitEncoderChannel<W> {
    fn encode(&mut self, byte: u8) -> Result<()> {
        self.write_bits(u64::from(byte), 8)
    }

    fn encode_n_bit_unsigned_integer(&mut self, value: u64, n: u8) -> Result<()> {
        self.write_bits(value, n)
    }

    fn encode_boolean(&mut self, value: bool) -> Result<()> {
        self.write_bits(u64::from(value), 1)
    }

    fn align(&mut self) -> Result<()> {
        if self.capacity < 8 {
            self.emit()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.align()?;
        self.sink.flush()?;
        Ok(())
    }

    fn is_byte_aligned(&self) -> bool {
        self.capacity == 8
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Reads bits MSB-first from a [`ByteSource`].
#[derive(Debug)]
pub struct BitDecoderChannel<R: Read> {
    source: ByteSource<R>,
    buffer: u8,
    /// Noch ungelesene Bits im Puffer (0 = aligniert).
    available: u8,
}

impl<R: Read> BitDecoderChannel<R> {
    pub fn new(reader: R) -> Self {
        Self::from_source(ByteSource::new(reader))
    }

    pub fn from_source(source: ByteSource<R>) -> Self {
        Self {
            source,
            buffer: 0,
            available: 0,
        }
    }

    /// Verwirft Restbits und gibt die Quelle zurück.
    pub fn into_source(self) -> ByteSource<R> {
        self.source
    }

    fn read_bits(&mut self, n: u8) -> Result<u64> {
        debug_assert!(n <= 64, "bit count must be 0..=64, got {n}");
        let mut result = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            if self.available == 0 {
                self.buffer = self.source.read_byte()?;
                self.available = 8;
            }
            let take = remaining.min(self.available);
            let chunk = (self.buffer >> (self.available - take)) & low_mask(take);
            result = (result << take) | u64::from(chunk);
            self.available -= take;
            remaining -= take;
        }
        Ok(result)
    }
}

impl<R: Read> DecoderChannel for BitDecoderChannel<R> {
    fn decode(&mut self) -> Result<u8> {
        if self.available == 0 {
            return self.source.read_byte();
        }
        Ok(self.read_bits(8)? as u8)
    }

    fn decode_n_bit_unsigned_integer(&mut self, n: u8) -> Result<u64> {
        self.read_bits(n)
    }

    fn decode_boolean(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    fn align(&mut self) {
        self.available = 0;
    }

    fn is_byte_aligned(&self) -> bool {
        self.available == 0
    }

    fn look_ahead(&mut self) -> Result<Option<u8>> {
        let Some(next) = self.source.peek()? else {
            return Ok(None);
        };
        if self.available == 0 {
            return Ok(Some(next));
        }
        // Restbits des Puffers, aufgefüllt mit den oberen Bits des nächsten Bytes
        let rest = self.buffer & low_mask(self.available);
        Ok(Some((rest << (8 - self.available)) | (next >> self.available)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn written(f: impl FnOnce(&mut BitEncoderChannel<Vec<u8>>)) -> Vec<u8> {
        let mut ch = BitEncoderChannel::new(Vec::new());
        f(&mut ch);
        ch.into_inner().unwrap()
    }

    // --- Test 1: MSB-first Packing ---

    #[test]
    fn single_bits_msb_first() {
        let data = written(|ch| {
            ch.encode_boolean(true).unwrap();
            ch.encode_boolean(false).unwrap();
            ch.encode_boolean(true).unwrap();
        });
        assert_eq!(data, vec![0b1010_0000]);
    }

    // --- Test 2: Werte über Bytegrenzen ---

    #[test]
    fn values_cross_byte_boundaries() {
        let data = written(|ch| {
            ch.encode_n_bit_unsigned_integer(0b101, 3).unwrap();
            ch.encode_n_bit_unsigned_integer(0x1FF, 9).unwrap();
            ch.encode_n_bit_unsigned_integer(0b1, 4).unwrap();
        });
        // 101 111111111 0001
        assert_eq!(data, vec![0b1011_1111, 0b1111_0001]);

        let mut r = BitDecoderChannel::new(&data[..]);
        assert_eq!(r.decode_n_bit_unsigned_integer(3).unwrap(), 0b101);
        assert_eq!(r.decode_n_bit_unsigned_integer(9).unwrap(), 0x1FF);
        assert_eq!(r.decode_n_bit_unsigned_integer(4).unwrap(), 1);
    }

    // --- Test 3: Byte sofort an Senke ---

    #[test]
    fn full_byte_is_emitted_immediately() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        ch.encode_n_bit_unsigned_integer(0b1111, 4).unwrap();
        assert_eq!(ch.bytes_written(), 0);
        ch.encode_n_bit_unsigned_integer(0b0000, 4).unwrap();
        assert_eq!(ch.bytes_written(), 1);
        assert!(ch.is_byte_aligned());
    }

    // --- Test 4: 0 Bits sind ein No-op ---

    #[test]
    fn zero_width_is_noop() {
        let data = written(|ch| ch.encode_n_bit_unsigned_integer(0, 0).unwrap());
        assert!(data.is_empty());

        let mut r = BitDecoderChannel::new(&[][..]);
        assert_eq!(r.decode_n_bit_unsigned_integer(0).unwrap(), 0);
    }

    // --- Test 5: align() padded mit Nullen, höchstens ein Byte ---

    #[test]
    fn align_pads_with_zeros() {
        let mut ch = BitEncoderChannel::new(Vec::new());
        ch.encode_n_bit_unsigned_integer(0b11, 2).unwrap();
        assert!(!ch.is_byte_aligned());
        ch.align().unwrap();
        assert!(ch.is_byte_aligned());
        assert_eq!(ch.bytes_written(), 1);
        ch.align().unwrap();
        assert_eq!(ch.bytes_written(), 1);
        assert_eq!(ch.into_inner().unwrap(), vec![0b1100_0000]);
    }

    // --- Test 6: 64-Bit Werte ---

    #[test]
    fn sixty_four_bit_values() {
        let data = written(|ch| {
            ch.encode_boolean(true).unwrap();
            ch.encode_n_bit_unsigned_integer(u64::MAX - 5, 64).unwrap();
        });
        assert_eq!(data.len(), 9);
        let mut r = BitDecoderChannel::new(&data[..]);
        assert!(r.decode_boolean().unwrap());
        assert_eq!(r.decode_n_bit_unsigned_integer(64).unwrap(), u64::MAX - 5);
    }

    // --- Test 7: EOF ---

    #[test]
    fn eof_is_premature_end() {
        let data = [0xAB];
        let mut r = BitDecoderChannel::new(&data[..]);
        r.decode_n_bit_unsigned_integer(4).unwrap();
        assert_eq!(
            r.decode_n_bit_unsigned_integer(8).unwrap_err(),
            Error::PrematureEndOfStream
        );
    }

    // --- Test 8: Decoder-Align und Lookahead ---

    #[test]
    fn decoder_align_skips_rest_of_byte() {
        let data = [0b1000_0000, 0x42];
        let mut r = BitDecoderChannel::new(&data[..]);
        assert!(r.decode_boolean().unwrap());
        r.align();
        assert!(r.is_byte_aligned());
        assert_eq!(r.look_ahead().unwrap(), Some(0x42));
        assert_eq!(r.decode().unwrap(), 0x42);
        assert_eq!(r.look_ahead().unwrap(), None);
    }

    // --- Test 9: Lookahead mitten im Byte ---

    #[test]
    fn look_ahead_reads_across_buffered_bits() {
        // 101 | 1001 0110 | 0 0000
        let data = [0b1011_0010, 0b1100_0000];
        let mut r = BitDecoderChannel::new(&data[..]);
        assert_eq!(r.decode_n_bit_unsigned_integer(3).unwrap(), 0b101);
        assert_eq!(r.look_ahead().unwrap(), Some(0b1001_0110));
        // Lookahead konsumiert nichts
        assert_eq!(r.decode_n_bit_unsigned_integer(8).unwrap(), 0b1001_0110);
        assert!(!r.decode_boolean().unwrap());
        // nur noch 4 Bits übrig
        assert_eq!(r.look_ahead().unwrap(), None);
    }
}
