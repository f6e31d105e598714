//! Byte-granular channel (byte-aligned mode and compression sub-channels).
//!
//! Jeder Wert belegt ganze Bytes: n-bit Unsigned Integer als `⌈n/8⌉` Bytes
//! mit dem niederwertigsten Byte zuerst, Booleans als ein Byte. `align()`
//! ist ein No-op, der Kanal ist immer aligniert.

use std::io::{Read, Write};

use crate::bit_width::bytes_for_bits;
use crate::channel::{ByteSource, DecoderChannel, EncoderChannel};
use crate::Result;

#[derive(Debug)]
pub struct ByteEncoderChannel<W: Write> {
    sink: W,
    written: u64,
}

impl<W: Write> ByteEncoderChannel<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }
}

impl ByteEncoderChannel<Vec<u8>> {
    /// Leert den Puffer (Compression: Structure-Channel nach Blockende).
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sink)
    }
}

impl<W: Write> EncoderChannel for ByteEncoderChannel<W> {
    fn encode(&mut self, byte: u8) -> Result<()> {
        self.sink.write_all(&[byte])?;
        self.written += 1;
        Ok(())
    }

    fn encode_n_bit_unsigned_integer(&mut self, value: u64, n: u8) -> Result<()> {
        let len = bytes_for_bits(n);
        let bytes = value.to_le_bytes();
        self.sink.write_all(&bytes[..len])?;
        self.written += len as u64;
        Ok(())
    }

    fn encode_boolean(&mut self, value: bool) -> Result<()> {
        self.encode(u8::from(value))
    }

    fn align(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    fn is_byte_aligned(&self) -> bool {
        true
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn encode_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ByteDecoderChannel<R: Read> {
    source: ByteSource<R>,
}

impl<R: Read> ByteDecoderChannel<R> {
    pub fn new(reader: R) -> Self {
        Self::from_source(ByteSource::new(reader))
    }

    pub fn from_source(source: ByteSource<R>) -> Self {
        Self { source }
    }

    pub fn into_source(self) -> ByteSource<R> {
        self.source
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.source.bytes_consumed()
    }
}

impl<R: Read> DecoderChannel for ByteDecoderChannel<R> {
    fn decode(&mut self) -> Result<u8> {
        self.source.read_byte()
    }

    fn decode_n_bit_unsigned_integer(&mut self, n: u8) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..bytes_for_bits(n) {
            value |= u64::from(self.source.read_byte()?) << (8 * i);
        }
        Ok(value)
    }

    fn decode_boolean(&mut self) -> Result<bool> {
        Ok(self.source.read_byte()? != 0)
    }

    fn align(&mut self) {}

    fn is_byte_aligned(&self) -> bool {
        true
    }

    fn look_ahead(&mut self) -> Result<Option<u8>> {
        self.source.peek()
    }
}
