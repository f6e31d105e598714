//! Block reader for pre-compression and compression (EXI 9).
//!
//! Pre-compression liest alle Streams direkt hintereinander aus einem Kanal.
//! Mit Compression ist jeder Stream ein eigener DEFLATE-Stream; der nächste
//! wird erst aufgeblasen, wenn der Decoder ihn braucht.

use std::io::Cursor;

use flate2::Decompress;

use crate::bytestream::ByteDecoderChannel;
use crate::compression::deflate_decompress_reuse;
use crate::{Error, Result};

pub(super) struct BlockReader {
    data: Vec<u8>,
    offset: usize,
    decompressor: Option<Decompress>,
    current: ByteDecoderChannel<Cursor<Vec<u8>>>,
    streams_read: usize,
}

impl BlockReader {
    /// `data` ist der Body nach dem (gepaddeten) Header.
    pub(super) fn new(data: Vec<u8>, deflate: bool) -> Self {
        if deflate {
            Self {
                data,
                offset: 0,
                decompressor: Some(Decompress::new(false)),
                current: ByteDecoderChannel::new(Cursor::new(Vec::new())),
                streams_read: 0,
            }
        } else {
            Self {
                current: ByteDecoderChannel::new(Cursor::new(data)),
                data: Vec::new(),
                offset: 0,
                decompressor: None,
                streams_read: 0,
            }
        }
    }

    pub(super) fn channel(&mut self) -> &mut ByteDecoderChannel<Cursor<Vec<u8>>> {
        &mut self.current
    }

    /// Wechselt zum nächsten Stream. Ohne DEFLATE liegen die Streams schon
    /// hintereinander im Kanal.
    pub(super) fn next_stream(&mut self) -> Result<()> {
        let Some(decompressor) = self.decompressor.as_mut() else {
            return Ok(());
        };
        if self.offset >= self.data.len() {
            return Err(Error::PrematureEndOfStream);
        }
        let (inflated, used) = deflate_decompress_reuse(&self.data[self.offset..], decompressor)?;
        self.offset += used;
        self.streams_read += 1;
        log::trace!("stream {} inflated: {used} -> {} bytes", self.streams_read, inflated.len());
        self.current = ByteDecoderChannel::new(Cursor::new(inflated));
        Ok(())
    }
}
