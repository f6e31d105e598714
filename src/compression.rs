//! Blocks, channels and compressed streams (EXI 9).
//!
//! ```text
//! Events → [Block 1] → [Block 2] → ... → [Block N]
//!            ↓
//!          [Structure Channel] + [Value Channels je QName]
//!            ↓
//!          [Streams] (kombiniert oder einzeln, je nach Value-Anzahl)
//!            ↓
//!          [DEFLATE] (compression) oder [direkt] (pre-compression)
//! ```
//!
//! Der Structure Channel enthält Event Codes und alle Inhalte außer AT/CH
//! Values; xsi:type und xsi:nil bleiben im Structure Channel. Value Channels
//! werden in der Reihenfolge ihres ersten Auftretens geführt.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::qname::QNameId;
use crate::{Error, FastIndexMap, Result};

/// Grenze zwischen kleinen und großen Channels (EXI 9.3).
pub const SMALL_CHANNEL_VALUES: usize = 100;

/// One block: structure bytes plus deferred values per channel.
///
/// `V` ist die aufgeschobene Repräsentation eines Values: der Encoder
/// sammelt hier Werte, die erst beim Schließen des Blocks in Channel-
/// Reihenfolge codiert werden, der Decoder die Platzhalter zum Auffüllen.
#[derive(Debug)]
pub struct Block<V> {
    structure: Vec<u8>,
    channels: FastIndexMap<QNameId, Vec<V>>,
    total_values: usize,
}

impl<V> Default for Block<V> {
    fn default() -> Self {
        Self { structure: Vec::new(), channels: FastIndexMap::default(), total_values: 0 }
    }
}

impl<V> Block<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn structure(&self) -> &[u8] {
        &self.structure
    }

    pub fn structure_mut(&mut self) -> &mut Vec<u8> {
        &mut self.structure
    }

    pub fn push_value(&mut self, channel: QNameId, value: V) {
        self.channels.entry(channel).or_default().push(value);
        self.total_values += 1;
    }

    pub fn total_values(&self) -> usize {
        self.total_values
    }

    /// Block voll: weitere Values gehören in den nächsten Block.
    pub fn is_full(&self, block_size: u32) -> bool {
        self.total_values >= block_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty() && self.total_values == 0
    }

    /// (Channel, Anzahl Values) in Reihenfolge des ersten Auftretens.
    pub fn channel_counts(&self) -> Vec<(QNameId, usize)> {
        self.channels.iter().map(|(k, v)| (*k, v.len())).collect()
    }

    pub fn channel(&self, qname: QNameId) -> Option<&[V]> {
        self.channels.get(&qname).map(Vec::as_slice)
    }

    pub fn channel_mut(&mut self, qname: QNameId) -> Option<&mut Vec<V>> {
        self.channels.get_mut(&qname)
    }

    /// Channels in Stream-Reihenfolge, siehe [`stream_plan`].
    pub fn plan(&self) -> Vec<Vec<StreamPart>> {
        stream_plan(&self.channel_counts(), self.total_values)
    }

    pub fn into_channels(self) -> FastIndexMap<QNameId, Vec<V>> {
        self.channels
    }
}

/// Inhalt eines Streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPart {
    Structure,
    Channel(QNameId),
}

/// Stream layout of one block (EXI 9.3).
///
/// - ≤ 100 Values: ein Stream (Structure, dann alle Channels)
/// - sonst: Structure allein, dann alle Channels mit ≤ 100 Values
///   kombiniert, dann je ein Stream pro größerem Channel
///
/// Die Reihenfolge der Channels ist zugleich die Reihenfolge, in der ihre
/// Values codiert werden (und damit die der String-Table-Einträge).
pub fn stream_plan(counts: &[(QNameId, usize)], total_values: usize) -> Vec<Vec<StreamPart>> {
    if total_values <= SMALL_CHANNEL_VALUES {
        let mut single = vec![StreamPart::Structure];
        single.extend(counts.iter().map(|(q, _)| StreamPart::Channel(*q)));
        return vec![single];
    }
    let mut streams = vec![vec![StreamPart::Structure]];
    let small: Vec<StreamPart> = counts
        .iter()
        .filter(|(_, n)| *n <= SMALL_CHANNEL_VALUES)
        .map(|(q, _)| StreamPart::Channel(*q))
        .collect();
    if !small.is_empty() {
        streams.push(small);
    }
    streams.extend(
        counts
            .iter()
            .filter(|(_, n)| *n > SMALL_CHANNEL_VALUES)
            .map(|(q, _)| vec![StreamPart::Channel(*q)]),
    );
    streams
}

/// Compresses `data` as one raw DEFLATE stream (RFC 1951).
pub fn deflate_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut compressor = Compress::new(Compression::default(), false);
    deflate_compress_reuse(data, &mut compressor)
}

/// Wie [`deflate_compress`], mit wiederverwendeter Compress-Instanz.
pub fn deflate_compress_reuse(data: &[u8], compressor: &mut Compress) -> Result<Vec<u8>> {
    compressor.reset();
    let mut output = Vec::with_capacity(data.len() / 2 + 64);
    let mut offset = 0;
    loop {
        let mut out_buf = [0u8; 8192];
        let before_in = compressor.total_in() as usize;
        let before_out = compressor.total_out() as usize;
        let flush = if offset >= data.len() { FlushCompress::Finish } else { FlushCompress::None };

        let status = compressor
            .compress(&data[offset..], &mut out_buf, flush)
            .map_err(|e| Error::CompressionError(format!("DEFLATE compress failed: {e}")))?;

        let consumed = (compressor.total_in() as usize).saturating_sub(before_in);
        let produced = (compressor.total_out() as usize).saturating_sub(before_out);
        offset += consumed;
        output.extend_from_slice(&out_buf[..produced]);

        match status {
            Status::StreamEnd => return Ok(output),
            Status::Ok | Status::BufError => {
                if consumed == 0 && produced == 0 && offset >= data.len() {
                    return Err(Error::CompressionError(
                        "DEFLATE compress stalled without StreamEnd".into(),
                    ));
                }
            }
        }
    }
}

/// Inflates the DEFLATE stream at the start of `data`.
///
/// Gibt `(daten, gelesene_bytes)` zurück; dahinter beginnt der nächste Stream.
pub fn deflate_decompress_stream(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut decompressor = Decompress::new(false);
    deflate_decompress_reuse(data, &mut decompressor)
}

pub fn deflate_decompress_reuse(data: &[u8], decompressor: &mut Decompress) -> Result<(Vec<u8>, usize)> {
    decompressor.reset(false);
    let mut result = Vec::new();
    let mut offset = 0usize;
    loop {
        let mut out_buf = [0u8; 8192];
        let before_in = decompressor.total_in() as usize;
        let before_out = decompressor.total_out() as usize;
        let flush = if offset >= data.len() { FlushDecompress::Finish } else { FlushDecompress::None };

        let status = decompressor
            .decompress(&data[offset..], &mut out_buf, flush)
            .map_err(|e| Error::DecompressionError(format!("DEFLATE decompression failed: {e}")))?;

        let consumed = (decompressor.total_in() as usize).saturating_sub(before_in);
        let produced = (decompressor.total_out() as usize).saturating_sub(before_out);
        offset += consumed;
        result.extend_from_slice(&out_buf[..produced]);

        match status {
            Status::StreamEnd => return Ok((result, offset)),
            Status::Ok | Status::BufError => {
                if consumed == 0 && produced == 0 {
                    return Err(Error::DecompressionError("truncated DEFLATE stream".into()));
                }
            }
        }
    }
}

/// Writes the streams of one block to `out`.
///
/// `part` liefert die Bytes eines Stream-Teils. Bei `deflate` wird jeder
/// Stream einzeln komprimiert, sonst (pre-compression) werden die Teile
/// direkt aneinandergehängt.
pub fn write_streams<'a, F>(
    out: &mut Vec<u8>,
    plan: &[Vec<StreamPart>],
    deflate: bool,
    mut part: F,
) -> Result<()>
where
    F: FnMut(StreamPart) -> Result<&'a [u8]>,
{
    let mut compressor = deflate.then(|| Compress::new(Compression::default(), false));
    for stream in plan {
        let mut data = Vec::new();
        for p in stream {
            data.extend_from_slice(part(*p)?);
        }
        match compressor.as_mut() {
            Some(c) => out.extend_from_slice(&deflate_compress_reuse(&data, c)?),
            None => out.extend_from_slice(&data),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: u32) -> QNameId {
        QNameId(n)
    }

    // --- Test 1: Block sammelt in Reihenfolge des ersten Auftretens ---
    #[test]
    fn block_channel_reihenfolge() {
        let mut block: Block<&str> = Block::new();
        block.push_value(q(7), "a");
        block.push_value(q(3), "b");
        block.push_value(q(7), "c");
        assert_eq!(block.channel_counts(), [(q(7), 2), (q(3), 1)]);
        assert_eq!(block.channel(q(7)), Some(&["a", "c"][..]));
        assert!(block.is_full(3));
        assert!(!block.is_full(4));
    }

    // --- Test 2: Stream-Layout (EXI 9.3) ---
    #[test]
    fn ein_stream_bis_100_values() {
        let plan = stream_plan(&[(q(1), 60), (q(2), 40)], 100);
        assert_eq!(
            plan,
            [vec![StreamPart::Structure, StreamPart::Channel(q(1)), StreamPart::Channel(q(2))]]
        );
    }

    #[test]
    fn getrennte_streams_ab_101_values() {
        let plan = stream_plan(&[(q(1), 150), (q(2), 3), (q(3), 101), (q(4), 100)], 354);
        assert_eq!(
            plan,
            [
                vec![StreamPart::Structure],
                vec![StreamPart::Channel(q(2)), StreamPart::Channel(q(4))],
                vec![StreamPart::Channel(q(1))],
                vec![StreamPart::Channel(q(3))],
            ]
        );
        // Nur große Channels: kein kombinierter Stream
        let plan = stream_plan(&[(q(1), 200)], 200);
        assert_eq!(plan.len(), 2);
    }

    // --- Test 3: DEFLATE ---
    #[test]
    fn deflate_hintereinander() {
        let first = deflate_compress(b"structure structure structure").unwrap();
        let second = deflate_compress(b"").unwrap();
        let mut data = first.clone();
        data.extend_from_slice(&second);
        data.push(0xAB);

        let (a, used) = deflate_decompress_stream(&data).unwrap();
        assert_eq!(a, b"structure structure structure");
        assert_eq!(used, first.len());
        let (b, used2) = deflate_decompress_stream(&data[used..]).unwrap();
        assert!(b.is_empty());
        assert_eq!(data[used + used2], 0xAB);
    }

    #[test]
    fn deflate_abgeschnitten() {
        let data = deflate_compress(&[42u8; 1000]).unwrap();
        let err = deflate_decompress_stream(&data[..data.len() / 2]).unwrap_err();
        assert!(matches!(err, Error::DecompressionError(_)));
    }

    #[test]
    fn streams_schreiben() {
        let plan = stream_plan(&[(q(1), 1)], 1);
        let mut raw = Vec::new();
        write_streams(&mut raw, &plan, false, |p| {
            Ok(match p {
                StreamPart::Structure => &b"S"[..],
                StreamPart::Channel(_) => &b"V"[..],
            })
        })
        .unwrap();
        assert_eq!(raw, b"SV");

        let mut packed = Vec::new();
        write_streams(&mut packed, &plan, true, |_| Ok(&b"xyz"[..])).unwrap();
        let (data, used) = deflate_decompress_stream(&packed).unwrap();
        assert_eq!(data, b"xyzxyz");
        assert_eq!(used, packed.len());
    }
}
