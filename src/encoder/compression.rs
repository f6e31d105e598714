//! Block writer for pre-compression and compression (EXI 9).
//!
//! Der Structure Channel läuft byte-aligned mit; Values werden pro QName
//! gesammelt. Beim Schließen eines Blocks (nach `block_size` Values oder bei
//! ED) werden die Channels in Stream-Reihenfolge codiert, damit die
//! String-Table-Einträge auf beiden Seiten in derselben Reihenfolge entstehen.

use std::io::Write;

use crate::bytestream::ByteEncoderChannel;
use crate::compression::{Block, StreamPart, write_streams};
use crate::context::CodingContext;
use crate::datatype::{Datatype, TypedValue, ValueCoder, encode_typed};
use crate::qname::QNameId;
use crate::{Error, FastHashMap, Result};

/// Aufgeschobener Value: Datentyp plus geparster Wert.
#[derive(Debug)]
pub(super) struct PendingValue {
    datatype: Datatype,
    value: TypedValue,
}

pub(super) struct BlockWriter<W: Write> {
    sink: W,
    structure: ByteEncoderChannel<Vec<u8>>,
    block: Block<PendingValue>,
    deflate: bool,
    block_size: u32,
    blocks_written: usize,
}

impl<W: Write> BlockWriter<W> {
    pub(super) fn new(sink: W, deflate: bool, block_size: u32) -> Self {
        Self {
            sink,
            structure: ByteEncoderChannel::new(Vec::new()),
            block: Block::new(),
            deflate,
            block_size,
            blocks_written: 0,
        }
    }

    pub(super) fn structure(&mut self) -> &mut ByteEncoderChannel<Vec<u8>> {
        &mut self.structure
    }

    pub(super) fn push_value(&mut self, owner: QNameId, datatype: Datatype, value: TypedValue) {
        self.block.push_value(owner, PendingValue { datatype, value });
    }

    pub(super) fn is_full(&self) -> bool {
        self.block.is_full(self.block_size)
    }

    /// Codes the pending channels and writes the block's streams to the sink.
    pub(super) fn close_block(&mut self, ctx: &mut CodingContext, preserve_prefixes: bool) -> Result<()> {
        let structure = self.structure.take_buffer();
        let block = std::mem::take(&mut self.block);
        let plan = block.plan();
        let total = block.total_values();
        let channels = block.into_channels();

        let mut encoded: FastHashMap<QNameId, Vec<u8>> = FastHashMap::default();
        for part in plan.iter().flatten() {
            let StreamPart::Channel(owner) = *part else { continue };
            let mut ch = ByteEncoderChannel::new(Vec::new());
            let mut coder = ValueCoder {
                names: &mut ctx.names,
                values: &mut ctx.values,
                context: owner,
                preserve_prefixes,
            };
            for pending in channels.get(&owner).into_iter().flatten() {
                encode_typed(&mut ch, &pending.datatype, &pending.value, &mut coder)?;
            }
            encoded.insert(owner, ch.into_inner());
        }

        let mut out = Vec::with_capacity(structure.len() + encoded.values().map(Vec::len).sum::<usize>());
        let structure = structure.as_slice();
        let encoded = &encoded;
        write_streams(&mut out, &plan, self.deflate, move |part| match part {
            StreamPart::Structure => Ok(structure),
            StreamPart::Channel(owner) => encoded
                .get(&owner)
                .map(Vec::as_slice)
                .ok_or_else(|| Error::CompressionError(format!("no data for channel {}", owner.0))),
        })?;
        self.sink.write_all(&out)?;
        self.blocks_written += 1;
        log::debug!(
            "block {} closed: {} values in {} channels, {} streams, {} bytes",
            self.blocks_written,
            total,
            channels.len(),
            plan.len(),
            out.len()
        );
        Ok(())
    }

    pub(super) fn into_inner(mut self) -> Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}
