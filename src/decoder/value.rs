//! Value content: direkt aus dem Kanal oder als Platzhalter im Block.

use std::io::Read;
use std::sync::Arc;

use super::{DeferredValue, Decoder, Input};
use crate::compression::StreamPart;
use crate::datatype::{Datatype, TypedValue, ValueCoder, decode_typed};
use crate::event::ExiEvent;
use crate::qname::QNameId;
use crate::{Error, Result};

impl<R: Read> Decoder<R> {
    /// Reads one AT/CH value under context `owner`.
    ///
    /// Mit Blöcken steht der Wert erst nach dem Structure Channel fest; dann
    /// wird ein Platzhalter für das als Nächstes gestagte Event vermerkt und
    /// `None` zurückgegeben.
    pub(super) fn read_value(&mut self, owner: QNameId, datatype: Datatype) -> Result<Option<Arc<str>>> {
        if matches!(self.input, Input::Blocks(_)) {
            let event = self.staged.len();
            self.block.push_value(owner, DeferredValue { event, datatype });
            return Ok(None);
        }
        let typed = self.read_structure_value(owner, &datatype)?;
        Ok(Some(datatype.format(&typed)?.into()))
    }

    /// Liest einen Wert aus dem Structure Channel (xsi:type, xsi:nil).
    pub(super) fn read_structure_value(&mut self, owner: QNameId, datatype: &Datatype) -> Result<TypedValue> {
        let mut coder = ValueCoder {
            names: &mut self.ctx.names,
            values: &mut self.ctx.values,
            context: owner,
            preserve_prefixes: self.options.preserve().prefixes,
        };
        decode_typed(self.input.structure(), datatype, &mut coder)
    }

    /// Value pass of a block: channels in stream order, each stream after
    /// the first from its own DEFLATE stream.
    pub(super) fn read_block_values(&mut self) -> Result<()> {
        let block = std::mem::take(&mut self.block);
        let Input::Blocks(blocks) = &mut self.input else {
            return Ok(());
        };
        let plan = block.plan();
        let preserve_prefixes = self.options.preserve().prefixes;
        for (i, stream) in plan.iter().enumerate() {
            if i > 0 {
                blocks.next_stream()?;
            }
            for part in stream {
                let StreamPart::Channel(owner) = *part else { continue };
                let mut coder = ValueCoder {
                    names: &mut self.ctx.names,
                    values: &mut self.ctx.values,
                    context: owner,
                    preserve_prefixes,
                };
                for deferred in block.channel(owner).into_iter().flatten() {
                    let typed = decode_typed(blocks.channel(), &deferred.datatype, &mut coder)?;
                    let lexical: Arc<str> = deferred.datatype.format(&typed)?.into();
                    match self.staged.get_mut(deferred.event) {
                        Some((_, ExiEvent::Attribute(at))) => at.value = lexical,
                        Some((_, ExiEvent::Characters(ch))) => ch.value = lexical,
                        _ => {
                            return Err(Error::DecompressionError(format!(
                                "value of channel {} has no event",
                                owner.0
                            )));
                        }
                    }
                }
            }
        }
        log::debug!("block read: {} values in {} streams", block.total_values(), plan.len());
        Ok(())
    }
}
