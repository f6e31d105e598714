//! Value content: direkt in den Kanal oder aufgeschoben in den Block.

use std::io::Write;

use super::{Encoder, Output};
use crate::datatype::{Datatype, TypedValue, ValueCoder, encode_typed};
use crate::qname::QNameId;
use crate::Result;

impl<W: Write> Encoder<W> {
    /// Writes one AT/CH value under context `owner`.
    ///
    /// Mit Blöcken wird der Wert im Channel von `owner` gepuffert und erst
    /// beim Schließen des Blocks codiert (EXI 9.2).
    pub(super) fn write_value(&mut self, owner: QNameId, datatype: Datatype, value: TypedValue) -> Result<()> {
        match &mut self.out {
            Output::Blocks(blocks) => {
                blocks.push_value(owner, datatype, value);
                Ok(())
            }
            Output::Bit(_) | Output::Byte(_) => self.write_structure_value(owner, &datatype, &value),
        }
    }

    /// Schreibt einen Wert in den Structure Channel (xsi:type, xsi:nil).
    pub(super) fn write_structure_value(
        &mut self,
        owner: QNameId,
        datatype: &Datatype,
        value: &TypedValue,
    ) -> Result<()> {
        let mut coder = ValueCoder {
            names: &mut self.ctx.names,
            values: &mut self.ctx.values,
            context: owner,
            preserve_prefixes: self.options.preserve().prefixes,
        };
        encode_typed(self.out.structure(), datatype, value, &mut coder)
    }

    /// Schließt den Block, sobald er `block_size` Values enthält.
    pub(super) fn close_full_block(&mut self) -> Result<()> {
        if let Output::Blocks(blocks) = &mut self.out
            && blocks.is_full()
        {
            blocks.close_block(&mut self.ctx, self.options.preserve().prefixes)?;
        }
        Ok(())
    }
}
