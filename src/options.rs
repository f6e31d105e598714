//! Coding options (EXI 5.4, Table 5-1).
//!
//! Options are read-only inputs for the lifetime of one document and are
//! always supplied out of band; the header never carries them.
//!
//! # Beispiel
//!
//! ```
//! use exi_codec::options::{Alignment, ExiOptions, Preserve};
//!
//! let opts = ExiOptions::default()
//!     .with_alignment(Alignment::ByteAlignment)
//!     .with_preserve(Preserve { comments: true, ..Preserve::default() })
//!     .with_value_max_length(1024);
//!
//! assert_eq!(opts.alignment(), Alignment::ByteAlignment);
//! assert!(opts.preserve().comments);
//! assert_eq!(opts.value_max_length(), Some(1024));
//! assert!(opts.validate().is_ok());
//! ```

use crate::{Error, Result};

/// Alignment of event codes and content items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Bits werden ohne Padding gepackt (Default).
    #[default]
    BitPacked,
    /// Jeder Wert belegt ganze Bytes.
    ByteAlignment,
    /// Block- und Channel-Layout der Compression, aber ohne DEFLATE.
    PreCompression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaId {
    /// Explizit schema-los.
    None,
    /// Nur eingebaute Typen.
    BuiltinOnly,
    Id(String),
}

/// Fidelity options: which optional information items survive the round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preserve {
    pub comments: bool,
    pub pis: bool,
    /// DT und ER Events.
    pub dtd: bool,
    /// NS Events und Prefixe von QNames.
    pub prefixes: bool,
    /// Alle Werte laufen als String durch die Value-Partitionen.
    pub lexical_values: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExiOptions {
    pub(crate) alignment: Alignment,
    pub(crate) compression: bool,
    pub(crate) strict: bool,
    pub(crate) fragment: bool,
    pub(crate) preserve: Preserve,
    pub(crate) self_contained: bool,
    pub(crate) schema_id: Option<SchemaId>,
    pub(crate) block_size: u32,
    pub(crate) value_max_length: Option<u32>,
    pub(crate) value_partition_capacity: Option<u32>,
}

impl Default for ExiOptions {
    fn default() -> Self {
        Self {
            alignment: Alignment::BitPacked,
            compression: false,
            strict: false,
            fragment: false,
            preserve: Preserve::default(),
            self_contained: false,
            schema_id: None,
            block_size: 1_000_000,
            value_max_length: None,
            value_partition_capacity: None,
        }
    }
}

impl ExiOptions {
    // --- Getter ---

    pub fn alignment(&self) -> Alignment { self.alignment }
    pub fn compression(&self) -> bool { self.compression }
    pub fn strict(&self) -> bool { self.strict }
    pub fn fragment(&self) -> bool { self.fragment }
    pub fn preserve(&self) -> &Preserve { &self.preserve }
    pub fn self_contained(&self) -> bool { self.self_contained }
    pub fn schema_id(&self) -> Option<&SchemaId> { self.schema_id.as_ref() }
    /// Anzahl Werte pro Compression-Block (EXI 9.1).
    pub fn block_size(&self) -> u32 { self.block_size }
    pub fn value_max_length(&self) -> Option<u32> { self.value_max_length }
    pub fn value_partition_capacity(&self) -> Option<u32> { self.value_partition_capacity }

    // --- Builder-Setter ---

    pub fn with_alignment(mut self, alignment: Alignment) -> Self { self.alignment = alignment; self }
    pub fn with_compression(mut self) -> Self { self.compression = true; self }
    pub fn with_strict(mut self) -> Self { self.strict = true; self }
    pub fn with_fragment(mut self) -> Self { self.fragment = true; self }
    pub fn with_preserve(mut self, preserve: Preserve) -> Self { self.preserve = preserve; self }
    pub fn with_self_contained(mut self) -> Self { self.self_contained = true; self }
    pub fn with_schema_id(mut self, schema_id: SchemaId) -> Self { self.schema_id = Some(schema_id); self }
    pub fn with_block_size(mut self, size: u32) -> Self { self.block_size = size; self }
    pub fn with_value_max_length(mut self, len: u32) -> Self { self.value_max_length = Some(len); self }
    pub fn with_value_partition_capacity(mut self, cap: u32) -> Self { self.value_partition_capacity = Some(cap); self }

    // --- Mutable Setter ---

    pub fn set_alignment(&mut self, alignment: Alignment) { self.alignment = alignment; }
    pub fn set_compression(&mut self, val: bool) { self.compression = val; }
    pub fn set_strict(&mut self, val: bool) { self.strict = val; }
    pub fn set_fragment(&mut self, val: bool) { self.fragment = val; }
    pub fn set_preserve(&mut self, preserve: Preserve) { self.preserve = preserve; }
    pub fn set_self_contained(&mut self, val: bool) { self.self_contained = val; }
    pub fn set_schema_id(&mut self, schema_id: Option<SchemaId>) { self.schema_id = schema_id; }
    pub fn set_block_size(&mut self, size: u32) { self.block_size = size; }
    pub fn set_value_max_length(&mut self, len: Option<u32>) { self.value_max_length = len; }
    pub fn set_value_partition_capacity(&mut self, cap: Option<u32>) { self.value_partition_capacity = cap; }

    /// Validates the option combination (EXI 5.4).
    ///
    /// # Errors
    ///
    /// - `InvalidBlockSize` for a block size of zero
    /// - `InvalidOptionCombination` for an empty schema id, compression with a
    ///   non-bit-packed alignment, strict together with any fidelity flag other
    ///   than lexical values or with self-contained, and self-contained together
    ///   with compression or pre-compression
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            log::warn!("rejecting options: block size 0");
            return Err(Error::InvalidBlockSize);
        }

        if matches!(self.schema_id, Some(SchemaId::Id(ref id)) if id.is_empty()) {
            log::warn!("rejecting options: empty schema id");
            return Err(Error::InvalidOptionCombination);
        }

        if self.compression && self.alignment != Alignment::BitPacked {
            log::warn!("rejecting options: compression with {:?}", self.alignment);
            return Err(Error::InvalidOptionCombination);
        }

        let incompatible_with_strict = self.preserve.comments
            || self.preserve.pis
            || self.preserve.dtd
            || self.preserve.prefixes
            || self.self_contained;
        if self.strict && incompatible_with_strict {
            log::warn!("rejecting options: strict with fidelity flags {:?}", self.preserve);
            return Err(Error::InvalidOptionCombination);
        }

        if self.self_contained && (self.compression || self.alignment == Alignment::PreCompression) {
            log::warn!("rejecting options: self-contained with compression layout");
            return Err(Error::InvalidOptionCombination);
        }

        Ok(())
    }

    /// Compression nutzt intern das Pre-Compression-Layout plus DEFLATE.
    pub fn effective_alignment(&self) -> Alignment {
        if self.compression {
            Alignment::PreCompression
        } else {
            self.alignment
        }
    }

    /// Block-/Channel-Layout aktiv (Compression oder Pre-Compression).
    pub fn uses_blocks(&self) -> bool {
        self.effective_alignment() == Alignment::PreCompression
    }
}
