//! Value partitions of the string table (EXI 7.3.3).
//!
//! Jeder Wert landet beim ersten Auftreten in der lokalen Partition seines
//! QName-Kontexts und in der globalen Partition. Treffer werden als kleiner
//! Index codiert:
//!
//! | Fall | Wire |
//! |---|---|
//! | Local Hit | `0`, n-bit Index, n = ⌈log₂(lokale Größe)⌉ |
//! | Global Hit | `1`, n-bit Index, n = ⌈log₂(globale Größe)⌉ |
//! | Miss | Länge + 2, Literal |
//!
//! Mit `valuePartitionCapacity` wird die globale Partition ein Ringpuffer:
//! Der Slot unter dem Zeiger wird vor dem Überschreiben aus Lookup, globaler
//! und lokaler Partition entfernt. Lokale Partitionen behalten dabei Löcher.
//!
//! Lifecycle: eine Tabelle pro Dokument, nie zwischen Dokumenten geteilt.

use std::sync::Arc;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::qname::QNameId;
use crate::{Error, FastHashMap, Result, bit_width, string};

/// Reine Speicher-Partition, ID → String.
#[derive(Debug, Clone, Default)]
struct ValueStore {
    entries: Vec<Option<Arc<str>>>,
    next_id: usize,
    count: usize,
    capacity: Option<usize>,
    at_capacity: bool,
}

impl ValueStore {
    fn bounded(cap: usize) -> Self {
        Self { capacity: Some(cap), ..Self::default() }
    }

    fn get(&self, id: usize) -> Option<&Arc<str>> {
        self.entries.get(id)?.as_ref()
    }

    /// Größe für die Bitbreite: nach dem ersten Umlauf die Kapazität.
    fn size_for_bits(&self) -> usize {
        match self.capacity {
            Some(cap) if self.at_capacity => cap,
            _ => self.next_id,
        }
    }

    fn push(&mut self, value: Arc<str>) -> usize {
        let id = self.next_id;
        self.entries.push(Some(value));
        self.next_id += 1;
        self.count += 1;
        id
    }

    /// Schreibt in einen Slot des Ringpuffers.
    fn set(&mut self, id: usize, value: Arc<str>) {
        if id >= self.entries.len() {
            self.entries.resize(id + 1, None);
        }
        if self.entries[id].is_none() {
            self.count += 1;
        }
        self.entries[id] = Some(value);
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        if let Some(cap) = self.capacity
            && id + 1 >= cap
        {
            self.at_capacity = true;
        }
    }

    fn remove(&mut self, id: usize) {
        if let Some(entry) = self.entries.get_mut(id)
            && entry.take().is_some()
        {
            self.count -= 1;
        }
    }

    fn len(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone, Copy)]
struct ValueInfo {
    /// Kontext des ersten Einfügens (Local-Hit-Check).
    owner: QNameId,
    global_id: usize,
    local_id: usize,
}

#[derive(Debug, Clone, Copy)]
struct GlobalSlot {
    owner: QNameId,
    local_id: usize,
}

/// Outcome of a value lookup, as written to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueHit {
    Local(usize),
    Global(usize),
    Miss,
}

/// Local and global value partitions of one document.
#[derive(Debug, Clone)]
pub struct ValueTable {
    lookup: FastHashMap<Arc<str>, ValueInfo>,
    local: FastHashMap<QNameId, ValueStore>,
    global: ValueStore,
    /// Besitzer je globalem Slot, für die Eviction.
    global_slots: Vec<Option<GlobalSlot>>,
    /// Nächster globaler Slot (zirkulär bei begrenzter Kapazität).
    global_id: usize,
    max_length: Option<usize>,
    capacity: Option<usize>,
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl ValueTable {
    pub fn new(max_length: Option<u32>, capacity: Option<u32>) -> Self {
        let capacity = capacity.map(|c| c as usize);
        Self {
            lookup: FastHashMap::default(),
            local: FastHashMap::default(),
            global: capacity.map_or_else(ValueStore::default, ValueStore::bounded),
            global_slots: Vec::new(),
            global_id: 0,
            max_length: max_length.map(|m| m as usize),
            capacity,
        }
    }

    /// Klassifiziert `value` im Kontext `owner`, ohne etwas zu verändern.
    pub fn classify(&self, owner: QNameId, value: &str) -> ValueHit {
        match self.lookup.get(value) {
            Some(info) if info.owner == owner => ValueHit::Local(info.local_id),
            Some(info) => ValueHit::Global(info.global_id),
            None => ValueHit::Miss,
        }
    }

    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    pub fn local_count(&self, owner: QNameId) -> usize {
        self.local.get(&owner).map_or(0, ValueStore::len)
    }

    pub fn global_size_for_bits(&self) -> usize {
        self.global.size_for_bits()
    }

    pub fn local_size_for_bits(&self, owner: QNameId) -> usize {
        self.local.get(&owner).map_or(0, ValueStore::size_for_bits)
    }

    pub fn local_value(&self, owner: QNameId, id: usize) -> Option<&Arc<str>> {
        self.local.get(&owner)?.get(id)
    }

    pub fn global_value(&self, id: usize) -> Option<&Arc<str>> {
        self.global.get(id)
    }

    /// Ob ein Wert nie in die Partitionen aufgenommen wird.
    fn is_ineligible(&self, value: &str) -> bool {
        self.capacity == Some(0)
            || value.is_empty()
            || self.max_length.is_some_and(|max| {
                // byte_len <= max impliziert char_count <= max
                value.len() > max && value.chars().count() > max
            })
    }

    /// Registriert einen Wert nach einem Miss; identisch in Encoder und Decoder.
    pub fn register(&mut self, owner: QNameId, value: Arc<str>) {
        if self.is_ineligible(&value) {
            return;
        }
        if self.capacity.is_some() {
            self.evict(self.global_id);
        }

        let local_id = self.local.entry(owner).or_default().push(Arc::clone(&value));
        let global_id = self.global_id;
        let slot = GlobalSlot { owner, local_id };
        match self.capacity {
            Some(cap) => {
                self.global.set(global_id, Arc::clone(&value));
                if global_id >= self.global_slots.len() {
                    self.global_slots.resize(global_id + 1, None);
                }
                self.global_slots[global_id] = Some(slot);
                self.global_id = (global_id + 1) % cap;
            }
            None => {
                self.global.push(Arc::clone(&value));
                self.global_slots.push(Some(slot));
                self.global_id += 1;
            }
        }
        self.lookup.insert(value, ValueInfo { owner, global_id, local_id });
    }

    fn evict(&mut self, slot: usize) {
        let Some(old) = self.global_slots.get_mut(slot).and_then(Option::take) else {
            return;
        };
        if let Some(old_value) = self.global.get(slot) {
            log::trace!("value table: evicting slot {slot} ({} chars)", old_value.chars().count());
            self.lookup.remove(old_value);
        }
        self.global.remove(slot);
        if let Some(store) = self.local.get_mut(&old.owner) {
            store.remove(old.local_id);
        }
    }

    /// Encodes `value` under context `owner` and updates the partitions.
    pub fn encode<C: EncoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        owner: QNameId,
        value: &str,
    ) -> Result<ValueHit> {
        let hit = self.classify(owner, value);
        match hit {
            ValueHit::Local(id) => {
                ch.encode_unsigned_integer(0)?;
                let n = bit_width::for_count(self.local_size_for_bits(owner));
                ch.encode_n_bit_unsigned_integer(id as u64, n)?;
            }
            ValueHit::Global(id) => {
                ch.encode_unsigned_integer(1)?;
                let n = bit_width::for_count(self.global_size_for_bits());
                ch.encode_n_bit_unsigned_integer(id as u64, n)?;
            }
            ValueHit::Miss => {
                string::encode_with_offset(ch, value, 2)?;
                self.register(owner, Arc::from(value));
            }
        }
        Ok(hit)
    }

    pub fn decode<C: DecoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        owner: QNameId,
    ) -> Result<Arc<str>> {
        match ch.decode_unsigned_integer()? {
            0 => {
                let n = bit_width::for_count(self.local_size_for_bits(owner));
                let id = ch.decode_n_bit_unsigned_integer(n)? as usize;
                self.local_value(owner, id).cloned().ok_or(Error::InvalidCompactId(id))
            }
            1 => {
                let n = bit_width::for_count(self.global_size_for_bits());
                let id = ch.decode_n_bit_unsigned_integer(n)? as usize;
                self.global_value(id).cloned().ok_or(Error::InvalidCompactId(id))
            }
            len => {
                let len = usize::try_from(len - 2).map_err(|_| Error::IntegerOverflow)?;
                let value: Arc<str> = Arc::from(ch.decode_string_of_length(len)?);
                self.register(owner, Arc::clone(&value));
                Ok(value)
            }
        }
    }
}
