//! Qualified names and the name partitions of the string table (EXI 7.1.7, 7.3).
//!
//! Zwei Ebenen:
//! - [`StaticNames`]: vom Schema (oder den eingebauten Einträgen) vorbefüllte
//!   URI-, Local-Name- und Prefix-Tabellen. Sortiert, binär durchsuchbar,
//!   unveränderlich und per `Arc` zwischen Dokumenten geteilt.
//! - [`NameTables`]: Tabellen eines Dokuments. Sie teilen den statischen Teil
//!   und hängen zur Laufzeit neu gesehene Namen an.
//!
//! Jede (URI, local-name) Kombination bekommt einen [`QNameContext`] mit einer
//! fortlaufenden [`QNameId`]. Die Id ist Schlüssel der Value-Partitionen und
//! der Grammar-Productions.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use ahash::AHasher;

use crate::channel::{DecoderChannel, EncoderChannel};
use crate::datatype::Datatype;
use crate::grammar::GrammarId;
use crate::{Error, FastHashMap, Result, bit_width, string};

pub const URI_EMPTY: &str = "";
pub const URI_XML: &str = "http://www.w3.org/XML/1998/namespace";
pub const URI_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const URI_ID_EMPTY: u32 = 0;
pub const URI_ID_XML: u32 = 1;
pub const URI_ID_XSI: u32 = 2;

/// Ab dieser Größe bekommt ein dynamischer Namensbereich einen Hash-Index.
/// Darunter ist lineare Suche schneller.
const PARTITION_LINEAR_THRESHOLD: usize = 64;

// ============================================================================
// QName
// ============================================================================

/// Qualified name.
///
/// EXI 7.1.7: "Two qnames are considered equal if they have the same uri
/// and local-name, regardless of their prefix values." `Eq`, `Hash` und `Ord`
/// ignorieren deshalb den Prefix. Sortiert wird nach local-name, dann URI.
#[derive(Clone)]
pub struct QName {
    pub uri: Arc<str>,
    pub local_name: Arc<str>,
    pub prefix: Option<Arc<str>>,
    /// Vorberechneter Hash von (uri, local_name).
    identity: u64,
}

fn compute_identity(uri: &str, local_name: &str) -> u64 {
    let mut hasher = AHasher::default();
    uri.hash(&mut hasher);
    local_name.hash(&mut hasher);
    hasher.finish()
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QName")
            .field("uri", &self.uri)
            .field("local_name", &self.local_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.uri == other.uri
            && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.local_name
            .cmp(&other.local_name)
            .then_with(|| self.uri.cmp(&other.uri))
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// `prefix:local` wenn ein Prefix vorhanden ist, sonst Clark-Notation `{uri}local`.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(pfx) if !pfx.is_empty() => write!(f, "{pfx}:{}", self.local_name),
            _ if self.uri.is_empty() => f.write_str(&self.local_name),
            _ => write!(f, "{{{}}}{}", self.uri, self.local_name),
        }
    }
}

impl QName {
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        Self::with_optional_prefix(uri.into(), local_name.into(), None)
    }

    pub fn with_prefix(
        uri: impl Into<Arc<str>>,
        local_name: impl Into<Arc<str>>,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        Self::with_optional_prefix(uri.into(), local_name.into(), Some(prefix.into()))
    }

    pub fn with_optional_prefix(
        uri: Arc<str>,
        local_name: Arc<str>,
        prefix: Option<Arc<str>>,
    ) -> Self {
        let identity = compute_identity(&uri, &local_name);
        Self { uri, local_name, prefix, identity }
    }

    /// Parses Clark notation `{uri}local`; a plain name has no namespace.
    pub fn from_clark(s: &str) -> Option<Self> {
        match s.strip_prefix('{') {
            Some(rest) => {
                let (uri, local) = rest.split_once('}')?;
                (!local.is_empty()).then(|| Self::new(uri, local))
            }
            None => (!s.is_empty()).then(|| Self::new("", s)),
        }
    }

    pub fn clark(&self) -> String {
        if self.uri.is_empty() {
            self.local_name.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local_name)
        }
    }

    /// xsi:type (EXI 8.4.3).
    pub fn xsi_type() -> Self {
        static XSI_TYPE: OnceLock<QName> = OnceLock::new();
        XSI_TYPE.get_or_init(|| QName::with_prefix(URI_XSI, "type", "xsi")).clone()
    }

    /// xsi:nil (EXI 8.4.3).
    pub fn xsi_nil() -> Self {
        static XSI_NIL: OnceLock<QName> = OnceLock::new();
        XSI_NIL.get_or_init(|| QName::with_prefix(URI_XSI, "nil", "xsi")).clone()
    }

    #[inline]
    pub fn is_xsi_type(&self) -> bool {
        &*self.uri == URI_XSI && &*self.local_name == "type"
    }

    #[inline]
    pub fn is_xsi_nil(&self) -> bool {
        &*self.uri == URI_XSI && &*self.local_name == "nil"
    }

    /// Gleicher Name, anderer Prefix.
    pub fn with_prefix_of(&self, prefix: Option<Arc<str>>) -> Self {
        Self { prefix, ..self.clone() }
    }
}

// ============================================================================
// QNameContext
// ============================================================================

/// Global sequential id of a (URI, local-name) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QNameId(pub u32);

impl QNameId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical handle of one qualified name.
///
/// Cacht die globale Element-Grammar und den Datentyp der globalen
/// Attribut-Deklaration, damit Wildcards und undeklarierte Namen in allen
/// Grammar-Zuständen dieselbe Production teilen.
#[derive(Debug, Clone)]
pub struct QNameContext {
    pub id: QNameId,
    pub uri_id: u32,
    pub local_id: u32,
    pub qname: QName,
    /// Grammar der globalen Element-Deklaration.
    pub global_element: Option<GrammarId>,
    /// Datentyp der globalen Attribut-Deklaration.
    pub global_attribute: Option<Datatype>,
    /// First-start-tag Grammar, falls der Name einen Typ bezeichnet (xsi:type Ziel).
    pub type_grammar: Option<GrammarId>,
}

impl QNameContext {
    fn new(id: QNameId, uri_id: u32, local_id: u32, qname: QName) -> Self {
        Self {
            id,
            uri_id,
            local_id,
            qname,
            global_element: None,
            global_attribute: None,
            type_grammar: None,
        }
    }
}

// ============================================================================
// StaticNames
// ============================================================================

#[derive(Debug, Clone)]
struct StaticUri {
    uri: Arc<str>,
    /// Sortiert; Index = local-name id.
    locals: Vec<Arc<str>>,
    qnames: Vec<QNameId>,
    prefixes: Vec<Arc<str>>,
}

/// Pre-populated name tables, immutable once built.
#[derive(Debug, Clone)]
pub struct StaticNames {
    uris: Vec<StaticUri>,
    /// (uri, id), sortiert nach uri.
    uri_order: Vec<(Arc<str>, u32)>,
    contexts: Vec<QNameContext>,
}

impl StaticNames {
    /// Builds the tables from URIs in id order.
    ///
    /// Die ersten drei Einträge müssen "", XML- und XSI-Namespace sein. Local
    /// names werden je URI sortiert und dedupliziert, Kontexte in dieser
    /// Reihenfolge vergeben.
    pub fn new(uris: Vec<(Arc<str>, Vec<Arc<str>>)>) -> Result<Self> {
        let expected = [URI_EMPTY, URI_XML, URI_XSI];
        if uris.len() < expected.len()
            || uris.iter().zip(expected).any(|((uri, _), want)| &**uri != want)
        {
            return Err(Error::SchemaError(
                "URI table must start with the empty, XML and XSI namespaces".into(),
            ));
        }

        let mut static_uris = Vec::with_capacity(uris.len());
        let mut contexts = Vec::new();
        for (uri_id, (uri, mut locals)) in uris.into_iter().enumerate() {
            locals.sort();
            locals.dedup();
            let mut qnames = Vec::with_capacity(locals.len());
            for (local_id, local) in locals.iter().enumerate() {
                let id = QNameId(contexts.len() as u32);
                let qname = QName::with_optional_prefix(Arc::clone(&uri), Arc::clone(local), None);
                contexts.push(QNameContext::new(id, uri_id as u32, local_id as u32, qname));
                qnames.push(id);
            }
            let prefixes: Vec<Arc<str>> = match uri_id as u32 {
                URI_ID_EMPTY => vec![Arc::from("")],
                URI_ID_XML => vec![Arc::from("xml")],
                URI_ID_XSI => vec![Arc::from("xsi")],
                _ => Vec::new(),
            };
            static_uris.push(StaticUri { uri, locals, qnames, prefixes });
        }

        let mut uri_order: Vec<(Arc<str>, u32)> = static_uris
            .iter()
            .enumerate()
            .map(|(i, u)| (Arc::clone(&u.uri), i as u32))
            .collect();
        uri_order.sort_by(|a, b| a.0.cmp(&b.0));
        if uri_order.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(Error::SchemaError("duplicate namespace URI".into()));
        }

        Ok(Self { uris: static_uris, uri_order, contexts })
    }

    /// Eingebaute Einträge (EXI Appendix D): xml {base, id, lang, space},
    /// xsi {nil, type}.
    pub fn builtin() -> Arc<Self> {
        static BUILTIN: OnceLock<Arc<StaticNames>> = OnceLock::new();
        Arc::clone(BUILTIN.get_or_init(|| {
            let local = |names: &[&str]| names.iter().map(|n| Arc::from(*n)).collect();
            let tables = StaticNames::new(vec![
                (Arc::from(URI_EMPTY), Vec::new()),
                (Arc::from(URI_XML), local(&["base", "id", "lang", "space"])),
                (Arc::from(URI_XSI), local(&["nil", "type"])),
            ]);
            // Die eingebauten URIs erfüllen die Vorbedingungen von `new`.
            Arc::new(tables.unwrap_or_else(|_| unreachable!("builtin name tables")))
        }))
    }

    pub fn uri_count(&self) -> usize {
        self.uris.len()
    }

    pub fn lookup_uri(&self, uri: &str) -> Option<u32> {
        self.uri_order
            .binary_search_by(|(u, _)| (**u).cmp(uri))
            .ok()
            .map(|i| self.uri_order[i].1)
    }

    pub fn lookup_local(&self, uri_id: u32, local: &str) -> Option<QNameId> {
        let entry = self.uris.get(uri_id as usize)?;
        entry
            .locals
            .binary_search_by(|l| (**l).cmp(local))
            .ok()
            .map(|i| entry.qnames[i])
    }

    pub fn lookup_qname(&self, qname: &QName) -> Option<QNameId> {
        self.lookup_uri(&qname.uri)
            .and_then(|uri_id| self.lookup_local(uri_id, &qname.local_name))
    }

    pub fn context(&self, id: QNameId) -> Option<&QNameContext> {
        self.contexts.get(id.index())
    }

    pub(crate) fn context_mut(&mut self, id: QNameId) -> Option<&mut QNameContext> {
        self.contexts.get_mut(id.index())
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    fn local_count(&self, uri_id: u32) -> usize {
        self.uris.get(uri_id as usize).map_or(0, |u| u.locals.len())
    }
}

// ============================================================================
// NameTables
// ============================================================================

/// Zur Laufzeit angehängte local names einer URI.
#[derive(Debug, Clone, Default)]
struct LocalTail {
    names: Vec<(Arc<str>, QNameId)>,
    index: Option<FastHashMap<Arc<str>, usize>>,
}

impl LocalTail {
    fn lookup(&self, local: &str) -> Option<(usize, QNameId)> {
        match &self.index {
            Some(map) => map.get(local).map(|&i| (i, self.names[i].1)),
            None => self
                .names
                .iter()
                .position(|(name, _)| &**name == local)
                .map(|i| (i, self.names[i].1)),
        }
    }

    fn push(&mut self, local: Arc<str>, id: QNameId) -> usize {
        let pos = self.names.len();
        if self.index.is_none() && pos + 1 >= PARTITION_LINEAR_THRESHOLD {
            let mut map = FastHashMap::with_capacity_and_hasher(pos + 1, Default::default());
            for (i, (name, _)) in self.names.iter().enumerate() {
                map.insert(Arc::clone(name), i);
            }
            self.index = Some(map);
        }
        if let Some(map) = &mut self.index {
            map.insert(Arc::clone(&local), pos);
        }
        self.names.push((local, id));
        pos
    }
}

#[derive(Debug, Clone)]
struct UriEntry {
    uri: Arc<str>,
    static_locals: usize,
    tail: LocalTail,
    prefixes: Vec<Arc<str>>,
}

/// Name tables of one document: shared static part plus runtime additions.
#[derive(Debug, Clone)]
pub struct NameTables {
    statics: Arc<StaticNames>,
    uris: Vec<UriEntry>,
    dynamic_uris: FastHashMap<Arc<str>, u32>,
    contexts: Vec<QNameContext>,
    /// Built-in Grammars für Elemente ohne globale Deklaration.
    runtime_elements: FastHashMap<QNameId, GrammarId>,
}

impl NameTables {
    pub fn new(statics: Arc<StaticNames>) -> Self {
        let uris = statics
            .uris
            .iter()
            .map(|u| UriEntry {
                uri: Arc::clone(&u.uri),
                static_locals: u.locals.len(),
                tail: LocalTail::default(),
                prefixes: u.prefixes.clone(),
            })
            .collect();
        Self {
            statics,
            uris,
            dynamic_uris: FastHashMap::default(),
            contexts: Vec::new(),
            runtime_elements: FastHashMap::default(),
        }
    }

    pub fn statics(&self) -> &Arc<StaticNames> {
        &self.statics
    }

    // === URIs ===

    pub fn uri_count(&self) -> usize {
        self.uris.len()
    }

    pub fn lookup_uri(&self, uri: &str) -> Option<u32> {
        self.statics
            .lookup_uri(uri)
            .or_else(|| self.dynamic_uris.get(uri).copied())
    }

    pub fn uri(&self, uri_id: u32) -> Option<&Arc<str>> {
        self.uris.get(uri_id as usize).map(|u| &u.uri)
    }

    pub fn add_uri(&mut self, uri: &str) -> u32 {
        if let Some(id) = self.lookup_uri(uri) {
            return id;
        }
        let id = self.uris.len() as u32;
        let uri: Arc<str> = Arc::from(uri);
        self.dynamic_uris.insert(Arc::clone(&uri), id);
        self.uris.push(UriEntry {
            uri,
            static_locals: 0,
            tail: LocalTail::default(),
            prefixes: Vec::new(),
        });
        id
    }

    // === Local names ===

    pub fn local_count(&self, uri_id: u32) -> usize {
        self.uris
            .get(uri_id as usize)
            .map_or(0, |u| u.static_locals + u.tail.names.len())
    }

    /// Liefert (local-name id, QNameId).
    pub fn lookup_local(&self, uri_id: u32, local: &str) -> Option<(u32, QNameId)> {
        if let Some(id) = self.statics.lookup_local(uri_id, local) {
            return self.statics.context(id).map(|c| (c.local_id, id));
        }
        let entry = self.uris.get(uri_id as usize)?;
        entry
            .tail
            .lookup(local)
            .map(|(pos, id)| ((entry.static_locals + pos) as u32, id))
    }

    fn local_by_id(&self, uri_id: u32, local_id: u32) -> Option<QNameId> {
        let static_count = self.statics.local_count(uri_id);
        let local_id = local_id as usize;
        if local_id < static_count {
            return self.statics.uris.get(uri_id as usize).map(|u| u.qnames[local_id]);
        }
        let entry = self.uris.get(uri_id as usize)?;
        entry.tail.names.get(local_id - static_count).map(|(_, id)| *id)
    }

    /// Legt einen local name an (idempotent) und gibt seinen Kontext zurück.
    pub fn add_local(&mut self, uri_id: u32, local: &str) -> Result<QNameId> {
        if let Some((_, id)) = self.lookup_local(uri_id, local) {
            return Ok(id);
        }
        let id = QNameId((self.statics.context_count() + self.contexts.len()) as u32);
        let entry = self
            .uris
            .get_mut(uri_id as usize)
            .ok_or(Error::InvalidCompactId(uri_id as usize))?;
        let local: Arc<str> = Arc::from(local);
        let local_id = (entry.static_locals + entry.tail.push(Arc::clone(&local), id)) as u32;
        let qname = QName::with_optional_prefix(Arc::clone(&entry.uri), local, None);
        self.contexts.push(QNameContext::new(id, uri_id, local_id, qname));
        Ok(id)
    }

    pub fn lookup_qname(&self, qname: &QName) -> Option<QNameId> {
        let uri_id = self.lookup_uri(&qname.uri)?;
        self.lookup_local(uri_id, &qname.local_name).map(|(_, id)| id)
    }

    /// Lookup, bei Miss anlegen.
    pub fn intern(&mut self, qname: &QName) -> Result<QNameId> {
        let uri_id = self.add_uri(&qname.uri);
        self.add_local(uri_id, &qname.local_name)
    }

    pub fn context(&self, id: QNameId) -> Result<&QNameContext> {
        let static_count = self.statics.context_count();
        let idx = id.index();
        if idx < static_count {
            self.statics.context(id)
        } else {
            self.contexts.get(idx - static_count)
        }
        .ok_or(Error::InvalidCompactId(idx))
    }

    pub fn qname(&self, id: QNameId) -> Result<&QName> {
        self.context(id).map(|c| &c.qname)
    }

    /// Grammar eines Elements: globale Deklaration, sonst zur Laufzeit angelegt.
    pub fn element_grammar(&self, id: QNameId) -> Option<GrammarId> {
        self.context(id)
            .ok()
            .and_then(|c| c.global_element)
            .or_else(|| self.runtime_elements.get(&id).copied())
    }

    pub fn set_element_grammar(&mut self, id: QNameId, grammar: GrammarId) {
        self.runtime_elements.insert(id, grammar);
    }

    // === Prefixes ===

    pub fn prefix_count(&self, uri_id: u32) -> usize {
        self.uris.get(uri_id as usize).map_or(0, |u| u.prefixes.len())
    }

    pub fn lookup_prefix(&self, uri_id: u32, prefix: &str) -> Option<u32> {
        self.uris
            .get(uri_id as usize)?
            .prefixes
            .iter()
            .position(|p| &**p == prefix)
            .map(|i| i as u32)
    }

    pub fn prefix(&self, uri_id: u32, prefix_id: u32) -> Option<&Arc<str>> {
        self.uris.get(uri_id as usize)?.prefixes.get(prefix_id as usize)
    }

    fn add_prefix(&mut self, uri_id: u32, prefix: &str) -> Result<()> {
        let entry = self
            .uris
            .get_mut(uri_id as usize)
            .ok_or(Error::InvalidCompactId(uri_id as usize))?;
        if !entry.prefixes.iter().any(|p| &**p == prefix) {
            entry.prefixes.push(Arc::from(prefix));
        }
        Ok(())
    }

    // === Wire format (EXI 7.1.7, 7.3.2, 7.3.3) ===

    /// URI: Treffer `i + 1`, Miss `0` + String, jeweils mit ⌈log₂(m + 1)⌉ Bits.
    pub fn encode_uri<C: EncoderChannel + ?Sized>(&mut self, ch: &mut C, uri: &str) -> Result<u32> {
        let n = bit_width::for_count(self.uri_count() + 1);
        match self.lookup_uri(uri) {
            Some(id) => {
                ch.encode_n_bit_unsigned_integer(u64::from(id) + 1, n)?;
                Ok(id)
            }
            None => {
                ch.encode_n_bit_unsigned_integer(0, n)?;
                string::encode(ch, uri)?;
                Ok(self.add_uri(uri))
            }
        }
    }

    pub fn decode_uri<C: DecoderChannel + ?Sized>(&mut self, ch: &mut C) -> Result<u32> {
        let n = bit_width::for_count(self.uri_count() + 1);
        let value = ch.decode_n_bit_unsigned_integer(n)?;
        if value == 0 {
            let uri = string::decode(ch)?;
            return Ok(self.add_uri(&uri));
        }
        let id = value - 1;
        if id >= self.uri_count() as u64 {
            return Err(Error::InvalidCompactId(id as usize));
        }
        Ok(id as u32)
    }

    /// Local name: Treffer `0` + ⌈log₂(m)⌉-bit Index, Miss Länge + 1 und String.
    pub fn encode_local_name<C: EncoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        uri_id: u32,
        local: &str,
    ) -> Result<QNameId> {
        match self.lookup_local(uri_id, local) {
            Some((local_id, id)) => {
                ch.encode_unsigned_integer(0)?;
                let n = bit_width::for_count(self.local_count(uri_id));
                ch.encode_n_bit_unsigned_integer(u64::from(local_id), n)?;
                Ok(id)
            }
            None => {
                string::encode_with_offset(ch, local, 1)?;
                self.add_local(uri_id, local)
            }
        }
    }

    pub fn decode_local_name<C: DecoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        uri_id: u32,
    ) -> Result<QNameId> {
        let len = ch.decode_unsigned_integer()?;
        if len == 0 {
            let n = bit_width::for_count(self.local_count(uri_id));
            let local_id = ch.decode_n_bit_unsigned_integer(n)?;
            let local_id = u32::try_from(local_id).map_err(|_| Error::InvalidCompactId(usize::MAX))?;
            return self
                .local_by_id(uri_id, local_id)
                .ok_or(Error::InvalidCompactId(local_id as usize));
        }
        let len = usize::try_from(len - 1).map_err(|_| Error::IntegerOverflow)?;
        let local = ch.decode_string_of_length(len)?;
        self.add_local(uri_id, &local)
    }

    /// URI und local name (ohne Prefix).
    pub fn encode_qname<C: EncoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        qname: &QName,
    ) -> Result<QNameId> {
        let uri_id = self.encode_uri(ch, &qname.uri)?;
        self.encode_local_name(ch, uri_id, &qname.local_name)
    }

    pub fn decode_qname<C: DecoderChannel + ?Sized>(&mut self, ch: &mut C) -> Result<QNameId> {
        let uri_id = self.decode_uri(ch)?;
        self.decode_local_name(ch, uri_id)
    }

    /// QName-Prefix: n-bit Index über die Prefixe der URI.
    ///
    /// Unbekannte Prefixe schreiben Index 0. Ohne Prefixe wird nichts geschrieben.
    pub fn encode_prefix<C: EncoderChannel + ?Sized>(
        &self,
        ch: &mut C,
        uri_id: u32,
        prefix: Option<&str>,
    ) -> Result<()> {
        let count = self.prefix_count(uri_id);
        if count == 0 {
            return Ok(());
        }
        let index = prefix.and_then(|p| self.lookup_prefix(uri_id, p)).unwrap_or(0);
        ch.encode_n_bit_unsigned_integer(u64::from(index), bit_width::for_count(count))
    }

    pub fn decode_prefix<C: DecoderChannel + ?Sized>(
        &self,
        ch: &mut C,
        uri_id: u32,
    ) -> Result<Option<Arc<str>>> {
        let count = self.prefix_count(uri_id);
        if count == 0 {
            return Ok(None);
        }
        let index = ch.decode_n_bit_unsigned_integer(bit_width::for_count(count))?;
        let index = u32::try_from(index).map_err(|_| Error::InvalidCompactId(usize::MAX))?;
        self.prefix(uri_id, index)
            .cloned()
            .map(Some)
            .ok_or(Error::InvalidCompactId(index as usize))
    }

    /// Prefix eines NS Events: Compact-ID Partition wie bei URIs.
    pub fn encode_ns_prefix<C: EncoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        uri_id: u32,
        prefix: &str,
    ) -> Result<()> {
        let n = bit_width::for_count(self.prefix_count(uri_id) + 1);
        match self.lookup_prefix(uri_id, prefix) {
            Some(id) => ch.encode_n_bit_unsigned_integer(u64::from(id) + 1, n),
            None => {
                ch.encode_n_bit_unsigned_integer(0, n)?;
                string::encode(ch, prefix)?;
                self.add_prefix(uri_id, prefix)
            }
        }
    }

    pub fn decode_ns_prefix<C: DecoderChannel + ?Sized>(
        &mut self,
        ch: &mut C,
        uri_id: u32,
    ) -> Result<Arc<str>> {
        let n = bit_width::for_count(self.prefix_count(uri_id) + 1);
        let value = ch.decode_n_bit_unsigned_integer(n)?;
        if value == 0 {
            let prefix = string::decode(ch)?;
            self.add_prefix(uri_id, &prefix)?;
            return Ok(Arc::from(prefix));
        }
        let index = u32::try_from(value - 1).map_err(|_| Error::InvalidCompactId(usize::MAX))?;
        self.prefix(uri_id, index)
            .cloned()
            .ok_or(Error::InvalidCompactId(index as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{BitDecoderChannel, BitEncoderChannel};

    fn tables() -> NameTables {
        NameTables::new(StaticNames::builtin())
    }

    // ==================== QName ====================

    /// EXI 7.1.7: Gleichheit ignoriert den Prefix.
    #[test]
    fn gleichheit_ohne_prefix() {
        let a = QName::with_prefix("urn:x", "a", "p");
        let b = QName::with_prefix("urn:x", "a", "q");
        let c = QName::new("urn:y", "a");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ordnung_local_dann_uri() {
        let mut names = [QName::new("urn:b", "x"), QName::new("urn:a", "y"), QName::new("urn:a", "x")];
        names.sort();
        let clark: Vec<String> = names.iter().map(QName::clark).collect();
        assert_eq!(clark, ["{urn:a}x", "{urn:b}x", "{urn:a}y"]);
    }

    #[test]
    fn clark_notation() {
        let q = QName::from_clark("{urn:x}item").unwrap();
        assert_eq!(&*q.uri, "urn:x");
        assert_eq!(&*q.local_name, "item");
        assert_eq!(QName::from_clark("plain").unwrap().clark(), "plain");
        assert!(QName::from_clark("{urn:x}").is_none());
        assert!(QName::from_clark("{unterminated").is_none());
    }

    #[test]
    fn xsi_namen() {
        assert!(QName::xsi_type().is_xsi_type());
        assert!(QName::xsi_nil().is_xsi_nil());
        assert!(!QName::new(URI_XSI, "schemaLocation").is_xsi_type());
    }

    // ==================== Vorbefüllung (Appendix D) ====================

    #[test]
    fn eingebaute_uris() {
        let t = tables();
        assert_eq!(t.uri_count(), 3);
        assert_eq!(t.lookup_uri(""), Some(URI_ID_EMPTY));
        assert_eq!(t.lookup_uri(URI_XML), Some(URI_ID_XML));
        assert_eq!(t.lookup_uri(URI_XSI), Some(URI_ID_XSI));
        assert_eq!(t.local_count(URI_ID_XML), 4);
        assert_eq!(t.local_count(URI_ID_XSI), 2);
        assert_eq!(t.lookup_local(URI_ID_XSI, "type").map(|(l, _)| l), Some(1));
        assert_eq!(t.prefix(URI_ID_XML, 0).map(|p| &**p), Some("xml"));
    }

    #[test]
    fn static_names_verlangen_basis_uris() {
        let result = StaticNames::new(vec![(Arc::from("urn:x"), Vec::new())]);
        assert!(matches!(result, Err(Error::SchemaError(_))));
    }

    // ==================== Dynamische Einträge ====================

    #[test]
    fn dynamische_namen_fortlaufend() {
        let mut t = tables();
        let uri = t.add_uri("urn:x");
        assert_eq!(uri, 3);
        let a = t.add_local(uri, "a").unwrap();
        let b = t.add_local(uri, "b").unwrap();
        assert_eq!(a.0 + 1, b.0);
        assert_eq!(t.add_local(uri, "a").unwrap(), a);
        assert_eq!(t.context(b).unwrap().local_id, 1);
        assert_eq!(t.lookup_qname(&QName::new("urn:x", "b")), Some(b));
    }

    /// Ab der Schwelle wird ein Hash-Index angelegt, Ids bleiben gleich.
    #[test]
    fn viele_local_names() {
        let mut t = tables();
        let ids: Vec<QNameId> = (0..200)
            .map(|i| t.add_local(URI_ID_EMPTY, &format!("n{i}")).unwrap())
            .collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(t.lookup_local(URI_ID_EMPTY, &format!("n{i}")), Some((i as u32, *id)));
        }
    }

    // ==================== Wire Format ====================

    #[test]
    fn qname_miss_dann_treffer() {
        let mut enc_tables = tables();
        let mut enc = BitEncoderChannel::new(Vec::new());
        let q = QName::new("urn:x", "item");
        let first = enc_tables.encode_qname(&mut enc, &q).unwrap();
        let second = enc_tables.encode_qname(&mut enc, &q).unwrap();
        assert_eq!(first, second);
        let bytes = enc.into_inner().unwrap();

        let mut dec_tables = tables();
        let mut dec = BitDecoderChannel::new(bytes.as_slice());
        let d1 = dec_tables.decode_qname(&mut dec).unwrap();
        let d2 = dec_tables.decode_qname(&mut dec).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(*dec_tables.qname(d1).unwrap(), q);
    }

    /// Treffer auf xsi:type: URI i+1 = 3 (2 Bits), local name 0 + 1 Bit Index.
    #[test]
    fn xsi_type_wire_form() {
        let mut t = tables();
        let mut enc = BitEncoderChannel::new(Vec::new());
        t.encode_qname(&mut enc, &QName::xsi_type()).unwrap();
        let bytes = enc.into_inner().unwrap();
        // 11 | 00000000 | 1 -> 1100_0000 0010_0000
        assert_eq!(bytes, [0b1100_0000, 0b0010_0000]);
    }

    #[test]
    fn ns_prefix_partition() {
        let mut enc_tables = tables();
        let mut enc = BitEncoderChannel::new(Vec::new());
        let uri = enc_tables.encode_uri(&mut enc, "urn:x").unwrap();
        enc_tables.encode_ns_prefix(&mut enc, uri, "p").unwrap();
        enc_tables.encode_ns_prefix(&mut enc, uri, "p").unwrap();
        enc_tables.encode_prefix(&mut enc, uri, Some("p")).unwrap();
        let bytes = enc.into_inner().unwrap();

        let mut dec_tables = tables();
        let mut dec = BitDecoderChannel::new(bytes.as_slice());
        let uri = dec_tables.decode_uri(&mut dec).unwrap();
        assert_eq!(&*dec_tables.decode_ns_prefix(&mut dec, uri).unwrap(), "p");
        assert_eq!(&*dec_tables.decode_ns_prefix(&mut dec, uri).unwrap(), "p");
        assert_eq!(dec_tables.decode_prefix(&mut dec, uri).unwrap().as_deref(), Some("p"));
    }

    #[test]
    fn ungueltige_uri_id() {
        let mut t = tables();
        // n = 2 Bits, Wert 3 -> id 2 gültig; nach Erweiterung auf 3 Bits ist 7 ungültig.
        t.add_uri("urn:a");
        t.add_uri("urn:b");
        let bytes = [0b1110_0000];
        let mut dec = BitDecoderChannel::new(&bytes[..]);
        assert_eq!(t.decode_uri(&mut dec), Err(Error::InvalidCompactId(6)));
    }
}
