//! Per-document coding context.
//!
//! Alles Veränderliche eines Dokuments liegt hier und gehört genau einem
//! Encoder oder Decoder: Grammar-Arena (Lernen, Type-Casts), Namenstabellen
//! und Value-Partitionen. Geteilt wird nur der unveränderliche Schema-Teil.

use std::sync::Arc;

use crate::datatype::{Datatype, NamespaceResolver};
use crate::grammar::{GrammarId, Grammars};
use crate::options::{ExiOptions, SchemaId};
use crate::qname::{NameTables, QName, QNameId, StaticNames, URI_XML, URI_XSI};
use crate::schema::GrammarSource;
use crate::string_table::ValueTable;
use crate::undeclared::Undeclared;
use crate::{Error, Result};

/// Platzhalter für Namen, die noch nicht in den Tabellen stehen.
pub(crate) const UNKNOWN_QNAME: QNameId = QNameId(u32::MAX);
pub(crate) const UNKNOWN_URI: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct CodingContext {
    pub grammars: Grammars,
    pub names: NameTables,
    pub values: ValueTable,
}

impl CodingContext {
    /// Validates the options against the grammar source and builds fresh tables.
    ///
    /// # Errors
    ///
    /// - Fehler aus [`ExiOptions::validate`]
    /// - `MissingSchema` für `SchemaId::Id` oder `strict` ohne Schema
    pub fn new(source: &GrammarSource, options: &ExiOptions) -> Result<Self> {
        options.validate()?;
        let schema = source.schema().cloned();
        if schema.is_none() {
            if matches!(options.schema_id(), Some(SchemaId::Id(_))) {
                log::warn!("schema id given but no schema grammars supplied");
                return Err(Error::MissingSchema);
            }
            if options.strict() {
                log::warn!("strict coding requires schema grammars");
                return Err(Error::MissingSchema);
            }
        }

        let statics = schema
            .as_ref()
            .map_or_else(StaticNames::builtin, |s| Arc::clone(s.names()));
        Ok(Self {
            grammars: Grammars::new(schema),
            names: NameTables::new(statics),
            values: ValueTable::new(options.value_max_length(), options.value_partition_capacity()),
        })
    }

    /// Grammar eines Kind-Elements: deklariert, global, sonst eine neue
    /// Built-in Grammar, die ab jetzt für diesen Namen gilt.
    pub fn element_grammar(&mut self, qname: QNameId, declared: Option<GrammarId>) -> GrammarId {
        if let Some(grammar) = declared.or_else(|| self.names.element_grammar(qname)) {
            return grammar;
        }
        let grammar = self.grammars.built_in_element();
        self.names.set_element_grammar(qname, grammar);
        grammar
    }

    /// Datentyp eines Attributs ohne eigene Production: globale Deklaration,
    /// in Built-in Zuständen immer String.
    pub fn undeclared_attribute_datatype(&self, qname: QNameId, built_in: bool) -> Datatype {
        if built_in {
            return Datatype::String;
        }
        self.names
            .context(qname)
            .ok()
            .and_then(|c| c.global_attribute.clone())
            .unwrap_or(Datatype::String)
    }

    /// First-start-tag state of the named type `type_name` (xsi:type target).
    pub fn type_grammar(&self, type_name: &QName) -> Option<GrammarId> {
        let id = self.names.lookup_qname(type_name)?;
        self.names.context(id).ok()?.type_grammar
    }

    /// (Tabellen-Id, URI-Id) eines Namens; unbekannte Teile als Platzhalter.
    pub(crate) fn lookup(&self, qname: &QName) -> (QNameId, u32) {
        match self.names.lookup_uri(&qname.uri) {
            Some(uri_id) => {
                let id = self
                    .names
                    .lookup_local(uri_id, &qname.local_name)
                    .map_or(UNKNOWN_QNAME, |(_, id)| id);
                (id, uri_id)
            }
            None => (UNKNOWN_QNAME, UNKNOWN_URI),
        }
    }
}

/// Slot und fester Datentyp von xsi:type bzw. xsi:nil.
pub fn xsi_attribute(qname: &QName) -> Option<(Undeclared, Datatype)> {
    if qname.is_xsi_type() {
        Some((Undeclared::XsiType, Datatype::QName))
    } else if qname.is_xsi_nil() {
        Some((Undeclared::XsiNil, Datatype::Boolean))
    } else {
        None
    }
}

/// Mit `lexical_values` gehen alle Values (außer xsi:type/xsi:nil) als String.
pub fn effective_datatype(datatype: Datatype, options: &ExiOptions) -> Datatype {
    if options.preserve().lexical_values { Datatype::String } else { datatype }
}

/// In-scope prefix bindings, one frame per open element.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    /// (prefix, uri), innerste Bindung zuletzt.
    bindings: Vec<(Arc<str>, Arc<str>)>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markierung für das Frame-Ende; an [`truncate`](Self::truncate) zurückgeben.
    pub fn mark(&self) -> usize {
        self.bindings.len()
    }

    pub fn truncate(&mut self, mark: usize) {
        self.bindings.truncate(mark);
    }

    pub fn bind(&mut self, prefix: Arc<str>, uri: Arc<str>) {
        self.bindings.push((prefix, uri));
    }

    pub fn resolve(&self, prefix: &str) -> Option<Arc<str>> {
        if let Some((_, uri)) = self.bindings.iter().rev().find(|(p, _)| &**p == prefix) {
            return Some(Arc::clone(uri));
        }
        match prefix {
            "xml" => Some(Arc::from(URI_XML)),
            "xsi" => Some(Arc::from(URI_XSI)),
            "" => Some(Arc::from("")),
            _ => None,
        }
    }

    /// Innerster Prefix, der noch an `uri` gebunden ist.
    pub fn prefix_for(&self, uri: &str) -> Option<Arc<str>> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, u)| &**u == uri && self.resolve(p).as_deref() == Some(uri))
            .map(|(p, _)| Arc::clone(p))
    }
}

impl NamespaceResolver for NamespaceScope {
    fn resolve_prefix(&self, prefix: &str) -> Option<Arc<str>> {
        self.resolve(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;

    #[test]
    fn scope_frames() {
        let mut scope = NamespaceScope::new();
        let outer = scope.mark();
        scope.bind("p".into(), "urn:a".into());
        let inner = scope.mark();
        scope.bind("p".into(), "urn:b".into());
        assert_eq!(scope.resolve("p").as_deref(), Some("urn:b"));
        assert_eq!(scope.prefix_for("urn:a"), None);

        scope.truncate(inner);
        assert_eq!(scope.resolve("p").as_deref(), Some("urn:a"));
        assert_eq!(scope.prefix_for("urn:a").as_deref(), Some("p"));
        scope.truncate(outer);
        assert_eq!(scope.resolve("p"), None);
    }

    #[test]
    fn vordefinierte_prefixe() {
        let scope = NamespaceScope::new();
        assert_eq!(scope.resolve("xml").as_deref(), Some(URI_XML));
        assert_eq!(scope.resolve("xsi").as_deref(), Some(URI_XSI));
        assert_eq!(scope.resolve("").as_deref(), Some(""));
    }

    /// Konfigurationsfehler werden vor dem ersten Byte erkannt.
    #[test]
    fn konfiguration_ohne_schema() {
        let source = GrammarSource::BuiltIn;
        let strict = ExiOptions::default().with_strict();
        assert_eq!(CodingContext::new(&source, &strict).err(), Some(Error::MissingSchema));

        let with_id = ExiOptions::default().with_schema_id(SchemaId::Id("urn:s".into()));
        assert_eq!(CodingContext::new(&source, &with_id).err(), Some(Error::MissingSchema));

        let bad = ExiOptions::default()
            .with_strict()
            .with_preserve(Preserve { comments: true, ..Preserve::default() });
        assert_eq!(CodingContext::new(&source, &bad).err(), Some(Error::InvalidOptionCombination));

        assert!(CodingContext::new(&source, &ExiOptions::default()).is_ok());
    }

    /// Ein Name bekommt einmal eine Built-in Grammar und behält sie.
    #[test]
    fn element_grammar_stabil() {
        let mut ctx = CodingContext::new(&GrammarSource::BuiltIn, &ExiOptions::default()).unwrap();
        let a = ctx.names.intern(&QName::new("", "a")).unwrap();
        let first = ctx.element_grammar(a, None);
        assert_eq!(ctx.element_grammar(a, None), first);
        assert_eq!(ctx.element_grammar(a, Some(GrammarId(1))), GrammarId(1));

        let (id, uri) = ctx.lookup(&QName::new("", "a"));
        assert_eq!((id, uri), (a, 0));
        assert_eq!(ctx.lookup(&QName::new("urn:x", "a")), (UNKNOWN_QNAME, UNKNOWN_URI));
        assert_eq!(ctx.undeclared_attribute_datatype(a, false), Datatype::String);
    }

    #[test]
    fn xsi_attribute_typen() {
        assert_eq!(xsi_attribute(&QName::xsi_type()), Some((Undeclared::XsiType, Datatype::QName)));
        assert_eq!(xsi_attribute(&QName::xsi_nil()), Some((Undeclared::XsiNil, Datatype::Boolean)));
        assert_eq!(xsi_attribute(&QName::new("", "nil")), None);
    }
}
