//! Grammar-Zustände, Productions und Lernen (EXI 8.1, 8.4, 8.5).
//!
//! Alle Zustände liegen in einer Arena ([`Grammars`]) und werden über
//! [`GrammarId`] referenziert. Productions zeigen per Handle auf ihren
//! Folgezustand, nie per Zeiger. Dadurch bleiben Referenzen beim Lernen
//! (Anhängen) gültig, und abgeleitete Zustände (xsi:type) lassen sich als
//! einfacher Handle-Cache memoisieren.
//!
//! # Ids
//!
//! Ids unterhalb von `schema.len()` gehören zu den unveränderlichen,
//! geteilten Schema-Zuständen. Alles darüber lebt nur in diesem Dokument:
//! Built-in Zustände (lernen zur Laufzeit) und Type-Cast-Ableitungen.
//!
//! # Event Codes der Level-1 Productions
//!
//! - Schema-Zustände: Code = Index (Schema-Reihenfolge).
//! - Built-in Zustände: Productions werden angehängt, der Code ist
//!   `N - 1 - i`. Die zuletzt gelernte Production bekommt Code 0.

use std::fmt;
use std::sync::Arc;

use crate::datatype::Datatype;
use crate::event::EventType;
use crate::event_code::CodeWidths;
use crate::options::ExiOptions;
use crate::qname::QNameId;
use crate::schema::SchemaGrammars;
use crate::undeclared::{self, Slots};
use crate::{Error, FastHashMap, Result};

/// Handle of one grammar state in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrammarId(pub u32);

impl GrammarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GrammarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of grammar state kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarFlavor {
    Document,
    DocContent,
    DocEnd,
    Fragment,
    FragmentContent,
    /// Erster Zustand eines Elements (Built-in StartTagContent, Schema Type_0).
    StartTag,
    /// Weitere Attribut-Zustände eines Schema-Typs.
    AttributeContent,
    ElementContent,
}

impl GrammarFlavor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::DocContent => "DocContent",
            Self::DocEnd => "DocEnd",
            Self::Fragment => "Fragment",
            Self::FragmentContent => "FragmentContent",
            Self::StartTag => "StartTag",
            Self::AttributeContent => "AttributeContent",
            Self::ElementContent => "ElementContent",
        }
    }

    /// Zustände vor dem Inhalt eines Elements (Attribute erlaubt).
    pub fn is_start_tag(self) -> bool {
        matches!(self, Self::StartTag | Self::AttributeContent)
    }
}

/// Terminal symbol of a level-1 production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartDocument,
    EndDocument,
    /// `grammar`: Grammar des Kind-Elements; `None` = globale/gelernte Grammar.
    StartElement { qname: QNameId, grammar: Option<GrammarId> },
    /// SE(uri:*) mit URI-Id.
    StartElementNs(u32),
    StartElementGeneric,
    Attribute { qname: QNameId, datatype: Datatype },
    AttributeNs(u32),
    AttributeGeneric,
    Characters(Datatype),
    EndElement,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::StartDocument => EventType::StartDocument,
            Self::EndDocument => EventType::EndDocument,
            Self::StartElement { .. } => EventType::StartElement,
            Self::StartElementNs(_) => EventType::StartElementNs,
            Self::StartElementGeneric => EventType::StartElementGeneric,
            Self::Attribute { .. } => EventType::Attribute,
            Self::AttributeNs(_) => EventType::AttributeNs,
            Self::AttributeGeneric => EventType::AttributeGeneric,
            Self::Characters(_) => EventType::Characters,
            Self::EndElement => EventType::EndElement,
        }
    }

    pub fn qname(&self) -> Option<QNameId> {
        match self {
            Self::StartElement { qname, .. } | Self::Attribute { qname, .. } => Some(*qname),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub event: Event,
    /// `None` nur für EE und ED.
    pub next: Option<GrammarId>,
}

impl Production {
    pub fn new(event: Event, next: Option<GrammarId>) -> Self {
        Self { event, next }
    }
}

/// How a name matched a level-1 production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// SE(qname) / AT(qname): Name steht nicht im Stream.
    Exact,
    /// SE(uri:*) / AT(uri:*): nur der local name steht im Stream.
    Namespace,
    /// SE(*) / AT(*): voller QName im Stream.
    Any,
}

/// One grammar state: level-1 productions plus the flags the level-2/3
/// slots are computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    pub flavor: GrammarFlavor,
    pub productions: Vec<Production>,
    pub built_in: bool,
    pub has_end_element: bool,
    pub type_castable: bool,
    pub nillable: bool,
    pub first_start_tag: bool,
    /// Erster Inhaltszustand (Ziel von SE(*)/CH aus dem Start-Tag).
    pub content: Option<GrammarId>,
    /// Zustand nach xsi:nil="true".
    pub empty: Option<GrammarId>,
}

impl Grammar {
    /// Schema-informed state.
    pub fn new(flavor: GrammarFlavor, productions: Vec<Production>) -> Self {
        let has_end_element = productions.iter().any(|p| p.event == Event::EndElement);
        Self {
            flavor,
            productions,
            built_in: false,
            has_end_element,
            type_castable: false,
            nillable: false,
            first_start_tag: flavor == GrammarFlavor::StartTag,
            content: None,
            empty: None,
        }
    }

    /// Built-in state (EXI 8.4). Lernt, außer als DocContent.
    pub fn built_in(flavor: GrammarFlavor, productions: Vec<Production>) -> Self {
        Self { built_in: true, ..Self::new(flavor, productions) }
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    /// Level-1 Code der Production an Position `index`.
    #[inline]
    pub fn code_of(&self, index: usize) -> u32 {
        if self.built_in {
            (self.productions.len() - 1 - index) as u32
        } else {
            index as u32
        }
    }

    /// Umkehrung von [`code_of`](Self::code_of).
    #[inline]
    pub fn index_of(&self, code: u32) -> Option<usize> {
        let code = code as usize;
        if code >= self.productions.len() {
            return None;
        }
        Some(if self.built_in { self.productions.len() - 1 - code } else { code })
    }

    pub fn second_level(&self, options: &ExiOptions) -> Slots {
        undeclared::second_level(self, options)
    }

    pub fn third_level(&self, options: &ExiOptions) -> Slots {
        undeclared::third_level(self, options)
    }

    pub fn widths(&self, options: &ExiOptions) -> CodeWidths {
        CodeWidths::new(
            self.productions.len(),
            self.second_level(options).len(),
            self.third_level(options).len(),
        )
    }

    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.productions.iter().position(|p| pred(&p.event))
    }

    pub fn match_start_element(&self, qname: QNameId, uri_id: u32) -> Option<(usize, NameMatch)> {
        self.position(|e| matches!(e, Event::StartElement { qname: q, .. } if *q == qname))
            .map(|i| (i, NameMatch::Exact))
            .or_else(|| {
                self.position(|e| matches!(e, Event::StartElementNs(u) if *u == uri_id))
                    .map(|i| (i, NameMatch::Namespace))
            })
            .or_else(|| {
                self.position(|e| matches!(e, Event::StartElementGeneric))
                    .map(|i| (i, NameMatch::Any))
            })
    }

    pub fn match_attribute(&self, qname: QNameId, uri_id: u32) -> Option<(usize, NameMatch)> {
        self.position(|e| matches!(e, Event::Attribute { qname: q, .. } if *q == qname))
            .map(|i| (i, NameMatch::Exact))
            .or_else(|| {
                self.position(|e| matches!(e, Event::AttributeNs(u) if *u == uri_id))
                    .map(|i| (i, NameMatch::Namespace))
            })
            .or_else(|| {
                self.position(|e| matches!(e, Event::AttributeGeneric))
                    .map(|i| (i, NameMatch::Any))
            })
    }

    /// Gelernt wird nur in Built-in Zuständen, nie in DocContent.
    pub fn learns(&self) -> bool {
        self.built_in && self.flavor != GrammarFlavor::DocContent
    }

    pub fn describe(&self, id: GrammarId) -> String {
        format!("{}{}", self.flavor.name(), id)
    }
}

// ============================================================================
// Arena
// ============================================================================

/// Grammar arena of one document.
#[derive(Debug, Clone)]
pub struct Grammars {
    schema: Option<Arc<SchemaGrammars>>,
    base: usize,
    local: Vec<Grammar>,
    /// (Basis, Ziel-Typ) → abgeleiteter Zustand.
    casts: FastHashMap<(GrammarId, GrammarId), GrammarId>,
    document: GrammarId,
    fragment: GrammarId,
}

impl Grammars {
    /// Built-in Dokument-Grammars ohne Schema, sonst die des Schemas.
    pub fn new(schema: Option<Arc<SchemaGrammars>>) -> Self {
        let mut grammars = Self {
            base: schema.as_ref().map_or(0, |s| s.len()),
            schema,
            local: Vec::new(),
            casts: FastHashMap::default(),
            document: GrammarId(0),
            fragment: GrammarId(0),
        };
        match grammars.schema.as_ref().map(|s| (s.document(), s.fragment())) {
            Some((document, fragment)) => {
                grammars.document = document;
                grammars.fragment = fragment;
            }
            None => grammars.push_built_in_documents(),
        }
        grammars
    }

    /// EXI 8.4.1 und 8.4.2.
    fn push_built_in_documents(&mut self) {
        use GrammarFlavor as F;
        let base = self.base as u32;
        let id = |offset: u32| GrammarId(base + offset);

        let doc_end = Grammar::built_in(F::DocEnd, vec![Production::new(Event::EndDocument, None)]);
        let doc_content = Grammar::built_in(
            F::DocContent,
            vec![Production::new(Event::StartElementGeneric, Some(id(2)))],
        );
        let document = Grammar::built_in(
            F::Document,
            vec![Production::new(Event::StartDocument, Some(id(1)))],
        );
        // Gespeichert [ED, SE(*)] -> Codes SE(*) = 0, ED = 1
        let fragment_content = Grammar::built_in(
            F::FragmentContent,
            vec![
                Production::new(Event::EndDocument, None),
                Production::new(Event::StartElementGeneric, Some(id(4))),
            ],
        );
        let fragment = Grammar::built_in(
            F::Fragment,
            vec![Production::new(Event::StartDocument, Some(id(4)))],
        );

        self.document = self.push(document);
        self.push(doc_content);
        self.push(doc_end);
        self.fragment = self.push(fragment);
        self.push(fragment_content);
    }

    pub fn document(&self) -> GrammarId {
        self.document
    }

    pub fn fragment(&self) -> GrammarId {
        self.fragment
    }

    pub fn schema(&self) -> Option<&Arc<SchemaGrammars>> {
        self.schema.as_ref()
    }

    pub fn len(&self) -> usize {
        self.base + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: GrammarId) -> Result<&Grammar> {
        let idx = id.index();
        let grammar = if idx < self.base {
            self.schema.as_ref().and_then(|s| s.grammar(id))
        } else {
            self.local.get(idx - self.base)
        };
        grammar.ok_or(Error::InvalidCompactId(idx))
    }

    /// Nur dokumentlokale Zustände sind veränderbar.
    fn get_mut(&mut self, id: GrammarId) -> Result<&mut Grammar> {
        let idx = id.index();
        if idx < self.base {
            return Err(Error::SchemaError(format!("grammar {id} is shared and immutable")));
        }
        self.local
            .get_mut(idx - self.base)
            .ok_or(Error::InvalidCompactId(idx))
    }

    pub(crate) fn push(&mut self, grammar: Grammar) -> GrammarId {
        let id = GrammarId((self.base + self.local.len()) as u32);
        self.local.push(grammar);
        id
    }

    /// Neues Built-in Element-Grammar-Paar (StartTagContent, ElementContent).
    /// Gibt den StartTag-Zustand zurück.
    pub fn built_in_element(&mut self) -> GrammarId {
        let start = GrammarId((self.base + self.local.len()) as u32);
        let content = GrammarId(start.0 + 1);

        let mut start_tag = Grammar::built_in(GrammarFlavor::StartTag, Vec::new());
        start_tag.content = Some(content);
        let element_content = Grammar::built_in(
            GrammarFlavor::ElementContent,
            vec![Production::new(Event::EndElement, None)],
        );
        self.push(start_tag);
        self.push(element_content);
        log::trace!("built-in element grammar {start} / {content}");
        start
    }

    /// Derived state for xsi:type (EXI 8.5.4.4.1), memoized per pair.
    ///
    /// Der Zielzustand übernimmt das nillable-Flag der Basis. Sind die Flags
    /// gleich, wird der Zielzustand selbst verwendet.
    pub fn type_cast(&mut self, base: GrammarId, target: GrammarId) -> Result<GrammarId> {
        if let Some(&derived) = self.casts.get(&(base, target)) {
            return Ok(derived);
        }
        let nillable = self.get(base)?.nillable;
        let target_grammar = self.get(target)?;
        let derived = if target_grammar.nillable == nillable {
            target
        } else {
            let mut clone = target_grammar.clone();
            clone.nillable = nillable;
            self.push(clone)
        };
        log::debug!("type cast {base} -> {target} derived {derived}");
        self.casts.insert((base, target), derived);
        Ok(derived)
    }

    /// Hängt eine gelernte Production an (EXI 8.4.3).
    ///
    /// No-op für Zustände, die nicht lernen, und für bereits vorhandene Events.
    pub fn learn(&mut self, id: GrammarId, event: Event, next: Option<GrammarId>) -> Result<()> {
        if !self.get(id)?.learns() {
            return Ok(());
        }
        let grammar = self.get_mut(id)?;
        if grammar.productions.iter().any(|p| p.event == event) {
            return Ok(());
        }
        log::trace!(
            "learning {} in {} (now {} productions)",
            event.event_type(),
            grammar.flavor.name(),
            grammar.productions.len() + 1
        );
        grammar.productions.push(Production::new(event, next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;

    fn opts() -> ExiOptions {
        ExiOptions::default()
    }

    // --- Test 1: Built-in Dokument-Grammars (EXI 8.4.1) ---
    #[test]
    fn built_in_dokument() {
        let g = Grammars::new(None);
        let doc = g.get(g.document()).unwrap();
        assert_eq!(doc.flavor, GrammarFlavor::Document);
        assert_eq!(doc.productions[0].event, Event::StartDocument);

        let content_id = doc.productions[0].next.unwrap();
        let content = g.get(content_id).unwrap();
        assert_eq!(content.flavor, GrammarFlavor::DocContent);
        assert!(!content.learns());

        let end = g.get(content.productions[0].next.unwrap()).unwrap();
        assert_eq!(end.productions[0].event, Event::EndDocument);
    }

    /// FragmentContent: SE(*) = 0, ED = 1.
    #[test]
    fn fragment_codes() {
        let g = Grammars::new(None);
        let frag = g.get(g.fragment()).unwrap();
        let content = g.get(frag.productions[0].next.unwrap()).unwrap();
        let se = content.position(|e| *e == Event::StartElementGeneric).unwrap();
        let ed = content.position(|e| *e == Event::EndDocument).unwrap();
        assert_eq!(content.code_of(se), 0);
        assert_eq!(content.code_of(ed), 1);
        assert_eq!(content.index_of(1), Some(ed));
        assert_eq!(content.index_of(2), None);
    }

    // --- Test 2: Gelernte Productions bekommen Code 0 ---
    #[test]
    fn lernen_kehrt_codes_um() {
        let mut g = Grammars::new(None);
        let start = g.built_in_element();
        let content = g.get(start).unwrap().content.unwrap();

        g.learn(content, Event::StartElement { qname: QNameId(10), grammar: None }, Some(content))
            .unwrap();
        g.learn(content, Event::Characters(Datatype::String), Some(content)).unwrap();

        let ec = g.get(content).unwrap();
        assert_eq!(ec.len(), 3);
        // Neueste Production zuerst
        assert_eq!(ec.productions[ec.index_of(0).unwrap()].event, Event::Characters(Datatype::String));
        assert_eq!(
            ec.productions[ec.index_of(1).unwrap()].event,
            Event::StartElement { qname: QNameId(10), grammar: None }
        );
        assert_eq!(ec.productions[ec.index_of(2).unwrap()].event, Event::EndElement);
    }

    #[test]
    fn lernen_ist_idempotent() {
        let mut g = Grammars::new(None);
        let start = g.built_in_element();
        g.learn(start, Event::EndElement, None).unwrap();
        g.learn(start, Event::EndElement, None).unwrap();
        assert_eq!(g.get(start).unwrap().len(), 1);
    }

    #[test]
    fn doc_content_lernt_nicht() {
        let mut g = Grammars::new(None);
        let content = g.get(g.document()).unwrap().productions[0].next.unwrap();
        g.learn(content, Event::StartElement { qname: QNameId(3), grammar: None }, None)
            .unwrap();
        assert_eq!(g.get(content).unwrap().len(), 1);
    }

    // --- Test 3: Determinismus ---
    #[test]
    fn lernen_deterministisch() {
        let build = || {
            let mut g = Grammars::new(None);
            let start = g.built_in_element();
            let content = g.get(start).unwrap().content.unwrap();
            for q in [7, 3, 9, 3] {
                g.learn(content, Event::StartElement { qname: QNameId(q), grammar: None }, Some(content))
                    .unwrap();
            }
            g.get(content).unwrap().clone()
        };
        assert_eq!(build(), build());
    }

    // --- Test 4: Level-1 Suche ---
    #[test]
    fn namens_suche_reihenfolge() {
        let g = Grammar::new(
            GrammarFlavor::ElementContent,
            vec![
                Production::new(Event::StartElement { qname: QNameId(5), grammar: None }, None),
                Production::new(Event::StartElementNs(4), None),
                Production::new(Event::StartElementGeneric, None),
            ],
        );
        assert_eq!(g.match_start_element(QNameId(5), 4), Some((0, NameMatch::Exact)));
        assert_eq!(g.match_start_element(QNameId(6), 4), Some((1, NameMatch::Namespace)));
        assert_eq!(g.match_start_element(QNameId(6), 3), Some((2, NameMatch::Any)));
        assert_eq!(g.match_attribute(QNameId(5), 4), None);
    }

    // --- Test 5: Type-Cast Memo ---
    #[test]
    fn type_cast_memoisiert() {
        let mut g = Grammars::new(None);
        let mut nillable = Grammar::new(GrammarFlavor::StartTag, vec![Production::new(Event::EndElement, None)]);
        nillable.nillable = true;
        let base = g.push(nillable);
        let target = g.push(Grammar::new(
            GrammarFlavor::StartTag,
            vec![Production::new(Event::Characters(Datatype::Integer), None)],
        ));

        let before = g.len();
        let derived = g.type_cast(base, target).unwrap();
        assert_ne!(derived, target);
        assert!(g.get(derived).unwrap().nillable);
        assert_eq!(g.type_cast(base, target).unwrap(), derived);
        assert_eq!(g.len(), before + 1);

        // Gleiche Flags: Ziel wird direkt verwendet
        let plain = g.built_in_element();
        assert_eq!(g.type_cast(plain, target).unwrap(), target);
    }

    #[test]
    fn breiten_built_in_start_tag() {
        let mut g = Grammars::new(None);
        let start = g.built_in_element();
        let st = g.get(start).unwrap();
        // Level 2: EE, AT(*), SE(*), CH
        assert_eq!(st.widths(&opts()), CodeWidths::new(0, 4, 0));
        let preserve = Preserve { comments: true, pis: true, ..Default::default() };
        let w = st.widths(&opts().with_preserve(preserve));
        assert_eq!(w, CodeWidths::new(0, 4, 2));
    }
}
