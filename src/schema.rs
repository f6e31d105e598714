//! Schema-informed grammars (EXI 8.5).
//!
//! Der XSD-Compiler ist nicht Teil dieser Crate. [`SchemaBuilder`] nimmt die
//! Schema-Komponenten programmatisch entgegen (Typen, Element- und
//! Attribut-Deklarationen) und übersetzt sie in ein unveränderliches
//! [`SchemaGrammars`], das per `Arc` von beliebig vielen Encodern und
//! Decodern gleichzeitig genutzt werden kann.
//!
//! # Übersetzung
//!
//! ```text
//! Typ T mit Attributen a_0 < a_1 < ... (sortiert nach local-name, URI):
//!   A_0 (StartTag)        AT(a_0) A_1 | ... bis zum ersten required
//!   A_i (AttributeContent)
//!   C_0 ... C_m           Inhalt: Sequenz der expandierten Particles
//!   R_j                   Wiederholung eines unbounded Items
//! ```
//!
//! - Ein Particle `min..max` wird zu `min` Pflicht-Items plus einem
//!   wiederholbaren Item (unbounded) oder `max - min` optionalen Items.
//! - Sind alle folgenden Items/Attribute optional, werden die Productions
//!   des Folgezustands in den aktuellen Zustand übernommen.
//! - Attribut-Productions folgen dem Attribut-Comparator, Inhalts-Productions
//!   der Ordinalordnung der Event-Typen (innerhalb eines Typs Schema-Reihenfolge).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::datatype::Datatype;
use crate::event::{EventType, compare};
use crate::grammar::{Event, Grammar, GrammarFlavor, GrammarId, Production};
use crate::qname::{QName, QNameId, StaticNames, URI_EMPTY, URI_XML, URI_XSI};
use crate::{Error, FastHashMap, Result};

/// Mehr optionale Wiederholungen werden wie `unbounded` behandelt.
const MAX_EXPANDED_OCCURS: usize = 16;

// ============================================================================
// Schema-Komponenten
// ============================================================================

/// Handle of a type registered with a [`SchemaBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDeclaration {
    pub qname: QName,
    pub type_id: TypeId,
    pub nillable: bool,
}

impl ElementDeclaration {
    pub fn new(qname: QName, type_id: TypeId) -> Self {
        Self { qname, type_id, nillable: false }
    }

    pub fn with_nillable(mut self, nillable: bool) -> Self {
        self.nillable = nillable;
        self
    }
}

/// Element particle of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    pub element: ElementDeclaration,
    pub min_occurs: usize,
    pub max_occurs: MaxOccurs,
}

impl Particle {
    pub fn new(element: ElementDeclaration, min_occurs: usize, max_occurs: MaxOccurs) -> Self {
        Self { element, min_occurs, max_occurs }
    }

    pub fn once(qname: QName, type_id: TypeId) -> Self {
        Self::new(ElementDeclaration::new(qname, type_id), 1, MaxOccurs::Bounded(1))
    }

    pub fn optional(qname: QName, type_id: TypeId) -> Self {
        Self::new(ElementDeclaration::new(qname, type_id), 0, MaxOccurs::Bounded(1))
    }

    pub fn zero_or_more(qname: QName, type_id: TypeId) -> Self {
        Self::new(ElementDeclaration::new(qname, type_id), 0, MaxOccurs::Unbounded)
    }

    pub fn one_or_more(qname: QName, type_id: TypeId) -> Self {
        Self::new(ElementDeclaration::new(qname, type_id), 1, MaxOccurs::Unbounded)
    }

    pub fn with_nillable(mut self) -> Self {
        self.element.nillable = true;
        self
    }

    fn validate(&self) -> Result<()> {
        match self.max_occurs {
            MaxOccurs::Bounded(max) if max < self.min_occurs || max == 0 => Err(Error::SchemaError(
                format!("particle {}: maxOccurs {max} < minOccurs {}", self.element.qname, self.min_occurs),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUse {
    pub qname: QName,
    pub datatype: Datatype,
    pub required: bool,
}

impl AttributeUse {
    pub fn required(qname: QName, datatype: Datatype) -> Self {
        Self { qname, datatype, required: true }
    }

    pub fn optional(qname: QName, datatype: Datatype) -> Self {
        Self { qname, datatype, required: false }
    }
}

/// Attribute wildcard of a complex type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeWildcard {
    /// `##any` → AT(*)
    Any,
    /// Namespace-Liste → AT(uri:*) je URI; "" = kein Namespace.
    Namespaces(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Empty,
    Simple(Datatype),
    /// Sequenz von Element-Particles.
    ElementOnly(Vec<Particle>),
    /// Wie `ElementOnly`, plus untypisiertes CH in jedem Inhaltszustand.
    Mixed(Vec<Particle>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexType {
    pub attributes: Vec<AttributeUse>,
    pub wildcard: Option<AttributeWildcard>,
    pub content: ContentType,
}

impl ComplexType {
    pub fn new(content: ContentType) -> Self {
        Self { attributes: Vec::new(), wildcard: None, content }
    }

    pub fn with_attribute(mut self, attribute: AttributeUse) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_wildcard(mut self, wildcard: AttributeWildcard) -> Self {
        self.wildcard = Some(wildcard);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinition {
    Simple(Datatype),
    Complex(ComplexType),
}

// ============================================================================
// Builder
// ============================================================================

/// Collects schema components and compiles them into [`SchemaGrammars`].
///
/// ```
/// use exi_codec::datatype::Datatype;
/// use exi_codec::qname::QName;
/// use exi_codec::schema::{ComplexType, ContentType, Particle, SchemaBuilder};
///
/// let mut builder = SchemaBuilder::new();
/// let int = builder.simple_type(Datatype::Integer);
/// let list = builder.complex_type(ComplexType::new(ContentType::ElementOnly(vec![
///     Particle::zero_or_more(QName::new("", "b"), int),
/// ])));
/// builder.global_element(QName::new("", "a"), list, false);
///
/// let schema = builder.build().unwrap();
/// assert!(schema.element_grammar(&QName::new("", "a")).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    types: Vec<TypeDefinition>,
    named: Vec<(QName, TypeId)>,
    subtypes: Vec<(TypeId, TypeId)>,
    globals: Vec<ElementDeclaration>,
    global_attributes: Vec<(QName, Datatype)>,
    fragment_roots: Vec<ElementDeclaration>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn simple_type(&mut self, datatype: Datatype) -> TypeId {
        self.add_type(TypeDefinition::Simple(datatype))
    }

    pub fn complex_type(&mut self, complex: ComplexType) -> TypeId {
        self.add_type(TypeDefinition::Complex(complex))
    }

    fn add_type(&mut self, definition: TypeDefinition) -> TypeId {
        self.types.push(definition);
        TypeId(self.types.len() - 1)
    }

    /// Benannter Typ: Ziel von xsi:type.
    pub fn named_type(&mut self, qname: QName, type_id: TypeId) -> &mut Self {
        self.named.push((qname, type_id));
        self
    }

    /// `derived` ist ein benannter Subtyp von `base` (macht `base` type-castable).
    pub fn subtype(&mut self, base: TypeId, derived: TypeId) -> &mut Self {
        self.subtypes.push((base, derived));
        self
    }

    pub fn global_element(&mut self, qname: QName, type_id: TypeId, nillable: bool) -> &mut Self {
        self.globals
            .push(ElementDeclaration::new(qname, type_id).with_nillable(nillable));
        self
    }

    pub fn global_attribute(&mut self, qname: QName, datatype: Datatype) -> &mut Self {
        self.global_attributes.push((qname, datatype));
        self
    }

    /// Zusätzliche Wurzel für Fragmente (lokale Deklaration). Globale Elemente
    /// sind immer Fragment-Wurzeln.
    pub fn fragment_root(&mut self, qname: QName, type_id: TypeId, nillable: bool) -> &mut Self {
        self.fragment_roots
            .push(ElementDeclaration::new(qname, type_id).with_nillable(nillable));
        self
    }

    /// Compiles the grammar set.
    ///
    /// # Errors
    ///
    /// `SchemaError` bei unbekannten Typen, doppelten Deklarationen,
    /// ungültigen Particles oder Listen ungeeigneter Item-Typen.
    pub fn build(self) -> Result<SchemaGrammars> {
        self.validate()?;
        let mut names = self.collect_names()?;
        let mut compiler = Compiler::new(&self, &names);

        for index in 0..self.types.len() {
            compiler.compile_type(TypeId(index))?;
        }
        let global_grammars = self
            .globals
            .iter()
            .map(|decl| Ok((compiler.qname_id(&decl.qname)?, compiler.element_grammar(decl))))
            .collect::<Result<Vec<_>>>()?;
        let roots = self
            .globals
            .iter()
            .chain(&self.fragment_roots)
            .map(|decl| Ok((decl.qname.clone(), compiler.qname_id(&decl.qname)?, compiler.element_grammar(decl))))
            .collect::<Result<Vec<_>>>()?;
        compiler.finish_nillable_clones()?;
        let (document, fragment) = compiler.compile_documents(&roots)?;
        let grammars = compiler.into_grammars()?;

        for (id, grammar) in global_grammars {
            if let Some(ctx) = names.context_mut(id) {
                ctx.global_element = Some(grammar);
            }
        }
        for (qname, datatype) in &self.global_attributes {
            let id = lookup(&names, qname)?;
            if let Some(ctx) = names.context_mut(id) {
                ctx.global_attribute = Some(datatype.clone());
            }
        }
        for (qname, type_id) in &self.named {
            let id = lookup(&names, qname)?;
            let start = GrammarId(grammars.type_starts[type_id.0]);
            if let Some(ctx) = names.context_mut(id) {
                ctx.type_grammar = Some(start);
            }
        }

        log::debug!(
            "schema compiled: {} types, {} global elements, {} grammar states",
            self.types.len(),
            self.globals.len(),
            grammars.states.len()
        );
        Ok(SchemaGrammars {
            grammars: grammars.states,
            names: Arc::new(names),
            document,
            fragment,
            empty: grammars.empty,
        })
    }

    fn validate(&self) -> Result<()> {
        let check = |t: TypeId| {
            if t.0 < self.types.len() {
                Ok(())
            } else {
                Err(Error::SchemaError(format!("unknown type {t:?}")))
            }
        };
        for (_, t) in &self.named {
            check(*t)?;
        }
        for (base, derived) in &self.subtypes {
            check(*base)?;
            check(*derived)?;
        }
        for decl in self.globals.iter().chain(&self.fragment_roots) {
            check(decl.type_id)?;
        }

        let mut seen = BTreeSet::new();
        for decl in &self.globals {
            if !seen.insert(&decl.qname) {
                return Err(Error::SchemaError(format!("duplicate global element {}", decl.qname)));
            }
        }

        for definition in &self.types {
            let (attributes, content) = match definition {
                TypeDefinition::Simple(dt) => {
                    check_datatype(dt)?;
                    continue;
                }
                TypeDefinition::Complex(c) => (&c.attributes, &c.content),
            };
            let mut attr_names = BTreeSet::new();
            for attr in attributes {
                check_datatype(&attr.datatype)?;
                if !attr_names.insert(&attr.qname) {
                    return Err(Error::SchemaError(format!("duplicate attribute use {}", attr.qname)));
                }
            }
            match content {
                ContentType::Empty => {}
                ContentType::Simple(dt) => check_datatype(dt)?,
                ContentType::ElementOnly(particles) | ContentType::Mixed(particles) => {
                    for p in particles {
                        p.validate()?;
                        check(p.element.type_id)?;
                    }
                }
            }
        }
        for (_, dt) in &self.global_attributes {
            check_datatype(dt)?;
        }
        Ok(())
    }

    /// Vorbefüllte Namenstabellen: "", XML, XSI, dann alle weiteren URIs sortiert.
    fn collect_names(&self) -> Result<StaticNames> {
        let mut uris: BTreeMap<Arc<str>, BTreeSet<Arc<str>>> = BTreeMap::new();
        let mut qnames: Vec<QName> = ["base", "id", "lang", "space"]
            .into_iter()
            .map(|local| QName::new(URI_XML, local))
            .collect();
        qnames.push(QName::xsi_nil());
        qnames.push(QName::xsi_type());
        qnames.extend(self.globals.iter().chain(&self.fragment_roots).map(|d| d.qname.clone()));
        qnames.extend(self.named.iter().map(|(q, _)| q.clone()));
        qnames.extend(self.global_attributes.iter().map(|(q, _)| q.clone()));
        for definition in &self.types {
            let TypeDefinition::Complex(complex) = definition else { continue };
            qnames.extend(complex.attributes.iter().map(|a| a.qname.clone()));
            if let ContentType::ElementOnly(particles) | ContentType::Mixed(particles) = &complex.content {
                qnames.extend(particles.iter().map(|p| p.element.qname.clone()));
            }
            if let Some(AttributeWildcard::Namespaces(list)) = &complex.wildcard {
                for uri in list {
                    uris.entry(Arc::from(uri.as_str())).or_default();
                }
            }
        }
        for qname in qnames {
            uris.entry(qname.uri).or_default().insert(qname.local_name);
        }

        let mut ordered = Vec::with_capacity(uris.len() + 3);
        for fixed in [URI_EMPTY, URI_XML, URI_XSI] {
            let locals = uris.remove(fixed).unwrap_or_default();
            ordered.push((Arc::from(fixed), locals.into_iter().collect()));
        }
        ordered.extend(uris.into_iter().map(|(uri, locals)| (uri, locals.into_iter().collect())));
        StaticNames::new(ordered)
    }
}

fn check_datatype(datatype: &Datatype) -> Result<()> {
    match datatype {
        Datatype::List(item) if !item.is_valid_list_item() => {
            Err(Error::SchemaError(format!("{item} cannot be a list item type")))
        }
        Datatype::BoundedInteger { lower, upper } if lower > upper => {
            Err(Error::SchemaError(format!("empty integer range [{lower}, {upper}]")))
        }
        Datatype::Enumeration(values) if values.is_empty() => {
            Err(Error::SchemaError("empty enumeration".into()))
        }
        _ => Ok(()),
    }
}

fn lookup(names: &StaticNames, qname: &QName) -> Result<QNameId> {
    names
        .lookup_qname(qname)
        .ok_or_else(|| Error::SchemaError(format!("name {qname} missing from name tables")))
}

// ============================================================================
// Compiler
// ============================================================================

struct Compiled {
    states: Vec<Grammar>,
    type_starts: Vec<u32>,
    empty: GrammarId,
}

/// Occurrence of one expanded sequence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurrence {
    Required,
    Optional,
    Repeating,
}

struct Compiler<'a> {
    builder: &'a SchemaBuilder,
    names: &'a StaticNames,
    /// `None` = reserviert, noch nicht gefüllt.
    states: Vec<Option<Grammar>>,
    type_starts: Vec<GrammarId>,
    castable: Vec<bool>,
    nillable_starts: FastHashMap<TypeId, GrammarId>,
    empty: GrammarId,
}

impl<'a> Compiler<'a> {
    fn new(builder: &'a SchemaBuilder, names: &'a StaticNames) -> Self {
        let mut castable = vec![false; builder.types.len()];
        for (base, _) in &builder.subtypes {
            castable[base.0] = true;
        }
        let mut compiler = Self {
            builder,
            names,
            states: Vec::new(),
            type_starts: Vec::new(),
            castable,
            nillable_starts: FastHashMap::default(),
            empty: GrammarId(0),
        };
        compiler.empty = compiler.push(Grammar::new(
            GrammarFlavor::AttributeContent,
            vec![Production::new(Event::EndElement, None)],
        ));
        compiler.type_starts = (0..builder.types.len()).map(|_| compiler.reserve()).collect();
        compiler
    }

    fn reserve(&mut self) -> GrammarId {
        self.states.push(None);
        GrammarId((self.states.len() - 1) as u32)
    }

    fn push(&mut self, grammar: Grammar) -> GrammarId {
        self.states.push(Some(grammar));
        GrammarId((self.states.len() - 1) as u32)
    }

    fn set(&mut self, id: GrammarId, grammar: Grammar) {
        self.states[id.index()] = Some(grammar);
    }

    fn productions(&self, id: GrammarId) -> Result<&[Production]> {
        self.states
            .get(id.index())
            .and_then(Option::as_ref)
            .map(|g| g.productions.as_slice())
            .ok_or_else(|| Error::SchemaError(format!("grammar {id} used before it was compiled")))
    }

    fn qname_id(&self, qname: &QName) -> Result<QNameId> {
        lookup(self.names, qname)
    }

    /// Grammar einer Element-Deklaration; nillable Varianten einmal je Typ.
    fn element_grammar(&mut self, decl: &ElementDeclaration) -> GrammarId {
        if !decl.nillable {
            return self.type_starts[decl.type_id.0];
        }
        if let Some(&id) = self.nillable_starts.get(&decl.type_id) {
            return id;
        }
        let id = self.reserve();
        self.nillable_starts.insert(decl.type_id, id);
        id
    }

    fn start_element(&mut self, decl: &ElementDeclaration) -> Result<Event> {
        Ok(Event::StartElement {
            qname: self.qname_id(&decl.qname)?,
            grammar: Some(self.element_grammar(decl)),
        })
    }

    fn compile_type(&mut self, type_id: TypeId) -> Result<()> {
        let builder = self.builder;
        let (attributes, wildcard, content) = match &builder.types[type_id.0] {
            TypeDefinition::Simple(dt) => (Vec::new(), None, ContentType::Simple(dt.clone())),
            TypeDefinition::Complex(c) => (c.attributes.clone(), c.wildcard.clone(), c.content.clone()),
        };
        let content_start = self.compile_content(&content)?;
        self.compile_attributes(type_id, attributes, wildcard.as_ref(), content_start)
    }

    fn compile_attributes(
        &mut self,
        type_id: TypeId,
        mut attributes: Vec<AttributeUse>,
        wildcard: Option<&AttributeWildcard>,
        content_start: GrammarId,
    ) -> Result<()> {
        attributes.sort_by(|a, b| {
            compare(EventType::Attribute, Some(&a.qname), EventType::Attribute, Some(&b.qname))
        });
        let n = attributes.len();
        let content_productions = self.productions(content_start)?.to_vec();

        let mut ids = Vec::with_capacity(n + 1);
        ids.push(self.type_starts[type_id.0]);
        for _ in 1..n {
            ids.push(self.reserve());
        }
        // A_n bleibt ein Attribut-Zustand: AT(*) und AT [untyped] auch nach
        // dem letzten deklarierten Attribut (EXI 8.5.4.4.1, j = content)
        if n > 0 {
            ids.push(self.reserve());
        }

        let wildcard_events: Vec<Event> = match wildcard {
            None => Vec::new(),
            Some(AttributeWildcard::Any) => vec![Event::AttributeGeneric],
            Some(AttributeWildcard::Namespaces(list)) => {
                let mut uris: Vec<&String> = list.iter().collect();
                uris.sort();
                uris.dedup();
                uris.iter()
                    .map(|uri| {
                        self.names
                            .lookup_uri(uri)
                            .map(Event::AttributeNs)
                            .ok_or_else(|| Error::SchemaError(format!("namespace {uri} missing")))
                    })
                    .collect::<Result<_>>()?
            }
        };

        let states = ids.len();
        for i in 0..states {
            let id = ids[i];
            let mut productions = Vec::new();
            let mut all_optional = true;
            for j in i..n {
                let attr = &attributes[j];
                productions.push(Production::new(
                    Event::Attribute { qname: self.qname_id(&attr.qname)?, datatype: attr.datatype.clone() },
                    Some(ids[j + 1]),
                ));
                if attr.required {
                    all_optional = false;
                    break;
                }
            }
            productions.extend(wildcard_events.iter().map(|e| Production::new(e.clone(), Some(id))));
            if all_optional {
                productions.extend(content_productions.iter().cloned());
            }
            let productions = normalize(productions);

            let flavor = if i == 0 { GrammarFlavor::StartTag } else { GrammarFlavor::AttributeContent };
            let mut grammar = Grammar::new(flavor, productions);
            grammar.content = Some(content_start);
            if i == 0 {
                grammar.type_castable = self.castable[type_id.0];
                grammar.empty = Some(self.empty);
            }
            self.set(id, grammar);
        }
        Ok(())
    }

    /// Inhaltszustände; gibt C_0 zurück.
    fn compile_content(&mut self, content: &ContentType) -> Result<GrammarId> {
        match content {
            ContentType::Empty => Ok(self.push(Grammar::new(
                GrammarFlavor::ElementContent,
                vec![Production::new(Event::EndElement, None)],
            ))),
            ContentType::Simple(dt) => {
                let end = self.push(Grammar::new(
                    GrammarFlavor::ElementContent,
                    vec![Production::new(Event::EndElement, None)],
                ));
                Ok(self.push(Grammar::new(
                    GrammarFlavor::ElementContent,
                    vec![Production::new(Event::Characters(dt.clone()), Some(end))],
                )))
            }
            ContentType::ElementOnly(particles) => self.compile_sequence(particles, false),
            ContentType::Mixed(particles) => self.compile_sequence(particles, true),
        }
    }

    fn compile_sequence(&mut self, particles: &[Particle], mixed: bool) -> Result<GrammarId> {
        let mut items: Vec<(&ElementDeclaration, Occurrence)> = Vec::new();
        for p in particles {
            items.extend(std::iter::repeat_n((&p.element, Occurrence::Required), p.min_occurs));
            match p.max_occurs {
                MaxOccurs::Unbounded => items.push((&p.element, Occurrence::Repeating)),
                MaxOccurs::Bounded(max) if max - p.min_occurs > MAX_EXPANDED_OCCURS => {
                    items.push((&p.element, Occurrence::Repeating));
                }
                MaxOccurs::Bounded(max) => {
                    items.extend(std::iter::repeat_n((&p.element, Occurrence::Optional), max - p.min_occurs));
                }
            }
        }

        let m = items.len();
        let c_ids: Vec<GrammarId> = (0..=m).map(|_| self.reserve()).collect();
        let r_ids: Vec<Option<GrammarId>> = items
            .iter()
            .map(|(_, occ)| (*occ == Occurrence::Repeating).then(|| self.reserve()))
            .collect();
        let mut events = Vec::with_capacity(m);
        for (decl, _) in &items {
            events.push(self.start_element(decl)?);
        }
        let next = |j: usize| r_ids[j].unwrap_or(c_ids[j + 1]);

        // C_k ohne Mixed-CH
        let mut content: Vec<Vec<Production>> = Vec::with_capacity(m + 1);
        for k in 0..=m {
            let mut productions = Vec::new();
            let mut all_optional = true;
            for j in k..m {
                productions.push(Production::new(events[j].clone(), Some(next(j))));
                if items[j].1 == Occurrence::Required {
                    all_optional = false;
                    break;
                }
            }
            if all_optional {
                productions.push(Production::new(Event::EndElement, None));
            }
            content.push(productions);
        }

        let mixed_ch = |id: GrammarId| Production::new(Event::Characters(Datatype::String), Some(id));
        for j in 0..m {
            let Some(r) = r_ids[j] else { continue };
            let mut productions = vec![Production::new(events[j].clone(), Some(r))];
            productions.extend(content[j + 1].iter().cloned());
            if mixed {
                productions.push(mixed_ch(r));
            }
            self.set(r, Grammar::new(GrammarFlavor::ElementContent, normalize(productions)));
        }
        for (k, mut productions) in content.into_iter().enumerate() {
            if mixed {
                productions.push(mixed_ch(c_ids[k]));
            }
            self.set(c_ids[k], Grammar::new(GrammarFlavor::ElementContent, normalize(productions)));
        }
        Ok(c_ids[0])
    }

    fn finish_nillable_clones(&mut self) -> Result<()> {
        let clones: Vec<(TypeId, GrammarId)> = self.nillable_starts.iter().map(|(t, id)| (*t, *id)).collect();
        for (type_id, id) in clones {
            let start = self.type_starts[type_id.0];
            let mut grammar = self
                .states
                .get(start.index())
                .and_then(Option::clone)
                .ok_or_else(|| Error::SchemaError(format!("type grammar {start} missing")))?;
            grammar.nillable = true;
            self.set(id, grammar);
        }
        Ok(())
    }

    /// EXI 8.5.1 und 8.5.2.
    fn compile_documents(
        &mut self,
        roots: &[(QName, QNameId, GrammarId)],
    ) -> Result<(GrammarId, GrammarId)> {
        let mut sorted: Vec<&(QName, QNameId, GrammarId)> = roots.iter().collect();
        sorted.sort_by(|a, b| compare(EventType::StartElement, Some(&a.0), EventType::StartElement, Some(&b.0)));
        sorted.dedup_by(|a, b| a.0 == b.0);
        let builder = self.builder;
        let globals: BTreeSet<&QName> = builder.globals.iter().map(|d| &d.qname).collect();

        let doc_end = self.push(Grammar::new(
            GrammarFlavor::DocEnd,
            vec![Production::new(Event::EndDocument, None)],
        ));
        let mut doc_productions: Vec<Production> = sorted
            .iter()
            .filter(|(q, _, _)| globals.contains(q))
            .map(|(_, id, g)| Production::new(Event::StartElement { qname: *id, grammar: Some(*g) }, Some(doc_end)))
            .collect();
        doc_productions.push(Production::new(Event::StartElementGeneric, Some(doc_end)));
        let doc_content = self.push(Grammar::new(GrammarFlavor::DocContent, doc_productions));
        let document = self.push(Grammar::new(
            GrammarFlavor::Document,
            vec![Production::new(Event::StartDocument, Some(doc_content))],
        ));

        let fragment_content = self.reserve();
        let mut fragment_productions: Vec<Production> = sorted
            .iter()
            .map(|(_, id, g)| {
                Production::new(Event::StartElement { qname: *id, grammar: Some(*g) }, Some(fragment_content))
            })
            .collect();
        fragment_productions.push(Production::new(Event::StartElementGeneric, Some(fragment_content)));
        fragment_productions.push(Production::new(Event::EndDocument, None));
        self.set(fragment_content, Grammar::new(GrammarFlavor::FragmentContent, fragment_productions));
        let fragment = self.push(Grammar::new(
            GrammarFlavor::Fragment,
            vec![Production::new(Event::StartDocument, Some(fragment_content))],
        ));
        Ok((document, fragment))
    }

    fn into_grammars(self) -> Result<Compiled> {
        let states = self
            .states
            .into_iter()
            .enumerate()
            .map(|(i, g)| g.ok_or_else(|| Error::SchemaError(format!("grammar #{i} never compiled"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Compiled {
            states,
            type_starts: self.type_starts.iter().map(|id| id.0).collect(),
            empty: self.empty,
        })
    }
}

/// Entfernt doppelte Events (erstes gewinnt) und sortiert stabil nach
/// Ordinalordnung des Event-Typs.
fn normalize(productions: Vec<Production>) -> Vec<Production> {
    let mut seen: BTreeSet<(EventType, Option<QNameId>)> = BTreeSet::new();
    let mut unique: Vec<Production> = productions
        .into_iter()
        .filter(|p| {
            let key = match &p.event {
                Event::StartElementNs(uri) | Event::AttributeNs(uri) => (p.event.event_type(), Some(QNameId(*uri))),
                other => (other.event_type(), other.qname()),
            };
            seen.insert(key)
        })
        .collect();
    unique.sort_by_key(|p| p.event.event_type());
    unique
}

// ============================================================================
// SchemaGrammars
// ============================================================================

/// Immutable, shareable result of a schema compilation.
#[derive(Debug, Clone)]
pub struct SchemaGrammars {
    grammars: Vec<Grammar>,
    names: Arc<StaticNames>,
    document: GrammarId,
    fragment: GrammarId,
    empty: GrammarId,
}

impl SchemaGrammars {
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    pub fn grammar(&self, id: GrammarId) -> Option<&Grammar> {
        self.grammars.get(id.index())
    }

    pub fn names(&self) -> &Arc<StaticNames> {
        &self.names
    }

    pub fn document(&self) -> GrammarId {
        self.document
    }

    pub fn fragment(&self) -> GrammarId {
        self.fragment
    }

    /// Zustand nach xsi:nil="true".
    pub fn empty(&self) -> GrammarId {
        self.empty
    }

    pub fn element_grammar(&self, qname: &QName) -> Option<GrammarId> {
        let id = self.names.lookup_qname(qname)?;
        self.names.context(id)?.global_element
    }

    pub fn type_grammar(&self, qname: &QName) -> Option<GrammarId> {
        let id = self.names.lookup_qname(qname)?;
        self.names.context(id)?.type_grammar
    }
}

/// Where an encoder or decoder takes its grammars from.
#[derive(Debug, Clone, Default)]
pub enum GrammarSource {
    /// Schema-los: Built-in Grammars, die zur Laufzeit lernen.
    #[default]
    BuiltIn,
    Schema(Arc<SchemaGrammars>),
}

impl GrammarSource {
    pub fn schema(&self) -> Option<&Arc<SchemaGrammars>> {
        match self {
            Self::BuiltIn => None,
            Self::Schema(schema) => Some(schema),
        }
    }
}

impl From<SchemaGrammars> for GrammarSource {
    fn from(schema: SchemaGrammars) -> Self {
        Self::Schema(Arc::new(schema))
    }
}

impl From<Arc<SchemaGrammars>> for GrammarSource {
    fn from(schema: Arc<SchemaGrammars>) -> Self {
        Self::Schema(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ExiOptions;
    use crate::undeclared::Undeclared;

    fn q(local: &str) -> QName {
        QName::new("", local)
    }

    fn events(schema: &SchemaGrammars, id: GrammarId) -> Vec<String> {
        let grammar = schema.grammar(id).unwrap();
        grammar
            .productions
            .iter()
            .map(|p| match &p.event {
                Event::StartElement { qname, .. } => {
                    format!("SE({})", schema.names().context(*qname).unwrap().qname)
                }
                Event::Attribute { qname, .. } => {
                    format!("AT({})", schema.names().context(*qname).unwrap().qname)
                }
                other => other.event_type().abbreviation().to_string(),
            })
            .collect()
    }

    fn next(schema: &SchemaGrammars, id: GrammarId, index: usize) -> GrammarId {
        schema.grammar(id).unwrap().productions[index].next.unwrap()
    }

    /// `<a>` enthält beliebig viele `<b>` vom Typ int.
    fn repeated_b() -> SchemaGrammars {
        let mut builder = SchemaBuilder::new();
        let int = builder.simple_type(Datatype::Integer);
        let a = builder.complex_type(ComplexType::new(ContentType::ElementOnly(vec![
            Particle::zero_or_more(q("b"), int),
        ])));
        builder.global_element(q("a"), a, false);
        builder.build().unwrap()
    }

    // --- Test 1: Wiederholung teilt einen Zustand ---
    #[test]
    fn unbounded_particle() {
        let schema = repeated_b();
        let a = schema.element_grammar(&q("a")).unwrap();
        assert_eq!(events(&schema, a), ["SE(b)", "EE"]);

        let repeat = next(&schema, a, 0);
        assert_eq!(events(&schema, repeat), ["SE(b)", "EE"]);
        assert_eq!(next(&schema, repeat, 0), repeat);

        // Beide b teilen dieselbe Element-Grammar
        let Event::StartElement { grammar: Some(b1), .. } = schema.grammar(a).unwrap().productions[0].event else {
            panic!("SE erwartet")
        };
        let Event::StartElement { grammar: Some(b2), .. } = schema.grammar(repeat).unwrap().productions[0].event
        else {
            panic!("SE erwartet")
        };
        assert_eq!(b1, b2);
        assert_eq!(events(&schema, b1), ["CH"]);
    }

    // --- Test 2: Pflicht- und optionale Items ---
    #[test]
    fn min_max_expansion() {
        let mut builder = SchemaBuilder::new();
        let s = builder.simple_type(Datatype::String);
        let t = builder.complex_type(ComplexType::new(ContentType::ElementOnly(vec![
            Particle::new(ElementDeclaration::new(q("x"), s), 1, MaxOccurs::Bounded(2)),
            Particle::optional(q("y"), s),
            Particle::once(q("z"), s),
        ])));
        builder.global_element(q("r"), t, false);
        let schema = builder.build().unwrap();

        let c0 = schema.element_grammar(&q("r")).unwrap();
        assert_eq!(events(&schema, c0), ["SE(x)"]);
        let c1 = next(&schema, c0, 0);
        // x optional, y optional, z required
        assert_eq!(events(&schema, c1), ["SE(x)", "SE(y)", "SE(z)"]);
        let after_y = next(&schema, c1, 1);
        assert_eq!(events(&schema, after_y), ["SE(z)"]);
        let end = next(&schema, after_y, 0);
        assert_eq!(events(&schema, end), ["EE"]);
    }

    // --- Test 3: Attribute (EXI 8.5.4.1.4) ---
    #[test]
    fn attribut_zustaende() {
        let mut builder = SchemaBuilder::new();
        let empty = builder.complex_type(
            ComplexType::new(ContentType::Empty)
                .with_attribute(AttributeUse::optional(q("sku"), Datatype::String))
                .with_attribute(AttributeUse::required(q("color"), Datatype::String))
                .with_attribute(AttributeUse::optional(QName::new("urn:x", "alt"), Datatype::Integer)),
        );
        builder.global_element(q("item"), empty, false);
        let schema = builder.build().unwrap();

        let a0 = schema.element_grammar(&q("item")).unwrap();
        let start = schema.grammar(a0).unwrap();
        assert_eq!(start.flavor, GrammarFlavor::StartTag);
        assert!(start.first_start_tag);
        // Sortiert: alt (urn:x), color, sku; color ist required
        assert_eq!(events(&schema, a0), ["AT({urn:x}alt)", "AT(color)"]);

        let a1 = next(&schema, a0, 0);
        assert_eq!(schema.grammar(a1).unwrap().flavor, GrammarFlavor::AttributeContent);
        assert_eq!(events(&schema, a1), ["AT(color)"]);
        let a2 = next(&schema, a1, 0);
        assert_eq!(events(&schema, a2), ["AT(sku)", "EE"]);
        assert_eq!(next(&schema, a0, 1), a2);

        // Nach dem letzten Attribut: eigener Zustand, nicht geteilter Inhalt
        let a3 = next(&schema, a2, 0);
        let last = schema.grammar(a3).unwrap();
        assert_eq!(last.flavor, GrammarFlavor::AttributeContent);
        assert_eq!(events(&schema, a3), ["EE"]);
        let slots = last.second_level(&ExiOptions::default());
        assert!(slots.position(Undeclared::AttributeGeneric).is_some());
        assert!(slots.position(Undeclared::AttributeInvalidValue).is_some());
    }

    #[test]
    fn attribut_wildcard() {
        let mut builder = SchemaBuilder::new();
        let t = builder.complex_type(
            ComplexType::new(ContentType::Simple(Datatype::Boolean))
                .with_wildcard(AttributeWildcard::Namespaces(vec!["urn:w".into()])),
        );
        builder.global_element(q("flag"), t, false);
        let schema = builder.build().unwrap();

        let a0 = schema.element_grammar(&q("flag")).unwrap();
        assert_eq!(events(&schema, a0), ["AT(uri:*)", "CH"]);
        assert_eq!(next(&schema, a0, 0), a0);
    }

    // --- Test 4: Dokument- und Fragment-Grammar ---
    #[test]
    fn dokument_grammar_sortiert() {
        let mut builder = SchemaBuilder::new();
        let s = builder.simple_type(Datatype::String);
        builder.global_element(q("zeta"), s, false);
        builder.global_element(QName::new("urn:b", "alpha"), s, false);
        builder.global_element(QName::new("urn:a", "alpha"), s, false);
        builder.fragment_root(q("local"), s, false);
        let schema = builder.build().unwrap();

        let doc_content = next(&schema, schema.document(), 0);
        assert_eq!(
            events(&schema, doc_content),
            ["SE({urn:a}alpha)", "SE({urn:b}alpha)", "SE(zeta)", "SE(*)"]
        );
        let fragment_content = next(&schema, schema.fragment(), 0);
        assert_eq!(
            events(&schema, fragment_content),
            ["SE({urn:a}alpha)", "SE({urn:b}alpha)", "SE(local)", "SE(zeta)", "SE(*)", "ED"]
        );
    }

    // --- Test 5: nillable und type-castable ---
    #[test]
    fn nillable_klon() {
        let mut builder = SchemaBuilder::new();
        let base = builder.simple_type(Datatype::Decimal);
        let derived = builder.simple_type(Datatype::Integer);
        builder.named_type(QName::new("urn:t", "derived"), derived);
        builder.subtype(base, derived);
        builder.global_element(q("n"), base, true);
        builder.global_element(q("m"), base, false);
        let schema = builder.build().unwrap();

        let n = schema.grammar(schema.element_grammar(&q("n")).unwrap()).unwrap();
        let m = schema.grammar(schema.element_grammar(&q("m")).unwrap()).unwrap();
        assert!(n.nillable && n.type_castable);
        assert!(!m.nillable && m.type_castable);
        assert_eq!(n.productions, m.productions);
        assert_eq!(n.empty, Some(schema.empty()));

        let strict = ExiOptions::default().with_strict();
        assert_eq!(n.second_level(&strict).len(), 2);
        assert_eq!(m.second_level(&strict).len(), 1);
        assert!(schema.type_grammar(&QName::new("urn:t", "derived")).is_some());
    }

    // --- Test 6: Namenstabellen ---
    #[test]
    fn namenstabellen_vorbefuellt() {
        let schema = repeated_b();
        let names = schema.names();
        assert_eq!(names.uri_count(), 3);
        let b = names.lookup_qname(&q("b")).unwrap();
        let a = names.lookup_qname(&q("a")).unwrap();
        // Sortiert: a vor b
        assert!(a < b);
        assert!(names.context(a).unwrap().global_element.is_some());
        assert!(names.context(b).unwrap().global_element.is_none());
    }

    // --- Test 7: Fehler ---
    #[test]
    fn ungueltige_schemas() {
        let mut builder = SchemaBuilder::new();
        let s = builder.simple_type(Datatype::String);
        builder.global_element(q("a"), s, false);
        builder.global_element(q("a"), s, false);
        assert!(matches!(builder.build(), Err(Error::SchemaError(_))));

        let mut builder = SchemaBuilder::new();
        builder.global_element(q("a"), TypeId(5), false);
        assert!(matches!(builder.build(), Err(Error::SchemaError(_))));

        let mut builder = SchemaBuilder::new();
        let s = builder.simple_type(Datatype::String);
        builder.complex_type(ComplexType::new(ContentType::ElementOnly(vec![Particle::new(
            ElementDeclaration::new(q("x"), s),
            3,
            MaxOccurs::Bounded(2),
        )])));
        assert!(matches!(builder.build(), Err(Error::SchemaError(_))));

        let mut builder = SchemaBuilder::new();
        builder.simple_type(Datatype::list(Datatype::QName));
        assert!(matches!(builder.build(), Err(Error::SchemaError(_))));
    }

    #[test]
    fn gemischter_inhalt() {
        let mut builder = SchemaBuilder::new();
        let s = builder.simple_type(Datatype::String);
        let t = builder.complex_type(ComplexType::new(ContentType::Mixed(vec![Particle::optional(q("em"), s)])));
        builder.global_element(q("p"), t, false);
        let schema = builder.build().unwrap();
        let p = schema.element_grammar(&q("p")).unwrap();
        assert_eq!(events(&schema, p), ["SE(em)", "EE", "CH"]);
    }

    #[test]
    fn send_und_sync() {
        fn assert_shareable<T: Send + Sync>() {}
        assert_shareable::<SchemaGrammars>();
        assert_shareable::<GrammarSource>();
    }
}
