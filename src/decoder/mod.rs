//! EXI body decoder (EXI 6, 8.4, 8.5).
//!
//! Spiegelt den Encoder: Event Code lesen, Production bzw. Level-2/3 Slot
//! auflösen, Inhalt lesen, Zustand wechseln und in Built-in Zuständen genau
//! dieselben Productions lernen. Dekodierte Events landen in einer Queue,
//! aus der die Pull-API liest.
//!
//! # Beispiel
//!
//! ```
//! use exi_codec::decoder::decode;
//! use exi_codec::encoder::encode;
//! use exi_codec::event::ExiEvent;
//! use exi_codec::options::ExiOptions;
//! use exi_codec::qname::QName;
//! use exi_codec::schema::GrammarSource;
//!
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::StartElement(QName::new("", "root")),
//!     ExiEvent::characters("hi"),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let options = ExiOptions::default();
//! let bytes = encode(&events, &GrammarSource::BuiltIn, &options).unwrap();
//! assert_eq!(decode(&bytes, &GrammarSource::BuiltIn, &options).unwrap(), events);
//! ```

mod compression;
mod value;

use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;

use crate::bitstream::BitDecoderChannel;
use crate::bytestream::ByteDecoderChannel;
use crate::channel::DecoderChannel;
use crate::compression::Block;
use crate::context::{CodingContext, NamespaceScope, xsi_attribute};
use crate::datatype::{Datatype, TypedValue};
use crate::event::{
    AtContent, CmContent, DtContent, ErContent, EventType, ExiEvent, NsContent, PiContent,
};
use crate::event_code;
use crate::grammar::{Event, GrammarId, Production};
use crate::header::{self, ExiHeader};
use crate::options::{Alignment, ExiOptions};
use crate::qname::{QName, QNameId};
use crate::schema::GrammarSource;
use crate::string;
use crate::undeclared::{self, Undeclared};
use crate::{Error, Result};

use compression::BlockReader;

/// Physical source of event codes and content.
enum Input<R: Read> {
    Bit(BitDecoderChannel<R>),
    Byte(ByteDecoderChannel<R>),
    Blocks(BlockReader),
}

impl<R: Read> Input<R> {
    fn structure(&mut self) -> &mut dyn DecoderChannel {
        match self {
            Self::Bit(ch) => ch,
            Self::Byte(ch) => ch,
            Self::Blocks(blocks) => blocks.channel(),
        }
    }
}

#[derive(Debug)]
struct Frame {
    element: Option<QNameId>,
    qname: Option<QName>,
    grammar: GrammarId,
    start: GrammarId,
    ns_mark: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prolog,
    Body,
    Finished,
}

/// Platzhalter für einen Value, der erst nach dem Structure Channel des
/// Blocks gelesen wird: Index des Events und Datentyp.
#[derive(Debug)]
struct DeferredValue {
    event: usize,
    datatype: Datatype,
}

/// Pull-style decoder.
///
/// [`next_event_type`](Self::next_event_type) liest und löst den nächsten
/// Event Code auf; danach holt das passende `decode_*` den Inhalt ab. Wer nur
/// Events will, nimmt [`decode_event`](Self::decode_event) oder iteriert.
pub struct Decoder<R: Read> {
    input: Input<R>,
    options: ExiOptions,
    header: ExiHeader,
    ctx: CodingContext,
    scope: NamespaceScope,
    stack: Vec<Frame>,
    phase: Phase,
    /// Fertig dekodierte Events.
    queue: VecDeque<(EventType, ExiEvent)>,
    /// Events des laufenden Schritts bzw. Blocks, Values evtl. noch offen.
    staged: Vec<(EventType, ExiEvent)>,
    block: Block<DeferredValue>,
    failed: bool,
}

impl<R: Read> Decoder<R> {
    /// Reads the header and prepares the body channel.
    ///
    /// # Errors
    ///
    /// - Konfigurationsfehler aus [`CodingContext::new`]
    /// - Header-Fehler (Distinguishing Bits, Version, In-Band Options)
    pub fn new(source: R, grammars: &GrammarSource, options: ExiOptions) -> Result<Self> {
        let ctx = CodingContext::new(grammars, &options)?;
        let alignment = options.effective_alignment();
        let mut bits = BitDecoderChannel::new(source);
        let header = header::decode(&mut bits, alignment != Alignment::BitPacked)?;
        let input = match alignment {
            Alignment::BitPacked => Input::Bit(bits),
            Alignment::ByteAlignment => Input::Byte(ByteDecoderChannel::from_source(bits.into_source())),
            Alignment::PreCompression => {
                let data = bits.into_source().read_to_end()?;
                Input::Blocks(BlockReader::new(data, options.compression()))
            }
        };
        log::debug!(
            "decoder ready: alignment {alignment:?}, compression {}, cookie {}",
            options.compression(),
            header.cookie()
        );

        Ok(Self {
            input,
            options,
            header,
            ctx,
            scope: NamespaceScope::new(),
            stack: Vec::new(),
            phase: Phase::Prolog,
            queue: VecDeque::new(),
            staged: Vec::new(),
            block: Block::new(),
            failed: false,
        })
    }

    pub fn options(&self) -> &ExiOptions {
        &self.options
    }

    pub fn header(&self) -> &ExiHeader {
        &self.header
    }

    // ------------------------------------------------------------------------
    // Pull API
    // ------------------------------------------------------------------------

    /// Type of the pending event, `None` after ED.
    pub fn next_event_type(&mut self) -> Result<Option<EventType>> {
        self.fill()?;
        Ok(self.queue.front().map(|(ty, _)| *ty))
    }

    /// Next event with its content, `None` after ED.
    pub fn decode_event(&mut self) -> Result<Option<ExiEvent>> {
        self.fill()?;
        Ok(self.queue.pop_front().map(|(_, event)| event))
    }

    pub fn decode_start_document(&mut self) -> Result<()> {
        self.take("SD", |e| matches!(e, ExiEvent::StartDocument).then_some(()))
    }

    pub fn decode_end_document(&mut self) -> Result<()> {
        self.take("ED", |e| matches!(e, ExiEvent::EndDocument).then_some(()))
    }

    pub fn decode_start_element(&mut self) -> Result<QName> {
        self.take("SE", |e| match e {
            ExiEvent::StartElement(qname) => Some(qname.clone()),
            _ => None,
        })
    }

    pub fn decode_end_element(&mut self) -> Result<()> {
        self.take("EE", |e| matches!(e, ExiEvent::EndElement).then_some(()))
    }

    pub fn decode_attribute(&mut self) -> Result<AtContent> {
        self.take("AT", |e| match e {
            ExiEvent::Attribute(at) => Some(at.clone()),
            _ => None,
        })
    }

    pub fn decode_characters(&mut self) -> Result<Arc<str>> {
        self.take("CH", |e| match e {
            ExiEvent::Characters(ch) => Some(Arc::clone(&ch.value)),
            _ => None,
        })
    }

    pub fn decode_namespace_declaration(&mut self) -> Result<NsContent> {
        self.take("NS", |e| match e {
            ExiEvent::NamespaceDeclaration(ns) => Some(ns.clone()),
            _ => None,
        })
    }

    pub fn decode_comment(&mut self) -> Result<Arc<str>> {
        self.take("CM", |e| match e {
            ExiEvent::Comment(cm) => Some(Arc::clone(&cm.text)),
            _ => None,
        })
    }

    pub fn decode_processing_instruction(&mut self) -> Result<PiContent> {
        self.take("PI", |e| match e {
            ExiEvent::ProcessingInstruction(pi) => Some(pi.clone()),
            _ => None,
        })
    }

    pub fn decode_doc_type(&mut self) -> Result<DtContent> {
        self.take("DT", |e| match e {
            ExiEvent::DocType(dt) => Some(dt.clone()),
            _ => None,
        })
    }

    pub fn decode_entity_reference(&mut self) -> Result<Arc<str>> {
        self.take("ER", |e| match e {
            ExiEvent::EntityReference(er) => Some(Arc::clone(&er.name)),
            _ => None,
        })
    }

    /// Entnimmt das anstehende Event, wenn `extract` passt. Sonst bleibt es
    /// stehen und der Aufruf ist `OrderingViolation`.
    fn take<T>(&mut self, expected: &'static str, extract: impl FnOnce(&ExiEvent) -> Option<T>) -> Result<T> {
        self.fill()?;
        let Some((_, event)) = self.queue.front() else {
            return Err(Error::ordering_violation(expected, "end of stream"));
        };
        match extract(event) {
            Some(content) => {
                self.queue.pop_front();
                Ok(content)
            }
            None => Err(Error::ordering_violation(expected, event.to_string())),
        }
    }

    // ------------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------------

    /// Liest, bis mindestens ein Event ansteht oder das Dokument zu Ende ist.
    fn fill(&mut self) -> Result<()> {
        while self.queue.is_empty() && self.phase != Phase::Finished {
            if matches!(self.input, Input::Blocks(_)) {
                self.read_block()?;
            } else {
                self.step()?;
                // Der Prefix eines SE kann erst mit dem folgenden NS feststehen
                while self.options.preserve().prefixes
                    && self.phase == Phase::Body
                    && matches!(
                        self.staged.last(),
                        Some((_, ExiEvent::StartElement(_) | ExiEvent::NamespaceDeclaration(_)))
                    )
                {
                    self.step()?;
                }
            }
            self.queue.extend(self.staged.drain(..));
        }
        Ok(())
    }

    /// Structure pass over one block, then its values in channel order.
    fn read_block(&mut self) -> Result<()> {
        if let Input::Blocks(blocks) = &mut self.input {
            blocks.next_stream()?;
        }
        loop {
            self.step()?;
            if self.phase == Phase::Finished || self.block.is_full(self.options.block_size()) {
                break;
            }
        }
        self.read_block_values()
    }

    /// Decodes exactly one event into `staged`.
    fn step(&mut self) -> Result<()> {
        match self.phase {
            Phase::Prolog => self.step_start_document(),
            Phase::Body => self.step_body(),
            Phase::Finished => Ok(()),
        }
    }

    fn step_start_document(&mut self) -> Result<()> {
        let root = if self.options.fragment() {
            self.ctx.grammars.fragment()
        } else {
            self.ctx.grammars.document()
        };
        let production = self.read_declared(root)?;
        if production.event != Event::StartDocument {
            return Err(Error::invalid_event_code("SD", self.ctx.grammars.get(root)?.describe(root)));
        }
        let next = successor(production.next, "SD")?;
        self.stack.push(Frame { element: None, qname: None, grammar: next, start: next, ns_mark: 0 });
        self.phase = Phase::Body;
        self.stage(EventType::StartDocument, ExiEvent::StartDocument);
        Ok(())
    }

    fn step_body(&mut self) -> Result<()> {
        let frame = self
            .stack
            .last()
            .ok_or_else(|| Error::ordering_violation("SD", "event"))?;
        let (state, start) = (frame.grammar, frame.start);
        let grammar = self.ctx.grammars.get(state)?;
        let widths = grammar.widths(&self.options);
        let name = grammar.describe(state);
        let code = event_code::decode(self.input.structure(), &widths, &name)?;
        log::trace!("{name} code {code}");

        let grammar = self.ctx.grammars.get(state)?;
        let slot = match (code.part2(), code.part3()) {
            (None, _) => {
                let index = grammar
                    .index_of(code.part1())
                    .ok_or_else(|| Error::invalid_event_code(code.to_string(), name.clone()))?;
                let production = grammar.productions[index].clone();
                return self.declared(state, start, production);
            }
            (Some(part2), None) => grammar.second_level(&self.options).get(part2 as usize),
            (Some(_), Some(part3)) => grammar.third_level(&self.options).get(part3 as usize),
        };
        let slot = slot.ok_or_else(|| Error::invalid_event_code(code.to_string(), name))?;
        self.undeclared(state, start, slot)
    }

    /// Level-1 Production.
    fn declared(&mut self, state: GrammarId, start: GrammarId, production: Production) -> Result<()> {
        let ty = production.event.event_type();
        let learns = self.ctx.grammars.get(state)?.learns();
        let next = production.next;
        match production.event {
            Event::StartDocument => {
                let grammar = self.ctx.grammars.get(state)?;
                Err(Error::invalid_event_code("SD", grammar.describe(state)))
            }
            Event::EndDocument => {
                self.stack.clear();
                self.phase = Phase::Finished;
                self.stage(ty, ExiEvent::EndDocument);
                Ok(())
            }
            Event::StartElement { qname, grammar } => self.start_element(ty, state, qname, grammar, next, false),
            Event::StartElementNs(uri_id) => {
                let qid = self.ctx.names.decode_local_name(self.input.structure(), uri_id)?;
                self.start_element(ty, state, qid, None, next, learns)
            }
            Event::StartElementGeneric => {
                let qid = self.ctx.names.decode_qname(self.input.structure())?;
                self.start_element(ty, state, qid, None, next, learns)
            }
            Event::Attribute { qname, datatype } => {
                self.attribute(ty, state, start, qname, datatype, next, false)
            }
            Event::AttributeNs(uri_id) => {
                let qid = self.ctx.names.decode_local_name(self.input.structure(), uri_id)?;
                let datatype = self.wildcard_datatype(state, qid)?;
                self.attribute(ty, state, start, qid, datatype, next, learns)
            }
            Event::AttributeGeneric => {
                let qid = self.ctx.names.decode_qname(self.input.structure())?;
                let datatype = self.wildcard_datatype(state, qid)?;
                self.attribute(ty, state, start, qid, datatype, next, learns)
            }
            Event::Characters(datatype) => {
                let datatype = self.effective(datatype);
                self.characters(ty, datatype, successor(next, "CH")?)
            }
            Event::EndElement => self.end_element(ty),
        }
    }

    /// Level-2/3 Slot.
    fn undeclared(&mut self, state: GrammarId, start: GrammarId, slot: Undeclared) -> Result<()> {
        let ty = slot.event_type();
        let grammar = self.ctx.grammars.get(state)?;
        let learns = grammar.learns();
        let next = undeclared::next_state(state, grammar, slot);
        match slot {
            Undeclared::EndElement => {
                if learns {
                    self.ctx.grammars.learn(state, Event::EndElement, None)?;
                }
                self.end_element(ty)
            }
            Undeclared::XsiType | Undeclared::XsiNil => {
                let qname = if slot == Undeclared::XsiType { QName::xsi_type() } else { QName::xsi_nil() };
                let qid = self.ctx.names.intern(&qname)?;
                let datatype = xsi_attribute(&qname).map_or(Datatype::String, |(_, dt)| dt);
                self.attribute(ty, state, start, qid, datatype, Some(state), learns)
            }
            Undeclared::AttributeGeneric => {
                let qid = self.ctx.names.decode_qname(self.input.structure())?;
                let datatype = self.wildcard_datatype(state, qid)?;
                self.attribute(ty, state, start, qid, datatype, Some(state), learns)
            }
            Undeclared::AttributeInvalidValue => self.invalid_attribute(ty, state),
            Undeclared::NamespaceDeclaration => {
                let ch = self.input.structure();
                let uri_id = self.ctx.names.decode_uri(ch)?;
                let prefix = self.ctx.names.decode_ns_prefix(ch, uri_id)?;
                let local_element_ns = ch.decode_boolean()?;
                let uri = self
                    .ctx
                    .names
                    .uri(uri_id)
                    .cloned()
                    .ok_or(Error::InvalidCompactId(uri_id as usize))?;
                self.scope.bind(Arc::clone(&prefix), Arc::clone(&uri));
                if local_element_ns {
                    self.element_prefix(&prefix);
                }
                self.set_state(successor(next, "NS")?);
                self.stage(ty, ExiEvent::NamespaceDeclaration(NsContent { uri, prefix, local_element_ns }));
                Ok(())
            }
            Undeclared::SelfContained => Err(Error::UnsupportedSelfContained),
            Undeclared::StartElementGeneric => {
                let qid = self.ctx.names.decode_qname(self.input.structure())?;
                self.start_element(ty, state, qid, None, next, learns)
            }
            Undeclared::CharactersGeneric => {
                if learns {
                    self.ctx.grammars.learn(state, Event::Characters(Datatype::String), next)?;
                }
                self.characters(ty, Datatype::String, successor(next, "CH")?)
            }
            Undeclared::EntityReference => {
                let name = string::decode(self.input.structure())?;
                self.set_state(successor(next, "ER")?);
                self.stage(ty, ExiEvent::EntityReference(ErContent { name: name.into() }));
                Ok(())
            }
            Undeclared::DocType => {
                let ch = self.input.structure();
                let content = DtContent {
                    name: string::decode(ch)?.into(),
                    public: string::decode(ch)?.into(),
                    system: string::decode(ch)?.into(),
                    text: string::decode(ch)?.into(),
                };
                self.set_state(successor(next, "DT")?);
                self.stage(ty, ExiEvent::DocType(content));
                Ok(())
            }
            Undeclared::Comment => {
                let text = string::decode(self.input.structure())?;
                self.set_state(successor(next, "CM")?);
                self.stage(ty, ExiEvent::Comment(CmContent { text: text.into() }));
                Ok(())
            }
            Undeclared::ProcessingInstruction => {
                let ch = self.input.structure();
                let name = string::decode(ch)?;
                let text = string::decode(ch)?;
                self.set_state(successor(next, "PI")?);
                let content = PiContent { name: name.into(), text: text.into() };
                self.stage(ty, ExiEvent::ProcessingInstruction(content));
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Event content
    // ------------------------------------------------------------------------

    fn start_element(
        &mut self,
        ty: EventType,
        state: GrammarId,
        qid: QNameId,
        declared: Option<GrammarId>,
        next: Option<GrammarId>,
        learns: bool,
    ) -> Result<()> {
        let prefix = self.read_prefix(qid)?;
        let child = self.ctx.element_grammar(qid, declared);
        if learns {
            self.ctx.grammars.learn(state, Event::StartElement { qname: qid, grammar: None }, next)?;
        }
        self.set_state(successor(next, "SE")?);

        let qname = self.ctx.names.qname(qid)?.with_prefix_of(prefix);
        self.stack.push(Frame {
            element: Some(qid),
            qname: Some(qname.clone()),
            grammar: child,
            start: child,
            ns_mark: self.scope.mark(),
        });
        self.stage(ty, ExiEvent::StartElement(qname));
        Ok(())
    }

    fn end_element(&mut self, ty: EventType) -> Result<()> {
        match self.stack.pop() {
            Some(frame) if frame.element.is_some() => self.scope.truncate(frame.ns_mark),
            _ => return Err(Error::invalid_event_code("EE", "document")),
        }
        self.stage(ty, ExiEvent::EndElement);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn attribute(
        &mut self,
        ty: EventType,
        state: GrammarId,
        start: GrammarId,
        qid: QNameId,
        datatype: Datatype,
        next: Option<GrammarId>,
        learns: bool,
    ) -> Result<()> {
        self.current_element("AT")?;
        let prefix = self.read_prefix(qid)?;
        let qname = self.ctx.names.qname(qid)?.with_prefix_of(prefix);
        let xsi = xsi_attribute(&qname);

        let (value, typed) = if xsi.is_some() {
            let typed = self.read_structure_value(qid, &datatype)?;
            (Some(datatype.format(&typed)?.into()), Some(typed))
        } else {
            let datatype = self.effective(datatype);
            (self.read_value(qid, datatype)?, None)
        };
        if learns {
            let learned = xsi.as_ref().map_or(Datatype::String, |(_, dt)| dt.clone());
            self.ctx.grammars.learn(state, Event::Attribute { qname: qid, datatype: learned }, next)?;
        }

        self.set_state(successor(next, "AT")?);
        match (&xsi, typed) {
            (Some((Undeclared::XsiType, _)), Some(TypedValue::QName(target))) => self.switch_type(start, &target)?,
            (Some((Undeclared::XsiNil, _)), Some(TypedValue::Boolean(true))) => self.switch_nil(state)?,
            _ => {}
        }
        self.stage_attribute(ty, qname, value);
        Ok(())
    }

    /// AT(qname) [untyped value]: voller QName, Wert als String.
    fn invalid_attribute(&mut self, ty: EventType, state: GrammarId) -> Result<()> {
        self.current_element("AT")?;
        let qid = self.ctx.names.decode_qname(self.input.structure())?;
        let prefix = self.read_prefix(qid)?;
        let qname = self.ctx.names.qname(qid)?.with_prefix_of(prefix);
        let value = self.read_value(qid, Datatype::String)?;

        let grammar = self.ctx.grammars.get(state)?;
        let next = grammar
            .position(|e| matches!(e, Event::Attribute { qname: q, .. } if *q == qid))
            .and_then(|i| grammar.productions[i].next)
            .unwrap_or(state);
        self.set_state(next);
        self.stage_attribute(ty, qname, value);
        Ok(())
    }

    fn characters(&mut self, ty: EventType, datatype: Datatype, next: GrammarId) -> Result<()> {
        let owner = self.current_element("CH")?;
        let value = self.read_value(owner, datatype)?;
        self.set_state(next);
        let value = value.unwrap_or_else(|| Arc::from(""));
        self.stage(ty, ExiEvent::characters(value));
        Ok(())
    }

    fn switch_type(&mut self, start: GrammarId, target: &QName) -> Result<()> {
        let Some(type_grammar) = self.ctx.type_grammar(target) else {
            log::debug!("xsi:type {target} names no known type, grammar unchanged");
            return Ok(());
        };
        let derived = self.ctx.grammars.type_cast(start, type_grammar)?;
        if let Some(frame) = self.stack.last_mut() {
            frame.grammar = derived;
            frame.start = derived;
        }
        Ok(())
    }

    fn switch_nil(&mut self, state: GrammarId) -> Result<()> {
        if let Some(empty) = self.ctx.grammars.get(state)?.empty {
            self.set_state(empty);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Liest einen Event Code, der eine Level-1 Production sein muss.
    fn read_declared(&mut self, state: GrammarId) -> Result<Production> {
        let grammar = self.ctx.grammars.get(state)?;
        let widths = grammar.widths(&self.options);
        let name = grammar.describe(state);
        let code = event_code::decode(self.input.structure(), &widths, &name)?;
        let grammar = self.ctx.grammars.get(state)?;
        code.part2()
            .is_none()
            .then(|| grammar.index_of(code.part1()))
            .flatten()
            .map(|i| grammar.productions[i].clone())
            .ok_or_else(|| Error::invalid_event_code(code.to_string(), name))
    }

    fn current_element(&self, event: &'static str) -> Result<QNameId> {
        self.stack
            .last()
            .and_then(|frame| frame.element)
            .ok_or_else(|| Error::invalid_event_code(event, "document"))
    }

    fn read_prefix(&mut self, qid: QNameId) -> Result<Option<Arc<str>>> {
        if !self.options.preserve().prefixes {
            return Ok(None);
        }
        let uri_id = self.ctx.names.context(qid)?.uri_id;
        self.ctx.names.decode_prefix(self.input.structure(), uri_id)
    }

    fn wildcard_datatype(&self, state: GrammarId, qid: QNameId) -> Result<Datatype> {
        let qname = self.ctx.names.qname(qid)?;
        Ok(match xsi_attribute(qname) {
            Some((_, datatype)) => datatype,
            None => {
                let built_in = self.ctx.grammars.get(state)?.built_in;
                self.ctx.undeclared_attribute_datatype(qid, built_in)
            }
        })
    }

    /// NS mit local_element_ns: Prefix des eigenen SE nachtragen.
    fn element_prefix(&mut self, prefix: &Arc<str>) {
        let prefix = Some(Arc::clone(prefix));
        if let Some(qname) = self.stack.last_mut().and_then(|f| f.qname.as_mut()) {
            *qname = qname.with_prefix_of(prefix.clone());
        }
        let pending = self.staged.iter_mut().rev().find_map(|(_, event)| match event {
            ExiEvent::StartElement(qname) => Some(qname),
            _ => None,
        });
        if let Some(qname) = pending {
            *qname = qname.with_prefix_of(prefix);
        }
    }

    fn set_state(&mut self, next: GrammarId) {
        if let Some(frame) = self.stack.last_mut() {
            frame.grammar = next;
        }
    }

    fn effective(&self, datatype: Datatype) -> Datatype {
        crate::context::effective_datatype(datatype, &self.options)
    }

    fn stage(&mut self, ty: EventType, event: ExiEvent) {
        self.staged.push((ty, event));
    }

    fn stage_attribute(&mut self, ty: EventType, qname: QName, value: Option<Arc<str>>) {
        let value = value.unwrap_or_else(|| Arc::from(""));
        self.stage(ty, ExiEvent::Attribute(AtContent { qname, value }));
    }
}

impl<R: Read> Iterator for Decoder<R> {
    type Item = Result<ExiEvent>;

    /// Nach dem ersten Fehler ist Schluss.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.decode_event() {
            Ok(event) => event.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

fn successor(next: Option<GrammarId>, event: &str) -> Result<GrammarId> {
    next.ok_or_else(|| Error::SchemaError(format!("production {event} has no successor state")))
}

/// Decodes a complete EXI stream into its events.
pub fn decode(bytes: &[u8], source: &GrammarSource, options: &ExiOptions) -> Result<Vec<ExiEvent>> {
    Decoder::new(bytes, source, options.clone())?.collect()
}
