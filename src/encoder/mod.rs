//! EXI body encoder (EXI 6, 8.4, 8.5).
//!
//! Pro Event: aktuellen Grammar-Zustand befragen (Level 1 exakt, Level 1
//! Wildcard, Level 2, Level 3), Event Code schreiben, Inhalt schreiben,
//! Zustand wechseln. In Built-in Zuständen wird danach gelernt.
//!
//! # Beispiel
//!
//! ```
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
//! let bytes = encode(&events, &GrammarSource::BuiltIn, &ExiOptions::default()).unwrap();
//! assert_eq!(bytes[0], 0x80);
//! ```

mod compression;
mod value;

use std::io::Write;

use crate::bitstream::BitEncoderChannel;
use crate::bytestream::ByteEncoderChannel;
use crate::channel::EncoderChannel;
use crate::context::{CodingContext, NamespaceScope, xsi_attribute};
use crate::datatype::{Datatype, TypedValue};
use crate::event::{AtContent, ExiEvent, sort_attributes};
use crate::event_code;
use crate::grammar::{Event, GrammarId, NameMatch};
use crate::header::{self, ExiHeader};
use crate::options::{Alignment, ExiOptions};
use crate::qname::{QName, QNameId};
use crate::schema::GrammarSource;
use crate::string;
use crate::undeclared::{self, Undeclared};
use crate::{Error, Result};

use compression::BlockWriter;

/// Physical target of event codes and content.
enum Output<W: Write> {
    Bit(BitEncoderChannel<W>),
    Byte(ByteEncoderChannel<W>),
    /// Pre-compression und Compression: Structure Channel plus Value Channels.
    Blocks(BlockWriter<W>),
}

impl<W: Write> Output<W> {
    /// Kanal für Event Codes, Namen und Structure-Inhalte.
    fn structure(&mut self) -> &mut dyn EncoderChannel {
        match self {
            Self::Bit(ch) => ch,
            Self::Byte(ch) => ch,
            Self::Blocks(blocks) => blocks.structure(),
        }
    }
}

/// One open element (or the document itself at the bottom of the stack).
#[derive(Debug)]
struct Frame {
    element: Option<QNameId>,
    qname: Option<QName>,
    grammar: GrammarId,
    /// Erster Start-Tag-Zustand; Basis für xsi:type.
    start: GrammarId,
    ns_mark: usize,
}

/// Wie ein Event im aktuellen Zustand codiert wird.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Declared(usize),
    Undeclared(Undeclared),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prolog,
    Body,
    Finished,
}

/// Push-style encoder: one call per XML occurrence.
///
/// Der Header wird bei der Konstruktion geschrieben. Nach
/// [`encode_end_document`](Self::encode_end_document) liefert
/// [`finish`](Self::finish) den Sink zurück.
pub struct Encoder<W: Write> {
    out: Output<W>,
    options: ExiOptions,
    ctx: CodingContext,
    scope: NamespaceScope,
    stack: Vec<Frame>,
    phase: Phase,
}

impl<W: Write> Encoder<W> {
    /// Encoder with the default header (no cookie).
    pub fn new(sink: W, source: &GrammarSource, options: ExiOptions) -> Result<Self> {
        Self::with_header(sink, source, options, ExiHeader::new())
    }

    /// # Errors
    ///
    /// - `UnsupportedHeaderOptions` wenn `header` Options ankündigt
    /// - Konfigurationsfehler aus [`CodingContext::new`]
    /// - IO-Fehler beim Schreiben des Headers
    pub fn with_header(
        sink: W,
        source: &GrammarSource,
        options: ExiOptions,
        header: ExiHeader,
    ) -> Result<Self> {
        if header.options_present() {
            return Err(Error::UnsupportedHeaderOptions);
        }
        let ctx = CodingContext::new(source, &options)?;

        let alignment = options.effective_alignment();
        let mut bits = BitEncoderChannel::new(sink);
        header::encode(&mut bits, &header, alignment != Alignment::BitPacked)?;
        let out = match alignment {
            Alignment::BitPacked => Output::Bit(bits),
            Alignment::ByteAlignment => Output::Byte(ByteEncoderChannel::new(bits.into_inner()?)),
            Alignment::PreCompression => Output::Blocks(BlockWriter::new(
                bits.into_inner()?,
                options.compression(),
                options.block_size(),
            )),
        };
        log::debug!(
            "encoder ready: alignment {alignment:?}, compression {}, schema {}",
            options.compression(),
            ctx.grammars.schema().is_some()
        );

        Ok(Self {
            out,
            options,
            ctx,
            scope: NamespaceScope::new(),
            stack: Vec::new(),
            phase: Phase::Prolog,
        })
    }

    pub fn options(&self) -> &ExiOptions {
        &self.options
    }

    /// Dispatches one event to the matching `encode_*` call.
    pub fn encode_event(&mut self, event: &ExiEvent) -> Result<()> {
        match event {
            ExiEvent::StartDocument => self.encode_start_document(),
            ExiEvent::EndDocument => self.encode_end_document(),
            ExiEvent::StartElement(qname) => self.encode_start_element(qname),
            ExiEvent::EndElement => self.encode_end_element(),
            ExiEvent::Attribute(at) => self.encode_attribute(&at.qname, &at.value),
            ExiEvent::Characters(ch) => self.encode_characters(&ch.value),
            ExiEvent::NamespaceDeclaration(ns) => {
                self.encode_namespace_declaration(&ns.uri, &ns.prefix, ns.local_element_ns)
            }
            ExiEvent::Comment(cm) => self.encode_comment(&cm.text),
            ExiEvent::ProcessingInstruction(pi) => self.encode_processing_instruction(&pi.name, &pi.text),
            ExiEvent::DocType(dt) => self.encode_doc_type(&dt.name, &dt.public, &dt.system, &dt.text),
            ExiEvent::EntityReference(er) => self.encode_entity_reference(&er.name),
        }
    }

    // ------------------------------------------------------------------------
    // Document
    // ------------------------------------------------------------------------

    pub fn encode_start_document(&mut self) -> Result<()> {
        if self.phase != Phase::Prolog {
            return Err(Error::ordering_violation("end of stream", "SD"));
        }
        let root = if self.options.fragment() {
            self.ctx.grammars.fragment()
        } else {
            self.ctx.grammars.document()
        };
        let grammar = self.ctx.grammars.get(root)?;
        let index = grammar
            .position(|e| *e == Event::StartDocument)
            .ok_or_else(|| Error::unexpected_event("SD", grammar.describe(root)))?;
        let next = grammar.productions[index].next;
        self.write_code(root, Choice::Declared(index))?;

        let next = successor(next, "SD")?;
        self.stack.push(Frame { element: None, qname: None, grammar: next, start: next, ns_mark: 0 });
        self.phase = Phase::Body;
        Ok(())
    }

    pub fn encode_end_document(&mut self) -> Result<()> {
        match (self.phase, self.stack.len()) {
            (Phase::Body, 1) => {}
            (Phase::Body, _) => return Err(Error::ordering_violation("EE", "ED")),
            _ => return Err(Error::ordering_violation("SD", "ED")),
        }
        let state = self.stack[0].grammar;
        let grammar = self.ctx.grammars.get(state)?;
        let index = grammar
            .position(|e| *e == Event::EndDocument)
            .ok_or_else(|| Error::unexpected_event("ED", grammar.describe(state)))?;
        self.write_code(state, Choice::Declared(index))?;

        self.stack.clear();
        self.phase = Phase::Finished;
        if let Output::Blocks(blocks) = &mut self.out {
            blocks.close_block(&mut self.ctx, self.options.preserve().prefixes)?;
        }
        Ok(())
    }

    /// Flushes the last block and returns the sink.
    ///
    /// # Errors
    ///
    /// `OrderingViolation` wenn ED noch nicht codiert wurde.
    pub fn finish(self) -> Result<W> {
        if self.phase != Phase::Finished {
            return Err(Error::ordering_violation("ED", "finish"));
        }
        match self.out {
            Output::Bit(ch) => ch.into_inner(),
            Output::Byte(mut ch) => {
                ch.flush()?;
                Ok(ch.into_inner())
            }
            Output::Blocks(blocks) => blocks.into_inner(),
        }
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    pub fn encode_start_element(&mut self, qname: &QName) -> Result<()> {
        let event = || format!("SE({qname})");
        let state = self.frame(event)?.grammar;
        let (qid, uri_id) = self.ctx.lookup(qname);
        let grammar = self.ctx.grammars.get(state)?;

        let (choice, name_match, next, declared) = match grammar.match_start_element(qid, uri_id) {
            Some((i, name_match)) => {
                let production = &grammar.productions[i];
                let declared = match production.event {
                    Event::StartElement { grammar, .. } => grammar,
                    _ => None,
                };
                (Choice::Declared(i), name_match, production.next, declared)
            }
            None if grammar
                .second_level(&self.options)
                .position(Undeclared::StartElementGeneric)
                .is_some() =>
            {
                let next = undeclared::next_state(state, grammar, Undeclared::StartElementGeneric);
                (Choice::Undeclared(Undeclared::StartElementGeneric), NameMatch::Any, next, None)
            }
            None => return Err(Error::unexpected_event(event(), grammar.describe(state))),
        };
        // Exakte Level-1 Treffer sind bereits gelernt
        let learns = grammar.learns() && !(matches!(choice, Choice::Declared(_)) && name_match == NameMatch::Exact);
        self.write_code(state, choice)?;

        let qid = self.write_name(qname, qid, uri_id, name_match)?;
        let child = self.ctx.element_grammar(qid, declared);
        if learns {
            self.ctx.grammars.learn(state, Event::StartElement { qname: qid, grammar: None }, next)?;
        }

        let next = successor(next, "SE")?;
        if let Some(frame) = self.stack.last_mut() {
            frame.grammar = next;
        }
        self.stack.push(Frame {
            element: Some(qid),
            qname: Some(qname.clone()),
            grammar: child,
            start: child,
            ns_mark: self.scope.mark(),
        });
        Ok(())
    }

    pub fn encode_end_element(&mut self) -> Result<()> {
        let frame = self.frame(|| "EE".to_string())?;
        let state = frame.grammar;
        if frame.element.is_none() {
            return Err(Error::ordering_violation("SE", "EE"));
        }
        let grammar = self.ctx.grammars.get(state)?;
        let choice = match grammar.position(|e| *e == Event::EndElement) {
            Some(i) => Choice::Declared(i),
            None if grammar.second_level(&self.options).position(Undeclared::EndElement).is_some() => {
                Choice::Undeclared(Undeclared::EndElement)
            }
            None => return Err(Error::unexpected_event("EE", grammar.describe(state))),
        };
        let learns = grammar.learns();
        self.write_code(state, choice)?;
        if learns && choice == Choice::Undeclared(Undeclared::EndElement) {
            self.ctx.grammars.learn(state, Event::EndElement, None)?;
        }

        if let Some(frame) = self.stack.pop() {
            self.scope.truncate(frame.ns_mark);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    /// Encodes attributes in stream order: xsi:type, xsi:nil, then by
    /// local name and URI.
    pub fn encode_attribute_list(&mut self, attributes: &[AtContent]) -> Result<()> {
        let mut sorted = attributes.to_vec();
        sort_attributes(&mut sorted);
        for at in &sorted {
            self.encode_attribute(&at.qname, &at.value)?;
        }
        Ok(())
    }

    pub fn encode_attribute(&mut self, qname: &QName, value: &str) -> Result<()> {
        let event = || format!("AT({qname})");
        let frame = self.frame(event)?;
        let (state, start) = (frame.grammar, frame.start);
        let Some(_) = frame.element else {
            return Err(Error::ordering_violation("SE", event()));
        };
        let (qid, uri_id) = self.ctx.lookup(qname);
        let grammar = self.ctx.grammars.get(state)?;
        let second_level = grammar.second_level(&self.options);
        let xsi = xsi_attribute(qname);

        let (choice, name_match, datatype, next) = match &xsi {
            Some((slot, datatype)) if second_level.position(*slot).is_some() => {
                (Choice::Undeclared(*slot), NameMatch::Exact, datatype.clone(), Some(state))
            }
            _ => match grammar.match_attribute(qid, uri_id) {
                Some((i, name_match)) => {
                    let production = &grammar.productions[i];
                    let datatype = match &production.event {
                        Event::Attribute { datatype, .. } => datatype.clone(),
                        _ => wildcard_datatype(&self.ctx, &xsi, qid, grammar.built_in),
                    };
                    (Choice::Declared(i), name_match, datatype, production.next)
                }
                None if second_level.position(Undeclared::AttributeGeneric).is_some() => {
                    let datatype = wildcard_datatype(&self.ctx, &xsi, qid, grammar.built_in);
                    (Choice::Undeclared(Undeclared::AttributeGeneric), NameMatch::Any, datatype, Some(state))
                }
                None => return Err(Error::unexpected_event(event(), grammar.describe(state))),
            },
        };

        let datatype = if xsi.is_some() { datatype } else { self.effective(datatype) };
        let typed = match datatype.parse(value, &self.scope) {
            Ok(typed) => typed,
            Err(err) if self.options.strict() => return Err(err),
            Err(err) => {
                if second_level.position(Undeclared::AttributeInvalidValue).is_none() {
                    return Err(err);
                }
                log::debug!("{} does not match {datatype}, encoding untyped", event());
                // Folgezustand wie beim deklarierten AT(qname), falls vorhanden
                let next = grammar
                    .position(|e| matches!(e, Event::Attribute { qname: q, .. } if *q == qid))
                    .and_then(|i| grammar.productions[i].next)
                    .unwrap_or(state);
                return self.encode_invalid_attribute(state, qname, value, next);
            }
        };
        let learns = grammar.learns();
        let exact = matches!(choice, Choice::Declared(_)) && name_match == NameMatch::Exact;
        self.write_code(state, choice)?;

        let qid = if matches!(choice, Choice::Undeclared(Undeclared::XsiType | Undeclared::XsiNil)) {
            let qid = self.ctx.names.intern(qname)?;
            self.write_prefix(qname, qid)?;
            qid
        } else {
            self.write_name(qname, qid, uri_id, name_match)?
        };
        if xsi.is_some() {
            self.write_structure_value(qid, &datatype, &typed)?;
        } else {
            self.write_value(qid, datatype.clone(), typed.clone())?;
        }
        if learns && !exact {
            let learned = xsi.as_ref().map_or(Datatype::String, |(_, dt)| dt.clone());
            self.ctx.grammars.learn(state, Event::Attribute { qname: qid, datatype: learned }, next)?;
        }

        let next = successor(next, "AT")?;
        self.set_state(next);
        match (&xsi, typed) {
            (Some((Undeclared::XsiType, _)), TypedValue::QName(target)) => self.switch_type(start, &target)?,
            (Some((Undeclared::XsiNil, _)), TypedValue::Boolean(true)) => self.switch_nil(state)?,
            _ => {}
        }
        self.close_full_block()
    }

    /// AT(qname) [untyped value]: voller QName, Wert als String.
    fn encode_invalid_attribute(
        &mut self,
        state: GrammarId,
        qname: &QName,
        value: &str,
        next: GrammarId,
    ) -> Result<()> {
        self.write_code(state, Choice::Undeclared(Undeclared::AttributeInvalidValue))?;
        let qid = self.ctx.names.encode_qname(self.out.structure(), qname)?;
        self.write_prefix(qname, qid)?;
        self.write_value(qid, Datatype::String, TypedValue::String(value.into()))?;
        self.set_state(next);
        self.close_full_block()
    }

    /// xsi:type: Wechsel in den abgeleiteten Zustand des Ziel-Typs.
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

    /// xsi:nil="true": nur noch EE.
    fn switch_nil(&mut self, state: GrammarId) -> Result<()> {
        if let Some(empty) = self.ctx.grammars.get(state)?.empty {
            self.set_state(empty);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    pub fn encode_characters(&mut self, value: &str) -> Result<()> {
        let frame = self.frame(|| "CH".to_string())?;
        let state = frame.grammar;
        let Some(owner) = frame.element else {
            let grammar = self.ctx.grammars.get(state)?;
            return Err(Error::unexpected_event("CH", grammar.describe(state)));
        };
        let grammar = self.ctx.grammars.get(state)?;

        if let Some(i) = grammar.position(|e| matches!(e, Event::Characters(_))) {
            let production = &grammar.productions[i];
            let Event::Characters(datatype) = &production.event else {
                return Err(Error::unexpected_event("CH", grammar.describe(state)));
            };
            let datatype = self.effective(datatype.clone());
            let next = production.next;
            match datatype.parse(value, &self.scope) {
                Ok(typed) => {
                    self.write_code(state, Choice::Declared(i))?;
                    self.write_value(owner, datatype, typed)?;
                    self.set_state(successor(next, "CH")?);
                    return self.close_full_block();
                }
                Err(err) if self.options.strict() => return Err(err),
                Err(_) => log::debug!("characters do not match {datatype}, encoding untyped"),
            }
        }

        let grammar = self.ctx.grammars.get(state)?;
        if grammar
            .second_level(&self.options)
            .position(Undeclared::CharactersGeneric)
            .is_none()
        {
            return Err(Error::unexpected_event("CH", grammar.describe(state)));
        }
        let next = undeclared::next_state(state, grammar, Undeclared::CharactersGeneric);
        let learns = grammar.learns();
        self.write_code(state, Choice::Undeclared(Undeclared::CharactersGeneric))?;
        self.write_value(owner, Datatype::String, TypedValue::String(value.into()))?;
        if learns {
            self.ctx.grammars.learn(state, Event::Characters(Datatype::String), next)?;
        }
        self.set_state(successor(next, "CH")?);
        self.close_full_block()
    }

    /// Binds `prefix` to `uri`; written as NS event only with preserved prefixes.
    pub fn encode_namespace_declaration(
        &mut self,
        uri: &str,
        prefix: &str,
        local_element_ns: bool,
    ) -> Result<()> {
        let frame = self.frame(|| "NS".to_string())?;
        let state = frame.grammar;
        let element_ns = frame
            .qname
            .as_ref()
            .is_some_and(|q| &*q.uri == uri && q.prefix.as_deref().unwrap_or("") == prefix);
        self.scope.bind(prefix.into(), uri.into());
        if !self.options.preserve().prefixes {
            return Ok(());
        }

        let grammar = self.ctx.grammars.get(state)?;
        if grammar
            .second_level(&self.options)
            .position(Undeclared::NamespaceDeclaration)
            .is_none()
        {
            return Err(Error::unexpected_event("NS", grammar.describe(state)));
        }
        let next = undeclared::next_state(state, grammar, Undeclared::NamespaceDeclaration);
        self.write_code(state, Choice::Undeclared(Undeclared::NamespaceDeclaration))?;
        let ch = self.out.structure();
        let uri_id = self.ctx.names.encode_uri(ch, uri)?;
        self.ctx.names.encode_ns_prefix(ch, uri_id, prefix)?;
        ch.encode_boolean(local_element_ns || element_ns)?;
        self.set_state(successor(next, "NS")?);
        Ok(())
    }

    pub fn encode_comment(&mut self, text: &str) -> Result<()> {
        if !self.options.preserve().comments {
            return Ok(());
        }
        self.encode_misc(Undeclared::Comment, |ch| string::encode(ch, text))
    }

    pub fn encode_processing_instruction(&mut self, name: &str, text: &str) -> Result<()> {
        if !self.options.preserve().pis {
            return Ok(());
        }
        self.encode_misc(Undeclared::ProcessingInstruction, |ch| {
            string::encode(ch, name)?;
            string::encode(ch, text)
        })
    }

    pub fn encode_doc_type(&mut self, name: &str, public: &str, system: &str, text: &str) -> Result<()> {
        if !self.options.preserve().dtd {
            return Ok(());
        }
        self.encode_misc(Undeclared::DocType, |ch| {
            for part in [name, public, system, text] {
                string::encode(ch, part)?;
            }
            Ok(())
        })
    }

    pub fn encode_entity_reference(&mut self, name: &str) -> Result<()> {
        if !self.options.preserve().dtd {
            return Ok(());
        }
        self.encode_misc(Undeclared::EntityReference, |ch| string::encode(ch, name))
    }

    /// CM, PI, DT, ER: nur Level 2/3, Inhalt im Structure Channel.
    fn encode_misc<F>(&mut self, slot: Undeclared, content: F) -> Result<()>
    where
        F: FnOnce(&mut dyn EncoderChannel) -> Result<()>,
    {
        let name = slot.event_type().abbreviation();
        let state = self.frame(|| name.to_string())?.grammar;
        let grammar = self.ctx.grammars.get(state)?;
        let present = grammar.second_level(&self.options).position(slot).is_some()
            || grammar.third_level(&self.options).position(slot).is_some();
        if !present {
            return Err(Error::unexpected_event(name, grammar.describe(state)));
        }
        let next = undeclared::next_state(state, grammar, slot);
        self.write_code(state, Choice::Undeclared(slot))?;
        content(self.out.structure())?;
        self.set_state(successor(next, name)?);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn frame(&self, event: impl FnOnce() -> String) -> Result<&Frame> {
        match self.phase {
            Phase::Prolog => Err(Error::ordering_violation("SD", event())),
            Phase::Finished => Err(Error::ordering_violation("end of stream", event())),
            Phase::Body => self
                .stack
                .last()
                .ok_or_else(|| Error::ordering_violation("SD", event())),
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

    /// Writes the event code of `choice` in state `state`.
    fn write_code(&mut self, state: GrammarId, choice: Choice) -> Result<()> {
        let grammar = self.ctx.grammars.get(state)?;
        let widths = grammar.widths(&self.options);
        let code = match choice {
            Choice::Declared(i) => widths.level1(grammar.code_of(i)),
            Choice::Undeclared(slot) => {
                if let Some(p) = grammar.second_level(&self.options).position(slot) {
                    widths.level2(p as u32)
                } else if let Some(p) = grammar.third_level(&self.options).position(slot) {
                    widths.level3(p as u32)
                } else {
                    return Err(Error::unexpected_event(
                        slot.event_type().abbreviation(),
                        grammar.describe(state),
                    ));
                }
            }
        };
        log::trace!("{} code {code} ({choice:?})", grammar.describe(state));
        event_code::encode(self.out.structure(), &code, &widths)
    }

    /// Writes the name part the matched production leaves open, plus the
    /// prefix. Gibt die (ggf. neue) Tabellen-Id zurück.
    fn write_name(&mut self, qname: &QName, qid: QNameId, uri_id: u32, name_match: NameMatch) -> Result<QNameId> {
        let ch = self.out.structure();
        let qid = match name_match {
            NameMatch::Exact => qid,
            NameMatch::Namespace => self.ctx.names.encode_local_name(ch, uri_id, &qname.local_name)?,
            NameMatch::Any => self.ctx.names.encode_qname(ch, qname)?,
        };
        self.write_prefix(qname, qid)?;
        Ok(qid)
    }

    fn write_prefix(&mut self, qname: &QName, qid: QNameId) -> Result<()> {
        if !self.options.preserve().prefixes {
            return Ok(());
        }
        let uri_id = self.ctx.names.context(qid)?.uri_id;
        self.ctx
            .names
            .encode_prefix(self.out.structure(), uri_id, qname.prefix.as_deref())
    }
}

/// Datentyp eines Attributs über eine Wildcard-Production.
fn wildcard_datatype(
    ctx: &CodingContext,
    xsi: &Option<(Undeclared, Datatype)>,
    qid: QNameId,
    built_in: bool,
) -> Datatype {
    match xsi {
        Some((_, datatype)) => datatype.clone(),
        None => ctx.undeclared_attribute_datatype(qid, built_in),
    }
}

/// Folgezustand einer Production, die nicht EE/ED ist.
fn successor(next: Option<GrammarId>, event: &str) -> Result<GrammarId> {
    next.ok_or_else(|| Error::SchemaError(format!("production {event} has no successor state")))
}

/// Encodes a complete event sequence into a new buffer.
///
/// Aufeinanderfolgende Attribute werden vorher in Stream-Reihenfolge sortiert.
pub fn encode(events: &[ExiEvent], source: &GrammarSource, options: &ExiOptions) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), source, options.clone())?;
    let mut i = 0;
    while i < events.len() {
        if let ExiEvent::Attribute(_) = &events[i] {
            let attributes: Vec<AtContent> = events[i..]
                .iter()
                .map_while(|e| match e {
                    ExiEvent::Attribute(at) => Some(at.clone()),
                    _ => None,
                })
                .collect();
            i += attributes.len();
            encoder.encode_attribute_list(&attributes)?;
            continue;
        }
        encoder.encode_event(&events[i])?;
        i += 1;
    }
    encoder.finish()
}

#[cfg(test)]
mod tests;
