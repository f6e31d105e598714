use super::*;
use crate::compression::deflate_decompress_stream;
use crate::event::{ChContent, CmContent, NsContent};
use crate::options::Preserve;
use crate::decoder::decode;
use crate::schema::{AttributeUse, ComplexType, ContentType, Particle, SchemaBuilder};

fn q(local: &str) -> QName {
    QName::new("", local)
}

fn built_in(options: ExiOptions) -> Encoder<Vec<u8>> {
    Encoder::new(Vec::new(), &GrammarSource::BuiltIn, options).unwrap()
}

/// `<a>` enthält beliebig viele `<b>` vom Typ int.
fn repeated_b() -> GrammarSource {
    let mut builder = SchemaBuilder::new();
    let int = builder.simple_type(Datatype::Integer);
    let a = builder.complex_type(ComplexType::new(ContentType::ElementOnly(vec![
        Particle::zero_or_more(q("b"), int),
    ])));
    builder.global_element(q("a"), a, false);
    builder.build().unwrap().into()
}

fn document(body: Vec<ExiEvent>) -> Vec<ExiEvent> {
    let mut events = vec![ExiEvent::StartDocument];
    events.extend(body);
    events.push(ExiEvent::EndDocument);
    events
}

// ========================================================================
// Header und Konstruktion
// ========================================================================

// --- Test 1: Minimales Dokument ---
/// EXI 8.4: SD (0 Bit), SE(*) (0 Bit) + QName, EE über Level 2 (2 Bit), ED (0 Bit).
#[test]
fn minimales_dokument() {
    let events = document(vec![ExiEvent::StartElement(q("root")), ExiEvent::EndElement]);
    let bytes = encode(&events, &GrammarSource::BuiltIn, &ExiOptions::default()).unwrap();
    // 01 | 00000101 "root" | 00 | Padding
    assert_eq!(bytes, [0x80, 0x41, 0x5C, 0x9B, 0xDB, 0xDD, 0x00]);
}

// --- Test 2: Cookie ---
#[test]
fn header_mit_cookie() {
    let mut encoder = Encoder::with_header(
        Vec::new(),
        &GrammarSource::BuiltIn,
        ExiOptions::default(),
        ExiHeader::new().with_cookie(),
    )
    .unwrap();
    for event in document(vec![ExiEvent::StartElement(q("root")), ExiEvent::EndElement]) {
        encoder.encode_event(&event).unwrap();
    }
    let bytes = encoder.finish().unwrap();
    assert_eq!(&bytes[..5], b"$EXI\x80");
}

#[test]
fn header_options_abgelehnt() {
    let result = Encoder::with_header(
        Vec::new(),
        &GrammarSource::BuiltIn,
        ExiOptions::default(),
        ExiHeader::new().with_options(),
    );
    assert_eq!(result.err(), Some(Error::UnsupportedHeaderOptions));
}

// --- Test 3: Konfigurationsfehler vor dem ersten Byte ---
#[test]
fn konfigurationsfehler() {
    let strict = ExiOptions::default().with_strict();
    let result = Encoder::new(Vec::new(), &GrammarSource::BuiltIn, strict);
    assert_eq!(result.err(), Some(Error::MissingSchema));

    let zero_blocks = ExiOptions::default().with_compression().with_block_size(0);
    let result = Encoder::new(Vec::new(), &GrammarSource::BuiltIn, zero_blocks);
    assert_eq!(result.err(), Some(Error::InvalidBlockSize));
}

// ========================================================================
// Reihenfolge
// ========================================================================

// --- Test 4: Ordering Violations ---
#[test]
fn reihenfolge_verletzt() {
    let mut encoder = built_in(ExiOptions::default());
    assert!(matches!(
        encoder.encode_start_element(&q("a")),
        Err(Error::OrderingViolation { .. })
    ));

    encoder.encode_start_document().unwrap();
    assert!(matches!(encoder.encode_start_document(), Err(Error::OrderingViolation { .. })));
    encoder.encode_start_element(&q("a")).unwrap();
    assert!(matches!(encoder.encode_end_document(), Err(Error::OrderingViolation { .. })));
    encoder.encode_end_element().unwrap();
    encoder.encode_end_document().unwrap();
    assert!(matches!(encoder.encode_characters("x"), Err(Error::OrderingViolation { .. })));
    assert!(encoder.finish().is_ok());
}

#[test]
fn finish_ohne_ed() {
    let mut encoder = built_in(ExiOptions::default());
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element(&q("a")).unwrap();
    assert!(matches!(encoder.finish(), Err(Error::OrderingViolation { .. })));
}

// --- Test 5: Kein passendes Event ---
#[test]
fn unerwartetes_event() {
    let mut encoder = built_in(ExiOptions::default());
    encoder.encode_start_document().unwrap();
    // DocContent kennt kein CH
    let err = encoder.encode_characters("text").unwrap_err();
    assert!(matches!(err, Error::UnexpectedEvent { .. }), "{err}");
    assert!(err.to_string().contains("DocContent"), "{err}");

    // Zweites Root-Element: DocEnd kennt nur ED
    encoder.encode_start_element(&q("a")).unwrap();
    encoder.encode_end_element().unwrap();
    assert!(matches!(
        encoder.encode_start_element(&q("b")),
        Err(Error::UnexpectedEvent { .. })
    ));
}

// ========================================================================
// Lernen (EXI 8.4.3)
// ========================================================================

// --- Test 6: Gelernte Productions ---
#[test]
fn gelernte_productions() {
    let mut encoder = built_in(ExiOptions::default());
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element(&q("a")).unwrap();
    let a_start = encoder.stack.last().unwrap().start;
    for _ in 0..2 {
        encoder.encode_start_element(&q("b")).unwrap();
        encoder.encode_end_element().unwrap();
    }

    let grammars = &encoder.ctx.grammars;
    let start = grammars.get(a_start).unwrap();
    let content = grammars.get(start.content.unwrap()).unwrap();
    let b = encoder.ctx.names.lookup_qname(&q("b")).unwrap();
    assert_eq!(start.len(), 1);
    assert!(matches!(start.productions[0].event, Event::StartElement { qname, .. } if qname == b));
    // ElementContent: [EE, SE(b)] → SE(b) hat Code 0
    assert_eq!(content.len(), 2);
    assert_eq!(content.code_of(1), 0);

    let b_grammar = encoder.ctx.names.element_grammar(b).unwrap();
    let b_start = grammars.get(b_grammar).unwrap();
    assert_eq!(b_start.productions.iter().filter(|p| p.event == Event::EndElement).count(), 1);
    // "a" und "b" je einmal in der Tabelle
    assert_eq!(encoder.ctx.names.local_count(0), 2);
}

#[test]
fn attribute_und_characters_gelernt() {
    let mut encoder = built_in(ExiOptions::default());
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element(&q("a")).unwrap();
    let a_start = encoder.stack.last().unwrap().start;
    encoder.encode_attribute(&q("id"), "1").unwrap();
    encoder.encode_characters("x").unwrap();
    encoder.encode_end_element().unwrap();

    let start = encoder.ctx.grammars.get(a_start).unwrap();
    let kinds: Vec<_> = start.productions.iter().map(|p| p.event.event_type()).collect();
    assert_eq!(kinds, [crate::event::EventType::Attribute, crate::event::EventType::Characters]);
    // CH aus dem Start-Tag führt in den Inhaltszustand
    assert_eq!(start.productions[1].next, start.content);
}

// ========================================================================
// Schema-informed
// ========================================================================

// --- Test 7: <a><b>5</b><b>6</b></a> ---
/// Beide `b` teilen Production und Grammar, Werte laufen nie durch die String Table.
#[test]
fn wiederholtes_element_mit_schema() {
    let source = repeated_b();
    let mut encoder = Encoder::new(Vec::new(), &source, ExiOptions::default()).unwrap();
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element(&q("a")).unwrap();
    let mut b_grammars = Vec::new();
    for value in ["5", "6"] {
        encoder.encode_start_element(&q("b")).unwrap();
        b_grammars.push(encoder.stack.last().unwrap().start);
        encoder.encode_characters(value).unwrap();
        encoder.encode_end_element().unwrap();
    }
    encoder.encode_end_element().unwrap();
    encoder.encode_end_document().unwrap();

    assert_eq!(b_grammars[0], b_grammars[1]);
    assert_eq!(encoder.ctx.values.global_count(), 0);
    // "a" und "b" kamen aus dem Schema, keine neuen local names
    assert_eq!(encoder.ctx.names.local_count(0), 2);
    // Schema-Zustände lernen nicht
    assert_eq!(encoder.ctx.grammars.len(), source.schema().unwrap().len());
    encoder.finish().unwrap();
}

#[test]
fn ungueltiger_wert_mit_fallback() {
    let source = repeated_b();
    let events = document(vec![
        ExiEvent::StartElement(q("a")),
        ExiEvent::StartElement(q("b")),
        ExiEvent::characters("fünf"),
        ExiEvent::EndElement,
        ExiEvent::EndElement,
    ]);
    // Nicht strikt: CH [untyped]
    assert!(encode(&events, &source, &ExiOptions::default()).is_ok());
    // Strikt: Fehler
    let err = encode(&events, &source, &ExiOptions::default().with_strict()).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)), "{err}");
}

#[test]
fn strikt_ohne_generische_productions() {
    let source = repeated_b();
    let events = document(vec![
        ExiEvent::StartElement(q("a")),
        ExiEvent::StartElement(q("unbekannt")),
        ExiEvent::EndElement,
        ExiEvent::EndElement,
    ]);
    assert!(encode(&events, &source, &ExiOptions::default()).is_ok());
    let err = encode(&events, &source, &ExiOptions::default().with_strict()).unwrap_err();
    assert!(matches!(err, Error::UnexpectedEvent { .. }), "{err}");
}

/// EXI 8.5.4.4.1: auch nach AT(a) bleibt AT(*) auf Level 2 offen.
#[test]
fn attribut_nach_letztem_deklarierten() {
    let mut builder = SchemaBuilder::new();
    let t = builder.complex_type(
        ComplexType::new(ContentType::Simple(Datatype::String))
            .with_attribute(AttributeUse::optional(q("a"), Datatype::Integer)),
    );
    builder.global_element(q("r"), t, false);
    let source: GrammarSource = builder.build().unwrap().into();

    let events = document(vec![
        ExiEvent::StartElement(q("r")),
        ExiEvent::attribute(q("a"), "1"),
        ExiEvent::attribute(q("b"), "x"),
        ExiEvent::characters("text"),
        ExiEvent::EndElement,
    ]);
    let bytes = encode(&events, &source, &ExiOptions::default()).unwrap();
    assert_eq!(decode(&bytes, &source, &ExiOptions::default()).unwrap(), events);

    let err = encode(&events, &source, &ExiOptions::default().with_strict()).unwrap_err();
    assert!(matches!(err, Error::UnexpectedEvent { .. }), "{err}");
}

// ========================================================================
// Fidelity
// ========================================================================

// --- Test 8: Nicht erhaltene Events verschwinden ---
#[test]
fn kommentar_ohne_preserve_verworfen() {
    let plain = document(vec![ExiEvent::StartElement(q("a")), ExiEvent::EndElement]);
    let with_comment = document(vec![
        ExiEvent::StartElement(q("a")),
        ExiEvent::Comment(CmContent { text: "c".into() }),
        ExiEvent::EndElement,
    ]);
    let options = ExiOptions::default();
    assert_eq!(
        encode(&plain, &GrammarSource::BuiltIn, &options).unwrap(),
        encode(&with_comment, &GrammarSource::BuiltIn, &options).unwrap()
    );

    let preserve = options.with_preserve(Preserve { comments: true, ..Preserve::default() });
    assert_ne!(
        encode(&plain, &GrammarSource::BuiltIn, &preserve).unwrap(),
        encode(&with_comment, &GrammarSource::BuiltIn, &preserve).unwrap()
    );
}

#[test]
fn namespace_bindet_prefix() {
    let mut encoder = built_in(ExiOptions::default());
    encoder.encode_start_document().unwrap();
    encoder.encode_start_element(&QName::with_prefix("urn:x", "a", "p")).unwrap();
    encoder.encode_event(&ExiEvent::NamespaceDeclaration(NsContent {
        uri: "urn:x".into(),
        prefix: "p".into(),
        local_element_ns: true,
    }))
    .unwrap();
    assert_eq!(encoder.scope.resolve("p").as_deref(), Some("urn:x"));
    encoder.encode_end_element().unwrap();
    assert_eq!(encoder.scope.resolve("p"), None);
}

// ========================================================================
// Blöcke (EXI 9)
// ========================================================================

fn many_values(n: usize) -> Vec<ExiEvent> {
    let mut body = vec![ExiEvent::StartElement(q("list"))];
    for i in 0..n {
        body.push(ExiEvent::StartElement(q("item")));
        body.push(ExiEvent::Characters(ChContent { value: format!("v{}", i % 7).into() }));
        body.push(ExiEvent::EndElement);
    }
    body.push(ExiEvent::EndElement);
    document(body)
}

// --- Test 9: Compression = DEFLATE über Pre-compression ---
#[test]
fn compression_entspricht_precompression() {
    let events = many_values(20);
    let pre = encode(
        &events,
        &GrammarSource::BuiltIn,
        &ExiOptions::default().with_alignment(Alignment::PreCompression),
    )
    .unwrap();
    let packed = encode(&events, &GrammarSource::BuiltIn, &ExiOptions::default().with_compression()).unwrap();

    assert_eq!(pre[0], 0x80);
    assert_eq!(packed[0], 0x80);
    // ≤ 100 Values: genau ein Stream
    let (inflated, used) = deflate_decompress_stream(&packed[1..]).unwrap();
    assert_eq!(used, packed.len() - 1);
    assert_eq!(inflated, pre[1..]);
}

#[test]
fn bloecke_nach_block_size() {
    let events = many_values(10);
    let options = ExiOptions::default().with_compression().with_block_size(4);
    let packed = encode(&events, &GrammarSource::BuiltIn, &options).unwrap();

    // 10 Values bei Blockgröße 4: drei Blöcke, je ein Stream
    let mut offset = 1;
    let mut blocks = 0;
    while offset < packed.len() {
        let (_, used) = deflate_decompress_stream(&packed[offset..]).unwrap();
        offset += used;
        blocks += 1;
    }
    assert_eq!(blocks, 3);
}

#[test]
fn byte_alignment_padding() {
    let events = document(vec![ExiEvent::StartElement(q("a")), ExiEvent::EndElement]);
    let options = ExiOptions::default().with_alignment(Alignment::ByteAlignment);
    let bytes = encode(&events, &GrammarSource::BuiltIn, &options).unwrap();
    // Header gepaddet, SE(*) 0 Bit, URI 1 Byte, "a" 2 Bytes, EE-Code 1 Byte (Teil 1 hat 0 Bit)
    assert_eq!(bytes, [0x80, 0x01, 0x02, b'a', 0x00]);
}
