// Gemeinsame Helfer fuer die Round-Trip-Tests.
//
// Wird per `include!` eingebunden. Benötigte Imports:
//   use exi_codec::{Alignment, ExiEvent, ExiOptions, GrammarSource, QName};
//   use exi_codec::decoder::decode;
//   use exi_codec::encoder::encode;

// ============================================================================
// Alignment-Konfigurationen
// ============================================================================

#[allow(dead_code)]
const ALIGNMENTS: &[(&str, fn(&mut ExiOptions))] = &[
    ("bitpacked", |_| {}),
    ("bytealigned", |o| o.set_alignment(Alignment::ByteAlignment)),
    ("precompression", |o| o.set_alignment(Alignment::PreCompression)),
    ("compression", |o| o.set_compression(true)),
];

// ============================================================================
// Hilfsfunktionen
// ============================================================================

#[allow(dead_code)]
fn q(local: &str) -> QName {
    QName::new("", local)
}

/// Rahmt `body` mit SD/ED ein.
#[allow(dead_code)]
fn document(body: Vec<ExiEvent>) -> Vec<ExiEvent> {
    let mut events = Vec::with_capacity(body.len() + 2);
    events.push(ExiEvent::StartDocument);
    events.extend(body);
    events.push(ExiEvent::EndDocument);
    events
}

/// `<name>value</name>`
#[allow(dead_code)]
fn leaf(name: &str, value: &str) -> Vec<ExiEvent> {
    vec![
        ExiEvent::StartElement(q(name)),
        ExiEvent::characters(value),
        ExiEvent::EndElement,
    ]
}

/// Encodiert, decodiert und liefert die decodierten Events.
#[allow(dead_code)]
fn round_trip(events: &[ExiEvent], source: &GrammarSource, options: &ExiOptions) -> Vec<ExiEvent> {
    let exi = encode(events, source, options)
        .unwrap_or_else(|e| panic!("Encode-Fehler: {e}\nOptions: {options:?}\nEvents: {events:?}"));
    decode(&exi, source, options)
        .unwrap_or_else(|e| panic!("Decode-Fehler: {e}\nOptions: {options:?}\nEXI: {} bytes", exi.len()))
}

/// Round-Trip über alle vier Alignments; die Events müssen unverändert
/// zurückkommen.
#[allow(dead_code)]
fn assert_all_alignments(events: &[ExiEvent], source: &GrammarSource, base: &ExiOptions) {
    for &(name, apply) in ALIGNMENTS {
        let mut options = base.clone();
        apply(&mut options);
        let decoded = round_trip(events, source, &options);
        assert_eq!(decoded, events, "[{name}] Events weichen ab");
    }
}
