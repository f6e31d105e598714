#![no_main]
use libfuzzer_sys::fuzz_target;
use exi_codec::{ExiEvent, ExiOptions, GrammarSource, QName};

fuzz_target!(|data: &[u8]| {
    // Jedes Wort wird ein Element mit dem Wort als Inhalt
    let Ok(text) = std::str::from_utf8(data) else { return };
    let mut events = vec![ExiEvent::StartDocument, ExiEvent::StartElement(QName::new("", "r"))];
    for word in text.split_whitespace().take(64) {
        let name: String = word.chars().filter(|c| c.is_alphabetic()).take(8).collect();
        if name.is_empty() {
            continue;
        }
        events.push(ExiEvent::StartElement(QName::new("", name)));
        events.push(ExiEvent::characters(word));
        events.push(ExiEvent::EndElement);
    }
    events.push(ExiEvent::EndElement);
    events.push(ExiEvent::EndDocument);

    for opts in [ExiOptions::default(), ExiOptions::default().with_compression()] {
        let exi = exi_codec::encoder::encode(&events, &GrammarSource::BuiltIn, &opts).expect("encode");
        let decoded = exi_codec::decoder::decode(&exi, &GrammarSource::BuiltIn, &opts).expect("decode");
        assert_eq!(decoded, events);
    }
});
