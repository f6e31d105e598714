#![no_main]
use libfuzzer_sys::fuzz_target;
use exi_codec::options::{Alignment, ExiOptions, Preserve};
use exi_codec::GrammarSource;

fuzz_target!(|data: &[u8]| {
    let fidelity = Preserve { comments: true, pis: true, dtd: true, prefixes: true, lexical_values: false };
    for opts in [
        ExiOptions::default(),
        ExiOptions::default().with_alignment(Alignment::ByteAlignment),
        ExiOptions::default().with_fragment().with_preserve(fidelity),
    ] {
        let _ = exi_codec::decoder::decode(data, &GrammarSource::BuiltIn, &opts);
    }
});
