#![no_main]
use libfuzzer_sys::fuzz_target;
use exi_codec::options::{Alignment, ExiOptions};
use exi_codec::GrammarSource;

fuzz_target!(|data: &[u8]| {
    // Blockpfade: DEFLATE-Streams und Pre-compression mit kleinen Blöcken
    let opts_comp = ExiOptions::default().with_compression().with_block_size(4);
    let _ = exi_codec::decoder::decode(data, &GrammarSource::BuiltIn, &opts_comp);

    let opts_pre = ExiOptions::default().with_alignment(Alignment::PreCompression).with_block_size(4);
    let _ = exi_codec::decoder::decode(data, &GrammarSource::BuiltIn, &opts_pre);
});
