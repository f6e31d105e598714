#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = exi_codec::bitstream::BitDecoderChannel::new(data);
    let _ = exi_codec::header::decode(&mut reader, true);
});
