//! Fuzzes the client's block-read reassembly with arbitrary device responses.
//!
//! Input is split into responses of `[len, bytes...]`. Reassembly must never
//! panic, never accept more data than the block declared, and stop feeding
//! once complete.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_block_reassembly
#![no_main]
use libfuzzer_sys::fuzz_target;
use smbusb_client::BlockAssembler;

fuzz_target!(|data: &[u8]| {
    let mut assembler = BlockAssembler::new();
    let mut rest = data;
    while let [len, tail @ ..] = rest {
        let take = usize::from(*len).min(tail.len());
        let (response, next) = tail.split_at(take);
        match assembler.push(response) {
            Ok(true) => {
                assert_eq!(Some(assembler.data().len()), assembler.declared());
                break;
            }
            Ok(false) => {}
            Err(_) => break,
        }
        rest = next;
    }
    if let Some(declared) = assembler.declared() {
        assert!(assembler.data().len() <= declared);
    }
});
