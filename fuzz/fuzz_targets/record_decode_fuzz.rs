//! Fuzz test for protocol record decoding
//!
//! Account data comes from the remote system and is untrusted. Decoding any
//! byte sequence must return a value or a `Decode` error, never panic.
//!
//! Run with: cargo +nightly fuzz run record_decode_fuzz -- -max_total_time=60

#![no_main]

use dove_core::{
    AccountRecord, Collateral, ErrorClass, PriceFeed, Savings, Stability, TokenAccount, Vault,
    World,
};
use libfuzzer_sys::fuzz_target;

fn check<R: AccountRecord>(data: &[u8]) {
    if let Err(err) = R::from_bytes(data) {
        assert_eq!(err.class(), ErrorClass::Invalid);
    }
}

fuzz_target!(|data: &[u8]| {
    check::<World>(data);
    check::<Vault>(data);
    check::<Collateral>(data);
    check::<Stability>(data);
    check::<Savings>(data);
    check::<TokenAccount>(data);
    check::<PriceFeed>(data);

    // A decoded vault re-encodes and decodes to itself.
    if let Ok(vault) = Vault::from_bytes(data) {
        if let Ok(bytes) = vault.to_bytes() {
            let again = Vault::from_bytes(&bytes).map(|v| v.to_bytes().ok());
            assert!(again.is_ok(), "re-encoded vault must decode");
        }
    }
});
