//! Fuzz test for rejection reason extraction
//!
//! Rejection messages are free text from the remote system. Extraction must
//! never panic, and text without a recognised pattern passes through as is.
//!
//! Run with: cargo +nightly fuzz run rejection_fuzz -- -max_total_time=60

#![no_main]

use dove_ledger::extract_reason;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = std::str::from_utf8(data) {
        let reason = extract_reason(message);
        if !message.contains("panicked at") && !message.contains("Program log: Error: ") {
            assert_eq!(reason, message);
        }
    }
});
