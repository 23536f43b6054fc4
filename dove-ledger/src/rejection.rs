//! Human-readable reasons from remote rejection messages.

use once_cell::sync::Lazy;
use regex::Regex;

static PANIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"panicked at ([^:"]+):(\d+):(\d+):\s*([^"\n]*)"#).expect("Invalid panic regex")
});

static PROGRAM_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Program log: Error: ([^"\n]+)"#).expect("Invalid error regex"));

static INSTRUCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Program log: Instruction: ([^"\n]+)"#).expect("Invalid instruction regex")
});

/// Extract the reason from a rejection message, falling back to the raw text.
///
/// A program panic becomes `Reverted: msg (file, line L, col C)`. A logged
/// program error becomes `Msg`, or `X failed: Msg` when the failing
/// instruction `X` was logged too.
pub fn extract_reason(message: &str) -> String {
    if let Some(caps) = PANIC.captures(message) {
        let msg = caps[4].replace("\\n", "");
        return format!(
            "Reverted: {} ({}, line {}, col {})",
            msg.trim(),
            &caps[1],
            &caps[2],
            &caps[3]
        );
    }
    if let Some(caps) = PROGRAM_ERROR.captures(message) {
        let msg = capitalize(caps[1].trim());
        return match INSTRUCTION.captures(message) {
            Some(instruction) => format!("{} failed: {}", instruction[1].trim(), msg),
            None => msg,
        };
    }
    message.to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
