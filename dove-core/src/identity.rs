//! Account keys, principals and cache identities.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// A 32-byte on-chain account address.
///
/// Rendered as lowercase hex everywhere (display, config files, logs).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountKey([u8; 32]);

impl AccountKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero key (the system program address).
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Parse a 64-character hex literal at compile time.
    ///
    /// Invalid input fails const evaluation, so this is only meant for
    /// well-known constants.
    pub const fn from_hex_const(hex: &str) -> Self {
        let bytes = hex.as_bytes();
        assert!(bytes.len() == 64, "account key literal must be 64 hex chars");
        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            out[i] = (nibble(bytes[2 * i]) << 4) | nibble(bytes[2 * i + 1]);
            i += 1;
        }
        Self(out)
    }

    /// Parse a hex string.
    pub fn from_hex(value: &str) -> Result<Self, ProtocolError> {
        let decoded = hex::decode(value.trim()).map_err(|e| ProtocolError::InvalidKey {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| ProtocolError::InvalidKey {
            value: value.to_string(),
            reason: format!("expected 32 bytes, got {}", v.len()),
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the base58 form used on the JSON-RPC wire.
    pub fn from_base58(value: &str) -> Result<Self, ProtocolError> {
        let decoded = bs58::decode(value.trim())
            .into_vec()
            .map_err(|e| ProtocolError::InvalidKey {
                value: value.to_string(),
                reason: e.to_string(),
            })?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| ProtocolError::InvalidKey {
            value: value.to_string(),
            reason: format!("expected 32 bytes, got {}", v.len()),
        })?;
        Ok(Self(bytes))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a program-owned address from seeds.
    ///
    /// Deterministic: the same program and seeds always produce the same key.
    pub fn derive(program: &AccountKey, seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update((seed.len() as u32).to_le_bytes());
            hasher.update(seed);
        }
        hasher.update(program.0);
        hasher.update(b"ProgramDerivedAddress");
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Short form used in log fields.
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}..{}", &hex[..6], &hex[58..])
    }
}

const fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in account key literal"),
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKey({})", self.short())
    }
}

impl FromStr for AccountKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for AccountKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// The active signer on whose behalf principal-scoped state is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(AccountKey);

impl Principal {
    pub const fn new(key: AccountKey) -> Self {
        Self(key)
    }

    pub fn key(&self) -> AccountKey {
        self.0
    }
}

impl From<AccountKey> for Principal {
    fn from(key: AccountKey) -> Self {
        Self(key)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable type tag of a cache type, e.g. `"vault-cache"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(&'static str);

impl CacheId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for CacheId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

// ============================================================================
// WELL-KNOWN PROGRAMS
// ============================================================================

pub const DOVE_PROGRAM_ID: AccountKey =
    AccountKey::from_hex_const("33dce96975f0656a5f1622f024b176e5e14652eb885a158a7641269587187daf");
pub const TOKEN_PROGRAM_ID: AccountKey =
    AccountKey::from_hex_const("06ddf6e1d765a193d9cbe146ceeb79ac1cb485ed5f5b37913a8cf5857eff00a9");
pub const TOKEN_2022_PROGRAM_ID: AccountKey =
    AccountKey::from_hex_const("06ddf6e1ee758fde18425dbce46ccddab61afc4d83b90d27febdf928d8a18bfc");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: AccountKey =
    AccountKey::from_hex_const("8c97258f4e2489f1bb3d1029148e0d830b5a1399daff1084048e7bd8dbe9f859");
pub const SYSTEM_PROGRAM_ID: AccountKey = AccountKey::zero();
/// Mint of wrapped native SOL.
pub const NATIVE_MINT: AccountKey =
    AccountKey::from_hex_const("069b8857feab8184fb687f634618c035dac439dc1aeb3b5598a0f00000000001");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip_through_display_and_parse() {
        let key: AccountKey = DOVE_PROGRAM_ID.to_string().parse().unwrap();
        assert_eq!(key, DOVE_PROGRAM_ID);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        let err = AccountKey::from_hex("abcd").unwrap_err();
        assert!(format!("{}", err).contains("expected 32 bytes"));
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        assert!(AccountKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_base58_system_program_and_errors() {
        let system = AccountKey::from_base58("11111111111111111111111111111111").unwrap();
        assert_eq!(system, AccountKey::zero());
        assert_eq!(
            AccountKey::from_base58(&NATIVE_MINT.to_base58()).unwrap(),
            NATIVE_MINT
        );
        assert!(matches!(
            AccountKey::from_base58("111"),
            Err(ProtocolError::InvalidKey { .. })
        ));
        assert!(AccountKey::from_base58("0OIl").is_err());
    }

    #[test]
    fn test_derive_is_deterministic_and_seed_sensitive() {
        let a = AccountKey::derive(&DOVE_PROGRAM_ID, &[b"vault", NATIVE_MINT.as_bytes()]);
        let b = AccountKey::derive(&DOVE_PROGRAM_ID, &[b"vault", NATIVE_MINT.as_bytes()]);
        let c = AccountKey::derive(&DOVE_PROGRAM_ID, &[b"savings", NATIVE_MINT.as_bytes()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_derive_seed_boundaries_matter() {
        let a = AccountKey::derive(&DOVE_PROGRAM_ID, &[b"ab", b"c"]);
        let b = AccountKey::derive(&DOVE_PROGRAM_ID, &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let json = serde_json::to_string(&NATIVE_MINT).unwrap();
        assert_eq!(json, format!("\"{}\"", NATIVE_MINT.to_hex()));
        let back: AccountKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NATIVE_MINT);
    }

    #[test]
    fn test_native_mint_tail_bytes() {
        assert_eq!(NATIVE_MINT.as_bytes()[31], 0x01);
        assert_eq!(SYSTEM_PROGRAM_ID, AccountKey::zero());
    }
}
