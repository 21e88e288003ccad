//! Tree value types and their canonical string encodings.
//!
//! Two value spaces back the forest: the ≈254-bit prime field of note
//! commitments ([`Fp`]) and the full 256-bit unsigned integer space of
//! withdrawal hashes and nullifiers ([`U256`]). Field elements persist as
//! base-10 strings, opaque hash words as `0x`-hex; decoders accept either
//! form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub use primitive_types::U256;

/// Order of the BN254 scalar field:
/// 21888242871839275222246405745257275088548364400416034343698204186575808495617
const FIELD_MODULUS: U256 = U256([
    0x43E1_F593_F000_0001,
    0x2833_E848_79B9_7091,
    0xB850_45B6_8181_585D,
    0x3064_4E72_E131_A029,
]);

/// A value failed to parse from its persisted string form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid value string: {0:?}")]
pub struct ValueError(pub String);

/// A fixed-size, immutable tree value with a canonical persisted form.
pub trait TreeValue: Clone + PartialEq + Eq + fmt::Debug + Send + Sync + 'static {
    /// The additive identity; doubles as the empty-leaf value.
    fn zero() -> Self;

    /// Canonical persisted string (base-10 for field elements, 0x-hex for
    /// opaque hash words).
    fn to_repr(&self) -> String;

    /// Parse either a base-10 or a `0x`-hex string.
    fn from_repr(s: &str) -> Result<Self, ValueError>;

    /// `0x`-hex form, used by bootstrap rows.
    fn to_hex(&self) -> String;

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

fn parse_u256(s: &str) -> Result<U256, ValueError> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        U256::from_str_radix(hex, 16).map_err(|_| ValueError(s.to_string()))
    } else {
        U256::from_dec_str(s).map_err(|_| ValueError(s.to_string()))
    }?;
    Ok(parsed)
}

impl TreeValue for U256 {
    fn zero() -> Self {
        U256::zero()
    }

    fn to_repr(&self) -> String {
        format!("{self:#x}")
    }

    fn from_repr(s: &str) -> Result<Self, ValueError> {
        parse_u256(s)
    }

    fn to_hex(&self) -> String {
        format!("{self:#x}")
    }
}

/// An element of the BN254 scalar field, the ≈254-bit field in which note
/// commitments live. Always held in canonically reduced form.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fp(U256);

impl Fp {
    /// Reduce an integer into the field.
    pub fn new(value: U256) -> Self {
        if value >= FIELD_MODULUS {
            Fp(value % FIELD_MODULUS)
        } else {
            Fp(value)
        }
    }

    pub fn zero() -> Self {
        Fp(U256::zero())
    }

    pub fn into_u256(self) -> U256 {
        self.0
    }

    /// Big-endian 32-byte form, used by hashers.
    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        bytes
    }

    /// The field order.
    pub fn modulus() -> U256 {
        FIELD_MODULUS
    }
}

impl From<u64> for Fp {
    fn from(value: u64) -> Self {
        Fp(U256::from(value))
    }
}

impl From<U256> for Fp {
    fn from(value: U256) -> Self {
        Fp::new(value)
    }
}

impl fmt::Display for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fp({})", self.0)
    }
}

impl FromStr for Fp {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_repr(s)
    }
}

impl TreeValue for Fp {
    fn zero() -> Self {
        Fp::zero()
    }

    fn to_repr(&self) -> String {
        self.0.to_string()
    }

    fn from_repr(s: &str) -> Result<Self, ValueError> {
        Ok(Fp::new(parse_u256(s)?))
    }

    fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl Serialize for Fp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_repr())
    }
}

impl<'de> Deserialize<'de> for Fp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fp::from_repr(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulus_limbs() {
        // r = 0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001
        let from_hex = U256::from_str_radix(
            "30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001",
            16,
        )
        .unwrap();
        assert_eq!(FIELD_MODULUS, from_hex);
    }

    #[test]
    fn test_fp_reduction() {
        assert_eq!(Fp::new(FIELD_MODULUS), Fp::zero());
        assert_eq!(Fp::new(FIELD_MODULUS + U256::from(5)), Fp::from(5u64));
        assert_eq!(Fp::from(7u64).into_u256(), U256::from(7));
    }

    #[test]
    fn test_fp_repr_roundtrip() {
        let value = Fp::from(123_456_789u64);
        assert_eq!(value.to_repr(), "123456789");
        assert_eq!(Fp::from_repr("123456789").unwrap(), value);
        assert_eq!(Fp::from_repr("0x75bcd15").unwrap(), value);
        assert!(Fp::from_repr("not a number").is_err());
    }

    #[test]
    fn test_u256_repr_roundtrip() {
        let value = U256::from(0xdeadbeefu64);
        assert_eq!(value.to_repr(), "0xdeadbeef");
        assert_eq!(U256::from_repr("0xdeadbeef").unwrap(), value);
        assert_eq!(U256::from_repr("3735928559").unwrap(), value);
    }

    #[test]
    fn test_zero_is_zero() {
        assert!(Fp::zero().is_zero());
        assert!(<U256 as TreeValue>::zero().is_zero());
        assert!(!Fp::from(1u64).is_zero());
    }

    #[test]
    fn test_fp_serde_as_decimal_string() {
        let value = Fp::from(42u64);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"42\"");
        let back: Fp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
