//! Three-valued test outcomes and content fingerprints
//!
//! Every candidate handed to an oracle is identified by a [`Fingerprint`]:
//! a SHA-256 digest of its content. Equal content always produces the same
//! fingerprint, so the outcome cache can answer repeated probes without
//! running the test again.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Result of classifying one candidate.
///
/// Codes match the on-disk cache format: FAIL=0, PASS=1, UNRESOLVED=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The candidate reproduces the original failure
    Fail = 0,
    /// The candidate does not reproduce the failure
    Pass = 1,
    /// The oracle could not decide (invalid input, timeout, unrelated failure)
    Unresolved = 2,
}

impl Outcome {
    pub fn is_fail(self) -> bool {
        self == Outcome::Fail
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Outcome::Fail),
            1 => Some(Outcome::Pass),
            2 => Some(Outcome::Unresolved),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Fail => "FAIL",
            Outcome::Pass => "PASS",
            Outcome::Unresolved => "UNRESOLVED",
        };
        f.write_str(name)
    }
}

/// Content digest used as the outcome cache key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string back into a fingerprint
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let bytes = hex::decode(hex_str).ok()?;
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Fingerprint(digest))
    }

    /// Short prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Capability required of everything the minimizers search over:
/// feed a canonical encoding of the content into a hasher.
///
/// Implementations must write the same bytes for equal values. Variable
/// length data is length-prefixed so that distinct nestings never collide.
pub trait ContentHash {
    fn hash_content(&self, state: &mut Sha256);

    fn fingerprint(&self) -> Fingerprint {
        let mut state = Sha256::new();
        self.hash_content(&mut state);
        Fingerprint(state.finalize().into())
    }
}

/// Size measure used for the strict-shrinking invariant: sequence length or
/// tree node count.
pub trait Extent {
    fn extent(&self) -> usize;
}

impl<T> Extent for [T] {
    fn extent(&self) -> usize {
        self.len()
    }
}

impl<T> Extent for Vec<T> {
    fn extent(&self) -> usize {
        self.len()
    }
}

macro_rules! content_hash_le_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ContentHash for $ty {
                fn hash_content(&self, state: &mut Sha256) {
                    state.update(self.to_le_bytes());
                }
            }
        )*
    };
}

content_hash_le_bytes!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

impl ContentHash for usize {
    fn hash_content(&self, state: &mut Sha256) {
        (*self as u64).hash_content(state);
    }
}

impl ContentHash for isize {
    fn hash_content(&self, state: &mut Sha256) {
        (*self as i64).hash_content(state);
    }
}

impl ContentHash for bool {
    fn hash_content(&self, state: &mut Sha256) {
        state.update([*self as u8]);
    }
}

impl ContentHash for char {
    fn hash_content(&self, state: &mut Sha256) {
        (*self as u32).hash_content(state);
    }
}

impl ContentHash for str {
    fn hash_content(&self, state: &mut Sha256) {
        self.len().hash_content(state);
        state.update(self.as_bytes());
    }
}

impl ContentHash for String {
    fn hash_content(&self, state: &mut Sha256) {
        self.as_str().hash_content(state);
    }
}

impl<T: ContentHash> ContentHash for [T] {
    fn hash_content(&self, state: &mut Sha256) {
        self.len().hash_content(state);
        for item in self {
            item.hash_content(state);
        }
    }
}

impl<T: ContentHash> ContentHash for Vec<T> {
    fn hash_content(&self, state: &mut Sha256) {
        self.as_slice().hash_content(state);
    }
}

impl<T: ContentHash> ContentHash for Option<T> {
    fn hash_content(&self, state: &mut Sha256) {
        match self {
            None => state.update([0u8]),
            Some(value) => {
                state.update([1u8]);
                value.hash_content(state);
            }
        }
    }
}

impl<A: ContentHash, B: ContentHash> ContentHash for (A, B) {
    fn hash_content(&self, state: &mut Sha256) {
        self.0.hash_content(state);
        self.1.hash_content(state);
    }
}

impl<T: ContentHash + ?Sized> ContentHash for &T {
    fn hash_content(&self, state: &mut Sha256) {
        (**self).hash_content(state);
    }
}
