//! Identity key derivation.
//!
//! The key indexes the credential store. It only has to be stable and
//! distinct for distinct configurations; it is not a secret and not a
//! credential.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for the name-based UUIDs produced by [`derive_key`].
const IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6c0e_7d1a_93b4_4f52_a1d8_2e6f_c3b9_0a47);

/// Opaque lookup key into a [`CredentialsStore`](crate::CredentialsStore).
///
/// Always 32 lowercase hex characters, so it is safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the store key for a configured collector name and access pair.
///
/// The fields are NUL-separated before hashing so that moving characters
/// between adjacent fields yields a different key. An empty collector name
/// is a valid input: it is what an unnamed collector is keyed under.
pub fn derive_key(collector_name: &str, access_id: &str, access_key: &str) -> IdentityKey {
    let material = [collector_name, access_id, access_key].join("\0");
    let id = Uuid::new_v5(&IDENTITY_NAMESPACE, material.as_bytes());
    IdentityKey(id.simple().to_string())
}
