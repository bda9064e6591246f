// Stove authentication material
//
// The firmware authenticates writes with HSPIN = md5(nonce + md5(pin)).
// Both sides compute it independently, so the digest and the hex
// encoding (lowercase) must stay exactly as the device expects.

use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};

/// Lowercase hex MD5 of `secret`.
pub fn derive_hash(secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Session secret for `nonce`: `derive_hash(nonce + pin_hash)`.
pub fn derive_session_secret(nonce: &str, pin_hash: &PinHash) -> SecretString {
    let mut material = String::with_capacity(nonce.len() + pin_hash.0.len());
    material.push_str(nonce);
    material.push_str(&pin_hash.0);
    SecretString::from(derive_hash(&material))
}

/// Derived PIN hash (HPIN). Stable for the lifetime of a session.
#[derive(Clone, PartialEq, Eq)]
pub struct PinHash(String);

impl PinHash {
    pub fn from_pin(pin: &SecretString) -> Self {
        Self(derive_hash(pin.expose_secret()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PinHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PinHash(..)")
    }
}
