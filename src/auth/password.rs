//! Password storage schemes.
//!
//! Stored values use the `{SCHEME}encoded` convention. `{SSHA256}` is the
//! default and stores `base64(sha256(password || salt) || salt)`. `{SHA256}`
//! and `{CLEAR}` are accepted for existing entries but are deprecated: a
//! successful bind against either is followed by a rehash.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use std::fmt;

const SALT_LENGTH: usize = 8;
const DIGEST_LENGTH: usize = 32;

/// Supported storage schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    SaltedSha256,
    Sha256,
    Clear,
}

impl PasswordScheme {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SaltedSha256 => "SSHA256",
            Self::Sha256 => "SHA256",
            Self::Clear => "CLEAR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SSHA256" => Some(Self::SaltedSha256),
            "SHA256" => Some(Self::Sha256),
            "CLEAR" => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn is_deprecated(&self) -> bool {
        !matches!(self, Self::SaltedSha256)
    }
}

impl fmt::Display for PasswordScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

/// Split a stored value into its scheme and encoded part. Values without a
/// recognised `{SCHEME}` prefix are treated as clear text.
pub fn split_stored(stored: &str) -> (PasswordScheme, &str) {
    if let Some(rest) = stored.strip_prefix('{') {
        if let Some(end) = rest.find('}') {
            if let Some(scheme) = PasswordScheme::from_name(&rest[..end]) {
                return (scheme, &rest[end + 1..]);
            }
        }
    }
    (PasswordScheme::Clear, stored)
}

/// Whether a value is already encoded with a known scheme prefix.
pub fn is_encoded(value: &str) -> bool {
    value.starts_with('{')
        && value[1..]
            .find('}')
            .is_some_and(|end| PasswordScheme::from_name(&value[1..end + 1]).is_some())
}

/// Encode a clear-text password with the given scheme.
pub fn encode(password: &str, scheme: PasswordScheme) -> String {
    match scheme {
        PasswordScheme::SaltedSha256 => {
            let salt = new_salt();
            let mut bytes = digest(password.as_bytes(), &salt).to_vec();
            bytes.extend_from_slice(&salt);
            format!("{}{}", scheme, BASE64.encode(bytes))
        }
        PasswordScheme::Sha256 => {
            format!("{}{}", scheme, BASE64.encode(digest(password.as_bytes(), &[])))
        }
        PasswordScheme::Clear => format!("{}{}", scheme, password),
    }
}

/// Check a clear-text password against a stored value.
pub fn matches(password: &str, stored: &str) -> bool {
    let (scheme, encoded) = split_stored(stored);
    match scheme {
        PasswordScheme::Clear => constant_time_eq(password.as_bytes(), encoded.as_bytes()),
        PasswordScheme::Sha256 => match BASE64.decode(encoded) {
            Ok(expected) => constant_time_eq(&digest(password.as_bytes(), &[]), &expected),
            Err(_) => false,
        },
        PasswordScheme::SaltedSha256 => match BASE64.decode(encoded) {
            Ok(bytes) if bytes.len() > DIGEST_LENGTH => {
                let (expected, salt) = bytes.split_at(DIGEST_LENGTH);
                constant_time_eq(&digest(password.as_bytes(), salt), expected)
            }
            _ => false,
        },
    }
}

fn digest(password: &[u8], salt: &[u8]) -> [u8; DIGEST_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Salt bytes come from a digest of a whole v4 UUID, so the fixed version
/// and variant bits are spread over every byte.
fn new_salt() -> [u8; SALT_LENGTH] {
    let random = uuid::Uuid::new_v4();
    let mut salt = [0u8; SALT_LENGTH];
    salt.copy_from_slice(&Sha256::digest(random.as_bytes())[..SALT_LENGTH]);
    salt
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
