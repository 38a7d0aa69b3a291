//! Credential validation.
//!
//! Stored passwords are either plaintext or, when the system-wide `md5`
//! policy is on, lowercase hex MD5 digests (the legacy on-disk format).
//! Validation applies the same transform to the supplied password and
//! compares byte-exactly, case-sensitively.

use md5::{Digest, Md5};

/// Hash a password into the stored representation under the hash policy.
pub fn hash_password(password: &str) -> String {
    let digest = Md5::digest(password.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Check a supplied password against the stored one.
///
/// Rejects outright when no password is stored, none was supplied, or the
/// supplied password is empty; a hashed store never accepts its own
/// digest as plaintext input.
pub fn validate(stored: Option<&str>, supplied: Option<&str>, hash_policy: bool) -> bool {
    let (Some(stored), Some(supplied)) = (stored, supplied) else {
        return false;
    };
    if supplied.is_empty() {
        return false;
    }

    if hash_policy {
        hash_password(supplied) == stored
    } else {
        supplied == stored
    }
}
