//! Salted envelope armoring
//!
//! The armored format is the OpenSSL "salted" layout, base64 encoded with the
//! standard alphabet and padding:
//! - magic: `Salted__` (8 bytes)
//! - salt: 8 bytes
//! - cipher body: variable length
//!
//! Every armored string therefore starts with `U2FsdGVkX1`. Armored text may
//! be folded onto several `\r\n`-separated lines for editor readability;
//! [`unwrap`] removes line breaks before decoding.

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use base64::{Engine, engine::general_purpose::STANDARD};

/// Length of the salt in bytes
pub const SALT_LEN: usize = 8;

/// Magic marker preceding the salt
const MAGIC: &[u8; 8] = b"Salted__";

/// Separator used when folding armored text
const LINE_BREAK: &str = "\r\n";

/// Decoded envelope contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub salt: [u8; SALT_LEN],
    pub body: Vec<u8>,
}

/// Wrap a salt and cipher body in armor, returning the armored string
pub fn wrap(salt: &[u8; SALT_LEN], body: &[u8]) -> String {
    let mut raw = Vec::with_capacity(MAGIC.len() + SALT_LEN + body.len());
    raw.extend_from_slice(MAGIC);
    raw.extend_from_slice(salt);
    raw.extend_from_slice(body);
    STANDARD.encode(raw)
}

/// Unwrap an armored string, returning salt and cipher body
///
/// Line breaks and other ASCII whitespace are removed first, so folded
/// armor decodes the same as its single-line form.
pub fn unwrap(armored: &str) -> Result<Envelope> {
    let compact = normalize(armored);
    if compact.is_empty() {
        return Err(EnvSafeError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeInvalid,
            "ciphertext is empty",
        ));
    }

    let raw = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        EnvSafeError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::EnvelopeDecode,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })?;

    let Some(rest) = raw.strip_prefix(MAGIC.as_slice()) else {
        return Err(EnvSafeError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeInvalid,
            "input unrecognized as salted ciphertext",
        ));
    };
    if rest.len() < SALT_LEN {
        return Err(EnvSafeError::with_kind(
            ErrorCategory::User,
            ErrorKind::EnvelopeInvalid,
            "input likely truncated while reading salt",
        ));
    }

    let (salt, body) = rest.split_at(SALT_LEN);
    let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| {
        EnvSafeError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "salt slice has unexpected length",
        )
    })?;
    Ok(Envelope {
        salt,
        body: body.to_vec(),
    })
}

/// Remove line breaks (and any other ASCII whitespace) from armored text
pub fn normalize(armored: &str) -> String {
    armored
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect()
}

/// Fold armored text into lines of at most `column` characters joined by `\r\n`
///
/// A column of zero leaves the text on a single line.
pub fn fold(armored: &str, column: usize) -> String {
    if column == 0 {
        return armored.to_string();
    }
    let chars: Vec<char> = armored.chars().collect();
    chars
        .chunks(column)
        .map(|line| line.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}
