//! Passphrase-based encryption compatible with the OpenSSL salted format
//!
//! Key and IV are derived from the passphrase and a random 8-byte salt with
//! the OpenSSL `EVP_BytesToKey` construction (MD5, one iteration). The
//! salt travels in the armored envelope (see [`crate::varmor`]); the
//! algorithm does not, so the caller must decrypt with the same
//! [`Algorithm`] it encrypted with.
//!
//! There is no authentication tag. Decrypting with the wrong passphrase or
//! algorithm produces garbage or empty text rather than an error; only a
//! malformed envelope is reported as a failure.

use crate::error::{EnvSafeError, ErrorCategory, ErrorKind, Result};
use crate::varmor::{self, SALT_LEN};
use cipher::block_padding::{NoPadding, Pkcs7};
use cipher::consts::U32;
use cipher::{
    BlockCipher, BlockDecryptMut, BlockEncryptMut, BlockSizeUser, KeyInit, KeyIvInit,
    StreamCipher,
};
use md5::{Digest, Md5};
use rc4::Rc4;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Keystream bytes discarded by [`Algorithm::Rc4Drop`] (192 words)
const RC4_DROP_LEN: usize = 768;

/// Cipher selector. The default is AES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Algorithm {
    /// AES-256 in CBC mode with PKCS#7 padding
    #[default]
    #[serde(rename = "AES")]
    #[value(name = "aes")]
    Aes,
    /// DES in CBC mode with PKCS#7 padding
    #[serde(rename = "DES")]
    #[value(name = "des")]
    Des,
    /// Rabbit stream cipher
    #[serde(rename = "Rabbit")]
    #[value(name = "rabbit")]
    Rabbit,
    /// RC4 stream cipher
    #[serde(rename = "RC4")]
    #[value(name = "rc4")]
    Rc4,
    /// RC4 with the initial keystream discarded
    #[serde(rename = "RC4Drop")]
    #[value(name = "rc4drop")]
    Rc4Drop,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Aes,
        Algorithm::Des,
        Algorithm::Rabbit,
        Algorithm::Rc4,
        Algorithm::Rc4Drop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Aes => "AES",
            Algorithm::Des => "DES",
            Algorithm::Rabbit => "Rabbit",
            Algorithm::Rc4 => "RC4",
            Algorithm::Rc4Drop => "RC4Drop",
        }
    }

    fn key_len(self) -> usize {
        match self {
            Algorithm::Aes | Algorithm::Rc4 | Algorithm::Rc4Drop => 32,
            Algorithm::Rabbit => 16,
            Algorithm::Des => 8,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            Algorithm::Aes => 16,
            Algorithm::Des | Algorithm::Rabbit => 8,
            Algorithm::Rc4 | Algorithm::Rc4Drop => 0,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Armored ciphertext, safe to persist as file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherText(String);

impl CipherText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The armored text folded at `column` characters with `\r\n` separators.
    pub fn folded(&self, column: usize) -> String {
        varmor::fold(&self.0, column)
    }
}

impl fmt::Display for CipherText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive `len` bytes of key material followed by IV (OpenSSL `EVP_BytesToKey`, MD5, 1 round)
fn derive_key_iv(passphrase: &[u8], salt: &[u8; SALT_LEN], len: usize) -> Zeroizing<Vec<u8>> {
    let mut derived = Zeroizing::new(Vec::with_capacity(len + 16));
    let mut block = Zeroizing::new(Vec::new());
    while derived.len() < len {
        let mut hasher = Md5::new();
        hasher.update(block.as_slice());
        hasher.update(passphrase);
        hasher.update(salt);
        block.clear();
        block.extend_from_slice(&hasher.finalize());
        derived.extend_from_slice(&block);
    }
    derived.truncate(len);
    derived
}

fn invalid_length(what: &str) -> EnvSafeError {
    EnvSafeError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        format!("derived {} has the wrong length for the cipher", what),
    )
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor =
        cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|_| invalid_length("key or iv"))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// CBC decryption that never fails on content: trailing partial blocks are
/// ignored and padding is stripped without validation.
fn cbc_decrypt<C>(key: &[u8], iv: &[u8], body: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor =
        cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| invalid_length("key or iv"))?;
    let whole = body.len() - body.len() % <C as BlockSizeUser>::block_size();
    let mut buf = body[..whole].to_vec();
    let plain_len = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| {
            EnvSafeError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                format!("block decryption failed: {}", e),
            )
        })?
        .len();
    buf.truncate(plain_len);
    strip_padding(&mut buf);
    Ok(buf)
}

/// PKCS#7 removal as done by the format's reference implementation: the last
/// byte says how much to drop, unchecked; an oversized count empties the buffer.
fn strip_padding(buf: &mut Vec<u8>) {
    let Some(&pad) = buf.last() else {
        return;
    };
    let len = buf.len().saturating_sub(usize::from(pad));
    buf.truncate(len);
}

fn apply_keystream(mut cipher: impl StreamCipher, skip: usize, data: &[u8]) -> Vec<u8> {
    if skip > 0 {
        let mut discard = vec![0u8; skip];
        cipher.apply_keystream(&mut discard);
    }
    let mut buf = data.to_vec();
    cipher.apply_keystream(&mut buf);
    buf
}

fn stream(algorithm: Algorithm, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::Rabbit => {
            let cipher =
                rabbit::Rabbit::new_from_slices(key, iv).map_err(|_| invalid_length("key or iv"))?;
            Ok(apply_keystream(cipher, 0, data))
        }
        Algorithm::Rc4 | Algorithm::Rc4Drop => {
            let cipher = Rc4::<U32>::new_from_slice(key).map_err(|_| invalid_length("key"))?;
            let skip = if algorithm == Algorithm::Rc4Drop {
                RC4_DROP_LEN
            } else {
                0
            };
            Ok(apply_keystream(cipher, skip, data))
        }
        Algorithm::Aes | Algorithm::Des => Err(EnvSafeError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("{} is not a stream cipher", algorithm),
        )),
    }
}

/// Encrypt plaintext with a passphrase using a random salt
pub fn encrypt(passphrase: &str, plaintext: &str, algorithm: Algorithm) -> Result<CipherText> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::fill(&mut salt).map_err(|e| {
        EnvSafeError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("failed to generate salt: {}", e),
        )
    })?;

    encrypt_with_salt(passphrase, plaintext, algorithm, &salt)
}

/// Encrypt plaintext with a passphrase using the provided salt
///
/// Produces deterministic output, which is what known-answer tests need.
/// Use [`encrypt`] for anything persisted.
pub fn encrypt_with_salt(
    passphrase: &str,
    plaintext: &str,
    algorithm: Algorithm,
    salt: &[u8; SALT_LEN],
) -> Result<CipherText> {
    let key_len = algorithm.key_len();
    let material = derive_key_iv(passphrase.as_bytes(), salt, key_len + algorithm.iv_len());
    let (key, iv) = material.split_at(key_len);

    let body = match algorithm {
        Algorithm::Aes => cbc_encrypt::<aes::Aes256>(key, iv, plaintext.as_bytes())?,
        Algorithm::Des => cbc_encrypt::<des::Des>(key, iv, plaintext.as_bytes())?,
        Algorithm::Rabbit | Algorithm::Rc4 | Algorithm::Rc4Drop => {
            stream(algorithm, key, iv, plaintext.as_bytes())?
        }
    };

    Ok(CipherText(varmor::wrap(salt, &body)))
}

/// Decrypt armored ciphertext with a passphrase
///
/// Line breaks inside `ciphertext` are ignored. A wrong passphrase or
/// algorithm is not detected; the returned text is then meaningless.
pub fn decrypt(passphrase: &str, ciphertext: &str, algorithm: Algorithm) -> Result<String> {
    let envelope = varmor::unwrap(ciphertext)?;
    let key_len = algorithm.key_len();
    let material = derive_key_iv(
        passphrase.as_bytes(),
        &envelope.salt,
        key_len + algorithm.iv_len(),
    );
    let (key, iv) = material.split_at(key_len);

    let plain = Zeroizing::new(match algorithm {
        Algorithm::Aes => cbc_decrypt::<aes::Aes256>(key, iv, &envelope.body)?,
        Algorithm::Des => cbc_decrypt::<des::Des>(key, iv, &envelope.body)?,
        Algorithm::Rabbit | Algorithm::Rc4 | Algorithm::Rc4Drop => {
            stream(algorithm, key, iv, &envelope.body)?
        }
    });

    Ok(String::from_utf8_lossy(&plain).into_owned())
}
