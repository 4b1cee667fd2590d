//! Chromium cookie value decryption (`v10`/`v11` AES-128-CBC).

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const SALT: &[u8] = b"saltysalt";
const IV: [u8; 16] = [b' '; 16];

/// Password Chromium falls back to on Linux when no keyring is available.
#[cfg_attr(target_os = "macos", allow(dead_code))]
pub const LINUX_FALLBACK_PASSWORD: &str = "peanuts";

/// PBKDF2 iterations used by Chromium on this platform.
#[cfg(target_os = "macos")]
pub const ITERATIONS: u32 = 1003;
#[cfg(not(target_os = "macos"))]
pub const ITERATIONS: u32 = 1;

/// Length in bytes of the SHA-256 host digest prepended to values by newer databases.
pub const HOST_DIGEST_LEN: usize = 32;

/// Database `meta.version` from which values carry the host digest prefix.
pub const HOST_DIGEST_MIN_VERSION: i64 = 24;

/// Encryption scheme marker at the start of an `encrypted_value` blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Fixed or keychain password.
    V10,
    /// Password from the desktop keyring (Linux).
    V11,
}

impl Scheme {
    /// Split the scheme marker off an encrypted blob.
    pub fn split(blob: &[u8]) -> Option<(Scheme, &[u8])> {
        if let Some(rest) = blob.strip_prefix(b"v10") {
            Some((Scheme::V10, rest))
        } else if let Some(rest) = blob.strip_prefix(b"v11") {
            Some((Scheme::V11, rest))
        } else {
            None
        }
    }
}

/// Derive the AES key from a safe-storage password.
pub fn derive_key(password: &[u8], iterations: u32) -> [u8; 16] {
    let mut key = [0u8; 16];
    pbkdf2_hmac::<Sha1>(password, SALT, iterations, &mut key);
    key
}

/// Decrypt a value with the scheme marker already removed.
///
/// # Errors
/// Returns a description of the failure when the padding or length is invalid.
pub fn decrypt(key: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, String> {
    let cipher = Aes128CbcDec::new_from_slices(key, &IV).map_err(|e| e.to_string())?;
    cipher.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).map_err(|e| format!("bad padding ({})", e))
}

#[cfg(test)]
pub(crate) fn encrypt(key: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;

    cbc::Encryptor::<Aes128>::new_from_slices(key, &IV).unwrap().encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}
