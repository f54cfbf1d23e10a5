//! Encryption stage: password-based sealing of artifacts
//!
//! Wraps a compressed artifact in authenticated encryption so it can sit on
//! an untrusted remote store. The key is derived from the configured
//! password with PBKDF2-HMAC-SHA256 and a fresh 16-byte salt drawn per file
//! per run; salts are never reused, so encrypting the same artifact twice
//! yields different ciphertexts.
//!
//! ## Ciphertext layout
//!
//! ```text
//! [salt: 16 bytes]
//! [frame length: u32 big-endian] [nonce: 12 bytes || ciphertext + tag]
//! [frame length: u32 big-endian] [nonce: 12 bytes || ciphertext + tag]
//! ...
//! ```
//!
//! Plaintext is processed in 64 KiB frames, each sealed independently with
//! AES-256-GCM under a fresh random nonce. The explicit length prefix
//! delimits frames on the way back; the same framing is applied by both
//! directions. The iteration count and hash are fixed system-wide, so only
//! the salt travels with the ciphertext.
//!
//! Tampering with any frame, truncating the stream or supplying the wrong
//! password surfaces as an [`OffsiteError::Encryption`]; decryption never
//! silently returns altered bytes.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::{debug, info};

use crate::error::{OffsiteError, Result};
use crate::utils::{path_with_suffix, strip_path_suffix};

/// Suffix appended to encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// PBKDF2 iteration count, fixed system-wide
///
/// Identical on both directions; changing it invalidates every existing
/// ciphertext, so treat it as part of the on-disk format.
pub const PBKDF2_ITERATIONS: u32 = 390_000;

/// Key-derivation salt length in bytes.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Plaintext bytes sealed per frame.
const CHUNK_SIZE: usize = 64 * 1024;

/// Largest frame the decryptor will accept.
const MAX_FRAME_LEN: usize = CHUNK_SIZE + NONCE_LEN + TAG_LEN;

/// Derive the 256-bit sealing key from the password and salt
fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt an artifact file, producing `path + ".enc"`
///
/// The source artifact is left in place; the pipeline discards it separately
/// once the ciphertext has been uploaded. A partially written output file is
/// removed before any error propagates.
///
/// # Errors
///
/// Returns [`OffsiteError::Encryption`] for any failure in the transform:
/// opening either file, reading the plaintext, sealing, or writing the
/// ciphertext.
pub fn encrypt_file(path: &Path, password: &str) -> Result<PathBuf> {
    let out_path = path_with_suffix(path, ENCRYPTED_SUFFIX);
    if let Err(e) = encrypt_into(path, &out_path, password) {
        let _ = fs::remove_file(&out_path);
        return Err(e);
    }
    info!("Encrypted {:?} -> {:?}", path, out_path);
    Ok(out_path)
}

fn encrypt_into(path: &Path, out_path: &Path, password: &str) -> Result<()> {
    let source = File::open(path)
        .map_err(|e| OffsiteError::encryption(format!("cannot open {:?}: {}", path, e)))?;
    let target = File::create(out_path)
        .map_err(|e| OffsiteError::encryption(format!("cannot create {:?}: {}", out_path, e)))?;
    let mut reader = BufReader::new(source);
    let mut writer = BufWriter::new(target);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    write_stream(&mut writer, &salt)?;

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| OffsiteError::encryption(format!("cannot create cipher: {}", e)))?;
    debug!(
        "Derived sealing key ({} PBKDF2 iterations)",
        PBKDF2_ITERATIONS
    );

    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_stream(&mut reader, &mut buffer)?;
        if n == 0 {
            break;
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, &buffer[..n])
            .map_err(|_| OffsiteError::encryption("sealing failed"))?;

        let frame_len = (NONCE_LEN + sealed.len()) as u32;
        write_stream(&mut writer, &frame_len.to_be_bytes())?;
        write_stream(&mut writer, &nonce_bytes)?;
        write_stream(&mut writer, &sealed)?;
    }

    writer
        .flush()
        .map_err(|e| OffsiteError::encryption(format!("cannot write ciphertext: {}", e)))?;
    Ok(())
}

/// Decrypt an encrypted artifact, producing the path with `.enc` stripped
///
/// Reads the 16-byte salt, re-derives the key and unseals the
/// length-prefixed frames in order. A partially written output file is
/// removed before any error propagates.
///
/// # Errors
///
/// Returns [`OffsiteError::Encryption`] for a wrong password, a tampered or
/// truncated frame, trailing garbage, a missing `.enc` suffix or any I/O
/// failure in the transform.
pub fn decrypt_file(path: &Path, password: &str) -> Result<PathBuf> {
    let out_path = strip_path_suffix(path, ENCRYPTED_SUFFIX).ok_or_else(|| {
        OffsiteError::encryption(format!("{:?} does not carry the .enc suffix", path))
    })?;
    if let Err(e) = decrypt_into(path, &out_path, password) {
        let _ = fs::remove_file(&out_path);
        return Err(e);
    }
    info!("Decrypted {:?} -> {:?}", path, out_path);
    Ok(out_path)
}

fn decrypt_into(path: &Path, out_path: &Path, password: &str) -> Result<()> {
    let source = File::open(path)
        .map_err(|e| OffsiteError::encryption(format!("cannot open {:?}: {}", path, e)))?;
    let target = File::create(out_path)
        .map_err(|e| OffsiteError::encryption(format!("cannot create {:?}: {}", out_path, e)))?;
    let mut reader = BufReader::new(source);
    let mut writer = BufWriter::new(target);

    let mut salt = [0u8; SALT_LEN];
    if read_stream(&mut reader, &mut salt)? != SALT_LEN {
        return Err(OffsiteError::encryption("ciphertext truncated before salt"));
    }

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| OffsiteError::encryption(format!("cannot create cipher: {}", e)))?;

    let mut frame = vec![0u8; MAX_FRAME_LEN];
    loop {
        let mut len_bytes = [0u8; 4];
        match read_stream(&mut reader, &mut len_bytes)? {
            0 => break,
            4 => {}
            _ => return Err(OffsiteError::encryption("truncated frame length")),
        }

        let frame_len = u32::from_be_bytes(len_bytes) as usize;
        if frame_len < NONCE_LEN + TAG_LEN || frame_len > MAX_FRAME_LEN {
            return Err(OffsiteError::encryption(format!(
                "corrupted frame length {}",
                frame_len
            )));
        }

        if read_stream(&mut reader, &mut frame[..frame_len])? != frame_len {
            return Err(OffsiteError::encryption("truncated frame"));
        }

        let (nonce_bytes, sealed) = frame[..frame_len].split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, sealed)
            .map_err(|_| OffsiteError::encryption("wrong password or corrupted data"))?;
        write_stream(&mut writer, &plaintext)?;
    }

    writer
        .flush()
        .map_err(|e| OffsiteError::encryption(format!("cannot write plaintext: {}", e)))?;
    Ok(())
}

// I/O failures inside the transforms surface as encryption errors; the
// pipeline's post-failure cleanup dispatches on the error kind.

fn write_stream<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer
        .write_all(bytes)
        .map_err(|e| OffsiteError::encryption(format!("cannot write output: {}", e)))
}

/// Read until the buffer is full or the stream ends, returning bytes read
fn read_stream<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .map_err(|e| OffsiteError::encryption(format!("cannot read input: {}", e)))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
