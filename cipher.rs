//! AES-256-CBC cipher stages for the streaming pipeline.
//!
//! [`CipherContext`] holds the process-wide key and IV, validated eagerly at
//! construction, and hands out the encrypt/decrypt [`Transform`] stages used
//! by ingestion and retrieval. The stages process block-aligned prefixes as
//! chunks arrive and hold back at most two blocks of tail between calls, so
//! memory stays bounded regardless of file size.
//!
//! ## Fixed IV
//!
//! Every file is encrypted under the same key and IV, so identical plaintexts
//! produce identical ciphertexts. This reproduces the documented behavior of
//! the stored data; `CipherContext` is the single seam to swap in a per-file
//! IV without touching the pipeline code.

use crate::error::VaultFsError;
use crate::pipeline::Transform;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Block;
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;
/// IV length in bytes (one AES block)
pub const IV_LEN: usize = 16;
/// AES block length in bytes
pub const BLOCK_LEN: usize = 16;

/// Process-wide symmetric cipher parameters.
///
/// Constructed once at startup and passed by reference into every pipeline
/// invocation; immutable for the process lifetime. Key material is zeroized
/// on drop.
#[derive(Debug)]
pub struct CipherContext {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl Drop for CipherContext {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl CipherContext {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Decode and validate hex-encoded key and IV.
    ///
    /// Wrong lengths or invalid hex are configuration errors: the caller is
    /// expected to treat them as fatal and refuse to start.
    pub fn from_hex(key_hex: &str, iv_hex: &str) -> Result<Self, VaultFsError> {
        let key_bytes = hex::decode(key_hex.trim())
            .map_err(|e| VaultFsError::config(format!("encryption key is not valid hex: {e}")))?;
        if key_bytes.len() != KEY_LEN {
            return Err(VaultFsError::config(format!(
                "expected {}-byte encryption key but found {} bytes",
                KEY_LEN,
                key_bytes.len()
            )));
        }

        let iv_bytes = hex::decode(iv_hex.trim())
            .map_err(|e| VaultFsError::config(format!("IV is not valid hex: {e}")))?;
        if iv_bytes.len() != IV_LEN {
            return Err(VaultFsError::config(format!(
                "expected {}-byte IV but found {} bytes",
                IV_LEN,
                iv_bytes.len()
            )));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&key_bytes);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&iv_bytes);
        Ok(Self::new(key, iv))
    }

    /// Fresh encrypt-direction stage for one pipeline run
    pub fn encrypt_stage(&self) -> EncryptStage {
        // This is safe because key and iv lengths are fixed by construction
        let enc = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .expect("BUG: key and IV lengths are validated at construction");
        EncryptStage {
            enc: Some(enc),
            pending: Vec::with_capacity(BLOCK_LEN),
        }
    }

    /// Fresh decrypt-direction stage for one pipeline run
    pub fn decrypt_stage(&self) -> DecryptStage {
        let dec = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .expect("BUG: key and IV lengths are validated at construction");
        DecryptStage {
            dec: Some(dec),
            pending: Vec::with_capacity(2 * BLOCK_LEN),
        }
    }
}

/// CBC encryption stage: plaintext chunks in, ciphertext chunks out.
///
/// Carries less than one block of unaligned plaintext between chunks; the
/// PKCS#7-padded final block is emitted by `finish`.
pub struct EncryptStage {
    enc: Option<Aes256CbcEnc>,
    pending: Vec<u8>,
}

impl Transform for EncryptStage {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), VaultFsError> {
        let enc = self
            .enc
            .as_mut()
            .ok_or_else(|| VaultFsError::cipher("encrypt stage already finished"))?;

        self.pending.extend_from_slice(input);
        let full = self.pending.len() - self.pending.len() % BLOCK_LEN;
        if full == 0 {
            return Ok(());
        }

        // Encrypt the block-aligned prefix in place in the output buffer
        let start = out.len();
        out.extend_from_slice(&self.pending[..full]);
        for block in out[start..].chunks_exact_mut(BLOCK_LEN) {
            enc.encrypt_block_mut(Block::from_mut_slice(block));
        }
        self.pending.drain(..full);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), VaultFsError> {
        let enc = self
            .enc
            .take()
            .ok_or_else(|| VaultFsError::cipher("encrypt stage already finished"))?;

        // Pad the remaining tail (possibly empty) into exactly one block
        let mut last = [0u8; BLOCK_LEN];
        let n = self.pending.len();
        last[..n].copy_from_slice(&self.pending);
        let padded = enc
            .encrypt_padded_mut::<Pkcs7>(&mut last, n)
            .map_err(|_| VaultFsError::cipher("final block does not fit the padding buffer"))?;
        out.extend_from_slice(padded);

        self.pending.zeroize();
        self.pending.clear();
        Ok(())
    }
}

/// CBC decryption stage: ciphertext chunks in, plaintext chunks out.
///
/// Holds back the final candidate block (plus any unaligned tail) so padding
/// is only stripped, and validated, at end-of-stream. Empty, misaligned, or
/// mispadded ciphertext fails with a cipher error rather than yielding
/// truncated or garbage plaintext.
pub struct DecryptStage {
    dec: Option<Aes256CbcDec>,
    pending: Vec<u8>,
}

impl Transform for DecryptStage {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), VaultFsError> {
        let dec = self
            .dec
            .as_mut()
            .ok_or_else(|| VaultFsError::cipher("decrypt stage already finished"))?;

        self.pending.extend_from_slice(input);

        // Always retain the last complete block plus any partial tail for finish
        let keep = BLOCK_LEN + self.pending.len() % BLOCK_LEN;
        if self.pending.len() <= keep {
            return Ok(());
        }
        let full = self.pending.len() - keep;

        let start = out.len();
        out.extend_from_slice(&self.pending[..full]);
        for block in out[start..].chunks_exact_mut(BLOCK_LEN) {
            dec.decrypt_block_mut(Block::from_mut_slice(block));
        }
        self.pending.drain(..full);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), VaultFsError> {
        let dec = self
            .dec
            .take()
            .ok_or_else(|| VaultFsError::cipher("decrypt stage already finished"))?;

        if self.pending.is_empty() {
            return Err(VaultFsError::cipher("ciphertext is empty"));
        }
        if self.pending.len() != BLOCK_LEN {
            return Err(VaultFsError::cipher(format!(
                "ciphertext length is not a multiple of the {BLOCK_LEN}-byte block size"
            )));
        }

        let mut last = [0u8; BLOCK_LEN];
        last.copy_from_slice(&self.pending);
        let plaintext = dec
            .decrypt_padded_mut::<Pkcs7>(&mut last)
            .map_err(|_| VaultFsError::cipher("invalid padding in final ciphertext block"))?;
        out.extend_from_slice(plaintext);

        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_context() -> CipherContext {
        CipherContext::new([0x42u8; KEY_LEN], [0x24u8; IV_LEN])
    }

    /// Run a whole buffer through a stage in a few uneven chunks.
    fn run_stage(stage: &mut dyn Transform, input: &[u8]) -> Result<Vec<u8>, VaultFsError> {
        let mut out = Vec::new();
        for chunk in input.chunks(7 * 1024 + 3) {
            stage.update(chunk, &mut out)?;
        }
        stage.finish(&mut out)?;
        Ok(out)
    }

    fn encrypt_all(ctx: &CipherContext, plaintext: &[u8]) -> Vec<u8> {
        run_stage(&mut ctx.encrypt_stage(), plaintext).expect("encryption failed")
    }

    fn decrypt_all(ctx: &CipherContext, ciphertext: &[u8]) -> Result<Vec<u8>, VaultFsError> {
        run_stage(&mut ctx.decrypt_stage(), ciphertext)
    }

    #[test]
    fn round_trip_boundary_sizes() {
        let ctx = make_context();
        for size in [0usize, 1, BLOCK_LEN - 1, BLOCK_LEN, BLOCK_LEN + 1, 3 * 1024 * 1024] {
            let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let ciphertext = encrypt_all(&ctx, &plaintext);

            // PKCS#7 always appends padding: size rounds up to the next block
            // boundary, plus a full block when already aligned
            let expected_ct = (size / BLOCK_LEN + 1) * BLOCK_LEN;
            assert_eq!(ciphertext.len(), expected_ct, "size {size}");

            let decrypted = decrypt_all(&ctx, &ciphertext).expect("decryption failed");
            assert_eq!(decrypted, plaintext, "size {size}");
        }
    }

    #[test]
    fn encryption_is_deterministic() {
        // Fixed key and IV: identical plaintext yields identical ciphertext
        let ctx = make_context();
        let plaintext = vec![0x5au8; 1000];
        assert_eq!(encrypt_all(&ctx, &plaintext), encrypt_all(&ctx, &plaintext));
    }

    #[test]
    fn chunking_does_not_change_ciphertext() {
        let ctx = make_context();
        let plaintext: Vec<u8> = (0..100_000).map(|i| (i % 256) as u8).collect();

        let mut one_shot = Vec::new();
        let mut stage = ctx.encrypt_stage();
        stage.update(&plaintext, &mut one_shot).unwrap();
        stage.finish(&mut one_shot).unwrap();

        let mut byte_at_a_time = Vec::new();
        let mut stage = ctx.encrypt_stage();
        for b in &plaintext[..100] {
            stage.update(std::slice::from_ref(b), &mut byte_at_a_time).unwrap();
        }
        stage.update(&plaintext[100..], &mut byte_at_a_time).unwrap();
        stage.finish(&mut byte_at_a_time).unwrap();

        assert_eq!(one_shot, byte_at_a_time);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let ctx = make_context();
        // 20 bytes: the final block carries 12 bytes of padding, so a flip in
        // the first (non-final) ciphertext block lands in the padding region
        // of the decrypted final block and must be rejected
        let plaintext = vec![0x11u8; 20];
        let mut ciphertext = encrypt_all(&ctx, &plaintext);
        assert_eq!(ciphertext.len(), 2 * BLOCK_LEN);

        ciphertext[10] ^= 0x01;
        let err = decrypt_all(&ctx, &ciphertext).expect_err("tampered ciphertext must fail");
        assert!(matches!(err, VaultFsError::Cipher(_)));
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let ctx = make_context();
        let ciphertext = encrypt_all(&ctx, &vec![0x22u8; 100]);

        // Drop one byte: no longer block-aligned
        let err = decrypt_all(&ctx, &ciphertext[..ciphertext.len() - 1])
            .expect_err("misaligned ciphertext must fail");
        assert!(matches!(err, VaultFsError::Cipher(_)));

        // Drop the whole final block: padding of the new last block is invalid
        // for this plaintext (all 0x22, not a valid pad)
        let err = decrypt_all(&ctx, &ciphertext[..ciphertext.len() - BLOCK_LEN])
            .expect_err("truncated ciphertext must fail");
        assert!(matches!(err, VaultFsError::Cipher(_)));
    }

    #[test]
    fn empty_ciphertext_fails() {
        let ctx = make_context();
        let err = decrypt_all(&ctx, b"").expect_err("empty ciphertext must fail");
        assert!(matches!(err, VaultFsError::Cipher(_)));
    }

    #[test]
    fn wrong_key_fails() {
        let ctx = make_context();
        let ciphertext = encrypt_all(&ctx, b"only the right key opens this");

        let other = CipherContext::new([0x43u8; KEY_LEN], [0x24u8; IV_LEN]);
        let err = decrypt_all(&other, &ciphertext).expect_err("wrong key must fail");
        assert!(matches!(err, VaultFsError::Cipher(_)));
    }

    #[test]
    fn from_hex_validates_lengths() {
        let key_hex = "42".repeat(KEY_LEN);
        let iv_hex = "24".repeat(IV_LEN);
        assert!(CipherContext::from_hex(&key_hex, &iv_hex).is_ok());

        let err = CipherContext::from_hex(&"42".repeat(KEY_LEN - 1), &iv_hex)
            .expect_err("short key must be rejected");
        assert!(matches!(err, VaultFsError::Config(_)));

        let err = CipherContext::from_hex(&key_hex, &"24".repeat(IV_LEN + 1))
            .expect_err("long IV must be rejected");
        assert!(matches!(err, VaultFsError::Config(_)));

        let err = CipherContext::from_hex("not-hex", &iv_hex).expect_err("bad hex rejected");
        assert!(matches!(err, VaultFsError::Config(_)));
    }
}
