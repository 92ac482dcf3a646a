//! The two AES packet engines negotiated during the encryption handshake
//! (spec §4.2), ported byte-for-byte from `original_source/Sources/OpenSSL/
//! {AESBase,AESHMAC}.cpp`.
//!
//! Both modes share the same outer shape: a 16-byte IV is AES-256-ECB
//! encrypted with no padding and prepended to the AES-256-CBC (PKCS7)
//! encryption of the plaintext. They differ only in how the IV is chosen:
//! plain mode uses 16 random bytes; HMAC mode derives the IV from an
//! HMAC-SHA1 of the plaintext so the receiver can detect tampering before
//! trusting the decrypted bytes.

use aes::Aes256;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use thiserror::Error;

type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha1 = Hmac<Sha1>;

pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
/// Bytes of the key actually used to key the HMAC (`AESHMAC.cpp`: "we can
/// safely use the first 16 bytes").
const HMAC_KEY_LEN: usize = 16;
const HMAC_RANDOM_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext is shorter than one AES block")]
    ShortCiphertext,
    #[error("AES padding was invalid")]
    Padding,
    #[error("HMAC integrity check on the decrypted IV failed")]
    HmacMismatch,
}

fn ecb_encrypt_iv(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> [u8; IV_LEN] {
    let cipher = Aes256EcbEnc::new(key.into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(iv);
    ciphertext.try_into().expect("one block in, one block out")
}

fn ecb_decrypt_iv(key: &[u8; KEY_LEN], block: &[u8]) -> Result<[u8; IV_LEN], CryptoError> {
    let cipher = Aes256EcbDec::new(key.into());
    let plain = cipher
        .decrypt_padded_vec_mut::<NoPadding>(block)
        .map_err(|_| CryptoError::Padding)?;
    plain.try_into().map_err(|_| CryptoError::ShortCiphertext)
}

fn cbc_encrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

fn cbc_decrypt(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcDec::new(key.into(), iv.into());
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}

/// Either AES packet engine negotiated at the end of the handshake.
pub enum Engine {
    Plain(PlainAes),
    Hmac(HmacAes),
}

impl Engine {
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        match self {
            Engine::Plain(e) => e.encrypt(plaintext),
            Engine::Hmac(e) => e.encrypt(plaintext),
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Engine::Plain(e) => e.decrypt(ciphertext),
            Engine::Hmac(e) => e.decrypt(ciphertext),
        }
    }
}

/// Random-IV AES-256, used when the server's `ChannelEncryptRequest` carried
/// no random challenge.
pub struct PlainAes {
    key: [u8; KEY_LEN],
}

impl PlainAes {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let mut out = ecb_encrypt_iv(&self.key, &iv).to_vec();
        out.extend(cbc_encrypt(&self.key, &iv, plaintext));
        out
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < IV_LEN {
            return Err(CryptoError::ShortCiphertext);
        }
        let iv = ecb_decrypt_iv(&self.key, &ciphertext[..IV_LEN])?;
        cbc_decrypt(&self.key, &iv, &ciphertext[IV_LEN..])
    }
}

/// HMAC-SHA1-derived-IV AES-256, used when the server's
/// `ChannelEncryptRequest` carried a random challenge. The IV is derived
/// from the plaintext itself so the receiver can reject a tampered or
/// mis-keyed packet instead of silently decrypting garbage.
pub struct HmacAes {
    key: [u8; KEY_LEN],
}

impl HmacAes {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    fn make_iv(&self, plaintext: &[u8]) -> [u8; IV_LEN] {
        let mut random = [0u8; HMAC_RANDOM_LEN];
        rand::thread_rng().fill_bytes(&mut random);
        self.derive_iv(&random, plaintext)
    }

    fn derive_iv(&self, random: &[u8; HMAC_RANDOM_LEN], plaintext: &[u8]) -> [u8; IV_LEN] {
        let mut mac = HmacSha1::new_from_slice(&self.key[..HMAC_KEY_LEN])
            .expect("hmac accepts any key length");
        mac.update(random);
        mac.update(plaintext);
        let hash = mac.finalize().into_bytes();

        let mut iv = [0u8; IV_LEN];
        iv[..13].copy_from_slice(&hash[..13]);
        iv[13..].copy_from_slice(random);
        iv
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let iv = self.make_iv(plaintext);
        let mut out = ecb_encrypt_iv(&self.key, &iv).to_vec();
        out.extend(cbc_encrypt(&self.key, &iv, plaintext));
        out
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < IV_LEN {
            return Err(CryptoError::ShortCiphertext);
        }
        let iv = ecb_decrypt_iv(&self.key, &ciphertext[..IV_LEN])?;
        let plaintext = cbc_decrypt(&self.key, &iv, &ciphertext[IV_LEN..])?;

        let random: [u8; HMAC_RANDOM_LEN] = iv[13..].try_into().expect("iv is 16 bytes");
        let expected = self.derive_iv(&random, &plaintext);
        if expected[..13] != iv[..13] {
            return Err(CryptoError::HmacMismatch);
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn plain_aes_round_trips() {
        let engine = PlainAes::new(key());
        let plaintext = b"a Steam client-to-server packet of arbitrary length";
        let ciphertext = engine.encrypt(plaintext);
        assert_eq!(engine.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn plain_aes_uses_fresh_iv_each_call() {
        let engine = PlainAes::new(key());
        let a = engine.encrypt(b"same plaintext");
        let b = engine.encrypt(b"same plaintext");
        assert_ne!(a, b);
    }

    #[test]
    fn hmac_aes_round_trips() {
        let engine = HmacAes::new(key());
        let plaintext = b"another packet body";
        let ciphertext = engine.encrypt(plaintext);
        assert_eq!(engine.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn hmac_aes_detects_wrong_key() {
        let sender = HmacAes::new(key());
        let receiver = HmacAes::new(key());
        let ciphertext = sender.encrypt(b"packet body");
        assert!(matches!(
            receiver.decrypt(&ciphertext),
            Err(CryptoError::HmacMismatch) | Err(CryptoError::Padding)
        ));
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let engine = PlainAes::new(key());
        assert!(matches!(engine.decrypt(&[0u8; 4]), Err(CryptoError::ShortCiphertext)));
    }
}
