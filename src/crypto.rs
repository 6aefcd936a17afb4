//! `CryptoPrimitives` (spec §4.2). Thin wrappers around `openssl` — the
//! crate the teacher already vendors for its EC key math. All primitive
//! failures collapse into `CryptoError`; callers translate to an `ErrCode`.

use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::symm::{Cipher, Crypter, Mode};

#[derive(Debug, thiserror::Error)]
#[error("crypto primitive failed")]
pub struct CryptoError;

impl From<openssl::error::ErrorStack> for CryptoError {
    fn from(_: openssl::error::ErrorStack) -> Self {
        CryptoError
    }
}

/// An RSA keypair generated for a single KMS round trip; dropped at the end
/// of the handler activation that created it (spec §3 "Lifecycles").
pub struct RsaKeyPair {
    key: PKey<Private>,
}

impl RsaKeyPair {
    pub fn generate(bits: u32) -> Result<Self, CryptoError> {
        let rsa = Rsa::generate(bits)?;
        let key = PKey::from_rsa(rsa)?;
        Ok(RsaKeyPair { key })
    }

    /// DER-encoded SubjectPublicKeyInfo, the form NSM's `public_key` field
    /// and the KMS `Recipient.AttestationDocument` both want.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.key.public_key_to_der()?)
    }

    pub fn oaep_sha256_decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let rsa = self.key.rsa()?;
        let mut buf = vec![0u8; rsa.size() as usize];
        let len = rsa.private_decrypt(ciphertext, &mut buf, Padding::PKCS1_OAEP)?;
        buf.truncate(len);
        Ok(buf)
    }
}

pub fn rsa_oaep_sha256_decrypt(
    private_key_der: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let rsa = Rsa::private_key_from_der(private_key_der)?;
    let mut buf = vec![0u8; rsa.size() as usize];
    let len = rsa.private_decrypt(ciphertext, &mut buf, Padding::PKCS1_OAEP)?;
    buf.truncate(len);
    Ok(buf)
}

fn aes_cipher_for_key_len(key_len: usize) -> Result<Cipher, CryptoError> {
    match key_len {
        16 => Ok(Cipher::aes_128_cbc()),
        24 => Ok(Cipher::aes_192_cbc()),
        32 => Ok(Cipher::aes_256_cbc()),
        _ => Err(CryptoError),
    }
}

pub fn aes_cbc_pkcs7_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != 16 {
        return Err(CryptoError);
    }
    let cipher = aes_cipher_for_key_len(key.len())?;
    let mut crypter = Crypter::new(cipher, Mode::Encrypt, key, Some(iv))?;
    let mut out = vec![0u8; data.len() + cipher.block_size()];
    let mut count = crypter.update(data, &mut out)?;
    count += crypter.finalize(&mut out[count..])?;
    out.truncate(count);
    Ok(out)
}

pub fn aes_cbc_pkcs7_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != 16 {
        return Err(CryptoError);
    }
    let cipher = aes_cipher_for_key_len(key.len())?;
    let mut crypter = Crypter::new(cipher, Mode::Decrypt, key, Some(iv))?;
    let mut out = vec![0u8; data.len() + cipher.block_size()];
    let mut count = crypter.update(data, &mut out)?;
    count += crypter.finalize(&mut out[count..])?;
    out.truncate(count);
    Ok(out)
}

pub fn sha256(data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let digest = hash(MessageDigest::sha256(), data)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(out)
}

pub fn sha256_hex(data: &[u8]) -> Result<String, CryptoError> {
    Ok(hex::encode(sha256(data)?))
}

pub fn rand_bytes(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; n];
    openssl::rand::rand_bytes(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_round_trip() {
        let key = rand_bytes(32).unwrap();
        let iv = rand_bytes(16).unwrap();
        for len in [0usize, 1, 15, 16, 17, 1000] {
            let data = rand_bytes(len).unwrap();
            let ct = aes_cbc_pkcs7_encrypt(&key, &iv, &data).unwrap();
            let pt = aes_cbc_pkcs7_decrypt(&key, &iv, &ct).unwrap();
            assert_eq!(pt, data);
        }
    }

    #[test]
    fn rsa_oaep_round_trip() {
        let pair = RsaKeyPair::generate(2048).unwrap();
        let der = pair.public_key_der().unwrap();
        let pub_rsa = Rsa::public_key_from_der(&der).unwrap();
        let mut ct = vec![0u8; pub_rsa.size() as usize];
        let msg = b"hello enclave";
        let ct_len = pub_rsa
            .public_encrypt(msg, &mut ct, Padding::PKCS1_OAEP)
            .unwrap();
        ct.truncate(ct_len);
        let pt = pair.oaep_sha256_decrypt(&ct).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn sha256_matches_known_vector() {
        let got = sha256_hex(b"").unwrap();
        assert_eq!(
            got,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"[..64]
        );
    }
}
