//! Standard PDF security handler, AES-256 (`V=5, R=6`, crypt filter
//! `AESV3`), applied when `enhancedPrivacy` is set (spec §4.7: "Optional
//! AES-256 password encryption ... owner=user=password"). `lopdf` parses
//! and rewrites object graphs but does not implement a security handler
//! itself, so this follows ISO 32000-2 §7.6.4 directly — the algorithm
//! pikepdf's `Encryption(owner=..., user=...)` drives under the hood,
//! since `R=6`/AES is its default.

use openssl::hash::{hash, MessageDigest};
use openssl::symm::{Cipher, Crypter, Mode};

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use crate::crypto::CryptoError;

fn sha256(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(hash(MessageDigest::sha256(), data)?.to_vec())
}

fn sha384(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(hash(MessageDigest::sha384(), data)?.to_vec())
}

fn sha512(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(hash(MessageDigest::sha512(), data)?.to_vec())
}

fn aes_cbc_no_pad_encrypt(cipher: Cipher, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut crypter = Crypter::new(cipher, Mode::Encrypt, key, Some(iv))?;
    crypter.pad(false);
    let mut out = vec![0u8; data.len() + cipher.block_size()];
    let mut count = crypter.update(data, &mut out)?;
    count += crypter.finalize(&mut out[count..])?;
    out.truncate(count);
    Ok(out)
}

fn aes_256_ecb_no_pad_encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut crypter = Crypter::new(Cipher::aes_256_ecb(), Mode::Encrypt, key, None)?;
    crypter.pad(false);
    let mut out = vec![0u8; data.len() + Cipher::aes_256_ecb().block_size()];
    let mut count = crypter.update(data, &mut out)?;
    count += crypter.finalize(&mut out[count..])?;
    out.truncate(count);
    Ok(out)
}

/// Algorithm 2.B (ISO 32000-2 §7.6.4.3.4): the revision-6 hardened hash.
/// `udata` is `None` for the user-password path and `Some(&U)` for the
/// owner-password path, which folds the already-computed `U` string in.
fn hash_r6(password: &[u8], salt: &[u8], udata: Option<&[u8]>) -> Result<[u8; 32], CryptoError> {
    let mut input = Vec::with_capacity(password.len() + salt.len() + udata.map_or(0, <[u8]>::len));
    input.extend_from_slice(password);
    input.extend_from_slice(salt);
    if let Some(u) = udata {
        input.extend_from_slice(u);
    }
    let mut k = sha256(&input)?;

    let mut round = 0u32;
    loop {
        let rep_len = password.len() + k.len() + udata.map_or(0, <[u8]>::len);
        let mut k1 = Vec::with_capacity(64 * rep_len);
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            if let Some(u) = udata {
                k1.extend_from_slice(u);
            }
        }
        let e = aes_cbc_no_pad_encrypt(Cipher::aes_128_cbc(), &k[..16], &k[16..32], &k1)?;

        let sum: u32 = e[..16].iter().map(|&b| b as u32).sum();
        k = match sum % 3 {
            0 => sha256(&e)?,
            1 => sha384(&e)?,
            _ => sha512(&e)?,
        };

        round += 1;
        let last = *e.last().ok_or(CryptoError)? as u32;
        if round >= 64 && last <= round - 32 {
            break;
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}

/// `U`/`UE` (ISO 32000-2 algorithm 8): owner and user password are the same
/// string here, so this runs first and its `U` output feeds [`compute_o`].
fn compute_u(password: &[u8], file_key: &[u8]) -> Result<([u8; 48], [u8; 32]), CryptoError> {
    let validation_salt = crate::crypto::rand_bytes(8)?;
    let key_salt = crate::crypto::rand_bytes(8)?;

    let validation_hash = hash_r6(password, &validation_salt, None)?;
    let mut u = [0u8; 48];
    u[..32].copy_from_slice(&validation_hash);
    u[32..40].copy_from_slice(&validation_salt);
    u[40..48].copy_from_slice(&key_salt);

    let intermediate_key = hash_r6(password, &key_salt, None)?;
    let ue_vec = aes_cbc_no_pad_encrypt(Cipher::aes_256_cbc(), &intermediate_key, &[0u8; 16], file_key)?;
    let mut ue = [0u8; 32];
    ue.copy_from_slice(&ue_vec);

    Ok((u, ue))
}

/// `O`/`OE` (ISO 32000-2 algorithm 9), folding `U` into every hash input.
fn compute_o(password: &[u8], u: &[u8; 48], file_key: &[u8]) -> Result<([u8; 48], [u8; 32]), CryptoError> {
    let validation_salt = crate::crypto::rand_bytes(8)?;
    let key_salt = crate::crypto::rand_bytes(8)?;

    let validation_hash = hash_r6(password, &validation_salt, Some(u))?;
    let mut o = [0u8; 48];
    o[..32].copy_from_slice(&validation_hash);
    o[32..40].copy_from_slice(&validation_salt);
    o[40..48].copy_from_slice(&key_salt);

    let intermediate_key = hash_r6(password, &key_salt, Some(u))?;
    let oe_vec = aes_cbc_no_pad_encrypt(Cipher::aes_256_cbc(), &intermediate_key, &[0u8; 16], file_key)?;
    let mut oe = [0u8; 32];
    oe.copy_from_slice(&oe_vec);

    Ok((o, oe))
}

/// `Perms` (ISO 32000-2 §7.6.4.4.8): the permission bits, sealed under the
/// file encryption key so a reader can detect a tampered `P` value.
fn compute_perms(file_key: &[u8], permissions: i32, encrypt_metadata: bool) -> Result<[u8; 16], CryptoError> {
    let mut buf = [0u8; 16];
    buf[..4].copy_from_slice(&permissions.to_le_bytes());
    buf[4..8].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    buf[8] = if encrypt_metadata { b'T' } else { b'F' };
    buf[9..12].copy_from_slice(b"adb");
    let filler = crate::crypto::rand_bytes(4)?;
    buf[12..16].copy_from_slice(&filler);

    let encrypted = aes_256_ecb_no_pad_encrypt(file_key, &buf)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&encrypted[..16]);
    Ok(out)
}

/// Encrypts one string/stream under the `AESV3` crypt filter: a random
/// 16-byte IV prepended to AES-256-CBC-PKCS7 ciphertext under the file
/// encryption key directly (V5 drops V1-V4's per-object key derivation).
fn aes256_encrypt_with_random_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv = crate::crypto::rand_bytes(16)?;
    let ciphertext = crate::crypto::aes_cbc_pkcs7_encrypt(key, &iv, data)?;
    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn encrypt_object(obj: &mut Object, file_key: &[u8]) -> Result<(), CryptoError> {
    match obj {
        Object::String(bytes, _) => {
            *bytes = aes256_encrypt_with_random_iv(file_key, bytes)?;
        }
        Object::Stream(stream) => {
            stream.content = aes256_encrypt_with_random_iv(file_key, &stream.content)?;
        }
        Object::Array(items) => {
            for item in items {
                encrypt_object(item, file_key)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                encrypt_object(value, file_key)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Applies owner=user=`password` AES-256 encryption to every object in
/// `doc` and installs the `V5`/`R6`/`AESV3` `/Encrypt` trailer dictionary,
/// in place.
pub fn encrypt_document(doc: &mut Document, password: &str) -> Result<(), CryptoError> {
    const PERMISSIONS: i32 = -4; // allow all operations (owner == user)
    const ENCRYPT_METADATA: bool = true;

    let password_bytes = password.as_bytes();
    let file_key = crate::crypto::rand_bytes(32)?;

    let (u, ue) = compute_u(password_bytes, &file_key)?;
    let (o, oe) = compute_o(password_bytes, &u, &file_key)?;
    let perms = compute_perms(&file_key, PERMISSIONS, ENCRYPT_METADATA)?;

    let object_ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    for obj_id in object_ids {
        if let Some(obj) = doc.objects.get_mut(&obj_id) {
            let mut taken = std::mem::replace(obj, Object::Null);
            encrypt_object(&mut taken, &file_key)?;
            *doc.objects.get_mut(&obj_id).unwrap() = taken;
        }
    }

    let mut std_cf = Dictionary::new();
    std_cf.set("CFM", Object::Name(b"AESV3".to_vec()));
    std_cf.set("AuthEvent", Object::Name(b"DocOpen".to_vec()));
    std_cf.set("Length", Object::Integer(32));
    let mut cf = Dictionary::new();
    cf.set("StdCF", Object::Dictionary(std_cf));

    let mut encrypt_dict = Dictionary::new();
    encrypt_dict.set("Filter", Object::Name(b"Standard".to_vec()));
    encrypt_dict.set("V", Object::Integer(5));
    encrypt_dict.set("R", Object::Integer(6));
    encrypt_dict.set("Length", Object::Integer(256));
    encrypt_dict.set("O", Object::String(o.to_vec(), StringFormat::Hexadecimal));
    encrypt_dict.set("U", Object::String(u.to_vec(), StringFormat::Hexadecimal));
    encrypt_dict.set("OE", Object::String(oe.to_vec(), StringFormat::Hexadecimal));
    encrypt_dict.set("UE", Object::String(ue.to_vec(), StringFormat::Hexadecimal));
    encrypt_dict.set("Perms", Object::String(perms.to_vec(), StringFormat::Hexadecimal));
    encrypt_dict.set("P", Object::Integer(PERMISSIONS as i64));
    encrypt_dict.set("EncryptMetadata", Object::Boolean(ENCRYPT_METADATA));
    encrypt_dict.set("StmF", Object::Name(b"StdCF".to_vec()));
    encrypt_dict.set("StrF", Object::Name(b"StdCF".to_vec()));
    encrypt_dict.set("CF", Object::Dictionary(cf));

    let file_id = crate::crypto::rand_bytes(16)?;
    let encrypt_id = doc.add_object(Object::Dictionary(encrypt_dict));
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(file_id.clone(), StringFormat::Hexadecimal),
            Object::String(file_id, StringFormat::Hexadecimal),
        ]),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_r6_is_deterministic_for_the_same_inputs() {
        let a = hash_r6(b"secret", b"saltsalt", None).unwrap();
        let b = hash_r6(b"secret", b"saltsalt", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_r6_differs_when_udata_is_folded_in() {
        let without_u = hash_r6(b"secret", b"saltsalt", None).unwrap();
        let with_u = hash_r6(b"secret", b"saltsalt", Some(&[0u8; 48])).unwrap();
        assert_ne!(without_u, with_u);
    }

    #[test]
    fn compute_u_embeds_the_validation_and_key_salts_verbatim() {
        let file_key = vec![7u8; 32];
        let (u, ue) = compute_u(b"secret", &file_key).unwrap();
        let recomputed = hash_r6(b"secret", &u[32..40], None).unwrap();
        assert_eq!(&u[..32], &recomputed[..]);
        assert_eq!(ue.len(), 32);
    }

    #[test]
    fn compute_o_differs_from_compute_u_even_under_the_same_password() {
        let file_key = vec![7u8; 32];
        let (u, _) = compute_u(b"secret", &file_key).unwrap();
        let (o, _) = compute_o(b"secret", &u, &file_key).unwrap();
        assert_ne!(&o[..], &u[..]);
    }

    #[test]
    fn perms_round_trips_through_aes_256_ecb_under_the_file_key() {
        let file_key = vec![9u8; 32];
        let perms = compute_perms(&file_key, -4, true).unwrap();

        let mut decrypter = Crypter::new(Cipher::aes_256_ecb(), Mode::Decrypt, &file_key, None).unwrap();
        decrypter.pad(false);
        let mut out = vec![0u8; perms.len() + Cipher::aes_256_ecb().block_size()];
        let mut count = decrypter.update(&perms, &mut out).unwrap();
        count += decrypter.finalize(&mut out[count..]).unwrap();
        out.truncate(count);

        assert_eq!(&out[..4], &(-4i32).to_le_bytes());
        assert_eq!(&out[4..8], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(out[8], b'T');
        assert_eq!(&out[9..12], b"adb");
    }

    #[test]
    fn aes256_encrypt_with_random_iv_round_trips_and_varies_the_iv() {
        let key = crate::crypto::rand_bytes(32).unwrap();
        let plaintext = b"a signer name goes in a /String object";

        let ct1 = aes256_encrypt_with_random_iv(&key, plaintext).unwrap();
        let ct2 = aes256_encrypt_with_random_iv(&key, plaintext).unwrap();
        assert_ne!(ct1[..16], ct2[..16]);

        let pt = crate::crypto::aes_cbc_pkcs7_decrypt(&key, &ct1[..16], &ct1[16..]).unwrap();
        assert_eq!(pt, plaintext);
    }
}
