//! Final-delivery ZIP bundling (spec §4.8.3, ported from
//! `fn_attach_esig_handler.py`'s `__gen_spf_file`/`__gen_zip_file`/
//! `encrypt_result`). Bundles the signed PDF with a `.spf` sidecar holding
//! the summary and attestation document, optionally WinZip-AES-256
//! password-protected.

use std::io::Write;

use serde::Serialize;
use zip::write::FileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

use crate::crypto::{self, CryptoError};

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error building the bundle: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize the .spf sidecar: {0}")]
    Json(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Serialize)]
struct SpfFile<'a> {
    summary: &'a serde_json::Value,
    #[serde(rename = "attestDoc")]
    attest_doc_b64: &'a str,
}

/// Builds the `.spf` sidecar: the raw summary JSON value alongside the
/// base64-encoded attestation document proving the worker produced it.
fn gen_spf_file(summary: &serde_json::Value, attest_doc_b64: &str) -> Result<Vec<u8>, BundleError> {
    let spf = SpfFile { summary, attest_doc_b64 };
    Ok(crate::canonical_json::to_canonical_bytes(&spf)?)
}

/// Packs `{file_name}.pdf` and `{file_name}.spf` into a ZIP, optionally
/// under WinZip-AES-256 password protection (spec §4.7: "enhancedPrivacy").
fn gen_zip_file(
    file_name: &str,
    password: Option<&str>,
    pdf_bytes: &[u8],
    spf_bytes: &[u8],
) -> Result<Vec<u8>, BundleError> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);

        match password {
            Some(pw) => {
                let opts = FileOptions::default()
                    .compression_method(CompressionMethod::Deflated)
                    .with_aes_encryption(AesMode::Aes256, pw);
                zip.start_file(format!("{file_name}.pdf"), opts)?;
                zip.write_all(pdf_bytes)?;
                zip.start_file(format!("{file_name}.spf"), opts)?;
                zip.write_all(spf_bytes)?;
            }
            None => {
                let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
                zip.start_file(format!("{file_name}.pdf"), opts)?;
                zip.write_all(pdf_bytes)?;
                zip.start_file(format!("{file_name}.spf"), opts)?;
                zip.write_all(spf_bytes)?;
            }
        }

        zip.finish()?;
    }
    Ok(buffer.into_inner())
}

pub struct SignedBundle {
    pub file_name_without_extension: String,
    pub zip_bytes: Vec<u8>,
}

/// Builds the delivery ZIP shared by the notificant/signer final mails
/// (spec §4.8.3). `password` is `Some` only when `enhancedPrivacy` is set.
pub fn build(
    file_name_without_extension: &str,
    password: Option<&str>,
    pdf_bytes: &[u8],
    summary: &serde_json::Value,
    attest_doc_b64: &str,
) -> Result<SignedBundle, BundleError> {
    let spf_bytes = gen_spf_file(summary, attest_doc_b64)?;
    let zip_bytes = gen_zip_file(file_name_without_extension, password, pdf_bytes, &spf_bytes)?;
    Ok(SignedBundle {
        file_name_without_extension: file_name_without_extension.to_string(),
        zip_bytes,
    })
}

/// AES-CBC-wraps a result bundle under `accessKey` for the host to store
/// directly (spec §4.8.3: "`encryptedResult` ... under `binding.accessKey`
/// with a random 16-byte IV"). Output is `base64(iv || ciphertext)`.
pub fn encrypt_result(access_key: &[u8], plaintext: &[u8]) -> Result<String, BundleError> {
    let iv = crypto::rand_bytes(16)?;
    let ciphertext = crypto::aes_cbc_pkcs7_encrypt(access_key, &iv, plaintext)?;
    let mut combined = Vec::with_capacity(iv.len() + ciphertext.len());
    combined.extend_from_slice(&iv);
    combined.extend_from_slice(&ciphertext);
    Ok(base64::encode(combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_zip_entry(zip_bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut out = Vec::new();
        entry.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn unprotected_bundle_contains_pdf_and_spf_readable_without_a_password() {
        let summary = serde_json::json!({"magicNumber": "abc"});
        let bundle = build("signed-doc", None, b"%PDF-1.4 fake", &summary, "ZG9j").unwrap();

        assert_eq!(read_zip_entry(&bundle.zip_bytes, "signed-doc.pdf"), b"%PDF-1.4 fake");
        let spf = read_zip_entry(&bundle.zip_bytes, "signed-doc.spf");
        let parsed: serde_json::Value = serde_json::from_slice(&spf).unwrap();
        assert_eq!(parsed["attestDoc"], "ZG9j");
        assert_eq!(parsed["summary"]["magicNumber"], "abc");
    }

    #[test]
    fn password_protected_bundle_entries_require_a_password_to_open() {
        let summary = serde_json::json!({"magicNumber": "abc"});
        let bundle =
            build("signed-doc", Some("s3cret"), b"%PDF-1.4 fake", &summary, "ZG9j").unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(&bundle.zip_bytes)).unwrap();
        assert!(archive.by_name("signed-doc.pdf").is_err());
    }

    #[test]
    fn encrypt_result_round_trips_through_aes_cbc_under_the_access_key() {
        let access_key = crypto::rand_bytes(32).unwrap();
        let plaintext = b"final delivery payload";
        let encoded = encrypt_result(&access_key, plaintext).unwrap();

        let combined = base64::decode(encoded).unwrap();
        let (iv, ciphertext) = combined.split_at(16);
        let decrypted = crypto::aes_cbc_pkcs7_decrypt(&access_key, iv, ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }
}
