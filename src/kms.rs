//! `KmsClient` (spec §4.4). SigV4-signs a `TrentService.Decrypt` call by
//! hand (the teacher pulls in no AWS SDK, and the pack carries no SigV4
//! crate either, so this mirrors `kms_util.py`'s manual signing exactly),
//! then unwraps the CMS EnvelopedData response with `cms`/`der`.

use chrono::Utc;
use cms::content_info::ContentInfo;
use cms::enveloped_data::{EnvelopedData, RecipientInfo};
use der::Decode;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::crypto::{self, CryptoError, RsaKeyPair};
use crate::nsm::NsmBridge;

const AMZ_TARGET_DECRYPT: &str = "TrentService.Decrypt";
const RETRY_TOTAL: u32 = 5;
const RETRY_BACKOFF_SECS: f64 = 0.3;

#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("network error talking to KMS: {0}")]
    Network(String),
    #[error("KMS returned HTTP status {0}")]
    HttpStatus(u16),
    #[error("malformed KMS response: {0}")]
    MalformedResponse(String),
    #[error("KMS rejected the attestation document")]
    AttestationRejectedByKms,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("NSM error while attesting the ephemeral recipient key: {0}")]
    Nsm(#[from] crate::nsm::NsmError),
}

#[derive(Serialize)]
struct Recipient {
    #[serde(rename = "KeyEncryptionAlgorithm")]
    key_encryption_algorithm: &'static str,
    #[serde(rename = "AttestationDocument")]
    attestation_document: String,
}

#[derive(Serialize)]
struct DecryptRequest {
    #[serde(rename = "KeyId")]
    key_id: String,
    #[serde(rename = "EncryptionAlgorithm")]
    encryption_algorithm: &'static str,
    #[serde(rename = "CiphertextBlob")]
    ciphertext_blob: String,
    #[serde(rename = "Recipient")]
    recipient: Recipient,
}

#[derive(serde::Deserialize)]
struct DecryptResponse {
    #[serde(rename = "CiphertextForRecipient")]
    ciphertext_for_recipient: String,
}

pub struct KmsClient {
    http: reqwest::blocking::Client,
}

impl KmsClient {
    pub fn new() -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("building the KMS HTTP client cannot fail with these options");
        KmsClient { http }
    }

    /// Decrypts one ciphertext blob under `kms_key_arn`, attesting a fresh
    /// ephemeral RSA-2048 recipient key through `nsm` for every call (spec
    /// §4.6: "Each step uses a fresh ephemeral RSA key via `KmsClient`").
    pub fn decrypt(
        &self,
        nsm: &NsmBridge,
        kms_key_arn: &str,
        ciphertext_blob_b64: &str,
        access_key_id: &str,
        access_key_secret: &str,
    ) -> Result<Vec<u8>, KmsError> {
        let region = extract_region(kms_key_arn)
            .ok_or_else(|| KmsError::MalformedResponse("key ARN missing region segment".into()))?;

        let keypair = RsaKeyPair::generate(2048)?;
        let pub_der = keypair.public_key_der()?;
        let attest_doc = nsm.attest(None, Some(pub_der), None)?;

        let body = DecryptRequest {
            key_id: kms_key_arn.to_string(),
            encryption_algorithm: "RSAES_OAEP_SHA_256",
            ciphertext_blob: ciphertext_blob_b64.to_string(),
            recipient: Recipient {
                key_encryption_algorithm: "RSAES_OAEP_SHA_256",
                attestation_document: base64::encode(attest_doc),
            },
        };
        let request_data = crate::canonical_json::to_canonical_bytes(&body)
            .map_err(|e| KmsError::MalformedResponse(e.to_string()))?;

        let response_json = self.post_signed(region, &request_data, access_key_id, access_key_secret)?;
        let response: DecryptResponse = serde_json::from_slice(&response_json)
            .map_err(|e| KmsError::MalformedResponse(e.to_string()))?;

        let cms_der = base64::decode(response.ciphertext_for_recipient)
            .map_err(|e| KmsError::MalformedResponse(e.to_string()))?;

        let (encrypted_key, iv, encrypted_content) = parse_enveloped_data(&cms_der)?;

        let data_key = keypair.oaep_sha256_decrypt(&encrypted_key)?;
        let plaintext = crypto::aes_cbc_pkcs7_decrypt(&data_key, &iv, &encrypted_content)?;
        Ok(plaintext)
    }

    fn post_signed(
        &self,
        region: &str,
        request_data: &[u8],
        access_key_id: &str,
        access_key_secret: &str,
    ) -> Result<Vec<u8>, KmsError> {
        let host = format!("kms.{region}.amazonaws.com");
        let endpoint = format!("https://{host}/");
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let credential_scope = format!("{date_stamp}/{region}/kms/aws4_request");
        let signed_headers = "content-type;host;x-amz-date;x-amz-target";
        let content_type = "application/x-amz-json-1.1";

        let payload_hash = hex::encode(crypto::sha256(request_data).map_err(KmsError::Crypto)?);
        let canonical_headers = format!(
            "content-type:{content_type}\nhost:{host}\nx-amz-date:{amz_date}\nx-amz-target:{AMZ_TARGET_DECRYPT}\n"
        );
        let canonical_request =
            format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");
        let canonical_request_hash =
            hex::encode(crypto::sha256(canonical_request.as_bytes()).map_err(KmsError::Crypto)?);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{canonical_request_hash}"
        );

        let signing_key = derive_signing_key(access_key_secret, &date_stamp, region, "kms");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={access_key_id}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}"
        );

        let mut attempt = 0;
        loop {
            let result = self
                .http
                .post(&endpoint)
                .header("X-Amz-Target", AMZ_TARGET_DECRYPT)
                .header("X-Amz-Date", &amz_date)
                .header("Content-Type", content_type)
                .header("Authorization", &authorization)
                .body(request_data.to_vec())
                .send();

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() && attempt < RETRY_TOTAL {
                        attempt += 1;
                        std::thread::sleep(std::time::Duration::from_secs_f64(
                            RETRY_BACKOFF_SECS * 2f64.powi(attempt as i32 - 1),
                        ));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(KmsError::HttpStatus(status.as_u16()));
                    }
                    return resp
                        .bytes()
                        .map(|b| b.to_vec())
                        .map_err(|e| KmsError::Network(e.to_string()));
                }
                Err(e) => {
                    if attempt < RETRY_TOTAL {
                        attempt += 1;
                        std::thread::sleep(std::time::Duration::from_secs_f64(
                            RETRY_BACKOFF_SECS * 2f64.powi(attempt as i32 - 1),
                        ));
                        continue;
                    }
                    return Err(KmsError::Network(e.to_string()));
                }
            }
        }
    }
}

impl Default for KmsClient {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_region(kms_key_arn: &str) -> Option<&str> {
    kms_key_arn.split(':').nth(3)
}

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn parse_enveloped_data(der_bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), KmsError> {
    let content_info = ContentInfo::from_der(der_bytes)
        .map_err(|e| KmsError::MalformedResponse(e.to_string()))?;
    let enveloped: EnvelopedData = content_info
        .content
        .decode_as()
        .map_err(|e| KmsError::MalformedResponse(e.to_string()))?;

    let recipient = enveloped
        .recip_infos
        .0
        .get(0)
        .ok_or_else(|| KmsError::MalformedResponse("no recipient_infos".into()))?;
    let encrypted_key = match recipient {
        RecipientInfo::Ktri(ktri) => ktri.enc_key.as_bytes().to_vec(),
        _ => return Err(KmsError::MalformedResponse("unexpected RecipientInfo variant".into())),
    };

    let encrypted_content_info = &enveloped.encrypted_content;
    let iv = encrypted_content_info
        .content_enc_alg
        .parameters
        .as_ref()
        .ok_or_else(|| KmsError::MalformedResponse("missing content encryption IV".into()))?
        .value()
        .to_vec();
    let encrypted_content = encrypted_content_info
        .encrypted_content
        .as_ref()
        .ok_or_else(|| KmsError::MalformedResponse("missing encrypted_content".into()))?
        .as_bytes()
        .to_vec();

    Ok((encrypted_key, iv, encrypted_content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_region_reads_the_fourth_arn_segment() {
        assert_eq!(
            extract_region("arn:aws:kms:us-east-1:111122223333:key/abcd-1234"),
            Some("us-east-1")
        );
    }

    #[test]
    fn extract_region_is_none_for_a_malformed_arn() {
        assert_eq!(extract_region("not-an-arn"), None);
    }

    #[test]
    fn derive_signing_key_matches_the_published_sigv4_test_vector() {
        // AWS SigV4 test suite vector (iam, us-east-1, 2015-08-30).
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "2c94c0cf5378ada6887f09bb697df8fc0affdb34ba1cdd5bda32b664bd55b73c"
        );
    }
}
