//! `PayloadDecryptor` (spec §4.6). Steps and bindings are strictly ordered;
//! the first mismatch aborts with the exact `ErrCode` the caller surfaces.

use crate::canonical_json;
use crate::crypto;
use crate::errcode::ErrCode;
use crate::kms::KmsClient;
use crate::nsm::NsmBridge;
use crate::payload::{
    BindingData, BindingDataEnvelope, EmailConfigEnvelope, PublicTaskInfo, TaskConfig,
    TaskConfigEnvelope, TaskPayload, TwilioConfigEnvelope,
};

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("KMS error: {0}")]
    Kms(#[from] crate::kms::KmsError),
    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
    #[error("base64 decode error")]
    Base64,
    #[error("envelope did not schema-validate or parse")]
    BadEnvelope,
    #[error(transparent)]
    CanonicalJson(#[from] canonical_json::CanonicalJsonError),
    #[error("binding mismatch: {0:?}")]
    Binding(ErrCode),
}

pub struct DecryptedPayload {
    pub binding: BindingData,
    pub task_config: TaskConfig,
    pub template_data: Vec<u8>,
    pub email_config: EmailConfigEnvelope,
    pub twilio_config: Option<TwilioConfigEnvelope>,
}

/// Decrypts one `{encryptedDataKey, dataIV, encryptedData}` envelope via a
/// fresh ephemeral RSA key attested through `nsm` for this single call
/// (spec §4.6: "Each step uses a fresh ephemeral RSA key via `KmsClient`").
fn decrypt_envelope(
    nsm: &NsmBridge,
    kms: &KmsClient,
    kms_key_arn: &str,
    kms_access_key_id: &str,
    kms_access_key_secret: &str,
    envelope: &crate::payload::EncryptedEnvelope,
) -> Result<Vec<u8>, DecryptError> {
    let data_key = kms.decrypt(
        nsm,
        kms_key_arn,
        &envelope.encrypted_data_key,
        kms_access_key_id,
        kms_access_key_secret,
    )?;
    let iv = base64::decode(&envelope.data_iv).map_err(|_| DecryptError::Base64)?;
    let ciphertext =
        base64::decode(&envelope.encrypted_data).map_err(|_| DecryptError::Base64)?;
    Ok(crypto::aes_cbc_pkcs7_decrypt(&data_key, &iv, &ciphertext)?)
}

pub fn decrypt(
    nsm: &NsmBridge,
    kms: &KmsClient,
    task_payload: &TaskPayload,
    kms_access_key_id: &str,
    kms_access_key_secret: &str,
) -> Result<DecryptedPayload, DecryptError> {
    let kms_key_arn = &task_payload
        .public_task_info
        .domain_setting
        .kms_config
        .kms_key_arn;
    let public: &PublicTaskInfo = &task_payload.public_task_info;
    let private = &task_payload.private_task_info;

    // 1. encryptedBindingData
    let binding_bytes = decrypt_envelope(
        nsm,
        kms,
        kms_key_arn,
        kms_access_key_id,
        kms_access_key_secret,
        &private.encrypted_binding_data,
    )?;
    let binding_env: BindingDataEnvelope =
        serde_json::from_slice(&binding_bytes).map_err(|_| DecryptError::BadEnvelope)?;
    let binding = binding_env.binding_data;

    if binding.in_order != public.in_order {
        return Err(DecryptError::Binding(ErrCode::MISMATCH_INORDER_OPTION));
    }

    // 2. templateInfoHash
    let template_info_hash = canonical_json::canonical_sha256_hex(&public.template_info)?;
    if template_info_hash != binding.template_info_hash {
        return Err(DecryptError::Binding(ErrCode::MISMATCH_TEMPLATE_INFO_HASH));
    }

    // 3. encryptedTaskConfig
    let task_config_bytes = decrypt_envelope(
        nsm,
        kms,
        kms_key_arn,
        kms_access_key_id,
        kms_access_key_secret,
        &private.encrypted_task_config,
    )?;
    let task_config_env: TaskConfigEnvelope =
        serde_json::from_slice(&task_config_bytes).map_err(|_| DecryptError::BadEnvelope)?;
    let task_config = task_config_env.task_config;
    let task_config_hash = canonical_json::canonical_sha256_hex(&task_config)?;
    if task_config_hash != binding.task_config_hash {
        return Err(DecryptError::Binding(ErrCode::MISMATCH_TASK_CONFIG_HASH));
    }

    // 4. encryptedTemplateData (raw PDF bytes, not JSON)
    let template_data = decrypt_envelope(
        nsm,
        kms,
        kms_key_arn,
        kms_access_key_id,
        kms_access_key_secret,
        &private.encrypted_template_data,
    )?;
    let template_data_hash = crypto::sha256_hex(&template_data)?;
    if template_data_hash != binding.template_data_hash {
        return Err(DecryptError::Binding(ErrCode::MISMATCH_TEMPLATE_DATA_HASH));
    }

    // 5. encryptedEmailConfig
    let email_config_bytes = decrypt_envelope(
        nsm,
        kms,
        kms_key_arn,
        kms_access_key_id,
        kms_access_key_secret,
        &private.encrypted_email_config,
    )?;
    let email_config: EmailConfigEnvelope =
        serde_json::from_slice(&email_config_bytes).map_err(|_| DecryptError::BadEnvelope)?;

    let (provider_matches, domain_matches) = match &email_config.email_config {
        crate::payload::EmailConfig::Ses { ses_domain, .. } => (
            public.domain_setting.email_service_provider == "ses",
            *ses_domain == public.domain_setting.email_service_domain,
        ),
        crate::payload::EmailConfig::Sg { sg_domain, .. } => (
            public.domain_setting.email_service_provider == "sg",
            *sg_domain == public.domain_setting.email_service_domain,
        ),
    };
    if !provider_matches || !domain_matches {
        return Err(DecryptError::Binding(ErrCode::MISMATCH_EMAIL_CONFIG));
    }
    if email_config.bearer_secret != binding.bearer_secret {
        return Err(DecryptError::Binding(ErrCode::MISMATCH_BEARERSECRET));
    }

    // 6. encryptedTwilioConfig (optional)
    let twilio_config = match &private.encrypted_twilio_config {
        Some(envelope) => {
            let twilio_bytes = decrypt_envelope(
                nsm,
                kms,
                kms_key_arn,
                kms_access_key_id,
                kms_access_key_secret,
                envelope,
            )?;
            let twilio_env: TwilioConfigEnvelope =
                serde_json::from_slice(&twilio_bytes).map_err(|_| DecryptError::BadEnvelope)?;
            if twilio_env.bearer_secret != binding.bearer_secret {
                return Err(DecryptError::Binding(ErrCode::MISMATCH_BEARERSECRET));
            }
            Some(twilio_env)
        }
        None => None,
    };

    Ok(DecryptedPayload {
        binding,
        task_config,
        template_data,
        email_config,
        twilio_config,
    })
}
