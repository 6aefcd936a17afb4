//! Shared handler scaffolding (spec §4.8, ported from
//! `fn_base_handler.py`'s `BaseFunctionHandler`): compute `payloadHash`,
//! run `PayloadDecryptor`, and hand each of the three job handlers its
//! decrypted context before dispatch.

pub mod attach_esig;
pub mod confirm_intent;
pub mod send_req;

use crate::attestation::AttestationService;
use crate::decryptor::{self, DecryptedPayload};
use crate::errcode::ErrCode;
use crate::kms::KmsClient;
use crate::mail::{MailSender, MailTemplates};
use crate::nsm::NsmBridge;
use crate::payload::TaskPayload;

/// Runtime collaborators every handler needs; built once at startup and
/// borrowed for the lifetime of a single job (spec §5: "single-threaded
/// cooperative... one job in flight").
pub struct HandlerContext<'a> {
    pub nsm: &'a NsmBridge,
    pub kms: &'a KmsClient,
    pub attestation: &'a AttestationService,
    pub mail_template_folder: &'a str,
}

/// Everything a handler needs after `PayloadDecryptor` and the payload hash
/// have both succeeded.
pub struct DecodedJob {
    pub payload_hash: String,
    pub decrypted: DecryptedPayload,
}

pub fn mail_sender(ctx: &HandlerContext, decoded: &DecodedJob) -> MailSender {
    MailSender::new(
        decoded.decrypted.email_config.email_config.clone(),
        MailTemplates::new(ctx.mail_template_folder),
    )
}

/// Computes `payloadHash` and decrypts the private task info, collapsing
/// every non-mismatch decrypt failure to `DECRYPT_PRIVATE_INFO_FAIL` (spec
/// §7 tier 2; ported from `encryption_util.decrypt_private_task_info`).
pub fn decode_job(
    ctx: &HandlerContext,
    task_payload: &TaskPayload,
    kms_access_key_id: &str,
    kms_access_key_secret: &str,
) -> Result<DecodedJob, ErrCode> {
    let payload_hash = crate::canonical_json::canonical_sha256_hex(task_payload)
        .map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    let decrypted = decryptor::decrypt(
        ctx.nsm,
        ctx.kms,
        task_payload,
        kms_access_key_id,
        kms_access_key_secret,
    )
    .map_err(|e| match e {
        decryptor::DecryptError::Binding(code) => code,
        _ => ErrCode::DECRYPT_PRIVATE_INFO_FAIL,
    })?;

    Ok(DecodedJob { payload_hash, decrypted })
}
