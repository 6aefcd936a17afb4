//! `ConfirmIntent` handler (spec §4.8.2, ported from
//! `fn_confirm_intent_handler.py`).

use crate::crypto;
use crate::errcode::ErrCode;
use crate::handlers::{self, DecodedJob, HandlerContext};
use crate::job::{ConfirmIntentJob, JobResult, JOB_NAME_SEND_REQ};
use crate::proto::{self, Poi, Por};
use crate::twilio::{TwilioClient, TwilioError};

/// Outcome of `ConfirmIntent`: either a minted POI, or a pending phone
/// verification carrying the Twilio verification SID out-of-band (spec
/// §4.8.2, `WAITING_VERIFICATION_PIN_CODE`).
pub enum ConfirmIntentOutcome {
    Done(Vec<JobResult>),
    WaitingPinCode(String),
}

pub fn handle(ctx: &HandlerContext, job: &ConfirmIntentJob) -> (ErrCode, Option<ConfirmIntentOutcome>) {
    let decoded = match handlers::decode_job(
        ctx,
        &job.task_payload,
        &job.extra_data.kms_key_id,
        &job.extra_data.kms_key_secret,
    ) {
        Ok(decoded) => decoded,
        Err(code) => return (code, None),
    };

    match run(ctx, job, &decoded) {
        Ok(outcome) => (ErrCode::SUCCES, Some(outcome)),
        Err(code) => (code, None),
    }
}

fn run(
    ctx: &HandlerContext,
    job: &ConfirmIntentJob,
    decoded: &DecodedJob,
) -> Result<ConfirmIntentOutcome, ErrCode> {
    let por_bytes = base64::decode(&job.por).map_err(|_| ErrCode::INVALID_SIGNER_POR)?;
    let por_attest_doc =
        base64::decode(&job.por_attest_document).map_err(|_| ErrCode::INVALID_SIGNER_POR)?;

    let (fn_name, hash_list, por_time) = ctx
        .attestation
        .verify_and_check_pcrs(&por_attest_doc)
        .map_err(|_| ErrCode::INVALID_SIGNER_POR)?;

    if fn_name != JOB_NAME_SEND_REQ {
        return Err(ErrCode::INVALID_SIGNER_POR);
    }
    let por_hash = crypto::sha256_hex(&por_bytes).map_err(|_| ErrCode::UNDEFINED_ERROR)?;
    let attested_hash = hash_list
        .first()
        .map(|entry| entry.hash.as_str())
        .ok_or(ErrCode::INVALID_SIGNER_POR)?;
    if attested_hash != por_hash {
        return Err(ErrCode::INVALID_SIGNER_POR);
    }

    let por: Por = proto::cbor_decode(&por_bytes).map_err(|_| ErrCode::INVALID_SIGNER_POR)?;

    let secret_hash = crypto::sha256_hex(job.secret.as_bytes()).map_err(|_| ErrCode::UNDEFINED_ERROR)?;
    if secret_hash != por.secret_hash || decoded.payload_hash != por.payload_hash {
        return Err(ErrCode::MISMATCH_SIGNER_POR_CONTENT);
    }

    let task_config = &decoded.decrypted.task_config;
    let signer_idx = por.signer_idx as usize;
    let signer_info = task_config
        .signer_info_list
        .get(signer_idx)
        .ok_or(ErrCode::MISMATCH_SIGNER_POR_CONTENT)?;

    if let Some(phone_number) = &signer_info.phone_number {
        let twilio_config = decoded
            .decrypted
            .twilio_config
            .as_ref()
            .ok_or(ErrCode::MISSING_TWILIO_CONFIG)?;
        let client = TwilioClient::new(&twilio_config.twilio_config);

        match (&job.twilio_verification_sid, &job.twilio_verification_pin) {
            (Some(sid), Some(pin)) => {
                client
                    .check_signer_phone(sid, phone_number, pin)
                    .map_err(twilio_err_code)?;
            }
            _ => {
                let sid = client
                    .send_verification_sms(phone_number)
                    .map_err(twilio_err_code)?;
                return Ok(ConfirmIntentOutcome::WaitingPinCode(sid));
            }
        }
    }

    let poi = Poi {
        payload_hash: decoded.payload_hash.clone(),
        signer_idx: por.signer_idx,
        ip_address: job.ip_address.clone(),
        por_time,
    };
    let poi_bytes = proto::cbor_encode(&poi).map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    if task_config.signer_info_list.len() > 1 && !task_config.notificant_email.is_empty() {
        send_signed_event_mail(ctx, job, decoded, signer_info.name.as_str());
    }

    Ok(ConfirmIntentOutcome::Done(vec![JobResult {
        name: "poi",
        bytes: poi_bytes,
    }]))
}

fn twilio_err_code(e: TwilioError) -> ErrCode {
    match e {
        TwilioError::InvalidCredential => ErrCode::INVALID_TWILIO_CREDENTAIL,
        TwilioError::InvalidSetting => ErrCode::INVALID_TWILIO_SETTING,
        TwilioError::SendSmsFail => ErrCode::SEND_SMS_FAIL,
        TwilioError::CheckPhoneFail => ErrCode::CHECK_PHONE_FAIL,
    }
}

fn send_signed_event_mail(
    ctx: &HandlerContext,
    job: &ConfirmIntentJob,
    decoded: &DecodedJob,
    signer_name: &str,
) {
    use crate::mail::SignedEntry;

    let task_config = &decoded.decrypted.task_config;
    let sender = handlers::mail_sender(ctx, decoded);
    let signed = [SignedEntry {
        name: signer_name.to_string(),
        signing_time_unix: chrono::Utc::now().timestamp(),
    }];
    let _ = sender.send_notificant_signed_event_mail(
        &task_config.notificant_locale,
        &task_config.notificant_email,
        &job.task_id,
        &task_config.file_name,
        &signed,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_twilio_error_to_its_own_err_code() {
        assert_eq!(twilio_err_code(TwilioError::InvalidCredential), ErrCode::INVALID_TWILIO_CREDENTAIL);
        assert_eq!(twilio_err_code(TwilioError::InvalidSetting), ErrCode::INVALID_TWILIO_SETTING);
        assert_eq!(twilio_err_code(TwilioError::SendSmsFail), ErrCode::SEND_SMS_FAIL);
        assert_eq!(twilio_err_code(TwilioError::CheckPhoneFail), ErrCode::CHECK_PHONE_FAIL);
    }
}
