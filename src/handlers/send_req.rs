//! `SendReq` handler (spec §4.8.1, ported from `fn_send_req_handler.py`).

use crate::crypto;
use crate::errcode::ErrCode;
use crate::handlers::{self, DecodedJob, HandlerContext};
use crate::job::{JobResult, SendReqJob};
use crate::pdf::{self, OverlaySigner};
use crate::proto::{self, Por};

/// Runs `SendReq` start to finish: precondition checks, preview PDF, POR
/// minting, and the confirmation/notificant mail side effects.
pub fn handle(ctx: &HandlerContext, job: &SendReqJob) -> (ErrCode, Vec<JobResult>) {
    let decoded = match handlers::decode_job(
        ctx,
        &job.task_payload,
        &job.extra_data.kms_key_id,
        &job.extra_data.kms_key_secret,
    ) {
        Ok(decoded) => decoded,
        Err(code) => return (code, vec![]),
    };

    let code = run(ctx, job, &decoded);

    if code != ErrCode::SUCCES {
        notify_failure(ctx, job, &decoded);
        return (code, vec![]);
    }

    match mint_por(ctx, job, &decoded) {
        Ok(results) => (ErrCode::SUCCES, results),
        Err(code) => {
            notify_failure(ctx, job, &decoded);
            (code, vec![])
        }
    }
}

fn run(_ctx: &HandlerContext, job: &SendReqJob, decoded: &DecodedJob) -> ErrCode {
    let public = &job.task_payload.public_task_info;
    let task_config = &decoded.decrypted.task_config;

    if public.template_info.signer_list.len() != task_config.signer_info_list.len() {
        return ErrCode::MISMATCH_SIGNER_LIST_LENGTH;
    }
    if job.signer_idx >= task_config.signer_info_list.len() {
        return ErrCode::INVALID_SIGNER_INDEX;
    }

    for signer_info in &task_config.signer_info_list {
        if let Some(phone) = &signer_info.phone_number {
            if decoded.decrypted.twilio_config.is_none() {
                return ErrCode::MISSING_TWILIO_CONFIG;
            }
            let valid = phonenumber::parse(None, phone)
                .map(|n| phonenumber::is_valid(&n))
                .unwrap_or(false);
            if !valid {
                return ErrCode::INVALID_PHONE_NUMBER_FORMAT;
            }
        }
    }

    if pdf::test_signed_pdf(&decoded.decrypted.template_data) {
        return ErrCode::SIGNED_PDF_DETECTED;
    }
    let signer_field_lists: Vec<Vec<crate::payload::SignatureField>> = public
        .template_info
        .signer_list
        .iter()
        .map(|signer| signer.field_list.clone())
        .collect();
    if !pdf::test_pdf_modifiable(&decoded.decrypted.template_data, &signer_field_lists) {
        return ErrCode::PDF_NOT_MODIFIABLE_DETECTED;
    }

    ErrCode::SUCCES
}

fn build_preview_signers<'a>(
    job: &'a SendReqJob,
    task_config: &'a crate::payload::TaskConfig,
) -> Vec<OverlaySigner<'a>> {
    let public = &job.task_payload.public_task_info;
    let mut signers = Vec::new();

    if public.in_order {
        for idx in 0..=job.signer_idx {
            let info = &task_config.signer_info_list[idx];
            signers.push(OverlaySigner {
                idx: idx as u32,
                name: &info.name,
                locale: &info.locale,
                field_list: &public.template_info.signer_list[idx].field_list,
                sign_hint: idx == job.signer_idx,
                signing_time: None,
            });
        }
    } else {
        let idx = job.signer_idx;
        let info = &task_config.signer_info_list[idx];
        signers.push(OverlaySigner {
            idx: idx as u32,
            name: &info.name,
            locale: &info.locale,
            field_list: &public.template_info.signer_list[idx].field_list,
            sign_hint: true,
            signing_time: None,
        });
    }

    signers
}

fn mint_por(
    ctx: &HandlerContext,
    job: &SendReqJob,
    decoded: &DecodedJob,
) -> Result<Vec<JobResult>, ErrCode> {
    let task_config = &decoded.decrypted.task_config;
    let public = &job.task_payload.public_task_info;

    let signers = build_preview_signers(job, task_config);
    let password = if public.domain_setting.enhanced_privacy {
        Some(job.task_password.as_str())
    } else {
        None
    };
    let preview_pdf = pdf::render_preview(&decoded.decrypted.template_data, &signers, password)
        .map_err(|_| ErrCode::GENERATE_PREVIEW_PDF_FAIL)?;

    let intent_secret = base64::encode(crypto::rand_bytes(256).map_err(|_| ErrCode::UNDEFINED_ERROR)?);
    let target_signer = &task_config.signer_info_list[job.signer_idx];
    let secret_hash = crypto::sha256_hex(intent_secret.as_bytes()).map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    let por = Por {
        payload_hash: decoded.payload_hash.clone(),
        signer_idx: job.signer_idx as u32,
        secret_hash,
        phone_required: target_signer.phone_number.is_some(),
    };
    let por_bytes = proto::cbor_encode(&por).map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    send_confirmation_mail(ctx, job, decoded, &intent_secret, &preview_pdf)?;
    send_notificant_notify(ctx, job, decoded);

    Ok(vec![JobResult { name: "por", bytes: por_bytes }])
}

fn gen_confirm_link(
    signer_app_url: &str,
    api_version: &str,
    task_id: &str,
    sub_task_id: &str,
    signer_idx: usize,
    secret: &str,
    aux_data: &str,
    locale: &str,
    is_phone_verification: bool,
) -> String {
    #[derive(serde::Serialize)]
    struct ConfirmData<'a> {
        version: &'a str,
        tid: &'a str,
        sid: &'a str,
        index: usize,
        secret: &'a str,
        aux: &'a str,
        locale: &'a str,
        sms: bool,
    }
    let confirm_data = ConfirmData {
        version: api_version,
        tid: task_id,
        sid: sub_task_id,
        index: signer_idx,
        secret,
        aux: aux_data,
        locale,
        sms: is_phone_verification,
    };
    let json = serde_json::to_string(&confirm_data).unwrap_or_default();
    let intent_b64 = base64::encode(json);
    let query = format!(
        "action=submitIntent&intent={}",
        percent_encode(&intent_b64)
    );
    if signer_app_url.contains('?') {
        format!("{signer_app_url}&{query}")
    } else {
        format!("{signer_app_url}?{query}")
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn send_confirmation_mail(
    ctx: &HandlerContext,
    job: &SendReqJob,
    decoded: &DecodedJob,
    intent_secret: &str,
    preview_pdf: &[u8],
) -> Result<(), ErrCode> {
    let task_config = &decoded.decrypted.task_config;
    let target_signer = &task_config.signer_info_list[job.signer_idx];
    let public = &job.task_payload.public_task_info;

    let confirm_link = gen_confirm_link(
        &public.domain_setting.signer_app_url,
        job.extra_data.api_version.as_deref().unwrap_or(""),
        &job.task_id,
        &job.sub_task_id,
        job.signer_idx,
        intent_secret,
        job.extra_data.aux_data.as_deref().unwrap_or(""),
        &target_signer.locale,
        target_signer.phone_number.is_some(),
    );

    let sender = handlers::mail_sender(ctx, decoded);

    sender
        .send_signer_confirmation_mail(
            &target_signer.locale,
            &public.domain_setting.root_domain,
            &target_signer.email_addr,
            &job.task_id,
            &target_signer.name,
            &task_config.sender_msg,
            &task_config.file_name,
            preview_pdf.to_vec(),
            &confirm_link,
            target_signer.phone_number.as_deref(),
        )
        .map_err(|e| match e.to_err_code() {
            ErrCode::SEND_EMAIL_FAIL => ErrCode::SEND_CONFIRM_EMAIL_FAIL,
            other => other,
        })
}

fn single_signer_email(task_config: &crate::payload::TaskConfig) -> Option<&str> {
    if task_config.signer_info_list.len() > 1 {
        None
    } else {
        task_config.signer_info_list.first().map(|s| s.email_addr.as_str())
    }
}

fn send_notificant_notify(ctx: &HandlerContext, job: &SendReqJob, decoded: &DecodedJob) {
    let task_config = &decoded.decrypted.task_config;
    if job.signer_idx != 0 || task_config.notificant_email.is_empty() {
        return;
    }
    let sender = handlers::mail_sender(ctx, decoded);
    let _ = sender.send_notificant_notify_mail(
        &task_config.notificant_locale,
        &task_config.notificant_email,
        &job.task_id,
        &task_config.file_name,
        single_signer_email(task_config),
    );
}

fn notify_failure(ctx: &HandlerContext, job: &SendReqJob, decoded: &DecodedJob) {
    let task_config = &decoded.decrypted.task_config;
    if job.signer_idx != 0 || task_config.notificant_email.is_empty() {
        return;
    }
    let sender = handlers::mail_sender(ctx, decoded);
    let _ = sender.send_notificant_error_mail(
        &task_config.notificant_locale,
        &task_config.notificant_email,
        &job.task_id,
        &task_config.file_name,
        single_signer_email(task_config),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::SignerInfo;

    #[test]
    fn percent_encode_leaves_unreserved_characters_untouched() {
        assert_eq!(percent_encode("Az09-_.~"), "Az09-_.~");
    }

    #[test]
    fn percent_encode_escapes_everything_else() {
        assert_eq!(percent_encode("a+b=c"), "a%2Bb%3Dc");
        assert_eq!(percent_encode("/"), "%2F");
    }

    #[test]
    fn gen_confirm_link_appends_query_with_question_mark_when_absent() {
        let link = gen_confirm_link(
            "https://example.com/sign",
            "1",
            "task-1",
            "sub-1",
            0,
            "s3cr3t",
            "",
            "en",
            false,
        );
        assert!(link.starts_with("https://example.com/sign?action=submitIntent&intent="));
    }

    #[test]
    fn gen_confirm_link_appends_query_with_ampersand_when_url_already_has_one() {
        let link = gen_confirm_link(
            "https://example.com/sign?foo=bar",
            "1",
            "task-1",
            "sub-1",
            0,
            "s3cr3t",
            "",
            "en",
            false,
        );
        assert!(link.starts_with("https://example.com/sign?foo=bar&action=submitIntent&intent="));
    }

    #[test]
    fn gen_confirm_link_embeds_a_decodable_base64_json_payload() {
        let link = gen_confirm_link(
            "https://example.com/sign",
            "2",
            "task-1",
            "sub-7",
            3,
            "the-secret",
            "aux",
            "fr",
            true,
        );
        let intent_b64 = link.split("intent=").nth(1).unwrap();
        let decoded_intent = intent_b64.replace("%2F", "/").replace("%2B", "+").replace("%3D", "=");
        let json_bytes = base64::decode(decoded_intent).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json_bytes).unwrap();
        assert_eq!(value["tid"], "task-1");
        assert_eq!(value["sid"], "sub-7");
        assert_eq!(value["index"], 3);
        assert_eq!(value["secret"], "the-secret");
        assert_eq!(value["locale"], "fr");
        assert_eq!(value["sms"], true);
    }

    fn signer(name: &str, email: &str) -> SignerInfo {
        SignerInfo { name: name.into(), email_addr: email.into(), phone_number: None, locale: "en".into() }
    }

    fn task_config_with(signers: Vec<SignerInfo>) -> crate::payload::TaskConfig {
        crate::payload::TaskConfig {
            file_name: "doc".into(),
            sender_msg: String::new(),
            notificant_email: String::new(),
            notificant_locale: "en".into(),
            signer_info_list: signers,
        }
    }

    #[test]
    fn single_signer_email_returns_none_when_multiple_signers() {
        let tc = task_config_with(vec![signer("a", "a@x.com"), signer("b", "b@x.com")]);
        assert_eq!(single_signer_email(&tc), None);
    }

    #[test]
    fn single_signer_email_returns_the_lone_signer() {
        let tc = task_config_with(vec![signer("a", "a@x.com")]);
        assert_eq!(single_signer_email(&tc), Some("a@x.com"));
    }
}
