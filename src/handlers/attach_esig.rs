//! `AttachESig` handler (spec §4.8.3, ported from
//! `fn_attach_esig_handler.py`). Verifies every signer's POI, renders the
//! final signed PDF, and mints the attested `Summary`. Delivery (mail +
//! host-facing `encryptedResult`) happens once the caller has the worker's
//! own attestation document for this job, so it is split into
//! [`notify_result`]/[`encrypt_result`] for `worker.rs` to call afterwards.

use crate::bundle;
use crate::crypto;
use crate::errcode::ErrCode;
use crate::handlers::{self, DecodedJob, HandlerContext};
use crate::job::{AttachEsigJob, JobResult, JOB_NAME_CONFIRM_INTENT};
use crate::mail::{MailSender, MailTemplates, SignedEntry};
use crate::payload::EmailConfig;
use crate::proto::{self, BindingDataHashInput, Poi, Summary, SummarySigner};

/// Everything [`notify_result`]/[`encrypt_result`] need once the job's own
/// attestation document is available; carries the decrypted secrets a
/// second pass over `decode_job` would otherwise have to re-derive.
pub struct BundleContext {
    task_id: String,
    pdf_bytes: Vec<u8>,
    summary: serde_json::Value,
    access_key: Vec<u8>,
    enhanced_privacy: bool,
    password: Option<String>,
    file_name: String,
    notificant_locale: String,
    notificant_email: String,
    signer_mails: Vec<(String, String)>,
    signed_entries: Vec<SignedEntry>,
    email_config: EmailConfig,
}

pub fn handle(
    ctx: &HandlerContext,
    job: &AttachEsigJob,
) -> (ErrCode, Option<(Vec<JobResult>, BundleContext)>) {
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
        Ok(out) => (ErrCode::SUCCES, Some(out)),
        Err(code) => (code, None),
    }
}

fn run(
    ctx: &HandlerContext,
    job: &AttachEsigJob,
    decoded: &DecodedJob,
) -> Result<(Vec<JobResult>, BundleContext), ErrCode> {
    let task_config = &decoded.decrypted.task_config;
    let public = &job.task_payload.public_task_info;

    if job.proof_list.len() != task_config.signer_info_list.len() {
        return Err(ErrCode::MISMATCH_PROOF_LIST_LENGTH);
    }

    let mut signing_times = Vec::with_capacity(job.proof_list.len());
    let mut ip_addresses = Vec::with_capacity(job.proof_list.len());
    for (idx, proof) in job.proof_list.iter().enumerate() {
        let poi_bytes = base64::decode(&proof.poi).map_err(|_| ErrCode::INVALID_SIGNER_POI)?;
        let poi_attest_doc =
            base64::decode(&proof.poi_attest_document).map_err(|_| ErrCode::INVALID_SIGNER_POI)?;

        let (fn_name, hash_list, timestamp_ms) = ctx
            .attestation
            .verify_and_check_pcrs(&poi_attest_doc)
            .map_err(|_| ErrCode::INVALID_SIGNER_POI)?;
        if fn_name != JOB_NAME_CONFIRM_INTENT {
            return Err(ErrCode::INVALID_SIGNER_POI);
        }
        let poi_hash = crypto::sha256_hex(&poi_bytes).map_err(|_| ErrCode::UNDEFINED_ERROR)?;
        let attested_hash = hash_list
            .first()
            .map(|entry| entry.hash.as_str())
            .ok_or(ErrCode::INVALID_SIGNER_POI)?;
        if attested_hash != poi_hash {
            return Err(ErrCode::INVALID_SIGNER_POI);
        }

        let poi: Poi = proto::cbor_decode(&poi_bytes).map_err(|_| ErrCode::INVALID_SIGNER_POI)?;
        if poi.payload_hash != decoded.payload_hash || poi.signer_idx as usize != idx {
            return Err(ErrCode::MISMATCH_SIGNER_POI_CONTENT);
        }
        if poi.por_time > timestamp_ms {
            return Err(ErrCode::MISMATCH_SIGNER_POI_CONTENT);
        }

        signing_times.push(timestamp_ms);
        ip_addresses.push(poi.ip_address);
    }

    if public.in_order {
        for pair in signing_times.windows(2) {
            if pair[1] < pair[0] {
                return Err(ErrCode::INVALID_SIGN_TIME_ORDER);
            }
        }
    }

    let magic_number = hex::encode(crypto::rand_bytes(32).map_err(|_| ErrCode::UNDEFINED_ERROR)?);

    let signing_time_strings: Vec<String> = signing_times.iter().map(|ms| format_signing_time(*ms)).collect();
    let mut signers = Vec::with_capacity(task_config.signer_info_list.len());
    for (idx, info) in task_config.signer_info_list.iter().enumerate() {
        signers.push(crate::pdf::OverlaySigner {
            idx: idx as u32,
            name: &info.name,
            locale: &info.locale,
            field_list: &public.template_info.signer_list[idx].field_list,
            sign_hint: false,
            signing_time: Some(signing_time_strings[idx].as_str()),
        });
    }
    let final_pdf = crate::pdf::render_final(&decoded.decrypted.template_data, &signers, &magic_number)
        .map_err(|_| ErrCode::GENERATE_SIGNING_PDF_FAIL)?;

    let binding_data_hash_input = BindingDataHashInput {
        in_order: public.in_order,
        task_config_hash: decoded.decrypted.binding.task_config_hash.clone(),
        template_info_hash: decoded.decrypted.binding.template_info_hash.clone(),
        template_data_hash: decoded.decrypted.binding.template_data_hash.clone(),
    };
    let binding_data_hash = crate::canonical_json::canonical_sha256_hex(&binding_data_hash_input)
        .map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    let summary = Summary {
        signer_list: task_config
            .signer_info_list
            .iter()
            .enumerate()
            .map(|(idx, info)| SummarySigner {
                name: info.name.clone(),
                email_addr: info.email_addr.clone(),
                ip_address: ip_addresses[idx].clone(),
                signing_time: signing_times[idx] / 1000,
                phone_number: info.phone_number.clone(),
            })
            .collect(),
        magic_number: magic_number.clone(),
        binding_data_hash,
    };
    let summary_bytes = crate::canonical_json::to_canonical_bytes(&summary).map_err(|_| ErrCode::UNDEFINED_ERROR)?;
    let summary_value: serde_json::Value =
        serde_json::from_slice(&summary_bytes).map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    let access_key =
        base64::decode(&decoded.decrypted.binding.access_key).map_err(|_| ErrCode::UNDEFINED_ERROR)?;

    let signed_entries: Vec<SignedEntry> = task_config
        .signer_info_list
        .iter()
        .zip(signing_times.iter())
        .map(|(info, ms)| SignedEntry {
            name: info.name.clone(),
            signing_time_unix: (*ms / 1000) as i64,
        })
        .collect();

    let bundle_ctx = BundleContext {
        task_id: job.task_id.clone(),
        pdf_bytes: final_pdf.clone(),
        summary: summary_value,
        access_key,
        enhanced_privacy: public.domain_setting.enhanced_privacy,
        password: job.task_password.clone(),
        file_name: task_config.file_name.clone(),
        notificant_locale: task_config.notificant_locale.clone(),
        notificant_email: task_config.notificant_email.clone(),
        signer_mails: task_config
            .signer_info_list
            .iter()
            .map(|s| (s.locale.clone(), s.email_addr.clone()))
            .collect(),
        signed_entries,
        email_config: decoded.decrypted.email_config.email_config.clone(),
    };

    let results = vec![
        JobResult { name: "esigPDF", bytes: final_pdf },
        JobResult { name: "summary", bytes: summary_bytes },
    ];

    Ok((results, bundle_ctx))
}

fn format_signing_time(timestamp_ms: u64) -> String {
    let secs = (timestamp_ms / 1000) as i64;
    chrono::NaiveDateTime::from_timestamp_opt(secs, 0)
        .map(|dt| dt.format("%Y/%m/%d (UTC)").to_string())
        .unwrap_or_default()
}

/// Best-effort delivery mail to the notificant (zip with every signer's
/// info) and each signer individually (spec §4.8.3: "on success, mail the
/// final bundle"). Failures are swallowed — the host already has
/// `encryptedResult` either way.
pub fn notify_result(ctx: &HandlerContext, bundle_ctx: &BundleContext, attest_doc_b64: &str) {
    let templates = MailTemplates::new(ctx.mail_template_folder);
    let sender = MailSender::new(bundle_ctx.email_config.clone(), templates);

    let password = if bundle_ctx.enhanced_privacy {
        bundle_ctx.password.as_deref()
    } else {
        None
    };

    let single_signer_suffix = if bundle_ctx.signer_mails.len() == 1 {
        bundle_ctx.signer_mails.first().map(|(_, email)| email.as_str())
    } else {
        None
    };
    let zip_file_name = match single_signer_suffix {
        Some(email) => format!("{}_{}", bundle_ctx.file_name, email),
        None => bundle_ctx.file_name.clone(),
    };

    let bundle = match bundle::build(&zip_file_name, password, &bundle_ctx.pdf_bytes, &bundle_ctx.summary, attest_doc_b64) {
        Ok(b) => b,
        Err(_) => return,
    };

    if !bundle_ctx.notificant_email.is_empty() {
        let _ = sender.send_notificant_final_mail(
            &bundle_ctx.notificant_locale,
            &bundle_ctx.notificant_email,
            &bundle_ctx.task_id,
            &bundle_ctx.file_name,
            &bundle_ctx.signed_entries,
            &bundle.file_name_without_extension,
            bundle.zip_bytes.clone(),
        );
    }

    for (locale, email) in &bundle_ctx.signer_mails {
        let _ = sender.send_signer_final_mail(
            locale,
            email,
            &bundle_ctx.task_id,
            &bundle.file_name_without_extension,
            bundle.zip_bytes.clone(),
        );
    }
}

/// Wraps the unprotected bundle under `binding.accessKey` for the host to
/// store (spec §4.8.3: "`encryptedResult`, never the mail password").
pub fn encrypt_result(bundle_ctx: &BundleContext, attest_doc_b64: &str) -> Result<String, ErrCode> {
    let bundle = bundle::build(&bundle_ctx.file_name, None, &bundle_ctx.pdf_bytes, &bundle_ctx.summary, attest_doc_b64)
        .map_err(|_| ErrCode::ENCRYPT_RESULT_FAIL)?;
    bundle::encrypt_result(&bundle_ctx.access_key, &bundle.zip_bytes).map_err(|_| ErrCode::ENCRYPT_RESULT_FAIL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_signing_time_renders_date_only_no_time_of_day() {
        // 2024-01-02T03:04:05Z
        assert_eq!(format_signing_time(1_704_164_645_000), "2024/01/02 (UTC)");
    }

    #[test]
    fn format_signing_time_truncates_sub_second_precision() {
        assert_eq!(format_signing_time(1_704_164_645_999), "2024/01/02 (UTC)");
    }
}
