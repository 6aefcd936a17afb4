//! The poll loop (spec §4.9, ported from `tee_server.py`'s `main()`/
//! `__process_job_data`): fetch a job from the host, dispatch it to the
//! matching handler, attest the outputs, and put the result back.

use std::time::Duration;

use tracing::{info, warn};

use crate::attestation::{AttestationService, HashEntry};
use crate::errcode::ErrCode;
use crate::handlers::{attach_esig, confirm_intent, send_req, HandlerContext};
use crate::host::HostRpc;
use crate::job::{
    AttachEsigJob, ConfirmIntentJob, EncodedResult, GetJobResponse, JobResult, PutJobResult,
    SendReqJob, JOB_NAME_ATTACH_ESIG, JOB_NAME_CONFIRM_INTENT, JOB_NAME_SEND_REQ,
};
use crate::kms::KmsClient;
use crate::nsm::NsmBridge;

const EMPTY_JOB_SLEEP: Duration = Duration::from_millis(100);

/// Runs forever, polling the host for one job at a time (spec §5:
/// "single-threaded cooperative... one job in flight").
pub fn run(mail_template_folder: &str, host_base_url_override: Option<String>) -> ! {
    let nsm = NsmBridge::open();
    let kms = KmsClient::new();
    let host = HostRpc::new(host_base_url_override);

    let downward_compat = crate::config::WorkerConfig::from_env()
        .downward_compat_pcrs()
        .unwrap_or_else(|e| {
            warn!(error = %e, "ignoring malformed downward-compatibility PCR config");
            Vec::new()
        });
    let attestation = AttestationService::bootstrap(&nsm, downward_compat)
        .expect("attestation bootstrap must succeed before serving jobs");

    let ctx = HandlerContext {
        nsm: &nsm,
        kms: &kms,
        attestation: &attestation,
        mail_template_folder,
    };

    info!("worker ready, entering poll loop");
    loop {
        let Some(job) = host.get_job::<GetJobResponse>() else {
            std::thread::sleep(EMPTY_JOB_SLEEP);
            continue;
        };

        let response = process_job(&ctx, &job);
        host.put_job_result(&job.session, &response);
    }
}

fn process_job(ctx: &HandlerContext, job: &GetJobResponse) -> PutJobResult {
    match job.job_name.as_str() {
        JOB_NAME_SEND_REQ => {
            let parsed: Result<SendReqJob, _> = serde_json::from_value(job.job_data.clone());
            match parsed {
                Ok(parsed) => {
                    let (code, results) = send_req::handle(ctx, &parsed);
                    finish_with_results(ctx, JOB_NAME_SEND_REQ, code, results)
                }
                Err(_) => code_only(ErrCode::INVALID_PARAM),
            }
        }
        JOB_NAME_CONFIRM_INTENT => {
            let parsed: Result<ConfirmIntentJob, _> = serde_json::from_value(job.job_data.clone());
            match parsed {
                Ok(parsed) => {
                    let (code, outcome) = confirm_intent::handle(ctx, &parsed);
                    match outcome {
                        Some(confirm_intent::ConfirmIntentOutcome::Done(results)) => {
                            finish_with_results(ctx, JOB_NAME_CONFIRM_INTENT, code, results)
                        }
                        Some(confirm_intent::ConfirmIntentOutcome::WaitingPinCode(sid)) => {
                            PutJobResult {
                                code: ErrCode::WAITING_VERIFICATION_PIN_CODE as i32,
                                twilio_verification_sid: Some(sid),
                                ..Default::default()
                            }
                        }
                        None => code_only(code),
                    }
                }
                Err(_) => code_only(ErrCode::INVALID_PARAM),
            }
        }
        JOB_NAME_ATTACH_ESIG => {
            let parsed: Result<AttachEsigJob, _> = serde_json::from_value(job.job_data.clone());
            match parsed {
                Ok(parsed) => process_attach_esig(ctx, &parsed),
                Err(_) => code_only(ErrCode::INVALID_PARAM),
            }
        }
        _ => code_only(ErrCode::INVALID_PARAM),
    }
}

fn code_only(code: ErrCode) -> PutJobResult {
    PutJobResult { code: code as i32, ..Default::default() }
}

/// Hashes every output, mints this job's attestation document, and shapes
/// the `{results, attestDocument}` response (spec §4.9).
fn finish_with_results(
    ctx: &HandlerContext,
    job_name: &str,
    code: ErrCode,
    results: Vec<JobResult>,
) -> PutJobResult {
    if code != ErrCode::SUCCES {
        return code_only(code);
    }

    let hash_list: Vec<HashEntry> = results
        .iter()
        .map(|r| HashEntry {
            name: r.name.to_string(),
            hash: crate::canonical_json::sha256_hex(&r.bytes),
        })
        .collect();

    let attest_doc = match ctx.attestation.issue(ctx.nsm, job_name, hash_list) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "attestation issuance failed");
            return code_only(ErrCode::UNDEFINED_ERROR);
        }
    };

    PutJobResult {
        code: ErrCode::SUCCES as i32,
        results: Some(
            results
                .into_iter()
                .map(|r| EncodedResult { name: r.name.to_string(), data: base64::encode(r.bytes) })
                .collect(),
        ),
        attest_document: Some(base64::encode(attest_doc)),
        ..Default::default()
    }
}

/// `attachEsig` is shaped differently from the other two jobs: on success
/// the host never sees the plaintext results, only `encryptedResult` (spec
/// §4.8.3), with delivery mail sent as a side effect once the attestation
/// document for this job exists.
fn process_attach_esig(ctx: &HandlerContext, job: &AttachEsigJob) -> PutJobResult {
    let (code, out) = attach_esig::handle(ctx, job);
    if code != ErrCode::SUCCES {
        return code_only(code);
    }
    let Some((results, bundle_ctx)) = out else {
        return code_only(ErrCode::UNDEFINED_ERROR);
    };

    let hash_list: Vec<HashEntry> = results
        .iter()
        .map(|r| HashEntry {
            name: r.name.to_string(),
            hash: crate::canonical_json::sha256_hex(&r.bytes),
        })
        .collect();

    let attest_doc = match ctx.attestation.issue(ctx.nsm, JOB_NAME_ATTACH_ESIG, hash_list) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "attestation issuance failed");
            return code_only(ErrCode::UNDEFINED_ERROR);
        }
    };
    let attest_doc_b64 = base64::encode(&attest_doc);

    attach_esig::notify_result(ctx, &bundle_ctx, &attest_doc_b64);

    match attach_esig::encrypt_result(&bundle_ctx, &attest_doc_b64) {
        Ok(encrypted_result) => PutJobResult {
            code: ErrCode::SUCCES as i32,
            encrypted_result: Some(encrypted_result),
            ..Default::default()
        },
        Err(code) => code_only(code),
    }
}
