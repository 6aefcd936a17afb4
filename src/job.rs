//! Wire types for the three job kinds the host hands the worker (spec §3,
//! schemas ported from `params_checker.py`'s `*_job_schema` definitions).

use serde::{Deserialize, Serialize};

use crate::payload::TaskPayload;

pub const JOB_NAME_SEND_REQ: &str = "sendReq";
pub const JOB_NAME_CONFIRM_INTENT: &str = "confirmIntent";
pub const JOB_NAME_ATTACH_ESIG: &str = "attachEsig";

#[derive(Debug, Clone, Deserialize)]
pub struct GetJobResponse {
    pub session: String,
    #[serde(rename = "jobName")]
    pub job_name: String,
    #[serde(rename = "jobData")]
    pub job_data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtraData {
    #[serde(rename = "kmsKeyID")]
    pub kms_key_id: String,
    #[serde(rename = "kmsKeySecret")]
    pub kms_key_secret: String,
    #[serde(default, rename = "apiVersion")]
    pub api_version: Option<String>,
    #[serde(default, rename = "auxData")]
    pub aux_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendReqJob {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "subTaskID")]
    pub sub_task_id: String,
    #[serde(rename = "taskPayload")]
    pub task_payload: TaskPayload,
    #[serde(rename = "signerIdx")]
    pub signer_idx: usize,
    #[serde(rename = "taskPassword")]
    pub task_password: String,
    #[serde(rename = "extraData")]
    pub extra_data: ExtraData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProofEntry {
    pub poi: String,
    #[serde(rename = "poiAttestDocument")]
    pub poi_attest_document: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmIntentJob {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "subTaskID")]
    pub sub_task_id: String,
    #[serde(rename = "taskPayload")]
    pub task_payload: TaskPayload,
    pub secret: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    pub por: String,
    #[serde(rename = "porAttestDocument")]
    pub por_attest_document: String,
    #[serde(default, rename = "twilioVerificationSID")]
    pub twilio_verification_sid: Option<String>,
    #[serde(default, rename = "twilioVerificationPIN")]
    pub twilio_verification_pin: Option<String>,
    #[serde(rename = "extraData")]
    pub extra_data: ExtraData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachEsigJob {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "subTaskID")]
    pub sub_task_id: String,
    #[serde(rename = "taskPayload")]
    pub task_payload: TaskPayload,
    #[serde(rename = "proofList")]
    pub proof_list: Vec<ProofEntry>,
    #[serde(default, rename = "taskPassword")]
    pub task_password: Option<String>,
    #[serde(rename = "extraData")]
    pub extra_data: ExtraData,
}

/// One function-result entry (`{name, bytes}`) before it is hashed and
/// base64-encoded into the host-facing response (spec §4.9).
pub struct JobResult {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct EncodedResult {
    pub name: String,
    pub data: String,
}

#[derive(Debug, Serialize, Default)]
pub struct PutJobResult {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<EncodedResult>>,
    #[serde(rename = "attestDocument", skip_serializing_if = "Option::is_none")]
    pub attest_document: Option<String>,
    #[serde(rename = "encryptedResult", skip_serializing_if = "Option::is_none")]
    pub encrypted_result: Option<String>,
    #[serde(rename = "twilioVerificationSID", skip_serializing_if = "Option::is_none")]
    pub twilio_verification_sid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_send_req_json() -> serde_json::Value {
        serde_json::json!({
            "taskID": "task-1",
            "subTaskID": "sub-1",
            "taskPayload": {
                "publicTaskInfo": {
                    "domainSetting": {
                        "rootDomain": "example.com",
                        "signerAppURL": "https://example.com/sign",
                        "enhancedPrivacy": false,
                        "kmsConfig": { "kmsKeyARN": "arn:aws:kms:us-east-1:1:key/abc" },
                        "emailServiceProvider": "ses",
                        "emailServiceDomain": "mail.example.com"
                    },
                    "inOrder": true,
                    "templateInfo": {
                        "signerList": [
                            { "fieldList": [ { "x": 1.0, "y": 2.0, "height": 20.0, "pageNo": 0, "type": 0 } ] }
                        ]
                    }
                },
                "privateTaskInfo": {
                    "encryptedBindingData": { "encryptedDataKey": "a", "dataIV": "b", "encryptedData": "c" },
                    "encryptedTaskConfig": { "encryptedDataKey": "a", "dataIV": "b", "encryptedData": "c" },
                    "encryptedTemplateData": { "encryptedDataKey": "a", "dataIV": "b", "encryptedData": "c" },
                    "encryptedEmailConfig": { "encryptedDataKey": "a", "dataIV": "b", "encryptedData": "c" }
                }
            },
            "signerIdx": 0,
            "taskPassword": "pw",
            "extraData": { "kmsKeyID": "id", "kmsKeySecret": "secret" }
        })
    }

    #[test]
    fn deserializes_send_req_job_from_camel_case_json() {
        let job: SendReqJob = serde_json::from_value(sample_send_req_json()).unwrap();
        assert_eq!(job.task_id, "task-1");
        assert_eq!(job.signer_idx, 0);
        assert!(job.task_payload.public_task_info.in_order);
        assert!(job.task_payload.private_task_info.encrypted_twilio_config.is_none());
    }

    #[test]
    fn get_job_response_carries_opaque_job_data() {
        let wire = serde_json::json!({
            "session": "sess-1",
            "jobName": "sendReq",
            "jobData": sample_send_req_json()
        });
        let parsed: GetJobResponse = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.session, "sess-1");
        assert_eq!(parsed.job_name, JOB_NAME_SEND_REQ);
    }

    #[test]
    fn put_job_result_omits_absent_optional_fields() {
        let result = PutJobResult { code: 0, ..Default::default() };
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded, serde_json::json!({ "code": 0 }));
    }

    #[test]
    fn put_job_result_serializes_results_and_attest_document() {
        let result = PutJobResult {
            code: 0,
            results: Some(vec![EncodedResult { name: "por".into(), data: "YWJj".into() }]),
            attest_document: Some("ZG9j".into()),
            ..Default::default()
        };
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded["results"][0]["name"], "por");
        assert_eq!(encoded["attestDocument"], "ZG9j");
        assert!(encoded.get("encryptedResult").is_none());
    }
}
