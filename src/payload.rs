//! Wire types for the task payload and its decrypted envelope sections
//! (spec §3), grounded in `params_checker.py`'s JSON schemas.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

#[derive(Debug, Clone, Deserialize)]
pub struct TaskPayload {
    #[serde(rename = "publicTaskInfo")]
    pub public_task_info: PublicTaskInfo,
    #[serde(rename = "privateTaskInfo")]
    pub private_task_info: PrivateTaskInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTaskInfo {
    #[serde(rename = "domainSetting")]
    pub domain_setting: DomainSetting,
    #[serde(rename = "inOrder")]
    pub in_order: bool,
    #[serde(rename = "templateInfo")]
    pub template_info: TemplateInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSetting {
    #[serde(rename = "rootDomain")]
    pub root_domain: String,
    #[serde(rename = "signerAppURL")]
    pub signer_app_url: String,
    #[serde(rename = "enhancedPrivacy")]
    pub enhanced_privacy: bool,
    #[serde(rename = "kmsConfig")]
    pub kms_config: KmsConfig,
    #[serde(rename = "emailServiceProvider")]
    pub email_service_provider: String,
    #[serde(rename = "emailServiceDomain")]
    pub email_service_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmsConfig {
    #[serde(rename = "kmsKeyARN")]
    pub kms_key_arn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(rename = "signerList")]
    pub signer_list: Vec<TemplateSigner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSigner {
    #[serde(default, rename = "signerEmail", skip_serializing_if = "Option::is_none")]
    pub signer_email: Option<String>,
    #[serde(rename = "fieldList")]
    pub field_list: Vec<SignatureField>,
}

/// Field geometry, top-left origin (spec §4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignatureField {
    pub x: f64,
    pub y: f64,
    pub height: f64,
    #[serde(rename = "pageNo")]
    pub page_no: u32,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum FieldType {
    Signature = 0,
    Date = 1,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateTaskInfo {
    #[serde(rename = "encryptedBindingData")]
    pub encrypted_binding_data: EncryptedEnvelope,
    #[serde(rename = "encryptedTaskConfig")]
    pub encrypted_task_config: EncryptedEnvelope,
    #[serde(rename = "encryptedTemplateData")]
    pub encrypted_template_data: EncryptedEnvelope,
    #[serde(rename = "encryptedEmailConfig")]
    pub encrypted_email_config: EncryptedEnvelope,
    #[serde(default, rename = "encryptedTwilioConfig")]
    pub encrypted_twilio_config: Option<EncryptedEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "encryptedDataKey")]
    pub encrypted_data_key: String,
    #[serde(rename = "dataIV")]
    pub data_iv: String,
    #[serde(rename = "encryptedData")]
    pub encrypted_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingData {
    #[serde(rename = "inOrder")]
    pub in_order: bool,
    #[serde(rename = "taskConfigHash")]
    pub task_config_hash: String,
    #[serde(rename = "templateInfoHash")]
    pub template_info_hash: String,
    #[serde(rename = "templateDataHash")]
    pub template_data_hash: String,
    #[serde(rename = "accessKey")]
    pub access_key: String,
    #[serde(rename = "bearerSecret")]
    pub bearer_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "senderMsg")]
    pub sender_msg: String,
    #[serde(rename = "notificantEmail")]
    pub notificant_email: String,
    #[serde(rename = "notificantLocale")]
    pub notificant_locale: String,
    #[serde(rename = "signerInfoList")]
    pub signer_info_list: Vec<SignerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerInfo {
    pub name: String,
    #[serde(rename = "emailAddr")]
    pub email_addr: String,
    #[serde(default, rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub locale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "serviceProvider")]
pub enum EmailConfig {
    #[serde(rename = "ses")]
    Ses {
        #[serde(rename = "sesSMTPUsername")]
        ses_smtp_username: String,
        #[serde(rename = "sesSMTPPassword")]
        ses_smtp_password: String,
        #[serde(rename = "sesDomain")]
        ses_domain: String,
    },
    #[serde(rename = "sg")]
    Sg {
        #[serde(rename = "sgSecret")]
        sg_secret: String,
        #[serde(rename = "sgDomain")]
        sg_domain: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfigEnvelope {
    #[serde(rename = "emailConfig")]
    pub email_config: EmailConfig,
    #[serde(rename = "bearerSecret")]
    pub bearer_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(rename = "apiSID")]
    pub api_sid: String,
    #[serde(rename = "apiSecret")]
    pub api_secret: String,
    #[serde(rename = "serviceSID")]
    pub service_sid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfigEnvelope {
    #[serde(rename = "twilioConfig")]
    pub twilio_config: TwilioConfig,
    #[serde(rename = "bearerSecret")]
    pub bearer_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfigEnvelope {
    #[serde(rename = "taskConfig")]
    pub task_config: TaskConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindingDataEnvelope {
    #[serde(rename = "bindingData")]
    pub binding_data: BindingData,
}
