//! Stable, ecosystem-wide error code set (spec §6). Serialized as the
//! integer wire value; never re-ordered once published.

use serde_repr::{Deserialize_repr, Serialize_repr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ErrCode {
    SUCCES = 0,
    UNDEFINED_ERROR = 1,
    INVALID_PARAM = 2,
    MISMATCH_PROOF_LIST_LENGTH = 3,
    INVALID_SIGNER_POI = 4,
    MISMATCH_SIGNER_POI_CONTENT = 5,
    INVALID_SIGN_TIME_ORDER = 6,
    GENERATE_SIGNING_PDF_FAIL = 7,
    GENERATE_PREVIEW_PDF_FAIL = 8,
    DECRYPT_PRIVATE_INFO_FAIL = 9,
    MISMATCH_INORDER_OPTION = 10,
    MISMATCH_TEMPLATE_INFO_HASH = 11,
    MISMATCH_TASK_CONFIG_HASH = 12,
    MISMATCH_TEMPLATE_DATA_HASH = 13,
    MISMATCH_EMAIL_CONFIG = 14,
    MISMATCH_BEARERSECRET = 15,
    INVALID_SIGNER_POR = 16,
    MISMATCH_SIGNER_POR_CONTENT = 17,
    WAITING_VERIFICATION_PIN_CODE = 18,
    INVALID_TWILIO_CREDENTAIL = 19,
    INVALID_TWILIO_SETTING = 20,
    CHECK_PHONE_FAIL = 21,
    SEND_SMS_FAIL = 22,
    MISSING_TWILIO_CONFIG = 23,
    INVALID_PHONE_NUMBER_FORMAT = 24,
    MISMATCH_SIGNER_LIST_LENGTH = 25,
    INVALID_SIGNER_INDEX = 26,
    SIGNED_PDF_DETECTED = 27,
    PDF_NOT_MODIFIABLE_DETECTED = 28,
    SEND_EMAIL_FAIL = 29,
    SEND_CONFIRM_EMAIL_FAIL = 30,
    SEND_NOTIFY_EMAIL_FAIL = 31,
    ENCRYPT_RESULT_FAIL = 32,
    INVALID_EMAIL_CREDENTIAL = 33,
}

impl ErrCode {
    pub fn is_success(self) -> bool {
        matches!(self, ErrCode::SUCCES)
    }
}

impl Default for ErrCode {
    fn default() -> Self {
        ErrCode::UNDEFINED_ERROR
    }
}
