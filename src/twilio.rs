//! `TwilioClient` (spec §4.8.2, ported from `fn_confirm_intent_handler.py`'s
//! `__send_verificatoin_sms`/`__check_signer_phone`). The pack carries no
//! `twilio` crate, so this drives the Verify v2 REST API directly with
//! `reqwest`, matching the original's `CustomTwilioHttpClient(timeout=5)`.

use serde::Deserialize;

use crate::payload::TwilioConfig;

const VERIFY_TIMEOUT_SECS: u64 = 5;
const EXPECTED_SERVICE_NAME: &str = "Let's eSign";
const EXPECTED_CODE_LENGTH: i64 = 6;

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("twilio rejected the credentials")]
    InvalidCredential,
    #[error("twilio verify service settings did not match")]
    InvalidSetting,
    #[error("failed to send the verification SMS")]
    SendSmsFail,
    #[error("failed to check the verification code")]
    CheckPhoneFail,
}

#[derive(Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
}

#[derive(Deserialize)]
struct VerifyService {
    friendly_name: String,
    code_length: i64,
}

#[derive(Deserialize)]
struct VerificationCreated {
    sid: String,
}

#[derive(Deserialize)]
struct VerificationCheckResult {
    to: String,
    channel: String,
    status: String,
}

pub struct TwilioClient {
    http: reqwest::blocking::Client,
    api_sid: String,
    api_secret: String,
    service_sid: String,
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(VERIFY_TIMEOUT_SECS))
            .build()
            .expect("building the twilio HTTP client cannot fail with these options");
        TwilioClient {
            http,
            api_sid: config.api_sid.clone(),
            api_secret: config.api_secret.clone(),
            service_sid: config.service_sid.clone(),
        }
    }

    fn service_url(&self, suffix: &str) -> String {
        format!(
            "https://verify.twilio.com/v2/Services/{}{suffix}",
            self.service_sid
        )
    }

    fn twilio_error_from_status(&self, status: reqwest::StatusCode, body: &str) -> TwilioError {
        let code = serde_json::from_str::<TwilioErrorBody>(body)
            .ok()
            .and_then(|b| b.code);
        if matches!(code, Some(20003) | Some(20404)) {
            TwilioError::InvalidCredential
        } else {
            let _ = status;
            TwilioError::SendSmsFail
        }
    }

    /// Sends a fresh SMS verification code, returning the verification SID
    /// the caller must echo back on the next `confirmIntent` call (spec
    /// §4.8.2: "absent both fields, issues a new code and returns
    /// `WAITING_VERIFICATION_PIN_CODE` with the SID instead of results").
    pub fn send_verification_sms(&self, phone_number: &str) -> Result<String, TwilioError> {
        let service_resp = self
            .http
            .get(self.service_url(""))
            .basic_auth(&self.api_sid, Some(&self.api_secret))
            .send()
            .map_err(|_| TwilioError::SendSmsFail)?;
        let status = service_resp.status();
        let body = service_resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(self.twilio_error_from_status(status, &body));
        }
        let service: VerifyService =
            serde_json::from_str(&body).map_err(|_| TwilioError::SendSmsFail)?;

        if service.friendly_name != EXPECTED_SERVICE_NAME || service.code_length != EXPECTED_CODE_LENGTH {
            return Err(TwilioError::InvalidSetting);
        }

        let create_resp = self
            .http
            .post(self.service_url("/Verifications"))
            .basic_auth(&self.api_sid, Some(&self.api_secret))
            .form(&[("To", phone_number), ("Channel", "sms")])
            .send()
            .map_err(|_| TwilioError::SendSmsFail)?;
        let status = create_resp.status();
        let body = create_resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(self.twilio_error_from_status(status, &body));
        }
        let created: VerificationCreated =
            serde_json::from_str(&body).map_err(|_| TwilioError::SendSmsFail)?;

        Ok(created.sid)
    }

    /// Checks a signer-submitted PIN against a prior
    /// `send_verification_sms` SID (spec §4.8.2).
    pub fn check_signer_phone(
        &self,
        verification_sid: &str,
        phone_number: &str,
        pin_code: &str,
    ) -> Result<(), TwilioError> {
        let resp = self
            .http
            .post(self.service_url("/VerificationCheck"))
            .basic_auth(&self.api_sid, Some(&self.api_secret))
            .form(&[("VerificationSid", verification_sid), ("Code", pin_code)])
            .send()
            .map_err(|_| TwilioError::CheckPhoneFail)?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            let code = serde_json::from_str::<TwilioErrorBody>(&body).ok().and_then(|b| b.code);
            return Err(if matches!(code, Some(20003) | Some(20404)) {
                TwilioError::InvalidCredential
            } else {
                TwilioError::CheckPhoneFail
            });
        }
        let result: VerificationCheckResult =
            serde_json::from_str(&body).map_err(|_| TwilioError::CheckPhoneFail)?;

        if result.to == phone_number && result.channel == "sms" && result.status == "approved" {
            Ok(())
        } else {
            Err(TwilioError::CheckPhoneFail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwilioClient {
        TwilioClient::new(&TwilioConfig {
            api_sid: "AC_test".into(),
            api_secret: "secret".into(),
            service_sid: "VA_test".into(),
        })
    }

    #[test]
    fn maps_known_twilio_error_codes_to_invalid_credential() {
        let client = client();
        let body = serde_json::json!({"code": 20003}).to_string();
        assert!(matches!(
            client.twilio_error_from_status(reqwest::StatusCode::FORBIDDEN, &body),
            TwilioError::InvalidCredential
        ));

        let body = serde_json::json!({"code": 20404}).to_string();
        assert!(matches!(
            client.twilio_error_from_status(reqwest::StatusCode::NOT_FOUND, &body),
            TwilioError::InvalidCredential
        ));
    }

    #[test]
    fn falls_back_to_send_sms_fail_for_unrecognized_errors() {
        let client = client();
        let body = serde_json::json!({"code": 20429}).to_string();
        assert!(matches!(
            client.twilio_error_from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, &body),
            TwilioError::SendSmsFail
        ));
    }

    #[test]
    fn service_url_joins_the_service_sid_and_suffix() {
        let client = client();
        assert_eq!(
            client.service_url("/Verifications"),
            "https://verify.twilio.com/v2/Services/VA_test/Verifications"
        );
    }
}
